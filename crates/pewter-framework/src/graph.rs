//! Inter-plugin dependency graph.
//!
//! [`DependencyGraph`] stores the `A depends-on B` edges declared by plugin
//! descriptors and answers three questions for the registry:
//!
//! - [`activation_order`](DependencyGraph::activation_order): which plugins
//!   must be activated, dependencies first, for a plugin to become active.
//! - [`can_activate`](DependencyGraph::can_activate): the same check reduced to
//!   a flag plus the offending names.
//! - [`deactivation_closure`](DependencyGraph::deactivation_closure): which
//!   plugins must go down together with a plugin.
//!
//! The graph itself never changes plugin state; it is rebuilt incrementally as
//! descriptors are loaded and removed.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::DependencyError;

/// Directed dependency edges between plugin names.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// plugin → the plugins it depends on.
    deps: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the declared dependencies of `name`.
    pub fn insert<I, S>(&mut self, name: impl Into<String>, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.insert(
            name.into(),
            dependencies.into_iter().map(Into::into).collect(),
        );
    }

    /// Removes `name` and its outgoing edges. Edges pointing at `name` stay,
    /// so dependents now report it as missing.
    pub fn remove(&mut self, name: &str) -> Option<BTreeSet<String>> {
        self.deps.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.deps.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Direct dependencies declared by `name`.
    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.deps.get(name)
    }

    /// Plugins that directly depend on `name`.
    pub fn dependents(&self, name: &str) -> BTreeSet<String> {
        self.deps
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(plugin, _)| plugin.clone())
            .collect()
    }

    /// Collects `name` and everything it transitively depends on, together
    /// with the declared dependencies that are not in the graph.
    fn induced(&self, name: &str) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut nodes = BTreeSet::new();
        let mut missing = BTreeSet::new();
        let mut stack = vec![name.to_string()];

        while let Some(current) = stack.pop() {
            if nodes.contains(&current) || missing.contains(&current) {
                continue;
            }
            match self.deps.get(&current) {
                Some(deps) => {
                    stack.extend(deps.iter().cloned());
                    nodes.insert(current);
                }
                None => {
                    missing.insert(current);
                }
            }
        }

        (nodes, missing)
    }

    /// Topological order of `name` and its transitive dependencies,
    /// dependencies strictly before dependents.
    ///
    /// Uses Kahn's algorithm over the induced subgraph; ties are broken by name
    /// so the order is stable across calls.
    ///
    /// # Errors
    ///
    /// - [`DependencyError::Unsatisfied`] when any plugin in the subgraph
    ///   (including `name` itself) is unknown.
    /// - [`DependencyError::Cyclic`] when the subgraph contains a cycle; a
    ///   plugin depending on itself is a cycle of one.
    pub fn activation_order(&self, name: &str) -> Result<Vec<String>, DependencyError> {
        let (nodes, missing) = self.induced(name);
        if !missing.is_empty() {
            return Err(DependencyError::Unsatisfied {
                plugin: name.to_string(),
                missing: missing.into_iter().collect(),
            });
        }

        // In-degree counts the dependencies still to be ordered.
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for node in &nodes {
            let deps = &self.deps[node];
            in_degree.insert(node, deps.len());
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(node);
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&node, _)| node)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.to_string());
            for &dependent in dependents.get(node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() != nodes.len() {
            let blocked: BTreeSet<&str> = in_degree
                .iter()
                .filter(|&(_, &degree)| degree > 0)
                .map(|(&node, _)| node)
                .collect();
            return Err(DependencyError::Cyclic {
                plugin: name.to_string(),
                cycle: self.find_cycle(&blocked),
            });
        }

        Ok(order)
    }

    /// Extracts one concrete cycle from the nodes Kahn's algorithm could not
    /// order. Every such node either sits on a cycle or depends on one, so
    /// following blocked dependencies must revisit a node.
    fn find_cycle(&self, blocked: &BTreeSet<&str>) -> Vec<String> {
        let Some(&start) = blocked.first() else {
            return Vec::new();
        };
        let mut path: Vec<&str> = vec![start];
        let mut current = start;

        loop {
            let next = self.deps[current]
                .iter()
                .map(String::as_str)
                .find(|dep| blocked.contains(dep));
            let Some(next) = next else {
                // Unreachable for a consistent graph; report what we have.
                return path.into_iter().map(str::to_string).collect();
            };
            if let Some(pos) = path.iter().position(|&n| n == next) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|n| n.to_string()).collect();
                cycle.push(next.to_string());
                return cycle;
            }
            path.push(next);
            current = next;
        }
    }

    /// Whether `name` could be activated right now, and if not, which plugins
    /// are missing or form the cycle.
    pub fn can_activate(&self, name: &str) -> (bool, BTreeSet<String>) {
        match self.activation_order(name) {
            Ok(_) => (true, BTreeSet::new()),
            Err(err) => (false, err.involved().iter().cloned().collect()),
        }
    }

    /// `name` plus every plugin that transitively depends on it.
    pub fn deactivation_closure(&self, name: &str) -> BTreeSet<String> {
        let mut closure = BTreeSet::from([name.to_string()]);
        let mut queue = VecDeque::from([name.to_string()]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents(&current) {
                if closure.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        closure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (name, deps) in edges {
            g.insert(*name, deps.iter().copied());
        }
        g
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_single_plugin() {
        let g = graph(&[("solo", &[])]);
        assert_eq!(g.activation_order("solo").unwrap(), vec!["solo"]);
    }

    #[test]
    fn test_order_is_exactly_the_closure() {
        let g = graph(&[
            ("app", &["db", "cache"]),
            ("cache", &["db"]),
            ("db", &[]),
            ("unrelated", &["db"]),
        ]);
        let order = g.activation_order("app").unwrap();
        assert_eq!(order.len(), 3);
        assert!(!order.contains(&"unrelated".to_string()));
        assert!(position(&order, "db") < position(&order, "cache"));
        assert!(position(&order, "cache") < position(&order, "app"));
    }

    #[test]
    fn test_diamond_order_is_deterministic() {
        let g = graph(&[
            ("top", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);
        assert_eq!(
            g.activation_order("top").unwrap(),
            vec!["base", "left", "right", "top"]
        );
    }

    #[test]
    fn test_missing_dependency() {
        let g = graph(&[("app", &["db", "queue"]), ("db", &["disk"])]);
        let err = g.activation_order("app").unwrap_err();
        assert_eq!(
            err,
            DependencyError::Unsatisfied {
                plugin: "app".into(),
                missing: vec!["disk".into(), "queue".into()],
            }
        );
    }

    #[test]
    fn test_unknown_root_is_missing() {
        let g = DependencyGraph::new();
        let (ok, involved) = g.can_activate("ghost");
        assert!(!ok);
        assert_eq!(involved, BTreeSet::from(["ghost".to_string()]));
    }

    #[test]
    fn test_cycle_detected() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let err = g.activation_order("a").unwrap_err();
        match err {
            DependencyError::Cyclic { plugin, cycle } => {
                assert_eq!(plugin, "a");
                assert_eq!(cycle, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_reachable_through_dependency() {
        let g = graph(&[("app", &["x"]), ("x", &["y"]), ("y", &["x"])]);
        let (ok, involved) = g.can_activate("app");
        assert!(!ok);
        assert!(involved.contains("x"));
        assert!(involved.contains("y"));
        assert!(!involved.contains("app"));
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let g = graph(&[("narcissus", &["narcissus"])]);
        let err = g.activation_order("narcissus").unwrap_err();
        assert_eq!(
            err,
            DependencyError::Cyclic {
                plugin: "narcissus".into(),
                cycle: vec!["narcissus".into(), "narcissus".into()],
            }
        );
    }

    #[test]
    fn test_deactivation_closure() {
        let g = graph(&[
            ("single", &[]),
            ("parent1", &["single"]),
            ("parent2", &["single"]),
            ("grandparent", &["parent1"]),
            ("other", &[]),
        ]);
        let closure = g.deactivation_closure("single");
        assert_eq!(
            closure,
            BTreeSet::from([
                "single".to_string(),
                "parent1".to_string(),
                "parent2".to_string(),
                "grandparent".to_string(),
            ])
        );
        assert_eq!(
            g.deactivation_closure("parent2"),
            BTreeSet::from(["parent2".to_string()])
        );
    }

    #[test]
    fn test_remove_makes_dependents_unsatisfied() {
        let mut g = graph(&[("app", &["db"]), ("db", &[])]);
        assert!(g.can_activate("app").0);
        g.remove("db");
        assert!(!g.contains("db"));
        assert_eq!(
            g.can_activate("app").1,
            BTreeSet::from(["db".to_string()])
        );
    }
}
