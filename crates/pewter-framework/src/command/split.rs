/// Simple shell-like argument splitting for plain text.
///
/// Handles:
/// - Whitespace-separated arguments
/// - Quoted strings (single and double quotes), including empty ones
/// - Backslash escapes inside double quotes
pub fn shell_split(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                quoted = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                quoted = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if !current.is_empty() || quoted {
                    args.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() || quoted {
        args.push(current);
    }

    args
}

/// Byte spans of the whitespace-separated words of `input`.
pub(crate) fn word_spans(input: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (i, ch) in input.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, input.len()));
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_split_simple() {
        let args = shell_split("echo hello world");
        assert_eq!(args, vec!["echo", "hello", "world"]);
    }

    #[test]
    fn test_shell_split_quoted() {
        let args = shell_split(r#"echo "hello world" test"#);
        assert_eq!(args, vec!["echo", "hello world", "test"]);
    }

    #[test]
    fn test_shell_split_mixed_quotes() {
        let args = shell_split(r#"cmd "double's quote" 'single"s quote'"#);
        assert_eq!(args, vec!["cmd", "double's quote", r#"single"s quote"#]);
    }

    #[test]
    fn test_shell_split_empty_quotes_kept() {
        let args = shell_split(r#"set key """#);
        assert_eq!(args, vec!["set", "key", ""]);
    }

    #[test]
    fn test_shell_split_whitespace_only() {
        assert!(shell_split("   \t  ").is_empty());
        assert!(shell_split("").is_empty());
    }

    #[test]
    fn test_word_spans() {
        let text = "  plugin  activate x";
        let spans = word_spans(text);
        let words: Vec<_> = spans.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(words, vec!["plugin", "activate", "x"]);
        assert_eq!(&text[spans[1].1..], " x");
    }
}
