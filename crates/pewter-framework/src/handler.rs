//! Command handlers.
//!
//! Every command kind shares one handler signature:
//!
//! ```text
//! async fn(Invocation) -> R      where R: IntoReplies
//! ```
//!
//! [`Invocation`] carries the message, the parsed arguments and the names the
//! command was reached under. The return value is turned into outbound
//! [`Reply`]s by [`IntoReplies`]; returning `Err` marks the invocation as
//! failed, which the router reports as a generic failure.
//!
//! Handlers are wrapped in [`HandlerService`], a `tower::Service`, and stored
//! type-erased as [`BoxedHandlerService`].
//!
//! ```rust,ignore
//! async fn echo(inv: Invocation) -> String {
//!     inv.args.raw().to_string()
//! }
//!
//! async fn roll(inv: Invocation) -> Result<String, BoxError> {
//!     let sides: u32 = inv.args.raw().parse()?;
//!     Ok(format!("rolled a {sides}-sided die"))
//! }
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use clap::{ArgMatches, FromArgMatches};
use futures::FutureExt;
use futures::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service};

use pewter_core::{Message, Reply};

// ============================================================================
// Arguments
// ============================================================================

/// Captured groups of a regex command, detached from the message lifetime.
#[derive(Debug, Clone, Default)]
pub struct Captures {
    positional: Vec<Option<String>>,
    named: HashMap<String, String>,
}

impl Captures {
    pub(crate) fn from_regex(regex: &regex::Regex, caps: &regex::Captures<'_>) -> Self {
        let positional = caps
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();
        let named = regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Self { positional, named }
    }

    /// Group `i`; group 0 is the whole match.
    pub fn get(&self, i: usize) -> Option<&str> {
        self.positional.get(i).and_then(|m| m.as_deref())
    }

    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }
}

/// The arguments a handler receives, shaped by the command kind.
#[derive(Debug, Clone)]
pub enum Arguments {
    /// Literal commands: the text after the command name, trimmed.
    Raw(String),
    /// Arg-parse commands: the clap matches for the declared grammar.
    Parsed(ArgMatches),
    /// Regex commands: the capture groups.
    Captures(Captures),
    /// Catch-all commands and scheduled callbacks.
    None,
}

impl Arguments {
    /// The raw argument text for literal commands, `""` otherwise.
    pub fn raw(&self) -> &str {
        match self {
            Self::Raw(text) => text,
            _ => "",
        }
    }

    pub fn matches(&self) -> Option<&ArgMatches> {
        match self {
            Self::Parsed(matches) => Some(matches),
            _ => None,
        }
    }

    pub fn captures(&self) -> Option<&Captures> {
        match self {
            Self::Captures(caps) => Some(caps),
            _ => None,
        }
    }

    /// Converts parsed matches into a typed argument struct.
    pub fn parse_as<T: FromArgMatches>(&self) -> Result<T, BoxError> {
        let matches = self
            .matches()
            .ok_or("command was not declared with an argument grammar")?;
        Ok(T::from_arg_matches(matches)?)
    }
}

// ============================================================================
// Invocation
// ============================================================================

/// Everything a handler gets for one call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The triggering message.
    pub message: Arc<Message>,
    /// The externally visible name the command was reached under.
    pub command: String,
    /// The plugin that owns the command.
    pub plugin: String,
    pub args: Arguments,
}

impl Invocation {
    /// Builds a reply to the triggering message.
    pub fn reply(&self, text: impl Into<String>) -> Reply {
        self.message.reply(text)
    }
}

// ============================================================================
// IntoReplies
// ============================================================================

/// Types a handler may return.
pub trait IntoReplies: Send + 'static {
    /// Converts the value into replies to `origin`, or into a failure.
    fn into_replies(self, origin: &Message) -> Result<Vec<Reply>, BoxError>;
}

/// No reply.
impl IntoReplies for () {
    fn into_replies(self, _origin: &Message) -> Result<Vec<Reply>, BoxError> {
        Ok(Vec::new())
    }
}

/// One reply to wherever the message came from.
impl IntoReplies for String {
    fn into_replies(self, origin: &Message) -> Result<Vec<Reply>, BoxError> {
        Ok(vec![origin.reply(self)])
    }
}

impl IntoReplies for &'static str {
    fn into_replies(self, origin: &Message) -> Result<Vec<Reply>, BoxError> {
        Ok(vec![origin.reply(self)])
    }
}

/// An explicitly addressed reply.
impl IntoReplies for Reply {
    fn into_replies(self, _origin: &Message) -> Result<Vec<Reply>, BoxError> {
        Ok(vec![self])
    }
}

impl IntoReplies for Vec<Reply> {
    fn into_replies(self, _origin: &Message) -> Result<Vec<Reply>, BoxError> {
        Ok(self)
    }
}

impl IntoReplies for Vec<String> {
    fn into_replies(self, origin: &Message) -> Result<Vec<Reply>, BoxError> {
        Ok(self.into_iter().map(|text| origin.reply(text)).collect())
    }
}

/// `Some` replies with the inner value, `None` stays silent.
impl<T: IntoReplies> IntoReplies for Option<T> {
    fn into_replies(self, origin: &Message) -> Result<Vec<Reply>, BoxError> {
        match self {
            Some(value) => value.into_replies(origin),
            None => Ok(Vec::new()),
        }
    }
}

/// `Err` fails the invocation.
impl<T, E> IntoReplies for Result<T, E>
where
    T: IntoReplies,
    E: Into<BoxError> + Send + 'static,
{
    fn into_replies(self, origin: &Message) -> Result<Vec<Reply>, BoxError> {
        match self {
            Ok(value) => value.into_replies(origin),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Handler
// ============================================================================

/// An async function usable as a command handler.
///
/// Implemented for every `Fn(Invocation) -> impl Future<Output: IntoReplies>`
/// that is `Clone + Send + Sync + 'static`.
pub trait Handler<R>: Clone + Send + Sync + 'static {
    fn call(&self, invocation: Invocation) -> BoxFuture<'static, Result<Vec<Reply>, BoxError>>;
}

impl<F, Fut, R> Handler<R> for F
where
    F: Fn(Invocation) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReplies,
{
    fn call(&self, invocation: Invocation) -> BoxFuture<'static, Result<Vec<Reply>, BoxError>> {
        let origin = Arc::clone(&invocation.message);
        let fut = (self)(invocation);
        async move { fut.await.into_replies(&origin) }.boxed()
    }
}

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] that calls a single handler.
pub struct HandlerService<H, R> {
    handler: H,
    _marker: PhantomData<fn() -> R>,
}

impl<H, R> HandlerService<H, R> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<H: Clone, R> Clone for HandlerService<H, R> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            _marker: PhantomData,
        }
    }
}

impl<H, R> Service<Invocation> for HandlerService<H, R>
where
    H: Handler<R>,
{
    type Response = Vec<Reply>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Vec<Reply>, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        self.handler.call(invocation)
    }
}

/// A type-erased handler as stored in the command table.
pub type BoxedHandlerService = BoxCloneSyncService<Invocation, Vec<Reply>, BoxError>;

/// Boxes a handler into a [`BoxedHandlerService`].
pub fn into_service<H, R>(handler: H) -> BoxedHandlerService
where
    H: Handler<R>,
    R: 'static,
{
    BoxCloneSyncService::new(HandlerService::new(handler))
}
