//! Recognizer/handler pairs and the plugin traits rule authors implement.

use std::{fmt, sync::Arc};

use {
    parley_common::{Args, Message},
    serde_json::Value,
};

use crate::{output::Output, store::Store};

/// Decides whether a message is meant for a rule, producing the args its
/// handler will receive. `None` as the first emission means "not mine".
pub trait Recognizer<St: Store>: Send + Sync {
    fn recognize(&self, state: &St::State, message: &Message) -> Output<Option<Args>>;
}

impl<St, F> Recognizer<St> for F
where
    St: Store,
    F: Fn(&St::State, &Message) -> Output<Option<Args>> + Send + Sync,
{
    fn recognize(&self, state: &St::State, message: &Message) -> Output<Option<Args>> {
        self(state, message)
    }
}

/// Acts on a recognized message. May mutate state through the store.
pub trait Handler<St: Store>: Send + Sync {
    fn handle(&self, store: &St, message: &Message, args: Args) -> Output<Value>;
}

impl<St, F> Handler<St> for F
where
    St: Store,
    F: Fn(&St, &Message, Args) -> Output<Value> + Send + Sync,
{
    fn handle(&self, store: &St, message: &Message, args: Args) -> Output<Value> {
        self(store, message, args)
    }
}

/// Synchronous predicate over state that gates a context. Must not block.
pub trait Query<S>: Send + Sync {
    fn matches(&self, state: &S) -> bool;
}

impl<S, F> Query<S> for F
where
    F: Fn(&S) -> bool + Send + Sync,
{
    fn matches(&self, state: &S) -> bool {
        self(state)
    }
}

/// Query that holds in every state. See [`always`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Always;

impl<S> Query<S> for Always {
    fn matches(&self, _state: &S) -> bool {
        true
    }
}

/// Recognizer that matches every message with empty args. See [`always_recognize`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysRecognize;

impl<St: Store> Recognizer<St> for AlwaysRecognize {
    fn recognize(&self, _state: &St::State, _message: &Message) -> Output<Option<Args>> {
        Output::matched(Args::new())
    }
}

/// A query that holds in every state.
pub fn always() -> Always {
    Always
}

/// A recognizer that matches every message with empty args.
pub fn always_recognize() -> AlwaysRecognize {
    AlwaysRecognize
}

/// One intent-to-action mapping. Cheap to clone; the same rule may appear in
/// several contexts.
pub struct Rule<St: Store> {
    recognizer: Arc<dyn Recognizer<St>>,
    handler: Arc<dyn Handler<St>>,
    name: Option<String>,
}

impl<St: Store> Rule<St> {
    pub fn new<R, H>(recognizer: R, handler: H) -> Self
    where
        R: Recognizer<St> + 'static,
        H: Handler<St> + 'static,
    {
        Self {
            recognizer: Arc::new(recognizer),
            handler: Arc::new(handler),
            name: None,
        }
    }

    pub fn named<R, H>(name: impl Into<String>, recognizer: R, handler: H) -> Self
    where
        R: Recognizer<St> + 'static,
        H: Handler<St> + 'static,
    {
        Self::new(recognizer, handler).with_name(name)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn recognizer(&self) -> &dyn Recognizer<St> {
        self.recognizer.as_ref()
    }

    pub fn handler(&self) -> &dyn Handler<St> {
        self.handler.as_ref()
    }
}

impl<St: Store> Clone for Rule<St> {
    fn clone(&self) -> Self {
        Self {
            recognizer: Arc::clone(&self.recognizer),
            handler: Arc::clone(&self.handler),
            name: self.name.clone(),
        }
    }
}

impl<St: Store> fmt::Debug for Rule<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Build an unnamed rule.
pub fn rule<St, R, H>(recognizer: R, handler: H) -> Rule<St>
where
    St: Store,
    R: Recognizer<St> + 'static,
    H: Handler<St> + 'static,
{
    Rule::new(recognizer, handler)
}

/// Catch-all rule. Place it last in a context; anything after it is unreachable.
pub fn default_rule<St, H>(handler: H) -> Rule<St>
where
    St: Store,
    H: Handler<St> + 'static,
{
    Rule::new(always_recognize(), handler).with_name("default")
}
