//! The two-level first-match search over contexts and rules.

use std::{fmt, sync::Arc, time::Duration};

use {
    parley_common::Message,
    parley_config::DispatchConfig,
    serde_json::Value,
    tracing::warn,
};

use crate::{
    context::Context,
    error::{Error, Result},
    store::Store,
    trace::{LogSink, NoopSink, TraceEvent, TraceSink},
};

/// Identifies a context by position, with its diagnostic name if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRef {
    pub index: usize,
    pub name: Option<String>,
}

impl fmt::Display for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "context #{} ({name})", self.index),
            None => write!(f, "context #{}", self.index),
        }
    }
}

/// Identifies a rule by its context and position, with its name if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRef {
    pub context: usize,
    pub index: usize,
    pub name: Option<String>,
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "rule {}.{} ({name})", self.context, self.index),
            None => write!(f, "rule {}.{}", self.context, self.index),
        }
    }
}

/// A handler was selected and invoked.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub context: ContextRef,
    pub rule: RuleRef,
    /// First value the handler emitted; `None` if it finished without one.
    pub result: Option<Value>,
}

/// Why no handler ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unhandled {
    /// No context's query held for the snapshot.
    NoContext,
    /// The active context had no rule that recognized the message.
    ContextExhausted { context: ContextRef },
}

/// Outcome of one dispatch. Both variants are normal completions.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Handled(Handled),
    Unhandled(Unhandled),
}

impl Dispatched {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    pub fn handled(&self) -> Option<&Handled> {
        match self {
            Self::Handled(handled) => Some(handled),
            Self::Unhandled(_) => None,
        }
    }

    /// The handler's first result, if a handler ran and emitted one.
    pub fn into_result(self) -> Option<Value> {
        match self {
            Self::Handled(handled) => handled.result,
            Self::Unhandled(_) => None,
        }
    }
}

/// Dispatch `message` against `contexts`, logging diagnostics through `tracing`.
pub async fn run_message<St: Store>(
    store: &St,
    contexts: &[Context<St>],
    message: &Message,
) -> Result<Dispatched> {
    run_message_traced(store, contexts, message, &LogSink).await
}

/// Dispatch `message` against `contexts`, reporting each step to `sink`.
///
/// State is read once up front; every query and recognizer sees that same
/// snapshot. Only the first context whose query holds is searched. Within it
/// rules are tried in order and the first one whose recognizer emits args has
/// its handler invoked. Each recognizer and the chosen handler contribute
/// only their first emission; their producers are dropped right after it.
pub async fn run_message_traced<St: Store>(
    store: &St,
    contexts: &[Context<St>],
    message: &Message,
    sink: &dyn TraceSink,
) -> Result<Dispatched> {
    let state = store.get_state();
    let message_id = &message.id;
    sink.record(&TraceEvent::DispatchStarted {
        message_id: message_id.clone(),
        contexts: contexts.len(),
    });

    // `find` stops at the first hit, so later queries are never evaluated.
    let Some((index, context)) = contexts
        .iter()
        .enumerate()
        .find(|(_, context)| context.applies_to(&state))
    else {
        sink.record(&TraceEvent::NoContextMatched {
            message_id: message_id.clone(),
        });
        return Ok(Dispatched::Unhandled(Unhandled::NoContext));
    };

    let context_ref = ContextRef {
        index,
        name: context.name().map(str::to_owned),
    };
    sink.record(&TraceEvent::ContextEntered {
        message_id: message_id.clone(),
        context: context_ref.clone(),
        rules: context.rules().len(),
    });

    for (rule_index, rule) in context.rules().iter().enumerate() {
        let rule_ref = RuleRef {
            context: index,
            index: rule_index,
            name: rule.name().map(str::to_owned),
        };
        sink.record(&TraceEvent::RuleAttempted {
            message_id: message_id.clone(),
            rule: rule_ref.clone(),
        });

        let args = match rule.recognizer().recognize(&state, message).first().await {
            Some(Ok(Some(args))) => args,
            Some(Ok(None)) | None => {
                sink.record(&TraceEvent::RuleRejected {
                    message_id: message_id.clone(),
                    rule: rule_ref,
                });
                continue;
            },
            Some(Err(source)) => return Err(Error::recognizer(rule_ref, source)),
        };

        sink.record(&TraceEvent::RuleMatched {
            message_id: message_id.clone(),
            rule: rule_ref.clone(),
        });
        sink.record(&TraceEvent::HandlerInvoked {
            message_id: message_id.clone(),
            rule: rule_ref.clone(),
        });

        let result = match rule.handler().handle(store, message, args).first().await {
            Some(Ok(value)) => Some(value),
            None => None,
            Some(Err(source)) => return Err(Error::handler(rule_ref, source)),
        };

        sink.record(&TraceEvent::HandlerCompleted {
            message_id: message_id.clone(),
            rule: rule_ref.clone(),
            emitted: result.is_some(),
        });
        return Ok(Dispatched::Handled(Handled {
            context: context_ref,
            rule: rule_ref,
            result,
        }));
    }

    sink.record(&TraceEvent::ContextExhausted {
        message_id: message_id.clone(),
        context: context_ref.clone(),
    });
    Ok(Dispatched::Unhandled(Unhandled::ContextExhausted {
        context: context_ref,
    }))
}

/// Owns a context list and the ambient dispatch settings (trace sink,
/// optional time limit).
pub struct Dispatcher<St: Store> {
    contexts: Vec<Context<St>>,
    sink: Arc<dyn TraceSink>,
    timeout: Option<Duration>,
}

impl<St: Store> Dispatcher<St> {
    pub fn new(contexts: Vec<Context<St>>) -> Self {
        Self {
            contexts,
            sink: Arc::new(LogSink),
            timeout: None,
        }
    }

    /// Apply `[dispatch]` settings: `trace = false` silences diagnostics and
    /// `timeout_secs` bounds each dispatch.
    pub fn from_config(contexts: Vec<Context<St>>, config: &DispatchConfig) -> Self {
        let sink: Arc<dyn TraceSink> = if config.trace {
            Arc::new(LogSink)
        } else {
            Arc::new(NoopSink)
        };
        Self::new(contexts)
            .with_sink(sink)
            .with_timeout(config.timeout())
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn contexts(&self) -> &[Context<St>] {
        &self.contexts
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Dispatch one message. On timeout the in-flight recognizer or handler
    /// producer is dropped along with the dispatch future.
    pub async fn run(&self, store: &St, message: &Message) -> Result<Dispatched> {
        let dispatch = run_message_traced(store, &self.contexts, message, self.sink.as_ref());
        let Some(limit) = self.timeout else {
            return dispatch.await;
        };
        match tokio::time::timeout(limit, dispatch).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(message_id = %message.id, timeout = ?limit, "dispatch timed out");
                Err(Error::Timeout {
                    message_id: message.id.clone(),
                    after: limit,
                })
            },
        }
    }
}

impl<St: Store> fmt::Debug for Dispatcher<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("contexts", &self.contexts)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
