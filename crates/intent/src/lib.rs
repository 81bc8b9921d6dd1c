//! Intent dispatch: state-gated contexts of ordered recognizer/handler rules.
//!
//! Flow: snapshot state → first context whose query holds → first rule whose
//! recognizer yields args → invoke that rule's handler → keep its first result.
//!
//! Only the first matching context is ever explored. If none of its rules
//! recognize the message the dispatch ends unhandled; later contexts are not
//! consulted.

pub mod context;
pub mod engine;
pub mod error;
pub mod output;
pub mod rule;
pub mod store;
pub mod trace;

pub use {
    context::{Context, RuleSet},
    engine::{
        ContextRef, Dispatched, Dispatcher, Handled, RuleRef, Unhandled, run_message,
        run_message_traced,
    },
    error::{Error, Result},
    output::{Output, OutputStream},
    parley_common::{Args, Message},
    rule::{
        Always, AlwaysRecognize, Handler, Query, Recognizer, Rule, always, always_recognize,
        default_rule, rule,
    },
    store::{MemoryStore, Store},
    trace::{LogSink, NoopSink, RecordingSink, TraceEvent, TraceSink},
};
