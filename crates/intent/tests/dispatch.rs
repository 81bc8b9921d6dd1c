//! End-to-end dispatch behaviour across contexts, rules and async producers.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use {
    parley_intent::{
        Args, Context, Dispatched, Error, MemoryStore, Message, Output, RecordingSink, Rule,
        TraceEvent, Unhandled, always, context, default_rule, run_message, run_message_traced,
    },
    serde_json::{Value, json},
    tokio::sync::mpsc,
    tokio_stream::wrappers::ReceiverStream,
};

// ── Fixtures ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Session {
    in_dialog: bool,
}

type TestStore = MemoryStore<Session, bool>;

fn store() -> TestStore {
    MemoryStore::new(Session::default(), |_: &Session, in_dialog: bool| Session {
        in_dialog,
    })
}

fn msg(text: &str) -> Message {
    Message::text("test", "alice", text)
}

fn args(value: Value) -> Args {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// Records every (rule, args) pair a handler receives.
#[derive(Clone, Default)]
struct Calls(Arc<Mutex<Vec<(String, Args)>>>);

impl Calls {
    fn handler(
        &self,
        name: &'static str,
    ) -> impl Fn(&TestStore, &Message, Args) -> Output<Value> + Send + Sync + 'static + use<> {
        let calls = self.clone();
        move |_: &TestStore, _: &Message, args: Args| {
            calls.0.lock().unwrap().push((name.to_string(), args));
            Output::ready(json!(name))
        }
    }

    fn all(&self) -> Vec<(String, Args)> {
        self.0.lock().unwrap().clone()
    }
}

fn fixed(result: Option<Value>) -> impl Fn(&Session, &Message) -> Output<Option<Args>> + use<> {
    move |_: &Session, _: &Message| Output::ready(result.clone().map(args))
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// ── Concrete scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn skips_false_context_and_picks_first_matching_rule() {
    let calls = Calls::default();
    let contexts: Vec<Context<TestStore>> = vec![
        context!(
            |_: &Session| false,
            Rule::named("a-only", fixed(Some(json!({}))), calls.handler("a-only")),
        ),
        context!(
            |_: &Session| true,
            Rule::named("r1", fixed(None), calls.handler("r1")),
            Rule::named("r2", fixed(Some(json!({"x": 1}))), calls.handler("r2")),
        ),
    ];

    let outcome = run_message(&store(), &contexts, &msg("m")).await.unwrap();

    let handled = outcome.handled().unwrap();
    assert_eq!(handled.context.index, 1);
    assert_eq!(handled.rule.name.as_deref(), Some("r2"));
    assert_eq!(handled.result, Some(json!("r2")));
    assert_eq!(calls.all(), vec![("r2".to_string(), args(json!({"x": 1})))]);
}

#[tokio::test]
async fn exhausted_context_completes_without_handler() {
    let calls = Calls::default();
    let contexts: Vec<Context<TestStore>> = vec![context!(
        always(),
        Rule::named("r1", fixed(None), calls.handler("r1")),
    )];

    let outcome = run_message(&store(), &contexts, &msg("m")).await.unwrap();

    assert!(matches!(
        outcome,
        Dispatched::Unhandled(Unhandled::ContextExhausted { ref context }) if context.index == 0
    ));
    assert!(calls.all().is_empty());
}

#[tokio::test]
async fn async_recognizer_contributes_only_first_value() {
    let calls = Calls::default();
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&dropped);

    let recognizer = move |_: &Session, _: &Message| {
        let guard = DropFlag(Arc::clone(&flag));
        Output::stream(async_stream::stream! {
            let _guard = guard;
            yield Ok(Some(args(json!({"a": 1}))));
            yield Ok(Some(args(json!({"a": 2}))));
        })
    };
    let contexts: Vec<Context<TestStore>> = vec![context!(
        always(),
        Rule::named("multi", recognizer, calls.handler("multi")),
    )];

    run_message(&store(), &contexts, &msg("m")).await.unwrap();

    assert_eq!(calls.all(), vec![("multi".to_string(), args(json!({"a": 1})))]);
    assert!(dropped.load(Ordering::SeqCst), "recognizer producer was not released");
}

#[tokio::test]
async fn context_exhaustion_does_not_fall_through() {
    let calls = Calls::default();
    let contexts: Vec<Context<TestStore>> = vec![
        context!(always(), Rule::named("miss", fixed(None), calls.handler("miss"))),
        context!(
            always(),
            Rule::named("hit", fixed(Some(json!({}))), calls.handler("hit")),
        ),
    ];

    let outcome = run_message(&store(), &contexts, &msg("m")).await.unwrap();

    assert!(!outcome.is_handled());
    assert!(calls.all().is_empty());
}

#[tokio::test]
async fn empty_args_count_as_a_match() {
    let calls = Calls::default();
    let contexts: Vec<Context<TestStore>> = vec![context!(
        always(),
        Rule::named("empty", fixed(Some(json!({}))), calls.handler("empty")),
    )];

    let outcome = run_message(&store(), &contexts, &msg("m")).await.unwrap();

    assert!(outcome.is_handled());
    assert_eq!(calls.all(), vec![("empty".to_string(), Args::new())]);
}

// ── Properties ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn no_true_query_means_no_handler() {
    let calls = Calls::default();
    let contexts: Vec<Context<TestStore>> = vec![
        context!(|s: &Session| s.in_dialog, default_rule(calls.handler("dialog"))),
        context!(|_: &Session| false, default_rule(calls.handler("never"))),
    ];

    let outcome = run_message(&store(), &contexts, &msg("m")).await.unwrap();

    assert_eq!(outcome, Dispatched::Unhandled(Unhandled::NoContext));
    assert!(calls.all().is_empty());

    let empty: Vec<Context<TestStore>> = Vec::new();
    let outcome = run_message(&store(), &empty, &msg("m")).await.unwrap();
    assert_eq!(outcome, Dispatched::Unhandled(Unhandled::NoContext));
}

#[tokio::test]
async fn earlier_rule_wins_when_several_match() {
    let calls = Calls::default();
    let attempted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempted);
    let later = move |_: &Session, _: &Message| {
        counter.fetch_add(1, Ordering::SeqCst);
        Output::matched(Args::new())
    };
    let contexts: Vec<Context<TestStore>> = vec![context!(
        always(),
        Rule::named("first", fixed(Some(json!({"n": 1}))), calls.handler("first")),
        Rule::named("second", later, calls.handler("second")),
        default_rule(calls.handler("default")),
    )];

    run_message(&store(), &contexts, &msg("m")).await.unwrap();

    assert_eq!(calls.all().len(), 1);
    assert_eq!(calls.all()[0].0, "first");
    assert_eq!(attempted.load(Ordering::SeqCst), 0, "later recognizer was evaluated");
}

#[tokio::test]
async fn active_context_follows_state() {
    let calls = Calls::default();
    let contexts: Vec<Context<TestStore>> = vec![
        context!(|s: &Session| s.in_dialog, default_rule(calls.handler("dialog"))),
        context!(always(), default_rule(calls.handler("idle"))),
    ];
    let store = store();

    let first = run_message(&store, &contexts, &msg("a")).await.unwrap();
    store.dispatch(true);
    let second = run_message(&store, &contexts, &msg("b")).await.unwrap();

    assert_eq!(first.into_result(), Some(json!("idle")));
    assert_eq!(second.into_result(), Some(json!("dialog")));
}

#[tokio::test]
async fn handler_contributes_only_first_value_and_is_released() {
    let (tx, rx) = mpsc::channel::<anyhow::Result<Value>>(4);
    let rx = Mutex::new(Some(rx));
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);

    let producer = tokio::spawn(async move {
        for n in 0..4 {
            if tx.send(Ok(json!(n))).await.is_err() {
                return;
            }
        }
        // Hold the channel open until the consumer goes away.
        tx.closed().await;
    });

    let handler = move |_: &TestStore, _: &Message, _: Args| {
        counter.fetch_add(1, Ordering::SeqCst);
        let rx = rx.lock().unwrap().take().unwrap();
        Output::stream(ReceiverStream::new(rx))
    };
    let contexts: Vec<Context<TestStore>> = vec![context!(always(), default_rule(handler))];

    let outcome = run_message(&store(), &contexts, &msg("m")).await.unwrap();

    assert_eq!(outcome.into_result(), Some(json!(0)));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    // Completes only because the receiver was dropped.
    tokio::time::timeout(std::time::Duration::from_secs(5), producer)
        .await
        .expect("handler producer still running")
        .unwrap();
}

#[tokio::test]
async fn sync_and_async_recognizers_are_equivalent() {
    let sync_calls = Calls::default();
    let async_calls = Calls::default();
    let sync_contexts: Vec<Context<TestStore>> = vec![context!(
        always(),
        Rule::named("rule", fixed(Some(json!({"k": "v"}))), sync_calls.handler("rule")),
    )];
    let async_contexts: Vec<Context<TestStore>> = vec![context!(
        always(),
        Rule::named(
            "rule",
            |_: &Session, _: &Message| {
                Output::future(async {
                    tokio::task::yield_now().await;
                    Ok(Some(args(json!({"k": "v"}))))
                })
            },
            async_calls.handler("rule"),
        ),
    )];

    let a = run_message(&store(), &sync_contexts, &msg("m")).await.unwrap();
    let b = run_message(&store(), &async_contexts, &msg("m")).await.unwrap();

    assert_eq!(a.handled().map(|h| &h.rule), b.handled().map(|h| &h.rule));
    assert_eq!(a.into_result(), b.into_result());
    assert_eq!(sync_calls.all(), async_calls.all());
}

#[tokio::test]
async fn silent_recognizer_stream_is_a_non_match() {
    let calls = Calls::default();
    let contexts: Vec<Context<TestStore>> = vec![context!(
        always(),
        Rule::named(
            "silent",
            |_: &Session, _: &Message| {
                Output::<Option<Args>>::stream(futures::stream::empty())
            },
            calls.handler("silent"),
        ),
        Rule::named(
            "falsy-first",
            |_: &Session, _: &Message| {
                Output::stream(futures::stream::iter([Ok(None), Ok(Some(Args::new()))]))
            },
            calls.handler("falsy-first"),
        ),
        default_rule(calls.handler("default")),
    )];

    let outcome = run_message(&store(), &contexts, &msg("m")).await.unwrap();

    assert_eq!(outcome.into_result(), Some(json!("default")));
    assert_eq!(calls.all().len(), 1);
}

// ── Faults ──────────────────────────────────────────────────────────────────

fn source_text(err: &Error) -> String {
    std::error::Error::source(err).unwrap().to_string()
}

#[tokio::test]
async fn recognizer_fault_propagates_and_stops_search() {
    let calls = Calls::default();
    let contexts: Vec<Context<TestStore>> = vec![context!(
        always(),
        Rule::named(
            "broken",
            |_: &Session, _: &Message| {
                Output::<Option<Args>>::fail(anyhow::anyhow!("model offline"))
            },
            calls.handler("broken"),
        ),
        default_rule(calls.handler("default")),
    )];

    let err = run_message(&store(), &contexts, &msg("m")).await.unwrap_err();

    assert!(matches!(err, Error::Recognizer { .. }));
    assert_eq!(err.rule().and_then(|r| r.name.as_deref()), Some("broken"));
    assert!(err.to_string().ends_with("(broken) failed"));
    assert_eq!(source_text(&err), "model offline");
    assert!(calls.all().is_empty());
}

#[tokio::test]
async fn rejected_async_handler_propagates() {
    let contexts: Vec<Context<TestStore>> = vec![context!(
        always(),
        default_rule(|_: &TestStore, _: &Message, _: Args| {
            Output::<Value>::future(async { Err(anyhow::anyhow!("send failed")) })
        }),
    )];

    let err = run_message(&store(), &contexts, &msg("m")).await.unwrap_err();

    assert!(matches!(err, Error::Handler { .. }));
    assert!(!err.to_string().contains("send failed"));
    assert_eq!(source_text(&err), "send failed");
}

// ── Tracing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn trace_events_follow_the_search() {
    let calls = Calls::default();
    let contexts: Vec<Context<TestStore>> = vec![
        context!(|_: &Session| false, default_rule(calls.handler("off"))),
        context!(
            always(),
            Rule::named("miss", fixed(None), calls.handler("miss")),
            Rule::named("hit", fixed(Some(json!({}))), calls.handler("hit")),
        )
        .with_name("idle"),
    ];
    let sink = RecordingSink::new();
    let message = msg("m");

    run_message_traced(&store(), &contexts, &message, &sink)
        .await
        .unwrap();

    let kinds: Vec<&str> = sink
        .events()
        .iter()
        .map(|e| match e {
            TraceEvent::DispatchStarted { .. } => "started",
            TraceEvent::NoContextMatched { .. } => "no-context",
            TraceEvent::ContextEntered { .. } => "context",
            TraceEvent::RuleAttempted { .. } => "attempt",
            TraceEvent::RuleRejected { .. } => "reject",
            TraceEvent::RuleMatched { .. } => "match",
            TraceEvent::HandlerInvoked { .. } => "invoke",
            TraceEvent::HandlerCompleted { .. } => "done",
            TraceEvent::ContextExhausted { .. } => "exhausted",
        })
        .collect();
    assert_eq!(kinds, [
        "started", "context", "attempt", "reject", "attempt", "match", "invoke", "done"
    ]);
    assert!(sink.events().iter().all(|e| e.message_id() == message.id));
    assert!(sink.events().iter().any(|e| matches!(
        e,
        TraceEvent::ContextEntered { context, .. } if context.name.as_deref() == Some("idle")
    )));
}
