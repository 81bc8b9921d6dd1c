//! Sample bot driven by the console harness.
//!
//! Two contexts: a naming dialog that is active while the bot waits for the
//! user's name, and an idle context with keyword rules and a fallback.

use {
    parley_intent::{
        Args, Context, MemoryStore, Message, Output, Rule, Store, always, context, default_rule,
    },
    serde_json::{Value, json},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Idle,
    AskingName,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotState {
    pub mode: Mode,
    pub name: Option<String>,
    pub turns: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotAction {
    Turn,
    AskName,
    SetName(String),
    CancelDialog,
}

pub type BotStore = MemoryStore<BotState, BotAction>;

fn reduce(state: &BotState, action: BotAction) -> BotState {
    let mut next = state.clone();
    match action {
        BotAction::Turn => next.turns += 1,
        BotAction::AskName => next.mode = Mode::AskingName,
        BotAction::SetName(name) => {
            next.name = Some(name);
            next.mode = Mode::Idle;
        },
        BotAction::CancelDialog => next.mode = Mode::Idle,
    }
    next
}

pub fn store() -> BotStore {
    MemoryStore::new(BotState::default(), reduce)
}

fn say(text: impl Into<String>) -> Output<Value> {
    Output::ready(json!({ "text": text.into() }))
}

/// Strips `phrase` from the start of `text`, ignoring ASCII case, when it is
/// followed by the end of the text, whitespace or punctuation. Returns the rest.
fn leading_phrase<'a>(text: &'a str, phrase: &str) -> Option<&'a str> {
    let head = text.get(..phrase.len())?;
    if !head.eq_ignore_ascii_case(phrase) {
        return None;
    }
    let rest = &text[phrase.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() || c.is_ascii_punctuation() => Some(rest),
        Some(_) => None,
    }
}

/// Matches when the message opens with one of `words` as a whole word; the
/// word is passed on as the `keyword` arg.
fn keyword(
    words: &'static [&'static str],
) -> impl Fn(&BotState, &Message) -> Output<Option<Args>> + Send + Sync + 'static {
    move |_: &BotState, message: &Message| {
        let text = message.normalized_text();
        match words
            .iter()
            .find(|word| leading_phrase(&text, word).is_some())
        {
            Some(word) => {
                let mut args = Args::new();
                args.insert("keyword".into(), json!(word));
                Output::matched(args)
            },
            None => Output::no_match(),
        }
    }
}

/// "call me Ada" carries a name; a bare "call me" opens the naming dialog.
fn rename_recognizer(_: &BotState, message: &Message) -> Output<Option<Args>> {
    let Some(rest) = leading_phrase(message.text.trim(), "call me") else {
        return Output::no_match();
    };
    let mut args = Args::new();
    let name = rest.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    if !name.is_empty() {
        args.insert("name".into(), json!(name));
    }
    Output::matched(args)
}

fn given_name(_: &BotState, message: &Message) -> Output<Option<Args>> {
    let name = message.text.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Output::no_match();
    }
    let mut args = Args::new();
    args.insert("name".into(), json!(name));
    Output::matched(args)
}

fn name_arg(args: &Args) -> Option<String> {
    args.get("name").and_then(Value::as_str).map(str::to_owned)
}

fn naming_context() -> Context<BotStore> {
    context!(
        |state: &BotState| state.mode == Mode::AskingName,
        Rule::named(
            "cancel",
            keyword(&["cancel", "never mind"]),
            |store: &BotStore, _: &Message, _: Args| {
                store.dispatch(BotAction::CancelDialog);
                say("Okay, forget it.")
            },
        ),
        Rule::named(
            "name",
            given_name,
            |store: &BotStore, _: &Message, args: Args| match name_arg(&args) {
                Some(name) => {
                    store.dispatch(BotAction::SetName(name.clone()));
                    say(format!("Nice to meet you, {name}!"))
                },
                None => Output::fail(anyhow::anyhow!("name rule matched without a name")),
            },
        ),
        default_rule(|_: &BotStore, _: &Message, _: Args| {
            say("Just one word, please. Or say \"cancel\".")
        }),
    )
    .with_name("naming")
}

fn idle_context() -> Context<BotStore> {
    let greet = Rule::named(
        "greet",
        keyword(&["hello", "hi", "hey"]),
        |store: &BotStore, _: &Message, _: Args| match store.get_state().name {
            Some(name) => say(format!("Hello again, {name}!")),
            None => say("Hello! Tell me what to call you with \"call me <name>\"."),
        },
    );
    let rename = Rule::named(
        "rename",
        rename_recognizer,
        |store: &BotStore, _: &Message, args: Args| match name_arg(&args) {
            Some(name) => {
                store.dispatch(BotAction::SetName(name.clone()));
                say(format!("Okay, I'll call you {name}."))
            },
            None => {
                store.dispatch(BotAction::AskName);
                say("What should I call you?")
            },
        },
    );
    let stats = Rule::named(
        "stats",
        keyword(&["stats"]),
        |store: &BotStore, _: &Message, _: Args| {
            let turns = store.get_state().turns;
            Output::future(async move {
                Ok(json!({ "text": format!("{turns} messages before this one.") }))
            })
        },
    );

    context!(
        always(),
        vec![greet, rename],
        stats,
        default_rule(|_: &BotStore, _: &Message, _: Args| {
            say("Sorry, I didn't catch that. Try \"hello\", \"call me <name>\" or \"stats\".")
        }),
    )
    .with_name("idle")
}

/// Contexts in priority order: the dialog shadows idle while it is active.
pub fn contexts() -> Vec<Context<BotStore>> {
    vec![naming_context(), idle_context()]
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        super::*,
        parley_intent::{Dispatcher, NoopSink},
    };

    struct Harness {
        store: BotStore,
        dispatcher: Dispatcher<BotStore>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: store(),
                dispatcher: Dispatcher::new(contexts()).with_sink(Arc::new(NoopSink)),
            }
        }

        async fn send(&self, text: &str) -> (String, String) {
            let message = Message::text("console", "tester", text);
            let outcome = self.dispatcher.run(&self.store, &message).await.unwrap();
            self.store.dispatch(BotAction::Turn);
            let handled = outcome.handled().unwrap().clone();
            let reply = handled
                .result
                .as_ref()
                .and_then(|v| v.get("text"))
                .and_then(Value::as_str)
                .unwrap()
                .to_string();
            (handled.rule.name.unwrap_or_default(), reply)
        }
    }

    #[tokio::test]
    async fn greets_and_falls_back() {
        let bot = Harness::new();
        let (rule, reply) = bot.send("Hello there").await;
        assert_eq!(rule, "greet");
        assert!(reply.starts_with("Hello!"));

        let (rule, _) = bot.send("what is this").await;
        assert_eq!(rule, "default");
    }

    #[tokio::test]
    async fn naming_dialog_shadows_idle_rules() {
        let bot = Harness::new();
        let (rule, reply) = bot.send("call me").await;
        assert_eq!(rule, "rename");
        assert_eq!(reply, "What should I call you?");
        assert_eq!(bot.store.get_state().mode, Mode::AskingName);

        // "hello" would match the idle greet rule, but the dialog is active.
        let (rule, _) = bot.send("hello world").await;
        assert_eq!(rule, "default");

        let (rule, reply) = bot.send("Ada").await;
        assert_eq!(rule, "name");
        assert_eq!(reply, "Nice to meet you, Ada!");

        let state = bot.store.get_state();
        assert_eq!(state.mode, Mode::Idle);
        assert_eq!(state.name.as_deref(), Some("Ada"));

        let (_, reply) = bot.send("hi").await;
        assert_eq!(reply, "Hello again, Ada!");
    }

    #[tokio::test]
    async fn cancel_leaves_dialog() {
        let bot = Harness::new();
        bot.send("call me").await;
        let (rule, _) = bot.send("never mind").await;
        assert_eq!(rule, "cancel");
        assert_eq!(bot.store.get_state().mode, Mode::Idle);
        assert_eq!(bot.store.get_state().name, None);
    }

    #[tokio::test]
    async fn keywords_match_whole_words_only() {
        let bot = Harness::new();
        for text in ["history", "hint please", "statistics"] {
            let (rule, _) = bot.send(text).await;
            assert_eq!(rule, "default", "{text:?}");
        }
        let (rule, _) = bot.send("hi!").await;
        assert_eq!(rule, "greet");
    }

    #[tokio::test]
    async fn call_me_needs_a_word_boundary() {
        let bot = Harness::new();
        let (rule, _) = bot.send("call mechanic").await;
        assert_eq!(rule, "default");
        assert_eq!(bot.store.get_state().name, None);
        assert_eq!(bot.store.get_state().mode, Mode::Idle);

        let (rule, reply) = bot.send("call me, Ada.").await;
        assert_eq!(rule, "rename");
        assert_eq!(reply, "Okay, I'll call you Ada.");
    }

    #[tokio::test]
    async fn inline_rename_and_async_stats() {
        let bot = Harness::new();
        let (_, reply) = bot.send("Call me Grace").await;
        assert_eq!(reply, "Okay, I'll call you Grace.");

        let (rule, reply) = bot.send("stats").await;
        assert_eq!(rule, "stats");
        assert_eq!(reply, "1 messages before this one.");
    }
}
