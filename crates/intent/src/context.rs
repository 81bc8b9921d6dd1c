//! State-gated groups of ordered rules.

use std::{fmt, sync::Arc};

use crate::{
    rule::{Query, Rule},
    store::Store,
};

/// One conversational mode: a predicate over state plus the rules that apply
/// while it holds. Rule order is significant; the first match wins.
pub struct Context<St: Store> {
    query: Arc<dyn Query<St::State>>,
    rules: Vec<Rule<St>>,
    name: Option<String>,
}

/// A single rule or a list of rules, accepted at each position of
/// [`Context::new`] and the [`context!`](crate::context!) macro.
pub enum RuleSet<St: Store> {
    One(Rule<St>),
    Many(Vec<Rule<St>>),
}

impl<St: Store> From<Rule<St>> for RuleSet<St> {
    fn from(rule: Rule<St>) -> Self {
        Self::One(rule)
    }
}

impl<St: Store> From<Vec<Rule<St>>> for RuleSet<St> {
    fn from(rules: Vec<Rule<St>>) -> Self {
        Self::Many(rules)
    }
}

impl<St: Store> IntoIterator for RuleSet<St> {
    type IntoIter = std::vec::IntoIter<Rule<St>>;
    type Item = Rule<St>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Self::One(rule) => vec![rule].into_iter(),
            Self::Many(rules) => rules.into_iter(),
        }
    }
}

impl<St: Store> Context<St> {
    /// Build a context, flattening rule sets one level in the order given.
    pub fn new<Q, I>(query: Q, rules: I) -> Self
    where
        Q: Query<St::State> + 'static,
        I: IntoIterator,
        I::Item: Into<RuleSet<St>>,
    {
        Self {
            query: Arc::new(query),
            rules: rules
                .into_iter()
                .flat_map(|set| -> RuleSet<St> { set.into() })
                .collect(),
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn rules(&self) -> &[Rule<St>] {
        &self.rules
    }

    pub fn applies_to(&self, state: &St::State) -> bool {
        self.query.matches(state)
    }
}

impl<St: Store> Clone for Context<St> {
    fn clone(&self) -> Self {
        Self {
            query: Arc::clone(&self.query),
            rules: self.rules.clone(),
            name: self.name.clone(),
        }
    }
}

impl<St: Store> fmt::Debug for Context<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

/// Build a [`Context`] from a query and any mix of rules and rule lists.
///
/// ```ignore
/// let idle = parley_intent::context!(always(), greet, vec![help, stop], fallback);
/// ```
#[macro_export]
macro_rules! context {
    ($query:expr $(, $rules:expr)* $(,)?) => {
        $crate::Context::new($query, {
            let rules: ::std::vec::Vec<$crate::RuleSet<_>> =
                ::std::vec![$($crate::RuleSet::from($rules)),*];
            rules
        })
    };
}
