//! The state container seam.
//!
//! The engine only ever reads a snapshot at the start of a dispatch. Handlers
//! receive the container itself and mutate through whatever API it offers.

use std::{fmt, sync::Arc};

use tokio::sync::watch;

/// A container that can hand out a snapshot of the current state.
pub trait Store: Send + Sync {
    type State: Send + Sync;

    fn get_state(&self) -> Self::State;
}

impl<St: Store + ?Sized> Store for Arc<St> {
    type State = St::State;

    fn get_state(&self) -> Self::State {
        self.as_ref().get_state()
    }
}

type Reducer<S, A> = Box<dyn Fn(&S, A) -> S + Send + Sync>;

/// In-memory reducer store: state changes only through [`MemoryStore::dispatch`].
pub struct MemoryStore<S, A> {
    state: watch::Sender<S>,
    reducer: Reducer<S, A>,
}

impl<S, A> MemoryStore<S, A>
where
    S: Clone + Send + Sync,
{
    pub fn new(initial: S, reducer: impl Fn(&S, A) -> S + Send + Sync + 'static) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            reducer: Box::new(reducer),
        }
    }

    /// Apply an action through the reducer and notify subscribers.
    pub fn dispatch(&self, action: A) {
        self.state
            .send_modify(|state| *state = (self.reducer)(state, action));
    }

    /// Watch every subsequent state change.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.state.subscribe()
    }
}

impl<S, A> Store for MemoryStore<S, A>
where
    S: Clone + Send + Sync,
{
    type State = S;

    fn get_state(&self) -> S {
        self.state.borrow().clone()
    }
}

impl<S: fmt::Debug, A> fmt::Debug for MemoryStore<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
