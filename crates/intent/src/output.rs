//! Uniform treatment of recognizer and handler results.
//!
//! Rule authors may answer synchronously or hand back an asynchronous
//! producer that emits any number of values. The engine only ever looks at
//! the first emission and drops the producer right after it.

use std::{fmt, future::Future};

use {
    futures::{
        Stream, StreamExt,
        stream::{self, BoxStream},
    },
    parley_common::Args,
};

/// Asynchronous producer of results.
pub type OutputStream<T> = BoxStream<'static, anyhow::Result<T>>;

/// The result of a recognizer or handler invocation.
pub enum Output<T> {
    /// A value computed synchronously.
    Ready(T),
    /// A synchronous fault.
    Failed(anyhow::Error),
    /// A producer that may emit zero, one or many values over time.
    Stream(OutputStream<T>),
}

impl<T: Send + 'static> Output<T> {
    pub fn ready(value: T) -> Self {
        Self::Ready(value)
    }

    pub fn fail(error: impl Into<anyhow::Error>) -> Self {
        Self::Failed(error.into())
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = anyhow::Result<T>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    /// A single value computed asynchronously.
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::Stream(stream::once(future).boxed())
    }

    /// Normalize into a producer. Synchronous values become a one-element
    /// stream that is ready on first poll.
    pub fn into_stream(self) -> OutputStream<T> {
        match self {
            Self::Ready(value) => tokio_stream::once(Ok(value)).boxed(),
            Self::Failed(error) => tokio_stream::once(Err(error)).boxed(),
            Self::Stream(stream) => stream,
        }
    }

    /// Take the first emission and release the producer.
    ///
    /// Returns `None` when the producer completes without emitting. The
    /// stream is dropped before this returns, so whatever backs it (a
    /// generator, a channel fed by a task) observes the cancellation.
    pub async fn first(self) -> Option<anyhow::Result<T>> {
        let mut producer = self.into_stream();
        let first = producer.next().await;
        drop(producer);
        first
    }
}

impl Output<Option<Args>> {
    /// Recognized, with the given args.
    pub fn matched(args: Args) -> Self {
        Self::Ready(Some(args))
    }

    /// Not recognized.
    pub fn no_match() -> Self {
        Self::Ready(None)
    }
}

impl<T> From<T> for Output<T> {
    fn from(value: T) -> Self {
        Self::Ready(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}
