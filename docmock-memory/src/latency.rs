//! Simulated network latency and the dual-mode completion handle.
//!
//! Every public operation returns a [`Pending`] value. It is a future, so callers can
//! `.await` it, and it also accepts a completion callback through
//! [`Pending::on_complete`]. Both styles share the same execution path: the operation
//! first waits a random delay, then runs to completion without further suspension.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::future::{BoxFuture, FutureExt};
use rand::Rng;
use tokio::task::JoinHandle;

use docmock_core::error::DocMockResult;

/// Upper bound of the random delay applied when none is configured.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(400);

/// Draws the delay each operation waits before executing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Latency {
    max: Duration,
}

impl Latency {
    pub fn new(max: Duration) -> Self {
        Self { max }
    }

    /// Waits a uniformly random duration below the configured bound. A zero bound
    /// still yields to the scheduler once, so results are never observed inline.
    pub async fn pause(&self) {
        if self.max.is_zero() {
            tokio::task::yield_now().await;
            return;
        }

        let micros = rand::thread_rng().gen_range(0..self.max.as_micros().max(1) as u64);
        tokio::time::sleep(Duration::from_micros(micros)).await;
    }
}

impl Default for Latency {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DELAY)
    }
}

/// The eventual result of an operation.
///
/// Await it directly, or hand it a callback with [`Pending::on_complete`]. Once
/// created, the operation always runs to completion when polled; there is no
/// cancellation or timeout.
///
/// # Example
///
/// ```ignore
/// // Future style
/// let result = collection.insert_one(doc! { "a": 1 }).await?;
///
/// // Callback style
/// collection.find_one(doc! { "a": 1 }).on_complete(|result| {
///     println!("{result:?}");
/// });
/// ```
#[must_use = "operations do nothing unless awaited or given a callback"]
pub struct Pending<T> {
    inner: BoxFuture<'static, DocMockResult<T>>,
}

impl<T: Send + 'static> Pending<T> {
    pub(crate) fn new(future: impl Future<Output = DocMockResult<T>> + Send + 'static) -> Self {
        Self { inner: future.boxed() }
    }

    /// Resolves immediately. Used for calls rejected before they are scheduled.
    pub(crate) fn ready(result: DocMockResult<T>) -> Self {
        Self::new(futures::future::ready(result))
    }

    /// Runs the operation on the tokio runtime and passes its result to `callback`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(DocMockResult<T>) + Send + 'static,
    {
        tokio::spawn(async move { callback(self.await) })
    }

    /// Maps the successful result.
    pub fn map<U, F>(self, f: F) -> Pending<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Pending::new(self.inner.map(|result| result.map(f)))
    }
}

impl<T> Future for Pending<T> {
    type Output = DocMockResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").finish_non_exhaustive()
    }
}
