//! Handles returned to callers and the context given to running actions.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::error::{RequestError, DROPPED_REASON};

/// Global counter giving every request a unique identity.
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique request id.
pub(crate) fn next_request_id() -> u64 {
    REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Sender half used by the scheduler to settle a request.
pub(crate) type SettleSender<V> = oneshot::Sender<Result<V, RequestError>>;

/// Clonable future resolving to a request's result.
///
/// Every `add_request` call for a key that is already tracked returns a clone
/// of the same handle, so all waiters observe one settlement. Dropping a
/// handle does not cancel the request.
pub struct RequestHandle<V> {
    id: u64,
    inner: Shared<BoxFuture<'static, Result<V, RequestError>>>,
}

impl<V> RequestHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a handle and the sender that settles it.
    pub(crate) fn channel(id: u64) -> (Self, SettleSender<V>) {
        let (tx, rx) = oneshot::channel();
        let inner = async move {
            rx.await
                .unwrap_or_else(|_| Err(RequestError::cancelled(DROPPED_REASON)))
        }
        .boxed()
        .shared();
        (Self { id, inner }, tx)
    }

    /// Returns the result if the request has already settled.
    pub fn peek(&self) -> Option<&Result<V, RequestError>> {
        self.inner.peek()
    }
}

impl<V> RequestHandle<V> {
    /// Unique identity of the underlying request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns true if both handles wait on the same request.
    pub fn same_request(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<V> Clone for RequestHandle<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: self.inner.clone(),
        }
    }
}

impl<V> std::fmt::Debug for RequestHandle<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle").field("id", &self.id).finish()
    }
}

impl<V: Clone> Future for RequestHandle<V> {
    type Output = Result<V, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

/// Context handed to a request's action when it starts.
///
/// Cancellation is cooperative: the scheduler settles the caller's handle
/// immediately, but the action keeps running until it checks the token.
/// Actions should check [`is_cancelled`](Self::is_cancelled) before committing
/// side effects such as cache writes.
#[derive(Clone, Debug)]
pub struct RequestContext<K> {
    key: K,
    token: CancellationToken,
}

impl<K> RequestContext<K> {
    pub(crate) fn new(key: K, token: CancellationToken) -> Self {
        Self { key, token }
    }

    /// The key the request was registered under.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Token cancelled when the request is cancelled.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns true once the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the request is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
