//! Cancellable collection subscriptions.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::document::ChangeBatch;
use crate::error::Result;

type CancelFn = Box<dyn FnOnce() + Send + 'static>;

/// Handle that detaches a listener from the store.
///
/// The cancel callback runs at most once: either on [`remove`](Self::remove)
/// or when the registration is dropped.
pub struct ListenerRegistration {
    cancel: Option<CancelFn>,
}

impl ListenerRegistration {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn remove(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.fire();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("live", &self.cancel.is_some())
            .finish()
    }
}

/// Receiving half of a subscription.
#[derive(Debug)]
pub struct ChangeStream {
    rx: mpsc::UnboundedReceiver<Result<ChangeBatch>>,
}

impl ChangeStream {
    /// Wait for the next delivery. `None` once the store closes the listener.
    pub async fn next_batch(&mut self) -> Option<Result<ChangeBatch>> {
        self.rx.recv().await
    }
}

impl Stream for ChangeStream {
    type Item = Result<ChangeBatch>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Live subscription to a collection: a stream of change batches plus the
/// registration that keeps the store-side listener alive.
#[derive(Debug)]
pub struct Subscription {
    stream: ChangeStream,
    registration: ListenerRegistration,
}

impl Subscription {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Result<ChangeBatch>>,
        registration: ListenerRegistration,
    ) -> Self {
        Self {
            stream: ChangeStream { rx },
            registration,
        }
    }

    pub async fn next_batch(&mut self) -> Option<Result<ChangeBatch>> {
        self.stream.next_batch().await
    }

    /// Detach from the store. Dropping the subscription has the same effect.
    pub fn cancel(self) {
        self.registration.remove();
    }

    /// Split into the stream and the registration so the owner can cancel
    /// while another task consumes the stream.
    pub fn into_parts(self) -> (ChangeStream, ListenerRegistration) {
        (self.stream, self.registration)
    }
}

impl Stream for Subscription {
    type Item = Result<ChangeBatch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_registration_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let reg = ListenerRegistration::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        reg.remove();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_fires_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        {
            let _reg = ListenerRegistration::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
