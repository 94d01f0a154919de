//! Single-assignment completion cell
//!
//! [`CompletionSource`] is the write side, held by whoever observes the
//! terminal event. [`BuildFuture`] is the read side handed to the caller.
//! The first `resolve` wins; later calls are ignored and report `false`.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, OnceCell};

use crate::error::BridgeError;

struct Shared {
    value: OnceCell<bool>,
    notify: Notify,
}

/// Write side of a pending build result
pub struct CompletionSource {
    shared: Arc<Shared>,
}

impl CompletionSource {
    /// Create an unresolved cell and its reader
    pub fn new() -> (Self, BuildFuture) {
        let shared = Arc::new(Shared {
            value: OnceCell::new(),
            notify: Notify::new(),
        });
        (
            Self {
                shared: shared.clone(),
            },
            BuildFuture { shared },
        )
    }

    /// Store the result if none has been stored yet.
    ///
    /// Returns whether this call was the one that resolved the cell.
    pub fn resolve(&self, value: bool) -> bool {
        match self.shared.value.set(value) {
            Ok(()) => {
                self.shared.notify.notify_waiters();
                true
            }
            Err(_) => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.shared.value.initialized()
    }
}

/// Read side of a pending build result
///
/// Cloning is cheap and every clone observes the same value.
#[derive(Clone)]
pub struct BuildFuture {
    shared: Arc<Shared>,
}

impl BuildFuture {
    /// A future that is already resolved
    pub fn ready(value: bool) -> Self {
        let (source, future) = CompletionSource::new();
        source.resolve(value);
        future
    }

    /// The result, if the build has finished
    pub fn try_result(&self) -> Option<bool> {
        self.shared.value.get().copied()
    }

    pub fn is_resolved(&self) -> bool {
        self.shared.value.initialized()
    }

    /// Wait for the result
    pub async fn wait(&self) -> bool {
        loop {
            // Registered before the check so a resolve in between is not lost.
            let notified = self.shared.notify.notified();
            if let Some(value) = self.try_result() {
                return value;
            }
            notified.await;
        }
    }

    /// Wait for the result, giving up after `timeout`
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<bool, BridgeError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| BridgeError::TimedOut(timeout))
    }
}

impl IntoFuture for BuildFuture {
    type Output = bool;
    type IntoFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl std::fmt::Debug for BuildFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildFuture")
            .field("result", &self.try_result())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writer_wins() {
        let (source, future) = CompletionSource::new();
        assert_eq!(future.try_result(), None);
        assert!(!source.is_resolved());

        assert!(source.resolve(true));
        assert!(!source.resolve(false));
        assert_eq!(future.try_result(), Some(true));
        assert_eq!(future.clone().try_result(), Some(true));
    }

    #[test]
    fn test_ready() {
        let future = BuildFuture::ready(false);
        assert!(future.is_resolved());
        assert_eq!(future.try_result(), Some(false));
    }

    #[tokio::test]
    async fn test_await_resolved_from_other_thread() {
        let (source, future) = CompletionSource::new();
        let reader = future.clone();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            source.resolve(true);
        });

        assert!(future.await);
        assert!(reader.await);
    }

    #[tokio::test]
    async fn test_wait_timeout() {
        let (_source, future) = CompletionSource::new();
        let result = future.wait_timeout(Duration::from_millis(10)).await;
        assert_eq!(result, Err(BridgeError::TimedOut(Duration::from_millis(10))));
    }
}
