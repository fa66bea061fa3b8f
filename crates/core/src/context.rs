//! Timeout and cancellation carried through every provider call.
//!
//! A [`RequestContext`] is cheap to clone. Each embedding, index, or chat
//! call is wrapped in [`RequestContext::run`], which races the call against
//! the optional deadline and the cancel signal of the owning [`CancelHandle`].

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::ChatError;

#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self { sender }
    }

    pub fn context(&self, timeout: Option<Duration>) -> RequestContext {
        RequestContext {
            timeout,
            cancel: self.sender.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    timeout: Option<Duration>,
    cancel: watch::Receiver<bool>,
}

impl RequestContext {
    /// Context with no deadline that can never be cancelled.
    pub fn background() -> Self {
        // A closed channel never flips to cancelled.
        let (_, cancel) = watch::channel(false);
        Self {
            timeout: None,
            cancel,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::background()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub async fn run<T, F>(&self, operation: &'static str, future: F) -> Result<T, ChatError>
    where
        F: Future<Output = Result<T, ChatError>>,
    {
        if self.is_cancelled() {
            return Err(ChatError::Cancelled { operation });
        }

        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            loop {
                if *cancel.borrow_and_update() {
                    return;
                }
                if cancel.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        let guarded = async {
            tokio::select! {
                result = future => result,
                _ = cancelled => Err(ChatError::Cancelled { operation }),
            }
        };

        match self.timeout {
            Some(after) => tokio::time::timeout(after, guarded)
                .await
                .map_err(|_| ChatError::TimedOut { operation, after })?,
            None => guarded.await,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}
