//! Caller-supplied cancellation and deadlines for backend calls.

use std::future::{pending, Future};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::error::BackendError;

/// Cancels every [`CancelSignal`] created alongside it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace never fails, even with no live receivers.
        self.tx.send_replace(true);
    }
}

/// Cancellation and deadline observed by a query.
///
/// The default signal never fires. Dropping the [`CancelHandle`] without
/// calling `cancel` leaves the signal inert.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Option<watch::Receiver<bool>>,
    deadline: Option<(Instant, Duration)>,
}

impl CancelSignal {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx },
            CancelSignal {
                flag: Some(rx),
                deadline: None,
            },
        )
    }

    /// Expire `after` from now.
    pub fn with_deadline(mut self, after: Duration) -> Self {
        self.deadline = Some((Instant::now() + after, after));
        self
    }

    /// Resolves with the reason once the signal fires.
    async fn fired(&self) -> BackendError {
        let deadline = async {
            match self.deadline {
                Some((at, after)) => {
                    sleep_until(at).await;
                    after
                }
                None => pending().await,
            }
        };
        let flag = async {
            match self.flag.clone() {
                Some(mut rx) => {
                    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        // Handle dropped without cancelling.
                        pending::<()>().await;
                    }
                }
                None => pending().await,
            }
        };

        tokio::select! {
            after = deadline => BackendError::DeadlineExceeded(after),
            _ = flag => BackendError::Cancelled,
        }
    }

    /// Run a backend future unless the signal fires first.
    pub async fn guard<F, T, E>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<BackendError>,
    {
        if self.flag.is_none() && self.deadline.is_none() {
            return fut.await;
        }
        tokio::select! {
            biased;
            reason = self.fired() => Err(reason.into()),
            result = fut => result,
        }
    }
}
