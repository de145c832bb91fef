//! A once-fired shutdown signal shared by all background workers.

use futures_util::future::BoxFuture;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::watch;

/// Creates a linked [`Signal`]/[`Shutdown`] pair.
///
/// The [`Shutdown`] half is cheap to clone; every clone resolves once the
/// [`Signal`] fires or is dropped.
pub fn signal() -> (Signal, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (Signal { tx }, Shutdown { rx, changed: None })
}

/// Fires the shutdown of all linked [`Shutdown`] futures.
#[derive(Debug)]
pub struct Signal {
    tx: watch::Sender<bool>,
}

impl Signal {
    /// Fires the signal, resolving every linked [`Shutdown`].
    pub fn fire(self) {
        let _ = self.tx.send(true);
    }
}

/// A future that resolves once the linked [`Signal`] fires or is dropped.
///
/// Workers select against this alongside their actual work and exit when it
/// resolves.
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    changed: Option<BoxFuture<'static, ()>>,
}

impl Shutdown {
    /// Returns `true` if the signal has already fired.
    ///
    /// Lets non-async code points check for shutdown without awaiting.
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}

impl Clone for Shutdown {
    fn clone(&self) -> Self {
        Self { rx: self.rx.clone(), changed: None }
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown").field("fired", &self.is_fired()).finish()
    }
}

impl Future for Shutdown {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let changed = this.changed.get_or_insert_with(|| {
            let mut rx = this.rx.clone();
            Box::pin(async move {
                // resolves on fire or on the sender being dropped
                let _ = rx.wait_for(|fired| *fired).await;
            })
        });
        changed.as_mut().poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_all_clones() {
        let (signal, shutdown) = signal();
        let second = shutdown.clone();
        assert!(!shutdown.is_fired());

        signal.fire();
        shutdown.await;
        assert!(second.is_fired());
        second.await;
    }

    #[tokio::test]
    async fn dropping_the_signal_fires() {
        let (signal, shutdown) = signal();
        drop(signal);
        shutdown.await;
    }
}
