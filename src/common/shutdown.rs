//! One-shot termination signal shared between tasks.
//!
//! Used both for tracker shutdown and for cooperative cancellation of a run.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::Notify;

/// A latch that can be triggered once and awaited by any number of tasks.
#[derive(Debug, Default)]
pub struct Shutdown {
    terminated: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the latch and wake every waiter.
    pub fn shutdown(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether the latch has been triggered.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Resolve once the latch is triggered.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let terminated = self.terminated.clone();
        let notify = self.notify.clone();
        async move {
            loop {
                let notified = notify.notified();
                if terminated.load(Ordering::SeqCst) {
                    return;
                }
                notified.await;
            }
        }
    }
}
