//! Post-commit side effects
//!
//! Inventory deduction, rewards, notifications and audit records run after
//! the order write commits, on their own tasks. A failing or panicking
//! effect is logged and never reaches the caller of the transition.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone, Default)]
pub struct EffectRunner {
    tracker: TaskTracker,
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl EffectRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `future` in the background, logging its error or panic
    ///
    /// `subject` identifies what the effect is about (usually the order ID).
    pub fn spawn<F>(&self, effect: &'static str, subject: impl Into<String>, future: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let subject = subject.into();
        self.tracker.spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => {
                    tracing::debug!(effect, subject = %subject, "Side effect completed");
                }
                Ok(Err(e)) => {
                    tracing::warn!(effect, subject = %subject, error = %e, "Side effect failed");
                }
                Err(panic) => {
                    tracing::error!(
                        effect,
                        subject = %subject,
                        panic = %panic_message(panic.as_ref()),
                        "Side effect panicked"
                    );
                }
            }
        });
    }

    /// Effects still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every effect has finished, including effects spawned by
    /// effects, then accept new ones again
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Wait for running effects and stay closed
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Side effect runner drained");
    }
}
