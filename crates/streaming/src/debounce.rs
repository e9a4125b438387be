use std::time::Duration;

use runtime::debounce::Debouncer;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Async driver for [`Debouncer`].
///
/// `notify` never blocks and may be called from any thread. The settle
/// callback runs on the scheduler's own task, at most once per burst, with
/// the last value of the burst. Dropping or shutting down the scheduler
/// discards a pending value without firing it.
pub struct DebounceScheduler<T> {
    tx: mpsc::UnboundedSender<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> DebounceScheduler<T> {
    /// Starts the scheduler task. Must be called from within a tokio runtime.
    pub fn spawn<F>(quiet: Duration, mut on_settle: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let task = tokio::spawn(async move {
            let mut debouncer = Debouncer::new(quiet);
            loop {
                let deadline = debouncer.deadline();
                tokio::select! {
                    msg = rx.recv() => match msg {
                        Some(value) => {
                            debouncer.notify(value, Instant::now().into_std());
                        }
                        None => break,
                    },
                    _ = sleep_until(deadline) => {
                        if let Some(value) = debouncer.poll(Instant::now().into_std()) {
                            on_settle(value);
                        }
                    }
                }
            }
            if debouncer.cancel().is_some() {
                tracing::debug!("debounce scheduler closed with a pending value");
            }
        });
        Self { tx, task }
    }

    /// Records `value` as the latest of the current burst. Returns `false` if
    /// the scheduler has shut down.
    pub fn notify(&self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    /// Stops the scheduler; a pending value is dropped without firing.
    pub fn shutdown(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<T> Drop for DebounceScheduler<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
