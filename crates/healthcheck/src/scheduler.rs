//! Repeating background task.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

struct Running {
    stop_signal: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Runs an async job on a fixed period until stopped.
///
/// Runs are awaited in sequence, so one run never overlaps the next; ticks
/// missed while a run is in flight are skipped. The first run happens one
/// period after `start`.
pub struct RepeatingTask {
    name: String,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl RepeatingTask {
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period: period.max(Duration::from_millis(1)),
            running: Mutex::new(None),
        }
    }

    /// Start the loop. Returns false if it is already running.
    pub fn start<F, Fut>(&self, mut job: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let stop_signal = Arc::new(Notify::new());
        let stop = stop_signal.clone();
        let name = self.name.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!(task = %name, "Repeating task run");
                        job().await;
                    }
                    _ = stop.notified() => {
                        info!(task = %name, "Repeating task stopping");
                        break;
                    }
                }
            }
        });

        *running = Some(Running {
            stop_signal,
            handle,
        });
        true
    }

    /// Stop the loop. Returns false if it was not running.
    ///
    /// A run in flight finishes before the loop observes the stop.
    pub fn stop(&self) -> bool {
        match self.running.lock().take() {
            Some(running) => {
                running.stop_signal.notify_one();
                true
            }
            None => false,
        }
    }

    /// Stop and wait for the loop to exit.
    pub async fn stop_and_wait(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.stop_signal.notify_one();
            let _ = running.handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_period() {
        let runs = Arc::new(AtomicU32::new(0));
        let task = RepeatingTask::new("counter", Duration::from_secs(10));

        let counter = runs.clone();
        assert!(task.start(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        task.stop_and_wait().await;
        assert!(!task.is_running());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let task = RepeatingTask::new("noop", Duration::from_secs(1));
        assert!(task.start(|| async {}));
        assert!(!task.start(|| async {}));
        assert!(task.stop());
        assert!(!task.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_runs_never_overlap() {
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));
        let task = RepeatingTask::new("slow", Duration::from_secs(1));

        let (flight, seen) = (in_flight.clone(), max_seen.clone());
        task.start(move || {
            let (flight, seen) = (flight.clone(), seen.clone());
            async move {
                let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2500)).await;
                flight.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(20)).await;
        task.stop_and_wait().await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
