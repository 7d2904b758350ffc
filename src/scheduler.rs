use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

const DROP_GRACE: Duration = Duration::from_millis(200);

/// A named thread that runs `tick` every `interval` until stopped.
pub struct PeriodicTask {
    name: String,
    stop_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                            error!(task = %thread_name, "periodic task panicked; continuing");
                        }
                    }
                    // Explicit stop or the handle was dropped.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            let _ = done_tx.send(());
        })?;
        debug!(task = %name, ?interval, "periodic task started");
        Ok(Self { name, stop_tx: Some(stop_tx), done_rx, handle: Some(handle) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signals the task and waits up to `grace`. A task still running after
    /// that is detached; returns whether it finished in time.
    pub fn stop(&mut self, grace: Duration) -> bool {
        let Some(stop_tx) = self.stop_tx.take() else { return true };
        let _ = stop_tx.try_send(());
        drop(stop_tx);
        let finished = self.done_rx.recv_timeout(grace).is_ok();
        match self.handle.take() {
            Some(handle) if finished => {
                if handle.join().is_err() {
                    warn!(task = %self.name, "periodic task thread panicked during shutdown");
                }
            }
            Some(_) => warn!(task = %self.name, ?grace, "periodic task did not stop in time; detaching"),
            None => {}
        }
        finished
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop(DROP_GRACE);
    }
}
