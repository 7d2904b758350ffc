use crate::boundary::{BlockBuffer, Channel};
use crate::scheduler::PeriodicTask;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Receives each completed block of a source, in completion order.
pub type Dispatch = Arc<dyn Fn(&str, String) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub max_block_bytes: usize,
    pub idle_timeout: Duration,
    pub check_interval: Duration,
    pub dispose_grace: Duration,
}

struct SourceState {
    name: String,
    buffer: Mutex<BlockBuffer>,
    active: AtomicBool,
    dispatch: Dispatch,
}

impl SourceState {
    // Dispatch happens under the buffer lock so completions of one source
    // reach the pool in the order they were cut.
    fn emit(&self, blocks: Vec<String>) {
        for block in blocks {
            (self.dispatch)(&self.name, block);
        }
    }

    fn flush_idle(&self, timeout: Duration) {
        let mut buffer = self.buffer.lock();
        let blocks = buffer.take_if_idle(Instant::now(), timeout);
        if !blocks.is_empty() {
            debug!(source = %self.name, blocks = blocks.len(), "idle timeout flushed pending text");
        }
        self.emit(blocks);
    }
}

/// Boundary detection for one monitored source plus its timeout checker.
pub struct SourceMonitor {
    state: Arc<SourceState>,
    checker: Mutex<Option<PeriodicTask>>,
    dispose_grace: Duration,
}

impl SourceMonitor {
    pub fn start(name: impl Into<String>, config: MonitorConfig, dispatch: Dispatch) -> std::io::Result<Self> {
        let state = Arc::new(SourceState {
            name: name.into(),
            buffer: Mutex::new(BlockBuffer::new(config.max_block_bytes)),
            active: AtomicBool::new(true),
            dispatch,
        });
        let tick_state = state.clone();
        let timeout = config.idle_timeout;
        let checker = PeriodicTask::spawn(
            format!("faultscope-idle-{}", state.name),
            config.check_interval,
            move || tick_state.flush_idle(timeout),
        )?;
        Ok(Self { state, checker: Mutex::new(Some(checker)), dispose_grace: config.dispose_grace })
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Returns `false` once the monitor has been disposed; the chunk is not taken.
    pub fn feed(&self, chunk: &str, channel: Channel) -> bool {
        let mut buffer = self.state.buffer.lock();
        // Checked under the lock so a concurrent dispose cannot strand text.
        if !self.is_active() {
            return false;
        }
        let blocks = buffer.push(chunk, channel);
        self.state.emit(blocks);
        true
    }

    /// Force-flushes pending text without stopping the monitor.
    pub fn flush(&self) {
        let mut buffer = self.state.buffer.lock();
        let blocks = buffer.finish();
        self.state.emit(blocks);
    }

    pub fn has_pending(&self) -> bool {
        self.state.buffer.lock().has_pending()
    }

    /// Stop accepting, flush what is pending, then stop the checker with a
    /// bounded wait. Idempotent.
    pub fn dispose(&self) {
        {
            let mut buffer = self.state.buffer.lock();
            if !self.state.active.swap(false, Ordering::SeqCst) {
                return;
            }
            let blocks = buffer.finish();
            self.state.emit(blocks);
        }
        if let Some(mut checker) = self.checker.lock().take() {
            if !checker.stop(self.dispose_grace) {
                warn!(source = %self.state.name, "idle checker force-cancelled");
            }
        }
        debug!(source = %self.state.name, "source monitor disposed");
    }
}

impl Drop for SourceMonitor {
    fn drop(&mut self) {
        self.dispose();
    }
}
