use ahash::RandomState;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use std::hash::BuildHasher;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// One completed block waiting to be classified.
#[derive(Debug, Clone)]
pub struct Job {
    pub source: String,
    pub text: String,
}

pub type Handler = Arc<dyn Fn(Job) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Queued,
    /// Queue full or pool shut down: ran on the caller's thread.
    Inline,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub submit_wait: Duration,
}

#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn end(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

fn run_guarded(handler: &Handler, job: Job) {
    let source = job.source.clone();
    if catch_unwind(AssertUnwindSafe(|| handler(job))).is_err() {
        error!(source = %source, "block handler panicked; block dropped");
    }
}

/// Fixed lanes of bounded queues, one worker per lane. A source always
/// hashes to the same lane, so its blocks are handled in submit order.
pub struct WorkerPool {
    lanes: RwLock<Vec<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    done_rx: Receiver<()>,
    handler: Handler,
    submit_wait: Duration,
    router: RandomState,
    in_flight: Arc<InFlight>,
    inline_runs: AtomicU64,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, handler: Handler) -> std::io::Result<Self> {
        let workers = config.workers.max(1);
        let in_flight = Arc::new(InFlight::default());
        let (done_tx, done_rx) = bounded::<()>(workers);
        let mut lanes = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let (tx, rx) = bounded::<Job>(config.queue_capacity.max(1));
            let handler = handler.clone();
            let in_flight = in_flight.clone();
            let done_tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("faultscope-worker-{idx}"))
                .spawn(move || {
                    for job in rx.iter() {
                        run_guarded(&handler, job);
                        in_flight.end();
                    }
                    let _ = done_tx.send(());
                })?;
            lanes.push(tx);
            handles.push(handle);
        }
        debug!(workers, capacity = config.queue_capacity, "worker pool started");
        Ok(Self {
            lanes: RwLock::new(lanes),
            handles: Mutex::new(handles),
            done_rx,
            handler,
            submit_wait: config.submit_wait,
            router: RandomState::with_seeds(0x5eed, 0xfa17, 0x5c0e, 0x0b5e),
            in_flight,
            inline_runs: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Never drops a job: waits at most `submit_wait` for queue space, then
    /// runs the job on the calling thread.
    pub fn submit(&self, job: Job) -> Submitted {
        self.in_flight.begin();
        let job = {
            let lanes = self.lanes.read();
            if lanes.is_empty() {
                job
            } else {
                let lane = (self.router.hash_one(job.source.as_str()) % lanes.len() as u64) as usize;
                match lanes[lane].send_timeout(job, self.submit_wait) {
                    Ok(()) => return Submitted::Queued,
                    Err(SendTimeoutError::Timeout(job)) => {
                        warn!(source = %job.source, lane, "worker queue saturated; processing inline");
                        job
                    }
                    Err(SendTimeoutError::Disconnected(job)) => job,
                }
            }
        };
        self.inline_runs.fetch_add(1, Ordering::Relaxed);
        run_guarded(&self.handler, job);
        self.in_flight.end();
        Submitted::Inline
    }

    pub fn inline_runs(&self) -> u64 {
        self.inline_runs.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.count.lock()
    }

    /// Blocks until every submitted job has finished, or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.in_flight.wait_idle(timeout)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the lanes and lets workers drain. Workers still busy after
    /// `grace` are detached. Returns whether all of them finished.
    pub fn shutdown(&self, grace: Duration) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return true;
        }
        let lanes = std::mem::take(&mut *self.lanes.write());
        let expected = lanes.len();
        drop(lanes);

        let deadline = Instant::now() + grace;
        let mut finished = 0;
        while finished < expected {
            let left = deadline.saturating_duration_since(Instant::now());
            if self.done_rx.recv_timeout(left).is_err() {
                break;
            }
            finished += 1;
        }
        let handles = std::mem::take(&mut *self.handles.lock());
        if finished == expected {
            for handle in handles {
                let _ = handle.join();
            }
            debug!(workers = expected, "worker pool stopped");
            true
        } else {
            warn!(finished, expected, ?grace, "worker pool did not drain in time; detaching workers");
            false
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(Duration::from_secs(1));
    }
}
