//! The OS-thread pool that drives the dispatch engine continuously.
//! One shared `Engine` behind a `Mutex`, woken by a `Condvar` the
//! instant a task is submitted rather than on a poll interval — the
//! same two-primitive idiom used throughout the pack's worker loops,
//! generalized here to the full agent fan-out. `AGENT_THREAD_COUNT`
//! worker threads contend for the lock only long enough to pop a task
//! or report one; the blocking RPC itself runs with no lock held, so
//! multiple sends are genuinely concurrent despite the single engine.

use crate::engine::{DispatchResult, Engine};
use crate::task::Task;
use crate::transport::Transport;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const WDOG_POLL: Duration = Duration::from_secs(2);
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

struct Shared {
    engine: Mutex<Engine>,
    shutdown: Mutex<bool>,
    wake: Condvar,
}

/// A running fan-out pool. Dropping this without calling `shutdown`
/// leaves the worker threads running in the background; callers that
/// want a clean stop should call `shutdown` explicitly.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    watchdog_handle: Option<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        engine: Engine,
        thread_count: usize,
        transport: Arc<dyn Transport>,
        on_outcome: impl Fn(Task, DispatchResult) + Send + Sync + 'static,
    ) -> WorkerPool {
        let shared = Arc::new(Shared {
            engine: Mutex::new(engine),
            shutdown: Mutex::new(false),
            wake: Condvar::new(),
        });
        let on_outcome = Arc::new(on_outcome);

        let mut handles = Vec::new();
        for _ in 0..thread_count.max(1) {
            let shared = shared.clone();
            let transport = transport.clone();
            let on_outcome = on_outcome.clone();
            handles.push(std::thread::spawn(move || worker_loop(shared, transport, on_outcome)));
        }

        let watchdog_shared = shared.clone();
        let watchdog_handle = std::thread::spawn(move || watchdog_loop(watchdog_shared));

        WorkerPool { shared, handles, watchdog_handle: Some(watchdog_handle) }
    }

    pub fn submit(&self, task: Task) {
        {
            let mut engine = self.shared.engine.lock().unwrap();
            engine.submit(task);
        }
        self.shared.wake.notify_all();
    }

    pub fn cancel(&self, job_id: u64) {
        self.shared.engine.lock().unwrap().cancel(job_id);
        self.shared.wake.notify_all();
    }

    pub fn shutdown(mut self) {
        *self.shared.shutdown.lock().unwrap() = true;
        self.shared.wake.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.watchdog_handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, transport: Arc<dyn Transport>, on_outcome: Arc<dyn Fn(Task, DispatchResult) + Send + Sync>) {
    loop {
        let task = {
            let mut engine = shared.engine.lock().unwrap();
            engine.pop_ready(now_ms())
        };

        let Some(task) = task else {
            let guard = shared.shutdown.lock().unwrap();
            if *guard {
                return;
            }
            let (guard, _) = shared.wake.wait_timeout(guard, WDOG_POLL).unwrap();
            if *guard {
                return;
            }
            continue;
        };

        {
            let mut engine = shared.engine.lock().unwrap();
            engine.arm_watchdog(&task.node, now_ms() + COMMAND_TIMEOUT.as_millis() as u64);
        }

        let envelope = latticed_wire::Envelope::encode(&task.body, Vec::new());
        let reply = match envelope {
            Ok(env) => transport.send(&task.node, &env, COMMAND_TIMEOUT),
            Err(err) => Err(err),
        };

        let (task, outcome) = {
            let mut engine = shared.engine.lock().unwrap();
            engine.disarm_watchdog(&task.node);
            engine.report(task, reply, now_ms())
        };
        on_outcome(task, outcome);
    }
}

fn watchdog_loop(shared: Arc<Shared>) {
    loop {
        {
            let guard = shared.shutdown.lock().unwrap();
            if *guard {
                return;
            }
        }
        std::thread::sleep(WDOG_POLL);
        let stuck = {
            let mut engine = shared.engine.lock().unwrap();
            engine.watchdog_sweep(now_ms())
        };
        for node in stuck {
            tracing::warn!(node = %node, "node past command timeout with no recorded reply");
        }
    }
}
