use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// A unit of long-running work the runner can execute off the caller's thread
pub trait Task: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;
    type Progress: Send + 'static;

    fn name(&self) -> &str;

    /// Must poll `ctx.cancel_flag()` at its own safe points
    fn run(&self, input: Self::Input, ctx: &TaskContext<Self::Progress>) -> Self::Output;
}

/// Progress channel and cancellation flag handed to a running task
pub struct TaskContext<P> {
    progress: Sender<P>,
    cancel: Arc<AtomicBool>,
}

impl<P> TaskContext<P> {
    pub fn new(progress: Sender<P>, cancel: Arc<AtomicBool>) -> Self {
        Self { progress, cancel }
    }

    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }

    /// Send a progress message; a dropped receiver is not an error
    pub fn report(&self, message: P) {
        let _ = self.progress.send(message);
    }
}

/// Outcome of [`TaskRunner::start`]
#[derive(Debug)]
pub enum StartStatus<P> {
    /// Worker spawned; progress arrives on the receiver
    Started(Receiver<P>),
    /// Another run is still active, nothing was spawned
    AlreadyRunning,
    /// The OS refused to create the worker thread
    SpawnFailed(String),
}

impl<P> StartStatus<P> {
    pub fn is_started(&self) -> bool {
        matches!(self, StartStatus::Started(_))
    }
}

struct ActiveRun<O> {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<O>,
}

/// Clears the running flag when the worker exits, panics included
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs one instance of a task at a time on a dedicated thread.
///
/// Shareable across threads (`&self` API); a `start` while a run is active
/// returns [`StartStatus::AlreadyRunning`].
///
/// The `running` flag only turns on while the `active` lock is held and the
/// run is stored before the lock is released, so whoever sees the flag set
/// under that lock also sees its run.
pub struct TaskRunner<T: Task> {
    task: Arc<T>,
    running: Arc<AtomicBool>,
    active: Mutex<Option<ActiveRun<T::Output>>>,
}

impl<T: Task> TaskRunner<T> {
    pub fn new(task: T) -> Self {
        Self {
            task: Arc::new(task),
            running: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveRun<T::Output>>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start(&self, input: T::Input) -> StartStatus<T::Progress> {
        let mut active = self.active();
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("{} already running, start request rejected", self.task.name());
            return StartStatus::AlreadyRunning;
        }

        let (tx, rx) = channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let guard = RunningGuard(self.running.clone());
        let task = self.task.clone();
        let ctx = TaskContext::new(tx, cancel.clone());

        let spawned = thread::Builder::new()
            .name(format!("{}-worker", task.name()))
            .spawn(move || {
                let _guard = guard;
                info!("Background thread started for {}", task.name());
                let output = task.run(input, &ctx);
                info!("Background thread finished {}", task.name());
                output
            });

        match spawned {
            Ok(handle) => {
                if active.replace(ActiveRun { cancel, handle }).is_some() {
                    debug!("Previous {} run finished without being waited on", self.task.name());
                }
                StartStatus::Started(rx)
            }
            Err(e) => {
                error!("Failed to spawn worker for {}: {}", self.task.name(), e);
                self.running.store(false, Ordering::Release);
                StartStatus::SpawnFailed(e.to_string())
            }
        }
    }

    /// Ask the active run to stop at its next safe point.
    /// Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        let active = self.active();
        match active.as_ref() {
            Some(run) if self.is_running() => {
                info!("User requested {} cancellation", self.task.name());
                run.cancel.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Block until the last started run finishes and take its output.
    /// `None` if nothing was started or the worker panicked.
    pub fn wait(&self) -> Option<T::Output> {
        let run = self.active().take()?;
        match run.handle.join() {
            Ok(output) => Some(output),
            Err(_) => {
                error!("{} worker panicked", self.task.name());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::time::Duration;

    /// Counts to `input`, optionally parking on a barrier before finishing
    struct Counter {
        gate: Option<Arc<Barrier>>,
    }

    impl Task for Counter {
        type Input = usize;
        type Output = usize;
        type Progress = usize;

        fn name(&self) -> &str {
            "counter"
        }

        fn run(&self, input: usize, ctx: &TaskContext<usize>) -> usize {
            if let Some(gate) = &self.gate {
                gate.wait();
            }
            let mut done = 0;
            for i in 0..input {
                if ctx.cancel_flag().load(Ordering::Relaxed) {
                    break;
                }
                ctx.report(i);
                done += 1;
            }
            done
        }
    }

    #[test]
    fn test_runs_and_reports_in_order() {
        let runner = TaskRunner::new(Counter { gate: None });
        let StartStatus::Started(rx) = runner.start(5) else {
            panic!("runner should start");
        };
        assert_eq!(runner.wait(), Some(5));
        let progress: Vec<usize> = rx.try_iter().collect();
        assert_eq!(progress, vec![0, 1, 2, 3, 4]);
        assert!(!runner.is_running());
    }

    #[test]
    fn test_second_start_is_rejected_while_running() {
        let gate = Arc::new(Barrier::new(2));
        let runner = TaskRunner::new(Counter {
            gate: Some(gate.clone()),
        });

        assert!(runner.start(3).is_started());
        assert!(runner.is_running());
        assert!(matches!(runner.start(3), StartStatus::AlreadyRunning));

        gate.wait();
        assert_eq!(runner.wait(), Some(3));
    }

    #[test]
    fn test_cancel_stops_the_run() {
        let gate = Arc::new(Barrier::new(2));
        let runner = TaskRunner::new(Counter {
            gate: Some(gate.clone()),
        });
        assert!(!runner.cancel());

        assert!(runner.start(1_000).is_started());
        assert!(runner.cancel());
        gate.wait();
        assert_eq!(runner.wait(), Some(0));
    }

    #[test]
    fn test_cancel_right_after_start_is_never_lost() {
        let gate = Arc::new(Barrier::new(2));
        let runner = Arc::new(TaskRunner::new(Counter {
            gate: Some(gate.clone()),
        }));

        for _ in 0..20 {
            let starter = {
                let runner = runner.clone();
                thread::spawn(move || runner.start(1_000).is_started())
            };
            // Whenever the flag is visible, the run behind it must be cancellable
            loop {
                if runner.is_running() {
                    assert!(runner.cancel());
                    break;
                }
                thread::yield_now();
            }
            assert!(starter.join().unwrap());
            gate.wait();
            assert_eq!(runner.wait(), Some(0));
        }
    }

    #[test]
    fn test_flag_clears_after_completion() {
        let runner = TaskRunner::new(Counter { gate: None });
        assert!(runner.start(2).is_started());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while runner.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!runner.is_running());
        assert!(runner.start(2).is_started());
        assert_eq!(runner.wait(), Some(2));
    }
}
