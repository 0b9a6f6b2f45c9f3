// JobRunner: runs an ordered task list on a dedicated thread, racing its
// completion against a deadline fixed at construction. Interrupts are polled
// between tasks, so a task that has started always runs to the end.

use crate::constants::{FAR_FUTURE, TRACE_COMPONENT};
use crate::errors::RunnerError;
use crate::interrupt::{
    InterruptReason, InterruptSource, ManualInterrupt, SignalInterrupt, Subscription,
};
use crate::settings::JobRunnerSettings;

use job_runner_sdk::{TraceWriter, TracingTraceWriter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A unit of work. It receives its 0-based position in the run.
pub type Task = Box<dyn FnOnce(usize) + Send + 'static>;

/// What the task thread reports: the run result, or the payload of a task panic.
type Completion = thread::Result<Result<(), RunnerError>>;

const TASK_THREAD_NAME: &str = "job-runner-tasks";

/// Runs tasks in insertion order until they finish, the deadline passes, or
/// an interrupt arrives, and reports exactly one of those outcomes.
///
/// ```no_run
/// # async fn demo() {
/// use job_runner::{JobRunner, RunnerError};
/// use std::time::Duration;
///
/// let mut runner = JobRunner::new(Duration::from_secs(10));
/// runner.add(|id| println!("task #{id}"));
/// match runner.start().await {
///     Ok(()) => {}
///     Err(RunnerError::Timeout) => std::process::exit(1),
///     Err(RunnerError::Interrupted { .. }) => std::process::exit(2),
/// }
/// # }
/// ```
///
/// `start` takes the runner by value: tasks cannot be added once a run has
/// begun and a runner cannot be started twice.
pub struct JobRunner {
    tasks: Vec<Task>,
    deadline: Instant,
    interrupts: Arc<dyn InterruptSource>,
    trace: Arc<dyn TraceWriter>,
}

impl JobRunner {
    /// Create a runner whose deadline is `timeout` from now.
    ///
    /// The clock starts here, not at `start`. OS signals (SIGINT/SIGTERM) are
    /// the default interrupt source.
    pub fn new(timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE);
        Self {
            tasks: Vec::new(),
            deadline,
            interrupts: Arc::new(SignalInterrupt::new()),
            trace: Arc::new(TracingTraceWriter::new(TRACE_COMPONENT)),
        }
    }

    /// Create a runner from settings. With signal handling disabled the run
    /// can only succeed or time out.
    pub fn from_settings(settings: &JobRunnerSettings) -> Self {
        let runner = Self::new(settings.timeout());
        if settings.handle_signals {
            runner
        } else {
            runner.with_interrupt_source(Arc::new(ManualInterrupt::new()))
        }
    }

    /// Replace the interrupt source.
    pub fn with_interrupt_source(mut self, interrupts: Arc<dyn InterruptSource>) -> Self {
        self.interrupts = interrupts;
        self
    }

    /// Replace the trace writer.
    pub fn with_trace(mut self, trace: Arc<dyn TraceWriter>) -> Self {
        self.trace = trace;
        self
    }

    /// Append a task.
    pub fn add<F>(&mut self, task: F) -> &mut Self
    where
        F: FnOnce(usize) + Send + 'static,
    {
        self.tasks.push(Box::new(task));
        self
    }

    /// Append zero or more tasks, keeping their order.
    pub fn add_tasks<I>(&mut self, tasks: I) -> &mut Self
    where
        I: IntoIterator<Item = Task>,
    {
        self.tasks.extend(tasks);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The instant after which the run is reported as timed out.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Run all tasks and report the outcome.
    ///
    /// Subscribes to the interrupt source (earlier interrupts are not seen),
    /// runs the tasks on a dedicated thread and waits for whichever comes
    /// first: the task sequence finishing or the deadline. On timeout the
    /// task thread is detached rather than cancelled; it keeps going until
    /// it finishes or sees an interrupt, and its result is dropped. The
    /// thread is not owned by the Tokio runtime, so shutting the runtime
    /// down does not wait for it.
    ///
    /// If the sequence finishes at the same moment the deadline passes,
    /// either outcome may be reported.
    ///
    /// A panic inside a task is not caught here; it resumes on the caller.
    pub async fn start(self) -> Result<(), RunnerError> {
        let JobRunner {
            tasks,
            deadline,
            interrupts,
            trace,
        } = self;

        let subscription = interrupts.subscribe();
        trace.info(&format!(
            "Starting {} task(s), {:.3}s until deadline",
            tasks.len(),
            deadline.saturating_duration_since(Instant::now()).as_secs_f64()
        ));

        let (completion_tx, completion_rx) = oneshot::channel::<Completion>();
        let worker_trace = Arc::clone(&trace);
        let spawned = thread::Builder::new()
            .name(TASK_THREAD_NAME.to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_tasks(tasks, subscription, worker_trace.as_ref())
                }));
                // Nobody is listening any more after a timeout.
                let _ = completion_tx.send(outcome);
            });
        if let Err(e) = spawned {
            trace.error(&format!("Failed to start the task thread: {}", e));
            return Err(RunnerError::Interrupted {
                reason: InterruptReason::WorkerLost,
            });
        }

        tokio::select! {
            completed = completion_rx => match completed {
                Ok(Ok(result)) => {
                    if result.is_ok() {
                        trace.info("All tasks completed");
                    }
                    result
                }
                Ok(Err(payload)) => panic::resume_unwind(payload),
                Err(_) => {
                    trace.warning("Task thread exited without reporting a result");
                    Err(RunnerError::Interrupted {
                        reason: InterruptReason::WorkerLost,
                    })
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                trace.warning("Deadline elapsed, abandoning remaining tasks");
                Err(RunnerError::Timeout)
            }
        }
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("tasks", &self.tasks.len())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Runs on the task thread. Checks for an interrupt before every task.
fn run_tasks(
    tasks: Vec<Task>,
    mut interrupts: Subscription,
    trace: &dyn TraceWriter,
) -> Result<(), RunnerError> {
    let total = tasks.len();
    for (id, task) in tasks.into_iter().enumerate() {
        if let Some(reason) = interrupts.poll() {
            trace.warning(&format!(
                "Interrupt received ({}), skipping tasks #{} to #{}",
                reason,
                id,
                total - 1
            ));
            return Err(RunnerError::Interrupted { reason });
        }
        trace.verbose(&format!("Running task #{}", id));
        task(id);
    }
    interrupts.unsubscribe();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_runner_sdk::{CollectingTraceWriter, NullTraceWriter, TraceLevel};
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<usize>>>;

    fn quiet_runner(timeout: Duration, interrupts: &ManualInterrupt) -> JobRunner {
        JobRunner::new(timeout)
            .with_interrupt_source(Arc::new(interrupts.clone()))
            .with_trace(Arc::new(NullTraceWriter))
    }

    /// Sleeps `id * unit`, then records its id.
    fn sleeping_task(log: &Log, unit: Duration) -> Task {
        let log = Arc::clone(log);
        Box::new(move |id| {
            std::thread::sleep(unit * id as u32);
            log.lock().push(id);
        })
    }

    fn sleeping_tasks(log: &Log, unit: Duration, count: usize) -> Vec<Task> {
        (0..count).map(|_| sleeping_task(log, unit)).collect()
    }

    #[tokio::test]
    async fn test_all_tasks_complete_in_order() {
        let log: Log = Arc::default();
        let interrupts = ManualInterrupt::new();
        let mut runner = quiet_runner(Duration::from_secs(5), &interrupts);
        runner.add_tasks(sleeping_tasks(&log, Duration::from_millis(20), 3));

        let started = Instant::now();
        assert_eq!(runner.start().await, Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_empty_runner_succeeds() {
        let interrupts = ManualInterrupt::new();
        let runner = quiet_runner(Duration::from_secs(1), &interrupts);
        assert!(runner.is_empty());
        assert_eq!(runner.start().await, Ok(()));
    }

    #[tokio::test]
    async fn test_timeout_returns_at_deadline_and_detaches() {
        let log: Log = Arc::default();
        let interrupts = ManualInterrupt::new();
        let mut runner = quiet_runner(Duration::from_millis(100), &interrupts);
        // Tasks take 0ms, 300ms and 600ms.
        runner.add_tasks(sleeping_tasks(&log, Duration::from_millis(300), 3));

        let deadline = runner.deadline();
        let started = Instant::now();
        assert_eq!(runner.start().await, Err(RunnerError::Timeout));
        assert!(Instant::now() >= deadline);
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(280), "waited {:?}", elapsed);
        assert_eq!(*log.lock(), vec![0]);

        // The abandoned sequence keeps running to its natural end.
        tokio::time::sleep_until(started + Duration::from_millis(1500)).await;
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_timed_out_tasks_do_not_block_runtime_shutdown() {
        let interrupts = ManualInterrupt::new();
        let mut runner = quiet_runner(Duration::from_millis(50), &interrupts);
        runner.add(|_| std::thread::sleep(Duration::from_secs(3)));

        let runtime = tokio::runtime::Runtime::new().unwrap();
        assert_eq!(runtime.block_on(runner.start()), Err(RunnerError::Timeout));

        let dropping = std::time::Instant::now();
        drop(runtime);
        let waited = dropping.elapsed();
        assert!(waited < Duration::from_secs(1), "runtime drop took {:?}", waited);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigint_interrupts_runner_with_default_source() {
        use crate::interrupt::SIGNAL_TEST_LOCK;
        use nix::sys::signal::{raise, Signal};

        let _serial = SIGNAL_TEST_LOCK.lock();
        let log: Log = Arc::default();
        let mut runner = JobRunner::new(Duration::from_secs(5)).with_trace(Arc::new(NullTraceWriter));

        let first_log = Arc::clone(&log);
        runner.add(move |id| {
            first_log.lock().push(id);
            raise(Signal::SIGINT).unwrap();
            // Leave the forwarding task time to deliver the signal.
            std::thread::sleep(Duration::from_millis(300));
        });
        runner.add_tasks(sleeping_tasks(&log, Duration::ZERO, 2));

        assert_eq!(
            runner.start().await,
            Err(RunnerError::Interrupted {
                reason: InterruptReason::UserCancelled
            })
        );
        assert_eq!(*log.lock(), vec![0]);
    }

    #[tokio::test]
    async fn test_deadline_is_fixed_at_construction() {
        let log: Log = Arc::default();
        let interrupts = ManualInterrupt::new();
        let mut runner = quiet_runner(Duration::from_millis(100), &interrupts);
        runner.add(move |_| std::thread::sleep(Duration::from_millis(200)));
        runner.add_tasks(sleeping_tasks(&log, Duration::ZERO, 1));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(runner.start().await, Err(RunnerError::Timeout));
    }

    #[tokio::test]
    async fn test_interrupt_between_tasks_stops_the_rest() {
        let log: Log = Arc::default();
        let interrupts = ManualInterrupt::new();
        let mut runner = quiet_runner(Duration::from_secs(5), &interrupts);

        let first_log = Arc::clone(&log);
        let handle = interrupts.clone();
        runner.add(move |id| {
            first_log.lock().push(id);
            assert!(handle.interrupt());
        });
        runner.add_tasks(sleeping_tasks(&log, Duration::ZERO, 2));

        assert_eq!(
            runner.start().await,
            Err(RunnerError::Interrupted {
                reason: InterruptReason::Requested
            })
        );
        assert_eq!(*log.lock(), vec![0]);
        // The subscription is gone once the interrupt was consumed.
        assert_eq!(interrupts.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_while_task_runs_lets_it_finish() {
        let log: Log = Arc::default();
        let interrupts = ManualInterrupt::new();
        let mut runner = quiet_runner(Duration::from_secs(10), &interrupts);

        let first_log = Arc::clone(&log);
        runner.add(move |id| {
            std::thread::sleep(Duration::from_millis(200));
            first_log.lock().push(id);
        });
        runner.add_tasks(sleeping_tasks(&log, Duration::from_millis(50), 2));

        let handle = interrupts.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.interrupt_with(InterruptReason::UserCancelled);
        });

        let result = runner.start().await;
        assert_eq!(
            result,
            Err(RunnerError::Interrupted {
                reason: InterruptReason::UserCancelled
            })
        );
        assert_eq!(result.unwrap_err().exit_code(), 2);
        assert_eq!(*log.lock(), vec![0]);
    }

    #[tokio::test]
    async fn test_interrupt_before_start_is_ignored() {
        let log: Log = Arc::default();
        let interrupts = ManualInterrupt::new();
        let mut runner = quiet_runner(Duration::from_secs(5), &interrupts);
        runner.add_tasks(sleeping_tasks(&log, Duration::ZERO, 3));

        assert!(!interrupts.interrupt());
        assert_eq!(runner.start().await, Ok(()));
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_interrupt_during_last_task_still_succeeds() {
        let log: Log = Arc::default();
        let interrupts = ManualInterrupt::new();
        let mut runner = quiet_runner(Duration::from_secs(5), &interrupts);
        runner.add_tasks(sleeping_tasks(&log, Duration::ZERO, 1));

        let handle = interrupts.clone();
        let last_log = Arc::clone(&log);
        runner.add(move |id| {
            handle.interrupt();
            last_log.lock().push(id);
        });

        assert_eq!(runner.start().await, Ok(()));
        assert_eq!(*log.lock(), vec![0, 1]);
    }

    #[tokio::test]
    #[should_panic(expected = "task exploded")]
    async fn test_task_panic_reaches_caller() {
        let interrupts = ManualInterrupt::new();
        let mut runner = quiet_runner(Duration::from_secs(5), &interrupts);
        runner.add(|_| panic!("task exploded"));
        let _ = runner.start().await;
    }

    #[tokio::test]
    async fn test_trace_output() {
        let trace = Arc::new(CollectingTraceWriter::new());
        let interrupts = ManualInterrupt::new();
        let mut runner = JobRunner::new(Duration::from_secs(5))
            .with_interrupt_source(Arc::new(interrupts.clone()))
            .with_trace(trace.clone());
        runner.add(|_| {}).add(|_| {});

        assert_eq!(runner.start().await, Ok(()));
        assert!(trace.contains("Starting 2 task(s)"));
        assert_eq!(
            trace.messages_at(TraceLevel::Verbose),
            vec!["Running task #0", "Running task #1"]
        );
        assert!(trace
            .messages_at(TraceLevel::Info)
            .contains(&"All tasks completed".to_string()));
    }

    #[tokio::test]
    async fn test_trace_output_on_timeout_and_interrupt() {
        let trace = Arc::new(CollectingTraceWriter::new());
        let interrupts = ManualInterrupt::new();
        let mut runner = JobRunner::new(Duration::from_millis(20))
            .with_interrupt_source(Arc::new(interrupts.clone()))
            .with_trace(trace.clone());
        runner.add(|_| std::thread::sleep(Duration::from_millis(200)));
        assert_eq!(runner.start().await, Err(RunnerError::Timeout));
        assert!(trace
            .messages_at(TraceLevel::Warning)
            .iter()
            .any(|m| m.contains("Deadline elapsed")));

        trace.clear();
        let mut runner = JobRunner::new(Duration::from_secs(5))
            .with_interrupt_source(Arc::new(interrupts.clone()))
            .with_trace(trace.clone());
        let handle = interrupts.clone();
        runner.add(move |_| {
            handle.interrupt();
        });
        runner.add(|_| {}).add(|_| {});
        assert!(runner.start().await.is_err());
        assert!(trace.contains("Interrupt received (Requested), skipping tasks #1 to #2"));
    }

    #[tokio::test]
    async fn test_from_settings_without_signals() {
        let settings = JobRunnerSettings {
            timeout_seconds: 2,
            handle_signals: false,
        };
        let log: Log = Arc::default();
        let mut runner = JobRunner::from_settings(&settings).with_trace(Arc::new(NullTraceWriter));
        assert!(runner.deadline() > Instant::now() + Duration::from_secs(1));
        runner.add_tasks(sleeping_tasks(&log, Duration::ZERO, 2));

        assert_eq!(runner.start().await, Ok(()));
        assert_eq!(*log.lock(), vec![0, 1]);
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let runner = JobRunner::new(Duration::MAX);
        assert!(runner.deadline() > Instant::now() + Duration::from_secs(86_400));
    }

    #[test]
    fn test_add_preserves_order_and_counts() {
        let mut runner = JobRunner::new(Duration::from_secs(1));
        assert_eq!(runner.len(), 0);
        runner.add(|_| {});
        runner.add_tasks(Vec::new());
        runner.add_tasks(vec![Box::new(|_| {}) as Task, Box::new(|_| {})]);
        assert_eq!(runner.len(), 3);
        assert!(!runner.is_empty());
        assert!(format!("{:?}", runner).contains("tasks: 3"));
    }
}
