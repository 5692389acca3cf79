//! # Task Execution
//!
//! A generic map over independent tasks with per-task error capture. A failing or
//! panicking task is recorded next to its input and never aborts its siblings.
//!
//! | Executor | Scheduling |
//! |----------|------------|
//! | [`SerialExecutor`] | one task after another on the calling thread |
//! | [`ParallelExecutor`] | a dedicated rayon pool with a fixed worker count |
//!
//! [`run`](Executor::run) blocks until every task has finished. Results keep the order
//! of the input tasks regardless of completion order.

#[cfg(test)]
mod tests;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Why a task did not produce an output.
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    /// The task returned an error
    #[error("{0}")]
    Failed(E),

    /// The task panicked
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Outcome of one [`Executor::run`].
#[derive(Debug)]
pub struct ExecutionResult<T, O, E> {
    /// Outputs of successful tasks, in task order
    pub successes: Vec<O>,
    /// Failed tasks with their error, in task order
    pub failures: Vec<(T, TaskError<E>)>,
}

impl<T, O, E> ExecutionResult<T, O, E> {
    fn from_outcomes(outcomes: Vec<(T, Result<O, TaskError<E>>)>) -> Self {
        let mut result = Self {
            successes: Vec::new(),
            failures: Vec::new(),
        };
        for (task, outcome) in outcomes {
            match outcome {
                Ok(output) => result.successes.push(output),
                Err(err) => result.failures.push((task, err)),
            }
        }
        result
    }

    /// True if no task failed.
    pub fn all_successful(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of successful tasks.
    pub fn num_successes(&self) -> usize {
        self.successes.len()
    }

    /// Number of failed tasks.
    pub fn num_failures(&self) -> usize {
        self.failures.len()
    }
}

/// Runs a function over a list of tasks.
pub trait Executor: Send + Sync {
    /// Apply `f` to every task and collect outputs and failures.
    fn run<T, O, E, F>(&self, tasks: Vec<T>, f: F) -> ExecutionResult<T, O, E>
    where
        T: fmt::Debug + Send + Sync,
        O: Send,
        E: fmt::Display + Send,
        F: Fn(&T) -> Result<O, E> + Send + Sync;
}

/// Runs tasks one after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

impl Executor for SerialExecutor {
    fn run<T, O, E, F>(&self, tasks: Vec<T>, f: F) -> ExecutionResult<T, O, E>
    where
        T: fmt::Debug + Send + Sync,
        O: Send,
        E: fmt::Display + Send,
        F: Fn(&T) -> Result<O, E> + Send + Sync,
    {
        let outcomes = tasks
            .into_iter()
            .map(|task| {
                let outcome = run_task(&task, &f);
                (task, outcome)
            })
            .collect();
        ExecutionResult::from_outcomes(outcomes)
    }
}

/// Runs tasks on a dedicated rayon thread pool.
#[derive(Debug, Clone, Copy)]
pub struct ParallelExecutor {
    workers: usize,
}

impl ParallelExecutor {
    /// Executor with `workers` threads (at least one).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Worker thread count.
    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Executor for ParallelExecutor {
    fn run<T, O, E, F>(&self, tasks: Vec<T>, f: F) -> ExecutionResult<T, O, E>
    where
        T: fmt::Debug + Send + Sync,
        O: Send,
        E: fmt::Display + Send,
        F: Fn(&T) -> Result<O, E> + Send + Sync,
    {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("scatlas-worker-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Cannot start {} worker threads ({}), running serially", self.workers, e);
                return SerialExecutor.run(tasks, f);
            }
        };

        debug!("Running {} tasks on {} workers", tasks.len(), self.workers);
        let outcomes: Vec<Result<O, TaskError<E>>> =
            pool.install(|| tasks.par_iter().map(|task| run_task(task, &f)).collect());
        ExecutionResult::from_outcomes(tasks.into_iter().zip(outcomes).collect())
    }
}

/// How parallel stages are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorMode {
    /// [`SerialExecutor`]
    Serial,
    /// [`ParallelExecutor`]
    #[default]
    Parallel,
}

/// Executor selected at runtime.
#[derive(Debug, Clone, Copy)]
pub enum AnyExecutor {
    /// Serial execution
    Serial(SerialExecutor),
    /// Thread pool execution
    Parallel(ParallelExecutor),
}

impl AnyExecutor {
    /// Build the executor for a mode and worker count. One worker always runs serially.
    pub fn new(mode: ExecutorMode, workers: usize) -> Self {
        match mode {
            ExecutorMode::Parallel if workers > 1 => Self::Parallel(ParallelExecutor::new(workers)),
            _ => Self::Serial(SerialExecutor),
        }
    }
}

impl Executor for AnyExecutor {
    fn run<T, O, E, F>(&self, tasks: Vec<T>, f: F) -> ExecutionResult<T, O, E>
    where
        T: fmt::Debug + Send + Sync,
        O: Send,
        E: fmt::Display + Send,
        F: Fn(&T) -> Result<O, E> + Send + Sync,
    {
        match self {
            Self::Serial(executor) => executor.run(tasks, f),
            Self::Parallel(executor) => executor.run(tasks, f),
        }
    }
}

/// Per-task setup and teardown: a labeled log line at start and finish with the
/// elapsed time.
#[derive(Debug)]
pub struct TaskScope {
    label: String,
    started: Instant,
}

impl TaskScope {
    /// Open a scope for the task `label`.
    pub fn begin(label: impl Into<String>) -> Self {
        let label = label.into();
        debug!("[{}] started", label);
        Self {
            label,
            started: Instant::now(),
        }
    }

    /// Task label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Close the scope with the task's outcome.
    pub fn finish(self, failure: Option<&dyn fmt::Display>) {
        let elapsed = self.started.elapsed();
        match failure {
            None => info!("[{}] finished in {:.2?}", self.label, elapsed),
            Some(err) => error!("[{}] failed after {:.2?}: {}", self.label, elapsed, err),
        }
    }
}

fn run_task<T, O, E, F>(task: &T, f: &F) -> Result<O, TaskError<E>>
where
    T: fmt::Debug,
    E: fmt::Display,
    F: Fn(&T) -> Result<O, E>,
{
    let scope = TaskScope::begin(format!("{task:?}"));
    match panic::catch_unwind(AssertUnwindSafe(|| f(task))) {
        Ok(Ok(output)) => {
            scope.finish(None);
            Ok(output)
        }
        Ok(Err(err)) => {
            scope.finish(Some(&err));
            Err(TaskError::Failed(err))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            scope.finish(Some(&message));
            Err(TaskError::Panicked(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
