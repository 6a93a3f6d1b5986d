use super::lock::TaskLock;
use thiserror::Error;

/// One submitted work item tagged with its submission index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task<T> {
    index: usize,
    payload: T,
}

impl<T> Task<T> {
    pub fn new(index: usize, payload: T) -> Self {
        Self { index, payload }
    }

    /// Tag every item with its position in `items`.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Vec<Self> {
        items
            .into_iter()
            .enumerate()
            .map(|(index, payload)| Self::new(index, payload))
            .collect()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_parts(self) -> (usize, T) {
        (self.index, self.payload)
    }
}

/// Captured failure of one task's transformation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task {index} failed: {message}")]
pub struct TaskFailure {
    pub index: usize,
    pub message: String,
}

/// Outcome of one task, carrying the task's submission index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult<R> {
    index: usize,
    outcome: Result<R, TaskFailure>,
}

impl<R> TaskResult<R> {
    pub fn success(index: usize, value: R) -> Self {
        Self {
            index,
            outcome: Ok(value),
        }
    }

    /// Record a failure, keeping the whole error chain in the message.
    pub fn failure(index: usize, error: &anyhow::Error) -> Self {
        Self {
            index,
            outcome: Err(TaskFailure {
                index,
                message: format!("{error:#}"),
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn value(&self) -> Option<&R> {
        self.outcome.as_ref().ok()
    }

    pub fn failure_info(&self) -> Option<&TaskFailure> {
        self.outcome.as_ref().err()
    }

    pub fn outcome(&self) -> &Result<R, TaskFailure> {
        &self.outcome
    }

    pub fn into_result(self) -> Result<R, TaskFailure> {
        self.outcome
    }
}

/// What a transformation sees besides its payload
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    index: usize,
    worker_id: usize,
    lock: &'a TaskLock,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(index: usize, worker_id: usize, lock: &'a TaskLock) -> Self {
        Self {
            index,
            worker_id,
            lock,
        }
    }

    /// Submission index of the running task.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Worker running the task; always 0 in serial mode.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// The session's shared lock.
    pub fn lock(&self) -> &'a TaskLock {
        self.lock
    }
}
