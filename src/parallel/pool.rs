use super::core::ExecutionStrategy;
use super::lock::TaskLock;
use super::task::{Task, TaskContext, TaskResult};
use crate::error::DispatchError;
use crossbeam::channel::{Receiver, Sender, bounded};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

/// What a worker reports back for one task
enum WorkerMessage<R> {
    Completed(TaskResult<R>),
    Crashed {
        worker_id: usize,
        index: usize,
        message: String,
    },
}

/// Context for worker threads to avoid too many function parameters
struct WorkerContext<'s, T, R, F> {
    worker_id: usize,
    work_rx: Receiver<Task<T>>,
    result_tx: Sender<WorkerMessage<R>>,
    aborted: &'s AtomicBool,
    lock: &'s TaskLock,
    transform: &'s F,
}

/// Runs a transformation over tasks in the calling thread or on worker threads
///
/// Parallel runs use a producer-consumer layout: one producer feeds a bounded
/// work channel, each worker pulls the next task when it is free, and results
/// come back over a second channel in completion order. All threads live in a
/// `crossbeam` scope, so every worker has been joined when [`run`](Self::run)
/// returns, whichever way it returns.
pub struct WorkerPool<'l> {
    strategy: ExecutionStrategy,
    lock: &'l TaskLock,
    buffer_size: usize,
}

impl<'l> WorkerPool<'l> {
    pub fn new(strategy: ExecutionStrategy, lock: &'l TaskLock) -> Self {
        Self {
            strategy,
            lock,
            buffer_size: strategy.workers() * 2,
        }
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// Execute every task once.
    ///
    /// Results come back in completion order. Errors returned by `transform`
    /// are captured as failed results; a panicking transformation takes its
    /// worker down and fails the whole run.
    pub fn run<T, R, F>(
        &self,
        tasks: Vec<Task<T>>,
        transform: &F,
    ) -> Result<Vec<TaskResult<R>>, DispatchError>
    where
        T: Send,
        R: Send,
        F: Fn(T, &TaskContext<'_>) -> anyhow::Result<R> + Sync,
    {
        match self.strategy {
            ExecutionStrategy::Sequential => self.run_sequential(tasks, transform),
            ExecutionStrategy::Parallel { workers } => self.run_parallel(tasks, transform, workers),
        }
    }

    fn run_sequential<T, R, F>(
        &self,
        tasks: Vec<Task<T>>,
        transform: &F,
    ) -> Result<Vec<TaskResult<R>>, DispatchError>
    where
        F: Fn(T, &TaskContext<'_>) -> anyhow::Result<R>,
    {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match execute(task, 0, self.lock, transform) {
                WorkerMessage::Completed(result) => results.push(result),
                WorkerMessage::Crashed {
                    worker_id,
                    index,
                    message,
                } => {
                    return Err(DispatchError::WorkerPanicked {
                        worker_id,
                        index,
                        message,
                    });
                }
            }
        }
        Ok(results)
    }

    fn run_parallel<T, R, F>(
        &self,
        tasks: Vec<Task<T>>,
        transform: &F,
        workers: usize,
    ) -> Result<Vec<TaskResult<R>>, DispatchError>
    where
        T: Send,
        R: Send,
        F: Fn(T, &TaskContext<'_>) -> anyhow::Result<R> + Sync,
    {
        let total_tasks = tasks.len();
        let aborted = AtomicBool::new(false);

        let scoped = crossbeam::thread::scope(|s| -> Result<Vec<TaskResult<R>>, DispatchError> {
            // Channels live inside the scope closure so an early return drops the
            // senders and lets already-spawned workers drain out before the join.
            let (work_tx, work_rx) = bounded::<Task<T>>(self.buffer_size);
            let (result_tx, result_rx) = bounded::<WorkerMessage<R>>(self.buffer_size);

            for worker_id in 0..workers {
                let ctx = WorkerContext {
                    worker_id,
                    work_rx: work_rx.clone(),
                    result_tx: result_tx.clone(),
                    aborted: &aborted,
                    lock: self.lock,
                    transform,
                };
                s.builder()
                    .name(format!("bpc-worker-{worker_id}"))
                    .spawn(move |_| worker_thread(ctx))
                    .map_err(DispatchError::Spawn)?;
            }
            drop(work_rx);
            drop(result_tx);

            // Producer thread: send work to workers
            let aborted = &aborted;
            s.builder()
                .name("bpc-producer".to_string())
                .spawn(move |_| {
                    for task in tasks {
                        if aborted.load(Ordering::Acquire) || work_tx.send(task).is_err() {
                            break;
                        }
                    }
                })
                .map_err(DispatchError::Spawn)?;

            collect_results(result_rx, total_tasks)
        });

        scoped.map_err(|payload| DispatchError::WorkerPanicked {
            worker_id: usize::MAX,
            index: usize::MAX,
            message: panic_message(payload.as_ref()),
        })?
    }
}

fn worker_thread<T, R, F>(ctx: WorkerContext<'_, T, R, F>)
where
    F: Fn(T, &TaskContext<'_>) -> anyhow::Result<R>,
{
    tracing::trace!("worker {} started", ctx.worker_id);
    while let Ok(task) = ctx.work_rx.recv() {
        if ctx.aborted.load(Ordering::Acquire) {
            break;
        }

        let message = execute(task, ctx.worker_id, ctx.lock, ctx.transform);
        let crashed = matches!(message, WorkerMessage::Crashed { .. });
        if crashed {
            ctx.aborted.store(true, Ordering::Release);
        }

        if ctx.result_tx.send(message).is_err() || crashed {
            break;
        }
    }
    tracing::trace!("worker {} finished", ctx.worker_id);
}

/// Collect results until every worker has hung up.
///
/// The first crash report wins; later messages are drained and dropped so no
/// worker blocks on a full channel.
fn collect_results<R>(
    result_rx: Receiver<WorkerMessage<R>>,
    total_tasks: usize,
) -> Result<Vec<TaskResult<R>>, DispatchError> {
    let mut results = Vec::with_capacity(total_tasks);
    let mut crash = None;

    while let Ok(message) = result_rx.recv() {
        match message {
            WorkerMessage::Completed(result) => results.push(result),
            WorkerMessage::Crashed {
                worker_id,
                index,
                message,
            } => {
                tracing::debug!("worker {} crashed on task {}", worker_id, index);
                crash.get_or_insert(DispatchError::WorkerPanicked {
                    worker_id,
                    index,
                    message,
                });
            }
        }
    }

    match crash {
        Some(error) => Err(error),
        None => Ok(results),
    }
}

fn execute<T, R, F>(task: Task<T>, worker_id: usize, lock: &TaskLock, transform: &F) -> WorkerMessage<R>
where
    F: Fn(T, &TaskContext<'_>) -> anyhow::Result<R>,
{
    let (index, payload) = task.into_parts();
    let ctx = TaskContext::new(index, worker_id, lock);

    match panic::catch_unwind(AssertUnwindSafe(|| transform(payload, &ctx))) {
        Ok(Ok(value)) => {
            tracing::trace!("task {} done on worker {}", index, worker_id);
            WorkerMessage::Completed(TaskResult::success(index, value))
        }
        Ok(Err(error)) => {
            tracing::trace!("task {} failed on worker {}: {:#}", index, worker_id, error);
            WorkerMessage::Completed(TaskResult::failure(index, &error))
        }
        Err(payload) => WorkerMessage::Crashed {
            worker_id,
            index,
            message: panic_message(payload.as_ref()),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn double(x: u32, _ctx: &TaskContext<'_>) -> anyhow::Result<u32> {
        Ok(x * 2)
    }

    fn sorted_values(results: Vec<TaskResult<u32>>) -> Vec<(usize, u32)> {
        let mut pairs: Vec<_> = results
            .into_iter()
            .map(|r| (r.index(), r.into_result().unwrap()))
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn test_sequential_runs_in_submission_order() {
        let lock = TaskLock::create(false);
        let pool = WorkerPool::new(ExecutionStrategy::Sequential, &lock);
        let seen = std::sync::Mutex::new(Vec::new());

        let results = pool
            .run(Task::from_items(vec![5, 6, 7]), &|x: u32, ctx: &TaskContext<'_>| {
                assert_eq!(ctx.worker_id(), 0);
                seen.lock().unwrap().push(ctx.index());
                Ok(x)
            })
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        let indices: Vec<_> = results.iter().map(TaskResult::index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_parallel_executes_each_task_once() {
        let lock = TaskLock::create(true);
        let pool = WorkerPool::new(ExecutionStrategy::Parallel { workers: 4 }, &lock);
        let calls = AtomicUsize::new(0);

        let results = pool
            .run(Task::from_items(0..100u32), &|x: u32, _ctx: &TaskContext<'_>| {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok(x * 2)
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 100);
        let expected: Vec<_> = (0..100u32).map(|x| (x as usize, x * 2)).collect();
        assert_eq!(sorted_values(results), expected);
    }

    #[test]
    fn test_parallel_uses_several_workers() {
        let lock = TaskLock::create(true);
        let pool = WorkerPool::new(ExecutionStrategy::Parallel { workers: 3 }, &lock);
        let workers = std::sync::Mutex::new(std::collections::HashSet::new());

        pool.run(Task::from_items(0..30u32), &|x: u32, ctx: &TaskContext<'_>| {
            workers.lock().unwrap().insert(ctx.worker_id());
            thread::sleep(Duration::from_millis(2));
            Ok(x)
        })
        .unwrap();

        let workers = workers.into_inner().unwrap();
        assert!(!workers.is_empty());
        assert!(workers.iter().all(|id| *id < 3));
    }

    #[test]
    fn test_errors_become_failed_results() {
        let lock = TaskLock::create(true);
        let pool = WorkerPool::new(ExecutionStrategy::Parallel { workers: 2 }, &lock);

        let results = pool
            .run(Task::from_items(0..6u32), &|x: u32, _ctx: &TaskContext<'_>| {
                if x % 3 == 0 {
                    anyhow::bail!("multiple of three: {}", x);
                }
                Ok(x)
            })
            .unwrap();

        assert_eq!(results.len(), 6);
        let mut failed: Vec<_> = results
            .iter()
            .filter(|r| r.is_failure())
            .map(TaskResult::index)
            .collect();
        failed.sort();
        assert_eq!(failed, vec![0, 3]);
    }

    #[test]
    fn test_parallel_panic_is_infrastructure_failure() {
        let lock = TaskLock::create(true);
        let pool = WorkerPool::new(ExecutionStrategy::Parallel { workers: 2 }, &lock);

        let err = pool
            .run(Task::from_items(0..20u32), &|x: u32, _ctx: &TaskContext<'_>| {
                if x == 7 {
                    panic!("worker blew up");
                }
                Ok(x)
            })
            .unwrap_err();

        match err {
            DispatchError::WorkerPanicked { index, message, .. } => {
                assert_eq!(index, 7);
                assert_eq!(message, "worker blew up");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sequential_panic_is_infrastructure_failure() {
        let lock = TaskLock::create(false);
        let pool = WorkerPool::new(ExecutionStrategy::Sequential, &lock);

        let err = pool
            .run(Task::from_items(vec![1u32, 2]), &|x: u32, _ctx: &TaskContext<'_>| {
                if x == 2 {
                    panic!("{} is not allowed", x);
                }
                Ok(x)
            })
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::WorkerPanicked { worker_id: 0, index: 1, ref message } if message == "2 is not allowed"
        ));
    }

    #[test]
    fn test_empty_task_list() {
        let lock = TaskLock::create(true);
        let pool = WorkerPool::new(ExecutionStrategy::Parallel { workers: 2 }, &lock);
        let results: Vec<TaskResult<u32>> = pool.run(Vec::new(), &double).unwrap();
        assert!(results.is_empty());
    }
}
