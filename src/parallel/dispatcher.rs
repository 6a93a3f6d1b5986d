use super::core::{DispatchOptions, ExecutionStrategy};
use super::lock::TaskLock;
use super::pool::WorkerPool;
use super::task::{Task, TaskContext, TaskFailure, TaskResult};
use crate::error::DispatchError;
use std::fmt;

/// Lifecycle of a dispatch session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
    Collecting,
    Done,
}

impl DispatchState {
    /// The only state reachable from this one; `None` once done.
    pub fn next(self) -> Option<Self> {
        match self {
            DispatchState::Idle => Some(DispatchState::Dispatching),
            DispatchState::Dispatching => Some(DispatchState::Collecting),
            DispatchState::Collecting => Some(DispatchState::Done),
            DispatchState::Done => None,
        }
    }
}

type Reporter<'r> = Box<dyn Fn(&TaskFailure) + 'r>;

/// Entry point of the dispatch core
///
/// A dispatcher runs exactly one session: [`dispatch`](Self::dispatch)
/// consumes it. Each session gets its own [`TaskLock`] and [`WorkerPool`].
pub struct Dispatcher<'r> {
    options: DispatchOptions,
    state: DispatchState,
    reporter: Option<Reporter<'r>>,
}

impl<'r> Dispatcher<'r> {
    pub fn new(options: DispatchOptions) -> Self {
        Self {
            options,
            state: DispatchState::Idle,
            reporter: None,
        }
    }

    /// Hand every failed result to `reporter` once collection is over.
    pub fn with_reporter(mut self, reporter: impl Fn(&TaskFailure) + 'r) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Apply `transform` to every item and return one result per item, in
    /// submission order.
    ///
    /// Transformation errors become failed results. Only an infrastructure
    /// failure (a worker that could not start or that crashed) makes this
    /// return `Err`, and then no results are returned at all.
    pub fn dispatch<I, T, R, F>(
        mut self,
        items: I,
        transform: F,
    ) -> Result<Vec<TaskResult<R>>, DispatchError>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        F: Fn(T, &TaskContext<'_>) -> anyhow::Result<R> + Sync,
    {
        let tasks = Task::from_items(items);
        let total = tasks.len();
        let strategy = ExecutionStrategy::resolve(&self.options, total);
        let lock = TaskLock::create(strategy.is_parallel() && self.options.shared);

        self.advance(DispatchState::Dispatching);
        tracing::debug!(
            "dispatching {} tasks ({:?}, real lock: {})",
            total,
            strategy,
            lock.is_real()
        );

        let pool = WorkerPool::new(strategy, &lock);
        let mut results = pool.run(tasks, &transform)?;

        // every worker has been joined by now
        self.advance(DispatchState::Collecting);
        results.sort_by_key(TaskResult::index);
        if results.len() != total {
            return Err(DispatchError::ResultsLost {
                expected: total,
                received: results.len(),
            });
        }

        if let Some(reporter) = &self.reporter {
            results
                .iter()
                .filter_map(TaskResult::failure_info)
                .for_each(|failure| reporter(failure));
        }

        self.advance(DispatchState::Done);
        let failed = results.iter().filter(|r| r.is_failure()).count();
        tracing::debug!("dispatch done: {} succeeded, {} failed", total - failed, failed);
        Ok(results)
    }

    fn advance(&mut self, to: DispatchState) {
        debug_assert_eq!(self.state.next(), Some(to), "dispatch state skipped");
        tracing::trace!("dispatch state {:?} -> {:?}", self.state, to);
        self.state = to;
    }
}

impl fmt::Debug for Dispatcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

/// Convenience function for dispatching with detected capabilities
///
/// `jobs = None` uses one worker per CPU; `shared` requests a real lock for
/// parallel runs.
pub fn dispatch<I, T, R, F>(
    items: I,
    transform: F,
    jobs: Option<usize>,
    shared: bool,
) -> Result<Vec<TaskResult<R>>, DispatchError>
where
    I: IntoIterator<Item = T>,
    T: Send,
    R: Send,
    F: Fn(T, &TaskContext<'_>) -> anyhow::Result<R> + Sync,
{
    let options = DispatchOptions::default().jobs(jobs).shared(shared);
    Dispatcher::new(options).dispatch(items, transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::Capabilities;
    use std::cell::RefCell;
    use std::thread;
    use std::time::Duration;

    fn options(jobs: usize) -> DispatchOptions {
        DispatchOptions::new(Capabilities::with_cpus(8)).jobs(Some(jobs))
    }

    fn upper(item: &str, _ctx: &TaskContext<'_>) -> anyhow::Result<String> {
        Ok(item.to_uppercase())
    }

    fn raise_if_bad(item: &str, _ctx: &TaskContext<'_>) -> anyhow::Result<String> {
        if item == "bad" {
            anyhow::bail!("bad input");
        }
        Ok(item.to_string())
    }

    #[test]
    fn test_state_transitions_do_not_skip() {
        assert_eq!(DispatchState::Idle.next(), Some(DispatchState::Dispatching));
        assert_eq!(DispatchState::Dispatching.next(), Some(DispatchState::Collecting));
        assert_eq!(DispatchState::Collecting.next(), Some(DispatchState::Done));
        assert_eq!(DispatchState::Done.next(), None);
        assert_eq!(Dispatcher::new(options(1)).state(), DispatchState::Idle);
    }

    #[test]
    fn test_uppercase_serial_and_parallel() {
        for jobs in [1, 3] {
            let results = Dispatcher::new(options(jobs))
                .dispatch(["a", "b", "c"], upper)
                .unwrap();

            let expected: Vec<_> = ["A", "B", "C"]
                .iter()
                .enumerate()
                .map(|(i, s)| TaskResult::success(i, s.to_string()))
                .collect();
            assert_eq!(results, expected, "jobs = {jobs}");
        }
    }

    #[test]
    fn test_failure_keeps_index_and_does_not_escalate() {
        let results = Dispatcher::new(options(2))
            .dispatch(["ok", "bad"], raise_if_bad)
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].value().map(String::as_str), Some("ok"));
        let failure = results[1].failure_info().unwrap();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.message, "bad input");
    }

    #[test]
    fn test_all_failures_still_return_every_result() {
        let results = Dispatcher::new(options(4))
            .dispatch(0..10, |x: i32, _ctx: &TaskContext<'_>| -> anyhow::Result<i32> {
                anyhow::bail!("no luck for {}", x)
            })
            .unwrap();

        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index(), i);
            assert_eq!(result.failure_info().unwrap().message, format!("no luck for {i}"));
        }
    }

    #[test]
    fn test_order_independent_of_completion_order() {
        // later items finish first
        let results = Dispatcher::new(options(4))
            .dispatch(0..8u64, |x: u64, _ctx: &TaskContext<'_>| {
                thread::sleep(Duration::from_millis((8 - x) * 3));
                Ok(x * x)
            })
            .unwrap();

        let values: Vec<_> = results.iter().map(|r| *r.value().unwrap()).collect();
        assert_eq!(values, vec![0, 1, 4, 9, 16, 25, 36, 49]);
    }

    #[test]
    fn test_pure_function_same_results_for_any_worker_count() {
        let run = |jobs| {
            Dispatcher::new(options(jobs))
                .dispatch(0..50u32, |x: u32, _ctx: &TaskContext<'_>| {
                    if x % 7 == 0 {
                        anyhow::bail!("{} is a multiple of seven", x);
                    }
                    Ok(x.pow(2) + 1)
                })
                .unwrap()
        };
        assert_eq!(run(1), run(4));
    }

    #[test]
    fn test_reporter_sees_failures_in_order() {
        let reported = RefCell::new(Vec::new());
        let results = Dispatcher::new(options(3))
            .with_reporter(|failure| reported.borrow_mut().push(failure.index))
            .dispatch(["bad", "ok", "bad", "bad"], raise_if_bad)
            .unwrap();

        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 1);
        assert_eq!(reported.into_inner(), vec![0, 2, 3]);
    }

    #[test]
    fn test_shared_lock_only_when_parallel() {
        let lock_kind = |opts: DispatchOptions| {
            Dispatcher::new(opts)
                .dispatch([()], |_: (), ctx: &TaskContext<'_>| Ok(ctx.lock().is_real()))
                .unwrap()[0]
                .value()
                .copied()
                .unwrap()
        };

        assert!(lock_kind(options(2).shared(true)));
        assert!(!lock_kind(options(2).shared(false)));
        assert!(!lock_kind(options(1).shared(true)));
    }

    #[test]
    fn test_shared_lock_serializes_output() {
        let output = std::sync::Mutex::new(String::new());
        let results = Dispatcher::new(options(4).shared(true))
            .dispatch(0..8, |task: i32, ctx: &TaskContext<'_>| {
                let _guard = ctx.lock().acquire();
                for step in 0..3 {
                    output.lock().unwrap().push_str(&format!("{task}:{step};"));
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(results.len(), 8);

        // each task's three lines must be contiguous
        let output = output.into_inner().unwrap();
        let records: Vec<_> = output.trim_end_matches(';').split(';').collect();
        for chunk in records.chunks(3) {
            let task = chunk[0].split(':').next().unwrap();
            let steps: Vec<_> = chunk.iter().map(|r| r.split_once(':').unwrap()).collect();
            assert!(steps.iter().all(|(t, _)| *t == task), "interleaved: {output}");
            assert_eq!(steps.iter().map(|(_, s)| *s).collect::<Vec<_>>(), vec!["0", "1", "2"]);
        }
    }

    #[test]
    fn test_crash_escalates() {
        let err = Dispatcher::new(options(2))
            .dispatch(["fine", "crash", "fine"], |item: &str, _ctx: &TaskContext<'_>| {
                if item == "crash" {
                    panic!("crashed");
                }
                Ok(item.len())
            })
            .unwrap_err();

        assert!(matches!(err, DispatchError::WorkerPanicked { index: 1, .. }));
    }

    #[test]
    fn test_free_function_dispatch() {
        let results = dispatch(
            vec!["x".to_string(), "y".to_string()],
            |s: String, _ctx: &TaskContext<'_>| Ok(s.repeat(2)),
            Some(2),
            false,
        )
        .unwrap();

        let values: Vec<_> = results.into_iter().map(|r| r.into_result().unwrap()).collect();
        assert_eq!(values, vec!["xx", "yy"]);
    }

    #[test]
    fn test_empty_input() {
        let results = Dispatcher::new(options(4)).dispatch(Vec::<&str>::new(), upper).unwrap();
        assert!(results.is_empty());
    }
}
