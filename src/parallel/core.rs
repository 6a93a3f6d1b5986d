/// What the running environment offers for parallel execution
///
/// Detected once and passed along explicitly so tests and callers can pin it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether worker threads may be used at all.
    pub parallel_available: bool,
    /// Worker count used when no explicit `jobs` value is given.
    pub cpu_count: usize,
}

impl Capabilities {
    /// Probe the host: parallel execution needs more than one CPU.
    pub fn detect() -> Self {
        let cpu_count = num_cpus::get().max(1);
        Self {
            parallel_available: cpu_count > 1,
            cpu_count,
        }
    }

    /// An environment without parallel support.
    pub fn serial() -> Self {
        Self {
            parallel_available: false,
            cpu_count: 1,
        }
    }

    /// Pretend `cpu_count` CPUs are available.
    pub fn with_cpus(cpu_count: usize) -> Self {
        let cpu_count = cpu_count.max(1);
        Self {
            parallel_available: cpu_count > 1,
            cpu_count,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

/// Inputs of one dispatch session
///
/// The three ways of ending up in serial mode are independent fields:
/// an explicit opt-out (`parallel`), environment unavailability
/// (`capabilities.parallel_available`) and a single CPU or `jobs <= 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Worker count; `None` or `Some(0)` means one per CPU.
    pub jobs: Option<usize>,
    /// Whether tasks share a resource that needs a real lock.
    pub shared: bool,
    /// Caller's permission to run in parallel.
    pub parallel: bool,
    pub capabilities: Capabilities,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            jobs: None,
            shared: false,
            parallel: true,
            capabilities: Capabilities::detect(),
        }
    }
}

impl DispatchOptions {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    pub fn jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Execution strategy for a dispatch session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Sequential,
    Parallel { workers: usize },
}

impl ExecutionStrategy {
    /// Pick the strategy for `task_count` tasks.
    ///
    /// # Decision Logic
    /// ```text
    /// parallel disabled or unavailable  → Sequential
    /// jobs (or cpu_count) <= 1          → Sequential
    /// no tasks                          → Sequential
    /// otherwise                         → Parallel { workers: min(jobs, task_count) }
    /// ```
    pub fn resolve(options: &DispatchOptions, task_count: usize) -> Self {
        if !options.parallel || !options.capabilities.parallel_available {
            return ExecutionStrategy::Sequential;
        }

        let jobs = match options.jobs {
            Some(jobs) if jobs > 0 => jobs,
            _ => options.capabilities.cpu_count,
        };

        if jobs <= 1 || task_count == 0 {
            ExecutionStrategy::Sequential
        } else {
            ExecutionStrategy::Parallel {
                workers: std::cmp::min(jobs, task_count),
            }
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, ExecutionStrategy::Parallel { .. })
    }

    /// Number of execution contexts; 1 for the calling thread.
    pub fn workers(&self) -> usize {
        match self {
            ExecutionStrategy::Sequential => 1,
            ExecutionStrategy::Parallel { workers } => *workers,
        }
    }
}
