//! Parallel processing strategies

use rayon::prelude::*;

/// Processing mode for row sweeps and layer loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing on the global rayon pool
    #[default]
    Parallel,
    /// Parallel on a dedicated pool with the given number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Mode for an optional thread count: `None` uses the global pool,
    /// `Some(1)` runs sequentially.
    pub fn from_threads(threads: Option<usize>) -> Self {
        match threads {
            None | Some(0) => ProcessingMode::Parallel,
            Some(1) => ProcessingMode::Sequential,
            Some(n) => ProcessingMode::ParallelWith(n),
        }
    }

    /// Build the dedicated pool for `ParallelWith`. Falls back to the global
    /// pool when the pool cannot be created.
    fn dedicated_pool(threads: usize) -> Option<rayon::ThreadPool> {
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!("cannot build {}-thread pool, using global pool: {}", threads, e);
                None
            }
        }
    }
}

/// Strategy for parallel execution
pub trait ParallelStrategy {
    /// Execute a function over indices
    fn par_for_each<F>(&self, range: std::ops::Range<usize>, f: F)
    where
        F: Fn(usize) + Sync + Send;

    /// Map a function over indices and collect results in index order
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;
}

impl ParallelStrategy for ProcessingMode {
    fn par_for_each<F>(&self, range: std::ops::Range<usize>, f: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => range.for_each(f),
            ProcessingMode::Parallel => range.into_par_iter().for_each(f),
            ProcessingMode::ParallelWith(threads) => match Self::dedicated_pool(*threads) {
                Some(pool) => pool.install(|| range.into_par_iter().for_each(f)),
                None => range.into_par_iter().for_each(f),
            },
        }
    }

    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => range.map(f).collect(),
            ProcessingMode::Parallel => range.into_par_iter().map(f).collect(),
            ProcessingMode::ParallelWith(threads) => match Self::dedicated_pool(*threads) {
                Some(pool) => pool.install(|| range.into_par_iter().map(f).collect()),
                None => range.into_par_iter().map(f).collect(),
            },
        }
    }
}

/// Get the number of threads in the global pool
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}
