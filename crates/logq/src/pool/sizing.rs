//! Sizing — how many workers the pool gets.

use thiserror::Error;

/// Upper bound on an explicitly requested worker count.
pub const MAX_WORKERS: usize = 1024;

/// Workers per processing unit when no count is requested.
pub const WORKERS_PER_CPU: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Too many workers requested: {requested} (maximum is {max})")]
    TooManyWorkers { requested: usize, max: usize },
}

/// Resolve the pool size from an explicit request (0 = unset) and the CPU count.
///
/// Derived sizes are never clamped; only explicit requests are bounded by
/// [`MAX_WORKERS`].
pub fn resolve_pool_size(requested: usize, cpus: usize) -> Result<usize, PoolError> {
    match requested {
        0 => Ok(cpus.max(1) * WORKERS_PER_CPU),
        n if n <= MAX_WORKERS => Ok(n),
        n => Err(PoolError::TooManyWorkers {
            requested: n,
            max: MAX_WORKERS,
        }),
    }
}

/// Processing units available to this process, 1 if unknown.
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
