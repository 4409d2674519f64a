//! Worker pools for the numeric stages of a generation.

use std::sync::Arc;

use cesm_common::{TseriesError, TseriesResult};
use grid_processor::{DefaultSizing, SizingInput, WorkerSizing};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

/// Where a generation gets its workers from.
#[derive(Clone)]
pub enum PoolSource {
    /// A pool owned by the caller; it is used as-is.
    Shared(Arc<ThreadPool>),
    /// A pool built for each generation and dropped when it ends.
    Local {
        sizing: Arc<dyn WorkerSizing>,
        max_workers: Option<usize>,
    },
}

impl PoolSource {
    pub fn local(max_workers: Option<usize>) -> Self {
        PoolSource::Local {
            sizing: Arc::new(DefaultSizing),
            max_workers,
        }
    }

    pub fn shared(pool: Arc<ThreadPool>) -> Self {
        PoolSource::Shared(pool)
    }

    /// Nominal worker count for `input`, used to size time blocks.
    pub fn workers(&self, input: &SizingInput) -> usize {
        match self {
            PoolSource::Shared(_) => DefaultSizing.workers(input),
            PoolSource::Local { sizing, .. } => sizing.workers(input),
        }
    }

    /// Pool to run one generation on.
    pub fn acquire(&self, input: &SizingInput) -> TseriesResult<WorkerPool> {
        match self {
            PoolSource::Shared(pool) => Ok(WorkerPool {
                pool: Arc::clone(pool),
                owned: false,
            }),
            PoolSource::Local { sizing, max_workers } => {
                let mut threads = sizing.workers(input).max(1);
                if let Some(max) = max_workers {
                    threads = threads.min(*max).max(1);
                }
                let pool = ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("tseries-worker-{}", i))
                    .build()
                    .map_err(|e| TseriesError::WorkerPool(e.to_string()))?;
                info!(threads, "Worker pool created");
                Ok(WorkerPool {
                    pool: Arc::new(pool),
                    owned: true,
                })
            }
        }
    }
}

impl std::fmt::Debug for PoolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolSource::Shared(pool) => f
                .debug_struct("Shared")
                .field("threads", &pool.current_num_threads())
                .finish(),
            PoolSource::Local { max_workers, .. } => f
                .debug_struct("Local")
                .field("max_workers", max_workers)
                .finish(),
        }
    }
}

/// A pool acquired for one generation.
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
    owned: bool,
}

impl WorkerPool {
    pub fn install<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(f)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.owned {
            debug!(threads = self.threads(), "Worker pool released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_processor::FixedSizing;

    fn input(vertlen: usize) -> SizingInput {
        SizingInput {
            tlen: 120,
            time_chunksize: 6,
            vertlen,
        }
    }

    #[test]
    fn test_local_pool_is_capped() {
        let source = PoolSource::local(Some(2));
        let pool = source.acquire(&input(60)).unwrap();
        assert!(pool.is_owned());
        assert_eq!(pool.threads(), 2);
        assert_eq!(source.workers(&input(60)), 48);
    }

    #[test]
    fn test_shared_pool_used_as_is() {
        let shared = Arc::new(ThreadPoolBuilder::new().num_threads(3).build().unwrap());
        let source = PoolSource::shared(Arc::clone(&shared));
        let pool = source.acquire(&input(0)).unwrap();
        assert!(!pool.is_owned());
        assert_eq!(pool.threads(), 3);
        drop(pool);
        assert_eq!(shared.current_num_threads(), 3);
    }

    #[test]
    fn test_custom_sizing() {
        let source = PoolSource::Local {
            sizing: Arc::new(FixedSizing(5)),
            max_workers: None,
        };
        assert_eq!(source.acquire(&input(0)).unwrap().threads(), 5);
        assert_eq!(pool_sum(&source), 55);
    }

    fn pool_sum(source: &PoolSource) -> u64 {
        use rayon::prelude::*;
        let pool = source.acquire(&input(0)).unwrap();
        pool.install(|| (1..=10u64).into_par_iter().sum())
    }
}
