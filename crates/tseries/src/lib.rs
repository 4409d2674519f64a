//! Cached, spatially reduced time series of CESM output.
//!
//! An [`Orchestrator`] answers requests for variables of one model
//! component and experiment. For each ensemble member it finds the files in
//! the catalog, reduces them over the variable's spatial dimensions with a
//! region-masked weight, and caches the result on disk. Annual series are
//! derived from the cached monthly series.
//!
//! ```text
//! TseriesRequest
//!      │
//!      ├─► CatalogQuery::find_in_index
//!      │
//!      └─► per member: ArtifactCache::get_or_generate
//!               ├─► mon: generator::generate (worker pool)
//!               └─► ann: mon artifact ─► compute_ann_mean
//!      │
//!      └─► stack members along `ensemble`, merge variables
//! ```

pub mod config;
pub mod generator;
pub mod latlon;
pub mod orchestrator;
pub mod pool;

pub use config::TseriesConfig;
pub use generator::{conv_units, generate, GenerateRequest};
pub use latlon::PointRequest;
pub use orchestrator::{Orchestrator, TseriesRequest, ENSEMBLE_DIM};
pub use pool::{PoolSource, WorkerPool};
