//! Grid-aware numerics for CESM time-series generation.
//!
//! This crate knows how each model component lays out its grid. It provides:
//!
//! - **Weights**: cell area or volume per component ([`get_weight`])
//! - **Region masks**: named 0/1 lateral fields with a leading `region` dimension
//! - **Reductions**: NaN-aware weighted integrals and averages on the rayon pool
//! - **Resampling**: annual means and monthly anomalies of monthly series
//! - **Planning**: worker sizing and time blocking for a generation
//!
//! # Architecture
//!
//! ```text
//! Dataset (one ensemble member, all files)
//!      │
//!      ├─► registry::strategy(component)
//!      │         ├─► weight(ds, reduce_dims)
//!      │         └─► region_mask(ds)
//!      │
//!      ├─► region_mask × weight  (region, lateral...)
//!      │
//!      └─► for block in TimeBlocks
//!               └─► weighted_reduce(block, weight, reduce_dims, op)
//! ```

pub mod plan;
pub mod point;
pub mod reduce;
pub mod regions;
pub mod registry;
pub mod resample;
pub mod weights;

// Re-export commonly used types at crate root
pub use plan::{time_chunksize, vertlen, DefaultSizing, FixedSizing, SizingInput, TimeBlocks, WorkerSizing};
pub use point::{find_cell, CellIndex};
pub use reduce::{weight_sum, weighted_reduce};
pub use regions::{get_region_mask, RegionMask, REGION_DIM};
pub use registry::{copy_var_names, drop_var_names, strategy, ComponentStrategy, PointLookup};
pub use resample::{compute_ann_mean, compute_mon_anomaly};
pub use weights::get_weight;
