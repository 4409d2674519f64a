//! Storage abstractions for CESM time-series generation.
//!
//! Provides:
//! - A file catalog of model output, loaded from YAML/JSON or scanned from disk
//! - Per-variable reduction specs with component defaults
//! - The on-disk artifact cache and its `.genlock` protocol

pub mod cache;
pub mod catalog;
pub mod var_specs;

pub use cache::{clobber_from_env, genlock_path, ArtifactCache, ArtifactState, CacheKey, GENLOCK_SUFFIX};
pub use catalog::{ensembles, member_files, Catalog, CatalogEntry, CatalogQuery};
pub use var_specs::{ComponentSpecs, ResolvedVarSpec, VarEntry, VarSpecs};
