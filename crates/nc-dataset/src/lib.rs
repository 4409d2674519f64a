//! In-memory netCDF-style datasets.
//!
//! A [`Dataset`] is a set of named [`Variable`]s whose dimensions are
//! identified by name. Operations return new values and never modify the
//! inputs, so a dataset read from disk can be shared freely.
//!
//! # Example
//!
//! ```
//! use nc_dataset::{Dataset, Variable};
//!
//! let ds = Dataset::new()
//!     .with_var("TAREA", Variable::from_values("nlat", vec![1.0, 2.0]))
//!     .unwrap();
//! assert_eq!(ds.dim_size("nlat"), Some(2));
//! ```

pub mod dataset;
pub mod io;
pub mod ops;
pub mod time_coord;
pub mod variable;

pub use dataset::{Dataset, DatasetEncoding};
pub use io::{open_dataset, open_mfdataset, write_dataset, ArtifactFormat, MfDataset};
pub use time_coord::{time_set_mid, MidpointMode, TIME};
pub use variable::{AttrValue, Attributes, DType, Encoding, FillValue, VarData, Variable};
