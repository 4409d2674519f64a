//! Common types and utilities shared across the CESM time-series crates.

pub mod calendar;
pub mod component;
pub mod constants;
pub mod error;
pub mod time;
pub mod units;

pub use calendar::{Calendar, CfDatetime, TimeUnit, TimeUnits};
pub use component::{Component, Frequency, ReduceOp};
pub use error::{TseriesError, TseriesResult};
pub use units::{clean_units, Unit};
