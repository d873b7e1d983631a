//! Core size-attribution engine: binary-format front-ends feeding a
//! dual-domain `RangeMap` (via [`rangemap_core`]), rolled up into a
//! hierarchical size report (spec.md §1–§5).

pub mod config;
pub mod cursor;
pub mod demangle;
pub mod dualmap;
pub mod dwarf;
pub mod error;
pub mod format;
pub mod munger;
pub mod rollup;
pub mod scan;
pub mod sink;

pub use config::{Config, CustomDataSource};
pub use dualmap::DualMap;
pub use error::{Error, Result};
pub use munger::{DemangleMode, NameMunger};
pub use rollup::{DiffStatus, Rollup, RollupRow, SortKey};
pub use sink::{DataSource, RangeSink, SinkOutput};
