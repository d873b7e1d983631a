//! The dual-domain range attribution engine's core: an ordered,
//! non-overlapping interval-to-label map with optional cross-domain
//! translation, plus the N-way lockstep walk used to build rollups.
//!
//! Adapted from the `rle` crate's run-length merging idioms
//! (`AppendRle`, `MergeIter`, `rle_zip`, `rle_subtract`), generalized from
//! an append-only run-length log to a searchable, mutable interval map.

mod address;
mod entry;
mod error;
mod map;
pub mod zip;

pub use address::{pack_section_offset, unpack_section_offset, Address, Size};
pub use entry::{is_fallback_label, is_short_fallback, Entry};
pub use error::{RangeMapError, Result};
pub use map::RangeMap;
pub use zip::lockstep_walk;
