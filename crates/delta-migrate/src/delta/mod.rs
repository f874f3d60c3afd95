//! Delta planning for one migration type.
//!
//! - [`finder`]: splits the id space into insert, update and delete ranges
//!   from id bounds, handing the overlap to the differ
//! - [`differ`]: halves mismatching ranges until they are small enough to
//!   re-transfer, skipping every range whose checksums agree
//! - [`builder`]: expands the resulting ranges into spooled row lists

pub mod builder;
pub mod differ;
pub mod finder;

pub use builder::{DeltaBuilder, DeltaCounts, DeltaWriters, RangeCursor};
pub use differ::{ChecksumRangeDiffer, DiffOutcome};
pub use finder::{DeltaFinder, DeltaRanges};
