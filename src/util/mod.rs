//! General purpose data structures that aren't specific to classfiles

mod offset_vec;
mod segment_tree;

pub use offset_vec::{Offset, OffsetVec, OffsetVecIntoIter, OffsetVecIter, Width};
pub use segment_tree::{Interval, SegmentTree};
