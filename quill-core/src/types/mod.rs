//! Core data types used throughout Quill.
//!
//! - **Geometry**: [`Point`], [`Size`] and [`Rect`] in integer screen pixels.
//! - **Region**: [`Region`], a set of disjoint rectangles for damage and occlusion.

pub mod geometry;
pub mod region;

pub use geometry::{Point, Rect, Size};
pub use region::Region;
