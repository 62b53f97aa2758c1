//! Strata Index - candidate-row bitmaps and the index access-method interface.
//!
//! - `TidBitmap`: a set of candidate TIDs keyed by block, with exact and lossy
//!   entries, AND/OR combination and bounded memory
//! - `BitmapIndex`: the bitmap-producing entry point of an index access method
//! - `OrderedIndex`: an in-memory ordered index implementing `BitmapIndex`
//!
//! # Example
//!
//! ```rust
//! use strata_core::Tid;
//! use strata_index::TidBitmap;
//!
//! let mut a = TidBitmap::new();
//! a.add_tid(Tid::new(1, 1));
//! a.add_tid(Tid::new(1, 2));
//!
//! let mut b = TidBitmap::new();
//! b.add_tid(Tid::new(1, 2));
//! b.add_tid(Tid::new(1, 3));
//!
//! assert_eq!(a.intersect(&b).offsets(1), Some(vec![2]));
//! assert_eq!(a.union(&b).offsets(1), Some(vec![1, 2, 3]));
//! ```

#![no_std]

extern crate alloc;

pub mod bitmap;
pub mod ordered;
pub mod traits;

pub use bitmap::{BitmapIter, BitmapLimits, BitmapPage, TidBitmap, TidMatch};
pub use ordered::{Granularity, OrderedIndex};
pub use traits::{BitmapIndex, ScanKey, ScanOp};
