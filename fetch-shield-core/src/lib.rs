//! Domain types shared by every fetch-shield crate.
//!
//! The request model, the signature that keys deduplication and the stale
//! cache, the caller-visible [`Outcome`], the error taxonomy and the
//! [`Transport`] seam all live here so that the pipeline and transport crates
//! depend on a single vocabulary.

pub mod domain;
pub mod error;
pub mod traits;

pub use domain::*;
pub use error::*;
pub use traits::*;
