//! Helper functions shared by providers, the tree builder and the query engine
//!
//! Everything here is pure: path normalization, locale segments, glob matching,
//! slug derivation and stable identifiers.

mod path;

pub use path::*;
