//! Language extractors for source and documentation files

pub mod markdown;
pub mod python;
