//! Config file extractors

pub mod toml_tables;
