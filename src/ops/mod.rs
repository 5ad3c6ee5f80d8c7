//! Query operators
//!
//! - `sequence`: distinct, zip, aggregates, grouping, ordering, first/last
//! - `json`: JSON parsing on text and serialisation of structured values
//! - `library`: the process-wide operator registry and its catalog

pub mod json;
pub mod library;
pub mod sequence;
