//! Core module - Shared data structures and plumbing
//!
//! This module provides:
//! - Query configuration (extraction defaults, chunk size)
//! - The error type every layer reports through
//! - Wire model (QueryRequest, ResultMessage)
//! - Rendering functions for different output formats

pub mod config;
pub mod error;
pub mod model;
pub mod render;
