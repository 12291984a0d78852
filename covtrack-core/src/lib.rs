//! # Core types for covtrack
//!
//! Shared alignment models, the error taxonomy used across the workspace, and small
//! file helpers (gzip-aware readers, chrom.sizes parsing).
//!
pub mod errors;
pub mod models;
pub mod utils;
