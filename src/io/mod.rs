//! Command log export.

pub mod export;
