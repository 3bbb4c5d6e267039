//! Command handlers for rmirror

pub mod configure;
pub mod memory;
