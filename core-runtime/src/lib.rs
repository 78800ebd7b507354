//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the waveform crates and their hosts:
//! - Logging and tracing bootstrap
//! - Runtime error types

pub mod error;
pub mod logging;

pub use error::{Error, Result};
