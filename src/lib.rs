//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-waveform`, `core-runtime`). Host applications can
//! depend on `soundwave-workspace` and enable the documented features without
//! needing to wire each crate individually.

#[cfg(any(feature = "symphonia-decoder", feature = "contracts-only"))]
pub use core_waveform;

#[cfg(feature = "logging")]
pub use core_runtime;
