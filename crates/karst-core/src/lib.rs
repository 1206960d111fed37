//! # karst-core
//! Foundation types for the Karst kernel: consensus primitives, the byte
//! codec, chain parameters, genesis construction, and the log-sink registry.

pub mod constants;
pub mod encoding;
pub mod error;
pub mod genesis;
pub mod logging;
pub mod merkle;
pub mod params;
pub mod types;
