//! ubiq480 - UbiQ-480 SD card image builder
//!
//! Builds U-Boot, a kernel, the board device tree, a boot script and a
//! Debian root filesystem, and assembles them into a partitioned image.
//! Stages are cached by input fingerprint and gated behind a confirmation
//! summary and a privilege check.

pub mod cache;
pub mod cli;
pub mod config;
pub mod deps;
pub mod error;
pub mod gate;
pub mod image;
pub mod log;
pub mod orchestrator;
pub mod pipeline;
pub mod process;
pub mod stage;
pub mod ui;

pub use error::{UbiqError, UbiqResult};
