//! Build cache
//!
//! Tracks, per stage, the fingerprint of the inputs its outputs were built
//! from. A stage is skipped only when every declared output exists and the
//! recorded fingerprint matches the current one.
//!
//! # Layout
//!
//! | Path | Content |
//! |------|---------|
//! | `output/cache/stages/<stage>.json` | last completion record |
//! | `output/cache/stages/.<stage>.json.tmp` | record being written |
//! | `output/cache/sources/<repo>` | git checkouts |

pub mod fingerprint;
pub mod store;

pub use fingerprint::Fingerprint;
pub use store::{CacheManager, CacheRecord};
