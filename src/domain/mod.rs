//! Domain layer types and invariants.

pub mod duration;
pub mod entry;
pub mod error;
pub mod front_matter;
pub mod path;
mod serde_fmt;
