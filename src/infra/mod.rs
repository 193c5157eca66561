//! Concrete collaborators and runtime bootstrap.

pub mod error;
pub mod front_matter;
pub mod http;
pub mod markdown;
pub mod peers;
pub mod store;
pub mod telemetry;
pub mod templates;
