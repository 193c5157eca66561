//! Virtual filesystem, render transforms and the interfaces they consume.

pub mod error;
pub mod render;
pub mod site_config;
pub mod store;
pub mod vfs;
