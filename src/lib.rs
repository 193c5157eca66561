//! Read-only virtual content filesystem.
//!
//! `vellum` presents a directory of markdown sources, images and static files as a website:
//! markdown is rendered through page templates on demand, image folders get wrapper pages,
//! and the root `sitemap.txt` is executed as a template over every visible path. Results are
//! cached per resource kind behind quantized, coalescing cache groups that can be sharded
//! across peers.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
