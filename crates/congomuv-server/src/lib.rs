//! # congomuv-server
//!
//! HTTP server library for the CongoMuv gate.
//!
//! Provides the API handlers, the per-client shell registry, and logging
//! setup used by the `congomuv-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
