//! # congomuv-core
//!
//! Client-side access gate for the CongoMuv transport platform.
//!
//! This crate decides, for every hash-route change, whether to show a
//! loading state, redirect, or render a view, based on session presence and
//! the user's role. It also runs the idle-session timer and exposes a
//! control channel for out-of-band sign-out and idle resets.
//!
//! ## Architecture
//!
//! - [`role`] - Role classification and tier ordering
//! - [`route`] - Hash paths, views, and the typed route table
//! - [`gate`] - The pure gate decision and redirect settling
//! - [`session`] - Session snapshot, profiles, and the auth collaborator
//! - [`idle`] - Idle timer state machine and its background monitor
//! - [`control`] - Broadcast control channel
//! - [`shell`] - The client shell tying it all together
//! - [`config`] - Layered configuration
//! - [`error`] - Unified error type

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod control;
pub mod error;
pub mod gate;
pub mod idle;
pub mod role;
pub mod route;
pub mod session;
pub mod shell;

pub use config::{
    default_config_path, ConfigError, ConfigResult, DirectoryEntry, GateConfig, IdleConfig,
    ServerConfig,
};
pub use control::{ControlBus, ControlHandle, ControlMessage};
pub use error::{GateError, Result};
pub use gate::{apply, decide, decide_raw, settle, GateDecision, HashLocation, MemoryLocation};
pub use idle::{
    ActivityKind, ExpiryCause, IdleMonitor, IdlePhase, IdleSettings, IdleStatus, IdleTimer,
    IdleTransition,
};
pub use role::{normalize_role, Role};
pub use route::{match_route, Access, RouteEntry, RouteError, RoutePath, View, ROUTE_TABLE};
pub use session::{
    AuthProvider, CommitOutcome, MarkerStore, Profile, Session, SessionError, SessionSnapshot,
    StaticAuthProvider,
};
pub use shell::{ClientShell, ShellEffect, ShellState};
