//! Ambient infrastructure shared by every crate in the workspace: logging
//! setup, graceful drain, readiness tracking, shutdown signalling, and build
//! version metadata. None of this is part of the adaptive-transport core
//! itself -- it is the scaffolding a runnable binary needs around it.

pub mod drain;
pub mod readiness;
pub mod signal;
pub mod telemetry;
pub mod version;
