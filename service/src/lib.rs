//! Process-level concerns shared by the restkit binary: command line and environment
//! configuration, and logger setup.

pub mod config;
pub mod logging;
