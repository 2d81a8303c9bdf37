//! pexrs Plugin - Host Shim
//!
//! The thin layer a host embeds: it installs logging, builds the global
//! [`PermissionService`](pexrs_core::PermissionService) from the base
//! directory, drives per-tick work, and provides reference commanders for
//! the console and for players reached over a channel.

pub mod console;
pub mod lifecycle;
pub mod logging;

pub use console::{ChannelCommander, ConsoleCommander};
pub use lifecycle::{load, on_tick, unload, TickReport};
pub use logging::init_logging;
