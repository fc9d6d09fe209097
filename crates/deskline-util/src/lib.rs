//! Shared utilities for deskline
//!
//! This crate provides:
//! - ID types (TicketId, RuleId, MenuItemId, RunId, ...)
//! - Time utilities (wall-clock windows, business calendars, mock time)
//! - Error types
//! - Bounded parent-chain walks for hierarchies
//! - Default paths for config, data, and log directories

mod error;
mod hierarchy;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use hierarchy::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
