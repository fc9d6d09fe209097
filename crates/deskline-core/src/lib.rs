//! Help desk engine for deskline
//!
//! This crate is the heart of deskline, containing:
//! - Ticket lifecycle (create, status changes, reopen, replies)
//! - Automation rule evaluation against ticket events
//! - SLA due dates, breach detection and the escalation sweep
//! - Menu, media folder and page hierarchies with cycle checks
//! - Redirect chain resolution, import and export
//! - Bulk ticket actions and statistics

mod automation;
mod bulk;
mod cms;
mod desk;
mod escalation;
mod events;
mod fields;
mod lifecycle;
mod menus;
mod notify;
mod redirects;
mod sla;
mod stats;

pub use automation::*;
pub use cms::*;
pub use desk::*;
pub use escalation::*;
pub use events::*;
pub use fields::*;
pub use menus::*;
pub use notify::*;
pub use redirects::*;
pub use sla::*;
pub use stats::*;
