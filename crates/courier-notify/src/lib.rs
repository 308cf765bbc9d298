//! Notification surface for Courier.
//!
//! Turns delivery errors and queue events into user-visible alerts that
//! either auto-dismiss after a per-kind default or persist until the user
//! dismisses them, optionally carrying a retry action.

pub mod action;
pub mod center;
pub mod templates;

pub use action::{ActionFuture, NotificationAction};
pub use center::{Notification, NotificationCenter, NotificationId};
