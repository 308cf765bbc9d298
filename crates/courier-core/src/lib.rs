//! Shared vocabulary for the Courier delivery pipeline.
//!
//! Holds the data model (messages, queue items, agents), the error
//! taxonomy, configuration loading, and the client event bus that
//! presentation layers subscribe to.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::CourierConfig;
pub use error::{ApiError, CourierError, DeliveryError, Result};
pub use events::{ClientEvent, EventBus};
pub use types::*;
