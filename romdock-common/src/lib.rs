//! # romdock Common Library
//!
//! Shared code for the romdock crates:
//! - Error type used by storage and configuration code
//! - Configuration loading and root folder resolution
//! - Event types (RomdockEvent enum) and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
