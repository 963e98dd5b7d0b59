//! ScaraLink - serial bridge for a SCARA robot controller
//!
//! This library provides the core components for bridging network clients
//! to an Arduino-class SCARA controller over a serial link.
//!
//! ## Components
//!
//! - [`supervisor`]: the always-on link supervisor state machine
//! - [`locator`]: controller discovery via USB port signatures
//! - [`telemetry`]: line-oriented device protocol decoding
//! - [`registry`]: client registry and event fan-out
//! - [`kinematics`]: two-link inverse kinematics solver

pub mod config;
pub mod error;
pub mod events;
pub mod kinematics;
pub mod locator;
pub mod registry;
pub mod server;
pub mod supervisor;
pub mod telemetry;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
