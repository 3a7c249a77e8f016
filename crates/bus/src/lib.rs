//! Message bus plumbing for newswire.
//!
//! Instances replicate changes by publishing JSON event envelopes on a
//! single subject and consuming everything published there by their peers.
//!
//! ```text
//!   instance A ──publish──►  items.updates  ──deliver──► instance B
//!              ◄─deliver──                  ◄─publish──
//! ```
//!
//! - [`NatsBus`]: production transport over `async-nats`
//! - [`MemoryBus`]: in-process transport for single-node runs and tests

pub mod error;
pub mod memory;
pub mod nats;
pub mod traits;

pub use error::BusError;
pub use memory::MemoryBus;
pub use nats::NatsBus;
pub use traits::{Bus, BusSubscription};

/// Subject every instance publishes to and subscribes on.
pub const SUBJECT: &str = "items.updates";
