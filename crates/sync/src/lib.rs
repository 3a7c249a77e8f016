//! Change propagation and reconciliation engine.
//!
//! ```text
//!             ┌──────────┐   candidates   ┌────────────┐  events  ┌────────────┐
//!  timer ───► │ Fetcher  │ ─────────────► │ Reconciler │ ───────► │ Propagator │
//!  run_now    └──────────┘                └────────────┘          └─────┬──────┘
//!                                                                       │
//!                                            ┌──────────────────────────┼──────────┐
//!                                            ▼                          ▼          │
//!                                     ┌─────────────┐            ┌───────────┐     │
//!                                     │SubscriberHub│ ◄───────── │ BusBridge │ ◄── bus
//!                                     └─────────────┘  remote    └───────────┘
//!                                       (WebSocket)    changes    publish_local ──► bus
//! ```
//!
//! Local changes reach both the hub and the bus. Changes that arrive from the
//! bus are applied to the store and reach the hub only, so they are never
//! echoed back onto the bus.

pub mod bridge;
pub mod fetcher;
pub mod hub;
pub mod propagator;
pub mod reconciler;
pub mod scheduler;

pub use bridge::BusBridge;
pub use fetcher::{Fetcher, HtmlFetcher, StaticFetcher};
pub use hub::{BroadcastReport, SendError, Subscriber, SubscriberHub, SubscriberId};
pub use propagator::Propagator;
pub use reconciler::{ReconcileError, Reconciler, Reconciliation};
pub use scheduler::{Scheduler, SchedulerState};
