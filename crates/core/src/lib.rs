pub mod config;
pub mod error;
pub mod event;
pub mod record;

pub use config::Config;
pub use error::*;
pub use event::{ChangeEvent, DecodeError, RemoteChange, TaskSummary};
pub use record::*;
