pub mod config;
pub mod error;
pub mod geo;
pub mod permissions;
pub mod types;

pub use config::{Config, CounterPolicy, ModerationPolicy};
pub use error::{TravelError, TravelResult};
pub use permissions::{Permission, Role};
pub use types::*;
