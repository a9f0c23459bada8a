pub mod error;
pub mod postgres;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
#[cfg(feature = "test-utils")]
pub mod testutil;

pub use error::{as_duplicate, DuplicateKey};
pub use postgres::PgStore;
pub use traits::{EventStore, RadiusQuery, ReportStore, Store, TimeWindow, UserStore};
