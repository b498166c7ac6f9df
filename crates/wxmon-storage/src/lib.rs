//! Persistence boundary for the telemetry pipeline.
//!
//! A single [`WeatherStore`] wraps the connection pool and exposes the
//! operations the consumer, the alert lifecycle manager and the liveness
//! monitor need: idempotent reading inserts, conditional alert state
//! transitions, rule listing and the station projection. Uniqueness
//! constraints defined in the `migration` crate, not in-process locks,
//! are what make concurrent workers safe.

pub mod entities;
pub mod error;
pub mod store;


pub use error::{Result, StorageError};
pub use store::{AlertConfigRow, AlertRow, NewAlert, OpenAlertInsert, StationRow, WeatherStore};
