//! Shared domain types for the CrawJUD orchestration core.
//!
//! Pure types and functions only: no I/O, no internal dependencies.
//! Everything here is consumed by the engine, channel, gateway, and
//! worker crates.

pub mod counters;
pub mod error;
pub mod events;
pub mod normalize;
pub mod pid;
pub mod record;
pub mod region;
pub mod text;

pub use counters::JobCounters;
pub use error::CoreError;
pub use pid::Pid;
pub use record::BotRecord;
