//! Job execution engine.
//!
//! A job flows INIT → AUTH → LOAD → RUN → FINALIZE, driven by the
//! [`controller`]. The [`loader`] turns the stored input bundle into
//! normalized records, [`rows`] (or [`region`] for region-sharded
//! portals) executes the per-row protocol against a [`traits::Portal`],
//! and the [`accumulator`] owns the result spreadsheet. Portal-specific
//! scraping lives behind the traits; nothing in this crate knows about
//! selectors.

pub mod accumulator;
pub mod archive;
pub mod context;
pub mod controller;
pub mod error;
pub mod loader;
pub mod region;
pub mod rows;
pub mod traits;

pub use context::JobContext;
pub use controller::{run_job, JobConfig, JobSummary, RunMode};
pub use error::EngineError;
