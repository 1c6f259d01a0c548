//! Seams between the engine and portal-specific code.
//!
//! The engine drives these traits; concrete implementations (one per
//! judicial portal and operation) live outside this crate and own all
//! selector/scraping knowledge.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crawjud_core::BotRecord;

use crate::error::EngineError;

/// Result of searching the portal for a record's process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Located {
    Found,
    NotFound,
}

/// Output of one successful row operation.
#[derive(Debug, Clone)]
pub struct RowOutput {
    /// Rows to append to the result spreadsheet.
    pub rows: Vec<BotRecord>,
    /// Sheet the rows belong to.
    pub sheet_name: String,
    /// Proof artifact the portal materialized for this row. The engine
    /// stages it into the job output dir under a pid-bearing name and
    /// records that name on the saved rows.
    pub proof_file: Option<PathBuf>,
}

impl RowOutput {
    pub fn new(rows: Vec<BotRecord>, sheet_name: impl Into<String>) -> Self {
        Self {
            rows,
            sheet_name: sheet_name.into(),
            proof_file: None,
        }
    }

    pub fn with_proof(mut self, path: impl Into<PathBuf>) -> Self {
        self.proof_file = Some(path.into());
        self
    }
}

/// A browser-driven portal session.
#[async_trait]
pub trait Portal: Send {
    /// Log in. Called once at job start and again whenever the session
    /// expires mid-job.
    async fn authenticate(&mut self) -> Result<(), EngineError>;

    /// True when the portal has dropped the session.
    async fn session_expired(&mut self) -> Result<bool, EngineError>;

    /// Search the portal for the record's process.
    async fn locate(&mut self, record: &BotRecord) -> Result<Located, EngineError>;

    /// Perform the bot operation on a located process.
    async fn operate(&mut self, record: &BotRecord) -> Result<RowOutput, EngineError>;
}

/// The browser underneath a [`Portal`].
#[async_trait]
pub trait BrowserDriver: Send {
    /// Number of open browser windows; 0 means the browser died.
    async fn window_count(&mut self) -> usize;

    /// Start a fresh browser after a crash.
    async fn relaunch(&mut self) -> Result<(), EngineError>;

    /// Best-effort screenshot of the current page.
    async fn screenshot(&mut self, path: &Path) -> Result<(), EngineError>;

    /// Tear the browser down. Never fails.
    async fn quit(&mut self);
}

/// An HTTP session bound to one region of a region-sharded portal.
#[async_trait]
pub trait RegionSession: Send {
    async fn authenticate(&mut self) -> Result<(), EngineError>;

    async fn locate(&mut self, record: &BotRecord) -> Result<Located, EngineError>;

    async fn operate(&mut self, record: &BotRecord) -> Result<RowOutput, EngineError>;
}

/// Factory opening one [`RegionSession`] per region, so regions can be
/// driven concurrently with independent cookie jars.
#[async_trait]
pub trait RegionPortal: Send + Sync {
    async fn open_region(&self, region: &str) -> Result<Box<dyn RegionSession>, EngineError>;
}
