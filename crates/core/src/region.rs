//! Jurisdiction partitioning for region-sharded portals.
//!
//! Brazilian CNJ process numbers (`NNNNNNN-DD.AAAA.J.TR.OOOO`) embed
//! the court/region in the `TR` segment. Portals whose backends are
//! sharded by region are driven one region at a time, so rows are
//! grouped by that segment while remembering each row's original
//! position for progress reporting.

use std::collections::HashMap;

use crate::error::CoreError;
use crate::record::BotRecord;

/// Column expected to carry the CNJ process number.
pub const COL_PROCESS_NUMBER: &str = "NUMERO_PROCESSO";

/// A parsed CNJ process number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessNumber {
    sequential: String,
    check_digits: String,
    year: String,
    segment: String,
    region: String,
    origin: String,
}

impl ProcessNumber {
    /// Parse a CNJ number, tolerating missing punctuation.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            regex::Regex::new(r"^(\d{7})-?(\d{2})\.?(\d{4})\.?(\d)\.?(\d{2})\.?(\d{4})$")
                .expect("valid regex")
        });

        let caps = re
            .captures(raw.trim())
            .ok_or_else(|| CoreError::InvalidProcessNumber(raw.to_string()))?;

        Ok(Self {
            sequential: caps[1].to_string(),
            check_digits: caps[2].to_string(),
            year: caps[3].to_string(),
            segment: caps[4].to_string(),
            region: caps[5].to_string(),
            origin: caps[6].to_string(),
        })
    }

    /// Region code (`TR` segment), e.g. `"11"` for TRT-11.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Canonical punctuated form.
    pub fn canonical(&self) -> String {
        format!(
            "{}-{}.{}.{}.{}.{}",
            self.sequential, self.check_digits, self.year, self.segment, self.region, self.origin
        )
    }
}

/// Rows grouped by region, plus each row's original position.
#[derive(Debug, Default)]
pub struct RegionPartition {
    regions: Vec<(String, Vec<BotRecord>)>,
    /// Canonical process number -> 0-based position in the original
    /// spreadsheet order.
    positions: HashMap<String, usize>,
}

impl RegionPartition {
    /// Partition records by the region embedded in their process
    /// number. Records with unparseable numbers are skipped; their
    /// process number is rewritten to the canonical punctuated form so
    /// position lookups stay consistent downstream.
    pub fn from_records(records: &[BotRecord]) -> Self {
        let mut partition = Self::default();

        for (position, record) in records.iter().enumerate() {
            let Some(raw) = record.get(COL_PROCESS_NUMBER) else {
                continue;
            };
            let Ok(number) = ProcessNumber::parse(raw) else {
                continue;
            };

            let canonical = number.canonical();
            let mut record = record.clone();
            record.set(COL_PROCESS_NUMBER, canonical.clone());

            partition.positions.insert(canonical, position);

            match partition
                .regions
                .iter_mut()
                .find(|(region, _)| *region == number.region())
            {
                Some((_, rows)) => rows.push(record),
                None => partition
                    .regions
                    .push((number.region().to_string(), vec![record])),
            }
        }

        partition
    }

    /// Regions in first-seen order with their rows.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[BotRecord])> {
        self.regions
            .iter()
            .map(|(region, rows)| (region.as_str(), rows.as_slice()))
    }

    /// Regions with owned rows, consuming the partition.
    pub fn into_regions(self) -> (Vec<(String, Vec<BotRecord>)>, HashMap<String, usize>) {
        (self.regions, self.positions)
    }

    /// 0-based original position of a process number.
    pub fn position(&self, process_number: &str) -> Option<usize> {
        self.positions.get(process_number).copied()
    }

    /// Total rows across all regions.
    pub fn total_rows(&self) -> usize {
        self.positions.len()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}
