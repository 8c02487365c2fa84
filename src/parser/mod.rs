pub mod row;
pub mod text;

use std::sync::LazyLock;

use chrono::{DateTime, SubsecRound, Utc};
use scraper::{Html, Selector};
use tracing::debug;

use crate::db::StationRecord;
use crate::error::StructureError;

static TABLE_BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody").unwrap());
static TABLE_ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());

/// Parses one fetched page into the batch of a single scrape cycle.
///
/// The status timestamp is fixed when the parser is built and shared by every
/// record it produces.
pub struct StationDataParser {
    document: Html,
    timestamp: DateTime<Utc>,
}

impl StationDataParser {
    pub fn new(page_html: &str) -> Self {
        Self::with_timestamp(page_html, Utc::now().trunc_subsecs(0))
    }

    pub fn with_timestamp(page_html: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            document: Html::parse_document(page_html),
            timestamp,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Records in document order: row by row, then port by port.
    ///
    /// html5ever adds a `<tbody>` to every table, so the station table is the
    /// first body that holds station cells, not just the first body.
    pub fn parse(&self) -> Result<Vec<StationRecord>, StructureError> {
        let body = self
            .document
            .select(&TABLE_BODY)
            .find(|tbody| tbody.select(&TABLE_ROW).any(row::is_station_row))
            .ok_or(StructureError::MissingTableBody)?;

        let mut rows = 0usize;
        let records: Vec<StationRecord> = body
            .select(&TABLE_ROW)
            .inspect(|_| rows += 1)
            .flat_map(|tr| row::parse_row(tr, self.timestamp))
            .collect();

        debug!(rows, records = records.len(), "parsed station table");
        Ok(records)
    }
}
