use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::db::{SaveStats, StationRecord, Store};
use crate::error::{CycleError, StructureError};
use crate::export::{CsvExporter, ExportStats};
use crate::fetch::PageSource;
use crate::parser::StationDataParser;

/// Where parsed batches go. The two backends are alternatives, never combined.
pub enum Sink {
    Database(Store),
    Csv(CsvExporter),
}

#[derive(Debug)]
pub enum Written {
    Database(SaveStats),
    Csv(ExportStats),
}

#[derive(Debug)]
pub struct CycleReport {
    pub timestamp: DateTime<Utc>,
    pub records: usize,
    pub written: Written,
}

impl Sink {
    fn write(&self, records: &[StationRecord]) -> Result<Written, CycleError> {
        Ok(match self {
            Sink::Database(store) => Written::Database(store.save_batch(records)?),
            Sink::Csv(exporter) => Written::Csv(exporter.export(records)?),
        })
    }
}

/// One fetch → parse → write pass. Nothing reaches the sink unless the page
/// parsed.
pub async fn run_cycle<S: PageSource>(source: &S, sink: &Sink) -> Result<CycleReport, CycleError> {
    let page = source.fetch_page().await?;
    let (timestamp, records) = parse_page(&page)?;
    let written = sink.write(&records)?;
    Ok(CycleReport {
        timestamp,
        records: records.len(),
        written,
    })
}

// Keeps the parsed document out of the async state machine.
fn parse_page(page: &str) -> Result<(DateTime<Utc>, Vec<StationRecord>), StructureError> {
    let parser = StationDataParser::new(page);
    let records = parser.parse()?;
    Ok((parser.timestamp(), records))
}

/// Run a cycle every `period` until Ctrl-C.
pub async fn run_every<S: PageSource>(source: &S, sink: &Sink, period: Duration) {
    run_until(source, sink, period, tokio::signal::ctrl_c()).await
}

/// Cycles never overlap: a tick that comes due while a cycle is still running
/// is skipped. A failed cycle is logged and the next tick is its retry.
pub async fn run_until<S, F>(source: &S, sink: &Sink, period: Duration, shutdown: F)
where
    S: PageSource,
    F: Future,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    info!(period_secs = period.as_secs(), "scheduler started");
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("stopping the scheduler ...");
                break;
            }
            _ = ticker.tick() => match run_cycle(source, sink).await {
                Ok(report) => info!(
                    timestamp = %report.timestamp,
                    records = report.records,
                    written = ?report.written,
                    "cycle complete"
                ),
                Err(e) => log_failure(&e),
            },
        }
    }
}

pub fn log_failure(e: &CycleError) {
    match e {
        CycleError::Fetch(e) => warn!("no batch this cycle: {}", e),
        CycleError::Structure(e) => error!("page layout changed, cycle skipped: {}", e),
        CycleError::Persistence(e) => error!("batch rolled back: {}", e),
        CycleError::Export(e) => error!("csv export failed: {}", e),
    }
}
