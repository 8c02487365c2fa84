use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to fetch page {url}: status code {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("page cache {path:?}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The page no longer looks like the station table we know how to read.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("station table (<tbody> with station rows) not found in page")]
    MissingTableBody,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("station {number} not found right after upsert")]
    MissingStation { number: i64 },
    #[error("socket {socket:?} (port {charger_port}) of station id {station_id} not found right after upsert")]
    MissingSocket {
        station_id: i64,
        charger_port: u32,
        socket: String,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{path:?} does not start with the station key columns (found {found:?})")]
    UnexpectedHeader { path: PathBuf, found: Vec<String> },
}

/// Everything that can end a single scrape cycle early.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Structure(#[from] StructureError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Export(#[from] ExportError),
}
