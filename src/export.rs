use std::collections::HashMap;
use std::path::PathBuf;

use tracing::info;

use crate::db::StationRecord;
use crate::error::ExportError;

const KEY_COLUMNS: [&str; 5] = [
    "station_number",
    "station_address",
    "station_name",
    "station_type",
    "charger_port",
];
const COLUMN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wide CSV sink: one row per socket, one status column per scrape cycle.
pub struct CsvExporter {
    path: PathBuf,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub rows_updated: usize,
    pub rows_added: usize,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn export(&self, records: &[StationRecord]) -> Result<ExportStats, ExportError> {
        let Some(first) = records.first() else {
            return Ok(ExportStats::default());
        };
        let column = first.status.timestamp.format(COLUMN_TIME_FORMAT).to_string();

        let (mut headers, mut rows) = self.load()?;
        let col = match headers.iter().position(|h| *h == column) {
            Some(i) => i,
            None => {
                headers.push(column.clone());
                headers.len() - 1
            }
        };
        for row in rows.iter_mut() {
            row.resize(headers.len(), String::new());
        }

        let mut index: HashMap<Vec<String>, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row[..KEY_COLUMNS.len()].to_vec(), i))
            .collect();

        let mut stats = ExportStats::default();
        for record in records {
            let key = row_key(record);
            match index.get(&key) {
                Some(&i) => {
                    rows[i][col] = record.status.status.clone();
                    stats.rows_updated += 1;
                }
                None => {
                    let mut row = vec![String::new(); headers.len()];
                    row[..KEY_COLUMNS.len()].clone_from_slice(&key);
                    row[col] = record.status.status.clone();
                    index.insert(key, rows.len());
                    rows.push(row);
                    stats.rows_added += 1;
                }
            }
        }

        self.store(&headers, &rows)?;
        info!(
            path = ?self.path,
            column = %column,
            updated = stats.rows_updated,
            added = stats.rows_added,
            "csv export written"
        );
        Ok(stats)
    }

    fn load(&self) -> Result<(Vec<String>, Vec<Vec<String>>), ExportError> {
        if !self.path.exists() {
            return Ok((KEY_COLUMNS.iter().map(|c| c.to_string()).collect(), Vec::new()));
        }

        // Not flexible: a record wider or narrower than the header fails the read.
        let mut reader = csv::ReaderBuilder::new().from_path(&self.path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() {
            return Ok((KEY_COLUMNS.iter().map(|c| c.to_string()).collect(), Vec::new()));
        }
        if headers.len() < KEY_COLUMNS.len() || headers[..KEY_COLUMNS.len()] != KEY_COLUMNS {
            return Err(ExportError::UnexpectedHeader {
                path: self.path.clone(),
                found: headers,
            });
        }

        let rows = reader
            .records()
            .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect::<Vec<_>>()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((headers, rows))
    }

    /// Written next to the target and renamed over it.
    fn store(&self, headers: &[String], rows: &[Vec<String>]) -> Result<(), ExportError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(headers)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        drop(writer);

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn row_key(record: &StationRecord) -> Vec<String> {
    let address = match &record.info.city {
        Some(city) => format!("г. {}, {}", city, record.info.address),
        None => record.info.address.clone(),
    };
    vec![
        record.info.number.to_string(),
        address,
        record.info.name.clone(),
        record.socket.socket.clone(),
        record.socket.charger_port.to_string(),
    ]
}
