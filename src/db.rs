use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::PersistenceError;

// ── Scraped records ──

#[derive(Debug, Clone, PartialEq)]
pub struct StationInfo {
    pub number: i64,
    pub city: Option<String>,
    pub address: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationSocket {
    pub station_number: i64,
    pub socket: String,
    pub charger_port: u32,
    pub power: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// One socket of one station as seen in one scrape cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub info: StationInfo,
    pub socket: StationSocket,
    pub status: StationStatus,
}

// ── Store ──

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn close(self) -> Result<(), PersistenceError> {
        self.conn.close().map_err(|(_, e)| e.into())
    }

    pub fn init_schema(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS station_info (
                id         INTEGER PRIMARY KEY,
                number     INTEGER UNIQUE NOT NULL,
                city       TEXT,
                address    TEXT NOT NULL,
                name       TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS station_socket (
                id           INTEGER PRIMARY KEY,
                station_id   INTEGER NOT NULL REFERENCES station_info(id) ON DELETE CASCADE,
                charger_port INTEGER NOT NULL,
                socket       TEXT NOT NULL,
                power        REAL,
                created_at   TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(station_id, charger_port, socket)
            );

            CREATE TABLE IF NOT EXISTS station_status (
                station_socket_id INTEGER NOT NULL REFERENCES station_socket(id) ON DELETE CASCADE,
                status            TEXT NOT NULL,
                timestamp         TEXT NOT NULL,
                PRIMARY KEY (station_socket_id, timestamp)
            );
            CREATE INDEX IF NOT EXISTS idx_station_status_timestamp ON station_status(timestamp);
            ",
        )?;
        Ok(())
    }

    /// Persist one cycle's batch: station info and sockets are upserted on
    /// their natural keys, statuses are appended. Either the whole batch is
    /// committed or none of it.
    pub fn save_batch(&self, records: &[StationRecord]) -> Result<SaveStats, PersistenceError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stats = SaveStats::default();

        for record in records {
            let station_id = upsert_info(&tx, &record.info)?;
            let socket_id = upsert_socket(&tx, station_id, &record.socket)?;
            if insert_status(&tx, socket_id, &record.status)? {
                stats.statuses_inserted += 1;
            } else {
                debug!(
                    number = record.socket.station_number,
                    charger_port = record.socket.charger_port,
                    timestamp = %record.status.timestamp,
                    "status already recorded for this cycle"
                );
                stats.statuses_duplicate += 1;
            }
            stats.records += 1;
        }

        tx.commit()?;
        info!(
            records = stats.records,
            inserted = stats.statuses_inserted,
            duplicate = stats.statuses_duplicate,
            "batch saved"
        );
        Ok(stats)
    }

    pub fn stats(&self) -> Result<Stats, PersistenceError> {
        let count = |table: &str| -> Result<usize, rusqlite::Error> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        };
        let stations = count("station_info")?;
        let sockets = count("station_socket")?;
        let statuses = count("station_status")?;
        let (cycles, latest_cycle): (usize, Option<DateTime<Utc>>) = self.conn.query_row(
            "SELECT COUNT(DISTINCT timestamp), MAX(timestamp) FROM station_status",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(Stats {
            stations,
            sockets,
            statuses,
            cycles,
            latest_cycle,
        })
    }

    /// Most recent status of every socket, optionally for one station.
    pub fn latest(&self, station: Option<i64>) -> Result<Vec<LatestRow>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT i.number, COALESCE(i.city, ''), i.address, i.name,
                    s.charger_port, s.socket, s.power, st.status, st.timestamp
             FROM station_socket s
             JOIN station_info i ON i.id = s.station_id
             JOIN station_status st ON st.station_socket_id = s.id
             WHERE st.timestamp = (
                     SELECT MAX(timestamp) FROM station_status WHERE station_socket_id = s.id
                   )
               AND (?1 IS NULL OR i.number = ?1)
             ORDER BY i.number, s.charger_port, s.socket",
        )?;
        let rows = stmt
            .query_map([station], |row| {
                Ok(LatestRow {
                    number: row.get(0)?,
                    city: row.get(1)?,
                    address: row.get(2)?,
                    name: row.get(3)?,
                    charger_port: row.get(4)?,
                    socket: row.get(5)?,
                    power: row.get(6)?,
                    status: row.get(7)?,
                    timestamp: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn upsert_info(tx: &Transaction<'_>, info: &StationInfo) -> Result<i64, PersistenceError> {
    tx.prepare_cached(
        "INSERT INTO station_info (number, city, address, name)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(number) DO UPDATE SET
             city = excluded.city,
             address = excluded.address,
             name = excluded.name",
    )?
    .execute(params![info.number, info.city, info.address, info.name])?;

    tx.prepare_cached("SELECT id FROM station_info WHERE number = ?1")?
        .query_row([info.number], |r| r.get(0))
        .optional()?
        .ok_or(PersistenceError::MissingStation {
            number: info.number,
        })
}

fn upsert_socket(
    tx: &Transaction<'_>,
    station_id: i64,
    socket: &StationSocket,
) -> Result<i64, PersistenceError> {
    tx.prepare_cached(
        "INSERT INTO station_socket (station_id, charger_port, socket, power)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(station_id, charger_port, socket) DO UPDATE SET
             power = excluded.power",
    )?
    .execute(params![station_id, socket.charger_port, socket.socket, socket.power])?;

    tx.prepare_cached(
        "SELECT id FROM station_socket
         WHERE station_id = ?1 AND charger_port = ?2 AND socket = ?3",
    )?
    .query_row(params![station_id, socket.charger_port, socket.socket], |r| r.get(0))
    .optional()?
    .ok_or_else(|| PersistenceError::MissingSocket {
        station_id,
        charger_port: socket.charger_port,
        socket: socket.socket.clone(),
    })
}

/// `false` when this socket already has a status for the timestamp.
fn insert_status(
    tx: &Transaction<'_>,
    socket_id: i64,
    status: &StationStatus,
) -> Result<bool, PersistenceError> {
    let inserted = tx
        .prepare_cached(
            "INSERT INTO station_status (station_socket_id, status, timestamp)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(station_socket_id, timestamp) DO NOTHING",
        )?
        .execute(params![socket_id, status.status, status.timestamp])?;
    Ok(inserted == 1)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveStats {
    pub records: usize,
    pub statuses_inserted: usize,
    pub statuses_duplicate: usize,
}

// ── Read side ──

#[derive(Debug, Serialize)]
pub struct Stats {
    pub stations: usize,
    pub sockets: usize,
    pub statuses: usize,
    pub cycles: usize,
    pub latest_cycle: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct LatestRow {
    pub number: i64,
    pub city: String,
    pub address: String,
    pub name: String,
    pub charger_port: u32,
    pub socket: String,
    pub power: Option<f64>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 13, 16, 20, 0).unwrap()
    }

    fn store() -> Store {
        let store = Store::in_memory().unwrap();
        store.init_schema().unwrap();
        store
    }

    fn record(number: i64, city: &str, port: u32, socket: &str, status: &str, ts: DateTime<Utc>) -> StationRecord {
        StationRecord {
            info: StationInfo {
                number,
                city: Some(city.to_string()),
                address: "ул. Ленина 5,".to_string(),
                name: "СуперЗаряд".to_string(),
            },
            socket: StationSocket {
                station_number: number,
                socket: socket.to_string(),
                charger_port: port,
                power: Some(150.5),
            },
            status: StationStatus {
                status: status.to_string(),
                timestamp: ts,
            },
        }
    }

    fn batch(ts: DateTime<Utc>) -> Vec<StationRecord> {
        vec![
            record(329, "Москва", 1, "Type2", "Свободно", ts),
            record(329, "Москва", 2, "CCS", "Занято", ts),
            record(365, "Москва", 1, "CCS", "Свободно", ts),
            record(365, "Москва", 2, "CCS", "Свободно", ts),
        ]
    }

    fn count(store: &Store, table: &str) -> usize {
        store
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn saves_three_levels() {
        let store = store();
        let stats = store.save_batch(&batch(t0())).unwrap();
        assert_eq!(stats.records, 4);
        assert_eq!(stats.statuses_inserted, 4);
        assert_eq!(count(&store, "station_info"), 2);
        assert_eq!(count(&store, "station_socket"), 4);
        assert_eq!(count(&store, "station_status"), 4);
    }

    #[test]
    fn same_batch_twice_is_idempotent() {
        let store = store();
        store.save_batch(&batch(t0())).unwrap();
        let again = store.save_batch(&batch(t0())).unwrap();

        assert_eq!(again.statuses_inserted, 0);
        assert_eq!(again.statuses_duplicate, 4);
        assert_eq!(count(&store, "station_info"), 2);
        assert_eq!(count(&store, "station_socket"), 4);
        assert_eq!(count(&store, "station_status"), 4);
    }

    #[test]
    fn next_cycle_appends_statuses() {
        let store = store();
        store.save_batch(&batch(t0())).unwrap();
        store.save_batch(&batch(t0() + Duration::minutes(1))).unwrap();

        assert_eq!(count(&store, "station_socket"), 4);
        assert_eq!(count(&store, "station_status"), 8);

        let s = store.stats().unwrap();
        assert_eq!(s.cycles, 2);
        assert_eq!(s.latest_cycle, Some(t0() + Duration::minutes(1)));
    }

    #[test]
    fn changed_city_updates_in_place() {
        let store = store();
        store
            .save_batch(&[record(329, "Москва", 1, "Type2", "Свободно", t0())])
            .unwrap();
        store
            .save_batch(&[record(329, "Химки", 1, "Type2", "Свободно", t0() + Duration::minutes(1))])
            .unwrap();

        let cities: Vec<String> = store
            .conn
            .prepare("SELECT city FROM station_info WHERE number = 329")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(cities, vec!["Химки".to_string()]);
    }

    #[test]
    fn failed_batch_rolls_back() {
        let store = store();
        store.conn.execute_batch("DROP TABLE station_status").unwrap();

        let err = store.save_batch(&batch(t0())).unwrap_err();
        assert!(matches!(err, PersistenceError::Sqlite(_)));
        assert_eq!(count(&store, "station_info"), 0);
        assert_eq!(count(&store, "station_socket"), 0);
    }

    #[test]
    fn missing_power_is_stored_as_null() {
        let store = store();
        let mut r = record(7, "Тула", 1, "Type2", "Свободно", t0());
        r.socket.power = None;
        r.info.city = None;
        store.save_batch(&[r]).unwrap();

        let rows = store.latest(Some(7)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].power, None);
        assert_eq!(rows[0].city, "");
    }

    #[test]
    fn latest_picks_newest_status() {
        let store = store();
        store.save_batch(&batch(t0())).unwrap();
        let mut next = batch(t0() + Duration::minutes(1));
        next[0].status.status = "Занято".to_string();
        store.save_batch(&next).unwrap();

        let rows = store.latest(Some(329)).unwrap();
        let got: Vec<(u32, &str, &str)> = rows
            .iter()
            .map(|r| (r.charger_port, r.socket.as_str(), r.status.as_str()))
            .collect();
        assert_eq!(got, vec![(1, "Type2", "Занято"), (2, "CCS", "Занято")]);
        assert!(rows.iter().all(|r| r.timestamp == t0() + Duration::minutes(1)));

        assert_eq!(store.latest(None).unwrap().len(), 4);
    }
}
