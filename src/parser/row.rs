use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::{debug, warn};

use super::text::{clean, extract, extract_as, split_at_word};
use crate::db::{StationInfo, StationRecord, StationSocket, StationStatus};

// Cells are matched on the full class attribute, the same way the page writes
// them; `.col-4` alone would hit both the address and the name cell.
static NUMBER_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"td[class="text-center d-none d-md-table-cell col-2"]"#).unwrap());
static ADDRESS_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"td[class="text-center d-none d-md-table-cell col-4"]"#).unwrap());
static NAME_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"td[class="text-center col-4"]"#).unwrap());
static STATUS_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"td[class="text-center status col-2"]"#).unwrap());
static SOCKET_ENTRY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"№ (\d+)").unwrap());
static CITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"г\. ([\w\s-]+),").unwrap());
static POWER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r", (\d+(\.\d+)?) kWh").unwrap());

#[derive(Debug, Clone, PartialEq)]
struct SocketEntry {
    charger_port: u32,
    status: String,
    socket: String,
}

/// One `<tr>` of the station table → one record per socket listed in its
/// status cell. Rows without a readable station number yield nothing.
pub fn parse_row(row: ElementRef<'_>, timestamp: DateTime<Utc>) -> Vec<StationRecord> {
    let Some(number) = station_number(row) else {
        warn!(row = %clean(&element_text(row)), "skipping row: station number not found");
        return Vec::new();
    };

    let (city, address) = location(row);
    let (power, name) = power_and_name(row);
    let info = StationInfo {
        number,
        city,
        address,
        name,
    };

    sockets(row, number)
        .into_iter()
        .map(|entry| StationRecord {
            info: info.clone(),
            socket: StationSocket {
                station_number: number,
                socket: entry.socket,
                charger_port: entry.charger_port,
                power,
            },
            status: StationStatus {
                status: entry.status,
                timestamp,
            },
        })
        .collect()
}

fn cell_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector).next().map(element_text)
}

/// A table row carrying at least one station cell. Markup without them (an
/// error page laid out as a table, a header row) is not station data.
pub fn is_station_row(row: ElementRef<'_>) -> bool {
    row.select(&NUMBER_CELL).next().is_some() || row.select(&STATUS_CELL).next().is_some()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

fn station_number(row: ElementRef<'_>) -> Option<i64> {
    let text = cell_text(row, &NUMBER_CELL)?;
    extract_as::<i64>(&text, &NUMBER_RE).value
}

fn location(row: ElementRef<'_>) -> (Option<String>, String) {
    let text = cell_text(row, &ADDRESS_CELL).unwrap_or_default();
    let e = extract(&text, &CITY_RE);
    (e.value, e.rest)
}

fn power_and_name(row: ElementRef<'_>) -> (Option<f64>, String) {
    let text = cell_text(row, &NAME_CELL).unwrap_or_default();
    let e = extract_as::<f64>(&text, &POWER_RE);
    (e.value, e.rest)
}

/// Ports are numbered by position, so an unreadable entry still takes its slot.
fn sockets(row: ElementRef<'_>, number: i64) -> Vec<SocketEntry> {
    let Some(cell) = row.select(&STATUS_CELL).next() else {
        debug!(number, "no status cell");
        return Vec::new();
    };

    cell.select(&SOCKET_ENTRY)
        .zip(1u32..)
        .filter_map(|(span, charger_port)| {
            match split_at_word(&element_text(span), 0) {
                (Some(status), socket) => Some(SocketEntry {
                    charger_port,
                    status,
                    socket,
                }),
                (None, _) => {
                    warn!(number, charger_port, "empty socket entry");
                    None
                }
            }
        })
        .collect()
}
