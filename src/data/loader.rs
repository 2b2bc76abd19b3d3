use crate::calendar::{RollCalendar, RollCalendarRow};
use crate::data::bar::PriceBar;
use crate::data::series::{ContractPriceSeries, TimeSeries};
use crate::error::{EngineError, EngineResult};
use crate::instrument::ContractDate;
use crate::prices::{AdjustedPrices, MultiplePriceRow, MultiplePrices};
use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, Writer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

//fractional seconds are only written when present
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Serialize, Deserialize)]
struct PriceRecord {
    #[serde(rename = "DATETIME")]
    timestamp: String,
    #[serde(rename = "OPEN", default)]
    open: Option<f64>,
    #[serde(rename = "HIGH", default)]
    high: Option<f64>,
    #[serde(rename = "LOW", default)]
    low: Option<f64>,
    #[serde(rename = "FINAL", default)]
    close: Option<f64>,
    #[serde(rename = "VOLUME", default)]
    volume: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CalendarRecord {
    #[serde(rename = "DATE_TIME")]
    roll_date: String,
    current_contract: String,
    next_contract: String,
    carry_contract: String,
    #[serde(default)]
    carry_relaxed: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MultiplePriceRecord {
    #[serde(rename = "DATETIME")]
    timestamp: String,
    #[serde(rename = "PRICE", default)]
    price: Option<f64>,
    #[serde(rename = "CARRY", default)]
    carry: Option<f64>,
    #[serde(rename = "FORWARD", default)]
    forward: Option<f64>,
    #[serde(rename = "PRICE_CONTRACT")]
    price_contract: String,
    #[serde(rename = "CARRY_CONTRACT")]
    carry_contract: String,
    #[serde(rename = "FORWARD_CONTRACT")]
    forward_contract: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AdjustedRecord {
    #[serde(rename = "DATETIME")]
    timestamp: String,
    #[serde(default)]
    price: Option<f64>,
}

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

//accepts "yyyy-mm-dd hh:mm:ss[.fff]", the iso "T" separated form, or a bare date (midnight)
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn nan_if_missing(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

fn none_if_nan(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

//reads every record of a headed csv file, passing each one with its line number
fn read_records<R, P>(path: P) -> EngineResult<Vec<(usize, R)>>
where
    R: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut records = Vec::new();
    for (index, result) in reader.deserialize().enumerate() {
        let record: R = result?;
        records.push((index + 2, record));
    }

    Ok(records)
}

fn write_records<R, P>(path: P, records: impl IntoIterator<Item = R>) -> EngineResult<()>
where
    R: Serialize,
    P: AsRef<Path>,
{
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

fn timestamp_at(path: &Path, line: usize, value: &str) -> EngineResult<NaiveDateTime> {
    parse_timestamp(value).ok_or_else(|| EngineError::InvalidRecord {
        path: path.display().to_string(),
        line,
        message: format!("unparseable timestamp '{}'", value),
    })
}

//loads per-contract bars; empty cells become nan
pub fn load_contract_prices<P: AsRef<Path>>(path: P) -> EngineResult<ContractPriceSeries> {
    let path = path.as_ref();
    let mut points = Vec::new();

    for (line, record) in read_records::<PriceRecord, _>(path)? {
        let timestamp = timestamp_at(path, line, &record.timestamp)?;
        let bar = PriceBar::new(
            nan_if_missing(record.open),
            nan_if_missing(record.high),
            nan_if_missing(record.low),
            nan_if_missing(record.close),
            nan_if_missing(record.volume),
        )
        .map_err(|e| EngineError::InvalidRecord {
            path: path.display().to_string(),
            line,
            message: e.to_string(),
        })?;

        points.push((timestamp, bar));
    }

    //sort by timestamp to ensure chronological order
    Ok(TimeSeries::from_points(points))
}

pub fn write_contract_prices<P: AsRef<Path>>(path: P, series: &ContractPriceSeries) -> EngineResult<()> {
    write_records(
        path,
        series.iter().map(|(timestamp, bar)| PriceRecord {
            timestamp: format_timestamp(*timestamp),
            open: none_if_nan(bar.open),
            high: none_if_nan(bar.high),
            low: none_if_nan(bar.low),
            close: none_if_nan(bar.close),
            volume: none_if_nan(bar.volume),
        }),
    )
}

//contract ids as written by hand (eg 202003) are stored as yyyymmdd
fn contract_at(path: &Path, line: usize, value: &str) -> EngineResult<String> {
    ContractDate::new(value, 0)
        .map(|contract| contract.date_str())
        .map_err(|e| EngineError::InvalidRecord {
            path: path.display().to_string(),
            line,
            message: e.to_string(),
        })
}

//loads a roll calendar as stored; it is not validated so hand edited files can be checked afterwards
pub fn load_roll_calendar<P: AsRef<Path>>(path: P) -> EngineResult<RollCalendar> {
    let path = path.as_ref();
    let mut rows = Vec::new();

    for (line, record) in read_records::<CalendarRecord, _>(path)? {
        rows.push(RollCalendarRow {
            roll_date: timestamp_at(path, line, &record.roll_date)?,
            current_contract: contract_at(path, line, &record.current_contract)?,
            next_contract: contract_at(path, line, &record.next_contract)?,
            carry_contract: contract_at(path, line, &record.carry_contract)?,
            carry_relaxed: record.carry_relaxed.unwrap_or(false),
        });
    }

    Ok(RollCalendar::from_rows(rows))
}

pub fn write_roll_calendar<P: AsRef<Path>>(path: P, calendar: &RollCalendar) -> EngineResult<()> {
    write_records(
        path,
        calendar.rows().iter().map(|row| CalendarRecord {
            roll_date: format_timestamp(row.roll_date),
            current_contract: row.current_contract.clone(),
            next_contract: row.next_contract.clone(),
            carry_contract: row.carry_contract.clone(),
            carry_relaxed: Some(row.carry_relaxed),
        }),
    )
}

pub fn load_multiple_prices<P: AsRef<Path>>(path: P) -> EngineResult<MultiplePrices> {
    let path = path.as_ref();
    let mut points = Vec::new();

    for (line, record) in read_records::<MultiplePriceRecord, _>(path)? {
        let timestamp = timestamp_at(path, line, &record.timestamp)?;
        points.push((
            timestamp,
            MultiplePriceRow {
                price: nan_if_missing(record.price),
                carry: nan_if_missing(record.carry),
                forward: nan_if_missing(record.forward),
                price_contract: record.price_contract,
                carry_contract: record.carry_contract,
                forward_contract: record.forward_contract,
            },
        ));
    }

    Ok(MultiplePrices::new(TimeSeries::from_points(points)))
}

pub fn write_multiple_prices<P: AsRef<Path>>(path: P, prices: &MultiplePrices) -> EngineResult<()> {
    write_records(
        path,
        prices.iter().map(|(timestamp, row)| MultiplePriceRecord {
            timestamp: format_timestamp(*timestamp),
            price: none_if_nan(row.price),
            carry: none_if_nan(row.carry),
            forward: none_if_nan(row.forward),
            price_contract: row.price_contract.clone(),
            carry_contract: row.carry_contract.clone(),
            forward_contract: row.forward_contract.clone(),
        }),
    )
}

pub fn load_adjusted_prices<P: AsRef<Path>>(path: P) -> EngineResult<AdjustedPrices> {
    let path = path.as_ref();
    let mut points = Vec::new();

    for (line, record) in read_records::<AdjustedRecord, _>(path)? {
        let timestamp = timestamp_at(path, line, &record.timestamp)?;
        points.push((timestamp, nan_if_missing(record.price)));
    }

    Ok(AdjustedPrices::new(TimeSeries::from_points(points)))
}

pub fn write_adjusted_prices<P: AsRef<Path>>(path: P, prices: &AdjustedPrices) -> EngineResult<()> {
    write_records(
        path,
        prices.series().iter().map(|(timestamp, price)| AdjustedRecord {
            timestamp: format_timestamp(*timestamp),
            price: none_if_nan(*price),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2020, 3, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2020-03-02 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-03-02T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-03-02"), Some(expected));
        assert_eq!(parse_timestamp("02/03/2020"), None);
    }

    #[test]
    fn test_load_contract_prices_with_gaps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("20200300.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "DATETIME,OPEN,HIGH,LOW,FINAL,VOLUME").unwrap();
        writeln!(file, "2020-01-03 00:00:00,,,,101.5,").unwrap();
        writeln!(file, "2020-01-02 00:00:00,100,101,99,100.5,12").unwrap();
        drop(file);

        let series = load_contract_prices(&path).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.final_prices().values(), vec![100.5, 101.5]);
        assert!(series.points()[1].1.open.is_nan());

        //written back, missing values stay empty
        let out = dir.path().join("copy.csv");
        write_contract_prices(&out, &series).unwrap();
        assert_eq!(load_contract_prices(&out).unwrap(), series);
    }

    #[test]
    fn test_bad_timestamp_reports_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "DATETIME,FINAL\n2020-01-02,1.0\nnot a date,2.0\n").unwrap();

        match load_contract_prices(&path) {
            Err(EngineError::InvalidRecord { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_sub_second_timestamps_survive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("adjusted_prices.csv");
        let day = NaiveDate::from_ymd_opt(2020, 3, 2).unwrap();
        let adjusted = AdjustedPrices::new(TimeSeries::from_points(vec![
            (day.and_hms_opt(16, 0, 0).unwrap(), 100.0),
            (day.and_hms_milli_opt(16, 0, 0, 250).unwrap(), 100.5),
            (day.and_hms_opt(16, 0, 1).unwrap(), 101.0),
        ]));

        write_adjusted_prices(&path, &adjusted).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("2020-03-02 16:00:00,100"));
        assert!(contents.contains("2020-03-02 16:00:00.250,100.5"));

        assert_eq!(load_adjusted_prices(&path).unwrap(), adjusted);
    }

    #[test]
    fn test_calendar_contracts_are_normalised() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roll_calendar.csv");
        std::fs::write(
            &path,
            "DATE_TIME,current_contract,next_contract,carry_contract\n\
             2020-03-11,202003,202006,20200600\n",
        )
        .unwrap();

        let calendar = load_roll_calendar(&path).unwrap();
        let row = calendar.first().unwrap();
        assert_eq!(row.current_contract, "20200300");
        assert_eq!(row.next_contract, "20200600");
        assert_eq!(row.carry_contract, "20200600");
        assert!(!row.carry_relaxed);

        std::fs::write(
            &path,
            "DATE_TIME,current_contract,next_contract,carry_contract\n2020-03-11,202003,2020X6,202006\n",
        )
        .unwrap();
        match load_roll_calendar(&path) {
            Err(EngineError::InvalidRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
