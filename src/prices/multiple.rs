use crate::calendar::RollCalendar;
use crate::data::series::{ContractFinalPrices, TimeSeries};
use crate::error::{EngineError, EngineResult};
use crate::merge::{self, MergeConfig, MergeOutcome, MergeValue};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

//prices of the held (price), next held (forward) and carry contracts at one timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplePriceRow {
    pub price: f64,
    pub carry: f64,
    pub forward: f64,
    pub price_contract: String,
    pub carry_contract: String,
    pub forward_contract: String,
}

impl MultiplePriceRow {
    pub fn new(
        price: f64,
        forward: f64,
        carry: f64,
        price_contract: impl Into<String>,
        forward_contract: impl Into<String>,
        carry_contract: impl Into<String>,
    ) -> Self {
        MultiplePriceRow {
            price,
            carry,
            forward,
            price_contract: price_contract.into(),
            carry_contract: carry_contract.into(),
            forward_contract: forward_contract.into(),
        }
    }

    pub fn same_contracts_as(&self, other: &MultiplePriceRow) -> bool {
        self.price_contract == other.price_contract
            && self.forward_contract == other.forward_contract
            && self.carry_contract == other.carry_contract
    }

    pub fn contracts_label(&self) -> String {
        format!(
            "price {} forward {} carry {}",
            self.price_contract, self.forward_contract, self.carry_contract
        )
    }

    fn prices_mut(&mut self) -> [&mut f64; 3] {
        [&mut self.price, &mut self.forward, &mut self.carry]
    }

    fn prices(&self) -> [f64; 3] {
        [self.price, self.forward, self.carry]
    }

    fn all_prices_missing(&self) -> bool {
        self.prices().iter().all(|value| value.is_nan())
    }
}

impl PartialEq for MultiplePriceRow {
    fn eq(&self, other: &Self) -> bool {
        self.same_contracts_as(other)
            && self
                .prices()
                .iter()
                .zip(other.prices().iter())
                .all(|(a, b)| a.same_as(b))
    }
}

//labels always stay with the existing row, only prices are merged
impl MergeValue for MultiplePriceRow {
    fn spike_value(&self) -> f64 {
        self.price
    }

    fn fill_missing_from(&mut self, newer: &Self) {
        for (value, newer_value) in self.prices_mut().into_iter().zip(newer.prices()) {
            value.fill_missing_from(&newer_value);
        }
    }

    fn overwrite_from(&mut self, newer: &Self) {
        for (value, newer_value) in self.prices_mut().into_iter().zip(newer.prices()) {
            value.overwrite_from(&newer_value);
        }
    }

    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

//consecutive rows where the price contract changes
#[derive(Debug, Clone, Copy)]
pub struct RollPoint<'a> {
    pub previous_timestamp: NaiveDateTime,
    pub previous: &'a MultiplePriceRow,
    pub timestamp: NaiveDateTime,
    pub current: &'a MultiplePriceRow,
}

impl RollPoint<'_> {
    //forward minus price on the last day of the outgoing contract
    pub fn roll_differential(&self) -> f64 {
        self.previous.forward - self.previous.price
    }
}

//the price, forward and carry series of one instrument with their contract labels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiplePrices {
    series: TimeSeries<MultiplePriceRow>,
}

impl MultiplePrices {
    pub fn new(series: TimeSeries<MultiplePriceRow>) -> Self {
        MultiplePrices { series }
    }

    //labels every timestamp of window (previous roll date, roll date] with the
    //contracts of that calendar row; the first window starts at the first price
    //of its current contract
    pub fn build_from_calendar(
        calendar: &RollCalendar,
        prices: &ContractFinalPrices,
    ) -> EngineResult<Self> {
        let rows = calendar.rows();
        if rows.is_empty() {
            return Err(EngineError::MissingData(
                "cannot build multiple prices from an empty roll calendar".to_string(),
            ));
        }

        let mut points = Vec::new();
        let mut data_added = false;

        for (idx, row) in rows.iter().enumerate() {
            let is_final = idx + 1 == rows.len();
            let current = prices
                .get(&row.current_contract)
                .filter(|series| !series.is_empty());

            let (current, carry) = match (current, prices.get(&row.carry_contract)) {
                (Some(current), Some(carry)) => (current, carry),
                _ if !data_added => {
                    warn!(roll = %row, "missing current or carry prices at start of calendar, skipping");
                    continue;
                }
                _ => {
                    return Err(EngineError::CalendarConstruction(format!(
                        "missing current or carry prices for roll {} in the middle of the calendar",
                        row
                    )))
                }
            };

            let next = match prices.get(&row.next_contract) {
                Some(next) => Some(next),
                None if is_final => {
                    warn!(roll = %row, "no prices for final next contract, forward left empty");
                    None
                }
                None => {
                    return Err(EngineError::CalendarConstruction(format!(
                        "missing next contract prices for roll {}",
                        row
                    )))
                }
            };

            let after = idx.checked_sub(1).map(|previous| rows[previous].roll_date);
            let start = match after {
                Some(_) => None,
                None => current.first_timestamp(),
            };

            let current = window_slice(current, after, start, row.roll_date);
            let carry = window_slice(carry, after, start, row.roll_date);
            let next = next
                .map(|next| window_slice(next, after, start, row.roll_date))
                .unwrap_or_default();

            let timestamps: BTreeSet<NaiveDateTime> = current
                .iter()
                .chain(next.iter())
                .chain(carry.iter())
                .map(|(timestamp, _)| *timestamp)
                .collect();

            debug!(roll = %row, rows = timestamps.len(), "multiple prices window");

            for timestamp in timestamps {
                points.push((
                    timestamp,
                    MultiplePriceRow::new(
                        current.value_at(timestamp),
                        next.value_at(timestamp),
                        carry.value_at(timestamp),
                        row.current_contract.clone(),
                        row.next_contract.clone(),
                        row.carry_contract.clone(),
                    ),
                ));
            }
            data_added = true;
        }

        if points.is_empty() {
            return Err(EngineError::MissingData(
                "no prices fall inside the roll calendar".to_string(),
            ));
        }

        Ok(MultiplePrices::new(TimeSeries::from_points(points)))
    }

    pub fn series(&self) -> &TimeSeries<MultiplePriceRow> {
        &self.series
    }

    pub fn into_series(self) -> TimeSeries<MultiplePriceRow> {
        self.series
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(NaiveDateTime, MultiplePriceRow)> {
        self.series.iter()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.series.first_timestamp()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.series.last_timestamp()
    }

    pub fn last_row(&self) -> Option<&MultiplePriceRow> {
        self.series.last().map(|(_, row)| row)
    }

    pub fn price_series(&self) -> TimeSeries<f64> {
        self.series.map(|row| row.price)
    }

    pub fn forward_series(&self) -> TimeSeries<f64> {
        self.series.map(|row| row.forward)
    }

    pub fn carry_series(&self) -> TimeSeries<f64> {
        self.series.map(|row| row.carry)
    }

    //contracts on the final row: (price, forward, carry)
    pub fn current_contracts(&self) -> Option<(&str, &str, &str)> {
        self.last_row().map(|row| {
            (
                row.price_contract.as_str(),
                row.forward_contract.as_str(),
                row.carry_contract.as_str(),
            )
        })
    }

    pub fn roll_points(&self) -> Vec<RollPoint<'_>> {
        self.series
            .points()
            .windows(2)
            .filter(|pair| pair[0].1.price_contract != pair[1].1.price_contract)
            .map(|pair| RollPoint {
                previous_timestamp: pair[0].0,
                previous: &pair[0].1,
                timestamp: pair[1].0,
                current: &pair[1].1,
            })
            .collect()
    }

    //removes trailing rows that have no price, forward or carry
    pub fn drop_trailing_nan(&self) -> Self {
        let mut points = self.series.points().to_vec();
        while points
            .last()
            .map(|(_, row)| row.all_prices_missing())
            .unwrap_or(false)
        {
            points.pop();
        }
        MultiplePrices::new(TimeSeries::from_points(points))
    }

    //carries the last known price, forward and carry into later gaps
    pub fn forward_fill(&self) -> Self {
        let mut last_known = [f64::NAN; 3];
        let series = self.series.map(|row| {
            let mut filled = row.clone();
            for (value, last) in filled.prices_mut().into_iter().zip(last_known.iter_mut()) {
                if value.is_nan() {
                    *value = *last;
                } else {
                    *last = *value;
                }
            }
            filled
        });
        MultiplePrices::new(series)
    }

    //appends a row one second after the current last row, eg to record a manual roll
    pub fn add_one_row_with_time_delta(&self, row: MultiplePriceRow) -> EngineResult<Self> {
        let last = self.last_timestamp().ok_or_else(|| {
            EngineError::MissingData("cannot add a row to empty multiple prices".to_string())
        })?;

        let mut series = self.series.clone();
        series.push(last + Duration::seconds(1), row)?;
        Ok(MultiplePrices::new(series))
    }

    //merges new rows that all carry the current contract labels; any other labels
    //mean a roll has happened and the series must be rebuilt from a calendar
    pub fn update_with_new_rows_no_roll(
        &self,
        new: &MultiplePrices,
        config: &MergeConfig,
    ) -> EngineResult<MergeOutcome<MultiplePrices>> {
        let existing = match self.last_row() {
            Some(row) => row,
            None => return Ok(MergeOutcome::Merged(new.clone())),
        };

        if let Some((_, incoming)) = new.iter().find(|(_, row)| !row.same_contracts_as(existing)) {
            return Err(EngineError::RollOccurred {
                existing: existing.contracts_label(),
                incoming: incoming.contracts_label(),
            });
        }

        Ok(merge::full_merge_of_existing_data(&self.series, &new.series, config)
            .map(MultiplePrices::new))
    }
}

fn window_slice(
    series: &TimeSeries<f64>,
    after: Option<NaiveDateTime>,
    start: Option<NaiveDateTime>,
    until: NaiveDateTime,
) -> TimeSeries<f64> {
    let windowed = series.window(after, until);
    match start {
        Some(start) => windowed.since(start),
        None => windowed,
    }
}
