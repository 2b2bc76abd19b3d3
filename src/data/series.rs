use crate::data::bar::PriceBar;
use crate::error::{EngineError, EngineResult};
use crate::instrument::ContractDate;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

//a time indexed sequence of values, kept in ascending timestamp order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries<T> {
    points: Vec<(NaiveDateTime, T)>,
}

//per-contract ohlcv bars
pub type ContractPriceSeries = TimeSeries<PriceBar>;

impl<T> Default for TimeSeries<T> {
    fn default() -> Self {
        TimeSeries { points: Vec::new() }
    }
}

impl<T: Clone> TimeSeries<T> {
    pub fn new() -> Self {
        Self::default()
    }

    //builds a series from unordered points; ties keep their input order
    pub fn from_points(mut points: Vec<(NaiveDateTime, T)>) -> Self {
        points.sort_by_key(|(timestamp, _)| *timestamp);
        TimeSeries { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(NaiveDateTime, T)] {
        &self.points
    }

    pub fn into_points(self) -> Vec<(NaiveDateTime, T)> {
        self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &(NaiveDateTime, T)> {
        self.points.iter()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.points.iter().map(|(timestamp, _)| *timestamp).collect()
    }

    pub fn values(&self) -> Vec<T> {
        self.points.iter().map(|(_, value)| value.clone()).collect()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.points.first().map(|(timestamp, _)| *timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.points.last().map(|(timestamp, _)| *timestamp)
    }

    pub fn last(&self) -> Option<&(NaiveDateTime, T)> {
        self.points.last()
    }

    //value at an exact timestamp (first occurrence if duplicated)
    pub fn get(&self, timestamp: NaiveDateTime) -> Option<&T> {
        let idx = self.points.partition_point(|(t, _)| *t < timestamp);
        match self.points.get(idx) {
            Some((t, value)) if *t == timestamp => Some(value),
            _ => None,
        }
    }

    //appends a point; it must not be earlier than the current last point
    pub fn push(&mut self, timestamp: NaiveDateTime, value: T) -> EngineResult<()> {
        if let Some(last) = self.last_timestamp() {
            if timestamp < last {
                return Err(EngineError::MissingData(format!(
                    "cannot append {} before last timestamp {}",
                    timestamp, last
                )));
            }
        }
        self.points.push((timestamp, value));
        Ok(())
    }

    //points in the half open window (after, until]; no lower bound when after is none
    pub fn window(&self, after: Option<NaiveDateTime>, until: NaiveDateTime) -> Self {
        let start = match after {
            Some(after) => self.points.partition_point(|(t, _)| *t <= after),
            None => 0,
        };
        let end = self.points.partition_point(|(t, _)| *t <= until);

        TimeSeries {
            points: self.points[start.min(end)..end].to_vec(),
        }
    }

    //points strictly after a timestamp
    pub fn after(&self, timestamp: NaiveDateTime) -> Self {
        let start = self.points.partition_point(|(t, _)| *t <= timestamp);
        TimeSeries {
            points: self.points[start..].to_vec(),
        }
    }

    //points at or after a timestamp
    pub fn since(&self, timestamp: NaiveDateTime) -> Self {
        let start = self.points.partition_point(|(t, _)| *t < timestamp);
        TimeSeries {
            points: self.points[start..].to_vec(),
        }
    }

    //points at or before a timestamp
    pub fn up_to(&self, timestamp: NaiveDateTime) -> Self {
        let end = self.points.partition_point(|(t, _)| *t <= timestamp);
        TimeSeries {
            points: self.points[..end].to_vec(),
        }
    }

    pub fn map<U, F>(&self, mut f: F) -> TimeSeries<U>
    where
        F: FnMut(&T) -> U,
    {
        TimeSeries {
            points: self
                .points
                .iter()
                .map(|(timestamp, value)| (*timestamp, f(value)))
                .collect(),
        }
    }

    //removes repeated timestamps, keeping the first occurrence
    pub fn dedup_keep_first(mut self) -> Self {
        self.points.dedup_by(|later, earlier| later.0 == earlier.0);
        self
    }

    //removes repeated timestamps, keeping the last occurrence
    pub fn dedup_keep_last(self) -> Self {
        let mut points: Vec<(NaiveDateTime, T)> = Vec::with_capacity(self.points.len());
        for (timestamp, value) in self.points {
            match points.last_mut() {
                Some(last) if last.0 == timestamp => *last = (timestamp, value),
                _ => points.push((timestamp, value)),
            }
        }
        TimeSeries { points }
    }
}

impl TimeSeries<f64> {
    //value at a timestamp, nan when absent
    pub fn value_at(&self, timestamp: NaiveDateTime) -> f64 {
        self.get(timestamp).copied().unwrap_or(f64::NAN)
    }

    pub fn drop_nan(&self) -> Self {
        TimeSeries {
            points: self
                .points
                .iter()
                .filter(|(_, value)| !value.is_nan())
                .copied()
                .collect(),
        }
    }

    //timestamps with a non-nan value
    pub fn valid_timestamps(&self) -> BTreeSet<NaiveDateTime> {
        self.points
            .iter()
            .filter(|(_, value)| !value.is_nan())
            .map(|(timestamp, _)| *timestamp)
            .collect()
    }
}

impl TimeSeries<PriceBar> {
    //the final (close) price column
    pub fn final_prices(&self) -> TimeSeries<f64> {
        self.map(|bar| bar.final_price())
    }
}

impl<T> FromIterator<(NaiveDateTime, T)> for TimeSeries<T>
where
    T: Clone,
{
    fn from_iter<I: IntoIterator<Item = (NaiveDateTime, T)>>(iter: I) -> Self {
        TimeSeries::from_points(iter.into_iter().collect())
    }
}

//final prices for every contract of one instrument, keyed by yyyymmdd contract id
#[derive(Debug, Clone, Default)]
pub struct ContractFinalPrices {
    prices: BTreeMap<String, TimeSeries<f64>>,
}

impl ContractFinalPrices {
    pub fn new() -> Self {
        Self::default()
    }

    //adds final prices for a contract; accepts yyyymm or yyyymmdd ids
    pub fn insert(&mut self, contract_id: &str, prices: TimeSeries<f64>) -> EngineResult<()> {
        let key = ContractDate::new(contract_id, 0)?.date_str();
        self.prices.insert(key, prices);
        Ok(())
    }

    pub fn insert_contract(&mut self, contract: &ContractDate, prices: TimeSeries<f64>) {
        self.prices.insert(contract.date_str(), prices);
    }

    pub fn get(&self, contract_id: &str) -> Option<&TimeSeries<f64>> {
        self.prices.get(contract_id)
    }

    pub fn contains(&self, contract_id: &str) -> bool {
        self.prices.contains_key(contract_id)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    //contract ids in date order
    pub fn sorted_contract_ids(&self) -> Vec<String> {
        self.prices.keys().cloned().collect()
    }

    pub fn available(&self) -> BTreeSet<String> {
        self.prices.keys().cloned().collect()
    }

    pub fn first_contract_id(&self) -> Option<&str> {
        self.prices.keys().next().map(|s| s.as_str())
    }

    pub fn last_contract_id(&self) -> Option<&str> {
        self.prices.keys().next_back().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TimeSeries<f64>)> {
        self.prices.iter()
    }

    //price of a contract at a timestamp, nan if the contract or the bar is missing
    pub fn price_at(&self, contract_id: &str, timestamp: NaiveDateTime) -> f64 {
        self.prices
            .get(contract_id)
            .map(|series| series.value_at(timestamp))
            .unwrap_or(f64::NAN)
    }
}
