pub mod spike;

use crate::data::bar::PriceBar;
use crate::data::series::TimeSeries;
use chrono::NaiveDateTime;
use tracing::warn;

//a value that can be combined with a newer observation for the same timestamp
pub trait MergeValue: Clone {
    //the number watched for spikes
    fn spike_value(&self) -> f64;

    //takes newer data only where this value is missing
    fn fill_missing_from(&mut self, newer: &Self);

    //takes every field the newer data actually has
    fn overwrite_from(&mut self, newer: &Self);

    //equality with missing values treated as equal
    fn same_as(&self, other: &Self) -> bool;
}

impl MergeValue for f64 {
    fn spike_value(&self) -> f64 {
        *self
    }

    fn fill_missing_from(&mut self, newer: &Self) {
        if self.is_nan() {
            *self = *newer;
        }
    }

    fn overwrite_from(&mut self, newer: &Self) {
        if !newer.is_nan() {
            *self = *newer;
        }
    }

    fn same_as(&self, other: &Self) -> bool {
        self == other || (self.is_nan() && other.is_nan())
    }
}

impl MergeValue for PriceBar {
    fn spike_value(&self) -> f64 {
        self.final_price()
    }

    fn fill_missing_from(&mut self, newer: &Self) {
        for (value, newer_value) in self.columns_mut().into_iter().zip(newer.columns()) {
            value.fill_missing_from(&newer_value);
        }
    }

    fn overwrite_from(&mut self, newer: &Self) {
        for (value, newer_value) in self.columns_mut().into_iter().zip(newer.columns()) {
            value.overwrite_from(&newer_value);
        }
    }

    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

//settings for merging and spike checking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeConfig {
    pub check_for_spike: bool,

    //largest allowed move in units of the average absolute daily move
    pub max_spike: f64,

    pub ewm_span: usize,

    //on overlapping timestamps only fill gaps in the existing data
    pub keep_older: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            check_for_spike: true,
            max_spike: 8.0,
            ewm_span: 500,
            keep_older: true,
        }
    }
}

impl MergeConfig {
    pub fn without_spike_check() -> Self {
        MergeConfig {
            check_for_spike: false,
            ..MergeConfig::default()
        }
    }
}

//what a merge changed relative to the existing data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    OnlyOld,
    OnlyNew,

    //the earliest timestamp whose value differs from the existing data
    Merged(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome<S> {
    Merged(S),
    SpikeDetected {
        date: NaiveDateTime,
        magnitude: f64,
    },
}

impl<S> MergeOutcome<S> {
    pub fn is_spike(&self) -> bool {
        matches!(self, MergeOutcome::SpikeDetected { .. })
    }

    pub fn merged(self) -> Option<S> {
        match self {
            MergeOutcome::Merged(merged) => Some(merged),
            MergeOutcome::SpikeDetected { .. } => None,
        }
    }

    pub fn map<U, F: FnOnce(S) -> U>(self, f: F) -> MergeOutcome<U> {
        match self {
            MergeOutcome::Merged(merged) => MergeOutcome::Merged(f(merged)),
            MergeOutcome::SpikeDetected { date, magnitude } => {
                MergeOutcome::SpikeDetected { date, magnitude }
            }
        }
    }
}

//appends new data strictly after the end of the existing data, then checks for spikes
pub fn merge_newer_data<T: MergeValue>(
    old: &TimeSeries<T>,
    new: &TimeSeries<T>,
    config: &MergeConfig,
) -> MergeOutcome<TimeSeries<T>> {
    let (status, merged) = merge_newer_data_no_checks(old, new);
    spike_check_merged_data(status, merged, config)
}

//merges overlapping data (see keep_older), then checks for spikes
pub fn full_merge_of_existing_data<T: MergeValue>(
    old: &TimeSeries<T>,
    new: &TimeSeries<T>,
    config: &MergeConfig,
) -> MergeOutcome<TimeSeries<T>> {
    let (status, merged) = full_merge_no_checks(old, new, config.keep_older);
    spike_check_merged_data(status, merged, config)
}

//new points at or before the last existing timestamp are ignored; repeated
//timestamps keep their first occurrence
pub fn merge_newer_data_no_checks<T: MergeValue>(
    old: &TimeSeries<T>,
    new: &TimeSeries<T>,
) -> (MergeStatus, TimeSeries<T>) {
    let last_old = match old.last_timestamp() {
        Some(last) => last,
        None => return (MergeStatus::OnlyNew, new.clone().dedup_keep_first()),
    };

    let actually_new = new.after(last_old).dedup_keep_first();
    let first_new = match actually_new.first_timestamp() {
        Some(first) => first,
        None => return (MergeStatus::OnlyOld, old.clone()),
    };

    let mut points = old.clone().into_points();
    points.extend(actually_new.into_points());

    (
        MergeStatus::Merged(first_new),
        TimeSeries::from_points(points).dedup_keep_first(),
    )
}

//union of both series; where both have a timestamp the newer value fills gaps
//(keep_older) or replaces the fields it has (otherwise)
pub fn full_merge_no_checks<T: MergeValue>(
    old: &TimeSeries<T>,
    new: &TimeSeries<T>,
    keep_older: bool,
) -> (MergeStatus, TimeSeries<T>) {
    if old.is_empty() {
        return (MergeStatus::OnlyNew, new.clone().dedup_keep_first());
    }
    if new.is_empty() {
        return (MergeStatus::OnlyOld, old.clone());
    }

    let old = old.clone().dedup_keep_first();
    let new = new.clone().dedup_keep_first();
    let (old_points, new_points) = (old.points(), new.points());

    let mut merged = Vec::with_capacity(old_points.len() + new_points.len());
    let (mut i, mut j) = (0, 0);
    while i < old_points.len() || j < new_points.len() {
        match (old_points.get(i), new_points.get(j)) {
            (Some((old_time, old_value)), Some((new_time, new_value))) if old_time == new_time => {
                let mut value = old_value.clone();
                if keep_older {
                    value.fill_missing_from(new_value);
                } else {
                    value.overwrite_from(new_value);
                }
                merged.push((*old_time, value));
                i += 1;
                j += 1;
            }
            (Some((old_time, old_value)), Some((new_time, _))) if old_time < new_time => {
                merged.push((*old_time, old_value.clone()));
                i += 1;
            }
            (Some((old_time, old_value)), None) => {
                merged.push((*old_time, old_value.clone()));
                i += 1;
            }
            (_, Some((new_time, new_value))) => {
                merged.push((*new_time, new_value.clone()));
                j += 1;
            }
            (None, None) => break,
        }
    }
    let merged = TimeSeries::from_points(merged);

    let first_change = merged
        .iter()
        .find(|(timestamp, value)| match old.get(*timestamp) {
            Some(existing) => !existing.same_as(value),
            None => true,
        })
        .map(|(timestamp, _)| *timestamp);

    match first_change {
        Some(first) => (MergeStatus::Merged(first), merged),
        None => (MergeStatus::OnlyOld, old),
    }
}

//checks merged data for spikes from the first new timestamp (everything when
//there was no old data, nothing when nothing changed)
pub fn spike_check_merged_data<T: MergeValue>(
    status: MergeStatus,
    merged: TimeSeries<T>,
    config: &MergeConfig,
) -> MergeOutcome<TimeSeries<T>> {
    if !config.check_for_spike {
        return MergeOutcome::Merged(merged);
    }

    let from = match status {
        MergeStatus::OnlyOld => return MergeOutcome::Merged(merged),
        MergeStatus::OnlyNew => None,
        MergeStatus::Merged(first_new) => Some(first_new),
    };

    let values = merged.map(|value| value.spike_value());
    match spike::first_spike(&values, from, config.max_spike, config.ewm_span) {
        Some((date, magnitude)) => {
            warn!(
                date = %date,
                magnitude,
                max_spike = config.max_spike,
                "spike found in merged data"
            );
            MergeOutcome::SpikeDetected { date, magnitude }
        }
        None => MergeOutcome::Merged(merged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn day(n: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(n)
    }

    fn series(points: &[(i64, f64)]) -> TimeSeries<f64> {
        points.iter().map(|(n, value)| (day(*n), *value)).collect()
    }

    #[test]
    fn test_append_ignores_overlap() {
        let old = series(&[(0, 1.0), (1, 2.0)]);
        let new = series(&[(1, 9.0), (2, 3.0), (2, 4.0)]);

        let (status, merged) = merge_newer_data_no_checks(&old, &new);
        assert_eq!(status, MergeStatus::Merged(day(2)));
        assert_eq!(merged.values(), vec![1.0, 2.0, 3.0]);

        let (status, merged) = merge_newer_data_no_checks(&old, &series(&[(1, 9.0)]));
        assert_eq!(status, MergeStatus::OnlyOld);
        assert_eq!(merged, old);

        let (status, _) = merge_newer_data_no_checks(&TimeSeries::new(), &new);
        assert_eq!(status, MergeStatus::OnlyNew);
    }

    #[test]
    fn test_full_merge_keep_older_fills_gaps_only() {
        let old = series(&[(0, 1.0), (1, f64::NAN), (2, 3.0)]);
        let new = series(&[(1, 2.0), (2, 30.0), (3, 4.0)]);

        let (status, merged) = full_merge_no_checks(&old, &new, true);
        assert_eq!(status, MergeStatus::Merged(day(1)));
        assert_eq!(merged.values(), vec![1.0, 2.0, 3.0, 4.0]);

        let (_, overwritten) = full_merge_no_checks(&old, &new, false);
        assert_eq!(overwritten.values(), vec![1.0, 2.0, 30.0, 4.0]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let old = series(&[(0, 1.0), (1, 2.0)]);
        let new = series(&[(1, 2.0), (2, 3.0)]);
        let config = MergeConfig::default();

        let once = full_merge_of_existing_data(&old, &new, &config).merged().unwrap();
        let twice = full_merge_of_existing_data(&once, &new, &config).merged().unwrap();
        assert_eq!(once, twice);

        let (status, _) = full_merge_no_checks(&once, &new, true);
        assert_eq!(status, MergeStatus::OnlyOld);
    }

    #[test]
    fn test_price_bar_merge() {
        let mut bar = PriceBar::from_final(10.0);
        let newer = PriceBar::new(9.0, 11.0, 8.0, 10.5, 100.0).unwrap();

        bar.fill_missing_from(&newer);
        assert_eq!(bar.final_price(), 10.0);
        assert_eq!(bar.volume, 100.0);

        bar.overwrite_from(&PriceBar::from_final(10.5));
        assert_eq!(bar.final_price(), 10.5);
        assert_eq!(bar.open, 9.0);
    }

    #[test]
    fn test_spike_rejects_merge() {
        let old: TimeSeries<f64> = (0..30)
            .map(|n| (day(n), if n % 2 == 0 { 100.0 } else { 101.0 }))
            .collect();
        let config = MergeConfig {
            max_spike: 10.0,
            ..MergeConfig::default()
        };

        let jump = series(&[(30, 151.0)]);
        match merge_newer_data(&old, &jump, &config) {
            MergeOutcome::SpikeDetected { date, magnitude } => {
                assert_eq!(date, day(30));
                assert!(magnitude > 10.0);
            }
            other => panic!("expected a spike, got {:?}", other),
        }

        let calm = series(&[(30, 100.0)]);
        let merged = merge_newer_data(&old, &calm, &config).merged().unwrap();
        assert_eq!(merged.len(), 31);

        let unchecked = merge_newer_data(&old, &jump, &MergeConfig::without_spike_check());
        assert!(!unchecked.is_spike());
    }
}
