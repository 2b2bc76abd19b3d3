use crate::calendar::roll_calendar::{RollCalendar, RollCalendarRow};
use crate::data::series::{ContractFinalPrices, TimeSeries};
use crate::error::{EngineError, EngineResult};
use crate::instrument::{ContractNavigator, CycleKind, RollParameters};
use chrono::{NaiveDateTime, NaiveTime};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

//outcome of searching for the actual roll date closest to an approximate one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollDateMatch {
    //current, next and carry prices all exist on this date
    Matched(NaiveDateTime),

    //no date had carry prices; current and next overlap on this date
    NoCarryMatch(NaiveDateTime),

    //current and next never overlap after the lower bound
    NoMatch,
}

//builds a roll calendar from the parameters, then moves each roll onto a date with prices
pub fn create_from_prices(
    prices: &ContractFinalPrices,
    parameters: &RollParameters,
) -> EngineResult<RollCalendar> {
    let approximate = generate_approximate_calendar(parameters, prices)?;
    info!(
        rows = approximate.len(),
        "approximate roll calendar generated, adjusting to prices"
    );

    adjust_to_price_series(&approximate, prices)
}

//first held contract (in date order) that has prices and a carry contract with prices
pub fn find_earliest_held_contract_with_price_data<'a>(
    parameters: &'a RollParameters,
    prices: &ContractFinalPrices,
) -> EngineResult<ContractNavigator<'a>> {
    let available = prices.available();

    for contract_id in &available {
        let navigator = ContractNavigator::from_contract_id(contract_id, parameters)?;
        if !navigator.is_valid_in(CycleKind::Held) {
            continue;
        }

        match navigator.find_best_carry_contract_with_price_data(&available)? {
            Some(_) => return Ok(navigator),
            None => debug!(contract = %contract_id, "held contract has no carry prices, trying later"),
        }
    }

    Err(EngineError::MissingData(format!(
        "no held contract in {} has prices for itself and its carry contract",
        parameters.held_cycle()
    )))
}

//walks the held cycle from the earliest usable contract, one row per roll, using
//the desired roll date of each contract
pub fn generate_approximate_calendar(
    parameters: &RollParameters,
    prices: &ContractFinalPrices,
) -> EngineResult<RollCalendar> {
    let available = prices.available();
    let mut current = find_earliest_held_contract_with_price_data(parameters, prices)?;
    let mut rows = Vec::new();

    loop {
        current.update_expiry_with_offset_from_parameters();

        let next = match current.find_next_contract_with_price_data(CycleKind::Held, &available)? {
            Some(next) => next,
            None => break,
        };

        let carry = current
            .find_best_carry_contract_with_price_data(&available)?
            .ok_or_else(|| {
                EngineError::MissingData(format!(
                    "no carry contract with prices for {}",
                    current.date_str()
                ))
            })?;

        let roll_date = current.desired_roll_date().and_time(NaiveTime::MIN);
        debug!(
            roll_date = %roll_date,
            current = %current.date_str(),
            next = %next.date_str(),
            carry = %carry.date_str(),
            "approximate roll"
        );

        rows.push(RollCalendarRow::new(
            roll_date,
            current.date_str(),
            next.date_str(),
            carry.date_str(),
        ));
        current = next;
    }

    if rows.is_empty() {
        return Err(EngineError::MissingData(format!(
            "need prices for at least two held contracts, last is {}",
            current.date_str()
        )));
    }

    Ok(RollCalendar::from_rows(rows))
}

//moves every approximate roll to the closest date on which the contracts involved have prices
//
//unmatched rolls before the first match are dropped, as are unmatched rolls when nothing after
//them matches either; an unmatched roll followed by a matched one cannot be repaired
pub fn adjust_to_price_series(
    approximate: &RollCalendar,
    prices: &ContractFinalPrices,
) -> EngineResult<RollCalendar> {
    let rows = approximate.rows();
    let mut adjusted: Vec<RollCalendarRow> = Vec::with_capacity(rows.len());
    let mut unmatched: Option<&RollCalendarRow> = None;

    for (idx, row) in rows.iter().enumerate() {
        let previous_approximate = idx.checked_sub(1).map(|previous| rows[previous].roll_date);
        let previous_adjusted = adjusted.last().map(|accepted| accepted.roll_date);
        let lower_bound = previous_approximate.max(previous_adjusted);
        let next_row_carry = rows.get(idx + 1).map(|next| next.carry_contract.as_str());

        let (roll_date, carry_relaxed) =
            match find_closest_roll_date(row, next_row_carry, lower_bound, prices) {
                RollDateMatch::Matched(date) => (date, false),
                RollDateMatch::NoCarryMatch(date) => {
                    warn!(
                        approximate = %row,
                        matched = %date,
                        "no date with carry prices, matched on current and next only"
                    );
                    (date, true)
                }
                RollDateMatch::NoMatch => {
                    if adjusted.is_empty() {
                        warn!(roll = %row, "no overlapping prices, dropping roll at start of calendar");
                    } else if unmatched.is_none() {
                        unmatched = Some(row);
                    }
                    continue;
                }
            };

        if let Some(failed) = unmatched {
            return Err(EngineError::CalendarConstruction(format!(
                "no date with prices for both {} and {} after {}, but later rolls could be matched",
                failed.current_contract,
                failed.next_contract,
                previous_adjusted
                    .map(|date| date.to_string())
                    .unwrap_or_default()
            )));
        }

        adjusted.push(RollCalendarRow {
            roll_date,
            carry_relaxed,
            ..row.clone()
        });
    }

    if let Some(failed) = unmatched {
        warn!(from = %failed, "no overlapping prices, dropping rolls at end of calendar");
    }

    if adjusted.is_empty() {
        return Err(EngineError::CalendarConstruction(
            "no roll could be matched to prices".to_string(),
        ));
    }

    RollCalendar::new(adjusted)
}

//closest date to the approximate roll after the lower bound where the row's contracts
//(and the carry of the following row) all have prices, ties going to the earlier date
pub fn find_closest_roll_date(
    row: &RollCalendarRow,
    next_row_carry: Option<&str>,
    lower_bound: Option<NaiveDateTime>,
    prices: &ContractFinalPrices,
) -> RollDateMatch {
    let (current, next) = match (
        prices.get(&row.current_contract),
        prices.get(&row.next_contract),
    ) {
        (Some(current), Some(next)) => (current, next),
        _ => return RollDateMatch::NoMatch,
    };

    let mut overlapping = current.valid_timestamps();
    keep_priced(&mut overlapping, Some(next));
    if let Some(lower_bound) = lower_bound {
        overlapping.retain(|date| *date > lower_bound);
    }

    let mut with_carry = overlapping.clone();
    for carry_id in std::iter::once(row.carry_contract.as_str()).chain(next_row_carry) {
        keep_priced(&mut with_carry, prices.get(carry_id));
    }

    if let Some(date) = closest_date(&with_carry, row.roll_date) {
        return RollDateMatch::Matched(date);
    }

    match closest_date(&overlapping, row.roll_date) {
        Some(date) => RollDateMatch::NoCarryMatch(date),
        None => RollDateMatch::NoMatch,
    }
}

fn keep_priced(dates: &mut BTreeSet<NaiveDateTime>, series: Option<&TimeSeries<f64>>) {
    match series {
        Some(series) => dates.retain(|date| !series.value_at(*date).is_nan()),
        None => dates.clear(),
    }
}

fn closest_date(dates: &BTreeSet<NaiveDateTime>, target: NaiveDateTime) -> Option<NaiveDateTime> {
    //min_by_key keeps the first of equal keys, so ties go to the earlier date
    dates
        .iter()
        .copied()
        .min_by_key(|date| (*date - target).num_seconds().abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn day(m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    //daily prices between two dates inclusive
    fn daily(from: NaiveDateTime, to: NaiveDateTime, price: f64) -> TimeSeries<f64> {
        let mut points = Vec::new();
        let mut date = from;
        while date <= to {
            points.push((date, price));
            date += Duration::days(1);
        }
        TimeSeries::from_points(points)
    }

    fn full_year_prices() -> ContractFinalPrices {
        let mut prices = ContractFinalPrices::new();
        for (id, price) in [("202003", 100.0), ("202006", 101.0), ("202009", 102.0), ("202012", 103.0)] {
            prices
                .insert(id, daily(day(1, 1), day(12, 31), price))
                .unwrap();
        }
        prices
    }

    #[test]
    fn test_approximate_calendar_quarterly() {
        let parameters = RollParameters::quarterly();
        let calendar = generate_approximate_calendar(&parameters, &full_year_prices()).unwrap();

        //expiry on the 16th, rolling 5 days earlier
        assert_eq!(calendar.roll_dates(), vec![day(3, 11), day(6, 11), day(9, 11)]);
        let first = calendar.first().unwrap();
        assert_eq!(first.current_contract, "20200300");
        assert_eq!(first.next_contract, "20200600");
        assert_eq!(first.carry_contract, "20200600");
        assert_eq!(calendar.last().unwrap().next_contract, "20201200");
    }

    #[test]
    fn test_missing_data_without_two_contracts() {
        let parameters = RollParameters::quarterly();
        let mut prices = ContractFinalPrices::new();
        prices
            .insert("202003", daily(day(1, 1), day(3, 31), 1.0))
            .unwrap();

        assert!(matches!(
            generate_approximate_calendar(&parameters, &prices),
            Err(EngineError::MissingData(_))
        ));
    }

    #[test]
    fn test_adjusted_calendar_matches_when_prices_are_complete() {
        let calendar = create_from_prices(&full_year_prices(), &RollParameters::quarterly()).unwrap();
        assert_eq!(calendar.roll_dates(), vec![day(3, 11), day(6, 11), day(9, 11)]);
        assert_eq!(calendar.carry_relaxed_rows(), 0);
        assert!(calendar.check_dates_are_valid_for_prices(&full_year_prices()));
    }

    #[test]
    fn test_gap_moves_roll_to_earliest_closest_date() {
        let mut prices = full_year_prices();
        let september: TimeSeries<f64> = daily(day(1, 1), day(12, 31), 102.0)
            .iter()
            .filter(|(date, _)| *date < day(6, 8) || *date > day(6, 14))
            .copied()
            .collect();
        prices.insert("202009", september).unwrap();

        let calendar = create_from_prices(&prices, &RollParameters::quarterly()).unwrap();
        //7th and 15th are both four days away
        assert_eq!(calendar.roll_dates(), vec![day(3, 11), day(6, 7), day(9, 11)]);
    }

    #[test]
    fn test_unmatched_first_roll_is_dropped() {
        let mut prices = full_year_prices();
        prices
            .insert("202003", daily(day(1, 1), day(1, 31), 100.0))
            .unwrap();
        prices
            .insert("202006", daily(day(2, 1), day(12, 31), 101.0))
            .unwrap();

        let calendar = create_from_prices(&prices, &RollParameters::quarterly()).unwrap();
        assert_eq!(calendar.first().unwrap().current_contract, "20200600");
        assert_eq!(calendar.len(), 2);
    }

    #[test]
    fn test_unmatched_interior_roll_is_fatal() {
        let mut prices = full_year_prices();
        prices
            .insert("202006", daily(day(1, 1), day(6, 30), 101.0))
            .unwrap();
        prices
            .insert("202009", daily(day(7, 1), day(12, 31), 102.0))
            .unwrap();

        assert!(matches!(
            create_from_prices(&prices, &RollParameters::quarterly()),
            Err(EngineError::CalendarConstruction(_))
        ));
    }

    #[test]
    fn test_unmatched_final_roll_is_truncated() {
        let mut prices = full_year_prices();
        prices
            .insert("202009", daily(day(1, 1), day(9, 30), 102.0))
            .unwrap();
        prices
            .insert("202012", daily(day(10, 1), day(12, 31), 103.0))
            .unwrap();

        let calendar = create_from_prices(&prices, &RollParameters::quarterly()).unwrap();
        assert_eq!(calendar.roll_dates(), vec![day(3, 11), day(6, 11)]);

        //the june roll could not see a december carry price
        assert!(calendar.last().unwrap().carry_relaxed);
        assert_eq!(calendar.carry_relaxed_rows(), 1);
    }

    //daily prices with the inclusive gap removed
    fn daily_with_gap(gap_from: NaiveDateTime, gap_to: NaiveDateTime, price: f64) -> TimeSeries<f64> {
        daily(day(1, 1), day(12, 31), price)
            .iter()
            .filter(|(date, _)| *date < gap_from || *date > gap_to)
            .copied()
            .collect()
    }

    fn two_close_rolls() -> RollCalendar {
        RollCalendar::from_rows(vec![
            RollCalendarRow::new(day(3, 11), "20200300", "20200600", "20200600"),
            RollCalendarRow::new(day(3, 12), "20200600", "20200900", "20200900"),
        ])
    }

    #[test]
    fn test_roll_stays_after_previous_adjusted_roll() {
        let mut prices = full_year_prices();
        prices
            .insert("202003", daily_with_gap(day(3, 1), day(3, 19), 100.0))
            .unwrap();

        let calendar = adjust_to_price_series(&two_close_rolls(), &prices).unwrap();

        //the first roll is pushed to the 20th, so the second cannot use the 12th
        assert_eq!(calendar.roll_dates(), vec![day(3, 20), day(3, 21)]);
        assert_eq!(calendar.carry_relaxed_rows(), 0);
    }

    #[test]
    fn test_roll_stays_after_previous_approximate_roll() {
        let mut prices = full_year_prices();
        prices
            .insert("202003", daily_with_gap(day(3, 8), day(3, 20), 100.0))
            .unwrap();
        prices
            .insert("202009", daily_with_gap(day(3, 12), day(3, 14), 102.0))
            .unwrap();

        let calendar = adjust_to_price_series(&two_close_rolls(), &prices).unwrap();

        //the first roll moves back to the 7th; the 11th is closest for the second
        //but is not after the first approximate roll
        assert_eq!(calendar.roll_dates(), vec![day(3, 7), day(3, 15)]);
    }

    #[test]
    fn test_unmatched_roll_then_match_is_fatal_but_trailing_misses_are_dropped() {
        let approximate = RollCalendar::from_rows(vec![
            RollCalendarRow::new(day(3, 11), "20200300", "20200600", "20200600"),
            RollCalendarRow::new(day(6, 11), "20200600", "20200900", "20200900"),
            RollCalendarRow::new(day(9, 11), "20200900", "20201200", "20201200"),
        ]);

        //june and september never overlap, september and december do
        let mut interior_gap = full_year_prices();
        interior_gap
            .insert("202006", daily(day(1, 1), day(6, 30), 101.0))
            .unwrap();
        interior_gap
            .insert("202009", daily(day(7, 1), day(12, 31), 102.0))
            .unwrap();
        assert!(matches!(
            adjust_to_price_series(&approximate, &interior_gap),
            Err(EngineError::CalendarConstruction(_))
        ));

        //june/september and september/december both fail, so both are dropped
        let mut trailing_gap = full_year_prices();
        trailing_gap
            .insert("202006", daily(day(1, 1), day(6, 30), 101.0))
            .unwrap();
        trailing_gap
            .insert("202009", daily(day(7, 1), day(9, 30), 102.0))
            .unwrap();
        trailing_gap
            .insert("202012", daily(day(10, 1), day(12, 31), 103.0))
            .unwrap();
        let calendar = adjust_to_price_series(&approximate, &trailing_gap).unwrap();
        assert_eq!(calendar.roll_dates(), vec![day(3, 11)]);
        assert_eq!(calendar.last().unwrap().next_contract, "20200600");
    }
}
