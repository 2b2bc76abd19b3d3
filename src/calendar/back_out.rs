use crate::calendar::roll_calendar::{RollCalendar, RollCalendarRow};
use crate::error::{EngineError, EngineResult};
use crate::prices::MultiplePrices;
use tracing::info;

//recovers the roll calendar behind existing multiple prices: one row per change of
//price contract, dated on the last row of the outgoing contract, plus a closing row
//on the final timestamp pointing at the current forward and carry contracts
//
//multiple prices do not record whether a roll was matched without carry prices,
//so every backed out row has carry_relaxed unset
pub fn back_out_from_multiple_prices(multiple_prices: &MultiplePrices) -> EngineResult<RollCalendar> {
    let deduplicated = MultiplePrices::new(multiple_prices.series().clone().dedup_keep_last());

    let (last_timestamp, last_row) = deduplicated
        .series()
        .last()
        .ok_or_else(|| {
            EngineError::MissingData("cannot back out a calendar from empty multiple prices".to_string())
        })?;

    let mut rows: Vec<RollCalendarRow> = deduplicated
        .roll_points()
        .iter()
        .map(|roll| {
            RollCalendarRow::new(
                roll.previous_timestamp,
                roll.previous.price_contract.clone(),
                roll.current.price_contract.clone(),
                roll.previous.carry_contract.clone(),
            )
        })
        .collect();

    rows.push(RollCalendarRow::new(
        *last_timestamp,
        last_row.price_contract.clone(),
        last_row.forward_contract.clone(),
        last_row.carry_contract.clone(),
    ));

    info!(rows = rows.len(), "roll calendar backed out of multiple prices");

    RollCalendar::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::series::{ContractFinalPrices, TimeSeries};
    use crate::prices::MultiplePriceRow;
    use chrono::{NaiveDate, NaiveDateTime};

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_back_out_rows() {
        let row = |price_contract: &str, forward_contract: &str| {
            MultiplePriceRow::new(1.0, 2.0, 2.0, price_contract, forward_contract, forward_contract)
        };
        let multiple = MultiplePrices::new(TimeSeries::from_points(vec![
            (day(1), row("20210300", "20210600")),
            (day(2), row("20210300", "20210600")),
            (day(3), row("20210600", "20210900")),
            (day(4), row("20210600", "20210900")),
        ]));

        let calendar = back_out_from_multiple_prices(&multiple).unwrap();
        assert_eq!(
            calendar.rows(),
            &[
                RollCalendarRow::new(day(2), "20210300", "20210600", "20210600"),
                RollCalendarRow::new(day(4), "20210600", "20210900", "20210900"),
            ]
        );
    }

    #[test]
    fn test_back_out_round_trip() {
        let mut prices = ContractFinalPrices::new();
        let series = |points: &[(u32, f64)]| -> TimeSeries<f64> {
            points.iter().map(|(d, p)| (day(*d), *p)).collect()
        };
        prices
            .insert("202103", series(&[(1, 100.0), (2, 101.0), (3, 102.0)]))
            .unwrap();
        prices
            .insert("202106", series(&[(2, 103.0), (3, 104.0), (4, 105.0), (5, 106.0)]))
            .unwrap();
        prices
            .insert("202109", series(&[(3, 107.0), (4, 108.0), (5, 109.0)]))
            .unwrap();

        let calendar = RollCalendar::new(vec![
            RollCalendarRow::new(day(3), "20210300", "20210600", "20210600"),
            RollCalendarRow::new(day(5), "20210600", "20210900", "20210900"),
        ])
        .unwrap();

        let multiple = MultiplePrices::build_from_calendar(&calendar, &prices).unwrap();
        let backed_out = back_out_from_multiple_prices(&multiple).unwrap();
        assert_eq!(backed_out, calendar);
    }

    #[test]
    fn test_carry_relaxed_is_not_recovered() {
        let mut prices = ContractFinalPrices::new();
        prices
            .insert("202103", TimeSeries::from_points(vec![(day(1), 100.0), (day(2), 101.0)]))
            .unwrap();
        prices
            .insert(
                "202106",
                TimeSeries::from_points(vec![(day(1), 103.0), (day(2), 104.0), (day(3), 105.0)]),
            )
            .unwrap();

        let mut relaxed = RollCalendarRow::new(day(2), "20210300", "20210600", "20210600");
        relaxed.carry_relaxed = true;
        let calendar = RollCalendar::new(vec![
            relaxed,
            RollCalendarRow::new(day(3), "20210600", "20210900", "20210600"),
        ])
        .unwrap();

        let multiple = MultiplePrices::build_from_calendar(&calendar, &prices).unwrap();
        let backed_out = back_out_from_multiple_prices(&multiple).unwrap();

        assert_eq!(backed_out.roll_dates(), calendar.roll_dates());
        assert_eq!(backed_out.carry_relaxed_rows(), 0);
        assert!(backed_out.check_continuity());
    }

    #[test]
    fn test_empty_is_missing_data() {
        assert!(matches!(
            back_out_from_multiple_prices(&MultiplePrices::default()),
            Err(EngineError::MissingData(_))
        ));
    }
}
