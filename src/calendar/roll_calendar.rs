use crate::data::series::ContractFinalPrices;
use crate::error::{EngineError, EngineResult};
use crate::instrument::RollParameters;
use crate::prices::MultiplePrices;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

//one roll: on roll_date we stop holding current_contract and start holding next_contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollCalendarRow {
    pub roll_date: NaiveDateTime,
    pub current_contract: String,
    pub next_contract: String,
    pub carry_contract: String,

    //set when no date had a carry price and the roll date was matched on current/next alone
    #[serde(default)]
    pub carry_relaxed: bool,
}

impl RollCalendarRow {
    pub fn new(
        roll_date: NaiveDateTime,
        current_contract: impl Into<String>,
        next_contract: impl Into<String>,
        carry_contract: impl Into<String>,
    ) -> Self {
        RollCalendarRow {
            roll_date,
            current_contract: current_contract.into(),
            next_contract: next_contract.into(),
            carry_contract: carry_contract.into(),
            carry_relaxed: false,
        }
    }
}

impl fmt::Display for RollCalendarRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} (carry {}){}",
            self.roll_date,
            self.current_contract,
            self.next_contract,
            self.carry_contract,
            if self.carry_relaxed { " [carry relaxed]" } else { "" }
        )
    }
}

//the ordered roll history of one instrument
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollCalendar {
    rows: Vec<RollCalendarRow>,
}

impl RollCalendar {
    //a calendar whose dates strictly increase and whose rows chain together
    pub fn new(rows: Vec<RollCalendarRow>) -> EngineResult<Self> {
        let calendar = RollCalendar { rows };

        if let Some((earlier, later)) = calendar.first_unordered_pair() {
            return Err(EngineError::CalendarConstruction(format!(
                "roll dates must strictly increase: {} then {}",
                earlier.roll_date, later.roll_date
            )));
        }
        if let Some((earlier, later)) = calendar.first_broken_link() {
            return Err(EngineError::CalendarConstruction(format!(
                "next contract {} on {} is not the following current contract {}",
                earlier.next_contract, earlier.roll_date, later.current_contract
            )));
        }

        Ok(calendar)
    }

    //wraps rows without validation, eg when loading a hand edited file
    pub fn from_rows(rows: Vec<RollCalendarRow>) -> Self {
        RollCalendar { rows }
    }

    //builds a calendar from individual contract prices, see the builder module
    pub fn create_from_prices(
        prices: &ContractFinalPrices,
        parameters: &RollParameters,
    ) -> EngineResult<Self> {
        crate::calendar::builder::create_from_prices(prices, parameters)
    }

    //derives the calendar that the stored multiple prices must have been built from
    pub fn back_out_from_multiple_prices(multiple_prices: &MultiplePrices) -> EngineResult<Self> {
        crate::calendar::back_out::back_out_from_multiple_prices(multiple_prices)
    }

    pub fn rows(&self) -> &[RollCalendarRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<RollCalendarRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&RollCalendarRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&RollCalendarRow> {
        self.rows.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RollCalendarRow> {
        self.rows.iter()
    }

    pub fn roll_dates(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|row| row.roll_date).collect()
    }

    //rows whose roll date was only matched on current/next prices
    pub fn carry_relaxed_rows(&self) -> usize {
        self.rows.iter().filter(|row| row.carry_relaxed).count()
    }

    //appends a forward looking row that rolls out of the last next contract
    pub fn with_virtual_row(
        &self,
        roll_date: NaiveDateTime,
        next_contract: &str,
        carry_contract: &str,
    ) -> EngineResult<Self> {
        let last = self.rows.last().ok_or_else(|| {
            EngineError::CalendarConstruction("cannot extend an empty roll calendar".to_string())
        })?;

        if roll_date <= last.roll_date {
            return Err(EngineError::CalendarConstruction(format!(
                "virtual roll date {} must be after {}",
                roll_date, last.roll_date
            )));
        }

        let mut rows = self.rows.clone();
        rows.push(RollCalendarRow::new(
            roll_date,
            last.next_contract.clone(),
            next_contract,
            carry_contract,
        ));

        Ok(RollCalendar { rows })
    }

    fn first_unordered_pair(&self) -> Option<(&RollCalendarRow, &RollCalendarRow)> {
        self.rows
            .windows(2)
            .find(|pair| pair[1].roll_date <= pair[0].roll_date)
            .map(|pair| (&pair[0], &pair[1]))
    }

    fn first_broken_link(&self) -> Option<(&RollCalendarRow, &RollCalendarRow)> {
        self.rows
            .windows(2)
            .find(|pair| pair[0].next_contract != pair[1].current_contract)
            .map(|pair| (&pair[0], &pair[1]))
    }

    pub fn check_if_date_index_monotonic(&self) -> bool {
        match self.first_unordered_pair() {
            Some((earlier, later)) => {
                warn!(
                    earlier = %earlier.roll_date,
                    later = %later.roll_date,
                    "roll calendar dates are not strictly increasing"
                );
                false
            }
            None => true,
        }
    }

    pub fn check_continuity(&self) -> bool {
        match self.first_broken_link() {
            Some((earlier, later)) => {
                warn!(
                    roll_date = %earlier.roll_date,
                    next_contract = %earlier.next_contract,
                    following_current = %later.current_contract,
                    "roll calendar does not chain contracts"
                );
                false
            }
            None => true,
        }
    }

    //every roll date must have prices for its current, next and carry contracts;
    //rows matched without carry are only checked on current and next
    pub fn check_dates_are_valid_for_prices(&self, prices: &ContractFinalPrices) -> bool {
        let mut valid = true;

        for row in &self.rows {
            let current = prices.price_at(&row.current_contract, row.roll_date);
            let next = prices.price_at(&row.next_contract, row.roll_date);
            let carry = prices.price_at(&row.carry_contract, row.roll_date);

            let carry_ok = row.carry_relaxed || !carry.is_nan();
            if current.is_nan() || next.is_nan() || !carry_ok {
                warn!(
                    row = %row,
                    current,
                    next,
                    carry,
                    "roll date has missing prices"
                );
                valid = false;
            }
        }

        valid
    }
}

impl fmt::Display for RollCalendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::series::TimeSeries;
    use chrono::NaiveDate;

    fn day(m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn rows() -> Vec<RollCalendarRow> {
        vec![
            RollCalendarRow::new(day(3, 10), "20200300", "20200600", "20200600"),
            RollCalendarRow::new(day(6, 12), "20200600", "20200900", "20200900"),
        ]
    }

    #[test]
    fn test_new_validates_order_and_links() {
        assert!(RollCalendar::new(rows()).is_ok());

        let mut reversed = rows();
        reversed.reverse();
        assert!(matches!(
            RollCalendar::new(reversed),
            Err(EngineError::CalendarConstruction(_))
        ));

        let mut broken = rows();
        broken[1].current_contract = "20200900".to_string();
        let unchecked = RollCalendar::from_rows(broken.clone());
        assert!(unchecked.check_if_date_index_monotonic());
        assert!(!unchecked.check_continuity());
        assert!(RollCalendar::new(broken).is_err());
    }

    #[test]
    fn test_virtual_row() {
        let calendar = RollCalendar::new(rows()).unwrap();
        let extended = calendar
            .with_virtual_row(day(9, 11), "20201200", "20201200")
            .unwrap();

        let last = extended.last().unwrap();
        assert_eq!(last.current_contract, "20200900");
        assert_eq!(last.next_contract, "20201200");
        assert!(extended.check_continuity());

        assert!(calendar
            .with_virtual_row(day(6, 12), "20201200", "20201200")
            .is_err());
    }

    #[test]
    fn test_dates_valid_for_prices() {
        let mut prices = ContractFinalPrices::new();
        for id in ["20200300", "20200600", "20200900"] {
            prices
                .insert(id, TimeSeries::from_points(vec![(day(3, 10), 1.0), (day(6, 12), 1.0)]))
                .unwrap();
        }
        let calendar = RollCalendar::new(rows()).unwrap();
        assert!(calendar.check_dates_are_valid_for_prices(&prices));

        let mut missing = ContractFinalPrices::new();
        missing
            .insert("20200300", TimeSeries::from_points(vec![(day(3, 10), 1.0)]))
            .unwrap();
        assert!(!calendar.check_dates_are_valid_for_prices(&missing));
    }
}
