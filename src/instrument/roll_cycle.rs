use crate::error::{EngineError, EngineResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

//the twelve canonical futures month codes, january first
pub const MONTH_CODES: [char; 12] = ['F', 'G', 'H', 'J', 'K', 'M', 'N', 'Q', 'U', 'V', 'X', 'Z'];

//converts a month code (eg 'H') to a month number (eg 3)
pub fn month_from_letter(letter: char) -> Option<u32> {
    MONTH_CODES
        .iter()
        .position(|&code| code == letter.to_ascii_uppercase())
        .map(|idx| idx as u32 + 1)
}

//converts a month number (1-12) to its month code
pub fn letter_from_month(month: u32) -> Option<char> {
    if (1..=12).contains(&month) {
        Some(MONTH_CODES[month as usize - 1])
    } else {
        None
    }
}

//direction of travel through a roll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

//an ordered set of contract months in which an instrument trades or is held
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RollCycle {
    //month numbers, ascending and unique
    months: Vec<u32>,
}

impl RollCycle {
    //creates a cycle from a string of month codes (eg "HMUZ"), in any order
    pub fn new(cycle: &str) -> EngineResult<Self> {
        let mut months = Vec::with_capacity(cycle.len());

        for letter in cycle.trim().chars() {
            let month = month_from_letter(letter).ok_or_else(|| {
                EngineError::RollCycle(format!("'{}' is not a futures month code", letter))
            })?;

            if months.contains(&month) {
                return Err(EngineError::RollCycle(format!(
                    "month code '{}' repeated in cycle '{}'",
                    letter, cycle
                )));
            }
            months.push(month);
        }

        if months.is_empty() {
            return Err(EngineError::RollCycle("roll cycle cannot be empty".to_string()));
        }

        months.sort_unstable();
        Ok(RollCycle { months })
    }

    //a cycle containing every calendar month
    pub fn global() -> Self {
        RollCycle {
            months: (1..=12).collect(),
        }
    }

    //the cycle as a sorted string of month codes
    pub fn cycle_string(&self) -> String {
        self.months
            .iter()
            .filter_map(|&month| letter_from_month(month))
            .collect()
    }

    pub fn months(&self) -> &[u32] {
        &self.months
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    //returns true if the month number is part of this cycle
    pub fn contains(&self, month: u32) -> bool {
        self.months.contains(&month)
    }

    //returns true if every month of this cycle is also in the other cycle
    pub fn is_subset_of(&self, other: &RollCycle) -> bool {
        self.months.iter().all(|&month| other.contains(month))
    }

    fn position(&self, month: u32) -> EngineResult<usize> {
        self.months.iter().position(|&m| m == month).ok_or_else(|| {
            EngineError::RollCycle(format!(
                "month {} not in roll cycle {}",
                month,
                self.cycle_string()
            ))
        })
    }

    //next month in the cycle, wrapping from the last month to the first
    pub fn next_month_in_cycle(&self, month: u32) -> EngineResult<u32> {
        let idx = self.position(month)?;
        Ok(self.months[(idx + 1) % self.months.len()])
    }

    //previous month in the cycle, wrapping from the first month to the last
    pub fn previous_month_in_cycle(&self, month: u32) -> EngineResult<u32> {
        let idx = self.position(month)?;
        let len = self.months.len();
        Ok(self.months[(idx + len - 1) % len])
    }

    pub fn is_first(&self, month: u32) -> EngineResult<bool> {
        Ok(self.position(month)? == 0)
    }

    pub fn is_last(&self, month: u32) -> EngineResult<bool> {
        Ok(self.position(month)? == self.months.len() - 1)
    }

    //steps one cycle month from (year, month), rolling the year at the cycle boundary
    pub fn step_year_month(
        &self,
        direction: Direction,
        year: i32,
        month: u32,
    ) -> EngineResult<(i32, u32)> {
        match direction {
            Direction::Forward => {
                let new_month = self.next_month_in_cycle(month)?;
                let new_year = if self.is_last(month)? { year + 1 } else { year };
                Ok((new_year, new_month))
            }
            Direction::Backward => {
                let new_month = self.previous_month_in_cycle(month)?;
                let new_year = if self.is_first(month)? { year - 1 } else { year };
                Ok((new_year, new_month))
            }
        }
    }

    //nearest in-cycle year/month strictly after the month containing the reference date
    pub fn year_month_after(&self, date: NaiveDate) -> (i32, u32) {
        match self.months.iter().find(|&&m| m > date.month()) {
            Some(&month) => (date.year(), month),
            None => (date.year() + 1, self.months[0]),
        }
    }

    //nearest in-cycle year/month strictly before the month containing the reference date
    pub fn year_month_before(&self, date: NaiveDate) -> (i32, u32) {
        match self.months.iter().rev().find(|&&m| m < date.month()) {
            Some(&month) => (date.year(), month),
            None => (date.year() - 1, self.months[self.months.len() - 1]),
        }
    }
}

impl fmt::Display for RollCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cycle_string())
    }
}

impl TryFrom<String> for RollCycle {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RollCycle::new(&value)
    }
}

impl From<RollCycle> for String {
    fn from(cycle: RollCycle) -> Self {
        cycle.cycle_string()
    }
}
