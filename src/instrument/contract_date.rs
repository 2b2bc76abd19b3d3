use crate::error::{EngineError, EngineResult};
use crate::instrument::roll_cycle::{letter_from_month, Direction, RollCycle};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

//an expiry date is either known exactly or approximated from the contract month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryDate {
    Exact(NaiveDate),
    Approximate(NaiveDate),
}

impl ExpiryDate {
    pub fn date(&self) -> NaiveDate {
        match self {
            ExpiryDate::Exact(date) | ExpiryDate::Approximate(date) => *date,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, ExpiryDate::Exact(_))
    }
}

//persisted form of a contract date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDateRecord {
    pub contract_date: String,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub approx_expiry_offset: i64,
}

//a single futures contract month, optionally day precise (yyyymm or yyyymmdd)
//
//identity (equality, ordering, hashing) is the year/month/day only, the expiry
//date can be refined without changing which contract this is
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ContractDateRecord", into = "ContractDateRecord")]
pub struct ContractDate {
    year: i32,
    month: u32,
    day: Option<u32>,
    expiry: ExpiryDate,
    approx_expiry_offset: i64,
}

impl ContractDate {
    //parses a yyyymm or yyyymmdd identifier and approximates the expiry
    pub fn new(contract_id: &str, approx_expiry_offset: i64) -> EngineResult<Self> {
        let (year, month, day) = parse_contract_id(contract_id)?;
        Self::from_parts(year, month, day, approx_expiry_offset)
    }

    //parses an identifier with a known exact expiry
    pub fn with_expiry(contract_id: &str, expiry_date: NaiveDate) -> EngineResult<Self> {
        let mut contract = Self::new(contract_id, 0)?;
        contract.expiry = ExpiryDate::Exact(expiry_date);
        Ok(contract)
    }

    //builds a contract from numeric parts, approximating the expiry
    pub fn from_parts(
        year: i32,
        month: u32,
        day: Option<u32>,
        approx_expiry_offset: i64,
    ) -> EngineResult<Self> {
        let first_day = NaiveDate::from_ymd_opt(year, month, day.unwrap_or(1)).ok_or_else(|| {
            EngineError::InvalidContractDate(format_contract_id(year, month, day))
        })?;

        Ok(ContractDate {
            year,
            month,
            day,
            expiry: ExpiryDate::Approximate(first_day + Duration::days(approx_expiry_offset)),
            approx_expiry_offset,
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    //day of the contract, undefined for month-only contracts
    pub fn day(&self) -> Option<u32> {
        self.day
    }

    pub fn is_day_defined(&self) -> bool {
        self.day.is_some()
    }

    //month code of the contract month (eg 'H' for march)
    pub fn letter_month(&self) -> char {
        letter_from_month(self.month).unwrap_or('?')
    }

    //yyyymmdd with a trailing 00 day when month-only
    pub fn date_str(&self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day.unwrap_or(0))
    }

    pub fn expiry(&self) -> ExpiryDate {
        self.expiry
    }

    pub fn expiry_date(&self) -> NaiveDate {
        self.expiry.date()
    }

    pub fn approx_expiry_offset(&self) -> i64 {
        self.approx_expiry_offset
    }

    //replaces the approximate expiry with the true one; allowed once
    pub fn update_expiry_date(&mut self, expiry_date: NaiveDate) -> EngineResult<()> {
        match self.expiry {
            ExpiryDate::Exact(existing) if existing != expiry_date => {
                Err(EngineError::InvalidContractDate(format!(
                    "{} already has exact expiry {}, cannot change to {}",
                    self.date_str(),
                    existing,
                    expiry_date
                )))
            }
            _ => {
                self.expiry = ExpiryDate::Exact(expiry_date);
                Ok(())
            }
        }
    }

    //re-approximates the expiry with a new offset; exact expiries are left alone
    pub fn update_expiry_with_offset(&mut self, approx_expiry_offset: i64) {
        if self.expiry.is_exact() {
            return;
        }

        self.approx_expiry_offset = approx_expiry_offset;
        self.expiry = ExpiryDate::Approximate(
            self.first_date() + Duration::days(approx_expiry_offset),
        );
    }

    //next contract month in the given cycle
    pub fn next_contract_date(&self, cycle: &RollCycle) -> EngineResult<ContractDate> {
        self.step(Direction::Forward, cycle)
    }

    //previous contract month in the given cycle
    pub fn previous_contract_date(&self, cycle: &RollCycle) -> EngineResult<ContractDate> {
        self.step(Direction::Backward, cycle)
    }

    //steps through the cycle; an exact expiry is dropped since it belonged to the old month,
    //and a day past the end of the new month is clamped to its last day
    pub fn step(&self, direction: Direction, cycle: &RollCycle) -> EngineResult<ContractDate> {
        let (year, month) = cycle.step_year_month(direction, self.year, self.month)?;
        let day = self.day.map(|day| day.min(last_day_of_month(year, month)));
        Self::from_parts(year, month, day, self.approx_expiry_offset)
    }

    fn first_date(&self) -> NaiveDate {
        //validated at construction
        NaiveDate::from_ymd_opt(self.year, self.month, self.day.unwrap_or(1))
            .unwrap_or(NaiveDate::MIN)
    }

    //the (year, month, day-or-zero) key used for identity
    fn key(&self) -> (i32, u32, u32) {
        (self.year, self.month, self.day.unwrap_or(0))
    }
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn format_contract_id(year: i32, month: u32, day: Option<u32>) -> String {
    format!("{:04}{:02}{:02}", year, month, day.unwrap_or(0))
}

fn parse_contract_id(contract_id: &str) -> EngineResult<(i32, u32, Option<u32>)> {
    let invalid = || EngineError::InvalidContractDate(contract_id.to_string());
    let id = contract_id.trim();

    if !(id.len() == 6 || id.len() == 8) || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let year: i32 = id[0..4].parse().map_err(|_| invalid())?;
    let month: u32 = id[4..6].parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }

    let day = if id.len() == 8 {
        match id[6..8].parse::<u32>().map_err(|_| invalid())? {
            0 => None,
            day => Some(day),
        }
    } else {
        None
    };

    Ok((year, month, day))
}

impl PartialEq for ContractDate {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ContractDate {}

impl PartialOrd for ContractDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContractDate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for ContractDate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for ContractDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date_str())
    }
}

impl FromStr for ContractDate {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractDate::new(s, 0)
    }
}

impl TryFrom<ContractDateRecord> for ContractDate {
    type Error = EngineError;

    fn try_from(record: ContractDateRecord) -> Result<Self, Self::Error> {
        let mut contract = ContractDate::new(&record.contract_date, record.approx_expiry_offset)?;
        if let Some(expiry) = record.expiry_date {
            contract.update_expiry_date(expiry)?;
        }
        Ok(contract)
    }
}

impl From<ContractDate> for ContractDateRecord {
    fn from(contract: ContractDate) -> Self {
        ContractDateRecord {
            contract_date: contract.date_str(),
            expiry_date: if contract.expiry.is_exact() {
                Some(contract.expiry_date())
            } else {
                None
            },
            approx_expiry_offset: contract.approx_expiry_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_month_only() {
        let contract = ContractDate::new("202003", 0).unwrap();
        assert_eq!(contract.year(), 2020);
        assert_eq!(contract.month(), 3);
        assert_eq!(contract.day(), None);
        assert_eq!(contract.date_str(), "20200300");
        assert_eq!(contract.letter_month(), 'H');
        assert_eq!(contract.expiry_date(), ymd(2020, 3, 1));
        assert!(!contract.expiry().is_exact());
    }

    #[test]
    fn test_trailing_zero_day_is_month_only() {
        let contract = ContractDate::new("20200300", 0).unwrap();
        assert_eq!(contract.day(), None);
        assert_eq!(contract, ContractDate::new("202003", 0).unwrap());
    }

    #[test]
    fn test_parse_day_precise_with_offset() {
        let contract = ContractDate::new("20200318", 2).unwrap();
        assert_eq!(contract.day(), Some(18));
        assert_eq!(contract.expiry_date(), ymd(2020, 3, 20));
    }

    #[test]
    fn test_invalid_ids() {
        for bad in ["2020", "2020131", "202013", "20200231", "abcdef"] {
            assert!(ContractDate::new(bad, 0).is_err(), "{} should fail", bad);
        }
    }

    #[test]
    fn test_expiry_refinement_is_one_time() {
        let mut contract = ContractDate::new("202006", 15).unwrap();
        contract.update_expiry_date(ymd(2020, 6, 19)).unwrap();
        assert_eq!(contract.expiry(), ExpiryDate::Exact(ymd(2020, 6, 19)));

        //same date again is fine, a different one is not
        assert!(contract.update_expiry_date(ymd(2020, 6, 19)).is_ok());
        assert!(contract.update_expiry_date(ymd(2020, 6, 20)).is_err());

        //offset updates leave an exact expiry alone
        contract.update_expiry_with_offset(3);
        assert_eq!(contract.expiry_date(), ymd(2020, 6, 19));
    }

    #[test]
    fn test_stepping_discards_exact_expiry() {
        let cycle = RollCycle::new("HMUZ").unwrap();
        let contract = ContractDate::with_expiry("202012", ymd(2020, 12, 18)).unwrap();

        let next = contract.next_contract_date(&cycle).unwrap();
        assert_eq!(next.date_str(), "20210300");
        assert!(!next.expiry().is_exact());

        let previous = contract.previous_contract_date(&cycle).unwrap();
        assert_eq!(previous.date_str(), "20200900");
    }

    #[test]
    fn test_ordering_ignores_expiry() {
        let a = ContractDate::new("202003", 0).unwrap();
        let b = ContractDate::with_expiry("202003", ymd(2020, 3, 20)).unwrap();
        let c = ContractDate::new("202006", 0).unwrap();
        assert_eq!(a, b);
        assert!(a < c);
    }

    #[test]
    fn test_serde_record() {
        let contract = ContractDate::with_expiry("202003", ymd(2020, 3, 20)).unwrap();
        let json = serde_json::to_string(&contract).unwrap();
        let back: ContractDate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, contract);
        assert_eq!(back.expiry(), ExpiryDate::Exact(ymd(2020, 3, 20)));
    }

    #[test]
    fn test_day_is_clamped_to_shorter_month() {
        let cycle = RollCycle::global();
        let contract = ContractDate::new("20200131", 0).unwrap();

        let next = contract.next_contract_date(&cycle).unwrap();
        assert_eq!(next.date_str(), "20200229");
        assert_eq!(next.expiry_date(), ymd(2020, 2, 29));

        let quarterly = RollCycle::new("HMUZ").unwrap();
        let march = ContractDate::new("20200331", 0).unwrap();
        assert_eq!(march.next_contract_date(&quarterly).unwrap().date_str(), "20200630");
        assert_eq!(march.previous_contract_date(&quarterly).unwrap().date_str(), "20191231");
    }
}
