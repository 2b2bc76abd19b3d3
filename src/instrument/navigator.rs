use crate::error::EngineResult;
use crate::instrument::contract_date::ContractDate;
use crate::instrument::roll_cycle::{Direction, RollCycle};
use crate::instrument::roll_parameters::{CarryOffset, RollParameters};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

//which of the two instrument cycles to navigate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Held,
    Priced,
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleKind::Held => write!(f, "held"),
            CycleKind::Priced => write!(f, "priced"),
        }
    }
}

//a contract date bound to the roll parameters of its instrument
//
//navigation first snaps the contract to the nearest month that is valid in the
//relevant cycle, so it is well defined from an out of cycle starting point
#[derive(Debug, Clone)]
pub struct ContractNavigator<'a> {
    contract: ContractDate,
    parameters: &'a RollParameters,
}

impl<'a> ContractNavigator<'a> {
    pub fn new(contract: ContractDate, parameters: &'a RollParameters) -> Self {
        ContractNavigator {
            contract,
            parameters,
        }
    }

    //parses an identifier, approximating its expiry from the parameters
    pub fn from_contract_id(contract_id: &str, parameters: &'a RollParameters) -> EngineResult<Self> {
        let contract = ContractDate::new(contract_id, parameters.approx_expiry_offset_days())?;
        Ok(ContractNavigator::new(contract, parameters))
    }

    pub fn contract(&self) -> &ContractDate {
        &self.contract
    }

    pub fn contract_mut(&mut self) -> &mut ContractDate {
        &mut self.contract
    }

    pub fn into_contract(self) -> ContractDate {
        self.contract
    }

    pub fn parameters(&self) -> &'a RollParameters {
        self.parameters
    }

    pub fn date_str(&self) -> String {
        self.contract.date_str()
    }

    pub fn next_held_contract(&self) -> EngineResult<Self> {
        self.navigate(CycleKind::Held, Direction::Forward)
    }

    pub fn previous_held_contract(&self) -> EngineResult<Self> {
        self.navigate(CycleKind::Held, Direction::Backward)
    }

    pub fn next_priced_contract(&self) -> EngineResult<Self> {
        self.navigate(CycleKind::Priced, Direction::Forward)
    }

    pub fn previous_priced_contract(&self) -> EngineResult<Self> {
        self.navigate(CycleKind::Priced, Direction::Backward)
    }

    //the adjacent priced contract selected by the carry offset
    pub fn carry_contract(&self) -> EngineResult<Self> {
        match self.parameters.carry_offset() {
            CarryOffset::Next => self.next_priced_contract(),
            CarryOffset::Previous => self.previous_priced_contract(),
        }
    }

    //expiry plus the roll offset
    pub fn desired_roll_date(&self) -> NaiveDate {
        self.contract.expiry_date() + Duration::days(self.parameters.roll_offset_days())
    }

    //refreshes an approximate expiry with the instrument's offset
    pub fn update_expiry_with_offset_from_parameters(&mut self) {
        self.contract
            .update_expiry_with_offset(self.parameters.approx_expiry_offset_days());
    }

    pub fn is_valid_in(&self, kind: CycleKind) -> bool {
        self.cycle(kind).contains(self.contract.month())
    }

    pub fn navigate(&self, kind: CycleKind, direction: Direction) -> EngineResult<Self> {
        //when going forward snap backwards first (and vice versa) so the step lands
        //on the nearest valid month beyond the starting point
        let snapped = match direction {
            Direction::Forward => self.closest_valid(kind, Direction::Backward)?,
            Direction::Backward => self.closest_valid(kind, Direction::Forward)?,
        };

        let mut stepped = snapped.contract.step(direction, self.cycle(kind))?;
        stepped.update_expiry_with_offset(self.parameters.approx_expiry_offset_days());

        Ok(ContractNavigator::new(stepped, self.parameters))
    }

    //this contract if it is valid in the cycle, otherwise the nearest calendar month that is
    fn closest_valid(&self, kind: CycleKind, direction: Direction) -> EngineResult<Self> {
        let global = RollCycle::global();
        let mut candidate = self.clone();

        while !candidate.is_valid_in(kind) {
            let stepped = candidate.contract.step(direction, &global)?;
            candidate = ContractNavigator::new(stepped, self.parameters);
        }

        Ok(candidate)
    }

    fn cycle(&self, kind: CycleKind) -> &'a RollCycle {
        match kind {
            CycleKind::Held => self.parameters.held_cycle(),
            CycleKind::Priced => self.parameters.priced_cycle(),
        }
    }

    //first contract after this one in the cycle that has price data
    pub fn find_next_contract_with_price_data(
        &self,
        kind: CycleKind,
        available: &BTreeSet<String>,
    ) -> EngineResult<Option<Self>> {
        let final_contract = match available.iter().next_back() {
            Some(last) => last.clone(),
            None => return Ok(None),
        };

        let mut try_contract = self.navigate(kind, Direction::Forward)?;
        while try_contract.date_str() <= final_contract {
            if available.contains(&try_contract.date_str()) {
                return Ok(Some(try_contract));
            }

            warn!(
                after = %self.date_str(),
                expected = %try_contract.date_str(),
                cycle = %self.cycle(kind),
                "next expected {} contract not available (ok at the end of the calendar)",
                kind
            );
            try_contract = try_contract.navigate(kind, Direction::Forward)?;
        }

        Ok(None)
    }

    //closest contract before this one in the cycle that has price data
    pub fn find_previous_contract_with_price_data(
        &self,
        kind: CycleKind,
        available: &BTreeSet<String>,
    ) -> EngineResult<Option<Self>> {
        let first_contract = match available.iter().next() {
            Some(first) => first.clone(),
            None => return Ok(None),
        };

        let mut try_contract = self.navigate(kind, Direction::Backward)?;
        while try_contract.date_str() >= first_contract {
            if available.contains(&try_contract.date_str()) {
                return Ok(Some(try_contract));
            }

            warn!(
                before = %self.date_str(),
                expected = %try_contract.date_str(),
                cycle = %self.cycle(kind),
                "previous expected {} contract not available (ok at the start of the calendar)",
                kind
            );
            try_contract = try_contract.navigate(kind, Direction::Backward)?;
        }

        Ok(None)
    }

    //the nearest priced contract with data in the carry direction
    pub fn find_best_carry_contract_with_price_data(
        &self,
        available: &BTreeSet<String>,
    ) -> EngineResult<Option<Self>> {
        match self.parameters.carry_offset() {
            CarryOffset::Next => self.find_next_contract_with_price_data(CycleKind::Priced, available),
            CarryOffset::Previous => {
                self.find_previous_contract_with_price_data(CycleKind::Priced, available)
            }
        }
    }
}

impl fmt::Display for ContractNavigator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with roll parameters {}", self.contract, self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters(hold: &str, priced: &str, carry: i32) -> RollParameters {
        RollParameters::from_params(hold, priced, -5, carry, 15).unwrap()
    }

    #[test]
    fn test_held_navigation() {
        let params = parameters("Z", "HMUZ", -1);
        let nav = ContractNavigator::from_contract_id("202012", &params).unwrap();

        assert_eq!(nav.next_held_contract().unwrap().date_str(), "20211200");
        assert_eq!(nav.previous_held_contract().unwrap().date_str(), "20191200");
    }

    #[test]
    fn test_priced_and_carry_navigation() {
        let params = parameters("Z", "HMUZ", -1);
        let nav = ContractNavigator::from_contract_id("202012", &params).unwrap();

        assert_eq!(nav.next_priced_contract().unwrap().date_str(), "20210300");
        assert_eq!(nav.previous_priced_contract().unwrap().date_str(), "20200900");
        assert_eq!(nav.carry_contract().unwrap().date_str(), "20200900");

        let params = parameters("HMUZ", "HMUZ", 1);
        let nav = ContractNavigator::from_contract_id("202012", &params).unwrap();
        assert_eq!(nav.carry_contract().unwrap().date_str(), "20210300");
    }

    #[test]
    fn test_navigation_from_out_of_cycle_month() {
        let params = parameters("HMUZ", "HMUZ", 1);
        let nav = ContractNavigator::from_contract_id("202002", &params).unwrap();

        //february snaps back to december for a forward step, forward to march for a backward one
        assert_eq!(nav.next_held_contract().unwrap().date_str(), "20200300");
        assert_eq!(nav.previous_held_contract().unwrap().date_str(), "20191200");
    }

    #[test]
    fn test_desired_roll_date() {
        let params = parameters("HMUZ", "HMUZ", 1);
        let nav = ContractNavigator::from_contract_id("202003", &params).unwrap();

        //1st march + 15 days expiry, then 5 days earlier
        assert_eq!(
            nav.desired_roll_date(),
            NaiveDate::from_ymd_opt(2020, 3, 11).unwrap()
        );
        assert_eq!(
            nav.next_held_contract().unwrap().desired_roll_date(),
            NaiveDate::from_ymd_opt(2020, 6, 11).unwrap()
        );
    }

    #[test]
    fn test_find_contracts_with_price_data_skips_gaps() {
        let params = parameters("HMUZ", "HMUZ", 1);
        let available: BTreeSet<String> = ["20200300", "20200900", "20201200"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let nav = ContractNavigator::from_contract_id("202003", &params).unwrap();
        let next = nav
            .find_next_contract_with_price_data(CycleKind::Held, &available)
            .unwrap()
            .unwrap();
        assert_eq!(next.date_str(), "20200900");

        let last = ContractNavigator::from_contract_id("202012", &params).unwrap();
        assert!(last
            .find_next_contract_with_price_data(CycleKind::Held, &available)
            .unwrap()
            .is_none());

        let previous = last
            .find_previous_contract_with_price_data(CycleKind::Priced, &available)
            .unwrap()
            .unwrap();
        assert_eq!(previous.date_str(), "20200900");

        let carry = nav
            .find_best_carry_contract_with_price_data(&available)
            .unwrap()
            .unwrap();
        assert_eq!(carry.date_str(), "20200900");
    }
}
