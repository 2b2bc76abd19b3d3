use crate::error::{EngineError, EngineResult};
use crate::instrument::roll_cycle::RollCycle;
use serde::{Deserialize, Serialize};
use std::fmt;

//which neighbouring priced contract is used as the carry reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum CarryOffset {
    Next,
    Previous,
}

impl CarryOffset {
    pub fn as_i32(&self) -> i32 {
        match self {
            CarryOffset::Next => 1,
            CarryOffset::Previous => -1,
        }
    }
}

impl TryFrom<i32> for CarryOffset {
    type Error = EngineError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CarryOffset::Next),
            -1 => Ok(CarryOffset::Previous),
            other => Err(EngineError::RollCycle(format!(
                "carry offset must be +1 or -1, got {}",
                other
            ))),
        }
    }
}

impl From<CarryOffset> for i32 {
    fn from(offset: CarryOffset) -> Self {
        offset.as_i32()
    }
}

//persisted form of roll parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollParametersRecord {
    pub hold_rollcycle: String,
    pub priced_rollcycle: String,
    #[serde(default)]
    pub roll_offset_day: i64,
    #[serde(default = "default_carry_offset")]
    pub carry_offset: i32,
    #[serde(default)]
    pub approx_expiry_offset: i64,
}

fn default_carry_offset() -> i32 {
    -1
}

//per instrument description of how contracts are held, priced and rolled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RollParametersRecord", into = "RollParametersRecord")]
pub struct RollParameters {
    //the months we actually hold
    held_cycle: RollCycle,

    //every month for which prices are collected
    priced_cycle: RollCycle,

    //days relative to expiry when we usually roll (usually negative)
    roll_offset_days: i64,

    carry_offset: CarryOffset,

    //days relative to the 1st of the contract month when expiry usually occurs
    approx_expiry_offset_days: i64,
}

impl RollParameters {
    //creates roll parameters, checking that held months are also priced
    pub fn new(
        held_cycle: RollCycle,
        priced_cycle: RollCycle,
        roll_offset_days: i64,
        carry_offset: CarryOffset,
        approx_expiry_offset_days: i64,
    ) -> EngineResult<Self> {
        if !held_cycle.is_subset_of(&priced_cycle) {
            return Err(EngineError::RollCycle(format!(
                "held cycle {} must be contained in priced cycle {}",
                held_cycle, priced_cycle
            )));
        }

        Ok(RollParameters {
            held_cycle,
            priced_cycle,
            roll_offset_days,
            carry_offset,
            approx_expiry_offset_days,
        })
    }

    //creates roll parameters from cycle strings and a raw carry offset
    pub fn from_params(
        hold_rollcycle: &str,
        priced_rollcycle: &str,
        roll_offset_day: i64,
        carry_offset: i32,
        approx_expiry_offset: i64,
    ) -> EngineResult<Self> {
        RollParameters::new(
            RollCycle::new(hold_rollcycle)?,
            RollCycle::new(priced_rollcycle)?,
            roll_offset_day,
            CarryOffset::try_from(carry_offset)?,
            approx_expiry_offset,
        )
    }

    //quarterly equity index style parameters: hold and price HMUZ, roll 5 days
    //before an expiry around the third friday, carry from the next contract
    pub fn quarterly() -> Self {
        RollParameters {
            held_cycle: quarterly_cycle(),
            priced_cycle: quarterly_cycle(),
            roll_offset_days: -5,
            carry_offset: CarryOffset::Next,
            approx_expiry_offset_days: 15,
        }
    }

    pub fn held_cycle(&self) -> &RollCycle {
        &self.held_cycle
    }

    pub fn priced_cycle(&self) -> &RollCycle {
        &self.priced_cycle
    }

    pub fn roll_offset_days(&self) -> i64 {
        self.roll_offset_days
    }

    pub fn carry_offset(&self) -> CarryOffset {
        self.carry_offset
    }

    pub fn approx_expiry_offset_days(&self) -> i64 {
        self.approx_expiry_offset_days
    }

    pub fn to_record(&self) -> RollParametersRecord {
        RollParametersRecord {
            hold_rollcycle: self.held_cycle.cycle_string(),
            priced_rollcycle: self.priced_cycle.cycle_string(),
            roll_offset_day: self.roll_offset_days,
            carry_offset: self.carry_offset.as_i32(),
            approx_expiry_offset: self.approx_expiry_offset_days,
        }
    }
}

fn quarterly_cycle() -> RollCycle {
    RollCycle::new("HMUZ").unwrap_or_else(|_| RollCycle::global())
}

impl fmt::Display for RollParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hold:{} priced:{} roll_offset:{} carry_offset:{} approx_expiry_offset:{}",
            self.held_cycle,
            self.priced_cycle,
            self.roll_offset_days,
            self.carry_offset.as_i32(),
            self.approx_expiry_offset_days
        )
    }
}

impl TryFrom<RollParametersRecord> for RollParameters {
    type Error = EngineError;

    fn try_from(record: RollParametersRecord) -> Result<Self, Self::Error> {
        RollParameters::from_params(
            &record.hold_rollcycle,
            &record.priced_rollcycle,
            record.roll_offset_day,
            record.carry_offset,
            record.approx_expiry_offset,
        )
    }
}

impl From<RollParameters> for RollParametersRecord {
    fn from(parameters: RollParameters) -> Self {
        parameters.to_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_held_must_be_priced() {
        let result = RollParameters::from_params("HMUZ", "HMZ", -5, 1, 15);
        assert!(matches!(result, Err(EngineError::RollCycle(_))));

        let ok = RollParameters::from_params("Z", "HMUZ", -5, -1, 15).unwrap();
        assert_eq!(ok.held_cycle().cycle_string(), "Z");
        assert_eq!(ok.carry_offset(), CarryOffset::Previous);
    }

    #[test]
    fn test_carry_offset_must_be_unit() {
        let result = RollParameters::from_params("HMUZ", "HMUZ", -5, 2, 15);
        assert!(matches!(result, Err(EngineError::RollCycle(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let json = r#"{"hold_rollcycle":"Z","priced_rollcycle":"HMUZ","roll_offset_day":-20,"carry_offset":1,"approx_expiry_offset":18}"#;
        let parameters: RollParameters = serde_json::from_str(json).unwrap();
        assert_eq!(parameters.roll_offset_days(), -20);
        assert_eq!(parameters.carry_offset(), CarryOffset::Next);

        let again: RollParameters =
            serde_json::from_str(&serde_json::to_string(&parameters).unwrap()).unwrap();
        assert_eq!(again, parameters);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let json = r#"{"hold_rollcycle":"HMUZ","priced_rollcycle":"Z","carry_offset":1}"#;
        assert!(serde_json::from_str::<RollParameters>(json).is_err());
    }
}
