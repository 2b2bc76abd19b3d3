use chrono::NaiveDateTime;
use thiserror::Error;

//errors raised while building roll calendars, multiple prices and adjusted prices
#[derive(Error, Debug)]
pub enum EngineError {
    //a required contract, price series or parameter set could not be found
    #[error("Missing data: {0}")]
    MissingData(String),

    //a month or carry offset is structurally invalid
    #[error("Roll cycle error: {0}")]
    RollCycle(String),

    #[error("Invalid contract date '{0}': expected YYYYMM or YYYYMMDD")]
    InvalidContractDate(String),

    //a roll date in the interior of the calendar has no overlapping prices
    #[error("Roll calendar construction failed: {0}")]
    CalendarConstruction(String),

    #[error("Panama adjustment failed on {date}: no prices for both {price_contract} and {forward_contract}")]
    PanamaAdjustment {
        date: NaiveDateTime,
        price_contract: String,
        forward_contract: String,
    },

    //incremental update refused because contract labels changed
    #[error("Roll has occurred since last update ({existing} -> {incoming}), rebuild required")]
    RollOccurred { existing: String, incoming: String },

    //a stored row could not be interpreted
    #[error("Invalid record in {path} at line {line}: {message}")]
    InvalidRecord {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Refusing to overwrite existing {0} without confirmation")]
    OverwriteRefused(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
