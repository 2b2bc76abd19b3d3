//roll calendars, multiple prices and back-adjusted continuous prices for futures

pub mod calendar;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod instrument;
pub mod merge;
pub mod metrics;
pub mod prices;

//prelude module for convenient imports
pub mod prelude {
    pub use crate::calendar::{RollCalendar, RollCalendarRow, RollDateMatch};
    pub use crate::config::EngineConfig;
    pub use crate::data::{
        Artifact, ArtifactStore, ContractFinalPrices, ContractPriceSeries, CsvPriceStore, InMemoryPriceStore,
        PriceBar, PriceStore, TimeSeries,
    };
    pub use crate::engine::{build_instruments, InstrumentBuild, InstrumentPipeline};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::instrument::{
        CarryOffset, ContractDate, ContractNavigator, CycleKind, Direction, ExpiryDate,
        RollCycle, RollParameters,
    };
    pub use crate::merge::{MergeConfig, MergeOutcome, MergeStatus, MergeValue};
    pub use crate::metrics::{print_batch_table, RollSummary};
    pub use crate::prices::{AdjustedPrices, AdjustedUpdate, MultiplePriceRow, MultiplePrices};
}
