pub mod bar;
pub mod loader;
pub mod series;
pub mod store;

pub use bar::{BarError, PriceBar};
pub use series::{ContractFinalPrices, ContractPriceSeries, TimeSeries};
pub use store::{Artifact, ArtifactStore, CsvPriceStore, InMemoryPriceStore, PriceStore};
