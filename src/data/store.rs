use crate::calendar::RollCalendar;
use crate::data::loader;
use crate::data::series::{ContractFinalPrices, ContractPriceSeries};
use crate::error::{EngineError, EngineResult};
use crate::instrument::{ContractDate, RollParameters};
use crate::prices::{AdjustedPrices, MultiplePrices};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

//source of per-contract prices and roll parameters
pub trait PriceStore: Send + Sync {
    fn instrument_codes(&self) -> EngineResult<Vec<String>>;

    //contracts with stored prices, in date order
    fn contract_dates(&self, instrument_code: &str) -> EngineResult<Vec<ContractDate>>;

    fn get_price_series(
        &self,
        instrument_code: &str,
        contract: &ContractDate,
    ) -> EngineResult<ContractPriceSeries>;

    fn write_price_series(
        &self,
        instrument_code: &str,
        contract: &ContractDate,
        series: &ContractPriceSeries,
    ) -> EngineResult<()>;

    fn get_roll_parameters(&self, instrument_code: &str) -> EngineResult<RollParameters>;

    //final prices for every contract that has at least one valid price
    fn final_prices_for_instrument(&self, instrument_code: &str) -> EngineResult<ContractFinalPrices> {
        let mut prices = ContractFinalPrices::new();

        for contract in self.contract_dates(instrument_code)? {
            let final_prices = self.get_price_series(instrument_code, &contract)?.final_prices();
            if final_prices.drop_nan().is_empty() {
                debug!(instrument = instrument_code, contract = %contract, "no valid prices, ignoring");
                continue;
            }
            prices.insert_contract(&contract, final_prices);
        }

        if prices.is_empty() {
            return Err(EngineError::MissingData(format!(
                "no contract prices for {}",
                instrument_code
            )));
        }

        Ok(prices)
    }
}

//the derived series persisted per instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    RollCalendar,
    MultiplePrices,
    AdjustedPrices,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [
        Artifact::RollCalendar,
        Artifact::MultiplePrices,
        Artifact::AdjustedPrices,
    ];
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::RollCalendar => write!(f, "roll calendar"),
            Artifact::MultiplePrices => write!(f, "multiple prices"),
            Artifact::AdjustedPrices => write!(f, "adjusted prices"),
        }
    }
}

//persistence for the derived series; writes over existing data need overwrite set
pub trait ArtifactStore: Send + Sync {
    fn has_artifact(&self, instrument_code: &str, artifact: Artifact) -> bool;

    //fails on the first of the given artifacts already stored, unless overwriting
    fn check_can_write(
        &self,
        instrument_code: &str,
        artifacts: &[Artifact],
        overwrite: bool,
    ) -> EngineResult<()> {
        if overwrite {
            return Ok(());
        }

        match artifacts
            .iter()
            .find(|artifact| self.has_artifact(instrument_code, **artifact))
        {
            Some(artifact) => Err(refuse(*artifact, instrument_code)),
            None => Ok(()),
        }
    }

    fn read_roll_calendar(&self, instrument_code: &str) -> EngineResult<Option<RollCalendar>>;

    fn write_roll_calendar(
        &self,
        instrument_code: &str,
        calendar: &RollCalendar,
        overwrite: bool,
    ) -> EngineResult<()>;

    fn read_multiple_prices(&self, instrument_code: &str) -> EngineResult<Option<MultiplePrices>>;

    fn write_multiple_prices(
        &self,
        instrument_code: &str,
        prices: &MultiplePrices,
        overwrite: bool,
    ) -> EngineResult<()>;

    fn read_adjusted_prices(&self, instrument_code: &str) -> EngineResult<Option<AdjustedPrices>>;

    fn write_adjusted_prices(
        &self,
        instrument_code: &str,
        prices: &AdjustedPrices,
        overwrite: bool,
    ) -> EngineResult<()>;
}

fn refuse(artifact: Artifact, instrument_code: &str) -> EngineError {
    EngineError::OverwriteRefused(format!("{} for {}", artifact, instrument_code))
}

//store held entirely in memory, used for tests and library callers with their own io
#[derive(Debug, Default)]
pub struct InMemoryPriceStore {
    prices: RwLock<BTreeMap<String, BTreeMap<ContractDate, ContractPriceSeries>>>,
    parameters: RwLock<BTreeMap<String, RollParameters>>,
    calendars: RwLock<BTreeMap<String, RollCalendar>>,
    multiple_prices: RwLock<BTreeMap<String, MultiplePrices>>,
    adjusted_prices: RwLock<BTreeMap<String, AdjustedPrices>>,
}

impl InMemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_roll_parameters(&self, instrument_code: &str, parameters: RollParameters) {
        self.parameters
            .write()
            .insert(instrument_code.to_string(), parameters);
    }

    pub fn add_price_series(
        &self,
        instrument_code: &str,
        contract: ContractDate,
        series: ContractPriceSeries,
    ) {
        self.prices
            .write()
            .entry(instrument_code.to_string())
            .or_default()
            .insert(contract, series);
    }
}

impl PriceStore for InMemoryPriceStore {
    fn instrument_codes(&self) -> EngineResult<Vec<String>> {
        Ok(self.prices.read().keys().cloned().collect())
    }

    fn contract_dates(&self, instrument_code: &str) -> EngineResult<Vec<ContractDate>> {
        Ok(self
            .prices
            .read()
            .get(instrument_code)
            .map(|contracts| contracts.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn get_price_series(
        &self,
        instrument_code: &str,
        contract: &ContractDate,
    ) -> EngineResult<ContractPriceSeries> {
        self.prices
            .read()
            .get(instrument_code)
            .and_then(|contracts| contracts.get(contract))
            .cloned()
            .ok_or_else(|| {
                EngineError::MissingData(format!("no prices for {} {}", instrument_code, contract))
            })
    }

    fn write_price_series(
        &self,
        instrument_code: &str,
        contract: &ContractDate,
        series: &ContractPriceSeries,
    ) -> EngineResult<()> {
        self.add_price_series(instrument_code, contract.clone(), series.clone());
        Ok(())
    }

    fn get_roll_parameters(&self, instrument_code: &str) -> EngineResult<RollParameters> {
        self.parameters
            .read()
            .get(instrument_code)
            .cloned()
            .ok_or_else(|| {
                EngineError::MissingData(format!("no roll parameters for {}", instrument_code))
            })
    }
}

impl ArtifactStore for InMemoryPriceStore {
    fn has_artifact(&self, instrument_code: &str, artifact: Artifact) -> bool {
        match artifact {
            Artifact::RollCalendar => self.calendars.read().contains_key(instrument_code),
            Artifact::MultiplePrices => self.multiple_prices.read().contains_key(instrument_code),
            Artifact::AdjustedPrices => self.adjusted_prices.read().contains_key(instrument_code),
        }
    }

    fn read_roll_calendar(&self, instrument_code: &str) -> EngineResult<Option<RollCalendar>> {
        Ok(self.calendars.read().get(instrument_code).cloned())
    }

    fn write_roll_calendar(
        &self,
        instrument_code: &str,
        calendar: &RollCalendar,
        overwrite: bool,
    ) -> EngineResult<()> {
        let mut calendars = self.calendars.write();
        if calendars.contains_key(instrument_code) && !overwrite {
            return Err(refuse(Artifact::RollCalendar, instrument_code));
        }
        calendars.insert(instrument_code.to_string(), calendar.clone());
        Ok(())
    }

    fn read_multiple_prices(&self, instrument_code: &str) -> EngineResult<Option<MultiplePrices>> {
        Ok(self.multiple_prices.read().get(instrument_code).cloned())
    }

    fn write_multiple_prices(
        &self,
        instrument_code: &str,
        prices: &MultiplePrices,
        overwrite: bool,
    ) -> EngineResult<()> {
        let mut stored = self.multiple_prices.write();
        if stored.contains_key(instrument_code) && !overwrite {
            return Err(refuse(Artifact::MultiplePrices, instrument_code));
        }
        stored.insert(instrument_code.to_string(), prices.clone());
        Ok(())
    }

    fn read_adjusted_prices(&self, instrument_code: &str) -> EngineResult<Option<AdjustedPrices>> {
        Ok(self.adjusted_prices.read().get(instrument_code).cloned())
    }

    fn write_adjusted_prices(
        &self,
        instrument_code: &str,
        prices: &AdjustedPrices,
        overwrite: bool,
    ) -> EngineResult<()> {
        let mut stored = self.adjusted_prices.write();
        if stored.contains_key(instrument_code) && !overwrite {
            return Err(refuse(Artifact::AdjustedPrices, instrument_code));
        }
        stored.insert(instrument_code.to_string(), prices.clone());
        Ok(())
    }
}

//csv files on disk, one directory per instrument:
//
//  <root>/<INSTRUMENT>/roll_parameters.json
//  <root>/<INSTRUMENT>/prices/<YYYYMMDD>.csv
//  <root>/<INSTRUMENT>/roll_calendar.csv
//  <root>/<INSTRUMENT>/multiple_prices.csv
//  <root>/<INSTRUMENT>/adjusted_prices.csv
#[derive(Debug, Clone)]
pub struct CsvPriceStore {
    root: PathBuf,
}

impl CsvPriceStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        CsvPriceStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn instrument_dir(&self, instrument_code: &str) -> PathBuf {
        self.root.join(instrument_code)
    }

    fn prices_dir(&self, instrument_code: &str) -> PathBuf {
        self.instrument_dir(instrument_code).join("prices")
    }

    fn contract_path(&self, instrument_code: &str, contract: &ContractDate) -> PathBuf {
        self.prices_dir(instrument_code)
            .join(format!("{}.csv", contract.date_str()))
    }

    fn parameters_path(&self, instrument_code: &str) -> PathBuf {
        self.instrument_dir(instrument_code).join("roll_parameters.json")
    }

    fn calendar_path(&self, instrument_code: &str) -> PathBuf {
        self.instrument_dir(instrument_code).join("roll_calendar.csv")
    }

    fn multiple_path(&self, instrument_code: &str) -> PathBuf {
        self.instrument_dir(instrument_code).join("multiple_prices.csv")
    }

    fn adjusted_path(&self, instrument_code: &str) -> PathBuf {
        self.instrument_dir(instrument_code).join("adjusted_prices.csv")
    }

    pub fn write_roll_parameters(
        &self,
        instrument_code: &str,
        parameters: &RollParameters,
    ) -> EngineResult<()> {
        std::fs::create_dir_all(self.instrument_dir(instrument_code))?;
        let json = serde_json::to_string_pretty(parameters)?;
        std::fs::write(self.parameters_path(instrument_code), json)?;
        Ok(())
    }

    fn artifact_path(&self, instrument_code: &str, artifact: Artifact) -> PathBuf {
        match artifact {
            Artifact::RollCalendar => self.calendar_path(instrument_code),
            Artifact::MultiplePrices => self.multiple_path(instrument_code),
            Artifact::AdjustedPrices => self.adjusted_path(instrument_code),
        }
    }
}

impl PriceStore for CsvPriceStore {
    fn instrument_codes(&self) -> EngineResult<Vec<String>> {
        let mut codes = Vec::new();
        if !self.root.exists() {
            return Ok(codes);
        }

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                codes.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        codes.sort();

        Ok(codes)
    }

    fn contract_dates(&self, instrument_code: &str) -> EngineResult<Vec<ContractDate>> {
        let dir = self.prices_dir(instrument_code);
        if !dir.exists() {
            return Err(EngineError::MissingData(format!(
                "no price directory {}",
                dir.display()
            )));
        }

        let mut contracts = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                match ContractDate::new(stem, 0) {
                    Ok(contract) => contracts.push(contract),
                    Err(_) => debug!(file = %path.display(), "not a contract price file, ignoring"),
                }
            }
        }
        contracts.sort();

        Ok(contracts)
    }

    fn get_price_series(
        &self,
        instrument_code: &str,
        contract: &ContractDate,
    ) -> EngineResult<ContractPriceSeries> {
        let path = self.contract_path(instrument_code, contract);
        if !path.exists() {
            return Err(EngineError::MissingData(format!(
                "no prices for {} {}",
                instrument_code, contract
            )));
        }
        loader::load_contract_prices(path)
    }

    fn write_price_series(
        &self,
        instrument_code: &str,
        contract: &ContractDate,
        series: &ContractPriceSeries,
    ) -> EngineResult<()> {
        loader::write_contract_prices(self.contract_path(instrument_code, contract), series)
    }

    fn get_roll_parameters(&self, instrument_code: &str) -> EngineResult<RollParameters> {
        let path = self.parameters_path(instrument_code);
        if !path.exists() {
            return Err(EngineError::MissingData(format!(
                "no roll parameters for {}",
                instrument_code
            )));
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl ArtifactStore for CsvPriceStore {
    fn has_artifact(&self, instrument_code: &str, artifact: Artifact) -> bool {
        self.artifact_path(instrument_code, artifact).exists()
    }

    fn read_roll_calendar(&self, instrument_code: &str) -> EngineResult<Option<RollCalendar>> {
        let path = self.calendar_path(instrument_code);
        if !path.exists() {
            return Ok(None);
        }
        loader::load_roll_calendar(path).map(Some)
    }

    fn write_roll_calendar(
        &self,
        instrument_code: &str,
        calendar: &RollCalendar,
        overwrite: bool,
    ) -> EngineResult<()> {
        let path = self.calendar_path(instrument_code);
        self.check_can_write(instrument_code, &[Artifact::RollCalendar], overwrite)?;
        loader::write_roll_calendar(path, calendar)
    }

    fn read_multiple_prices(&self, instrument_code: &str) -> EngineResult<Option<MultiplePrices>> {
        let path = self.multiple_path(instrument_code);
        if !path.exists() {
            return Ok(None);
        }
        loader::load_multiple_prices(path).map(Some)
    }

    fn write_multiple_prices(
        &self,
        instrument_code: &str,
        prices: &MultiplePrices,
        overwrite: bool,
    ) -> EngineResult<()> {
        let path = self.multiple_path(instrument_code);
        self.check_can_write(instrument_code, &[Artifact::MultiplePrices], overwrite)?;
        loader::write_multiple_prices(path, prices)
    }

    fn read_adjusted_prices(&self, instrument_code: &str) -> EngineResult<Option<AdjustedPrices>> {
        let path = self.adjusted_path(instrument_code);
        if !path.exists() {
            return Ok(None);
        }
        loader::load_adjusted_prices(path).map(Some)
    }

    fn write_adjusted_prices(
        &self,
        instrument_code: &str,
        prices: &AdjustedPrices,
        overwrite: bool,
    ) -> EngineResult<()> {
        let path = self.adjusted_path(instrument_code);
        self.check_can_write(instrument_code, &[Artifact::AdjustedPrices], overwrite)?;
        loader::write_adjusted_prices(path, prices)
    }
}
