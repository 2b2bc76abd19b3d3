use crate::calendar::RollCalendar;
use crate::config::EngineConfig;
use crate::data::series::{ContractPriceSeries, TimeSeries};
use crate::data::store::{Artifact, ArtifactStore, PriceStore};
use crate::error::{EngineError, EngineResult};
use crate::instrument::ContractDate;
use crate::merge::{self, MergeOutcome};
use crate::prices::{AdjustedPrices, AdjustedUpdate, MultiplePriceRow, MultiplePrices};
use tracing::{info, warn};

//everything derived for one instrument in a single run
#[derive(Debug, Clone)]
pub struct InstrumentBuild {
    pub instrument_code: String,
    pub calendar: RollCalendar,
    pub multiple_prices: MultiplePrices,
    pub adjusted_prices: AdjustedPrices,
}

//calendar -> multiple prices -> adjusted prices for one instrument at a time
pub struct InstrumentPipeline<'a, S: ?Sized> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S> InstrumentPipeline<'a, S>
where
    S: PriceStore + ArtifactStore + ?Sized,
{
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        InstrumentPipeline { store, config }
    }

    //builds a roll calendar from stored contract prices and reports any failed checks
    pub fn build_roll_calendar(&self, instrument_code: &str) -> EngineResult<RollCalendar> {
        let parameters = self.store.get_roll_parameters(instrument_code)?;
        let prices = self.store.final_prices_for_instrument(instrument_code)?;
        info!(
            instrument = instrument_code,
            contracts = prices.len(),
            parameters = %parameters,
            "building roll calendar"
        );

        let calendar = RollCalendar::create_from_prices(&prices, &parameters)?;

        let monotonic = calendar.check_if_date_index_monotonic();
        let continuous = calendar.check_continuity();
        let priced = calendar.check_dates_are_valid_for_prices(&prices);
        if !(monotonic && continuous && priced) {
            warn!(instrument = instrument_code, "roll calendar failed checks, review before use");
        }

        Ok(calendar)
    }

    //re-runs the calendar checks against the stored calendar
    pub fn check_roll_calendar(&self, instrument_code: &str) -> EngineResult<bool> {
        let calendar = self.stored_roll_calendar(instrument_code)?;
        let prices = self.store.final_prices_for_instrument(instrument_code)?;

        let monotonic = calendar.check_if_date_index_monotonic();
        let continuous = calendar.check_continuity();
        let priced = calendar.check_dates_are_valid_for_prices(&prices);

        Ok(monotonic && continuous && priced)
    }

    pub fn build_multiple_prices(
        &self,
        instrument_code: &str,
        calendar: &RollCalendar,
    ) -> EngineResult<MultiplePrices> {
        let prices = self.store.final_prices_for_instrument(instrument_code)?;
        let multiple_prices = MultiplePrices::build_from_calendar(calendar, &prices)?;
        info!(
            instrument = instrument_code,
            rows = multiple_prices.len(),
            "multiple prices built"
        );
        Ok(multiple_prices)
    }

    pub fn build_adjusted_prices(&self, multiple_prices: &MultiplePrices) -> EngineResult<AdjustedPrices> {
        AdjustedPrices::stitch(multiple_prices, self.config.forward_fill_before_stitching)
    }

    //runs the whole chain without persisting anything
    pub fn build(&self, instrument_code: &str) -> EngineResult<InstrumentBuild> {
        let calendar = self.build_roll_calendar(instrument_code)?;
        let multiple_prices = self.build_multiple_prices(instrument_code, &calendar)?;
        let adjusted_prices = self.build_adjusted_prices(&multiple_prices)?;

        Ok(InstrumentBuild {
            instrument_code: instrument_code.to_string(),
            calendar,
            multiple_prices,
            adjusted_prices,
        })
    }

    //runs the whole chain and stores each artifact; nothing is written if any of them
    //already exists and overwrite is not set
    pub fn build_and_write(&self, instrument_code: &str, overwrite: bool) -> EngineResult<InstrumentBuild> {
        self.store
            .check_can_write(instrument_code, &Artifact::ALL, overwrite)?;
        let build = self.build(instrument_code)?;

        self.store
            .write_roll_calendar(instrument_code, &build.calendar, overwrite)?;
        self.store
            .write_multiple_prices(instrument_code, &build.multiple_prices, overwrite)?;
        self.store
            .write_adjusted_prices(instrument_code, &build.adjusted_prices, overwrite)?;

        info!(instrument = instrument_code, "roll calendar, multiple and adjusted prices written");
        Ok(build)
    }

    pub fn stored_roll_calendar(&self, instrument_code: &str) -> EngineResult<RollCalendar> {
        self.store
            .read_roll_calendar(instrument_code)?
            .ok_or_else(|| {
                EngineError::MissingData(format!("no roll calendar stored for {}", instrument_code))
            })
    }

    pub fn stored_multiple_prices(&self, instrument_code: &str) -> EngineResult<MultiplePrices> {
        self.store
            .read_multiple_prices(instrument_code)?
            .ok_or_else(|| {
                EngineError::MissingData(format!("no multiple prices stored for {}", instrument_code))
            })
    }

    //the calendar implied by the stored multiple prices
    pub fn back_out_roll_calendar(&self, instrument_code: &str) -> EngineResult<RollCalendar> {
        let multiple_prices = self.stored_multiple_prices(instrument_code)?;
        RollCalendar::back_out_from_multiple_prices(&multiple_prices)
    }

    //merges newly collected bars into a stored contract; nothing is written on a spike
    pub fn update_contract_prices(
        &self,
        instrument_code: &str,
        contract: &ContractDate,
        new_bars: &ContractPriceSeries,
    ) -> EngineResult<MergeOutcome<ContractPriceSeries>> {
        let existing = match self.store.get_price_series(instrument_code, contract) {
            Ok(existing) => existing,
            Err(EngineError::MissingData(_)) => ContractPriceSeries::new(),
            Err(e) => return Err(e),
        };

        let outcome = merge::full_merge_of_existing_data(&existing, new_bars, &self.config.merge_config());
        match &outcome {
            MergeOutcome::Merged(merged) => {
                self.store
                    .write_price_series(instrument_code, contract, merged)?;
                info!(
                    instrument = instrument_code,
                    contract = %contract,
                    rows = merged.len(),
                    "contract prices updated"
                );
            }
            MergeOutcome::SpikeDetected { date, magnitude } => {
                warn!(
                    instrument = instrument_code,
                    contract = %contract,
                    date = %date,
                    magnitude,
                    "spike in new contract prices, not written"
                );
            }
        }

        Ok(outcome)
    }

    //extends stored multiple prices with contract prices that arrived after the last row,
    //keeping the current contract labels; nothing is written on a spike
    pub fn update_multiple_prices(&self, instrument_code: &str) -> EngineResult<MergeOutcome<MultiplePrices>> {
        let multiple_prices = self.stored_multiple_prices(instrument_code)?;
        let (last_timestamp, last_row) = multiple_prices
            .series()
            .last()
            .cloned()
            .ok_or_else(|| {
                EngineError::MissingData(format!("stored multiple prices for {} are empty", instrument_code))
            })?;

        let price = self
            .contract_final_prices(instrument_code, &last_row.price_contract)?
            .ok_or_else(|| {
                EngineError::MissingData(format!(
                    "no prices for {} {}",
                    instrument_code, last_row.price_contract
                ))
            })?
            .after(last_timestamp)
            .drop_nan();
        let forward = self
            .contract_final_prices(instrument_code, &last_row.forward_contract)?
            .unwrap_or_default();
        let carry = self
            .contract_final_prices(instrument_code, &last_row.carry_contract)?
            .unwrap_or_default();

        let new_rows: TimeSeries<MultiplePriceRow> = price
            .iter()
            .map(|(timestamp, value)| {
                (
                    *timestamp,
                    MultiplePriceRow::new(
                        *value,
                        forward.value_at(*timestamp),
                        carry.value_at(*timestamp),
                        last_row.price_contract.clone(),
                        last_row.forward_contract.clone(),
                        last_row.carry_contract.clone(),
                    ),
                )
            })
            .collect();

        let outcome = multiple_prices.update_with_new_rows_no_roll(
            &MultiplePrices::new(new_rows),
            &self.config.merge_config(),
        )?;

        match &outcome {
            MergeOutcome::Merged(updated) => {
                self.store
                    .write_multiple_prices(instrument_code, updated, true)?;
                info!(
                    instrument = instrument_code,
                    added = updated.len().saturating_sub(multiple_prices.len()),
                    "multiple prices updated"
                );
            }
            MergeOutcome::SpikeDetected { date, magnitude } => {
                warn!(
                    instrument = instrument_code,
                    date = %date,
                    magnitude,
                    "spike in new multiple prices, not written"
                );
            }
        }

        Ok(outcome)
    }

    //final prices of one contract, none when the store has nothing for it
    fn contract_final_prices(
        &self,
        instrument_code: &str,
        contract_id: &str,
    ) -> EngineResult<Option<TimeSeries<f64>>> {
        let contract = ContractDate::new(contract_id, 0)?;
        match self.store.get_price_series(instrument_code, &contract) {
            Ok(series) => Ok(Some(series.final_prices())),
            Err(EngineError::MissingData(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    //extends stored adjusted prices from stored multiple prices when no roll has happened
    pub fn update_adjusted_prices(&self, instrument_code: &str) -> EngineResult<AdjustedUpdate> {
        let multiple_prices = self.stored_multiple_prices(instrument_code)?;
        let adjusted_prices = self
            .store
            .read_adjusted_prices(instrument_code)?
            .ok_or_else(|| {
                EngineError::MissingData(format!("no adjusted prices stored for {}", instrument_code))
            })?;

        let update = adjusted_prices
            .update_with_multiple_prices_no_roll(&multiple_prices, &self.config.merge_config())?;

        if let AdjustedUpdate::Updated(updated) = &update {
            self.store
                .write_adjusted_prices(instrument_code, updated, true)?;
        }

        Ok(update)
    }
}
