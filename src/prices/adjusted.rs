use crate::data::series::TimeSeries;
use crate::error::{EngineError, EngineResult};
use crate::merge::{self, MergeConfig, MergeOutcome};
use crate::prices::multiple::MultiplePrices;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

//a back-adjusted continuous price series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustedPrices {
    series: TimeSeries<f64>,
}

//result of extending adjusted prices without a full rebuild
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustedUpdate {
    Updated(AdjustedPrices),

    //the price contract changed, the series has to be stitched again
    RollOccurred,

    SpikeDetected { date: NaiveDateTime, magnitude: f64 },
}

impl AdjustedPrices {
    pub fn new(series: TimeSeries<f64>) -> Self {
        AdjustedPrices { series }
    }

    //panama stitching: walking forward, each time the price contract changes every
    //earlier value is shifted by the forward minus price of the previous row, so
    //the most recent segment keeps its raw prices
    pub fn stitch(multiple_prices: &MultiplePrices, forward_fill: bool) -> EngineResult<Self> {
        if multiple_prices.is_empty() {
            return Err(EngineError::MissingData(
                "cannot stitch empty multiple prices".to_string(),
            ));
        }

        let multiple_prices = if forward_fill {
            multiple_prices.forward_fill()
        } else {
            multiple_prices.clone()
        };

        let points = multiple_prices.series().points();
        let mut timestamps = Vec::with_capacity(points.len());
        let mut values: Vec<f64> = Vec::with_capacity(points.len());
        let mut rolls = 0;

        for (idx, (timestamp, row)) in points.iter().enumerate() {
            if idx > 0 {
                let (previous_timestamp, previous) = &points[idx - 1];
                if previous.price_contract != row.price_contract {
                    let roll_differential = previous.forward - previous.price;
                    if roll_differential.is_nan() {
                        return Err(EngineError::PanamaAdjustment {
                            date: *previous_timestamp,
                            price_contract: previous.price_contract.clone(),
                            forward_contract: previous.forward_contract.clone(),
                        });
                    }

                    debug!(
                        date = %timestamp,
                        from = %previous.price_contract,
                        to = %row.price_contract,
                        roll_differential,
                        "panama adjustment"
                    );
                    values.iter_mut().for_each(|value| *value += roll_differential);
                    rolls += 1;
                }
            }

            timestamps.push(*timestamp);
            values.push(row.price);
        }

        info!(rows = values.len(), rolls, "adjusted prices stitched");

        Ok(AdjustedPrices::new(
            timestamps.into_iter().zip(values).collect(),
        ))
    }

    pub fn series(&self) -> &TimeSeries<f64> {
        &self.series
    }

    pub fn into_series(self) -> TimeSeries<f64> {
        self.series
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.series.last_timestamp()
    }

    //appends raw prices that arrived after the last adjusted timestamp, provided the
    //price contract in the updated multiple prices has not changed since then
    pub fn update_with_multiple_prices_no_roll(
        &self,
        updated: &MultiplePrices,
        config: &MergeConfig,
    ) -> EngineResult<AdjustedUpdate> {
        let last_date = self.last_timestamp().ok_or_else(|| {
            EngineError::MissingData("no adjusted prices to update".to_string())
        })?;

        let contract_at_last_date = updated
            .series()
            .up_to(last_date)
            .last()
            .map(|(_, row)| row.price_contract.clone())
            .ok_or_else(|| {
                EngineError::MissingData(format!(
                    "multiple prices do not reach back to {}",
                    last_date
                ))
            })?;

        let new_rows = updated.series().after(last_date);
        if new_rows.is_empty() {
            return Ok(AdjustedUpdate::Updated(self.clone()));
        }

        if new_rows
            .iter()
            .any(|(_, row)| row.price_contract != contract_at_last_date)
        {
            info!(contract = %contract_at_last_date, "roll since last adjusted price");
            return Ok(AdjustedUpdate::RollOccurred);
        }

        let new_prices = new_rows.map(|row| row.price).drop_nan();
        match merge::merge_newer_data(&self.series, &new_prices, config) {
            MergeOutcome::Merged(series) => Ok(AdjustedUpdate::Updated(AdjustedPrices::new(series))),
            MergeOutcome::SpikeDetected { date, magnitude } => {
                Ok(AdjustedUpdate::SpikeDetected { date, magnitude })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::series::TimeSeries;
    use crate::prices::multiple::MultiplePriceRow;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn row(price: f64, forward: f64, price_contract: &str, forward_contract: &str) -> MultiplePriceRow {
        MultiplePriceRow::new(price, forward, f64::NAN, price_contract, forward_contract, forward_contract)
    }

    fn worked_example() -> MultiplePrices {
        MultiplePrices::new(TimeSeries::from_points(vec![
            (day(1), row(100.0, 103.0, "CUR", "NEXT")),
            (day(2), row(101.0, 104.0, "CUR", "NEXT")),
            (day(3), row(105.0, f64::NAN, "NEXT", "FAR")),
        ]))
    }

    #[test]
    fn test_stitch_worked_example() {
        let adjusted = AdjustedPrices::stitch(&worked_example(), false).unwrap();
        assert_eq!(adjusted.series().values(), vec![103.0, 104.0, 105.0]);
    }

    #[test]
    fn test_stitch_needs_forward_on_roll_day() {
        let broken = MultiplePrices::new(TimeSeries::from_points(vec![
            (day(1), row(100.0, 103.0, "CUR", "NEXT")),
            (day(2), row(101.0, f64::NAN, "CUR", "NEXT")),
            (day(3), row(105.0, f64::NAN, "NEXT", "FAR")),
        ]));

        match AdjustedPrices::stitch(&broken, false) {
            Err(EngineError::PanamaAdjustment { date, .. }) => assert_eq!(date, day(2)),
            other => panic!("unexpected result {:?}", other),
        }

        //carrying the day 1 forward price over the gap lets the roll through
        let filled = AdjustedPrices::stitch(&broken, true).unwrap();
        assert_eq!(filled.series().values(), vec![102.0, 103.0, 105.0]);
    }

    #[test]
    fn test_incremental_update() {
        let adjusted = AdjustedPrices::stitch(&worked_example(), false).unwrap();
        let config = MergeConfig::without_spike_check();

        let mut points = worked_example().into_series().into_points();
        points.push((day(4), row(106.0, f64::NAN, "NEXT", "FAR")));
        let same_contract = MultiplePrices::new(TimeSeries::from_points(points.clone()));

        match adjusted
            .update_with_multiple_prices_no_roll(&same_contract, &config)
            .unwrap()
        {
            AdjustedUpdate::Updated(updated) => {
                assert_eq!(updated.series().values(), vec![103.0, 104.0, 105.0, 106.0])
            }
            other => panic!("unexpected update {:?}", other),
        }

        points.push((day(5), row(110.0, f64::NAN, "FAR", "FARTHER")));
        let rolled = MultiplePrices::new(TimeSeries::from_points(points));
        assert_eq!(
            adjusted
                .update_with_multiple_prices_no_roll(&rolled, &config)
                .unwrap(),
            AdjustedUpdate::RollOccurred
        );
    }
}
