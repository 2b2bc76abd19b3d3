use crate::engine::pipeline::InstrumentBuild;
use crate::error::EngineResult;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

//summary of one instrument's roll history and stitched series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollSummary {
    pub instrument_code: String,
    pub calendar_rows: usize,
    pub carry_relaxed_rows: usize,
    pub multiple_price_rows: usize,
    pub first_date: Option<NaiveDateTime>,
    pub last_date: Option<NaiveDateTime>,
    pub current_price_contract: Option<String>,
    pub rolls: usize,
    pub mean_roll_differential: f64,
    pub std_roll_differential: f64,
    pub max_abs_roll_differential: f64,
    pub first_adjusted_price: f64,
    pub last_adjusted_price: f64,
}

impl RollSummary {
    //calculate summary from a completed build
    pub fn from_build(build: &InstrumentBuild) -> Self {
        let multiple_prices = &build.multiple_prices;
        let differentials: Vec<f64> = multiple_prices
            .roll_points()
            .iter()
            .map(|roll| roll.roll_differential())
            .filter(|differential| !differential.is_nan())
            .collect();

        let (mean, std_dev) = differential_statistics(&differentials);
        let max_abs = differentials
            .iter()
            .fold(0.0f64, |largest, differential| largest.max(differential.abs()));

        let adjusted = build.adjusted_prices.series();

        RollSummary {
            instrument_code: build.instrument_code.clone(),
            calendar_rows: build.calendar.len(),
            carry_relaxed_rows: build.calendar.carry_relaxed_rows(),
            multiple_price_rows: multiple_prices.len(),
            first_date: multiple_prices.first_timestamp(),
            last_date: multiple_prices.last_timestamp(),
            current_price_contract: multiple_prices
                .current_contracts()
                .map(|(price, _, _)| price.to_string()),
            rolls: differentials.len(),
            mean_roll_differential: mean,
            std_roll_differential: std_dev,
            max_abs_roll_differential: max_abs,
            first_adjusted_price: adjusted.points().first().map(|(_, p)| *p).unwrap_or(f64::NAN),
            last_adjusted_price: adjusted.last().map(|(_, p)| *p).unwrap_or(f64::NAN),
        }
    }

    //prints summary in a formatted table
    pub fn pretty_print_table(&self) {
        let mut table = Table::new();

        table.add_row(Row::new(vec![Cell::new("Metric"), Cell::new("Value")]));

        table.add_row(Row::new(vec![
            Cell::new("Instrument"),
            Cell::new(&self.instrument_code),
        ]));

        table.add_row(Row::new(vec![
            Cell::new("Date Range"),
            Cell::new(&format!(
                "{} to {}",
                format_date(self.first_date),
                format_date(self.last_date)
            )),
        ]));

        table.add_row(Row::new(vec![
            Cell::new("Roll Calendar Rows"),
            Cell::new(&format!(
                "{} ({} matched without carry)",
                self.calendar_rows, self.carry_relaxed_rows
            )),
        ]));

        table.add_row(Row::new(vec![
            Cell::new("Multiple Price Rows"),
            Cell::new(&format!("{}", self.multiple_price_rows)),
        ]));

        table.add_row(Row::new(vec![
            Cell::new("Current Contract"),
            Cell::new(self.current_price_contract.as_deref().unwrap_or("-")),
        ]));

        table.add_row(Row::new(vec![
            Cell::new("Rolls Stitched"),
            Cell::new(&format!("{}", self.rolls)),
        ]));

        table.add_row(Row::new(vec![
            Cell::new("Mean Roll Differential"),
            Cell::new(&format!("{:.4}", self.mean_roll_differential)),
        ]));

        table.add_row(Row::new(vec![
            Cell::new("Std Roll Differential"),
            Cell::new(&format!("{:.4}", self.std_roll_differential)),
        ]));

        table.add_row(Row::new(vec![
            Cell::new("Largest Roll Differential"),
            Cell::new(&format!("{:.4}", self.max_abs_roll_differential)),
        ]));

        table.add_row(Row::new(vec![
            Cell::new("Adjusted First / Last"),
            Cell::new(&format!(
                "{:.4} / {:.4}",
                self.first_adjusted_price, self.last_adjusted_price
            )),
        ]));

        table.printstd();
    }
}

//prints one line per instrument of a batch run
pub fn print_batch_table(results: &IndexMap<String, EngineResult<RollSummary>>) {
    let mut table = Table::new();

    table.add_row(Row::new(vec![
        Cell::new("Instrument"),
        Cell::new("Status"),
        Cell::new("Rolls"),
        Cell::new("Rows"),
        Cell::new("Last Date"),
    ]));

    for (instrument_code, result) in results {
        let row = match result {
            Ok(summary) => vec![
                Cell::new(instrument_code),
                Cell::new("ok"),
                Cell::new(&format!("{}", summary.rolls)),
                Cell::new(&format!("{}", summary.multiple_price_rows)),
                Cell::new(&format_date(summary.last_date)),
            ],
            Err(e) => vec![
                Cell::new(instrument_code),
                Cell::new(&format!("failed: {}", e)),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
            ],
        };
        table.add_row(Row::new(row));
    }

    table.printstd();
}

fn differential_statistics(differentials: &[f64]) -> (f64, f64) {
    if differentials.is_empty() {
        return (0.0, 0.0);
    }

    let mean = differentials.mean();
    let std_dev = if differentials.len() > 1 {
        differentials.std_dev()
    } else {
        0.0
    };

    (mean, std_dev)
}

fn format_date(date: Option<NaiveDateTime>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_differential_statistics() {
        assert_eq!(differential_statistics(&[]), (0.0, 0.0));
        assert_eq!(differential_statistics(&[2.0]), (2.0, 0.0));

        let (mean, std_dev) = differential_statistics(&[1.0, 3.0]);
        assert!((mean - 2.0).abs() < 1e-12);
        //sample standard deviation
        assert!((std_dev - 2.0f64.sqrt()).abs() < 1e-12);
    }
}
