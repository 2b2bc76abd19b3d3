use crate::config::EngineConfig;
use crate::data::store::{ArtifactStore, PriceStore};
use crate::engine::pipeline::InstrumentPipeline;
use crate::error::EngineResult;
use crate::metrics::RollSummary;
use indexmap::IndexMap;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{error, info, warn};

//builds and writes every instrument independently; one failure does not stop the others.
//results keep the order of the requested codes
pub fn build_instruments<S>(
    store: &S,
    instrument_codes: &[String],
    config: &EngineConfig,
    overwrite: bool,
) -> IndexMap<String, EngineResult<RollSummary>>
where
    S: PriceStore + ArtifactStore + Sync,
{
    let run = || -> Vec<(String, EngineResult<RollSummary>)> {
        instrument_codes
            .par_iter()
            .map(|instrument_code| {
                let pipeline = InstrumentPipeline::new(store, config);
                let result = pipeline
                    .build_and_write(instrument_code, overwrite)
                    .map(|build| RollSummary::from_build(&build));

                if let Err(e) = &result {
                    error!(instrument = %instrument_code, error = %e, "instrument build failed");
                }

                (instrument_code.clone(), result)
            })
            .collect()
    };

    let results = if config.batch_threads > 0 {
        match ThreadPoolBuilder::new()
            .num_threads(config.batch_threads)
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!(error = %e, "could not build thread pool, using the global one");
                run()
            }
        }
    } else {
        run()
    };

    let succeeded = results.iter().filter(|(_, result)| result.is_ok()).count();
    info!(
        instruments = results.len(),
        succeeded,
        "batch build finished"
    );

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::bar::PriceBar;
    use crate::data::series::ContractPriceSeries;
    use crate::data::store::InMemoryPriceStore;
    use crate::error::EngineError;
    use crate::instrument::{ContractDate, RollParameters};
    use chrono::{Duration, NaiveDate};

    fn store_with(codes: &[&str]) -> InMemoryPriceStore {
        let store = InMemoryPriceStore::new();
        let start = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        for code in codes {
            store.add_roll_parameters(code, RollParameters::quarterly());
            for id in ["202003", "202006", "202009", "202012"] {
                let series: ContractPriceSeries = (0..366)
                    .map(|n| (start + Duration::days(n), PriceBar::from_final(100.0 + n as f64 * 0.1)))
                    .collect();
                store.add_price_series(code, ContractDate::new(id, 0).unwrap(), series);
            }
        }
        store
    }

    #[test]
    fn test_failures_are_isolated_and_order_kept() {
        let store = store_with(&["ES", "NQ"]);
        let codes: Vec<String> = ["NQ", "MISSING", "ES"].iter().map(|s| s.to_string()).collect();
        let config = EngineConfig {
            batch_threads: 2,
            ..EngineConfig::default()
        };

        let results = build_instruments(&store, &codes, &config, false);

        assert_eq!(results.keys().cloned().collect::<Vec<_>>(), codes);
        assert!(results["NQ"].is_ok());
        assert!(results["ES"].is_ok());
        assert!(matches!(results["MISSING"], Err(EngineError::MissingData(_))));
        assert_eq!(results["ES"].as_ref().unwrap().calendar_rows, 3);
    }
}
