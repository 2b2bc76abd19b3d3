use crate::merge::MergeConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

//engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    //root of the csv price store
    pub data_dir: PathBuf,

    //spike checking
    pub check_for_spike: bool,
    pub max_price_spike: f64,
    pub spike_ewm_span: usize,

    //fill gaps in price and forward before panama stitching
    pub forward_fill_before_stitching: bool,

    //threads for batch builds, 0 lets rayon decide
    pub batch_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_dir: PathBuf::from("data"),
            check_for_spike: true,
            max_price_spike: 8.0,
            spike_ewm_span: 500,
            forward_fill_before_stitching: false,
            batch_threads: 0,
        }
    }
}

impl EngineConfig {
    //load configuration from a JSON file
    pub fn from_json_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    //save configuration to a JSON file
    pub fn to_json_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    //merge settings for updates; overlapping values never replace stored ones
    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            check_for_spike: self.check_for_spike,
            max_spike: self.max_price_spike,
            ewm_span: self.spike_ewm_span,
            keep_older: true,
        }
    }
}
