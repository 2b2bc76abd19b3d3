use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BarError {
    #[error("Invalid OHLC values: high ({high}) < low ({low})")]
    InvalidHighLow { high: f64, low: f64 },
    #[error("Invalid OHLC values: final ({close}) outside high-low range [{low}, {high}]")]
    InvalidClose { close: f64, high: f64, low: f64 },
    #[error("Negative volume: {0}")]
    NegativeVolume(f64),
}

//a single ohlc + volume bar for one futures contract; missing values are nan
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    //the settlement or last traded price used for continuous series
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    //creates a new bar, validating the values that are present
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Result<Self, BarError> {
        //nan comparisons are false so missing values skip the checks
        if high < low {
            return Err(BarError::InvalidHighLow { high, low });
        }

        if close < low || close > high {
            return Err(BarError::InvalidClose { close, high, low });
        }

        if volume < 0.0 {
            return Err(BarError::NegativeVolume(volume));
        }

        Ok(PriceBar {
            open,
            high,
            low,
            close,
            volume,
        })
    }

    //a bar carrying only a final price
    pub fn from_final(close: f64) -> Self {
        PriceBar {
            open: f64::NAN,
            high: f64::NAN,
            low: f64::NAN,
            close,
            volume: f64::NAN,
        }
    }

    pub fn final_price(&self) -> f64 {
        self.close
    }

    pub fn has_final_price(&self) -> bool {
        !self.close.is_nan()
    }

    //returns the range (high - low)
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub(crate) fn columns_mut(&mut self) -> [&mut f64; 5] {
        [
            &mut self.open,
            &mut self.high,
            &mut self.low,
            &mut self.close,
            &mut self.volume,
        ]
    }

    pub(crate) fn columns(&self) -> [f64; 5] {
        [self.open, self.high, self.low, self.close, self.volume]
    }
}

//equal when every column matches, treating nan as equal to nan
impl PartialEq for PriceBar {
    fn eq(&self, other: &Self) -> bool {
        self.columns()
            .iter()
            .zip(other.columns().iter())
            .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(PriceBar::new(10.0, 12.0, 9.0, 11.0, 100.0).is_ok());
        assert!(matches!(
            PriceBar::new(10.0, 8.0, 9.0, 11.0, 100.0),
            Err(BarError::InvalidHighLow { .. })
        ));
        assert!(matches!(
            PriceBar::new(10.0, 12.0, 9.0, 13.0, 100.0),
            Err(BarError::InvalidClose { .. })
        ));
        assert!(matches!(
            PriceBar::new(10.0, 12.0, 9.0, 11.0, -1.0),
            Err(BarError::NegativeVolume(_))
        ));
    }

    #[test]
    fn test_missing_values_pass_validation() {
        let bar = PriceBar::new(f64::NAN, f64::NAN, f64::NAN, 101.5, f64::NAN).unwrap();
        assert!(bar.has_final_price());
        assert_eq!(bar, PriceBar::from_final(101.5));
    }
}
