pub mod adjusted;
pub mod multiple;

pub use adjusted::{AdjustedPrices, AdjustedUpdate};
pub use multiple::{MultiplePriceRow, MultiplePrices, RollPoint};
