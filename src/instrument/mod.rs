pub mod contract_date;
pub mod navigator;
pub mod roll_cycle;
pub mod roll_parameters;

pub use contract_date::{ContractDate, ExpiryDate};
pub use navigator::{ContractNavigator, CycleKind};
pub use roll_cycle::{Direction, RollCycle};
pub use roll_parameters::{CarryOffset, RollParameters};
