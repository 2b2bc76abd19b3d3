pub mod summary;

pub use summary::{print_batch_table, RollSummary};
