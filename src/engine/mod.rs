pub mod batch;
pub mod pipeline;

pub use batch::build_instruments;
pub use pipeline::{InstrumentBuild, InstrumentPipeline};
