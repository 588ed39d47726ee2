pub mod model;
pub mod store;

pub use model::{Posture, Sample, SampleCounts};
pub use store::{ExportFile, SampleStore};
