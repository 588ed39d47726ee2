pub mod evaluation;
pub mod trainer;

pub use evaluation::{
    evaluate, split_index, AccuracyReport, ConfusionCounts, MIN_EVALUATION_SAMPLES,
};
pub use trainer::{train, TrainingSummary};
