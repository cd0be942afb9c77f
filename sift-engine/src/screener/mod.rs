//! Snapshot screening: criteria configuration and the filter pipeline.

mod criteria;
mod pipeline;

pub use criteria::{FilterCriteria, Range};
pub use pipeline::{FilterPipeline, FilterStage, FilterStageResult};
