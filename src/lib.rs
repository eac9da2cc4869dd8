pub mod config;
pub mod error;
pub mod geometry;
pub mod tracking;

#[cfg(test)]
pub(crate) mod testing;

pub use config::VoConfig;
pub use error::{PipelineStage, TrackingError};
pub use tracking::{TrackingState, VoPipeline};
