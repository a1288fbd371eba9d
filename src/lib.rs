pub mod batch;
pub mod config;
pub mod detection;
pub mod error;
pub mod export;
pub mod imaging;
pub mod models;
pub mod pipeline;

pub use batch::{BatchDriver, BatchOptions, BatchSummary, CancelToken, PageOutcome};
pub use config::{CropSource, SegmentationMode, SegmenterConfig};
pub use detection::{PageResult, PageSegmenter};
pub use error::{Result, SegmentError};
pub use export::{ExportOptions, PageExporter, VisualizationConfig};
pub use models::{
    AnnotationRecord, BoundingBox, LineSegment, StaffRegion, StaffSystem, SymbolCandidate,
};
pub use pipeline::{
    DebugConfig, MetadataValue, Pipeline, PipelineContext, PipelineData, PipelineStep,
};

/// Install a `tracing` subscriber honouring `RUST_LOG`, with `default_level`
/// used when the variable is unset.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
