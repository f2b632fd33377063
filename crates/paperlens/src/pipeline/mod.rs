//! The two-stage extract -> analyze pipeline run for each document job.

pub mod analyze;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod runner;

pub use analyze::{AnalysisRequest, Analyzer, CommandAnalyzer};
pub use command::{CapabilityCommand, CommandOutput};
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{PipelineError, StageError};
pub use extract::{CommandExtractor, ExtractedText, ExtractionRequest, Extractor};
pub use runner::{JobOutcome, Pipeline};
