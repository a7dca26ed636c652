//! Batch evaluation of scenario classification trees over timely
//! dataflow workers: contexts are instantiated in parallel, and the
//! resulting categories are aggregated with differential dataflow.
mod category;
mod config;
mod error;
mod evaluate;
mod sink;

pub use category::Category;
pub use config::EvaluatorConfig;
pub use error::EvaluationError;
pub use evaluate::evaluate_segments;
pub use evaluate::evaluation_views;
pub use evaluate::EvaluationReport;
pub use evaluate::SegmentResult;
pub use evaluate::ViewReport;
pub use evaluate::ViewResult;
pub use sink::DistinctSink;
pub use sink::DistinctWriter;
pub use sink::OccurrenceSink;
pub use sink::OccurrenceWriter;
pub use sink::Sink;
pub use sink::SinkWriter;
