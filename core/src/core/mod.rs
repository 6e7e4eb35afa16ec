pub mod cookie_analyzer;
pub mod engine;
pub mod result_aggregator;
