pub mod loader;
pub mod dataset;
pub mod batcher;
