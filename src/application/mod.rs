// ============================================================
// Layer 2 — Application Layer
// ============================================================
// Use cases orchestrating the data, ml and infra layers.
// No clap types, no tensor math — just the pipelines.

pub mod train_use_case;
pub mod generate_use_case;
