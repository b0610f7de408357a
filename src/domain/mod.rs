// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types describing the emotion-recognition problem.
// No Burn types, no file I/O — easy to unit test and shared
// by every other layer.

pub mod labels;
