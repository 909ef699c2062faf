// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and functions describing the QA
// problem: examples, dataset domains and SQuAD scoring.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain data and pure functions
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Questions, contexts, answers and dataset domains
pub mod example;

// F1 / EM and discriminator accuracy
pub mod scoring;

// Core abstractions (traits) that other layers implement
pub mod traits;
