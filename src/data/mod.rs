// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between SQuAD JSON files and tensor batches,
// plus the way back from logits to answer strings.
//
//   SQuAD JSON files
//       │
//       ▼
//   SquadLoader       → QaExamples, answers collapsed per id
//       │
//       ▼
//   FeatureBuilder    → overlapping token windows, span labels
//       │  (FeatureCache stores them next to the data)
//       ▼
//   QaDataset         → implements Burn's Dataset trait
//       │
//       ▼
//   QaBatcher         → stacks features into tensor batches
//       │
//       ▼
//   model logits ──► postprocess → answer text per example
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads SQuAD-format datasets
pub mod loader;

/// Tokenises examples into labelled windows
pub mod preprocessor;

/// On-disk cache of encoded features
pub mod cache;

/// Implements Burn's Dataset trait for features
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Logits → answer strings
pub mod postprocess;
