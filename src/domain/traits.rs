// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Datasets are read through this trait so merging and caching
// never see the on-disk format. SquadLoader is the only
// implementation today.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::example::QaExample;

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Any component that can produce labelled QA examples.
pub trait ExampleSource {
    /// Load every example from this source, in a stable order.
    fn load_all(&self) -> Result<Vec<QaExample>>;
}
