//! Iterative refinement engine.
//!
//! 1. **Budget**: size the iteration ceiling from the skeleton brief
//! 2. **Select**: pick the ACTIVE node, else the first PENDING one
//! 3. **Research**: ask the provider for new sources and facts
//! 4. **Merge**: fold the update into the brief without duplicates
//! 5. **Evaluate / escalate**: grade the node and advance its status
//!
//! Steps 2-5 repeat until every node is terminal, the budget runs out, or the
//! run is cancelled.

pub mod budget;
pub mod callback;
pub mod diagnostic;
pub mod engine;
pub mod escalation;
pub mod merge;
pub mod selector;

pub use budget::{BudgetPolicy, FALLBACK_MAX_ITERATIONS, ITERATIONS_PER_NODE, compute_budget};
pub use callback::{NoOpRefinementCallback, RecordingRefinementCallback, RefinementCallback};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use engine::{RefinementLoop, RefinementRun, RunOutcome};
pub use escalation::{Escalation, StatusChange, escalate, is_complete};
pub use merge::{MergeReport, merge_update, normalize_description};
pub use selector::{ResearchMode, Target, select_target};
