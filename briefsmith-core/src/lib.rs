//! # Briefsmith Core
//!
//! Core library for Briefsmith, an iterative research engine that fills out a
//! structured brief node by node until every node is saturated.
//! Provides the brief model, source registry, merge engine, refinement loop,
//! citation resolver, collaborator traits, configuration and run snapshots.

pub mod brief;
pub mod citation;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod finalize;
pub mod persistence;
pub mod pipeline;
pub mod refinement;
pub mod registry;
pub mod session;

// Re-export commonly used types at the crate root.
pub use brief::{
    Axis, Brief, Evaluation, Fact, FactCategory, GroundingSupport, Grade, KnowledgeNode, NodeId,
    NodeSeed, NodeUpdate, Plan, ResearchStatus, Source,
};
pub use citation::{Resolution, resolve_citations};
pub use collaborators::{
    Evaluator, PlanGenerator, ReportComposer, ResearchProvider, ResearchRequest,
};
pub use config::{BriefsmithConfig, load_config};
pub use error::{BriefsmithError, CollaboratorError, Result, RunError};
pub use finalize::link_related_facts;
pub use pipeline::{Pipeline, PipelineOutput};
pub use refinement::{
    BudgetPolicy, RefinementCallback, RefinementLoop, RefinementRun, ResearchMode, RunOutcome,
    compute_budget,
};
pub use registry::SourceRegistry;
pub use session::{RunSnapshot, RunSummary};
