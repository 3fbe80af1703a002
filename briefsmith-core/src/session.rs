//! Run snapshots: the brief and registry of a finished (or aborted) run,
//! saved under `<output_dir>/runs/<id>.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::brief::{Brief, ResearchStatus};
use crate::error::RunError;
use crate::persistence::{JsonStyle, load_json, write_json};
use crate::pipeline::PipelineOutput;
use crate::refinement::{Diagnostic, RunOutcome};
use crate::registry::SourceRegistry;

/// A persisted record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub id: Uuid,
    pub subject: String,
    /// `None` when the run was aborted by a collaborator failure.
    pub outcome: Option<RunOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub iterations: usize,
    pub budget: usize,
    pub brief: Brief,
    pub registry: SourceRegistry,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    pub created_at: DateTime<Utc>,
}

/// Lightweight listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub subject: String,
    pub outcome: Option<RunOutcome>,
    pub iterations: usize,
    pub budget: usize,
    pub nodes: usize,
    pub saturated: usize,
    pub created_at: DateTime<Utc>,
}

fn runs_dir(base_dir: &Path) -> PathBuf {
    base_dir.join("runs")
}

impl RunSnapshot {
    pub fn from_output(output: &PipelineOutput) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: output.brief.subject.clone(),
            outcome: Some(output.outcome),
            error: None,
            iterations: output.iterations,
            budget: output.budget,
            brief: output.brief.clone(),
            registry: output.registry.clone(),
            diagnostics: output.diagnostics.clone(),
            created_at: Utc::now(),
        }
    }

    /// Snapshot of an aborted run, keeping the partial brief for inspection.
    pub fn from_error(error: &RunError) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: error.brief.subject.clone(),
            outcome: None,
            error: Some(error.to_string()),
            iterations: error.iterations,
            budget: error.budget,
            brief: (*error.brief).clone(),
            registry: (*error.registry).clone(),
            diagnostics: error.diagnostics.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn path(&self, base_dir: &Path) -> PathBuf {
        runs_dir(base_dir).join(format!("{}.json", self.id))
    }

    /// Save to `<base_dir>/runs/<id>.json`, returning the path written.
    pub fn save(&self, base_dir: &Path, style: JsonStyle) -> io::Result<PathBuf> {
        let path = self.path(base_dir);
        write_json(&path, self, style)?;
        Ok(path)
    }

    pub fn load(base_dir: &Path, id: &Uuid) -> io::Result<Self> {
        let path = runs_dir(base_dir).join(format!("{id}.json"));
        load_json(&path)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no run snapshot {id}"))
        })
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            id: self.id,
            subject: self.subject.clone(),
            outcome: self.outcome,
            iterations: self.iterations,
            budget: self.budget,
            nodes: self.brief.knowledge_nodes.len(),
            saturated: self.brief.count_with_status(ResearchStatus::Saturated),
            created_at: self.created_at,
        }
    }

    /// All readable snapshots under `base_dir`, newest first. Unreadable files are skipped.
    pub fn list(base_dir: &Path) -> Vec<RunSummary> {
        let Ok(entries) = std::fs::read_dir(runs_dir(base_dir)) else {
            return Vec::new();
        };

        let mut summaries: Vec<RunSummary> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .filter_map(|p| match load_json::<RunSnapshot>(&p) {
                Ok(snapshot) => snapshot.map(|s| s.summary()),
                Err(e) => {
                    tracing::debug!(path = %p.display(), error = %e, "Skipping unreadable snapshot");
                    None
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }
}
