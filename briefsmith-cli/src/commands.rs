//! CLI subcommand handlers.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::Commands;
use crate::ConfigAction;
use crate::script::Script;
use briefsmith_core::config::{BriefsmithConfig, config_exists, load_config};
use briefsmith_core::persistence::{JsonStyle, atomic_write, load_json, write_json};
use briefsmith_core::{
    Brief, BriefsmithError, PipelineOutput, ResearchStatus, RunSnapshot, SourceRegistry,
    resolve_citations,
};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            script,
            out,
            subject,
        } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received; stopping after the current iteration");
                    on_signal.cancel();
                }
            });
            let artifacts = run_script(&script, out, subject, workspace, cancel).await?;
            print_run_summary(&artifacts);
            Ok(())
        }
        Commands::Resolve {
            report,
            registry,
            output,
        } => handle_resolve(&report, &registry, output.as_deref()),
        Commands::Inspect { brief } => {
            println!("{}", inspect_brief(&brief)?);
            Ok(())
        }
        Commands::Runs => {
            let config = load_workspace_config(workspace)?;
            handle_runs(&output_dir(&config, workspace, None));
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load_workspace_config(workspace: &Path) -> anyhow::Result<BriefsmithConfig> {
    load_config(Some(workspace), None).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn output_dir(config: &BriefsmithConfig, workspace: &Path, out: Option<PathBuf>) -> PathBuf {
    let dir = out.unwrap_or_else(|| config.output.output_dir.clone());
    if dir.is_absolute() {
        dir
    } else {
        workspace.join(dir)
    }
}

/// Files written by a completed run.
#[derive(Debug)]
pub struct RunArtifacts {
    pub output: PipelineOutput,
    pub brief_path: PathBuf,
    pub registry_path: PathBuf,
    pub sources_path: PathBuf,
    pub report_path: Option<PathBuf>,
    pub snapshot_path: PathBuf,
}

pub async fn run_script(
    script_path: &Path,
    out: Option<PathBuf>,
    subject: Option<String>,
    workspace: &Path,
    cancel: CancellationToken,
) -> anyhow::Result<RunArtifacts> {
    let config = load_workspace_config(workspace)?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    config.ensure_runnable()?;

    let mut script = Script::load(script_path)?;
    if let Some(subject) = subject {
        script.subject = subject;
    }
    let subject = script.subject.clone();
    let out_dir = output_dir(&config, workspace, out);
    let style = JsonStyle::from_pretty(config.output.pretty_json);

    let pipeline = script.into_pipeline(&config);
    let output = match pipeline.run(&subject, cancel).await {
        Ok(output) => output,
        Err(BriefsmithError::Run(err)) => {
            let snapshot = RunSnapshot::from_error(&err);
            let path = snapshot.save(&out_dir, style)?;
            return Err(anyhow::anyhow!(
                "{}; partial brief saved to {}",
                err,
                path.display()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let brief_path = out_dir.join("brief.json");
    let registry_path = out_dir.join("registry.json");
    let sources_path = out_dir.join("sources.md");
    write_json(&brief_path, &output.brief, style)?;
    write_json(&registry_path, &output.registry, style)?;
    atomic_write(&sources_path, output.registry.bibliography_markdown().as_bytes())?;

    let report_path = match &output.report {
        Some(report) => {
            let path = out_dir.join("report.md");
            atomic_write(&path, report.text.as_bytes())?;
            Some(path)
        }
        None => None,
    };

    let snapshot_path = RunSnapshot::from_output(&output).save(&out_dir, style)?;

    Ok(RunArtifacts {
        output,
        brief_path,
        registry_path,
        sources_path,
        report_path,
        snapshot_path,
    })
}

fn print_run_summary(artifacts: &RunArtifacts) {
    let out = &artifacts.output;
    println!(
        "Run {} after {} of {} iteration(s)",
        out.outcome, out.iterations, out.budget
    );
    if out.is_partial() {
        println!("  Brief is PARTIAL: not every node reached a terminal status");
    }
    println!(
        "  {} node(s), {} fact(s), {} source(s), {} diagnostic(s)",
        out.brief.knowledge_nodes.len(),
        out.brief.fact_count(),
        out.registry.len(),
        out.diagnostics.len()
    );
    println!("  Brief:    {}", artifacts.brief_path.display());
    println!("  Registry: {}", artifacts.registry_path.display());
    println!("  Sources:  {}", artifacts.sources_path.display());
    if let Some(ref path) = artifacts.report_path {
        println!("  Report:   {}", path.display());
    }
    println!("  Snapshot: {}", artifacts.snapshot_path.display());
}

fn handle_resolve(report: &Path, registry: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(report)
        .with_context(|| format!("Failed to read report {}", report.display()))?;
    let registry: SourceRegistry = load_json(registry)?
        .with_context(|| format!("Registry not found: {}", registry.display()))?;

    let resolution = resolve_citations(&text, &registry);
    if !resolution.unresolved.is_empty() {
        eprintln!(
            "Removed {} citation(s) to unknown sources: {}",
            resolution.unresolved.len(),
            resolution.unresolved.join(", ")
        );
    }
    match output {
        Some(path) => {
            atomic_write(path, resolution.text.as_bytes())?;
            eprintln!(
                "Resolved {} citation(s) into {}",
                resolution.resolved.len(),
                path.display()
            );
        }
        None => println!("{}", resolution.text),
    }
    Ok(())
}

/// A plain-text summary of a saved brief.
pub fn inspect_brief(path: &Path) -> anyhow::Result<String> {
    let brief: Brief =
        load_json(path)?.with_context(|| format!("Brief not found: {}", path.display()))?;

    let mut out = format!(
        "{} ({})\n  generated {}\n  {}\n\n",
        brief.subject,
        brief.reference_id,
        brief.generation_date.format("%Y-%m-%d %H:%M UTC"),
        brief.narrative_summary
    );
    out.push_str(&format!(
        "  {:<8} {:<10} {:>7} {:>5}  {}\n",
        "ID", "STATUS", "SOURCES", "FACTS", "TITLE"
    ));
    for node in &brief.knowledge_nodes {
        out.push_str(&format!(
            "  {:<8} {:<10} {:>7} {:>5}  {}\n",
            node.node_id.as_str(),
            node.research_status.to_string(),
            node.top_sources.len(),
            node.fact_points.len(),
            node.node_title
        ));
    }

    let terminal = brief
        .knowledge_nodes
        .iter()
        .filter(|n| n.research_status.is_terminal())
        .count();
    out.push_str(&format!(
        "\n  {terminal}/{} node(s) terminal ({} saturated, {} stalled)\n",
        brief.knowledge_nodes.len(),
        brief.count_with_status(ResearchStatus::Saturated),
        brief.count_with_status(ResearchStatus::Stalled),
    ));
    if let Err(e) = brief.validate() {
        out.push_str(&format!("  WARNING: {e}\n"));
    }
    Ok(out)
}

fn handle_runs(base_dir: &Path) {
    let runs = RunSnapshot::list(base_dir);
    if runs.is_empty() {
        println!("No saved runs in {}", base_dir.display());
        return;
    }
    for run in runs {
        let outcome = run
            .outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "aborted".to_string());
        println!(
            "{}  {}  {:<16} {}/{} iterations, {}/{} saturated  {}",
            run.id,
            run.created_at.format("%Y-%m-%d %H:%M"),
            outcome,
            run.iterations,
            run.budget,
            run.saturated,
            run.nodes,
            run.subject
        );
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace.join(".briefsmith").join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&BriefsmithConfig::default())?;
            atomic_write(&config_path, toml_str.as_bytes())?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            if !config_exists(Some(workspace)) {
                eprintln!("No configuration file found; showing defaults.");
            }
            let config = load_workspace_config(workspace)?;
            println!("{}", toml::to_string_pretty(&config)?);
            for warning in config.validate() {
                eprintln!("warning: {warning}");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::tests::SAMPLE;
    use briefsmith_core::RunOutcome;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("script.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_script_writes_artifacts() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), SAMPLE);

        let artifacts = run_script(&script, None, None, dir.path(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(artifacts.output.outcome, RunOutcome::Converged);
        assert_eq!(artifacts.output.iterations, 2);
        assert!(artifacts.brief_path.starts_with(dir.path().join(".briefsmith")));
        assert!(artifacts.snapshot_path.exists());

        let brief: Brief = load_json(&artifacts.brief_path).unwrap().unwrap();
        assert_eq!(brief.subject, "Ford Motor Company");
        assert_eq!(
            brief.knowledge_nodes[0].fact_points[0].related_fact_ids,
            vec!["fp_1-2"]
        );

        let report = std::fs::read_to_string(artifacts.report_path.unwrap()).unwrap();
        assert_eq!(
            report,
            "Ford was incorporated in 1903 [Ford History](https://history.example/ford) \
             and later built the line [museum.example](https://museum.example/line)."
        );

        let sources = std::fs::read_to_string(&artifacts.sources_path).unwrap();
        assert!(sources.contains("[src-1] Ford History"));
    }

    #[tokio::test]
    async fn test_run_script_subject_override_and_out_dir() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), SAMPLE);

        let artifacts = run_script(
            &script,
            Some(PathBuf::from("custom")),
            Some("Model T".to_string()),
            dir.path(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(artifacts.output.brief.subject, "Model T");
        assert_eq!(artifacts.brief_path, dir.path().join("custom").join("brief.json"));
        assert_eq!(RunSnapshot::list(&dir.path().join("custom")).len(), 1);
    }

    #[tokio::test]
    async fn test_recorded_responses_fan_out_per_query() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            dir.path(),
            r#"{"subject": "Ford Motor Company",
                "plan": {"narrative_summary": "", "knowledge_nodes": [
                  {"node_title": "Origins", "rationale": "", "axis": "chronological",
                   "search_queries": ["ford founding", "ford investors"]}]},
                "responses": {
                  "ford founding": "Results:\n```json\n{\"node_title\": \"Origins\", \"top_sources\": [{\"url\": \"https://a.example\", \"title\": \"A\"}]}\n```",
                  "ford investors": "{\"node_title\": \"Origins\", \"top_sources\": [{\"url\": \"https://b.example\", \"title\": \"B\"}]} trailing notes"
                },
                "evaluations": [{"grade": "pass", "comment": "done"}]}"#,
        );

        let artifacts = run_script(&script, None, None, dir.path(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(artifacts.output.outcome, RunOutcome::Converged);
        let urls: Vec<_> = artifacts.output.brief.knowledge_nodes[0]
            .top_sources
            .iter()
            .map(|s| s.url.as_str())
            .collect();
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
        assert_eq!(artifacts.output.registry.len(), 2);
        assert!(artifacts.report_path.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_run_is_partial() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), SAMPLE);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let artifacts = run_script(&script, None, None, dir.path(), cancel)
            .await
            .unwrap();
        assert_eq!(artifacts.output.outcome, RunOutcome::Cancelled);
        assert!(artifacts.output.is_partial());
        assert_eq!(artifacts.output.iterations, 0);
    }

    #[tokio::test]
    async fn test_aborted_run_saves_partial_snapshot() {
        let dir = TempDir::new().unwrap();
        // One node, an update, and no evaluations: the scripted evaluator runs dry.
        let script = write_script(
            dir.path(),
            r#"{"subject": "S",
                "plan": {"narrative_summary": "", "knowledge_nodes": [
                  {"node_title": "Origins", "rationale": "", "axis": "contextual"}]},
                "updates": [{"node_title": "Origins",
                  "top_sources": [{"url": "https://a.example", "title": "A"}]}]}"#,
        );

        let err = run_script(&script, None, None, dir.path(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("partial brief saved"));

        let base = dir.path().join(".briefsmith");
        let runs = RunSnapshot::list(&base);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, None);
        // One node: the loop ran under a budget of 3, not the fallback.
        assert_eq!(runs[0].budget, 3);
        let snapshot = RunSnapshot::load(&base, &runs[0].id).unwrap();
        assert!(snapshot.error.is_some());
        assert_eq!(snapshot.brief.knowledge_nodes[0].top_sources.len(), 1);
    }

    #[tokio::test]
    async fn test_inspect_and_resolve() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), SAMPLE);
        let artifacts = run_script(&script, None, None, dir.path(), CancellationToken::new())
            .await
            .unwrap();

        let summary = inspect_brief(&artifacts.brief_path).unwrap();
        assert!(summary.contains("Ford Motor Company"));
        assert!(summary.contains("2/2 node(s) terminal (2 saturated, 0 stalled)"));
        assert!(!summary.contains("WARNING"));

        let report = dir.path().join("draft.md");
        std::fs::write(&report, "See <cite source=\"src-2\"/> and <cite source=\"src-9\"/>.").unwrap();
        let resolved = dir.path().join("final.md");
        handle_resolve(&report, &artifacts.registry_path, Some(&resolved)).unwrap();
        assert_eq!(
            std::fs::read_to_string(&resolved).unwrap(),
            "See [museum.example](https://museum.example/line) and."
        );
    }

    #[test]
    fn test_config_init_then_show() {
        let dir = TempDir::new().unwrap();
        handle_config(ConfigAction::Init, dir.path()).unwrap();
        assert!(dir.path().join(".briefsmith").join("config.toml").exists());
        handle_config(ConfigAction::Init, dir.path()).unwrap();
        assert!(handle_config(ConfigAction::Show, dir.path()).is_ok());
    }
}
