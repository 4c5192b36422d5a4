use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use panel_coordination::{
    insights_from_store, AuditStore, DebateRunner, Disposition, GenerationService, JsonlAuditLog,
    LocalFs, Outcome, PipelineError, ProposalGenerator, ProposalOutcome, ProposalStore,
    ReviewConfig, ReviewPipeline, ReviewerDefinitions, ReviewerRegistry, RoundOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use panel_agents::agents::{default_panel, load_llm_panel, LlmJudge};
use panel_agents::config::{check_endpoint, PanelConfig};
use panel_agents::llm::ChatCompletionsClient;
use panel_agents::prompts::PROMPT_VERSION;

#[derive(Parser)]
#[command(name = "panel-agents", about = "Prompt review panel")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Review a prompt and print the gate decision.
    Review {
        /// Prompt text. Reads --file when omitted.
        prompt: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Use LLM reviewers from the definitions directory instead of the
        /// keyword panel.
        #[arg(long)]
        llm: bool,
        /// Skip debates even when reviewers disagree.
        #[arg(long)]
        no_debate: bool,
        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show per-role policy insights from the audit log.
    Insights {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Draft prompt proposals for roles whose arguments scored poorly.
    Propose {
        /// Only this role, regardless of its score.
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        days: Option<u32>,
    },
    /// Record a human decision for an audited prompt.
    Decide {
        prompt_hash: String,
        #[arg(long)]
        outcome: Outcome,
        /// Accepted finding id (repeatable).
        #[arg(long = "accept")]
        accepted: Vec<String>,
        /// Rejected finding id (repeatable).
        #[arg(long = "reject")]
        rejected: Vec<String>,
        #[arg(long, default_value = "")]
        details: String,
    },
    /// Check that the inference endpoint is reachable.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = PanelConfig::default();
    let review_config = config.review_config()?;
    info!(
        endpoint = %config.endpoint.url,
        audit = %config.audit_path.display(),
        prompt_version = PROMPT_VERSION,
        "Review panel starting"
    );

    match cli.command {
        Command::Review {
            prompt,
            file,
            llm,
            no_debate,
            json,
        } => {
            let prompt = read_prompt(prompt, file)?;
            review(&config, &review_config, &prompt, llm, no_debate, json).await
        }
        Command::Insights { days } => {
            show_insights(&config, days.unwrap_or(review_config.insights.window_days))
        }
        Command::Propose { role, days } => {
            propose(
                &config,
                &review_config,
                role,
                days.unwrap_or(review_config.insights.window_days),
            )
            .await
        }
        Command::Decide {
            prompt_hash,
            outcome,
            accepted,
            rejected,
            details,
        } => {
            let audit = JsonlAuditLog::new(&config.audit_path);
            let disposition = Disposition::new(&prompt_hash, outcome)
                .with_accepted(accepted)
                .with_rejected(rejected, &details);
            audit
                .record_disposition(&disposition)
                .with_context(|| format!("Failed to record decision for {}", prompt_hash))?;
            println!("{} → {}", prompt_hash, outcome);
            Ok(())
        }
        Command::Check => {
            if check_endpoint(&config.endpoint.url).await {
                println!("{} reachable", config.endpoint.url);
                Ok(())
            } else {
                bail!("{} is not reachable", config.endpoint.url)
            }
        }
    }
}

fn read_prompt(prompt: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (prompt, file) {
        (Some(p), _) => Ok(p),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt from {}", path.display())),
        (None, None) => bail!("pass a prompt or --file"),
    }
}

fn generation_client(config: &PanelConfig) -> Arc<dyn GenerationService> {
    Arc::new(ChatCompletionsClient::new(&config.endpoint))
}

async fn review(
    config: &PanelConfig,
    review_config: &ReviewConfig,
    prompt: &str,
    llm: bool,
    no_debate: bool,
    json: bool,
) -> Result<()> {
    let generation = generation_client(config);
    let timeout = Duration::from_secs(config.reviewer_timeout_secs);

    let registry: ReviewerRegistry = if llm {
        let definitions = ReviewerDefinitions::new(&config.reviewers_dir);
        load_llm_panel(&definitions, generation.clone(), timeout)
            .context("Failed to load LLM reviewers")?
    } else {
        default_panel().context("Failed to build keyword reviewers")?
    };

    let audit: Arc<dyn AuditStore> = Arc::new(JsonlAuditLog::new(&config.audit_path));
    let mut pipeline = ReviewPipeline::new(registry, audit).with_config(review_config);

    if !no_debate && review_config.debate.enabled {
        if check_endpoint(&config.endpoint.url).await {
            let judge = Arc::new(LlmJudge::new(
                generation.clone(),
                review_config.debate.call_timeout(),
            ));
            pipeline = pipeline.with_debate(DebateRunner::new(
                generation,
                judge,
                review_config.debate.clone(),
            ));
        } else {
            warn!(endpoint = %config.endpoint.url, "Endpoint unreachable; debates disabled");
        }
    }

    match pipeline.review(prompt).await {
        Ok(outcome) => print_outcome(&outcome, json),
        Err(PipelineError::AuditWrite { outcome, source }) => {
            print_outcome(&outcome, json)?;
            Err(source).context("Review completed but the audit entry was not written")
        }
        Err(e) => Err(e).context("Review failed"),
    }
}

fn print_outcome(outcome: &RoundOutcome, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "round": outcome.report.round,
            "findings": outcome.report.findings,
            "disagreements": outcome.disagreements,
            "debate": outcome.debate,
            "entry_id": outcome.entry_id,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", outcome.report.round.summary_line());
    for finding in &outcome.report.findings {
        println!("  {}", finding);
        if !finding.evidence.is_empty() {
            println!("      evidence: {}", finding.evidence);
        }
    }
    if let Some(log) = &outcome.debate {
        println!("debate: {}", log.summary_line());
        for pair in &log.pairs {
            println!(
                "  {} vs {} → {}",
                pair.role_a,
                pair.role_b,
                pair.winner.as_deref().unwrap_or("skipped")
            );
        }
    }
    Ok(())
}

fn show_insights(config: &PanelConfig, days: u32) -> Result<()> {
    let audit = JsonlAuditLog::new(&config.audit_path);
    let insights = insights_from_store(&audit, days, Utc::now())
        .with_context(|| format!("Failed to read audit log {}", config.audit_path.display()))?;
    if insights.is_empty() {
        println!("No judged debates in the last {} days.", days);
    }
    for insight in insights.values() {
        println!("{}", insight.summary_line());
        if let Some(signal) = &insight.policy_signal {
            println!("    signal: {}", signal);
        }
    }
    Ok(())
}

async fn propose(
    config: &PanelConfig,
    review_config: &ReviewConfig,
    role: Option<String>,
    days: u32,
) -> Result<()> {
    let audit = JsonlAuditLog::new(&config.audit_path);
    let mut insights = insights_from_store(&audit, days, Utc::now())
        .with_context(|| format!("Failed to read audit log {}", config.audit_path.display()))?;

    let definitions = ReviewerDefinitions::new(&config.reviewers_dir);
    let store = ProposalStore::new(&config.proposals_dir, &definitions, LocalFs)
        .context("Invalid proposal directory")?;
    let generator = ProposalGenerator::new(
        generation_client(config),
        definitions,
        store,
        review_config.proposal.clone(),
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let outcomes = match role {
        Some(role) => {
            let Some(insight) = insights.remove(&role) else {
                bail!("no judged debates for '{}' in the last {} days", role, days);
            };
            vec![generator.propose_with_cancel(&insight, &cancel).await]
        }
        None => generator.propose_all(&insights, &cancel).await,
    };

    if outcomes.is_empty() {
        println!("No role needs an update.");
    }
    for outcome in &outcomes {
        match outcome {
            ProposalOutcome::Written { path, proposal } => {
                println!("{}: {} ({})", proposal.role, path.display(), proposal.diff_summary)
            }
            ProposalOutcome::Unsaved { proposal, reason } => {
                println!("{}: drafted but not saved: {}", proposal.role, reason)
            }
            ProposalOutcome::Abandoned { role, reason } => {
                println!("{}: abandoned: {}", role, reason)
            }
        }
    }
    Ok(())
}
