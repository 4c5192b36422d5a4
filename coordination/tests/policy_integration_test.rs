//! Policy loop integration: audit log → insights → proposals.
//!
//! Uses a JSONL audit file in a temp dir and hand-built judge feedback so
//! the averages are exact.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use panel_coordination::{
    compute_insights, insights_from_store, Aggregator, AuditLogEntry, AuditStore, DebateLog,
    Generation, GenerationError, GenerationService, JsonlAuditLog, JudgeFeedback, LocalFs,
    PolicyInsights, ProposalConfig, ProposalGenerator, ProposalOutcome, ProposalStore,
    ReviewerDefinitions, ReviewerResult,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn feedback(role: &str, score: f64, signal: &str) -> JudgeFeedback {
    JudgeFeedback {
        role: role.into(),
        argument_quality_score: score,
        argument_labels: vec![],
        policy_signal: signal.into(),
    }
}

fn entry(hash: &str, at: DateTime<Utc>, judge_feedback: Vec<JudgeFeedback>) -> AuditLogEntry {
    let mut round = Aggregator::default()
        .aggregate(
            hash,
            vec![
                ReviewerResult::from_findings("security", vec![], 0.9, 8.0),
                ReviewerResult::from_findings("testing", vec![], 0.9, 8.0),
            ],
        )
        .unwrap()
        .round;
    round.timestamp = at;
    AuditLogEntry::from_round(
        round,
        Some(DebateLog {
            judge_feedback,
            ..Default::default()
        }),
    )
}

fn seeded_log(dir: &TempDir, as_of: DateTime<Utc>) -> JsonlAuditLog {
    let log = JsonlAuditLog::new(dir.path().join("audit.jsonl"));
    log.append(&entry(
        "p1",
        as_of - Duration::days(2),
        vec![
            feedback("security", 8.0, "keep citing evidence"),
            feedback("testing", 6.0, "older signal"),
        ],
    ))
    .unwrap();
    log.append(&entry(
        "p2",
        as_of - Duration::days(1),
        vec![
            feedback("security", 7.0, ""),
            feedback("testing", 5.0, "name concrete test cases"),
        ],
    ))
    .unwrap();
    // Outside a 7-day window.
    log.append(&entry(
        "p0",
        as_of - Duration::days(20),
        vec![feedback("testing", 0.0, "ancient")],
    ))
    .unwrap();
    log
}

// ── Insights ───────────────────────────────────────────────────────

#[test]
fn test_policy_loop_thresholds() {
    let dir = TempDir::new().unwrap();
    let as_of = Utc::now();
    let log = seeded_log(&dir, as_of);

    let insights = insights_from_store(&log, 7, as_of).unwrap();
    assert_eq!(insights.len(), 2);

    let security = &insights["security"];
    assert_eq!(security.avg_argument_quality, 7.5);
    assert!(!security.needs_update);
    assert_eq!(security.debate_count, 2);

    let testing = &insights["testing"];
    assert_eq!(testing.avg_argument_quality, 5.5);
    assert!(testing.needs_update);
    // Window is newest-first, so the most recent signal wins.
    assert_eq!(
        testing.policy_signal.as_deref(),
        Some("name concrete test cases")
    );
    assert_eq!(
        security.policy_signal.as_deref(),
        Some("keep citing evidence")
    );
}

#[test]
fn test_average_order_independent_signal_order_dependent() {
    let now = Utc::now();
    let forward = vec![
        entry("a", now, vec![feedback("r", 3.0, "first")]),
        entry("b", now, vec![feedback("r", 9.0, "second")]),
        entry("c", now, vec![feedback("r", 4.5, "third")]),
    ];
    let mut reversed = forward.clone();
    reversed.reverse();

    let f = compute_insights(7, &forward, now);
    let r = compute_insights(7, &reversed, now);
    assert_eq!(f["r"].avg_argument_quality, r["r"].avg_argument_quality);
    assert_eq!(f["r"].debate_count, r["r"].debate_count);
    assert_eq!(f["r"].policy_signal.as_deref(), Some("first"));
    assert_eq!(r["r"].policy_signal.as_deref(), Some("third"));
}

#[test]
fn test_window_boundary() {
    let dir = TempDir::new().unwrap();
    let as_of = Utc::now();
    let log = seeded_log(&dir, as_of);

    let wide = insights_from_store(&log, 30, as_of).unwrap();
    assert_eq!(wide["testing"].debate_count, 3);
    assert!((wide["testing"].avg_argument_quality - 3.67).abs() < 1e-9);

    // Looking back from before the entries existed sees nothing.
    let early = insights_from_store(&log, 7, as_of - Duration::days(30)).unwrap();
    assert!(early.is_empty());
}

// ── Proposals from insights ────────────────────────────────────────

#[derive(Default)]
struct Drafting {
    roles: Mutex<Vec<String>>,
}

#[async_trait]
impl GenerationService for Drafting {
    async fn generate(&self, _system: &str, user: &str) -> Result<Generation, GenerationError> {
        let role = user
            .split("## Reviewer role\n\n")
            .nth(1)
            .and_then(|r| r.lines().next())
            .unwrap_or("")
            .to_string();
        self.roles.lock().unwrap().push(role.clone());
        Ok(Generation::text(format!(
            "You review prompts for {}.\nAlways name concrete test cases.",
            role
        )))
    }
}

#[tokio::test]
async fn test_proposals_only_for_roles_needing_update() {
    let dir = TempDir::new().unwrap();
    let as_of = Utc::now();
    let log = seeded_log(&dir, as_of);
    let insights: BTreeMap<String, PolicyInsights> = insights_from_store(&log, 7, as_of).unwrap();

    let defs_root = dir.path().join("reviewers");
    std::fs::create_dir_all(&defs_root).unwrap();
    std::fs::write(defs_root.join("security.md"), "You review prompts for security.").unwrap();
    std::fs::write(
        defs_root.join("testing.md"),
        "---\nname: Testing\n---\nYou review prompts for testing.",
    )
    .unwrap();
    let before_security = std::fs::read_to_string(defs_root.join("security.md")).unwrap();
    let before_testing = std::fs::read_to_string(defs_root.join("testing.md")).unwrap();

    let definitions = ReviewerDefinitions::new(&defs_root);
    let store = ProposalStore::new(dir.path().join("proposals"), &definitions, LocalFs).unwrap();
    let generation = Arc::new(Drafting::default());
    let generator = ProposalGenerator::new(
        generation.clone(),
        definitions,
        store,
        ProposalConfig::default(),
    );

    let outcomes = generator
        .propose_all(&insights, &CancellationToken::new())
        .await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].role(), "testing");
    assert_eq!(*generation.roles.lock().unwrap(), vec!["testing".to_string()]);

    let ProposalOutcome::Written { path, proposal } = &outcomes[0] else {
        panic!("expected a written proposal, got {:?}", outcomes[0]);
    };
    assert_eq!(proposal.current_prompt, "You review prompts for testing.");
    assert_eq!(proposal.diff_summary, "+1 / -0 lines");
    let md = std::fs::read_to_string(path).unwrap();
    assert!(md.contains("Policy signal: name concrete test cases"));

    // Live definitions untouched.
    assert_eq!(
        std::fs::read_to_string(defs_root.join("security.md")).unwrap(),
        before_security
    );
    assert_eq!(
        std::fs::read_to_string(defs_root.join("testing.md")).unwrap(),
        before_testing
    );
}
