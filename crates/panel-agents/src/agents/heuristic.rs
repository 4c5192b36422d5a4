//! Keyword reviewers: deterministic specialists that need no LLM.
//!
//! Each reviewer is a list of rules. A rule fires when every `all_of`
//! pattern matches and no `none_of` pattern does. Scores follow the
//! highest severity found.

use async_trait::async_trait;
use panel_coordination::{
    Finding, Reviewer, ReviewerError, ReviewerRegistry, ReviewerResult, Severity, SuggestedOp,
};
use regex::Regex;
use std::sync::Arc;

/// Score a keyword reviewer gives for a given worst finding.
pub fn score_for(severity_max: Option<Severity>) -> f64 {
    match severity_max {
        None => 8.5,
        Some(Severity::Nit) => 7.5,
        Some(Severity::Minor) => 6.0,
        Some(Severity::Major) => 4.0,
        Some(Severity::Blocker) => 2.0,
    }
}

pub struct KeywordRule {
    pub severity: Severity,
    pub issue: &'static str,
    all_of: Vec<Regex>,
    none_of: Vec<Regex>,
    op: Option<SuggestedOp>,
}

impl KeywordRule {
    /// Patterns are compiled case-insensitively.
    pub fn new(
        severity: Severity,
        issue: &'static str,
        all_of: &[&str],
        none_of: &[&str],
    ) -> Result<Self, regex::Error> {
        let compile = |p: &&str| Regex::new(&format!("(?i){}", p));
        Ok(Self {
            severity,
            issue,
            all_of: all_of.iter().map(compile).collect::<Result<_, _>>()?,
            none_of: none_of.iter().map(compile).collect::<Result<_, _>>()?,
            op: None,
        })
    }

    pub fn with_op(mut self, op: SuggestedOp) -> Self {
        self.op = Some(op);
        self
    }

    /// Quoted matches of every `all_of` pattern, or `None` if the rule
    /// does not fire.
    fn evidence(&self, prompt: &str) -> Option<String> {
        if self.none_of.iter().any(|re| re.is_match(prompt)) {
            return None;
        }
        let mut quotes = Vec::with_capacity(self.all_of.len());
        for re in &self.all_of {
            let m = re.find(prompt)?;
            quotes.push(format!("\"{}\"", m.as_str()));
        }
        Some(quotes.join(" and "))
    }
}

pub struct KeywordReviewer {
    role: String,
    instructions: String,
    rules: Vec<KeywordRule>,
}

impl KeywordReviewer {
    pub fn new(role: &str, instructions: &str, rules: Vec<KeywordRule>) -> Self {
        Self {
            role: role.to_string(),
            instructions: instructions.to_string(),
            rules,
        }
    }

    fn review(&self, prompt: &str) -> ReviewerResult {
        let findings: Vec<Finding> = self
            .rules
            .iter()
            .filter_map(|rule| rule.evidence(prompt).map(|ev| (rule, ev)))
            .enumerate()
            .map(|(i, (rule, evidence))| {
                let mut finding = Finding::new(
                    &format!("{}-{}", self.role, i + 1),
                    &self.role,
                    rule.severity,
                    rule.issue,
                )
                .with_evidence(&evidence)
                .with_confidence(0.7);
                if let Some(op) = &rule.op {
                    finding = finding.with_op(op.clone());
                }
                finding
            })
            .collect();

        let score = score_for(Severity::rollup(findings.iter().map(|f| f.severity)));
        let confidence = if findings.is_empty() { 0.6 } else { 0.7 };
        ReviewerResult::from_findings(&self.role, findings, confidence, score)
    }
}

#[async_trait]
impl Reviewer for KeywordReviewer {
    fn role(&self) -> &str {
        &self.role
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    async fn evaluate(&self, prompt: &str) -> Result<ReviewerResult, ReviewerError> {
        Ok(self.review(prompt))
    }
}

/// Matches SQL built from input.
const SQL_FROM_INPUT: &[&str] = &[r"\bsql\b", r"\binputs?\b"];

/// Any of these means input reaching SQL is handled.
const INPUT_HANDLED: &[&str] = &[r"sanitiz", r"parameteri[sz]", r"prepared statement", r"\bescap"];

const SECURITY_INSTRUCTIONS: &str = "Flag prompts that would lead to injectable queries, \
leaked secrets, or unrestricted command execution.";

const TESTING_INSTRUCTIONS: &str = "Flag prompts that ask for code changes without saying \
how the change should be tested.";

const CLARITY_INSTRUCTIONS: &str = "Flag prompts with vague wording or no stated success \
criterion.";

pub fn security_reviewer() -> Result<KeywordReviewer, regex::Error> {
    Ok(KeywordReviewer::new(
        "security",
        SECURITY_INSTRUCTIONS,
        vec![
            KeywordRule::new(
                Severity::Blocker,
                "SQL is built from input with no sanitization or parameterization",
                SQL_FROM_INPUT,
                INPUT_HANDLED,
            )?
            .with_op(SuggestedOp::add("input sanitization")),
            KeywordRule::new(
                Severity::Major,
                "Secrets are handled with no storage requirement",
                &[r"\b(passwords?|secrets?|api[ _-]?keys?|credentials?)\b"],
                &[r"\bhash", r"\bvault\b", r"\bencrypt", r"environment variable"],
            )?
            .with_op(SuggestedOp::add("secret storage requirement")),
            KeywordRule::new(
                Severity::Major,
                "Command execution with no restriction on what can run",
                &[r"\b(eval|exec|shell command|subprocess)\b"],
                &[r"allow-?list", r"whitelist", r"sanitiz"],
            )?,
        ],
    ))
}

pub fn testing_reviewer() -> Result<KeywordReviewer, regex::Error> {
    Ok(KeywordReviewer::new(
        "testing",
        TESTING_INSTRUCTIONS,
        vec![
            // Tests that never feed hostile input cannot cover this.
            KeywordRule::new(
                Severity::Major,
                "No injection case is required for input that reaches SQL",
                SQL_FROM_INPUT,
                INPUT_HANDLED,
            )?
            .with_op(SuggestedOp::add("injection test case")),
            KeywordRule::new(
                Severity::Major,
                "Data-handling code requested without any tests",
                &[r"\b(sql|query|queries|database|user input|parser?|payments?)\b"],
                &[r"\btests?\b", r"\btesting\b"],
            )?
            .with_op(SuggestedOp::add("test requirements")),
            KeywordRule::new(
                Severity::Minor,
                "Code change requested without saying how to verify it",
                &[r"\b(implement|build|add|write|create|refactor)\b"],
                &[r"\btests?\b", r"\btesting\b", r"\bverif"],
            )?,
        ],
    ))
}

pub fn clarity_reviewer() -> Result<KeywordReviewer, regex::Error> {
    Ok(KeywordReviewer::new(
        "clarity",
        CLARITY_INSTRUCTIONS,
        vec![
            KeywordRule::new(
                Severity::Minor,
                "Vague wording leaves the scope open to interpretation",
                &[r"\b(something|stuff|etc|somehow|whatever|some kind of)\b"],
                &[],
            )?
            .with_op(SuggestedOp::rewrite("vague wording")),
            KeywordRule::new(
                Severity::Minor,
                "Input reaches SQL with no statement of how values are bound",
                SQL_FROM_INPUT,
                INPUT_HANDLED,
            )?
            .with_op(SuggestedOp::add("value binding")),
            KeywordRule::new(
                Severity::Minor,
                "No success criterion is stated",
                &[r"\S"],
                &[r"\b(should|must|ensure|expect|returns?|so that)\b"],
            )?
            .with_op(SuggestedOp::add("success criterion")),
        ],
    ))
}

/// Security, testing and clarity keyword reviewers.
pub fn default_panel() -> Result<ReviewerRegistry, regex::Error> {
    let mut registry = ReviewerRegistry::new();
    registry.register(Arc::new(security_reviewer()?));
    registry.register(Arc::new(testing_reviewer()?));
    registry.register(Arc::new(clarity_reviewer()?));
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_without_sanitize_is_blocker() {
        let r = security_reviewer().unwrap();
        let result = r.review("Build a SQL query from the user's input");
        assert_eq!(result.severity_max, Severity::Blocker);
        assert_eq!(result.score, 2.0);
        assert!(result.findings[0].evidence.contains("\"SQL\""));
        assert!(result.findings[0].evidence.contains("\"input\""));
    }

    #[test]
    fn test_sanitize_suppresses_blocker() {
        let r = security_reviewer().unwrap();
        let result = r.review("Build a SQL query from input; sanitize every field");
        assert!(result.no_issues);
        assert_eq!(result.score, 8.5);
    }

    #[test]
    fn test_sql_alone_is_not_blocker() {
        let r = security_reviewer().unwrap();
        assert!(r.review("Explain SQL joins").no_issues);
    }

    #[test]
    fn test_testing_rules() {
        let r = testing_reviewer().unwrap();
        let data = r.review("Write a parser for the config file");
        assert_eq!(data.severity_max, Severity::Major);
        assert_eq!(data.findings.len(), 2);

        let covered = r.review("Write a parser for the config file with unit tests");
        assert!(covered.no_issues);
    }

    #[test]
    fn test_clarity_rules() {
        let r = clarity_reviewer().unwrap();
        let vague = r.review("Do something with the stuff in utils, it should be faster");
        assert_eq!(vague.findings.len(), 1);
        assert_eq!(vague.severity_max, Severity::Minor);

        let clear = r.review("Rename `fmt_row` to `format_row` and ensure call sites compile");
        assert!(clear.no_issues);
    }

    #[test]
    fn test_whole_panel_reacts_to_sql_from_input() {
        let prompt = "Build a SQL query from user input; it must return rows, with unit tests.";
        let testing = testing_reviewer().unwrap().review(prompt);
        assert_eq!(testing.severity_max, Severity::Major);
        assert_eq!(testing.findings.len(), 1);
        assert_eq!(testing.findings[0].suggested_ops[0].target, "injection test case");

        let clarity = clarity_reviewer().unwrap().review(prompt);
        assert_eq!(clarity.severity_max, Severity::Minor);
        assert_eq!(clarity.score, 6.0);

        let handled =
            "Build a parameterized SQL query from user input; it must return rows, with tests.";
        assert!(testing_reviewer().unwrap().review(handled).no_issues);
        assert!(clarity_reviewer().unwrap().review(handled).no_issues);
    }

    #[test]
    fn test_finding_ids_are_sequential() {
        let r = testing_reviewer().unwrap();
        let result = r.review("Add a database migration");
        let ids: Vec<&str> = result.findings.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["testing-1", "testing-2"]);
    }

    #[test]
    fn test_results_pass_validation() {
        let panel = [
            security_reviewer().unwrap(),
            testing_reviewer().unwrap(),
            clarity_reviewer().unwrap(),
        ];
        for prompt in ["", "Build a SQL query from input", "Store the password"] {
            for r in &panel {
                assert!(r.review(prompt).validate().is_ok());
            }
        }
    }

    #[test]
    fn test_default_panel_roles() {
        let panel = default_panel().unwrap();
        assert_eq!(panel.roles(), vec!["clarity", "security", "testing"]);
    }
}
