//! System prompt constants for the LLM-backed reviewers and judge.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever any constant here
//! changes, so audit records can be traced back to the wording that
//! produced them.

/// Prompt version. Bump on any content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Appended to every LLM reviewer's own instructions.
///
/// The reviewer's role text comes from its definition file; this contract
/// only pins down the output shape.
pub const REVIEWER_OUTPUT_CONTRACT: &str = "\
## Output format
Respond with a single JSON object and nothing else:

{
  \"findings\": [
    {
      \"severity\": \"nit\" | \"minor\" | \"major\" | \"blocker\",
      \"issue\": \"one sentence describing the problem\",
      \"evidence\": \"quote from the prompt that shows it\",
      \"confidence\": 0.0-1.0,
      \"suggested_ops\": [{\"kind\": \"add\" | \"remove\" | \"rewrite\", \"target\": \"what to change\"}]
    }
  ],
  \"confidence\": 0.0-1.0,
  \"score\": 2.0-10.0
}

Use an empty findings array when the prompt has no issues in your area. \
`blocker` means the prompt must not be sent as written. \
`score` rates the prompt's quality from your perspective: 10 is flawless, 2 is unusable.";

/// Judge preamble.
///
/// The judge sees both reviewers' findings and their defenses, and rates
/// argument quality only. It does not re-review the prompt.
pub const JUDGE_PREAMBLE: &str = "\
You are an impartial judge of a debate between two specialist prompt reviewers \
who reached different conclusions about the same prompt. \
Rate the QUALITY OF EACH ARGUMENT, not which conclusion you prefer.

Score each side from 0 to 10:
- 9-10: every claim is backed by a quote from the prompt; severity is proportionate.
- 6-8: mostly grounded, minor overreach.
- 3-5: speculative, vague, or severity out of proportion to the evidence.
- 0-2: ignores the prompt or contradicts itself.

Attach short kebab-case labels (e.g. \"evidence-backed\", \"speculative\", \
\"overstated-severity\", \"vague\"). For each side write one policy_signal: \
a single imperative sentence saying how that reviewer's instructions should change, \
or an empty string if they should not.

Respond with a single JSON object and nothing else:

{
  \"winner\": \"<role of the stronger argument>\",
  \"feedback\": [
    {\"role\": \"<role>\", \"argument_quality_score\": 0-10, \"argument_labels\": [\"...\"], \"policy_signal\": \"...\"},
    {\"role\": \"<role>\", \"argument_quality_score\": 0-10, \"argument_labels\": [\"...\"], \"policy_signal\": \"...\"}
  ]
}";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_version_is_semver() {
        let parts: Vec<&str> = PROMPT_VERSION.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.parse::<u32>().is_ok()));
    }

    #[test]
    fn test_contracts_name_every_field() {
        for field in ["severity", "issue", "evidence", "suggested_ops", "score"] {
            assert!(REVIEWER_OUTPUT_CONTRACT.contains(field), "missing {field}");
        }
        for field in ["winner", "argument_quality_score", "argument_labels", "policy_signal"] {
            assert!(JUDGE_PREAMBLE.contains(field), "missing {field}");
        }
    }
}
