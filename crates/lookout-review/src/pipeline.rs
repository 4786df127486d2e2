use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use lookout_core::{
    LookoutError, PostFailure, PostReport, PrRef, PullRequestDiff, ReviewConfig, ReviewSection,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::github::HostingApi;
use crate::llm::ModelBackend;
use crate::prompt::{build_review_prompt, ReviewPrompt};
use crate::sections::{comment_body, parse_sections};

/// What one review run produced.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use lookout_core::PrRef;
/// use lookout_review::pipeline::{PromptStats, ReviewOutcome};
///
/// let outcome = ReviewOutcome {
///     pr: "octocat/hello#1".parse::<PrRef>().unwrap(),
///     title: "Fix typo".into(),
///     model: "llama3.2".into(),
///     prompt: PromptStats { chars: 900, files_included: 1, files_omitted: 0, truncated: false },
///     sections: vec![],
///     posting: None,
///     generated_at: Utc::now(),
/// };
/// assert_eq!(outcome.exit_code(), 0);
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    /// The reviewed pull request.
    pub pr: PrRef,
    /// Pull request title.
    pub title: String,
    /// Model that wrote the review.
    pub model: String,
    /// What went into the prompt.
    pub prompt: PromptStats,
    /// Parsed review sections, in order.
    pub sections: Vec<ReviewSection>,
    /// Posting results; `None` for dry runs.
    pub posting: Option<PostReport>,
    /// When the review finished.
    pub generated_at: DateTime<Utc>,
}

/// Prompt bookkeeping carried into the outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStats {
    /// Prompt length in characters.
    pub chars: usize,
    /// File patches included.
    pub files_included: usize,
    /// Trailing files dropped for the budget.
    pub files_omitted: usize,
    /// Whether a truncation notice was appended.
    pub truncated: bool,
}

impl From<&ReviewPrompt> for PromptStats {
    fn from(p: &ReviewPrompt) -> Self {
        Self {
            chars: p.len_chars(),
            files_included: p.files_included,
            files_omitted: p.files_omitted,
            truncated: p.truncated,
        }
    }
}

impl ReviewOutcome {
    /// Process exit code: 0 unless a comment failed to post.
    pub fn exit_code(&self) -> i32 {
        self.posting.as_ref().map_or(0, PostReport::exit_code)
    }

    /// Render the outcome as markdown.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Review of {}\n\n", self.pr));
        out.push_str(&format!(
            "**Title:** {} | **Model:** {} | **Files:** {} reviewed, {} omitted\n\n",
            self.title, self.model, self.prompt.files_included, self.prompt.files_omitted,
        ));
        for section in &self.sections {
            out.push_str(&format!("## {}\n\n", section.label));
            if section.is_empty() {
                out.push_str("_(empty)_\n\n");
            } else {
                out.push_str(&format!("{}\n\n", section.body));
            }
        }
        match &self.posting {
            Some(report) => {
                out.push_str(&format!("**Posting:** {report}\n"));
                for f in &report.failures {
                    out.push_str(&format!("- {} skipped: {}\n", f.label, f.reason));
                }
            }
            None => out.push_str("**Posting:** dry run, nothing posted\n"),
        }
        out
    }
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Review of {}: {}", self.pr, self.title)?;
        writeln!(
            f,
            "Model: {} | Prompt: {} chars | Files: {} (omitted: {})\n",
            self.model, self.prompt.chars, self.prompt.files_included, self.prompt.files_omitted,
        )?;
        for section in &self.sections {
            writeln!(f, "[{}]", section.label)?;
            writeln!(f, "{}\n", section.body)?;
        }
        match &self.posting {
            Some(report) => {
                writeln!(f, "Posting: {report} ({})", report.status())?;
                for failure in &report.failures {
                    writeln!(f, "  {} skipped: {}", failure.label, failure.reason)?;
                }
            }
            None => writeln!(f, "Posting: dry run, nothing posted")?,
        }
        Ok(())
    }
}

/// Drives one review: fetch, build prompt, generate, parse, post.
///
/// Every stage is awaited in sequence. Fetch and model failures abort the
/// run; a failed comment post is recorded and the remaining sections are
/// still attempted.
pub struct ReviewPipeline {
    hosting: Arc<dyn HostingApi>,
    model: Arc<dyn ModelBackend>,
    prompt_char_budget: usize,
}

impl ReviewPipeline {
    /// Create a pipeline from its collaborators and review settings.
    pub fn new(
        hosting: Arc<dyn HostingApi>,
        model: Arc<dyn ModelBackend>,
        config: &ReviewConfig,
    ) -> Self {
        Self {
            hosting,
            model,
            prompt_char_budget: config.prompt_char_budget,
        }
    }

    /// Review `pr` and, unless `dry_run`, post each non-empty section as a comment.
    ///
    /// # Errors
    ///
    /// Returns the fetch error (`Auth`, `NotFound`, `RateLimit`, `GitHub`) or
    /// the model error (`ModelUnavailable`, `Timeout`, `Generation`) that
    /// stopped the run. Post failures are reported in the outcome instead.
    pub async fn run(&self, pr: &PrRef, dry_run: bool) -> Result<ReviewOutcome, LookoutError> {
        info!(pr = %pr, "fetching pull request");
        let diff = self.hosting.fetch_pull_request(pr).await?;
        info!(
            pr = %pr,
            files = diff.files.len(),
            additions = diff.total_additions(),
            deletions = diff.total_deletions(),
            "fetched pull request"
        );

        let mut outcome = review_diff(self.model.as_ref(), &diff, self.prompt_char_budget).await?;
        if dry_run {
            info!(pr = %pr, sections = outcome.sections.len(), "dry run, skipping comments");
            return Ok(outcome);
        }

        let report = post_sections(
            self.hosting.as_ref(),
            pr,
            &outcome.sections,
            self.model.model(),
        )
        .await;
        outcome.posting = Some(report);
        Ok(outcome)
    }
}

/// Build the prompt for `diff`, ask the model, and parse its sections.
///
/// Nothing is posted; the returned outcome has no posting report.
///
/// # Errors
///
/// Returns the model error that stopped generation.
pub async fn review_diff(
    model: &dyn ModelBackend,
    diff: &PullRequestDiff,
    prompt_char_budget: usize,
) -> Result<ReviewOutcome, LookoutError> {
    let prompt = build_review_prompt(diff, prompt_char_budget);
    if prompt.truncated {
        warn!(
            pr = %diff.pr,
            omitted = prompt.files_omitted,
            budget = prompt_char_budget,
            "diff truncated to fit the prompt budget"
        );
    }

    info!(model = model.model(), prompt_chars = prompt.len_chars(), "invoking model");
    let started = Instant::now();
    let completion = model.generate(&prompt.text).await?;
    info!(
        model = model.model(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        response_chars = completion.chars().count(),
        "model responded"
    );

    let sections = parse_sections(&completion);
    Ok(ReviewOutcome {
        pr: diff.pr.clone(),
        title: diff.title.clone(),
        model: model.model().to_string(),
        prompt: PromptStats::from(&prompt),
        sections,
        posting: None,
        generated_at: Utc::now(),
    })
}

/// Post each non-empty section as one comment, in order.
///
/// A failed post is logged and skipped; later sections are still attempted.
pub async fn post_sections(
    hosting: &dyn HostingApi,
    pr: &PrRef,
    sections: &[ReviewSection],
    model: &str,
) -> PostReport {
    let mut report = PostReport::default();
    for section in sections.iter().filter(|s| !s.is_empty()) {
        let body = comment_body(section, model);
        match hosting.post_comment(pr, &body).await {
            Ok(()) => {
                info!(pr = %pr, section = %section.label, "posted comment");
                report.posted.push(section.label);
            }
            Err(e) => {
                warn!(pr = %pr, section = %section.label, error = %e, "failed to post comment, skipping");
                report.failures.push(PostFailure {
                    label: section.label,
                    reason: e.to_string(),
                });
            }
        }
    }
    info!(pr = %pr, status = %report.status(), "{report}");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::{PostFailure, RunStatus, SectionLabel};

    fn outcome(posting: Option<PostReport>) -> ReviewOutcome {
        ReviewOutcome {
            pr: "octocat/hello#3".parse().unwrap(),
            title: "Add cache".into(),
            model: "llama3.2".into(),
            prompt: PromptStats {
                chars: 1200,
                files_included: 2,
                files_omitted: 1,
                truncated: true,
            },
            sections: vec![
                ReviewSection {
                    label: SectionLabel::Summary,
                    body: "Adds an LRU cache.".into(),
                },
                ReviewSection {
                    label: SectionLabel::IssuesFound,
                    body: String::new(),
                },
            ],
            posting,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn dry_run_outcome_exits_zero() {
        let o = outcome(None);
        assert_eq!(o.exit_code(), 0);
        assert!(o.to_string().contains("dry run"));
    }

    #[test]
    fn partial_posting_exits_two() {
        let report = PostReport {
            posted: vec![SectionLabel::Summary],
            failures: vec![PostFailure {
                label: SectionLabel::Suggestions,
                reason: "GitHub API error: 502".into(),
            }],
        };
        assert_eq!(report.status(), RunStatus::Partial);
        let o = outcome(Some(report));
        assert_eq!(o.exit_code(), 2);
        let text = o.to_string();
        assert!(text.contains("1 of 2 sections posted, 1 skipped (partial)"));
        assert!(text.contains("Suggestions skipped: GitHub API error: 502"));
    }

    #[test]
    fn markdown_lists_sections() {
        let md = outcome(None).to_markdown();
        assert!(md.starts_with("# Review of octocat/hello#3"));
        assert!(md.contains("## Summary\n\nAdds an LRU cache."));
        assert!(md.contains("## Issues Found\n\n_(empty)_"));
        assert!(md.contains("1 omitted"));
    }

    #[test]
    fn outcome_serializes_camel_case() {
        let json = serde_json::to_value(outcome(None)).unwrap();
        assert_eq!(json["pr"]["owner"], "octocat");
        assert_eq!(json["prompt"]["filesOmitted"], 1);
        assert_eq!(json["sections"][1]["label"], "issuesFound");
        assert!(json["posting"].is_null());
        assert!(json["generatedAt"].is_string());
    }
}
