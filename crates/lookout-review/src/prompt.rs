use std::fmt::Write;

use lookout_core::{ChangedFile, PullRequestDiff, SectionLabel};
use serde::Serialize;

const PREAMBLE: &str = "\
You are an expert code reviewer. Review this GitHub pull request and give \
constructive, specific feedback.";

const INSTRUCTIONS: &str = "\
Focus on code quality, correctness and bugs, security, performance, \
documentation, and test coverage. Reference file names and line numbers \
from the patches when pointing at specific code. Be constructive and concise \
(aim for 300-500 words).

Answer using exactly these three headers, each on its own line, in this order:

Summary:
<two or three sentences on what the change does and its overall quality>

Issues Found:
<bullet list of concrete problems, or \"None\">

Suggestions:
<bullet list of specific improvements>";

const NO_PATCH: &str = "(no textual patch available: binary or too large)";

/// The prompt sent to the model, with bookkeeping about what it contains.
///
/// # Examples
///
/// ```
/// use lookout_core::{PrRef, PullRequestDiff};
/// use lookout_review::prompt::build_review_prompt;
///
/// let diff = PullRequestDiff {
///     pr: "octocat/hello#1".parse::<PrRef>().unwrap(),
///     title: "Empty".into(),
///     body: None,
///     files: vec![],
/// };
/// let prompt = build_review_prompt(&diff, 10_000);
/// assert!(!prompt.truncated);
/// assert!(prompt.text.contains("Summary:"));
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPrompt {
    /// Full prompt text.
    pub text: String,
    /// Number of file patches included.
    pub files_included: usize,
    /// Number of trailing files dropped to respect the budget.
    pub files_omitted: usize,
    /// Whether a truncation notice was appended.
    pub truncated: bool,
}

impl ReviewPrompt {
    /// Prompt length in characters.
    pub fn len_chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Build the review prompt for a pull request within `budget` characters.
///
/// Whole file patches are kept in their original order. Once the next file
/// would push the prompt over budget, it and every file after it are dropped
/// and a truncation notice is appended. The result never exceeds `budget`
/// unless the fixed header and instructions alone do.
///
/// # Examples
///
/// ```
/// use lookout_core::{ChangedFile, FileStatus, PrRef, PullRequestDiff};
/// use lookout_review::prompt::build_review_prompt;
///
/// let file = ChangedFile {
///     path: "src/lib.rs".into(),
///     status: FileStatus::Modified,
///     additions: 1,
///     deletions: 0,
///     patch: Some("@@ -1 +1,2 @@\n fn a() {}\n+fn b() {}\n".into()),
/// };
/// let diff = PullRequestDiff {
///     pr: "octocat/hello#2".parse::<PrRef>().unwrap(),
///     title: "Add b".into(),
///     body: Some("Adds b.".into()),
///     files: vec![file],
/// };
/// let prompt = build_review_prompt(&diff, 10_000);
/// assert_eq!(prompt.files_included, 1);
/// assert!(prompt.text.contains("+fn b() {}"));
/// ```
pub fn build_review_prompt(diff: &PullRequestDiff, budget: usize) -> ReviewPrompt {
    let header = render_header(diff);
    let footer = format!("\n{INSTRUCTIONS}\n");
    let blocks: Vec<String> = diff.files.iter().map(render_file_block).collect();

    let fixed = char_len(&header) + char_len(&footer);
    let all_blocks: usize = blocks.iter().map(|b| char_len(b)).sum();

    let total = diff.files.len();
    let mut included = total;
    let mut notice = None;

    if fixed + all_blocks > budget {
        // Reserve room for the notice with the largest possible omitted count.
        let reserve = char_len(&truncation_notice(total, total));
        let mut used = fixed + reserve;
        included = 0;
        for block in &blocks {
            let len = char_len(block);
            if used + len > budget {
                break;
            }
            used += len;
            included += 1;
        }
        notice = Some(truncation_notice(total - included, total));
    }

    let mut text = header;
    for block in &blocks[..included] {
        text.push_str(block);
    }
    if let Some(n) = &notice {
        text.push_str(n);
    }
    text.push_str(&footer);

    ReviewPrompt {
        text,
        files_included: included,
        files_omitted: total - included,
        truncated: notice.is_some(),
    }
}

fn render_header(diff: &PullRequestDiff) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{PREAMBLE}\n");
    let _ = writeln!(out, "Repository: {}", diff.pr.repository());
    let _ = writeln!(out, "Pull Request #{}: {}", diff.pr.number, diff.title);
    let _ = writeln!(
        out,
        "Description: {}",
        diff.body.as_deref().unwrap_or("No description provided")
    );
    let _ = writeln!(
        out,
        "\nChanged Files ({} files, +{} -{}):",
        diff.files.len(),
        diff.total_additions(),
        diff.total_deletions()
    );
    out
}

fn render_file_block(file: &ChangedFile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n--- File: {} ({}) ---", file.path, file.status);
    let _ = writeln!(
        out,
        "Additions: {}, Deletions: {}",
        file.additions, file.deletions
    );
    match &file.patch {
        Some(patch) => {
            let _ = writeln!(out, "Patch/Diff:\n{}", patch.trim_end_matches('\n'));
        }
        None => {
            let _ = writeln!(out, "{NO_PATCH}");
        }
    }
    out
}

fn truncation_notice(omitted: usize, total: usize) -> String {
    format!("\n[Diff truncated: {omitted} of {total} files omitted to fit the prompt budget]\n")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The headers the prompt asks the model to use, in order.
pub fn expected_headers() -> [&'static str; 3] {
    SectionLabel::RECOGNIZED.map(SectionLabel::header)
}
