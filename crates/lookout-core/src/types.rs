use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LookoutError;

/// A pull request reference: `owner/repo#number`.
///
/// # Examples
///
/// ```
/// use lookout_core::PrRef;
///
/// let pr: PrRef = "rust-lang/rust#12345".parse().unwrap();
/// assert_eq!(pr.owner, "rust-lang");
/// assert_eq!(pr.repo, "rust");
/// assert_eq!(pr.number, 12345);
/// assert_eq!(pr.to_string(), "rust-lang/rust#12345");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrRef {
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Pull request number.
    pub number: u64,
}

impl PrRef {
    /// Build a reference from a repository identifier (`owner/repo`) and a number.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::Config`] if `repository` is not `owner/repo`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lookout_core::PrRef;
    ///
    /// let pr = PrRef::from_repository("octocat/hello-world", 42).unwrap();
    /// assert_eq!(pr.to_string(), "octocat/hello-world#42");
    /// assert!(PrRef::from_repository("hello-world", 42).is_err());
    /// ```
    pub fn from_repository(repository: &str, number: u64) -> Result<Self, LookoutError> {
        let Some((owner, repo)) = repository.trim().split_once('/') else {
            return Err(LookoutError::Config(format!(
                "invalid repository '{repository}', expected owner/repo"
            )));
        };
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(LookoutError::Config(format!(
                "invalid repository '{repository}', expected owner/repo"
            )));
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        })
    }

    /// The `owner/repo` part of the reference.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for PrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

impl FromStr for PrRef {
    type Err = LookoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((repository, number_str)) = s.split_once('#') else {
            return Err(LookoutError::Config(format!(
                "invalid PR reference '{s}', expected owner/repo#number"
            )));
        };
        let number: u64 = number_str
            .parse()
            .map_err(|_| LookoutError::Config(format!("invalid PR number: {number_str}")))?;
        Self::from_repository(repository, number)
    }
}

/// How a file changed in a pull request, as reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Newly created file.
    Added,
    /// Existing file changed in place.
    Modified,
    /// Deleted file.
    Removed,
    /// File moved, possibly with changes.
    Renamed,
    /// File copied from another path.
    Copied,
    /// Mode or metadata change.
    Changed,
    /// Listed without content changes.
    Unchanged,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "added"),
            FileStatus::Modified => write!(f, "modified"),
            FileStatus::Removed => write!(f, "removed"),
            FileStatus::Renamed => write!(f, "renamed"),
            FileStatus::Copied => write!(f, "copied"),
            FileStatus::Changed => write!(f, "changed"),
            FileStatus::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// One changed file of a pull request.
///
/// # Examples
///
/// ```
/// use lookout_core::{ChangedFile, FileStatus};
///
/// let file = ChangedFile {
///     path: "src/lib.rs".into(),
///     status: FileStatus::Modified,
///     additions: 3,
///     deletions: 1,
///     patch: Some("@@ -1,1 +1,3 @@\n-a\n+b\n+c\n+d\n".into()),
/// };
/// assert_eq!(file.additions, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    /// Path relative to the repository root.
    pub path: String,
    /// Kind of change.
    pub status: FileStatus,
    /// Number of added lines.
    pub additions: u32,
    /// Number of removed lines.
    pub deletions: u32,
    /// Unified diff hunks; absent for binary or oversized files.
    pub patch: Option<String>,
}

/// Everything fetched about a pull request for one review run.
///
/// # Examples
///
/// ```
/// use lookout_core::{PrRef, PullRequestDiff};
///
/// let diff = PullRequestDiff {
///     pr: "octocat/hello#1".parse::<PrRef>().unwrap(),
///     title: "Fix typo".into(),
///     body: None,
///     files: vec![],
/// };
/// assert_eq!(diff.total_additions(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestDiff {
    /// Which pull request this is.
    pub pr: PrRef,
    /// Pull request title.
    pub title: String,
    /// Pull request description, if any.
    pub body: Option<String>,
    /// Changed files, in the order GitHub lists them.
    pub files: Vec<ChangedFile>,
}

impl PullRequestDiff {
    /// Sum of added lines across all files.
    pub fn total_additions(&self) -> u64 {
        self.files.iter().map(|f| u64::from(f.additions)).sum()
    }

    /// Sum of removed lines across all files.
    pub fn total_deletions(&self) -> u64 {
        self.files.iter().map(|f| u64::from(f.deletions)).sum()
    }
}

/// Label of a review section.
///
/// `Other` collects text that precedes every recognized header.
///
/// # Examples
///
/// ```
/// use lookout_core::SectionLabel;
///
/// assert_eq!(SectionLabel::IssuesFound.header(), "Issues Found");
/// assert_eq!(SectionLabel::RECOGNIZED.len(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionLabel {
    /// Overall summary of the change.
    Summary,
    /// Problems the model found.
    IssuesFound,
    /// Proposed improvements.
    Suggestions,
    /// Unclassified text.
    Other,
}

impl SectionLabel {
    /// Labels that have a header the model is asked to emit.
    pub const RECOGNIZED: [SectionLabel; 3] = [
        SectionLabel::Summary,
        SectionLabel::IssuesFound,
        SectionLabel::Suggestions,
    ];

    /// Human-readable header text.
    pub fn header(self) -> &'static str {
        match self {
            SectionLabel::Summary => "Summary",
            SectionLabel::IssuesFound => "Issues Found",
            SectionLabel::Suggestions => "Suggestions",
            SectionLabel::Other => "Other",
        }
    }
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// One labeled part of the model's review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSection {
    /// Which header introduced the section.
    pub label: SectionLabel,
    /// Section text without the header.
    pub body: String,
}

impl ReviewSection {
    /// Whether the body has no visible text.
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// A section whose comment could not be posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostFailure {
    /// Section that was skipped.
    pub label: SectionLabel,
    /// Why the post failed.
    pub reason: String,
}

/// Outcome of posting review sections as comments.
///
/// # Examples
///
/// ```
/// use lookout_core::{PostFailure, PostReport, RunStatus, SectionLabel};
///
/// let report = PostReport {
///     posted: vec![SectionLabel::Summary, SectionLabel::Suggestions],
///     failures: vec![PostFailure {
///         label: SectionLabel::IssuesFound,
///         reason: "502 Bad Gateway".into(),
///     }],
/// };
/// assert_eq!(report.status(), RunStatus::Partial);
/// assert_eq!(report.exit_code(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReport {
    /// Sections posted, in order.
    pub posted: Vec<SectionLabel>,
    /// Sections skipped because the post failed, in order.
    pub failures: Vec<PostFailure>,
}

impl PostReport {
    /// Summarize successes against failures.
    pub fn status(&self) -> RunStatus {
        match (self.posted.is_empty(), self.failures.is_empty()) {
            (_, true) => RunStatus::Complete,
            (false, false) => RunStatus::Partial,
            (true, false) => RunStatus::Failed,
        }
    }

    /// Process exit code for this report: 0 when every post succeeded, 2 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.status() {
            RunStatus::Complete => 0,
            RunStatus::Partial | RunStatus::Failed => 2,
        }
    }
}

impl fmt::Display for PostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} sections posted",
            self.posted.len(),
            self.posted.len() + self.failures.len()
        )?;
        if !self.failures.is_empty() {
            write!(f, ", {} skipped", self.failures.len())?;
        }
        Ok(())
    }
}

/// Overall status of the posting step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every section was posted.
    Complete,
    /// Some sections were posted, some skipped.
    Partial,
    /// No section could be posted.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Complete => write!(f, "complete"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use lookout_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
