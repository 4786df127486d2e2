//! Fixed sample pull request and a canned reviewer for demo mode.
//!
//! Demo runs never touch GitHub or the model server: the sample diff stands
//! in for a fetched pull request and [`DemoReviewer`] stands in for the model.

use std::collections::BTreeSet;
use std::fmt::Write;

use async_trait::async_trait;
use lookout_core::{LookoutError, PrRef, PullRequestDiff};

use crate::diff::parse_unified_diff;
use crate::llm::ModelBackend;

/// Model name reported for demo reviews.
pub const DEMO_MODEL: &str = "demo-reviewer";

const SAMPLE_DIFF: &str = r#"diff --git a/src/auth.py b/src/auth.py
new file mode 100644
--- /dev/null
+++ b/src/auth.py
@@ -0,0 +1,21 @@
+import hashlib
+import sqlite3
+
+
+def hash_password(password):
+    return hashlib.md5(password.encode()).hexdigest()
+
+
+def login(username, password):
+    conn = sqlite3.connect("users.db")
+    query = f"SELECT * FROM users WHERE name = '{username}'"
+    row = conn.execute(query).fetchone()
+    if row and row[2] == hash_password(password):
+        return {"user": username, "admin": row[3]}
+    return None
+
+
+def logout(session):
+    session.clear()
+    return True
+
diff --git a/src/app.py b/src/app.py
--- a/src/app.py
+++ b/src/app.py
@@ -1,8 +1,15 @@
 from flask import Flask, request, session
+from auth import login, logout

 app = Flask(__name__)
+app.secret_key = "dev"


 @app.route("/")
 def index():
     return "ok"
+
+
+@app.route("/login", methods=["POST"])
+def do_login():
+    return str(login(request.form["user"], request.form["password"]))
"#;

/// The sample pull request used by demo mode: a small login feature with
/// a few deliberate problems for the reviewer to find.
///
/// # Errors
///
/// Returns [`LookoutError::Parse`] only if the built-in sample is malformed.
///
/// # Examples
///
/// ```
/// use lookout_review::demo::sample_pull_request;
///
/// let diff = sample_pull_request().unwrap();
/// assert_eq!(diff.pr.to_string(), "demo/sample#0");
/// assert_eq!(diff.files.len(), 2);
/// ```
pub fn sample_pull_request() -> Result<PullRequestDiff, LookoutError> {
    Ok(PullRequestDiff {
        pr: PrRef {
            owner: "demo".into(),
            repo: "sample".into(),
            number: 0,
        },
        title: "Add user authentication".into(),
        body: Some("Adds login and logout helpers backed by SQLite.".into()),
        files: parse_unified_diff(SAMPLE_DIFF)?,
    })
}

/// A stand-in model that writes a review from the diff's shape.
///
/// The text uses the same section headers a real model is asked for, so it
/// exercises the same parsing and posting path.
pub struct DemoReviewer {
    review: String,
}

impl DemoReviewer {
    /// Prepare the canned review for `diff`.
    pub fn for_diff(diff: &PullRequestDiff) -> Self {
        Self {
            review: mock_review(diff),
        }
    }
}

#[async_trait]
impl ModelBackend for DemoReviewer {
    fn model(&self) -> &str {
        DEMO_MODEL
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LookoutError> {
        Ok(self.review.clone())
    }
}

fn language_of(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    let lang = match ext.as_str() {
        "py" => "Python",
        "js" | "ts" | "jsx" | "tsx" => "JavaScript/TypeScript",
        "java" => "Java",
        "go" => "Go",
        "rs" => "Rust",
        "c" | "h" | "cpp" | "hpp" => "C/C++",
        _ => return None,
    };
    Some(lang)
}

fn mock_review(diff: &PullRequestDiff) -> String {
    let languages: BTreeSet<&str> = diff.files.iter().filter_map(|f| language_of(&f.path)).collect();
    let languages = if languages.is_empty() {
        "various".to_string()
    } else {
        languages.into_iter().collect::<Vec<_>>().join(", ")
    };

    let mut out = String::new();
    let _ = writeln!(out, "Summary:");
    let _ = writeln!(
        out,
        "\"{}\" touches {} file(s) (+{} -{}) written in {languages}.",
        diff.title,
        diff.files.len(),
        diff.total_additions(),
        diff.total_deletions()
    );
    for file in diff.files.iter().take(5) {
        let _ = writeln!(
            out,
            "- `{}` ({}): {} additions, {} deletions",
            file.path, file.status, file.additions, file.deletions
        );
    }

    let _ = writeln!(out, "\nIssues Found:");
    let mut issues = 0;
    for file in &diff.files {
        let Some(patch) = &file.patch else { continue };
        for (needle, issue) in KNOWN_ISSUES {
            if patch.contains(needle) {
                let _ = writeln!(out, "- `{}`: {issue}", file.path);
                issues += 1;
            }
        }
    }
    if issues == 0 {
        let _ = writeln!(out, "None spotted by the demo reviewer.");
    }

    let _ = writeln!(out, "\nSuggestions:");
    let _ = writeln!(out, "- Add tests covering the new code paths.");
    let _ = writeln!(out, "- Document non-obvious behavior inline.");
    let _ = writeln!(out, "- Handle and log errors at the boundaries.");
    out
}

const KNOWN_ISSUES: &[(&str, &str)] = &[
    ("md5", "MD5 is not suitable for password hashing; use a salted KDF such as bcrypt or argon2"),
    ("f\"SELECT", "query built with string formatting is open to SQL injection; use parameters"),
    ("secret_key = \"", "hard-coded secret key; load it from the environment"),
];
