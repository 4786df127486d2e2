use lookout_core::{ChangedFile, FileStatus, LookoutError};

/// Read a unified diff (as produced by `git diff`) into changed-file records.
///
/// Each file's patch keeps its hunk headers and lines, the same shape GitHub
/// returns per file. Binary files are listed without a patch.
///
/// # Errors
///
/// Returns [`LookoutError::Parse`] if a hunk header is malformed.
///
/// # Examples
///
/// ```
/// use lookout_core::FileStatus;
/// use lookout_review::diff::parse_unified_diff;
///
/// let diff = "diff --git a/hello.rs b/hello.rs\n\
///             --- a/hello.rs\n\
///             +++ b/hello.rs\n\
///             @@ -1,2 +1,3 @@\n\
///              fn main() {\n\
///             +    println!(\"hello\");\n\
///              }\n";
/// let files = parse_unified_diff(diff).unwrap();
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].path, "hello.rs");
/// assert_eq!(files[0].status, FileStatus::Modified);
/// assert_eq!(files[0].additions, 1);
/// ```
pub fn parse_unified_diff(input: &str) -> Result<Vec<ChangedFile>, LookoutError> {
    let mut files = Vec::new();
    let mut current: Option<PendingFile> = None;

    for line in input.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(file) = current.take() {
                files.push(file.finish());
            }
            let mut file = PendingFile::default();
            if let Some((old, new)) = split_git_paths(rest) {
                file.old_path = old;
                file.new_path = new;
            }
            current = Some(file);
            continue;
        }

        // Plain patches have no "diff --git" line. Inside an open hunk a
        // "--- " line is a removed line starting with "--".
        if line.starts_with("--- ")
            && current
                .as_ref()
                .map_or(true, |f| f.in_hunk && !f.hunk_open())
        {
            if let Some(file) = current.take() {
                files.push(file.finish());
            }
            current = Some(PendingFile::default());
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if file.in_hunk {
            match line.as_bytes().first() {
                Some(b'+') => {
                    file.additions += 1;
                    file.new_left = file.new_left.saturating_sub(1);
                }
                Some(b'-') => {
                    file.deletions += 1;
                    file.old_left = file.old_left.saturating_sub(1);
                }
                Some(b' ') => file.consume_context(),
                Some(b'\\') => {}
                Some(b'@') => file.open_hunk(line)?,
                // Blank context lines some tools emit without a space.
                None => file.consume_context(),
                _ => continue,
            }
            file.patch.push_str(line);
            file.patch.push('\n');
            continue;
        }

        if line.starts_with("Binary files ") && line.ends_with(" differ") {
            file.binary = true;
        } else if line.starts_with("new file mode") {
            file.status = FileStatus::Added;
        } else if line.starts_with("deleted file mode") {
            file.status = FileStatus::Removed;
        } else if let Some(path) = line.strip_prefix("rename from ") {
            file.old_path = path.to_string();
            file.status = FileStatus::Renamed;
        } else if let Some(path) = line.strip_prefix("rename to ") {
            file.new_path = path.to_string();
            file.status = FileStatus::Renamed;
        } else if let Some(path) = line.strip_prefix("copy to ") {
            file.new_path = path.to_string();
            file.status = FileStatus::Copied;
        } else if let Some(path) = line.strip_prefix("--- ") {
            file.old_path = parse_path(path);
            if file.old_path == DEV_NULL {
                file.status = FileStatus::Added;
            }
        } else if let Some(path) = line.strip_prefix("+++ ") {
            file.new_path = parse_path(path);
            if file.new_path == DEV_NULL {
                file.status = FileStatus::Removed;
            }
        } else if line.starts_with("@@") {
            file.open_hunk(line)?;
            file.in_hunk = true;
            file.patch.push_str(line);
            file.patch.push('\n');
        }
    }

    if let Some(file) = current.take() {
        files.push(file.finish());
    }
    Ok(files)
}

const DEV_NULL: &str = "/dev/null";

struct PendingFile {
    old_path: String,
    new_path: String,
    status: FileStatus,
    additions: u32,
    deletions: u32,
    patch: String,
    binary: bool,
    in_hunk: bool,
    old_left: u32,
    new_left: u32,
}

impl Default for PendingFile {
    fn default() -> Self {
        Self {
            old_path: String::new(),
            new_path: String::new(),
            status: FileStatus::Modified,
            additions: 0,
            deletions: 0,
            patch: String::new(),
            binary: false,
            in_hunk: false,
            old_left: 0,
            new_left: 0,
        }
    }
}

impl PendingFile {
    fn open_hunk(&mut self, header: &str) -> Result<(), LookoutError> {
        let (old_lines, new_lines) = parse_hunk_header(header)?;
        self.old_left = old_lines;
        self.new_left = new_lines;
        Ok(())
    }

    fn consume_context(&mut self) {
        self.old_left = self.old_left.saturating_sub(1);
        self.new_left = self.new_left.saturating_sub(1);
    }

    /// Whether the current hunk still expects lines.
    fn hunk_open(&self) -> bool {
        self.old_left > 0 || self.new_left > 0
    }

    fn finish(self) -> ChangedFile {
        let path = if self.status == FileStatus::Removed || self.new_path.is_empty() {
            self.old_path
        } else {
            self.new_path
        };
        let patch = (!self.binary && !self.patch.is_empty()).then_some(self.patch);
        ChangedFile {
            path,
            status: self.status,
            additions: self.additions,
            deletions: self.deletions,
            patch,
        }
    }
}

/// Split the `a/old b/new` tail of a `diff --git` line.
fn split_git_paths(rest: &str) -> Option<(String, String)> {
    let idx = rest.find(" b/")?;
    Some((parse_path(&rest[..idx]), parse_path(&rest[idx + 1..])))
}

fn parse_path(raw: &str) -> String {
    let normalized = raw.trim().trim_matches('"');
    if normalized == DEV_NULL {
        return DEV_NULL.to_string();
    }
    normalized
        .strip_prefix("a/")
        .or_else(|| normalized.strip_prefix("b/"))
        .unwrap_or(normalized)
        .to_string()
}

/// Line counts `(old, new)` from a `@@ -a,b +c,d @@` header.
fn parse_hunk_header(line: &str) -> Result<(u32, u32), LookoutError> {
    let invalid = || LookoutError::Parse(format!("invalid hunk header: {line}"));
    let inner = line
        .strip_prefix("@@ ")
        .and_then(|s| s.find(" @@").map(|end| &s[..end]))
        .ok_or_else(invalid)?;

    let (old, new) = inner.split_once(' ').ok_or_else(invalid)?;
    let old = old.strip_prefix('-').ok_or_else(invalid)?;
    let new = new.strip_prefix('+').ok_or_else(invalid)?;
    match (range_len(old), range_len(new)) {
        (Some(old_lines), Some(new_lines)) => Ok((old_lines, new_lines)),
        _ => Err(invalid()),
    }
}

/// Length of a `start[,count]` range; a missing count means one line.
fn range_len(range: &str) -> Option<u32> {
    let (start, count) = match range.split_once(',') {
        Some((start, count)) => (start, count.parse::<u32>().ok()?),
        None => (range, 1),
    };
    start.parse::<u32>().ok()?;
    Some(count)
}
