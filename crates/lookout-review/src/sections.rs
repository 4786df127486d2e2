//! Splitting model output into labeled review sections and rendering them
//! as PR comments.

use lookout_core::{ReviewSection, SectionLabel};

/// GitHub rejects issue comments longer than this many characters.
pub const MAX_COMMENT_CHARS: usize = 65_536;

const TRUNCATED_MARKER: &str = "\n\n*[Comment truncated to fit GitHub's size limit]*";

/// Split raw model text into ordered sections.
///
/// A header is one of `Summary`, `Issues Found` or `Suggestions` at the start
/// of a line (case-insensitive), optionally wrapped in markdown emphasis or
/// prefixed by `#`, and optionally followed by `:` with inline text. Lines
/// that are not headers belong to the preceding section; text before the
/// first header goes to an [`SectionLabel::Other`] section.
///
/// # Examples
///
/// ```
/// use lookout_core::SectionLabel;
/// use lookout_review::sections::parse_sections;
///
/// let sections = parse_sections("## Summary\nAdds a cache.\n\n**Issues Found:** none");
/// assert_eq!(sections.len(), 2);
/// assert_eq!(sections[0].label, SectionLabel::Summary);
/// assert_eq!(sections[0].body, "Adds a cache.");
/// assert_eq!(sections[1].body, "none");
/// ```
pub fn parse_sections(text: &str) -> Vec<ReviewSection> {
    let mut sections = Vec::new();
    let mut label = SectionLabel::Other;
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        match match_header(line) {
            Some((next, mut inline)) => {
                flush(&mut sections, label, &lines);
                label = next;
                lines.clear();
                // "Summary: Issues Found: none" opens two sections.
                while let Some((nested, rest)) = match_header(inline) {
                    flush(&mut sections, label, &[]);
                    label = nested;
                    inline = rest;
                }
                if !inline.is_empty() {
                    lines.push(inline);
                }
            }
            None => lines.push(line),
        }
    }
    flush(&mut sections, label, &lines);
    sections
}

fn flush(sections: &mut Vec<ReviewSection>, label: SectionLabel, lines: &[&str]) {
    let body = lines.join("\n").trim().to_string();
    // Leading chatter only becomes a section when it says something.
    if label == SectionLabel::Other && body.is_empty() {
        return;
    }
    sections.push(ReviewSection { label, body });
}

/// Recognize a header line, returning its label and any inline body text.
fn match_header(line: &str) -> Option<(SectionLabel, &str)> {
    let rest = line
        .trim_start()
        .trim_start_matches(|c: char| c == '#' || c == '*' || c == '_' || c == ' ');

    SectionLabel::RECOGNIZED.into_iter().find_map(|label| {
        let header = label.header();
        let head = rest.get(..header.len())?;
        if !head.eq_ignore_ascii_case(header) {
            return None;
        }
        let after = rest[header.len()..].trim_start_matches(['*', '_']);
        match after.strip_prefix(':') {
            Some(inline) => Some((label, inline.trim_start_matches(['*', '_']).trim())),
            None if after.trim().is_empty() => Some((label, "")),
            None => None,
        }
    })
}

/// Render sections back into text that [`parse_sections`] reads identically.
///
/// # Examples
///
/// ```
/// use lookout_review::sections::{parse_sections, render_sections};
///
/// let sections = parse_sections("Summary:\nok\nSuggestions:\n- add tests");
/// assert_eq!(parse_sections(&render_sections(&sections)), sections);
/// ```
pub fn render_sections(sections: &[ReviewSection]) -> String {
    sections
        .iter()
        .map(|s| match s.label {
            SectionLabel::Other => s.body.clone(),
            label if s.body.is_empty() => format!("{}:", label.header()),
            label => format!("{}:\n{}", label.header(), s.body),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Body of the PR comment for one section.
///
/// The result never exceeds [`MAX_COMMENT_CHARS`] characters.
pub fn comment_body(section: &ReviewSection, model: &str) -> String {
    let heading = format!("## 🤖 AI Code Review: {}\n\n", section.label.header());
    let footer = format!("\n\n---\n*Generated by `{model}` via lookout*");

    let room = MAX_COMMENT_CHARS
        .saturating_sub(heading.chars().count())
        .saturating_sub(footer.chars().count());

    let body = if section.body.chars().count() > room {
        let keep = room.saturating_sub(TRUNCATED_MARKER.chars().count());
        let mut cut: String = section.body.chars().take(keep).collect();
        cut.push_str(TRUNCATED_MARKER);
        cut
    } else {
        section.body.clone()
    };

    format!("{heading}{body}{footer}")
}
