//! Deterministic cleanup of model-written explanations.
//!
//! Vision models sometimes wrap their answer in a code fence, answer with
//! CRLF line endings, pad with blank lines, sprinkle zero-width characters,
//! or reference images that do not exist. None of that belongs in the text a
//! student reads next to the slide.
//!
//! Rules run in order: fences first so the rest sees bare text, invisible
//! characters last so they cannot hide a blank line from the collapse pass.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule and trim the result.
///
/// An answer that is only whitespace comes back empty, which the session
/// treats as a failed analysis.
pub fn tidy_explanation(raw: &str) -> String {
    let s = strip_outer_fence(raw);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = remove_invented_images(&s);
    let s = remove_invisible_chars(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md|text)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// At most one empty line between paragraphs.
fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

/// The model only ever saw one slide image; any image link it writes is
/// made up. Keep the alt text as an italic caption.
fn remove_invented_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if alt.is_empty() {
                String::new()
            } else {
                format!("*{alt}*")
            }
        })
        .into_owned()
}
