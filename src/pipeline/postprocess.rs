//! Post-processing: deterministic cleanup of vision-model answers.
//!
//! Well-prompted models still wrap JSON in ```json fences, add a sentence of
//! preamble, emit CRLF line endings, or sprinkle zero-width characters into
//! transcriptions. These rules fix those quirks without touching content.
//! Each rule is a pure `&str → String` function and is tested on its own.
//!
//! ## Rule Order
//!
//! Fences are stripped before JSON extraction so the bracket scan does not
//! see the fence language tag; invisible characters are removed before
//! whitespace is collapsed so a lone zero-width space does not survive as a
//! double space.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean one transcribed text line.
///
/// 1. Normalise line endings
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Collapse runs of whitespace to a single space and trim
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    collapse_whitespace(&s)
}

/// Clean a LaTeX transcription.
///
/// Strips outer fences and math delimiters (`$$…$$`, `$…$`, `\[…\]`) so the
/// stored text is bare LaTeX.
pub fn clean_latex(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = remove_invisible_chars(&s);
    strip_math_delimiters(s.trim()).trim().to_string()
}

/// Locate the JSON payload in a model answer.
///
/// Strips code fences, then returns the span from the first `[` or `{` to
/// the last matching closer. Returns `None` if there is no such span.
pub fn extract_json(input: &str) -> Option<String> {
    let s = strip_code_fences(input);
    let s = remove_invisible_chars(&s);
    let start = s.find(['[', '{'])?;
    let closer = if s.as_bytes()[start] == b'[' { ']' } else { '}' };
    let end = s.rfind(closer)?;
    (end > start).then(|| s[start..=end].to_string())
}

// ── Rule: strip outer code fences ───────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Rule: normalise line endings ────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule: remove invisible Unicode characters ───────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule: collapse whitespace ───────────────────────────────────────────────

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Rule: strip math delimiters ─────────────────────────────────────────────

fn strip_math_delimiters(input: &str) -> &str {
    for (open, close) in [("$$", "$$"), ("\\[", "\\]"), ("\\(", "\\)"), ("$", "$")] {
        if input.len() >= open.len() + close.len() {
            if let Some(inner) = input
                .strip_prefix(open)
                .and_then(|rest| rest.strip_suffix(close))
            {
                return inner;
            }
        }
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Hello \t  world \r\n"), "Hello world");
    }

    #[test]
    fn test_clean_text_removes_invisible() {
        assert_eq!(clean_text("Re\u{200B}port\u{FEFF}"), "Report");
    }

    #[test]
    fn test_clean_text_keeps_cjk() {
        assert_eq!(clean_text("表格 说明"), "表格 说明");
    }

    #[test]
    fn test_clean_latex_strips_display_delimiters() {
        assert_eq!(clean_latex("$$ E = mc^2 $$"), "E = mc^2");
        assert_eq!(clean_latex("\\[\\frac{a}{b}\\]"), "\\frac{a}{b}");
        assert_eq!(clean_latex("$x$"), "x");
    }

    #[test]
    fn test_clean_latex_strips_fences() {
        assert_eq!(clean_latex("```latex\n\\alpha + \\beta\n```"), "\\alpha + \\beta");
    }

    #[test]
    fn test_clean_latex_lone_dollar_untouched() {
        assert_eq!(clean_latex("$"), "$");
    }

    #[test]
    fn test_extract_json_from_fenced_answer() {
        let raw = "```json\n[{\"text\": \"a\"}]\n```";
        assert_eq!(extract_json(raw).unwrap(), "[{\"text\": \"a\"}]");
    }

    #[test]
    fn test_extract_json_with_preamble() {
        let raw = "Here is the result:\n{\"latex\": \"x^2\"}\nHope this helps.";
        assert_eq!(extract_json(raw).unwrap(), "{\"latex\": \"x^2\"}");
    }

    #[test]
    fn test_extract_json_missing() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("]  [").is_none());
    }
}
