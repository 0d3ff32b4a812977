//! Prompts for the vision-model backends.
//!
//! Every prompt asks for a strict JSON answer so the result can be validated
//! instead of guessed at. Callers never depend on prompt wording; they depend
//! on the JSON schema each prompt documents, which
//! [`crate::pipeline::postprocess::extract_json`] and serde enforce.

use crate::labels::CLASS_LABELS;

/// System prompt shared by all backends.
pub const SYSTEM_PROMPT: &str = "You are a document layout analysis engine. \
You look at scanned or rendered document images and answer ONLY with the JSON \
requested by the user message. Never add commentary, never wrap the JSON in \
prose, and never invent content that is not visible in the image.";

/// Build the layout-detection prompt for a `width × height` page image.
///
/// Expected answer:
/// `[{"class_id": 1, "bbox": [x1, y1, x2, y2], "confidence": 0.93}, …]`
pub fn layout_detection_prompt(width: u32, height: u32) -> String {
    let classes = CLASS_LABELS
        .iter()
        .enumerate()
        .map(|(id, class)| format!("  {id}: {}", class.display_name()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Detect every layout region on this page image. The image is {width} pixels wide and {height} pixels tall.

Classify each region with one of these class ids:
{classes}

Rules:
- bbox is [x1, y1, x2, y2] in image pixels, origin at the top-left corner, x1 < x2 and y1 < y2
- One region per paragraph, title, caption, footnote, figure, table, or display formula
- Page headers, footers and page numbers are class 2
- confidence is your certainty between 0 and 1

Answer with a JSON array only:
[{{"class_id": 1, "bbox": [x1, y1, x2, y2], "confidence": 0.9}}]
Answer [] if the page is blank."#
    )
}

/// Text OCR on a cropped region.
///
/// Expected answer: `[{"text": "…", "confidence": 0.97}, …]`, one element
/// per visual line, top to bottom.
pub const TEXT_OCR_PROMPT: &str = r#"Transcribe the text in this image exactly as printed, keeping the original language.

Return one element per visual text line, from top to bottom:
[{"text": "first line", "confidence": 0.98}, {"text": "second line", "confidence": 0.95}]

confidence is your certainty for that line between 0 and 1.
Answer [] if the image contains no text."#;

/// Formula recognition on a cropped display formula.
///
/// Expected answer: `{"latex": "…"}`.
pub const FORMULA_OCR_PROMPT: &str = r#"Transcribe the mathematical formula in this image to LaTeX.

Rules:
- Do not wrap the LaTeX in $ or $$ delimiters
- Keep equation numbers out of the LaTeX

Answer with JSON only:
{"latex": "E = mc^{2}"}"#;

/// Table extraction on a full page image.
///
/// Expected answer: `{"columns": [...], "rows": [[...], ...]}` with `null`
/// for empty cells, or `{"columns": [], "rows": []}` when there is no table.
pub const TABLE_EXTRACTION_PROMPT: &str = r#"Extract the main data table on this page.

Rules:
- columns holds the header cells, left to right
- rows holds every body row, each with exactly one cell per column
- Use null for an empty cell
- If several tables are present, extract the largest one
- If there is no table, answer {"columns": [], "rows": []}

Answer with JSON only:
{"columns": ["Name", "Value"], "rows": [["alpha", "1"], ["beta", null]]}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_prompt_lists_every_class() {
        let p = layout_detection_prompt(1190, 1684);
        assert!(p.contains("1190 pixels wide"));
        assert!(p.contains("1684 pixels tall"));
        for (id, class) in CLASS_LABELS.iter().enumerate() {
            assert!(p.contains(&format!("{id}: {}", class.display_name())));
        }
    }

    #[test]
    fn prompts_demand_json() {
        assert!(TEXT_OCR_PROMPT.contains("\"confidence\""));
        assert!(FORMULA_OCR_PROMPT.contains("\"latex\""));
        assert!(TABLE_EXTRACTION_PROMPT.contains("\"columns\""));
    }
}
