//! Recognizer capabilities for cropped regions.
//!
//! [`TextRecognizer`] returns detected text lines top to bottom;
//! [`FormulaRecognizer`] returns a LaTeX transcription. Both are object-safe
//! async traits so any OCR runtime can stand behind them. The shipped
//! implementations ask a vision LLM for strict JSON.

use crate::error::RegionError;
use crate::pipeline::llm::VlmClient;
use crate::pipeline::postprocess::{clean_latex, clean_text, extract_json};
use crate::prompts::{FORMULA_OCR_PROMPT, TEXT_OCR_PROMPT};
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One recognised line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// Per-line confidence, when the recognizer reports one.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl TextLine {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence: Some(confidence),
        }
    }
}

/// Text OCR over one region crop.
///
/// Calls run under the region timeout, which can only fire at an `.await`.
/// A local model doing CPU-bound or blocking inference must move that work
/// into `tokio::task::spawn_blocking` (as the pdfium rasteriser does), or a
/// stuck call holds its worker thread past the deadline. A panic is caught
/// and reported as a failed region.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Lines in top-to-bottom order. An empty vector means "no text here".
    async fn recognize_text(&self, crop: &RgbImage) -> Result<Vec<TextLine>, RegionError>;
}

/// Formula OCR returning LaTeX. Same timeout and blocking rules as
/// [`TextRecognizer`].
#[async_trait]
pub trait FormulaRecognizer: Send + Sync {
    async fn recognize_formula(&self, crop: &RgbImage) -> Result<String, RegionError>;
}

pub struct VlmTextRecognizer {
    client: Arc<VlmClient>,
}

impl VlmTextRecognizer {
    pub fn new(client: Arc<VlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextRecognizer for VlmTextRecognizer {
    async fn recognize_text(&self, crop: &RgbImage) -> Result<Vec<TextLine>, RegionError> {
        let answer = self
            .client
            .ask(TEXT_OCR_PROMPT, crop)
            .await
            .map_err(RegionError::Backend)?;
        parse_text_lines(&answer)
    }
}

pub struct VlmFormulaRecognizer {
    client: Arc<VlmClient>,
}

impl VlmFormulaRecognizer {
    pub fn new(client: Arc<VlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FormulaRecognizer for VlmFormulaRecognizer {
    async fn recognize_formula(&self, crop: &RgbImage) -> Result<String, RegionError> {
        let answer = self
            .client
            .ask(FORMULA_OCR_PROMPT, crop)
            .await
            .map_err(RegionError::Backend)?;
        parse_formula(&answer)
    }
}

fn parse_text_lines(answer: &str) -> Result<Vec<TextLine>, RegionError> {
    let json = extract_json(answer)
        .ok_or_else(|| RegionError::MalformedResponse("no JSON array in answer".into()))?;
    let lines: Vec<TextLine> =
        serde_json::from_str(&json).map_err(|e| RegionError::MalformedResponse(e.to_string()))?;
    Ok(lines
        .into_iter()
        .filter_map(|line| {
            let text = clean_text(&line.text);
            (!text.is_empty()).then_some(TextLine {
                text,
                confidence: line.confidence.filter(|c| c.is_finite()),
            })
        })
        .collect())
}

#[derive(Deserialize)]
struct FormulaAnswer {
    latex: String,
}

fn parse_formula(answer: &str) -> Result<String, RegionError> {
    // Some models answer with bare LaTeX despite the prompt.
    let Some(json) = extract_json(answer).filter(|j| j.starts_with('{')) else {
        return Ok(clean_latex(answer));
    };
    match serde_json::from_str::<FormulaAnswer>(&json) {
        Ok(parsed) => Ok(clean_latex(&parsed.latex)),
        Err(_) if !answer.trim_start().starts_with('{') => Ok(clean_latex(answer)),
        Err(e) => Err(RegionError::MalformedResponse(e.to_string())),
    }
}
