//! Configuration types for layout processing.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Setters clamp values into their valid range;
//! [`PipelineConfigBuilder::build`] rejects combinations that cannot work.

use crate::error::LayoutError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound on VLM retries per call.
pub const MAX_RETRIES: u32 = 10;

/// Configuration for one [`crate::process::DocumentPipeline`].
///
/// # Example
/// ```rust
/// use edgequake_layout::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .scale_factor(2.0)
///     .confidence_floor(0.25)
///     .region_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Oversampling applied to both axes when rasterising PDF pages. Default: 2.0.
    ///
    /// Page coordinates in the output are in this scaled pixel space.
    pub scale_factor: f32,

    /// Cap on either edge of a rendered page, in pixels. Default: 6000.
    ///
    /// Keeps an oversized page (posters, drawings) from allocating hundreds
    /// of megabytes; the other edge scales proportionally.
    pub max_rendered_pixels: u32,

    /// Detections scored below this are discarded. Default: 0.25.
    pub confidence_floor: f32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Per-region recognizer timeout in seconds. Default: 60.
    pub region_timeout_secs: u64,

    /// Per-page detector timeout in seconds. Default: 120.
    pub detection_timeout_secs: u64,

    /// Timeout for the whole-document table pass in seconds. Default: 300.
    pub table_timeout_secs: u64,

    /// Run the table pass and merge its output. Default: true.
    pub extract_tables: bool,

    /// Write annotated page previews to the artifact store. Default: true.
    pub save_previews: bool,

    /// Root directory of the filesystem artifact store. Default: `artifacts`.
    pub artifact_dir: PathBuf,

    /// Preview drawing style.
    pub annotation: AnnotationStyle,

    /// Vision model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0 (transcription, not creativity).
    pub temperature: f32,

    /// Maximum tokens per VLM answer. Default: 2048.
    pub max_tokens: usize,

    /// Retries on a failed VLM call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scale_factor: 2.0,
            max_rendered_pixels: 6000,
            confidence_floor: 0.25,
            password: None,
            region_timeout_secs: 60,
            detection_timeout_secs: 120,
            table_timeout_secs: 300,
            extract_tables: true,
            save_previews: true,
            artifact_dir: PathBuf::from("artifacts"),
            annotation: AnnotationStyle::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("scale_factor", &self.scale_factor)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("confidence_floor", &self.confidence_floor)
            .field("region_timeout_secs", &self.region_timeout_secs)
            .field("detection_timeout_secs", &self.detection_timeout_secs)
            .field("table_timeout_secs", &self.table_timeout_secs)
            .field("extract_tables", &self.extract_tables)
            .field("save_previews", &self.save_previews)
            .field("artifact_dir", &self.artifact_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn scale_factor(mut self, factor: f32) -> Self {
        self.config.scale_factor = factor.clamp(0.5, 6.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn confidence_floor(mut self, floor: f32) -> Self {
        self.config.confidence_floor = floor.clamp(0.0, 1.0);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn region_timeout_secs(mut self, secs: u64) -> Self {
        self.config.region_timeout_secs = secs;
        self
    }

    pub fn detection_timeout_secs(mut self, secs: u64) -> Self {
        self.config.detection_timeout_secs = secs;
        self
    }

    pub fn table_timeout_secs(mut self, secs: u64) -> Self {
        self.config.table_timeout_secs = secs;
        self
    }

    pub fn extract_tables(mut self, v: bool) -> Self {
        self.config.extract_tables = v;
        self
    }

    pub fn save_previews(mut self, v: bool) -> Self {
        self.config.save_previews = v;
        self
    }

    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.artifact_dir = dir.into();
        self
    }

    pub fn annotation(mut self, style: AnnotationStyle) -> Self {
        self.config.annotation = style;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Clamped to 0–10.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, LayoutError> {
        let c = &self.config;
        if !(0.5..=6.0).contains(&c.scale_factor) {
            return Err(LayoutError::InvalidConfig(format!(
                "scale factor must be 0.5–6.0, got {}",
                c.scale_factor
            )));
        }
        if c.region_timeout_secs == 0
            || c.detection_timeout_secs == 0
            || c.table_timeout_secs == 0
        {
            return Err(LayoutError::InvalidConfig(
                "timeouts must be at least 1 second".into(),
            ));
        }
        if c.max_retries > MAX_RETRIES {
            return Err(LayoutError::InvalidConfig(format!(
                "max_retries must be at most {MAX_RETRIES}, got {}",
                c.max_retries
            )));
        }
        if c.max_tokens == 0 {
            return Err(LayoutError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

/// How annotated previews are drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStyle {
    /// Box outline and label background colour (RGB).
    pub box_color: [u8; 3],
    pub text_color: [u8; 3],
    /// Label glyph height in pixels.
    pub font_px: f32,
    pub text_padding: u32,
    pub line_thickness: u32,
    /// TrueType font for label text. Without one, boxes and label tabs are
    /// drawn but no glyphs.
    pub font_path: Option<PathBuf>,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            box_color: [49, 95, 214],
            text_color: [255, 255, 255],
            font_px: 14.0,
            text_padding: 5,
            line_thickness: 2,
            font_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.scale_factor, 2.0);
        assert_eq!(c.confidence_floor, 0.25);
        assert!(c.extract_tables);
        assert!(c.save_previews);
    }

    #[test]
    fn setters_clamp() {
        let c = PipelineConfig::builder()
            .scale_factor(100.0)
            .confidence_floor(-1.0)
            .temperature(9.0)
            .build()
            .unwrap();
        assert_eq!(c.scale_factor, 6.0);
        assert_eq!(c.confidence_floor, 0.0);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn retries_are_capped() {
        let c = PipelineConfig::builder().max_retries(1000).build().unwrap();
        assert_eq!(c.max_retries, MAX_RETRIES);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = PipelineConfig::builder()
            .region_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeouts"));
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", PipelineConfig::default());
        assert!(dbg.contains("scale_factor"));
        assert!(!dbg.contains("password"));
    }
}
