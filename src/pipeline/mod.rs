//! Pipeline stages for layout analysis.
//!
//! Each submodule implements exactly one step, so each is independently
//! testable and any model-backed stage can be swapped behind its trait.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ detect ──▶ route ──▶ aggregate ──▶ tables
//! (path)    (pdfium)   (boxes)   (OCR…)    (order,dedup)  (merge)
//!                         │
//!                         └──▶ annotate (preview artifact)
//! ```
//!
//! 1. [`input`]      classify the file and check magic bytes
//! 2. [`render`]     rasterise pages in `spawn_blocking` (pdfium is not
//!    async-safe) or decode a raster image as one page
//! 3. [`detect`]     region detection, confidence floor, label resolution
//! 4. [`annotate`]   boxes and labels drawn on a copy of the page
//! 5. [`route`]      per-class dispatch to [`recognize`] backends, with a
//!    timeout and fault boundary around every call
//! 6. [`aggregate`]  reading order, per-page text dedup, `PageResult`
//! 7. [`tables`]     whole-document table pass merged by page index
//!
//! [`encode`], [`llm`] and [`postprocess`] support the vision-LLM backends.

pub mod aggregate;
pub mod annotate;
pub mod detect;
pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod recognize;
pub mod render;
pub mod route;
pub mod tables;
