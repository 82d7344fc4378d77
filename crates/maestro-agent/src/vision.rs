//! Vision highlight worker.
//!
//! `highlight_on_page` creates a pending highlight row and hands off to
//! [`run_highlight_worker`], which runs entirely off the request/response
//! path: it downscales the page image, asks Gemini (with code execution) to
//! print rectangles in pixel coordinates, parses the execution trace, and
//! drives the highlight row to `complete` or `failed`. The pending row is
//! never left stranded.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use image::imageops::FilterType;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use maestro_core::config::GoogleConfig;
use maestro_store::types::BBox;
use maestro_store::Store;

use crate::provider::http_client;

/// Payload ceiling for the prepared image.
const MAX_IMAGE_BYTES: u64 = 4_000_000;
/// Longest-side ceiling accepted by the vision model.
const MAX_IMAGE_DIM: u32 = 7999;
const JPEG_QUALITY: u8 = 80;

pub const VISION_MODEL: &str = "gemini-3-flash-preview";

/// Everything the background worker needs, detached from the tool context.
pub struct HighlightJob {
    pub store: Arc<Store>,
    pub google: GoogleConfig,
    pub highlight_id: i64,
    pub workspace_slug: String,
    pub page_name: String,
    pub mission: String,
    pub image_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub timeout: Duration,
}

/// Prepared image: JPEG bytes plus the frame dimensions the model sees.
pub struct PreparedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Downscale and re-encode a page image to fit the vision model's payload
/// limits: ≤ 4 MB, longest side ≤ 7999 px.
pub fn prepare_image(path: &Path) -> Result<PreparedImage, String> {
    let img = image::open(path).map_err(|e| format!("cannot open image: {e}"))?;
    let (w, h) = (img.width(), img.height());

    let mut scale = f64::min(
        MAX_IMAGE_DIM as f64 / w as f64,
        MAX_IMAGE_DIM as f64 / h as f64,
    )
    .min(1.0);
    let oversized = fs::metadata(path).map(|m| m.len() > MAX_IMAGE_BYTES).unwrap_or(false);
    // Large rasters get a hard half-scale so the JPEG lands under the cap.
    if oversized || (w as u64 * h as u64) > 4_000_000 {
        scale = scale.min(0.5);
    }

    let (new_w, new_h) = (
        ((w as f64 * scale) as u32).max(1),
        ((h as f64 * scale) as u32).max(1),
    );
    let resized = if (new_w, new_h) != (w, h) {
        img.resize_exact(new_w, new_h, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = resized.to_rgb8();
    let mut jpeg = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder
        .encode_image(&rgb)
        .map_err(|e| format!("JPEG encode failed: {e}"))?;

    Ok(PreparedImage {
        jpeg,
        width: new_w,
        height: new_h,
    })
}

/// Extract candidate rectangles from a free-form model trace.
///
/// Accepted syntaxes: `(x1, y1, x2, y2)`, `[x1, y1, x2, y2]` and
/// `box_2d=[x1, y1, x2, y2]`, all in pixel coordinates of the prepared
/// frame. Every candidate is normalized to `{x, y, w, h} ∈ [0, 1]`, clamped,
/// validated, and deduplicated at 4-decimal precision independently —
/// invalid candidates are dropped, never escalated.
pub fn extract_bboxes(trace: &[String], image_width: u32, image_height: u32) -> Vec<BBox> {
    if image_width == 0 || image_height == 0 {
        return Vec::new();
    }
    let quad = Regex::new(
        r"[\(\[]\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*[\)\]]",
    )
    .expect("static regex");

    let (fw, fh) = (image_width as f64, image_height as f64);
    let mut boxes: Vec<BBox> = Vec::new();
    let mut seen: Vec<(i64, i64, i64, i64)> = Vec::new();

    for entry in trace {
        for caps in quad.captures_iter(entry) {
            let nums: Vec<f64> = (1..=4)
                .filter_map(|i| caps.get(i))
                .filter_map(|m| m.as_str().parse().ok())
                .collect();
            if nums.len() != 4 {
                continue;
            }
            let (x1, y1, x2, y2) = (
                nums[0].clamp(0.0, fw),
                nums[1].clamp(0.0, fh),
                nums[2].clamp(0.0, fw),
                nums[3].clamp(0.0, fh),
            );
            let (w, h) = (x2 - x1, y2 - y1);
            if w <= 0.0 || h <= 0.0 {
                continue;
            }
            let bbox = BBox {
                x: x1 / fw,
                y: y1 / fh,
                w: w / fw,
                h: h / fh,
            };
            let key = (
                round4(bbox.x),
                round4(bbox.y),
                round4(bbox.w),
                round4(bbox.h),
            );
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            boxes.push(bbox);
        }
    }
    boxes
}

fn round4(v: f64) -> i64 {
    (v * 10_000.0).round() as i64
}

/// Drive one highlight request to a terminal state.
pub async fn run_highlight_worker(job: HighlightJob) {
    match attempt_highlight(&job).await {
        Ok(boxes) => {
            info!(
                highlight_id = job.highlight_id,
                page = %job.page_name,
                boxes = boxes.len(),
                "highlight complete"
            );
            if let Err(e) = job.store.complete_highlight(job.highlight_id, &boxes) {
                warn!(highlight_id = job.highlight_id, error = %e, "complete_highlight failed");
                let _ = job.store.fail_highlight(job.highlight_id);
            }
        }
        Err(reason) => {
            warn!(
                highlight_id = job.highlight_id,
                page = %job.page_name,
                %reason,
                "highlight failed"
            );
            if let Err(e) = job.store.fail_highlight(job.highlight_id) {
                warn!(highlight_id = job.highlight_id, error = %e, "fail_highlight failed");
            }
        }
    }
}

async fn attempt_highlight(job: &HighlightJob) -> Result<Vec<BBox>, String> {
    let image_path = job.image_path.clone();
    let prepared = tokio::task::spawn_blocking(move || prepare_image(&image_path))
        .await
        .map_err(|e| format!("image task panicked: {e}"))??;

    let trace = call_vision_model(job, &prepared).await?;
    save_trace_artifact(job, &trace);

    let boxes = extract_bboxes(&trace, prepared.width, prepared.height);
    if boxes.is_empty() {
        return Err("no rectangles found in vision trace".to_string());
    }
    Ok(boxes)
}

/// One-shot Gemini call with code execution enabled. Returns every textual
/// part of the response — prose, emitted code, and execution output — as
/// the trace to parse.
async fn call_vision_model(
    job: &HighlightJob,
    prepared: &PreparedImage,
) -> Result<Vec<String>, String> {
    let client = http_client(job.timeout);
    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        job.google.base_url, VISION_MODEL
    );

    let prompt = format!(
        "You are locating regions on a construction plan page.\n\n\
         PAGE: {page}\n\
         MISSION: {mission}\n\n\
         The image is {w}x{h} pixels. Use code execution to find every area \
         relevant to the mission and print one rectangle per area as pixel \
         coordinates in the form (x1, y1, x2, y2). Print only rectangles that \
         directly serve the mission.",
        page = job.page_name,
        mission = job.mission,
        w = prepared.width,
        h = prepared.height,
    );

    let body = serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": "image/jpeg",
                        "data": base64::engine::general_purpose::STANDARD.encode(&prepared.jpeg),
                    }
                },
                { "text": prompt }
            ]
        }],
        "tools": [{ "codeExecution": {} }],
        "generationConfig": { "temperature": 0 }
    });

    let resp = client
        .post(&url)
        .header("x-goog-api-key", &job.google.api_key)
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("vision request failed: {e}"))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(format!("vision API error ({status}): {text}"));
    }

    let value: Value = resp
        .json()
        .await
        .map_err(|e| format!("vision response parse failed: {e}"))?;

    let mut trace = Vec::new();
    if let Some(parts) = value
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                trace.push(text.to_string());
            }
            if let Some(code) = part.pointer("/executableCode/code").and_then(|c| c.as_str()) {
                trace.push(code.to_string());
            }
            if let Some(output) = part
                .pointer("/codeExecutionResult/output")
                .and_then(|o| o.as_str())
            {
                trace.push(output.to_string());
            }
        }
    }

    if trace.is_empty() {
        return Err("vision model returned no content".to_string());
    }
    Ok(trace)
}

/// Best-effort trace artifact beside the workspace data, for debugging
/// missed highlights.
fn save_trace_artifact(job: &HighlightJob, trace: &[String]) {
    let dir = job
        .artifact_dir
        .join(&job.workspace_slug)
        .join("highlights");
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let payload = serde_json::json!({
        "tool": "highlight_on_page",
        "highlight_id": job.highlight_id,
        "workspace_slug": job.workspace_slug,
        "page_name": job.page_name,
        "mission": job.mission,
        "model": VISION_MODEL,
        "trace": trace,
    });
    let path = dir.join(format!("highlight_{}_trace.json", job.highlight_id));
    let _ = fs::write(path, serde_json::to_string_pretty(&payload).unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rectangle_call_is_parsed_and_normalized() {
        let trace = t(&["draw.rectangle((100, 200, 400, 500), outline='red')"]);
        let boxes = extract_bboxes(&trace, 1000, 1000);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], BBox { x: 0.1, y: 0.2, w: 0.3, h: 0.3 });
    }

    #[test]
    fn duplicate_rects_across_entries_are_deduped() {
        let trace = t(&[
            "crop = image.crop((50, 60, 350, 260))",
            "image.crop((50,60,350,260))",
        ]);
        let boxes = extract_bboxes(&trace, 1000, 1000);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], BBox { x: 0.05, y: 0.06, w: 0.3, h: 0.2 });
    }

    #[test]
    fn box_2d_syntax_is_accepted() {
        let trace = t(&["Found object with box_2d=[10,20,60,80]"]);
        let boxes = extract_bboxes(&trace, 100, 100);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], BBox { x: 0.1, y: 0.2, w: 0.5, h: 0.6 });
    }

    #[test]
    fn out_of_frame_rects_clamp_and_degenerates_drop() {
        let trace = t(&[
            "draw.rectangle((-10, -10, 120, 120))",
            "draw.rectangle((40, 40, 40, 80))",
        ]);
        let boxes = extract_bboxes(&trace, 100, 100);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], BBox { x: 0.0, y: 0.0, w: 1.0, h: 1.0 });
    }

    #[test]
    fn noisy_trace_yields_nothing() {
        let trace = t(&["no coordinates here", "done"]);
        assert!(extract_bboxes(&trace, 1000, 1000).is_empty());
    }

    #[test]
    fn zero_frame_is_rejected() {
        let trace = t(&["(1, 2, 3, 4)"]);
        assert!(extract_bboxes(&trace, 0, 100).is_empty());
    }
}
