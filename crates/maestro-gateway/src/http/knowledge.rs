use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use maestro_knowledge::discipline;
use maestro_knowledge::resolve::normalize_token;

use crate::app::AppState;
use crate::http::{internal, not_found, ApiError};

/// Ordered discipline tree; MEP is a synthetic parent over Mechanical,
/// Electrical and Plumbing.
pub async fn disciplines(State(state): State<Arc<AppState>>) -> Json<Value> {
    let counts: Vec<(String, usize)> = {
        let project = state.knowledge.read();
        project
            .pages
            .values()
            .map(|p| (p.discipline.clone(), 1))
            .collect()
    };
    let tree = discipline::discipline_tree(counts);
    Json(json!({ "disciplines": tree }))
}

#[derive(Debug, Deserialize)]
pub struct PagesQuery {
    pub discipline: Option<String>,
}

pub async fn pages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PagesQuery>,
) -> Json<Value> {
    let project = state.knowledge.read();
    let mut pages: Vec<Value> = project
        .pages
        .values()
        .filter(|p| {
            query.discipline.as_deref().map_or(true, |f| {
                discipline::matches_filter(discipline::canonicalize(&p.discipline), f)
            })
        })
        .map(|p| {
            json!({
                "name": p.name,
                "type": p.page_type,
                "discipline": p.discipline,
                "canonical_discipline": discipline::canonicalize(&p.discipline),
                "region_count": p.regions.len(),
                "pointer_count": p.pointers.len(),
            })
        })
        .collect();
    pages.sort_by_key(|p| p["name"].as_str().unwrap_or("").to_lowercase());
    Json(json!({ "pages": pages }))
}

pub async fn page_detail(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let page = state
        .knowledge
        .get_page(&name)
        .ok_or_else(|| not_found(format!("page '{name}'")))?;

    let regions: Vec<Value> = page
        .regions
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "type": r.region_type,
                "label": r.label,
                "detail_number": r.detail_number,
                "has_pass2": !r.id.is_empty() && page.pointers.contains_key(&r.id),
            })
        })
        .collect();

    Ok(Json(json!({
        "name": page.name,
        "discipline": page.discipline,
        "type": page.page_type,
        "sheet_reflection": page.sheet_reflection,
        "cross_references": page.cross_references,
        "regions": regions,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// Substring search across page summaries and pointer content.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<Value> {
    let needle = query.q.to_lowercase();
    let project = state.knowledge.read();
    let mut results: Vec<Value> = Vec::new();

    if !needle.is_empty() {
        for (page_name, page) in &project.pages {
            if page.sheet_reflection.to_lowercase().contains(&needle)
                || page_name.to_lowercase().contains(&needle)
            {
                results.push(json!({
                    "type": "page",
                    "match": page_name,
                    "discipline": page.discipline,
                }));
            }
            for (pointer_id, pointer) in &page.pointers {
                if pointer.content_markdown.to_lowercase().contains(&needle) {
                    results.push(json!({
                        "type": "pointer",
                        "match": format!("{page_name}/{pointer_id}"),
                        "label": pointer.label,
                    }));
                }
            }
        }
    }

    Json(json!({ "query": query.q, "results": results }))
}

#[derive(Debug, Deserialize)]
pub struct ThumbQuery {
    pub w: Option<u32>,
    pub q: Option<u8>,
}

/// JPEG thumbnail of a page image, cached to disk by (width, quality).
pub async fn page_thumb(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ThumbQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let width = query.w.unwrap_or(480).clamp(32, 4096);
    let quality = query.q.unwrap_or(70).clamp(10, 95);

    let page = state
        .knowledge
        .get_page(&name)
        .ok_or_else(|| not_found(format!("page '{name}'")))?;
    let source = PathBuf::from(&page.path).join("page.png");
    if !source.exists() {
        return Err(not_found(format!("image for '{name}'")));
    }

    let cache_path = state
        .thumb_cache_dir
        .join(format!("{}_{width}_{quality}.jpg", normalize_token(&name)));

    let bytes = if cache_path.exists() {
        tokio::fs::read(&cache_path).await.map_err(internal)?
    } else {
        let cache_for_task = cache_path.clone();
        tokio::task::spawn_blocking(move || render_thumb(&source, &cache_for_task, width, quality))
            .await
            .map_err(internal)?
            .map_err(internal)?
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/jpeg")],
        bytes,
    ))
}

fn render_thumb(
    source: &std::path::Path,
    cache_path: &std::path::Path,
    width: u32,
    quality: u8,
) -> Result<Vec<u8>, String> {
    let img = image::open(source).map_err(|e| format!("cannot open page image: {e}"))?;
    let (w, h) = (img.width().max(1), img.height().max(1));
    let height = ((h as u64 * width as u64) / w as u64).max(1) as u32;
    let thumb = img.resize_exact(width, height, image::imageops::FilterType::Triangle);
    let rgb = thumb.to_rgb8();

    let mut jpeg = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
        .encode_image(&rgb)
        .map_err(|e| format!("thumbnail encode failed: {e}"))?;

    if let Some(parent) = cache_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(cache_path, &jpeg);
    Ok(jpeg)
}
