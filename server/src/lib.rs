use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tfidf_core::persist::IndexPaths;
use tfidf_core::tokenizer::{tokenize, transform};
use tfidf_core::{Document, DocumentStore, Error as CoreError, IdfWeighting, IndexConfig, StoreKind, TfIdfIndex};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;
const SNIPPET_BEFORE: usize = 100;
const SNIPPET_LEN: usize = 300;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f64,
    pub snippet: Option<String>,
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub added: usize,
    pub duplicates: Vec<String>,
}

pub struct ServerConfig {
    pub index_dir: PathBuf,
    pub store: StoreKind,
    pub idf: IdfWeighting,
    /// Required in `X-ADMIN-TOKEN` by the write endpoints; they are disabled when unset.
    pub admin_token: Option<String>,
    /// Comma-separated origins; any origin when unset.
    pub cors_allow_origin: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub index_dir: PathBuf,
    pub index: Arc<TfIdfIndex>,
    pub store: Arc<RwLock<Box<dyn DocumentStore>>>,
    pub admin_token: Option<String>,
}

/// Load the index directory into memory, or start empty when nothing has been written yet.
pub fn load_state(config: &ServerConfig) -> Result<AppState> {
    let paths = IndexPaths::new(&config.index_dir);
    let index_config = IndexConfig { idf: config.idf };
    let (index, store) = if !paths.index().exists() && !paths.documents().exists() {
        tracing::warn!(dir = %config.index_dir.display(), "no persisted index found, starting empty");
        (TfIdfIndex::with_config(index_config), config.store.empty())
    } else {
        let index = TfIdfIndex::read_with_config(&paths.index(), index_config)?;
        let store = config.store.read(&paths.documents())?;
        (index, store)
    };
    tracing::info!(num_docs = index.total_documents(), num_terms = index.num_terms(), store = %config.store, "index loaded");
    Ok(AppState {
        index_dir: config.index_dir.clone(),
        index: Arc::new(index),
        store: Arc::new(RwLock::new(store)),
        admin_token: config.admin_token.clone(),
    })
}

pub fn build_app(config: ServerConfig) -> Result<Router> {
    let app_state = load_state(&config)?;

    let cors = match &config.cors_allow_origin {
        Some(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/batch", post(index_batch))
        .route("/index/commit", post(index_commit))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);
    Ok(app)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let terms = tokenize(&params.q);
    let k = params.k.min(MAX_K);

    let mut scored = state.index.search_scored(terms.as_slice(), usize::MAX);
    let total_hits = scored.len();
    scored.truncate(k);

    let store = state.store.read();
    let results = scored
        .into_iter()
        .filter_map(|(doc_id, score)| {
            // Batches fill the store before releasing its lock, so indexed ids resolve.
            let doc = store.get_by_doc_id(&doc_id)?;
            let snippet = snippet_from_text(&doc.text, &terms);
            Some(SearchHit { doc_id, score, snippet })
        })
        .collect();

    let elapsed = start.elapsed();
    Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results })
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<Document>, (StatusCode, String)> {
    match state.store.read().get_by_doc_id(&doc_id) {
        Some(doc) => Ok(Json(doc.clone())),
        None => Err((StatusCode::NOT_FOUND, format!("document '{doc_id}' not found"))),
    }
}

fn snippet_from_text(text: &str, terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    // first match (case-insensitive) of any query term
    let first_idx = terms.iter().find_map(|term| term_pattern(term)?.find(text).map(|m| m.start()));
    let snippet = match first_idx {
        Some(idx) => {
            let start = floor_char_boundary(text, idx.saturating_sub(SNIPPET_BEFORE));
            let end = floor_char_boundary(text, (start + SNIPPET_LEN).min(text.len()));
            text[start..end].to_string()
        }
        None => text.chars().take(SNIPPET_LEN).collect(),
    };
    Some(highlight_terms(&snippet, terms))
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn term_pattern(term: &str) -> Option<regex::Regex> {
    if term.trim().is_empty() { return None; }
    regex::RegexBuilder::new(&regex::escape(term)).case_insensitive(true).build().ok()
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for pat in terms.iter().filter_map(|t| term_pattern(t)) {
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

// --- Admin endpoints ---
async fn index_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(docs): Json<Vec<Document>>,
) -> Result<(StatusCode, Json<BatchResponse>), (StatusCode, String)> {
    authorize(&state, &headers)?;
    let mut added = 0;
    let mut duplicates = Vec::new();
    // Held across index and store updates so a commit never sees one without the other.
    let mut store = state.store.write();
    for doc in docs {
        match state.index.add_document(&transform(&doc)) {
            Ok(()) => {
                store.add_document(doc);
                added += 1;
            }
            Err(CoreError::DuplicateDocument { doc_id }) => duplicates.push(doc_id),
            Err(e) => return Err(internal(e)),
        }
    }
    tracing::info!(added, duplicates = duplicates.len(), "indexed batch");
    let status = if duplicates.is_empty() { StatusCode::OK } else { StatusCode::CONFLICT };
    Ok((status, Json(BatchResponse { added, duplicates })))
}

async fn index_commit(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let paths = IndexPaths::new(&state.index_dir);
    paths.ensure_root().map_err(internal)?;
    let store = state.store.read();
    store.write(&paths.documents()).map_err(internal)?;
    state.index.write(&paths.index()).map_err(internal)?;
    drop(store);
    Ok(Json(serde_json::json!({
        "total_documents": state.index.total_documents(),
        "num_terms": state.index.num_terms(),
    })))
}

fn internal(e: CoreError) -> (StatusCode, String) {
    tracing::error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
