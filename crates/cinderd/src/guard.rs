//! Request admission: client IP resolution, same-origin enforcement and
//! per-endpoint rate-limit budgets.

use axum::http::HeaderMap;

use cinder_store::Decision;

use crate::api::{ApiError, AppState};

/// Per-endpoint budgets, requests per IP per minute.
#[derive(Debug, Clone, Copy)]
pub enum Scope {
    NotesCreate,
    NotesMeta,
    NotesValidate,
    NotesFetch,
    FilesUpload,
    FilesInitChunked,
    FilesChunkUpload,
    FilesValidate,
    FilesDownload,
}

impl Scope {
    pub fn name(self) -> &'static str {
        match self {
            Scope::NotesCreate => "notes:create",
            Scope::NotesMeta => "notes:meta",
            Scope::NotesValidate => "notes:validate",
            Scope::NotesFetch => "notes:fetch",
            Scope::FilesUpload => "files:upload",
            Scope::FilesInitChunked => "files:init-chunked",
            Scope::FilesChunkUpload => "files:chunk",
            Scope::FilesValidate => "files:validate",
            Scope::FilesDownload => "files:download",
        }
    }

    pub fn limit(self) -> u32 {
        match self {
            Scope::NotesCreate => 10,
            Scope::NotesMeta => 30,
            Scope::NotesValidate => 30,
            Scope::NotesFetch => 30,
            Scope::FilesUpload => 20,
            Scope::FilesInitChunked => 50,
            Scope::FilesChunkUpload => 100,
            Scope::FilesValidate => 200,
            Scope::FilesDownload => 200,
        }
    }
}

/// Proxy-aware client IP: first `X-Forwarded-For` value, then `X-Real-IP`,
/// then `CF-Connecting-IP`, else "unknown".
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    for header in ["x-real-ip", "cf-connecting-ip"] {
        if let Some(ip) = headers.get(header).and_then(|v| v.to_str().ok()) {
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }
    "unknown".to_string()
}

/// Refuse cross-origin state changes. Browsers identify themselves through
/// `Sec-Fetch-Site` / `Origin` / `Referer`; requests carrying none of these
/// (curl, the Rust client) pass.
pub fn require_same_origin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if let Some(site) = headers.get("sec-fetch-site").and_then(|v| v.to_str().ok()) {
        if site == "cross-site" {
            return Err(ApiError::CrossOrigin);
        }
    }

    let Some(allowed) = state.config.daemon.public_origin.as_deref() else {
        return Ok(());
    };

    if let Some(origin) = headers.get("origin").and_then(|v| v.to_str().ok()) {
        if origin != allowed {
            return Err(ApiError::CrossOrigin);
        }
    } else if let Some(referer) = headers.get("referer").and_then(|v| v.to_str().ok()) {
        let same = referer
            .strip_prefix(allowed)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
        if !same {
            return Err(ApiError::CrossOrigin);
        }
    }

    Ok(())
}

/// Rate-limit admission for one request. Backend failures admit (fail-open,
/// handled inside the limiter); a spent budget surfaces as 429 with a
/// Retry-After.
pub async fn admit(state: &AppState, headers: &HeaderMap, scope: Scope) -> Result<(), ApiError> {
    let ip = client_ip(headers);
    match state.limiter.check(&ip, scope.name(), scope.limit()).await {
        Decision::Admitted { .. } => Ok(()),
        Decision::Limited { retry_after_secs } => {
            state.metrics.rate_limited.inc();
            tracing::debug!(ip, scope = scope.name(), retry_after_secs, "rate limited");
            Err(ApiError::Core(cinder_core::CinderError::RateLimited {
                retry_after_secs,
            }))
        }
    }
}

/// Canonical lowercase-or-uppercase hyphenated UUID shape. Checked before
/// any id touches the store.
pub fn valid_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if *b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}
