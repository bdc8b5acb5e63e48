//! Defines every route served by `blob-upload serve`.
//!
//! ## Structure
//! - **Application API**
//!   - `POST /api/sas`  : issue a capability URL
//!   - `POST /api/files`: proxied transfer
//!   - `GET  /api/list` : list a container
//!
//! - **Store**
//!   - `PUT  /{container}/{*key}`: signed write
//!   - `GET  /{container}/{*key}`: public read
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        api_handlers::{issue_sas, list_container, upload_via_proxy},
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, put_object},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Room for multipart boundaries and the `sasTokenUrl` field.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the router. `max_upload_bytes` caps buffered multipart bodies on the
/// proxy route; streamed store writes are capped by `StorageService`.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/sas", post(issue_sas))
        .route(
            "/api/files",
            post(upload_via_proxy).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/list", get(list_container))
        .route("/{container}/{*key}", put(put_object).get(get_object))
}
