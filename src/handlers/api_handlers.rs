//! Application API used by the upload client:
//! - `POST /api/sas`  : issue a capability URL for one object
//! - `POST /api/files`: proxied transfer (multipart `file` + `sasTokenUrl`)
//! - `GET  /api/list` : enumerate a container as object addresses

use crate::{
    errors::AppError,
    models::{
        access_token::PermissionSet,
        listing::{ListResponse, SasResponse},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SasRequest {
    pub file: Option<String>,
    pub permission: Option<String>,
    pub container: Option<String>,
    pub timerange: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub container: Option<String>,
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::bad_request(format!("missing `{}` query parameter", name)))
}

/// `POST /api/sas?file=&permission=&container=&timerange=`
///
/// Creates the container on first use, then signs a URL for `file` that is
/// valid for `timerange` minutes.
#[tracing::instrument(skip(state))]
pub async fn issue_sas(
    State(state): State<AppState>,
    Query(req): Query<SasRequest>,
) -> Result<Json<SasResponse>, AppError> {
    let file = required(req.file, "file")?;
    let permission = required(req.permission, "permission")?;
    let container = required(req.container, "container")?;
    let timerange = required(req.timerange, "timerange")?;

    let permissions: PermissionSet = permission
        .parse()
        .map_err(|err| AppError::bad_request(format!("permission `{}`: {}", permission, err)))?;

    crate::services::storage_service::ensure_key_safe(&file)?;
    state.storage.ensure_container(&container).await?;
    let issued = state.sas.issue(&container, &file, &permissions, timerange)?;

    tracing::info!(
        container = %container,
        file = %file,
        permission = %permissions,
        expiry = %issued.expiry,
        "Issued capability URL"
    );
    Ok(Json(SasResponse { url: issued.url }))
}

/// `POST /api/files`: receive the payload and write it to the store through
/// the supplied capability URL.
#[tracing::instrument(skip(state, multipart))]
pub async fn upload_via_proxy(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut sas_url: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart body: {}", err)))?
    {
        match field.name() {
            Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("reading `file`: {}", err)))?;
                file = Some((content_type, bytes));
            }
            Some("sasTokenUrl") => {
                let text = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("reading `sasTokenUrl`: {}", err))
                })?;
                sas_url = Some(text);
            }
            _ => {}
        }
    }

    let (content_type, bytes) =
        file.ok_or_else(|| AppError::bad_request("missing `file` field"))?;
    let sas_url = sas_url.ok_or_else(|| AppError::bad_request("missing `sasTokenUrl` field"))?;

    let size = bytes.len();
    state.proxy.forward(&sas_url, &content_type, bytes).await?;

    tracing::info!(size, "Proxied upload stored");
    Ok(StatusCode::OK)
}

/// `GET /api/list?container=`: addresses of every object, in key order.
#[tracing::instrument(skip(state))]
pub async fn list_container(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let container = required(q.container, "container")?;
    let objects = state.storage.list_objects(&container).await?;
    let list = objects
        .iter()
        .map(|obj| state.sas.object_url(&container, &obj.key))
        .collect();
    Ok(Json(ListResponse { list }))
}
