//! Store routes addressed by capability URLs.
//! Writes stream the body to disk and require a valid `w` signature; reads
//! are public so listing addresses can be rendered directly.

use crate::{
    errors::AppError,
    models::{access_token::Permission, object::Object},
    services::sas_service::SasParams,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;

/// `PUT /{container}/{*key}?sp=&se=&sig=`
#[tracing::instrument(skip(state, params, headers, body))]
pub async fn put_object(
    State(state): State<AppState>,
    Path((container, key)): Path<(String, String)>,
    Query(params): Query<SasParams>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    state
        .sas
        .verify(&container, &key, &params, Permission::Write)
        .inspect_err(|err| tracing::warn!(%err, "rejected store write"))?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let object = state
        .storage
        .upload_object_stream(&container, &key, content_type, stream)
        .await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::CREATED;
    if let Some(etag) = object.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            response.headers_mut().insert(header::ETAG, value);
        }
    }
    Ok(response)
}

/// `GET /{container}/{*key}`: stream the payload.
pub async fn get_object(
    State(state): State<AppState>,
    Path((container, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, file) = state.storage.get_object_reader(&container, &key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object) {
    let content_type = meta
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0) as u64),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
