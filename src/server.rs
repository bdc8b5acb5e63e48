//! Server bootstrap: bind, open the metadata DB, build the router, serve.

use crate::{config::ServerConfig, db, routes::routes::routes, state::AppState};
use anyhow::{Context, Result};
use axum::Router;
use std::io::ErrorKind;
use tokio::net::TcpListener;

/// Bind `cfg.addr()`, falling back to loopback when a wildcard bind is refused.
pub async fn bind(cfg: &ServerConfig) -> Result<TcpListener> {
    let addr = cfg.addr();
    match TcpListener::bind(&addr).await {
        Ok(listener) => Ok(listener),
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            Ok(TcpListener::bind(&fallback_addr).await?)
        }
        Err(err) => Err(err).with_context(|| format!("binding {}", addr)),
    }
}

/// Configured public URL, or one derived from the bound address.
pub fn resolve_public_url(cfg: &ServerConfig, listener: &TcpListener) -> Result<String> {
    if let Some(url) = &cfg.public_url {
        return Ok(url.trim_end_matches('/').to_string());
    }
    let local = listener.local_addr()?;
    let host = if local.ip().is_unspecified() {
        "127.0.0.1".to_string()
    } else {
        local.ip().to_string()
    };
    Ok(format!("http://{}:{}", host, local.port()))
}

/// Open the database, apply the schema, make sure the payload directory
/// exists and return the ready-to-serve router.
pub async fn build_app(cfg: &ServerConfig, public_url: &str) -> Result<Router> {
    tokio::fs::create_dir_all(&cfg.storage_dir)
        .await
        .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;

    let pool = db::connect(&cfg.database_url).await?;
    db::run_migrations(&pool).await?;

    let state = AppState::new(cfg, pool, public_url)?;
    Ok(routes(cfg.max_upload_bytes).with_state(state))
}

/// Run until the process is stopped.
pub async fn run(cfg: ServerConfig) -> Result<()> {
    let listener = bind(&cfg).await?;
    let public_url = resolve_public_url(&cfg, &listener)?;
    let app = build_app(&cfg, &public_url).await?;

    tracing::info!(
        "Server listening on http://{} (public url {})",
        listener.local_addr()?,
        public_url
    );
    axum::serve(listener, app).await?;
    Ok(())
}
