//! Shared state handed to every handler.

use crate::{
    config::ServerConfig,
    services::{proxy_service::ProxyService, sas_service::SasService, storage_service::StorageService},
};
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub sas: SasService,
    pub proxy: ProxyService,
}

impl AppState {
    /// `public_url` is the resolved base under which store routes are reachable.
    pub fn new(cfg: &ServerConfig, db: SqlitePool, public_url: &str) -> Result<Self> {
        let storage =
            StorageService::new(Arc::new(db), cfg.storage_dir.clone(), cfg.max_upload_bytes);
        let sas = SasService::new(cfg.signing_key.as_bytes(), public_url)
            .context("initialising URL signer")?;
        let proxy = ProxyService::new(public_url).context("building proxy service")?;
        Ok(Self {
            storage,
            sas,
            proxy,
        })
    }
}
