//! Capability-URL object store plus an upload client that writes to it either
//! directly or through a proxy, then refreshes the container listing.

pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;
