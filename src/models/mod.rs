//! Data models shared by the store and the upload client.
//!
//! `container` and `object` map to SQLite tables via `sqlx::FromRow`; the
//! rest never touch the database and only travel over HTTP or stay in
//! client memory.

pub mod access_token;
pub mod container;
pub mod listing;
pub mod object;
pub mod upload;
