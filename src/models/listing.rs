//! Container listings and the JSON bodies exchanged with the API server.

use serde::{Deserialize, Serialize};

const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];

/// A full enumeration of a container at one point in time.
///
/// Entries keep the store's enumeration order and are never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerListing {
    pub container_name: String,
    pub entries: Vec<String>,
}

impl ContainerListing {
    /// Whether a presentation layer should render `entry` as an image.
    pub fn is_image(entry: &str) -> bool {
        let lower = entry.to_ascii_lowercase();
        IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
    }
}

/// Body returned by `POST /api/sas`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SasResponse {
    pub url: String,
}

/// Body returned by `GET /api/list`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub list: Vec<String>,
}
