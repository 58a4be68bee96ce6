//! JSON envelope returned to callers.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;

use crate::error::{ErrorKind, Result};

/// Body of a colorization response.
///
/// Serializes to `{"colorized_image": "<base64 PNG>"}` on success and to
/// `{"error": "...", "kind": "..."}` on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Colorized { colorized_image: String },
    Failed { error: String, kind: ErrorKind },
}

impl Response {
    /// Wrap the outcome of a colorization request.
    #[must_use]
    pub fn from_result(result: Result<Vec<u8>>) -> Self {
        match result {
            Ok(png) => Self::Colorized {
                colorized_image: STANDARD.encode(png),
            },
            Err(err) => {
                tracing::error!("Error during colorization: {err}");
                Self::Failed {
                    error: format!("an error occurred during processing: {err}"),
                    kind: err.kind(),
                }
            }
        }
    }

    /// Whether the request succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Colorized { .. })
    }

    /// Decoded PNG bytes of a successful response.
    #[must_use]
    pub fn image_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Colorized { colorized_image } => STANDARD.decode(colorized_image).ok(),
            Self::Failed { .. } => None,
        }
    }

    /// Serialize to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
