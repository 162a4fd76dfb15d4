use std::time::Duration;
use thiserror::Error;

/// Failures reported by an [`ObjectStore`](crate::object_store::ObjectStore)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("failed to sign request: {0}")]
    Signing(String),

    #[error("object store error: {0}")]
    Backend(String),
}

/// Errors surfaced by the asset manager, one variant per failing stage
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("could not decode image: {0}")]
    Decode(String),

    #[error("could not encode {label} variant: {reason}")]
    Encode { label: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid asset name {0:?}")]
    InvalidAssetName(String),

    #[error("invalid composite key {0:?}, expected <label>/<asset name>")]
    InvalidKey(String),

    #[error("upload of {asset_name} failed at {label}: {source}")]
    UploadGroup {
        asset_name: String,
        label: String,
        #[source]
        source: StoreError,
    },

    #[error("listing assets failed: {0}")]
    List(#[source] StoreError),

    #[error("signing {key} failed: {source}")]
    Sign {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("fetching {key} failed: {source}")]
    Fetch {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("deleting {asset_name} failed: {source}")]
    Delete {
        asset_name: String,
        #[source]
        source: StoreError,
    },
}

impl AssetError {
    /// Underlying store failure, if this error came from the store
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            AssetError::UploadGroup { source, .. }
            | AssetError::Sign { source, .. }
            | AssetError::Fetch { source, .. }
            | AssetError::Delete { source, .. }
            | AssetError::List(source) => Some(source),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.store_error(), Some(StoreError::Timeout { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.store_error(), Some(StoreError::NotFound { .. }))
    }

    /// Stable machine-readable code for API responses and metrics labels
    pub fn code(&self) -> &'static str {
        if self.is_timeout() {
            return "TIMEOUT";
        }
        match self {
            AssetError::Decode(_) => "DECODE_ERROR",
            AssetError::Encode { .. } => "ENCODE_ERROR",
            AssetError::Internal(_) => "INTERNAL_ERROR",
            AssetError::InvalidAssetName(_) => "INVALID_ASSET_NAME",
            AssetError::InvalidKey(_) => "INVALID_KEY",
            AssetError::UploadGroup { .. } => "UPLOAD_ERROR",
            AssetError::List(_) => "LIST_ERROR",
            AssetError::Sign { .. } => "SIGN_ERROR",
            AssetError::Fetch { source: StoreError::NotFound { .. }, .. } => "NOT_FOUND",
            AssetError::Fetch { .. } => "FETCH_ERROR",
            AssetError::Delete { .. } => "DELETE_ERROR",
        }
    }
}
