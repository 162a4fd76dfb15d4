//! Asset Service
//!
//! Stores uploaded images as groups of resized variants in S3 and serves
//! them back as one logical asset. The bucket is the only record of which
//! assets exist: an asset named `cat.png` is the set of objects
//! `<label>/cat.png`, one per configured variant label.
//!
//! ## Features
//!
//! - **Variant Derivation**: decode a base64 image once, resize it by every
//!   configured ratio and re-encode in the source format
//! - **Group Upload**: all variants are written concurrently and reported as
//!   one outcome, with optional rollback of partial uploads
//! - **Listing**: one prefix scan of the representative label plus a
//!   presigned URL per asset
//! - **Group Delete**: one batch request covering every variant key
//!
//! ## Architecture
//!
//! ```text
//!  HTTP API               Asset Manager                    S3 Bucket
//! ┌──────────────┐       ┌──────────────┐           ┌──────────────────┐
//! │ /user/upload │──────▶│ Variant      │           │ original_size/   │
//! │ /user/get    │       │ Deriver      │           │ 50%_resize/      │
//! │ /user/delete │       └──────────────┘           │ 25%_resize/      │
//! │ /user/get-   │              │                   │ 10%_resize/      │
//! │   Original   │              ▼                   └──────────────────┘
//! └──────────────┘       ┌──────────────┐                    ▲
//!                        │ Group upload │                    │
//!                        │ list / sign  │────────────────────┘
//!                        │ delete       │   ObjectStore trait
//!                        └──────────────┘
//! ```

pub mod api;
pub mod asset_manager;
pub mod config;
pub mod error;
pub mod object_store;
pub mod s3_store;
pub mod variant_deriver;

#[cfg(test)]
mod test_support;

pub use api::AppState;
pub use asset_manager::{AssetEntry, AssetManager, SignedUrl, UploadResult};
pub use config::Config;
pub use error::{AssetError, StoreError};
pub use object_store::{BatchDeleteResult, MemoryObjectStore, ObjectStore, StoredObject};
pub use s3_store::S3ObjectStore;
pub use variant_deriver::{derive_variants, DerivedVariant, VariantDescriptor};
