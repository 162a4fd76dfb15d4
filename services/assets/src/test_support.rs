//! Shared fixtures for unit tests.

use crate::asset_manager::AssetManager;
use crate::config::AssetsConfig;
use crate::object_store::{MemoryObjectStore, ObjectStore};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// A black `width` x `height` PNG wrapped in a data URI, as browsers send it
pub fn png_payload(width: u32, height: u32) -> String {
    let img = DynamicImage::new_rgb8(width, height);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner()))
}

pub fn manager_with_store(store: Arc<dyn ObjectStore>, assets: AssetsConfig) -> AssetManager {
    AssetManager::new(
        store,
        assets,
        Duration::from_secs(900),
        Duration::from_secs(5),
    )
}

/// Manager over a fresh in-memory bucket with the default variant list
pub fn memory_manager() -> (AssetManager, Arc<MemoryObjectStore>) {
    let store = Arc::new(MemoryObjectStore::new("test-bucket"));
    let manager = manager_with_store(store.clone(), AssetsConfig::default());
    (manager, store)
}
