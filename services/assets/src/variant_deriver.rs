//! Variant derivation: one decoded source image in, one re-encoded buffer per
//! configured (ratio, label) descriptor out.
//!
//! Dimensions and the number of outputs are the contract. The resize filter
//! is not; we use a triangle (bilinear) filter.

use crate::error::AssetError;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

const DATA_URI_PREFIX: &str = "data:image/";
const BASE64_MARKER: &str = ";base64,";

/// Clients send payloads with and without trailing padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One entry of the process-wide variant list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDescriptor {
    /// Scale factor in (0, 1]
    pub ratio: f64,
    /// Key prefix; must stay stable for the lifetime of the bucket
    pub label: String,
}

impl VariantDescriptor {
    pub fn new(ratio: f64, label: impl Into<String>) -> Self {
        Self {
            ratio,
            label: label.into(),
        }
    }

    /// Target dimensions for a source of `width` x `height`.
    ///
    /// Floors like the original service did; a dimension that floors to zero
    /// is clamped to one pixel so the variant can still be encoded.
    pub fn dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = |v: u32| ((v as f64 * self.ratio).floor() as u32).max(1);
        (scale(width), scale(height))
    }

    /// Storage key of this variant for `asset_name`
    pub fn key_for(&self, asset_name: &str) -> String {
        object_key(&self.label, asset_name)
    }
}

/// `<label>/<asset name>`
pub fn object_key(label: &str, asset_name: &str) -> String {
    format!("{label}/{asset_name}")
}

/// A resized, re-encoded rendition ready for upload
#[derive(Debug, Clone)]
pub struct DerivedVariant {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
    pub buffer: Vec<u8>,
}

/// Source image decoded once, shared by every variant
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
    format: ImageFormat,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Remove a `data:image/<type>;base64,` header if the payload carries one
pub fn strip_data_uri(payload: &str) -> &str {
    let Some(rest) = payload.strip_prefix(DATA_URI_PREFIX) else {
        return payload;
    };
    let Some(marker) = rest.find(BASE64_MARKER) else {
        return payload;
    };
    let subtype = &rest[..marker];
    if subtype.is_empty()
        || !subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return payload;
    }
    &rest[marker + BASE64_MARKER.len()..]
}

/// Decode a base64 (optionally data-URI wrapped) image payload
pub fn decode_payload(payload: &str) -> Result<DecodedImage, AssetError> {
    let encoded: String = strip_data_uri(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    if encoded.is_empty() {
        return Err(AssetError::Decode("empty payload".to_string()));
    }

    let bytes = PAYLOAD_ENGINE
        .decode(encoded.as_bytes())
        .map_err(|e| AssetError::Decode(format!("invalid base64: {e}")))?;

    decode_bytes(&bytes)
}

/// Decode raw image bytes, remembering the source format
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedImage, AssetError> {
    if bytes.is_empty() {
        return Err(AssetError::Decode("empty image".to_string()));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| AssetError::Decode(format!("unrecognised image format: {e}")))?;
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| AssetError::Decode(e.to_string()))?;

    debug!(
        format = ?format,
        width = image.width(),
        height = image.height(),
        "Decoded source image"
    );

    Ok(DecodedImage { image, format })
}

/// Decode `payload` once and derive every configured variant from it
pub fn derive_variants(
    payload: &str,
    descriptors: &[VariantDescriptor],
) -> Result<Vec<DerivedVariant>, AssetError> {
    let decoded = decode_payload(payload)?;
    derive_from_image(&decoded, descriptors)
}

/// Resize and re-encode an already decoded image for each descriptor.
///
/// Either every variant is produced or an error is returned.
pub fn derive_from_image(
    decoded: &DecodedImage,
    descriptors: &[VariantDescriptor],
) -> Result<Vec<DerivedVariant>, AssetError> {
    let (src_w, src_h) = (decoded.width(), decoded.height());

    descriptors
        .iter()
        .map(|descriptor| -> Result<DerivedVariant, AssetError> {
            let (width, height) = descriptor.dimensions(src_w, src_h);
            let resized = if (width, height) == (src_w, src_h) {
                decoded.image.clone()
            } else {
                decoded.image.resize_exact(width, height, FilterType::Triangle)
            };

            let buffer = encode(&resized, decoded.format).map_err(|reason| AssetError::Encode {
                label: descriptor.label.clone(),
                reason,
            })?;

            debug!(
                label = %descriptor.label,
                width,
                height,
                size_bytes = buffer.len(),
                "Derived variant"
            );

            Ok(DerivedVariant {
                label: descriptor.label.clone(),
                width,
                height,
                mime_type: decoded.mime_type(),
                buffer,
            })
        })
        .collect()
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, String> {
    let mut buf = Cursor::new(Vec::new());

    // JPEG has no alpha channel
    let result = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut buf, format)
    } else {
        img.write_to(&mut buf, format)
    };
    result.map_err(|e| e.to_string())?;

    Ok(buf.into_inner())
}
