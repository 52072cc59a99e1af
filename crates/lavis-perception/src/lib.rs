// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Screen perception for lavis.
//!
//! Wraps the external capture primitive with perceptual-hash deduplication
//! so an unchanged screen between reasoning steps is never re-sent to the
//! model, and provides the thumbnail downscale used by the HTTP surface.

pub mod dhash;
pub mod test_frames;

mod capturer;
mod error;
mod perceiver;

pub use capturer::{image_id, CaptureOptions, Captured, DedupCapturer};
pub use error::PerceptionError;
pub use perceiver::{
    CommandPerceiver, FailingPerceiver, RawFrame, ScreenPerceiver, SequencePerceiver,
    StaticPerceiver,
};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

/// Downscale a base64 PNG so its longest edge is at most `max_edge`, and
/// re-encode.  Already-small images pass through unchanged.
pub fn thumbnail_base64(base64_png: &str, max_edge: u32) -> Result<String, PerceptionError> {
    let bytes = B64
        .decode(base64_png)
        .map_err(|e| PerceptionError::Base64(e.to_string()))?;
    let img =
        image::load_from_memory(&bytes).map_err(|e| PerceptionError::Decode(e.to_string()))?;
    if img.width() <= max_edge && img.height() <= max_edge {
        return Ok(base64_png.to_string());
    }
    let thumb = img.resize(max_edge, max_edge, image::imageops::FilterType::Triangle);
    let mut out = std::io::Cursor::new(Vec::new());
    thumb
        .write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| PerceptionError::Encode(e.to_string()))?;
    Ok(B64.encode(out.into_inner()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
