// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Deduplicating capture wrapper.
//!
//! Every retained multimodal image costs on the order of 1.5k tokens, and an
//! unchanged screen between steps need not be re-sent.  The capturer hashes
//! each candidate frame and reuses the cached image id when the Hamming
//! distance to the previous frame is within the configured threshold.

use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use sha2::Digest as _;
use tracing::debug;

use crate::{
    dhash::{dhash_bytes, hamming},
    error::PerceptionError,
    perceiver::ScreenPerceiver,
};

/// Content-addressed image id: `img-<first 16 hex chars of sha256(bytes)>`.
pub fn image_id(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    format!("img-{}", &hex::encode(digest)[..16])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureOptions {
    /// Discard the cache and capture fresh unconditionally.
    pub force: bool,
    /// Capture fresh and store, but skip the similarity comparison.
    pub skip_dedup: bool,
}

/// The outcome of one `capture` call.
#[derive(Debug, Clone)]
pub struct Captured {
    /// The id the caller must bind to any message referencing this capture.
    pub image_id: String,
    /// Base64 PNG payload.  `None` when `reused` — the caller fetches the
    /// cache via [`DedupCapturer::last_base64`] when it needs the bytes.
    pub base64: Option<String>,
    pub width: u32,
    pub height: u32,
    /// True when the screen was unchanged and the cached id was returned.
    pub reused: bool,
}

struct CachedFrame {
    image_id: String,
    base64: String,
    hash: u64,
    width: u32,
    height: u32,
}

/// Wraps a [`ScreenPerceiver`] with perceptual-hash gating and last-image
/// caching.
pub struct DedupCapturer {
    perceiver: Arc<dyn ScreenPerceiver>,
    /// Hamming-distance reuse threshold, 0..=64.
    threshold: u32,
    cache: Mutex<Option<CachedFrame>>,
}

impl DedupCapturer {
    pub fn new(perceiver: Arc<dyn ScreenPerceiver>, threshold: u32) -> Self {
        Self {
            perceiver,
            threshold: threshold.min(64),
            cache: Mutex::new(None),
        }
    }

    /// Capture a screenshot, reusing the cached frame when the screen has
    /// not materially changed.
    pub async fn capture(&self, options: CaptureOptions) -> Result<Captured, PerceptionError> {
        if options.force {
            self.clear_cache();
        }

        let frame = self.perceiver.capture().await?;
        let hash = dhash_bytes(&frame.bytes)?;

        let mut cache = self.cache.lock().unwrap();

        // Threshold 0 disables reuse entirely: even a bit-identical frame is
        // treated as new.
        if !options.force && !options.skip_dedup && self.threshold > 0 {
            if let Some(cached) = cache.as_ref() {
                let distance = hamming(cached.hash, hash);
                if distance <= self.threshold {
                    debug!(distance, image_id = %cached.image_id, "screen unchanged; reusing cached frame");
                    return Ok(Captured {
                        image_id: cached.image_id.clone(),
                        base64: None,
                        width: cached.width,
                        height: cached.height,
                        reused: true,
                    });
                }
            }
        }

        let id = image_id(&frame.bytes);
        let b64 = B64.encode(&frame.bytes);
        *cache = Some(CachedFrame {
            image_id: id.clone(),
            base64: b64.clone(),
            hash,
            width: frame.width,
            height: frame.height,
        });

        Ok(Captured {
            image_id: id,
            base64: Some(b64),
            width: frame.width,
            height: frame.height,
            reused: false,
        })
    }

    /// Base64 payload of the cached frame, if any.
    pub fn last_base64(&self) -> Option<String> {
        self.cache.lock().unwrap().as_ref().map(|c| c.base64.clone())
    }

    pub fn clear_cache(&self) {
        *self.cache.lock().unwrap() = None;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perceiver::{SequencePerceiver, StaticPerceiver};
    use crate::test_frames::png_frame;

    fn capturer_with(p: impl ScreenPerceiver + 'static, threshold: u32) -> DedupCapturer {
        DedupCapturer::new(Arc::new(p), threshold)
    }

    #[tokio::test]
    async fn first_capture_is_fresh() {
        let c = capturer_with(StaticPerceiver::new(png_frame(64, 48, 10)), 10);
        let shot = c.capture(CaptureOptions::default()).await.unwrap();
        assert!(!shot.reused);
        assert!(shot.base64.is_some());
        assert!(shot.image_id.starts_with("img-"));
    }

    #[tokio::test]
    async fn unchanged_screen_is_reused_with_same_id() {
        let c = capturer_with(StaticPerceiver::new(png_frame(64, 48, 10)), 10);
        let a = c.capture(CaptureOptions::default()).await.unwrap();
        let b = c.capture(CaptureOptions::default()).await.unwrap();
        assert!(b.reused);
        assert_eq!(b.image_id, a.image_id);
        assert!(b.base64.is_none());
        // The cached bytes are still reachable.
        assert!(c.last_base64().is_some());
    }

    #[tokio::test]
    async fn changed_screen_is_fresh() {
        let c = capturer_with(
            SequencePerceiver::new(vec![png_frame(64, 48, 0), png_frame(64, 48, 250)]),
            10,
        );
        let a = c.capture(CaptureOptions::default()).await.unwrap();
        let b = c.capture(CaptureOptions::default()).await.unwrap();
        assert!(!b.reused);
        assert_ne!(a.image_id, b.image_id);
    }

    #[tokio::test]
    async fn force_discards_cache() {
        let c = capturer_with(StaticPerceiver::new(png_frame(64, 48, 10)), 10);
        let a = c.capture(CaptureOptions::default()).await.unwrap();
        let b = c
            .capture(CaptureOptions {
                force: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!b.reused);
        assert!(b.base64.is_some());
        // Identical content produces an identical content-addressed id.
        assert_eq!(a.image_id, b.image_id);
    }

    #[tokio::test]
    async fn skip_dedup_stores_fresh_without_comparison() {
        let c = capturer_with(StaticPerceiver::new(png_frame(64, 48, 10)), 64);
        let _ = c.capture(CaptureOptions::default()).await.unwrap();
        let b = c
            .capture(CaptureOptions {
                skip_dedup: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!b.reused);
    }

    #[tokio::test]
    async fn threshold_zero_treats_every_capture_as_new() {
        // Even a bit-identical frame (distance 0) must not be reused.
        let c = capturer_with(StaticPerceiver::new(png_frame(64, 48, 10)), 0);
        let a = c.capture(CaptureOptions::default()).await.unwrap();
        let b = c.capture(CaptureOptions::default()).await.unwrap();
        assert!(!a.reused);
        assert!(!b.reused);
        assert!(b.base64.is_some());
    }

    #[tokio::test]
    async fn threshold_sixty_four_reuses_everything_after_first() {
        let c = capturer_with(
            SequencePerceiver::new(vec![png_frame(64, 48, 0), png_frame(64, 48, 255)]),
            64,
        );
        let a = c.capture(CaptureOptions::default()).await.unwrap();
        let b = c.capture(CaptureOptions::default()).await.unwrap();
        assert!(b.reused);
        assert_eq!(b.image_id, a.image_id);
    }

    #[tokio::test]
    async fn clear_cache_forgets_last_frame() {
        let c = capturer_with(StaticPerceiver::new(png_frame(64, 48, 10)), 10);
        let _ = c.capture(CaptureOptions::default()).await.unwrap();
        c.clear_cache();
        assert!(c.last_base64().is_none());
        let b = c.capture(CaptureOptions::default()).await.unwrap();
        assert!(!b.reused);
    }

    #[test]
    fn image_id_is_stable_and_content_addressed() {
        assert_eq!(image_id(b"abc"), image_id(b"abc"));
        assert_ne!(image_id(b"abc"), image_id(b"abd"));
        assert_eq!(image_id(b"abc").len(), "img-".len() + 16);
    }
}
