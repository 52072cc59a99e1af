// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! dHash perceptual fingerprint.
//!
//! The hash is computed on a 9×8 grayscale downscale: each of the 8 rows
//! contributes 8 bits by comparing horizontally adjacent pixels
//! (`left > right` → 1), giving a 64-bit fingerprint.  Hamming distance
//! between fingerprints approximates visual difference — small screen
//! changes (cursor blink, clock tick) land well under the default reuse
//! threshold while window switches land far above it.

use image::imageops::FilterType;

use crate::error::PerceptionError;

/// Downscale width.  One extra column so every row yields 8 comparisons.
const HASH_WIDTH: u32 = 9;
/// Downscale height.
const HASH_HEIGHT: u32 = 8;

/// Compute the 64-bit dHash of an encoded image (PNG/JPEG bytes).
pub fn dhash_bytes(bytes: &[u8]) -> Result<u64, PerceptionError> {
    let img = image::load_from_memory(bytes).map_err(|e| PerceptionError::Decode(e.to_string()))?;
    Ok(dhash_image(&img))
}

/// Compute the dHash of an already-decoded image.
pub fn dhash_image(img: &image::DynamicImage) -> u64 {
    let gray = img
        .resize_exact(HASH_WIDTH, HASH_HEIGHT, FilterType::Triangle)
        .to_luma8();

    let mut hash: u64 = 0;
    for y in 0..HASH_HEIGHT {
        for x in 0..(HASH_WIDTH - 1) {
            let left = gray.get_pixel(x, y).0[0];
            let right = gray.get_pixel(x + 1, y).0[0];
            hash <<= 1;
            if left > right {
                hash |= 1;
            }
        }
    }
    hash
}

/// Hamming distance between two fingerprints (0..=64).
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    /// A horizontal gradient — every adjacent comparison is deterministic.
    fn gradient(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, _| {
            let v = (x * 255 / width.max(1)) as u8;
            image::Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn solid(width: u32, height: u32, v: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([v, v, v])))
    }

    #[test]
    fn hash_is_deterministic() {
        let img = gradient(640, 480);
        assert_eq!(dhash_image(&img), dhash_image(&img));
    }

    #[test]
    fn identical_images_have_distance_zero() {
        let a = dhash_image(&gradient(640, 480));
        let b = dhash_image(&gradient(640, 480));
        assert_eq!(hamming(a, b), 0);
    }

    #[test]
    fn solid_image_hashes_to_zero() {
        // No adjacent pixel is strictly brighter than its neighbour.
        assert_eq!(dhash_image(&solid(100, 100, 128)), 0);
    }

    #[test]
    fn opposite_gradients_are_far_apart() {
        let ltr = dhash_image(&gradient(640, 480));
        let rtl = dhash_image(&gradient(640, 480).fliph());
        assert!(
            hamming(ltr, rtl) > 32,
            "mirrored gradients should flip most bits"
        );
    }

    #[test]
    fn small_perturbation_stays_close() {
        let base = gradient(640, 480);
        let mut perturbed = base.to_rgb8();
        // A cursor-sized blot in one corner.
        for y in 0..10 {
            for x in 0..10 {
                perturbed.put_pixel(x, y, image::Rgb([255, 255, 255]));
            }
        }
        let d = hamming(
            dhash_image(&base),
            dhash_image(&DynamicImage::ImageRgb8(perturbed)),
        );
        assert!(d <= 10, "tiny change should stay within reuse range, got {d}");
    }

    #[test]
    fn dhash_bytes_roundtrips_through_png() {
        let img = gradient(320, 240);
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        let from_bytes = dhash_bytes(&buf.into_inner()).unwrap();
        assert_eq!(from_bytes, dhash_image(&img));
    }

    #[test]
    fn dhash_bytes_rejects_garbage() {
        assert!(dhash_bytes(b"not an image").is_err());
    }

    #[test]
    fn hamming_of_complement_is_64() {
        assert_eq!(hamming(0, u64::MAX), 64);
    }
}
