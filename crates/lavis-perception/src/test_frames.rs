// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Synthetic frame generation for tests.
//!
//! Public (not `cfg(test)`) so downstream crates can drive the capturer with
//! deterministic, visually distinct frames.

use image::{DynamicImage, RgbImage};

use crate::perceiver::RawFrame;

/// Render a deterministic PNG frame.
///
/// The `seed` controls the visual content so that different seeds produce
/// frames whose dHashes are far apart while equal seeds reproduce identical
/// bytes:
/// - `seed < 128`: ascending horizontal gradient with a bright vertical
///   stripe whose position tracks the seed (hash bits concentrate around the
///   stripe's column).
/// - `seed >= 128`: descending gradient (most hash bits set).
pub fn png_frame(width: u32, height: u32, seed: u8) -> RawFrame {
    let img = RgbImage::from_fn(width, height, |x, _y| {
        let v = if seed < 128 {
            let stripe_x = (width * seed as u32) / 128;
            let stripe_w = (width / 8).max(1);
            if x >= stripe_x && x < stripe_x + stripe_w {
                255
            } else {
                ((x * 120) / width.max(1)) as u8
            }
        } else {
            (255 - (x * 255) / width.max(1)) as u8
        };
        image::Rgb([v, v, v])
    });
    let dynamic = DynamicImage::ImageRgb8(img);
    let mut buf = std::io::Cursor::new(Vec::new());
    dynamic
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("encoding synthetic frame");
    RawFrame {
        bytes: buf.into_inner(),
        width,
        height,
    }
}
