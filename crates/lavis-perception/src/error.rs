// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("decoding screenshot bytes: {0}")]
    Decode(String),

    #[error("encoding screenshot bytes: {0}")]
    Encode(String),

    #[error("invalid base64 payload: {0}")]
    Base64(String),
}
