// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{ChatRequest, ChatResponse};

/// The chat abstraction consumed by the reasoning loop.
///
/// `generate` takes the full ordered message list plus tool schemas and
/// returns either final text, tool requests, or both.  Implementations must
/// be safe to call concurrently from multiple units of work.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Whether image content parts may be sent to this model.
    /// Conservative default is `true`; drivers for text-only models override.
    fn supports_images(&self) -> bool {
        true
    }

    /// Send one completion request.
    async fn generate(&self, req: ChatRequest) -> anyhow::Result<ChatResponse>;
}
