// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
mod mock;
mod openai_compat;
mod provider;
mod types;

pub use mock::{MockChat, Script, ScriptedChat};
pub use openai_compat::OpenAiCompatChat;
pub use provider::ChatModel;
pub use types::*;

use std::sync::Arc;

use lavis_config::ModelConfig;

/// Construct a shared [`ChatModel`] from configuration.
///
/// Returns `None` when the configured provider needs an API key and none is
/// resolvable — the reasoning loop treats that as "model unavailable" and
/// answers every entry point with a terminal instructional string.
pub fn from_config(cfg: &ModelConfig) -> Option<Arc<dyn ChatModel>> {
    match cfg.provider.as_str() {
        "mock" => Some(Arc::new(MockChat)),
        _ => {
            let key = cfg.resolve_api_key();
            // Local endpoints (explicit base_url) may run without a key.
            if key.is_none() && cfg.base_url.is_none() {
                return None;
            }
            Some(Arc::new(OpenAiCompatChat::new(
                cfg.name.clone(),
                key,
                cfg.base_url.clone(),
                cfg.max_tokens,
                cfg.temperature,
            )))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
