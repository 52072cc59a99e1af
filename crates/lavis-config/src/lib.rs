// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod schema;

pub use loader::load;
pub use schema::{
    app_root, AgentConfig, Config, GatewayConfig, MemoryConfig, ModelConfig, PerceptionConfig,
    SchedulerConfig, SkillsConfig,
};
