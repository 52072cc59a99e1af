// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::warn;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// A tool schema as handed to the model layer.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry: the unified "what tools exist and how to invoke them"
/// surface.  Built-in tools are fixed at construction; skill-backed tools
/// are swapped in as the skill set reloads.
pub struct ToolRegistry {
    builtins: HashMap<String, Arc<dyn Tool>>,
    skill_tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    /// Per-tool post-action wait overrides from configuration (milliseconds).
    wait_overrides: HashMap<String, u64>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            builtins: HashMap::new(),
            skill_tools: RwLock::new(HashMap::new()),
            wait_overrides: HashMap::new(),
        }
    }

    pub fn with_wait_overrides(mut self, overrides: HashMap<String, u64>) -> Self {
        self.wait_overrides = overrides;
        self
    }

    /// Register a built-in tool.  Later registrations with the same name
    /// overwrite — built-ins are assembled once at startup.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.builtins.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Replace the skill-backed tool set.
    ///
    /// A skill whose name collides with a built-in is rejected; the rejected
    /// names are returned so the caller can surface them.
    pub fn set_skill_tools(&self, tools: Vec<Arc<dyn Tool>>) -> Vec<String> {
        let mut rejected = Vec::new();
        let mut accepted = HashMap::new();
        for tool in tools {
            let name = tool.name().to_string();
            if self.builtins.contains_key(&name) {
                warn!(tool = %name, "skill name collides with a built-in tool; rejected");
                rejected.push(name);
                continue;
            }
            accepted.insert(name, tool);
        }
        *self.skill_tools.write().unwrap() = accepted;
        rejected
    }

    /// Union of built-in and skill-backed tool specs, sorted by name.
    pub fn specifications(&self) -> Vec<ToolSpec> {
        let skills = self.skill_tools.read().unwrap();
        let mut specs: Vec<ToolSpec> = self
            .builtins
            .values()
            .chain(skills.values())
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if let Some(t) = self.builtins.get(name) {
            return Some(Arc::clone(t));
        }
        self.skill_tools.read().unwrap().get(name).cloned()
    }

    /// Route one invocation.  Unknown tools come back as a failure string,
    /// never a panic or an `Err`.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }

    /// True for tools whose execution plausibly changes the screen.
    pub fn is_visual_impact(&self, name: &str) -> bool {
        self.get(name).map(|t| t.visual_impact()).unwrap_or(false)
    }

    /// Post-action settle time for a visual-impact tool, honouring
    /// configuration overrides.  `None` for unknown tools.
    pub fn post_action_wait(&self, name: &str) -> Option<Duration> {
        if let Some(ms) = self.wait_overrides.get(name) {
            return Some(Duration::from_millis(*ms));
        }
        self.get(name)
            .map(|t| Duration::from_millis(t.post_action_wait_ms()))
    }

    pub fn names(&self) -> Vec<String> {
        let skills = self.skill_tools.read().unwrap();
        let mut names: Vec<String> = self
            .builtins
            .keys()
            .chain(skills.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;

    struct EchoTool {
        name: &'static str,
        visual: bool,
        wait_ms: u64,
    }

    impl EchoTool {
        fn named(name: &'static str) -> Self {
            Self {
                name,
                visual: false,
                wait_ms: 200,
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn visual_impact(&self) -> bool {
            self.visual
        }
        fn post_action_wait_ms(&self) -> u64 {
            self.wait_ms
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: name.into(),
            args: json!({}),
        }
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool::named("echo"));
        let out = reg.execute(&call("echo")).await;
        assert!(!out.is_error);
        assert!(out.content.starts_with("echo:"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_failure_string() {
        let reg = ToolRegistry::new();
        let out = reg.execute(&call("missing")).await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
        assert!(out.content.starts_with(crate::tool::FAILURE_MARKER));
    }

    #[test]
    fn specifications_union_builtins_and_skills_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool::named("zeta"));
        reg.register(EchoTool::named("alpha"));
        let rejected =
            reg.set_skill_tools(vec![Arc::new(EchoTool::named("middle")) as Arc<dyn Tool>]);
        assert!(rejected.is_empty());
        let names: Vec<String> = reg.specifications().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "middle", "zeta"]);
    }

    #[test]
    fn skill_colliding_with_builtin_is_rejected() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool::named("click"));
        let rejected =
            reg.set_skill_tools(vec![Arc::new(EchoTool::named("click")) as Arc<dyn Tool>]);
        assert_eq!(rejected, vec!["click"]);
        // The built-in stays reachable.
        assert_eq!(reg.names(), vec!["click"]);
    }

    #[test]
    fn set_skill_tools_replaces_previous_set() {
        let reg = ToolRegistry::new();
        reg.set_skill_tools(vec![Arc::new(EchoTool::named("old")) as Arc<dyn Tool>]);
        reg.set_skill_tools(vec![Arc::new(EchoTool::named("new")) as Arc<dyn Tool>]);
        assert_eq!(reg.names(), vec!["new"]);
    }

    #[test]
    fn visual_impact_and_wait_come_from_the_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool {
            name: "clicky",
            visual: true,
            wait_ms: 800,
        });
        assert!(reg.is_visual_impact("clicky"));
        assert_eq!(
            reg.post_action_wait("clicky"),
            Some(Duration::from_millis(800))
        );
        assert!(!reg.is_visual_impact("nope"));
        assert_eq!(reg.post_action_wait("nope"), None);
    }

    #[test]
    fn wait_override_wins_over_tool_default() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool {
            name: "clicky",
            visual: true,
            wait_ms: 800,
        });
        let reg = reg.with_wait_overrides(HashMap::from([("clicky".to_string(), 50u64)]));
        assert_eq!(
            reg.post_action_wait("clicky"),
            Some(Duration::from_millis(50))
        );
    }
}
