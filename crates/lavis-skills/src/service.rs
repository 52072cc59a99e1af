// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Skill execution.
//!
//! Executing a skill substitutes `{{param}}` placeholders into its command,
//! installs the skill's knowledge body as the context for the *one*
//! reasoning invocation enclosed by the execution, dispatches the command,
//! and clears the context on return — success or failure alike.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use lavis_tools::{Command, GoalRunner, Tool, ToolCall, ToolOutput};

use crate::error::SkillError;
use crate::loader::SkillLoader;
use crate::types::{Skill, SkillContext};

pub struct SkillService {
    loader: Arc<SkillLoader>,
    /// Context visible to the reasoning invocation currently enclosed by a
    /// skill execution, if any.
    context: Mutex<Option<SkillContext>>,
    /// Wired after the orchestrator exists; `agent:` commands fail with a
    /// descriptive error until then.
    runner: OnceLock<Arc<dyn GoalRunner>>,
    shell_timeout_secs: u64,
}

impl SkillService {
    pub fn new(loader: Arc<SkillLoader>, shell_timeout_secs: u64) -> Self {
        Self {
            loader,
            context: Mutex::new(None),
            runner: OnceLock::new(),
            shell_timeout_secs,
        }
    }

    /// Wire the reasoning-loop entry point.  Call once at startup.
    pub fn set_runner(&self, runner: Arc<dyn GoalRunner>) {
        if self.runner.set(runner).is_err() {
            warn!("skill runner was already wired; ignoring");
        }
    }

    pub fn loader(&self) -> &Arc<SkillLoader> {
        &self.loader
    }

    /// Snapshot of the installed context.  The reasoning loop reads this
    /// when assembling its system prompt; outside an enclosing skill
    /// execution it is always `None`.
    pub fn current_context(&self) -> Option<SkillContext> {
        self.context.lock().unwrap().clone()
    }

    /// Execute a skill by id or name with caller-supplied parameters.
    pub async fn execute(
        &self,
        id_or_name: &str,
        params: &HashMap<String, String>,
    ) -> Result<String, SkillError> {
        let skill = self
            .loader
            .get(id_or_name)
            .ok_or_else(|| SkillError::NotFound(id_or_name.to_string()))?;
        if !skill.enabled {
            return Err(SkillError::Disabled(skill.name.clone()));
        }

        let command = substitute_params(&skill.command, params);
        info!(skill = %skill.name, command = %command, "executing skill");

        // Install the knowledge context for the enclosed reasoning
        // invocation; it must be gone by the time we return.
        *self.context.lock().unwrap() = Some(SkillContext {
            skill_name: skill.name.clone(),
            knowledge: skill.body.clone(),
        });

        let result = self.dispatch(&command).await;

        *self.context.lock().unwrap() = None;
        self.loader.mark_used(&skill.id, Utc::now());

        result
    }

    async fn dispatch(&self, command: &str) -> Result<String, SkillError> {
        match Command::parse(command) {
            Command::Agent(goal) => {
                let runner = self.runner.get().ok_or(SkillError::NoRunner)?;
                runner
                    .run_goal(&goal)
                    .await
                    .map_err(|e| SkillError::Exec(format!("agent command failed: {e}")))
            }
            Command::Shell(cmd) => lavis_tools::run_shell(&cmd, self.shell_timeout_secs)
                .await
                .map_err(|e| SkillError::Exec(format!("shell command failed: {e}"))),
        }
    }

    /// Skill-backed tools for the unified registry, one per enabled skill.
    pub fn skill_tools(self: Arc<Self>) -> Vec<Arc<dyn Tool>> {
        self.loader
            .list()
            .into_iter()
            .filter(|s| s.enabled)
            .map(|s| Arc::new(SkillTool::new(Arc::clone(&self), s)) as Arc<dyn Tool>)
            .collect()
    }
}

/// Substitute `{{param}}` placeholders with caller-supplied values.
/// Placeholders without a matching parameter are left as-is.
fn substitute_params(command: &str, params: &HashMap<String, String>) -> String {
    let mut out = command.to_string();
    for (key, value) in params {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

// ─── Skill-backed tool adapter ────────────────────────────────────────────────

/// Presents one skill as a tool in the unified registry namespace.
pub struct SkillTool {
    service: Arc<SkillService>,
    name: String,
    description: String,
}

impl SkillTool {
    fn new(service: Arc<SkillService>, skill: Skill) -> Self {
        let description = if skill.description.is_empty() {
            format!("Run the '{}' skill.", skill.name)
        } else {
            skill.description.clone()
        };
        Self {
            service,
            name: skill.name,
            description,
        }
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "params": {
                    "type": "object",
                    "description": "Values substituted into the skill command's {{param}} placeholders",
                    "additionalProperties": { "type": "string" }
                }
            },
            "additionalProperties": false
        })
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let params: HashMap<String, String> = call
            .args
            .get("params")
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        debug!(skill = %self.name, "skill tool invoked");
        match self.service.execute(&self.name, &params).await {
            Ok(out) => ToolOutput::ok(&call.id, out),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &std::path::Path, id: &str, command: &str, body: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {id}\ncommand: {command}\n---\n\n{body}\n"),
        )
        .unwrap();
    }

    fn service(root: &std::path::Path) -> Arc<SkillService> {
        let loader = Arc::new(SkillLoader::new(root));
        loader.reload().unwrap();
        Arc::new(SkillService::new(loader, 10))
    }

    /// Records goals and returns a canned response, while also observing the
    /// skill context that was visible during the run.
    struct ProbeRunner {
        service: Mutex<Option<Arc<SkillService>>>,
        seen_goals: Mutex<Vec<String>>,
        seen_context: Mutex<Vec<Option<String>>>,
    }

    impl ProbeRunner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                service: Mutex::new(None),
                seen_goals: Mutex::new(Vec::new()),
                seen_context: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GoalRunner for ProbeRunner {
        async fn run_goal(&self, goal: &str) -> anyhow::Result<String> {
            self.seen_goals.lock().unwrap().push(goal.to_string());
            let ctx = self
                .service
                .lock()
                .unwrap()
                .as_ref()
                .and_then(|s| s.current_context())
                .map(|c| c.knowledge);
            self.seen_context.lock().unwrap().push(ctx);
            Ok(format!("ran: {goal}"))
        }
    }

    #[tokio::test]
    async fn shell_skill_executes_and_returns_stdout() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "hello", "shell:echo skill-output", "body");
        let svc = service(tmp.path());
        let out = svc.execute("hello", &HashMap::new()).await.unwrap();
        assert!(out.contains("skill-output"));
    }

    #[tokio::test]
    async fn bare_command_defaults_to_shell() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "bare", "echo bare-out", "body");
        let svc = service(tmp.path());
        let out = svc.execute("bare", &HashMap::new()).await.unwrap();
        assert!(out.contains("bare-out"));
    }

    #[tokio::test]
    async fn params_are_substituted() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "greet", "shell:echo hello {{who}}", "body");
        let svc = service(tmp.path());
        let params = HashMap::from([("who".to_string(), "world".to_string())]);
        let out = svc.execute("greet", &params).await.unwrap();
        assert!(out.contains("hello world"));
    }

    #[tokio::test]
    async fn agent_command_routes_to_runner_with_context_installed() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "sign-in", "agent:log in", "Use the SSO button.");
        let svc = service(tmp.path());
        let runner = ProbeRunner::new();
        *runner.service.lock().unwrap() = Some(Arc::clone(&svc));
        svc.set_runner(runner.clone());

        let out = svc.execute("sign-in", &HashMap::new()).await.unwrap();
        assert_eq!(out, "ran: log in");
        assert_eq!(runner.seen_goals.lock().unwrap().clone(), vec!["log in"]);
        // The enclosed invocation saw the knowledge body…
        assert_eq!(
            runner.seen_context.lock().unwrap()[0].as_deref(),
            Some("Use the SSO button.")
        );
        // …and the context is gone once execute() returns.
        assert!(svc.current_context().is_none());
    }

    #[tokio::test]
    async fn context_cleared_even_on_failure() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "broken", "shell:exit 7", "knowledge");
        let svc = service(tmp.path());
        assert!(svc.execute("broken", &HashMap::new()).await.is_err());
        assert!(svc.current_context().is_none());
    }

    #[tokio::test]
    async fn agent_command_without_runner_is_descriptive_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "agentic", "agent:do things", "body");
        let svc = service(tmp.path());
        let err = svc.execute("agentic", &HashMap::new()).await.unwrap_err();
        assert!(err.to_string().contains("runner not wired"));
        assert!(svc.current_context().is_none());
    }

    #[tokio::test]
    async fn unknown_skill_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        assert!(matches!(
            svc.execute("nope", &HashMap::new()).await,
            Err(SkillError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn execution_bumps_use_count() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "counted", "shell:true", "body");
        let svc = service(tmp.path());
        svc.execute("counted", &HashMap::new()).await.unwrap();
        svc.execute("counted", &HashMap::new()).await.unwrap();
        assert_eq!(svc.loader().get("counted").unwrap().use_count, 2);
    }

    #[tokio::test]
    async fn skill_tools_adapt_skills_into_registry_tools() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "echoer", "shell:echo via-tool", "body");
        let svc = service(tmp.path());
        let tools = Arc::clone(&svc).skill_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "echoer");

        let out = tools[0]
            .execute(&ToolCall {
                id: "1".into(),
                name: "echoer".into(),
                args: json!({}),
            })
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("via-tool"));
    }

    #[test]
    fn substitute_leaves_unknown_placeholders() {
        let params = HashMap::from([("a".to_string(), "1".to_string())]);
        assert_eq!(
            substitute_params("x {{a}} {{b}}", &params),
            "x 1 {{b}}".to_string()
        );
    }
}
