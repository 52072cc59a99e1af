// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use lavis_config::Config;
use lavis_core::Orchestrator;
use lavis_gateway::AppState;
use lavis_memory::{ColdStorage, MemoryManager, PersistentStore};
use lavis_perception::{
    CommandPerceiver, DedupCapturer, FailingPerceiver, ScreenPerceiver,
};
use lavis_scheduler::{Scheduler, TaskStore};
use lavis_skills::{SkillLoader, SkillService};
use lavis_tools::{
    builtin_registry, CommandActuator, GoalRunner, InputActuator, MockActuator, ToolRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = lavis_config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::ShowConfig) => {
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Some(Commands::Run { goal }) => {
            let state = build_state(&config).await?;
            let response = state.orchestrator.run_task(&goal).await;
            println!("{response}");
            Ok(())
        }
        Some(Commands::Serve { bind }) => {
            let bind = bind.unwrap_or_else(|| config.gateway.bind.clone());
            serve(config, bind).await
        }
        None => {
            let bind = config.gateway.bind.clone();
            serve(config, bind).await
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn serve(config: Config, bind: String) -> anyhow::Result<()> {
    let state = build_state(&config).await?;

    if config.scheduler.autostart {
        state.scheduler.clone().start();
    }

    // Skill hot reload: poll the skills root and keep the unified tool
    // namespace in sync.
    if config.skills.hot_reload {
        let reload_state = state.clone();
        let interval = std::time::Duration::from_secs(config.skills.reload_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match reload_state.skills.loader().reload() {
                    Ok(_) => reload_state.refresh_skill_tools(),
                    Err(e) => warn!(error = %e, "skill hot reload failed"),
                }
            }
        });
    }

    // Periodic memory maintenance: image eviction + summary compression.
    {
        let maintain_state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let (cleaned, compressed) = maintain_state.orchestrator.maintain().await;
                if cleaned > 0 || compressed {
                    info!(cleaned, compressed, "memory maintenance pass");
                }
            }
        });
    }

    state.memory.clone().spawn_cold_cleanup_task();

    lavis_gateway::serve(&bind, state).await
}

async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    // Chat model — optional: the loop answers with an instructional string
    // when unconfigured, so the surface still comes up.
    let model = lavis_model::from_config(&config.model);
    if model.is_none() {
        warn!("no chat model configured; reasoning endpoints will refuse requests");
    }

    // Screen perception.
    let perceiver: Arc<dyn ScreenPerceiver> = match &config.perception.capture_command {
        Some(cmd) => Arc::new(CommandPerceiver::new(cmd.clone())),
        None => {
            warn!("no capture command configured; screen perception is unavailable");
            Arc::new(FailingPerceiver)
        }
    };
    let capturer = Arc::new(DedupCapturer::new(
        perceiver,
        config.perception.dedup_threshold,
    ));

    // OS input.
    let actuator: Arc<dyn InputActuator> = if config.actuator.is_empty() {
        warn!("no actuator commands configured; input actions are logged only");
        Arc::new(MockActuator::new())
    } else {
        Arc::new(CommandActuator::new(config.actuator.clone()))
    };
    let registry: Arc<ToolRegistry> = Arc::new(builtin_registry(
        actuator,
        config.agent.shell_timeout_secs,
        config.agent.tool_waits_ms.clone(),
    ));

    // Memory.
    let store = Arc::new(
        PersistentStore::open(&config.memory.db_path_or_default())
            .context("opening the session database")?,
    );
    let cold = Arc::new(ColdStorage::new(config.memory.cold_root_or_default()));
    let memory = Arc::new(MemoryManager::new(store, cold, config.memory.clone()));

    // Skills.
    let loader = Arc::new(SkillLoader::new(config.skills.root_or_default()));
    if let Err(e) = loader.reload() {
        warn!(error = %e, "initial skill scan failed");
    }
    let skills = Arc::new(SkillService::new(
        loader,
        config.agent.shell_timeout_secs,
    ));

    // The loop itself.
    let orchestrator = Orchestrator::new(
        model,
        registry.clone(),
        capturer.clone(),
        memory.clone(),
        skills.clone(),
        config.agent.clone(),
    );
    skills.set_runner(orchestrator.clone() as Arc<dyn GoalRunner>);

    // Scheduler.
    let task_store = TaskStore::open(&config.scheduler.db_path_or_default())
        .context("opening the scheduler database")?;
    let scheduler = Scheduler::new(
        task_store,
        orchestrator.clone() as Arc<dyn GoalRunner>,
        config.agent.shell_timeout_secs,
    );
    if let Err(e) = scheduler.load_tasks() {
        warn!(error = %e, "scheduler task loading failed");
    }

    let state = AppState {
        orchestrator,
        scheduler,
        skills,
        memory,
        capturer,
        registry,
    };
    state.refresh_skill_tools();
    Ok(state)
}
