// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! The cron engine: persistently stored tasks, a 1-second tick loop, and
//! per-task serialized execution.
//!
//! A tick that arrives while the same task is still running is dropped and
//! counted as a skip, never queued.  Distinct task ids execute in parallel
//! (one spawned tokio task each).

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use lavis_tools::{run_shell, Command, GoalRunner};

use crate::{
    db::TaskStore,
    error::{Result, SchedulerError},
    types::{NewTask, RunStatus, ScheduledTask, TaskPatch, TaskRunLog},
};

/// Parse and validate a 6-field cron expression (second, minute, hour,
/// day-of-month, month, day-of-week).
fn parse_cron(expression: &str) -> Result<cron::Schedule> {
    let fields = expression.split_whitespace().count();
    if fields != 6 {
        return Err(SchedulerError::InvalidCron {
            expression: expression.to_string(),
            reason: format!("expected 6 fields, got {fields}"),
        });
    }
    cron::Schedule::from_str(expression).map_err(|e| SchedulerError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

pub struct Scheduler {
    store: TaskStore,
    runner: Arc<dyn GoalRunner>,
    shell_timeout_secs: u64,
    /// Task ids currently executing; a tick on a member is a skip.
    running: Mutex<HashSet<String>>,
    /// Parsed schedules for enabled tasks.
    schedules: Mutex<HashMap<String, cron::Schedule>>,
    /// Next fire instant per subscribed task, local zone.
    next_fire: Mutex<HashMap<String, DateTime<Local>>>,
    /// Dropped-tick counts per task id.
    skip_counts: Mutex<HashMap<String, u64>>,
    tick_shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl Scheduler {
    pub fn new(store: TaskStore, runner: Arc<dyn GoalRunner>, shell_timeout_secs: u64) -> Arc<Self> {
        Arc::new(Self {
            store,
            runner,
            shell_timeout_secs,
            running: Mutex::new(HashSet::new()),
            schedules: Mutex::new(HashMap::new()),
            next_fire: Mutex::new(HashMap::new()),
            skip_counts: Mutex::new(HashMap::new()),
            tick_shutdown: Mutex::new(None),
        })
    }

    // ── Startup ───────────────────────────────────────────────────────────────

    /// Load all task rows and subscribe the enabled ones.
    ///
    /// Individual bad rows never abort startup: an invalid cron expression
    /// loads its task paused with `last_run_status = FAILED` and a
    /// descriptive run-log entry.
    pub fn load_tasks(&self) -> Result<usize> {
        let tasks = self.store.list()?;
        let mut subscribed = 0;
        for task in tasks {
            if !task.enabled {
                continue;
            }
            match parse_cron(&task.cron) {
                Ok(schedule) => {
                    self.subscribe(&task.id, schedule);
                    subscribed += 1;
                }
                Err(e) => {
                    error!(task_id = %task.id, name = %task.name, error = %e, "invalid cron at startup; pausing task");
                    let mut paused = task.clone();
                    paused.enabled = false;
                    paused.last_run_status = Some(RunStatus::Failed);
                    paused.updated_at = Utc::now();
                    if let Err(e2) = self.store.update(&paused) {
                        warn!(task_id = %task.id, error = %e2, "failed to persist paused state");
                    }
                    let now = Utc::now();
                    let _ = self.store.insert_run(
                        &task.id,
                        now,
                        now,
                        RunStatus::Failed,
                        None,
                        Some(&e.to_string()),
                    );
                }
            }
        }
        info!(subscribed, "scheduler tasks loaded");
        Ok(subscribed)
    }

    fn subscribe(&self, id: &str, schedule: cron::Schedule) {
        let next = schedule.after(&Local::now()).next();
        self.schedules
            .lock()
            .unwrap()
            .insert(id.to_string(), schedule);
        if let Some(next) = next {
            self.next_fire.lock().unwrap().insert(id.to_string(), next);
        }
    }

    fn unsubscribe(&self, id: &str) {
        self.schedules.lock().unwrap().remove(id);
        self.next_fire.lock().unwrap().remove(id);
    }

    pub fn subscribed(&self, id: &str) -> bool {
        self.schedules.lock().unwrap().contains_key(id)
    }

    // ── Tick loop ─────────────────────────────────────────────────────────────

    /// Start the 1-second tick loop.  No-op when already started.
    pub fn start(self: Arc<Self>) {
        let mut slot = self.tick_shutdown.lock().unwrap();
        if slot.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        *slot = Some(tx);
        drop(slot);
        let scheduler = Arc::clone(&self);
        tokio::spawn(scheduler.run(rx));
        info!("scheduler tick loop started");
    }

    /// Stop the tick loop; stored tasks and subscriptions stay intact.
    pub fn stop(&self) {
        if let Some(tx) = self.tick_shutdown.lock().unwrap().take() {
            let _ = tx.send(true);
            info!("scheduler tick loop stopped");
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.tick_shutdown.lock().unwrap().is_some()
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let _ = Arc::clone(&self).tick_once(Local::now());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Fire every subscribed task whose next instant has arrived, spawning
    /// one execution task per fired id.  Returns the join handles so tests
    /// can await completion deterministically.
    pub fn tick_once(self: Arc<Self>, now: DateTime<Local>) -> Vec<tokio::task::JoinHandle<()>> {
        let due: Vec<String> = {
            let next_fire = self.next_fire.lock().unwrap();
            next_fire
                .iter()
                .filter(|(_, at)| **at <= now)
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut handles = Vec::with_capacity(due.len());
        for id in due {
            // Advance the fire time first so a slow execution cannot make
            // the same instant fire twice.
            let next = self
                .schedules
                .lock()
                .unwrap()
                .get(&id)
                .and_then(|s| s.after(&now).next());
            match next {
                Some(at) => {
                    self.next_fire.lock().unwrap().insert(id.clone(), at);
                }
                None => {
                    self.next_fire.lock().unwrap().remove(&id);
                }
            }
            let scheduler = Arc::clone(&self);
            handles.push(tokio::spawn(scheduler.execute_task(id)));
        }
        handles
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Execute one task to completion, serialized per task id.  A task that
    /// is already running records a skip and returns immediately.
    pub async fn execute_task(self: Arc<Self>, id: String) {
        {
            let mut running = self.running.lock().unwrap();
            if running.contains(&id) {
                *self.skip_counts.lock().unwrap().entry(id.clone()).or_insert(0) += 1;
                warn!(task_id = %id, "tick fired while task still running; skipping");
                return;
            }
            running.insert(id.clone());
        }
        let _guard = RunningGuard {
            scheduler: &self,
            id: &id,
        };

        let task = match self.store.get(&id) {
            Ok(t) => t,
            Err(e) => {
                warn!(task_id = %id, error = %e, "fired task no longer loadable");
                return;
            }
        };

        let mut marker = task.clone();
        marker.last_run_status = Some(RunStatus::Running);
        marker.updated_at = Utc::now();
        if let Err(e) = self.store.update(&marker) {
            warn!(task_id = %id, error = %e, "failed to mark task running");
        }

        info!(task_id = %id, name = %task.name, command = %task.command, "executing task");
        let started = Utc::now();
        let result: anyhow::Result<String> = match Command::parse(&task.command) {
            Command::Agent(goal) => self.runner.run_goal(&goal).await,
            Command::Shell(cmd) => run_shell(&cmd, self.shell_timeout_secs).await,
        };
        let ended = Utc::now();

        let (status, output, error_text) = match &result {
            Ok(out) => (RunStatus::Success, Some(out.as_str()), None),
            Err(e) => (RunStatus::Failed, None, Some(e.to_string())),
        };
        if let Err(e) =
            self.store
                .insert_run(&id, started, ended, status, output, error_text.as_deref())
        {
            warn!(task_id = %id, error = %e, "failed to append run log");
        }

        let mut finished = marker;
        finished.last_run = Some(started);
        finished.last_run_status = Some(status);
        finished.run_count = task.run_count + 1;
        finished.updated_at = ended;
        if let Err(e) = self.store.update(&finished) {
            warn!(task_id = %id, error = %e, "failed to persist run state");
        }
        info!(task_id = %id, %status, duration_ms = (ended - started).num_milliseconds(), "task finished");
    }

    // ── Operations ────────────────────────────────────────────────────────────

    pub fn create(&self, new: NewTask) -> Result<ScheduledTask> {
        let schedule = parse_cron(&new.cron)?;
        let now = Utc::now();
        let task = ScheduledTask {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            description: new.description,
            cron: new.cron,
            command: new.command,
            enabled: new.enabled,
            created_at: now,
            updated_at: now,
            last_run: None,
            last_run_status: None,
            run_count: 0,
        };
        self.store.insert(&task)?;
        if task.enabled {
            self.subscribe(&task.id, schedule);
        }
        info!(task_id = %task.id, name = %task.name, "task created");
        Ok(task)
    }

    pub fn list(&self) -> Result<Vec<ScheduledTask>> {
        self.store.list()
    }

    pub fn get(&self, id: &str) -> Result<ScheduledTask> {
        self.store.get(id)
    }

    pub fn update(&self, id: &str, patch: TaskPatch) -> Result<ScheduledTask> {
        let mut task = self.store.get(id)?;
        if let Some(name) = patch.name {
            task.name = name;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(command) = patch.command {
            task.command = command;
        }
        if let Some(cron_expr) = patch.cron {
            parse_cron(&cron_expr)?;
            task.cron = cron_expr;
        }
        if let Some(enabled) = patch.enabled {
            task.enabled = enabled;
        }
        task.updated_at = Utc::now();
        self.store.update(&task)?;

        self.unsubscribe(id);
        if task.enabled {
            let schedule = parse_cron(&task.cron)?;
            self.subscribe(id, schedule);
        }
        Ok(task)
    }

    /// Unsubscribe without deleting.
    pub fn pause(&self, id: &str) -> Result<ScheduledTask> {
        self.update(
            id,
            TaskPatch {
                enabled: Some(false),
                ..Default::default()
            },
        )
    }

    pub fn resume(&self, id: &str) -> Result<ScheduledTask> {
        self.update(
            id,
            TaskPatch {
                enabled: Some(true),
                ..Default::default()
            },
        )
    }

    /// Delete the task and cascade its run logs.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.unsubscribe(id);
        self.store.delete(id)
    }

    /// Force one immediate execution outside the tick schedule.
    pub fn run_now(self: Arc<Self>, id: &str) -> Result<()> {
        self.store.get(id)?;
        let task_id = id.to_string();
        tokio::spawn(self.execute_task(task_id));
        Ok(())
    }

    pub fn logs(&self, id: &str, limit: usize) -> Result<Vec<TaskRunLog>> {
        self.store.get(id)?;
        self.store.list_runs(id, limit)
    }

    /// Dropped-tick count for a task.
    pub fn skip_count(&self, id: &str) -> u64 {
        *self.skip_counts.lock().unwrap().get(id).unwrap_or(&0)
    }
}

/// Clears the per-task running flag on every exit path.
struct RunningGuard<'a> {
    scheduler: &'a Scheduler,
    id: &'a str,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.running.lock().unwrap().remove(self.id);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use super::*;

    /// Records goals; optionally sleeps to simulate a slow agent run.
    struct ProbeRunner {
        goals: Mutex<Vec<String>>,
        delay_ms: u64,
    }

    impl ProbeRunner {
        fn instant() -> Arc<Self> {
            Arc::new(Self {
                goals: Mutex::new(Vec::new()),
                delay_ms: 0,
            })
        }
        fn slow(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                goals: Mutex::new(Vec::new()),
                delay_ms,
            })
        }
    }

    #[async_trait]
    impl GoalRunner for ProbeRunner {
        async fn run_goal(&self, goal: &str) -> anyhow::Result<String> {
            self.goals.lock().unwrap().push(goal.to_string());
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            Ok(format!("done: {goal}"))
        }
    }

    fn scheduler_with(runner: Arc<ProbeRunner>) -> Arc<Scheduler> {
        Scheduler::new(TaskStore::in_memory().unwrap(), runner, 10)
    }

    fn agent_task(cron: &str) -> NewTask {
        NewTask {
            name: "refresh".into(),
            description: String::new(),
            cron: cron.into(),
            command: "agent:refresh inbox".into(),
            enabled: true,
        }
    }

    // ── Cron validation ───────────────────────────────────────────────────────

    #[test]
    fn six_field_cron_parses() {
        assert!(parse_cron("0 */5 * * * *").is_ok());
        assert!(parse_cron("30 0 12 * * Mon").is_ok());
    }

    #[test]
    fn five_field_cron_is_rejected() {
        assert!(matches!(
            parse_cron("*/5 * * * *"),
            Err(SchedulerError::InvalidCron { .. })
        ));
    }

    #[test]
    fn garbage_cron_is_rejected() {
        assert!(parse_cron("a b c d e f").is_err());
    }

    // ── CRUD ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_subscribes_enabled_tasks() {
        let s = scheduler_with(ProbeRunner::instant());
        let t = s.create(agent_task("0 */5 * * * *")).unwrap();
        assert!(s.subscribed(&t.id));
        assert_eq!(s.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_invalid_cron() {
        let s = scheduler_with(ProbeRunner::instant());
        assert!(s.create(agent_task("not a cron")).is_err());
        assert!(s.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_subscription() {
        let s = scheduler_with(ProbeRunner::instant());
        let t = s.create(agent_task("0 */5 * * * *")).unwrap();
        s.pause(&t.id).unwrap();
        assert!(!s.subscribed(&t.id));
        assert!(!s.get(&t.id).unwrap().enabled);
        s.resume(&t.id).unwrap();
        assert!(s.subscribed(&t.id));
    }

    #[tokio::test]
    async fn delete_unsubscribes_and_cascades() {
        let s = scheduler_with(ProbeRunner::instant());
        let t = s.create(agent_task("0 */5 * * * *")).unwrap();
        s.delete(&t.id).unwrap();
        assert!(!s.subscribed(&t.id));
        assert!(s.get(&t.id).is_err());
    }

    // ── Startup loading ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_cron_loads_paused_with_failed_status() {
        let store = TaskStore::in_memory().unwrap();
        let now = Utc::now();
        let bad = ScheduledTask {
            id: "bad-task".into(),
            name: "broken".into(),
            description: String::new(),
            cron: "every five minutes".into(),
            command: "shell:true".into(),
            enabled: true,
            created_at: now,
            updated_at: now,
            last_run: None,
            last_run_status: None,
            run_count: 0,
        };
        store.insert(&bad).unwrap();

        let s = Scheduler::new(store, ProbeRunner::instant(), 10);
        assert_eq!(s.load_tasks().unwrap(), 0);

        let loaded = s.get("bad-task").unwrap();
        assert!(!loaded.enabled);
        assert_eq!(loaded.last_run_status, Some(RunStatus::Failed));
        assert!(!s.subscribed("bad-task"));
        // The descriptive error landed in the run log.
        let logs = s.logs("bad-task", 5).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].error.as_deref().unwrap().contains("cron"));
    }

    #[tokio::test]
    async fn load_subscribes_only_enabled_valid_tasks() {
        let store = TaskStore::in_memory().unwrap();
        let now = Utc::now();
        for (id, enabled, cron) in [
            ("ok-on", true, "0 * * * * *"),
            ("ok-off", false, "0 * * * * *"),
        ] {
            store
                .insert(&ScheduledTask {
                    id: id.into(),
                    name: id.into(),
                    description: String::new(),
                    cron: cron.into(),
                    command: "shell:true".into(),
                    enabled,
                    created_at: now,
                    updated_at: now,
                    last_run: None,
                    last_run_status: None,
                    run_count: 0,
                })
                .unwrap();
        }
        let s = Scheduler::new(store, ProbeRunner::instant(), 10);
        assert_eq!(s.load_tasks().unwrap(), 1);
        assert!(s.subscribed("ok-on"));
        assert!(!s.subscribed("ok-off"));
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn agent_command_runs_through_the_runner() {
        let runner = ProbeRunner::instant();
        let s = scheduler_with(runner.clone());
        let t = s.create(agent_task("0 */5 * * * *")).unwrap();

        Arc::clone(&s).execute_task(t.id.clone()).await;

        assert_eq!(runner.goals.lock().unwrap().clone(), vec!["refresh inbox"]);
        let loaded = s.get(&t.id).unwrap();
        assert_eq!(loaded.run_count, 1);
        assert_eq!(loaded.last_run_status, Some(RunStatus::Success));
        assert!(loaded.last_run.is_some());
        let logs = s.logs(&t.id, 5).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, RunStatus::Success);
        assert_eq!(logs[0].output.as_deref(), Some("done: refresh inbox"));
    }

    #[tokio::test]
    async fn shell_failure_records_failed_run() {
        let s = scheduler_with(ProbeRunner::instant());
        let t = s
            .create(NewTask {
                name: "broken".into(),
                description: String::new(),
                cron: "0 * * * * *".into(),
                command: "shell:echo oops >&2; exit 3".into(),
                enabled: true,
            })
            .unwrap();

        Arc::clone(&s).execute_task(t.id.clone()).await;

        let loaded = s.get(&t.id).unwrap();
        assert_eq!(loaded.last_run_status, Some(RunStatus::Failed));
        let logs = s.logs(&t.id, 5).unwrap();
        assert_eq!(logs[0].status, RunStatus::Failed);
        assert!(logs[0].error.as_deref().unwrap().contains("oops"));
    }

    /// E4: five consecutive fire instants, each producing exactly one
    /// SUCCESS run log; no overlapping execution windows.
    #[tokio::test]
    async fn five_ticks_fire_five_runs_without_overlap() {
        let runner = ProbeRunner::instant();
        let s = scheduler_with(runner.clone());
        let t = s.create(agent_task("0 */5 * * * *")).unwrap();

        // The schedule's own next occurrences stand in for fake wall time.
        let schedule = parse_cron(&t.cron).unwrap();
        let fire_times: Vec<DateTime<Local>> =
            schedule.after(&Local::now()).take(5).collect();

        for at in &fire_times {
            for handle in Arc::clone(&s).tick_once(*at) {
                handle.await.unwrap();
            }
            // A tick between occurrences fires nothing.
            for handle in Arc::clone(&s).tick_once(*at + ChronoDuration::seconds(1)) {
                handle.await.unwrap();
            }
        }

        let logs = s.logs(&t.id, 50).unwrap();
        assert_eq!(logs.len(), 5);
        assert!(logs.iter().all(|l| l.status == RunStatus::Success));
        assert_eq!(s.get(&t.id).unwrap().run_count, 5);
        // Newest first: every run ended before the next one started.
        for pair in logs.windows(2) {
            assert!(pair[1].ended_at <= pair[0].started_at);
        }
        assert_eq!(s.skip_count(&t.id), 0);
    }

    /// E4, slow variant: a tick during a running execution records exactly
    /// one skip and the run count advances only per completion.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overlapping_tick_is_skipped_once() {
        let runner = ProbeRunner::slow(200);
        let s = scheduler_with(runner.clone());
        let t = s.create(agent_task("0 */5 * * * *")).unwrap();

        let first = tokio::spawn(Arc::clone(&s).execute_task(t.id.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        // Fires while the first run is still in flight.
        Arc::clone(&s).execute_task(t.id.clone()).await;
        first.await.unwrap();

        assert_eq!(s.skip_count(&t.id), 1);
        assert_eq!(s.get(&t.id).unwrap().run_count, 1);
        assert_eq!(s.logs(&t.id, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_now_executes_outside_the_schedule() {
        let runner = ProbeRunner::instant();
        let s = scheduler_with(runner.clone());
        let t = s.create(agent_task("0 0 3 * * *")).unwrap();
        Arc::clone(&s).run_now(&t.id).unwrap();

        // Bounded wait for the spawned execution.
        for _ in 0..100 {
            if s.get(&t.id).unwrap().run_count == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(s.get(&t.id).unwrap().run_count, 1);
    }

    #[tokio::test]
    async fn tick_loop_start_stop_is_idempotent() {
        let s = scheduler_with(ProbeRunner::instant());
        assert!(!s.is_ticking());
        Arc::clone(&s).start();
        Arc::clone(&s).start();
        assert!(s.is_ticking());
        s.stop();
        assert!(!s.is_ticking());
        s.stop();
    }
}
