use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc};
use cron::Schedule;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::engine::CommandEngine;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    Daily,
    Weekly,
    Hourly,
}

impl Repeat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Some(Repeat::Daily),
            "weekly" => Some(Repeat::Weekly),
            "hourly" => Some(Repeat::Hourly),
            _ => None,
        }
    }
}

/// A running re-invocation loop. Removed from the table when the final
/// iteration fires or on cancel.
#[derive(Serialize)]
pub struct LoopTask {
    pub id: u64,
    pub command: String,
    pub iterations: u32,
    pub delay_ms: u64,
    pub current_iteration: u32,
    #[serde(skip)]
    handle: Option<JoinHandle<()>>,
}

/// A registered schedule. Registration-only: `next_fire` is computed for
/// display, nothing fires it.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledTask {
    pub id: u64,
    pub command: String,
    pub time: String,
    pub repeat: Repeat,
    pub active: bool,
    pub next_fire: Option<DateTime<Utc>>,
}

/// Owns the loop/schedule tables. Both kinds draw IDs from one counter so
/// they never collide.
pub struct TaskScheduler {
    next_id: AtomicU64,
    loops: Mutex<HashMap<u64, LoopTask>>,
    scheduled: Mutex<HashMap<u64, ScheduledTask>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            loops: Mutex::new(HashMap::new()),
            scheduled: Mutex::new(HashMap::new()),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Registers a loop and starts it ticking. Each tick re-enters
    /// `parse_and_dispatch`; a tick failure is logged and swallowed, the loop
    /// keeps going.
    pub fn start_loop(
        &self,
        engine: Arc<CommandEngine>,
        command: &str,
        iterations: u32,
        delay_ms: u64,
    ) -> u64 {
        let id = self.allocate_id();
        let command = command.to_string();

        let handle = tokio::spawn({
            let command = command.clone();
            async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    // The loop may have been cancelled while we slept.
                    if !engine.scheduler().loop_exists(id) {
                        return;
                    }
                    match engine.parse_and_dispatch(&command) {
                        Ok(out) => info!("[Loop #{id}] tick ok: {out}"),
                        Err(e) => warn!("[Loop #{id}] tick failed, loop continues: {e}"),
                    }
                    if engine.scheduler().advance_loop(id) {
                        info!("🔁 [Loop #{id}] completed");
                        return;
                    }
                }
            }
        });

        self.loops.lock().expect("loop table lock poisoned").insert(
            id,
            LoopTask {
                id,
                command,
                iterations,
                delay_ms,
                current_iteration: 0,
                handle: Some(handle),
            },
        );
        id
    }

    fn loop_exists(&self, id: u64) -> bool {
        self.loops
            .lock()
            .expect("loop table lock poisoned")
            .contains_key(&id)
    }

    /// Bumps the iteration count; true means the loop just fired its final
    /// iteration and has been removed.
    fn advance_loop(&self, id: u64) -> bool {
        let mut loops = self.loops.lock().expect("loop table lock poisoned");
        let Some(task) = loops.get_mut(&id) else {
            return true;
        };
        task.current_iteration += 1;
        if task.current_iteration >= task.iterations {
            loops.remove(&id);
            true
        } else {
            false
        }
    }

    /// Cancels a loop or scheduled task by ID. Not reachable from the command
    /// grammar; owners use it to tie task lifetime to their own.
    pub fn cancel(&self, id: u64) -> Result<(), EngineError> {
        if let Some(task) = self
            .loops
            .lock()
            .expect("loop table lock poisoned")
            .remove(&id)
        {
            if let Some(handle) = task.handle {
                handle.abort();
            }
            info!("[Scheduler] loop #{id} cancelled");
            return Ok(());
        }
        if self
            .scheduled
            .lock()
            .expect("schedule table lock poisoned")
            .remove(&id)
            .is_some()
        {
            info!("[Scheduler] schedule #{id} cancelled");
            return Ok(());
        }
        Err(EngineError::NotFound(format!("task #{id}")))
    }

    /// Records a schedule registration and its computed next fire time.
    pub fn register_schedule(
        &self,
        command: &str,
        time: &str,
        repeat: Repeat,
    ) -> Result<ScheduledTask, EngineError> {
        let (hour, minute) = parse_clock(time)?;
        let id = self.allocate_id();
        let task = ScheduledTask {
            id,
            command: command.to_string(),
            time: time.to_string(),
            repeat,
            active: true,
            next_fire: next_fire(hour, minute, repeat),
        };
        self.scheduled
            .lock()
            .expect("schedule table lock poisoned")
            .insert(id, task.clone());
        Ok(task)
    }

    /// Runs chain steps strictly in order: each step only after the previous
    /// one completed, plus `gap_ms`. A failing step aborts the remainder.
    pub fn start_chain(&self, engine: Arc<CommandEngine>, steps: Vec<String>, gap_ms: u64) {
        tokio::spawn(async move {
            let total = steps.len();
            for (i, step) in steps.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(Duration::from_millis(gap_ms)).await;
                }
                match engine.parse_and_dispatch(step) {
                    Ok(out) => info!("[Chain] step {}/{total} ok: {out}", i + 1),
                    Err(e) => {
                        error!(
                            "[Chain] step {}/{total} failed, aborting remainder: {e}",
                            i + 1
                        );
                        return;
                    }
                }
            }
            info!("⛓️ [Chain] completed ({total} steps)");
        });
    }

    /// Fire-and-forget fan-out: each sub-command gets its own staggered task
    /// and its own pass/fail outcome.
    pub fn start_parallel(
        &self,
        engine: Arc<CommandEngine>,
        commands: Vec<String>,
        stagger_ms: u64,
    ) {
        for (i, command) in commands.into_iter().enumerate() {
            let engine = Arc::clone(&engine);
            let delay = stagger_ms * i as u64;
            tokio::spawn(async move {
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                if let Err(e) = engine.parse_and_dispatch(&command) {
                    warn!("[Parallel] '{command}' failed: {e}");
                }
            });
        }
    }

    pub fn loop_count(&self) -> usize {
        self.loops.lock().expect("loop table lock poisoned").len()
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled
            .lock()
            .expect("schedule table lock poisoned")
            .len()
    }

    pub fn status(&self) -> serde_json::Value {
        let loops = self.loops.lock().expect("loop table lock poisoned");
        let scheduled = self.scheduled.lock().expect("schedule table lock poisoned");
        let mut loop_views: Vec<&LoopTask> = loops.values().collect();
        loop_views.sort_by_key(|t| t.id);
        let mut schedule_views: Vec<&ScheduledTask> = scheduled.values().collect();
        schedule_views.sort_by_key(|t| t.id);
        json!({
            "loops": loop_views,
            "scheduled": schedule_views,
        })
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_clock(time: &str) -> Result<(u32, u32), EngineError> {
    let bad = || EngineError::ParameterFormat {
        expected: "time as HH:MM",
        got: time.to_string(),
    };
    let (h, m) = time.split_once(':').ok_or_else(bad)?;
    let hour: u32 = h.trim().parse().map_err(|_| bad())?;
    let minute: u32 = m.trim().parse().map_err(|_| bad())?;
    if hour > 23 || minute > 59 {
        return Err(bad());
    }
    Ok((hour, minute))
}

/// Next occurrence of the registered slot. Weekly pins the weekday of
/// registration.
fn next_fire(hour: u32, minute: u32, repeat: Repeat) -> Option<DateTime<Utc>> {
    let expr = match repeat {
        Repeat::Hourly => format!("0 {minute} * * * *"),
        Repeat::Daily => format!("0 {minute} {hour} * * *"),
        Repeat::Weekly => {
            let weekday = Utc::now().weekday();
            format!("0 {minute} {hour} * * {weekday}")
        }
    };
    Schedule::from_str(&expr)
        .ok()
        .and_then(|schedule| schedule.upcoming(Utc).next())
}
