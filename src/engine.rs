use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::time::Duration;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::grammar;
use crate::registry;
use crate::scheduler::TaskScheduler;
use crate::surface::TabSurface;
use crate::tabs::TabManager;

/// Composition root: owns the tab table, the task tables and the outcome
/// counters. All mutation goes through methods here; there are no ambient
/// globals.
pub struct CommandEngine {
    config: EngineConfig,
    tabs: Arc<TabManager>,
    scheduler: TaskScheduler,
    ok_count: AtomicU64,
    error_count: AtomicU64,
}

impl CommandEngine {
    pub fn new(config: EngineConfig, surface: Arc<dyn TabSurface>) -> Arc<Self> {
        Arc::new(Self {
            config,
            tabs: Arc::new(TabManager::new(surface)),
            scheduler: TaskScheduler::new(),
            ok_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tabs(&self) -> &Arc<TabManager> {
        &self.tabs
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// The single dispatch boundary. Direct submission, staggered siblings,
    /// loop ticks and chain steps all come through here, so outcomes are
    /// logged and counted uniformly and an error never propagates past the
    /// caller that asked for it.
    pub fn parse_and_dispatch(self: &Arc<Self>, line: &str) -> Result<String, EngineError> {
        let result = grammar::parse(line).and_then(|cmd| registry::dispatch(self, &cmd));
        match &result {
            Ok(out) => {
                self.ok_count.fetch_add(1, Ordering::Relaxed);
                info!("✅ [Engine] {out}");
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                error!("❌ [Engine] '{line}': {e}");
            }
        }
        result
    }

    /// Dispatches one input line. A `|`-joined line (that is not itself a
    /// `parallel` invocation) is split into sibling commands, each dispatched
    /// independently with a fixed stagger; sibling failures are logged at the
    /// dispatch boundary and never abort the others.
    pub fn submit(self: &Arc<Self>, line: &str) -> Result<String, EngineError> {
        let line = line.trim();
        if line.contains('|') && !is_parallel_invocation(line) {
            let siblings: Vec<String> = line
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            let n = siblings.len();
            let stagger = self.config.sibling_stagger_ms;
            for (i, sibling) in siblings.into_iter().enumerate() {
                if i == 0 {
                    let _ = self.parse_and_dispatch(&sibling);
                } else {
                    let engine = Arc::clone(self);
                    let delay = stagger * i as u64;
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        let _ = engine.parse_and_dispatch(&sibling);
                    });
                }
            }
            return Ok(format!("{n} sibling command(s) dispatched ({stagger}ms stagger)"));
        }
        self.parse_and_dispatch(line)
    }

    /// Runs a multi-line script. Blank lines and `//` comments are skipped;
    /// a failing line never stops the rest (best-effort, summary at the end).
    pub fn process_script(self: &Arc<Self>, script: &str) -> String {
        let mut submitted = 0;
        for raw in script.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            submitted += 1;
            let _ = self.submit(line);
        }
        format!("{submitted} line(s) submitted. {}", self.summary())
    }

    pub fn counts(&self) -> (u64, u64) {
        (
            self.ok_count.load(Ordering::Relaxed),
            self.error_count.load(Ordering::Relaxed),
        )
    }

    pub fn summary(&self) -> String {
        let (ok, failed) = self.counts();
        format!("{ok} succeeded, {failed} failed")
    }

    /// JSON snapshot of everything the engine owns, for the REPL's `status`.
    pub fn status(&self) -> serde_json::Value {
        json!({
            "tabs": self.tabs.snapshot(),
            "tasks": self.scheduler.status(),
            "summary": self.summary(),
        })
    }
}

/// A line whose own action is `parallel` keeps its `|` separators; the
/// handler splits them.
fn is_parallel_invocation(line: &str) -> bool {
    grammar::parse(line)
        .map(|cmd| cmd.action == "parallel")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::testing::RecordingSurface;

    fn engine_with_recorder() -> (Arc<CommandEngine>, Arc<RecordingSurface>) {
        let surface = Arc::new(RecordingSurface::default());
        let engine = CommandEngine::new(EngineConfig::default(), surface.clone());
        (engine, surface)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_fires_exactly_iterations_then_completes() {
        let (engine, _surface) = engine_with_recorder();
        engine
            .submit("Kala Ex.loop -- Raitha Ex.watch -- https://youtu.be/a.1.3.1")
            .unwrap();
        assert_eq!(engine.scheduler().loop_count(), 1);
        assert!(engine.tabs().is_empty());

        // Ticks land at ~1s spacing.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(engine.tabs().len(), 1);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(engine.tabs().len(), 2);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(engine.tabs().len(), 3);
        assert_eq!(engine.scheduler().loop_count(), 0);

        // Completed: no further ticks.
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(engine.tabs().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_tick_failure_does_not_stop_loop() {
        let (engine, _surface) = engine_with_recorder();
        // Fullscreen on a tab that never exists: every tick fails.
        engine
            .submit("Kala Ex.loop -- Raitha Ex.fullscreen -- 1.3.1")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        // All three ticks fired despite failing, then the loop completed.
        assert_eq!(engine.scheduler().loop_count(), 0);
        let (ok, failed) = engine.counts();
        assert_eq!(ok, 1); // the loop registration itself
        assert_eq!(failed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_cancel_stops_ticking() {
        let (engine, _surface) = engine_with_recorder();
        let out = engine
            .submit("Kala Ex.loop -- Raitha Ex.watch -- https://youtu.be/a.1.10.1")
            .unwrap();
        assert!(out.contains("#1"));

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(engine.tabs().len(), 1);

        engine.scheduler().cancel(1).unwrap();
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(engine.tabs().len(), 1);
        assert_eq!(engine.scheduler().loop_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_aborts_on_failing_step() {
        let (engine, _surface) = engine_with_recorder();
        engine
            .submit(
                "Kala Ex.chain -- Raitha Ex.watch -- https://youtu.be/a.1\
                 ->Raitha Ex.bogus -- x\
                 ->Raitha Ex.watch -- https://youtu.be/b.1",
            )
            .unwrap();

        // Step 1 runs immediately, step 2 fails after the gap, step 3 never runs.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.tabs().len(), 1);
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(engine.tabs().len(), 1);

        let (ok, failed) = engine.counts();
        assert_eq!(ok, 2); // chain registration + step 1
        assert_eq!(failed, 1); // step 2
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_steps_are_gapped() {
        let (engine, _surface) = engine_with_recorder();
        engine
            .submit(
                "Kala Ex.chain -- Raitha Ex.watch -- https://youtu.be/a.1\
                 ->Raitha Ex.watch -- https://youtu.be/b.1",
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.tabs().len(), 1);
        // Second step waits out the 1000ms gap.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(engine.tabs().len(), 1);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(engine.tabs().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_failure_does_not_suppress_sibling() {
        let (engine, _surface) = engine_with_recorder();
        engine
            .submit("Kala Ex.parallel -- Raitha Ex.bogus -- x|Raitha Ex.watch -- https://youtu.be/b.1")
            .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(engine.tabs().len(), 1);
        let (ok, failed) = engine.counts();
        assert_eq!(ok, 2); // parallel registration + the watch
        assert_eq!(failed, 1); // the bogus action
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_staggers_sub_commands() {
        let (engine, _surface) = engine_with_recorder();
        engine
            .submit(
                "Kala Ex.parallel -- Raitha Ex.watch -- https://youtu.be/a.1\
                 |Raitha Ex.watch -- https://youtu.be/b.1",
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.tabs().len(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.tabs().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sibling_lines_stagger_at_200ms() {
        let (engine, _surface) = engine_with_recorder();
        let out = engine
            .submit("Raitha Ex.watch -- https://youtu.be/a.1|Raitha Ex.watch -- https://youtu.be/b.1")
            .unwrap();
        assert!(out.contains("2 sibling"));

        // First sibling runs inline, second lands after the stagger.
        assert_eq!(engine.tabs().len(), 1);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(engine.tabs().len(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.tabs().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_is_best_effort() {
        let (engine, _surface) = engine_with_recorder();
        let out = engine
            .submit(
                "Kala Ex.batch -- Raitha Ex.watch -- https://youtu.be/a.1;\
                 Raitha Ex.bogus -- x;\
                 Raitha Ex.watch -- https://youtu.be/b.1",
            )
            .unwrap();
        assert!(out.contains("2 ok, 1 failed"));
        assert_eq!(engine.tabs().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_script_skips_comments_and_keeps_going() {
        let (engine, _surface) = engine_with_recorder();
        let script = "\
// open the morning lineup
Raitha Ex.watch -- https://youtu.be/a.1

this line is garbage
Raitha Ex.watch -- https://youtu.be/b.1
";
        let out = engine.process_script(script);
        assert!(out.contains("3 line(s) submitted"));
        assert_eq!(engine.tabs().len(), 2);
        let (ok, failed) = engine.counts();
        assert_eq!(ok, 2);
        assert_eq!(failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_snapshot_shape() {
        let (engine, _surface) = engine_with_recorder();
        engine
            .submit("Raitha Ex.watch -- https://youtu.be/a.1")
            .unwrap();
        engine
            .submit("Kala Ex.schedule -- Netra Ex.download -- https://a.com/f.mp4.06:00.daily")
            .unwrap();
        let status = engine.status();
        assert_eq!(status["tabs"].as_array().unwrap().len(), 1);
        assert_eq!(status["tasks"]["scheduled"].as_array().unwrap().len(), 1);
        assert!(status["summary"].as_str().unwrap().contains("2 succeeded"));
    }
}
