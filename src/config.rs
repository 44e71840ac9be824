use std::env;

/// Timing and limit knobs for the engine. Tests depend on relative ordering
/// of these delays, so they are configuration, not inline literals.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between sibling commands on a `|`-joined input line.
    pub sibling_stagger_ms: u64,
    /// Delay between sub-commands of a `parallel` action.
    pub parallel_stagger_ms: u64,
    /// Gap after a completed chain step before the next one runs.
    pub chain_gap_ms: u64,
    /// Upper bound on tabs a single watch/lurk/refresh may open.
    pub max_tabs_per_command: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sibling_stagger_ms: 200,
            parallel_stagger_ms: 100,
            chain_gap_ms: 1_000,
            max_tabs_per_command: 100,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            sibling_stagger_ms: env_u64("SIBLING_STAGGER_MS", base.sibling_stagger_ms),
            parallel_stagger_ms: env_u64("PARALLEL_STAGGER_MS", base.parallel_stagger_ms),
            chain_gap_ms: env_u64("CHAIN_GAP_MS", base.chain_gap_ms),
            max_tabs_per_command: env_u64("MAX_TABS_PER_COMMAND", base.max_tabs_per_command as u64)
                as u32,
        }
    }
}

fn env_u64(key: &str, default_val: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default_val)
}
