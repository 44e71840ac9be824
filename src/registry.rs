use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::CommandEngine;
use crate::error::EngineError;
use crate::grammar::{Agent, Command};
use crate::platform;
use crate::scheduler::Repeat;
use crate::surface::ScrollDirection;
use crate::tabs::{TabKind, TabSelection};

type Handler = fn(&Arc<CommandEngine>, &str) -> Result<String, EngineError>;

/// One verb in an agent's namespace: its name, the parameter format it
/// expects (also shown by `help`), and the handler.
struct ActionSpec {
    name: &'static str,
    usage: &'static str,
    run: Handler,
}

// =====================================================
// The two-level registry: agent -> action -> handler
// =====================================================

static RAITHA_ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "watch",
        usage: "<url>.<tabCount 1-100>",
        run: run_watch,
    },
    ActionSpec {
        name: "lurk",
        usage: "<url>.<tabCount 1-100>",
        run: run_lurk,
    },
    ActionSpec {
        name: "refresh",
        usage: "<url>.<intervalSec>.<tabCount>",
        run: run_refresh,
    },
    ActionSpec {
        name: "mute",
        usage: "all | <index,index,...>",
        run: run_mute,
    },
    ActionSpec {
        name: "unmute",
        usage: "all | <index,index,...>",
        run: run_unmute,
    },
    ActionSpec {
        name: "scroll",
        usage: "<tabIndex>.<up|down>",
        run: run_scroll,
    },
    ActionSpec {
        name: "fullscreen",
        usage: "<tabIndex>",
        run: run_fullscreen,
    },
];

static NETRA_ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "test",
        usage: "<url>.<requestsPerSec>",
        run: run_test,
    },
    ActionSpec {
        name: "scrape",
        usage: "<url>.<target>",
        run: run_scrape,
    },
    ActionSpec {
        name: "compare",
        usage: "<url1>.<url2>.<interval>[sec|min]",
        run: run_compare,
    },
    ActionSpec {
        name: "monitor",
        usage: "<url>.<keyword>.<interval>[sec|min]",
        run: run_monitor,
    },
    ActionSpec {
        name: "download",
        usage: "<url>",
        run: run_download,
    },
    ActionSpec {
        name: "ping",
        usage: "<url>.<interval>.<duration>[sec|min]",
        run: run_ping,
    },
];

static KALA_ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "schedule",
        usage: "<command>.<HH:MM>.<daily|weekly|hourly>",
        run: run_schedule,
    },
    ActionSpec {
        name: "loop",
        usage: "<command>.<iterations>.<delay>[sec|min]",
        run: run_loop,
    },
    ActionSpec {
        name: "batch",
        usage: "<cmd1>;<cmd2>;...",
        run: run_batch,
    },
    ActionSpec {
        name: "parallel",
        usage: "<cmd1>|<cmd2>|...",
        run: run_parallel,
    },
    ActionSpec {
        name: "chain",
        usage: "<cmd1>-><cmd2>->...",
        run: run_chain,
    },
    ActionSpec {
        name: "rotate",
        usage: "<url1,url2,...>.<interval>[sec|min]",
        run: run_rotate,
    },
];

static AGENT_TABLE: &[(Agent, &[ActionSpec])] = &[
    (Agent::Raitha, RAITHA_ACTIONS),
    (Agent::Netra, NETRA_ACTIONS),
    (Agent::Kala, KALA_ACTIONS),
];

/// Looks up the handler for a parsed command and runs it against the trimmed
/// parameter string.
pub fn dispatch(engine: &Arc<CommandEngine>, cmd: &Command) -> Result<String, EngineError> {
    let (_, actions) = AGENT_TABLE
        .iter()
        .find(|(agent, _)| *agent == cmd.agent)
        .ok_or_else(|| EngineError::UnknownAgent(cmd.agent.name().to_string()))?;

    let spec = actions
        .iter()
        .find(|a| a.name == cmd.action)
        .ok_or_else(|| EngineError::UnknownAction {
            agent: cmd.agent.name(),
            action: cmd.action.clone(),
            valid: actions
                .iter()
                .map(|a| a.name)
                .collect::<Vec<_>>()
                .join(", "),
        })?;

    (spec.run)(engine, cmd.raw_params.trim())
}

/// One `<Agent> Ex.<action> -- <usage>` line per registered action.
pub fn help_lines() -> Vec<String> {
    let mut lines = Vec::new();
    for (agent, actions) in AGENT_TABLE {
        for spec in *actions {
            lines.push(format!(
                "{} Ex.{} -- {}",
                agent.name(),
                spec.name,
                spec.usage
            ));
        }
    }
    lines
}

// =====================================================
// Sub-grammar helpers
// =====================================================

fn fmt_err(expected: &'static str, got: &str) -> EngineError {
    EngineError::ParameterFormat {
        expected,
        got: got.to_string(),
    }
}

/// URLs contain dots, so every numeric field is split off the tail.
fn split_tail<'a>(params: &'a str, usage: &'static str) -> Result<(&'a str, &'a str), EngineError> {
    params
        .rsplit_once('.')
        .map(|(head, tail)| (head.trim(), tail.trim()))
        .ok_or_else(|| fmt_err(usage, params))
}

fn tail_u32<'a>(params: &'a str, usage: &'static str) -> Result<(&'a str, u32), EngineError> {
    let (head, tail) = split_tail(params, usage)?;
    let n = tail.parse().map_err(|_| fmt_err(usage, params))?;
    Ok((head, n))
}

/// `<n>`, `<n>sec` or `<n>min`; bare numbers are seconds. Zero is rejected.
fn interval_ms(raw: &str, usage: &'static str, got: &str) -> Result<u64, EngineError> {
    let lower = raw.trim().to_ascii_lowercase();
    let (digits, scale) = if let Some(d) = lower.strip_suffix("min") {
        (d, 60_000)
    } else if let Some(d) = lower.strip_suffix("sec") {
        (d, 1_000)
    } else {
        (lower.as_str(), 1_000)
    };
    let n: u64 = digits.trim().parse().map_err(|_| fmt_err(usage, got))?;
    if n == 0 {
        return Err(fmt_err(usage, got));
    }
    Ok(n * scale)
}

fn url_like(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn tab_count(n: u32, engine: &CommandEngine, usage: &'static str, got: &str) -> Result<u32, EngineError> {
    if n == 0 || n > engine.config().max_tabs_per_command {
        return Err(fmt_err(usage, got));
    }
    Ok(n)
}

// =====================================================
// Raitha: media/tab handlers
// =====================================================

const WATCH_USAGE: &str = "<url>.<tabCount 1-100>";

fn run_watch(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    open_media(engine, params, TabKind::Watch, false)
}

fn run_lurk(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    open_media(engine, params, TabKind::Lurk, true)
}

fn open_media(
    engine: &Arc<CommandEngine>,
    params: &str,
    kind: TabKind,
    muted: bool,
) -> Result<String, EngineError> {
    let (url, count) = tail_u32(params, WATCH_USAGE)?;
    let count = tab_count(count, engine, WATCH_USAGE, params)?;
    if !platform::is_supported(url) {
        return Err(fmt_err("a supported streaming platform url", url));
    }
    let embed = platform::to_embeddable(url, muted)?;
    if embed.limited {
        warn!(
            "[Registry] {:?} has no first-class embed support, opening '{}' as-is",
            embed.platform, embed.url
        );
    }
    let ids = engine.tabs().open(&embed.url, count, kind, muted);
    Ok(format!(
        "opened {} {:?} tab(s) {:?} -> {}",
        ids.len(),
        kind,
        ids,
        embed.url
    ))
}

const REFRESH_USAGE: &str = "<url>.<intervalSec>.<tabCount>";

fn run_refresh(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let (head, count) = tail_u32(params, REFRESH_USAGE)?;
    let count = tab_count(count, engine, REFRESH_USAGE, params)?;
    let (url, interval_raw) = split_tail(head, REFRESH_USAGE)?;
    let interval_secs: u64 = interval_raw
        .parse()
        .map_err(|_| fmt_err(REFRESH_USAGE, params))?;
    if interval_secs == 0 {
        return Err(fmt_err(REFRESH_USAGE, params));
    }
    if !platform::is_supported(url) {
        return Err(fmt_err("a supported streaming platform url", url));
    }
    let embed = platform::to_embeddable(url, false)?;
    let ids = engine.tabs().open(&embed.url, count, TabKind::Refresh, false);
    for id in &ids {
        engine
            .tabs()
            .start_refresh(*id, tokio::time::Duration::from_secs(interval_secs));
    }
    Ok(format!(
        "opened {} refresh tab(s) {:?}, reloading every {interval_secs}s",
        ids.len(),
        ids
    ))
}

const MUTE_USAGE: &str = "'all' or comma-separated 1-based tab indices";

fn parse_selection(params: &str) -> Result<TabSelection, EngineError> {
    if params.eq_ignore_ascii_case("all") {
        return Ok(TabSelection::All);
    }
    let mut indices = Vec::new();
    for piece in params.split(',') {
        let ix: usize = piece
            .trim()
            .parse()
            .map_err(|_| fmt_err(MUTE_USAGE, params))?;
        indices.push(ix);
    }
    Ok(TabSelection::Indices(indices))
}

fn run_mute(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let selection = parse_selection(params)?;
    let n = engine.tabs().set_muted(&selection, true)?;
    Ok(format!("muted {n} tab(s)"))
}

fn run_unmute(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let selection = parse_selection(params)?;
    let n = engine.tabs().set_muted(&selection, false)?;
    Ok(format!("unmuted {n} tab(s)"))
}

const SCROLL_USAGE: &str = "<tabIndex>.<up|down>";

fn run_scroll(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let (ix_raw, dir_raw) = params
        .split_once('.')
        .ok_or_else(|| fmt_err(SCROLL_USAGE, params))?;
    let index: usize = ix_raw
        .trim()
        .parse()
        .map_err(|_| fmt_err(SCROLL_USAGE, params))?;
    let direction =
        ScrollDirection::parse(dir_raw.trim()).ok_or_else(|| fmt_err(SCROLL_USAGE, params))?;
    let id = engine.tabs().scroll(index, direction)?;
    Ok(format!("scrolled tab #{id} {direction:?}"))
}

fn run_fullscreen(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let index: usize = params
        .trim()
        .parse()
        .map_err(|_| fmt_err("<1-based tab index>", params))?;
    let id = engine.tabs().fullscreen(index)?;
    Ok(format!("fullscreen requested on tab #{id}"))
}

// =====================================================
// Netra: probe/test handlers (intent recording only)
// =====================================================

const TEST_USAGE: &str = "<url>.<requestsPerSec>";

fn run_test(_engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let (url, rps) = tail_u32(params, TEST_USAGE)?;
    if !url_like(url) || rps == 0 {
        return Err(fmt_err(TEST_USAGE, params));
    }
    info!("🧪 [Probe] load-test intent: {rps} req/s against {url} (no traffic issued)");
    Ok(format!("recorded load-test intent: {url} at {rps} req/s"))
}

const SCRAPE_USAGE: &str = "<url>.<target>";

fn run_scrape(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let (url, target) = split_tail(params, SCRAPE_USAGE)?;
    if !url_like(url) || target.is_empty() {
        return Err(fmt_err(SCRAPE_USAGE, params));
    }
    let ids = engine.tabs().open(url, 1, TabKind::Scrape, false);
    Ok(format!(
        "scrape tab #{} opened for {url} (target: {target})",
        ids[0]
    ))
}

const COMPARE_USAGE: &str = "<url1>.<url2>.<interval>[sec|min]";

fn run_compare(_engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let (head, interval_raw) = split_tail(params, COMPARE_USAGE)?;
    let interval = interval_ms(interval_raw, COMPARE_USAGE, params)?;
    // Two URLs joined by '.': the second scheme marker is the boundary.
    let boundary = head
        .find(".http")
        .ok_or_else(|| fmt_err(COMPARE_USAGE, params))?;
    let (url1, url2) = (&head[..boundary], &head[boundary + 1..]);
    if !url_like(url1) || !url_like(url2) {
        return Err(fmt_err(COMPARE_USAGE, params));
    }
    info!("🧪 [Probe] compare intent: {url1} vs {url2} every {interval}ms");
    Ok(format!(
        "recorded compare intent: {url1} vs {url2} every {interval}ms"
    ))
}

const MONITOR_USAGE: &str = "<url>.<keyword>.<interval>[sec|min]";

fn run_monitor(_engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let (head, interval_raw) = split_tail(params, MONITOR_USAGE)?;
    let interval = interval_ms(interval_raw, MONITOR_USAGE, params)?;
    let (url, keyword) = split_tail(head, MONITOR_USAGE)?;
    if !url_like(url) || keyword.is_empty() {
        return Err(fmt_err(MONITOR_USAGE, params));
    }
    info!("🧪 [Probe] monitor intent: '{keyword}' on {url} every {interval}ms");
    Ok(format!(
        "recorded monitor intent: '{keyword}' on {url} every {interval}ms"
    ))
}

fn run_download(_engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let url = params.trim();
    if !url_like(url) {
        return Err(fmt_err("<url>", params));
    }
    info!("🧪 [Probe] download intent: {url}");
    Ok(format!("recorded download intent: {url}"))
}

const PING_USAGE: &str = "<url>.<interval>.<duration>[sec|min]";

fn run_ping(_engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let (head, duration_raw) = split_tail(params, PING_USAGE)?;
    let duration = interval_ms(duration_raw, PING_USAGE, params)?;
    let (url, interval_raw) = split_tail(head, PING_USAGE)?;
    let interval = interval_ms(interval_raw, PING_USAGE, params)?;
    if !url_like(url) {
        return Err(fmt_err(PING_USAGE, params));
    }
    info!("🧪 [Probe] keep-alive intent: {url} every {interval}ms for {duration}ms");
    Ok(format!(
        "recorded keep-alive intent: {url} every {interval}ms for {duration}ms"
    ))
}

// =====================================================
// Kala: scheduling/sequencing handlers
// =====================================================

const SCHEDULE_USAGE: &str = "<command>.<HH:MM>.<daily|weekly|hourly>";

fn run_schedule(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let (head, repeat_raw) = split_tail(params, SCHEDULE_USAGE)?;
    let repeat = Repeat::parse(repeat_raw).ok_or_else(|| fmt_err(SCHEDULE_USAGE, params))?;
    let (command, time) = split_tail(head, SCHEDULE_USAGE)?;
    if command.is_empty() {
        return Err(fmt_err(SCHEDULE_USAGE, params));
    }
    let task = engine.scheduler().register_schedule(command, time, repeat)?;
    let next = task
        .next_fire
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());
    Ok(format!(
        "scheduled task #{} ({:?} at {}), next fire {next}",
        task.id, task.repeat, task.time
    ))
}

const LOOP_USAGE: &str = "<command>.<iterations>.<delay>[sec|min]";

fn run_loop(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let (head, delay_raw) = split_tail(params, LOOP_USAGE)?;
    let delay_ms = interval_ms(delay_raw, LOOP_USAGE, params)?;
    let (command, iterations) = tail_u32(head, LOOP_USAGE)?;
    if iterations == 0 || command.is_empty() {
        return Err(fmt_err(LOOP_USAGE, params));
    }
    let id = engine
        .scheduler()
        .start_loop(Arc::clone(engine), command, iterations, delay_ms);
    Ok(format!(
        "loop task #{id} started: '{command}' x{iterations} every {delay_ms}ms"
    ))
}

fn run_batch(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let steps: Vec<&str> = params
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        return Err(fmt_err("<cmd1>;<cmd2>;...", params));
    }
    // Best-effort: a failing step is already logged and counted at the
    // dispatch boundary, the rest of the batch still runs.
    let mut ok = 0;
    let mut failed = 0;
    for step in steps {
        match engine.parse_and_dispatch(step) {
            Ok(_) => ok += 1,
            Err(_) => failed += 1,
        }
    }
    Ok(format!("batch finished: {ok} ok, {failed} failed"))
}

fn run_parallel(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let commands: Vec<String> = params
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if commands.is_empty() {
        return Err(fmt_err("<cmd1>|<cmd2>|...", params));
    }
    let stagger = engine.config().parallel_stagger_ms;
    let n = commands.len();
    engine
        .scheduler()
        .start_parallel(Arc::clone(engine), commands, stagger);
    Ok(format!("parallel: {n} command(s) launched ({stagger}ms stagger)"))
}

fn run_chain(engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let steps: Vec<String> = params
        .split("->")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if steps.is_empty() {
        return Err(fmt_err("<cmd1>-><cmd2>->...", params));
    }
    let gap = engine.config().chain_gap_ms;
    let n = steps.len();
    engine.scheduler().start_chain(Arc::clone(engine), steps, gap);
    Ok(format!("chain started: {n} step(s), {gap}ms gap"))
}

const ROTATE_USAGE: &str = "<url1,url2,...>.<interval>[sec|min]";

fn run_rotate(_engine: &Arc<CommandEngine>, params: &str) -> Result<String, EngineError> {
    let (head, interval_raw) = split_tail(params, ROTATE_USAGE)?;
    let interval = interval_ms(interval_raw, ROTATE_USAGE, params)?;
    let urls: Vec<&str> = head.split(',').map(str::trim).collect();
    if urls.is_empty() || urls.iter().any(|u| !platform::is_supported(u)) {
        return Err(fmt_err(ROTATE_USAGE, params));
    }
    info!(
        "🔀 [Scheduler] rotation intent: {} url(s) every {interval}ms",
        urls.len()
    );
    Ok(format!(
        "recorded rotation intent: {} url(s) every {interval}ms",
        urls.len()
    ))
}
