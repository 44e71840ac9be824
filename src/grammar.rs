use crate::error::EngineError;

/// The three command namespaces. Every line is addressed to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agent {
    /// Media/tab agent: opens and manipulates stream tabs.
    Raitha,
    /// Probe/test agent: records network/measurement intents.
    Netra,
    /// Scheduling/network agent: loops, schedules, chains, fan-out.
    Kala,
}

impl Agent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "raitha" => Some(Agent::Raitha),
            "netra" => Some(Agent::Netra),
            "kala" => Some(Agent::Kala),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Agent::Raitha => "Raitha",
            Agent::Netra => "Netra",
            Agent::Kala => "Kala",
        }
    }
}

/// One parsed command line. Built by [`parse`], consumed by the dispatcher,
/// never mutated.
#[derive(Debug, Clone)]
pub struct Command {
    pub agent: Agent,
    pub action: String,
    pub raw_params: String,
}

/// Parses `<Agent> Ex.<action> -- <params>`.
///
/// Validation order matters for error messages: agent first, then the `Ex.`
/// marker, then the parameter block. The parameter string is everything after
/// the FIRST `--`; later `--` occurrences belong to the params.
pub fn parse(line: &str) -> Result<Command, EngineError> {
    let line = line.trim();
    let first = line.split_whitespace().next().unwrap_or("");
    let agent = Agent::from_name(first).ok_or_else(|| {
        EngineError::Grammar(format!(
            "line must start with Raitha, Netra or Kala, got '{first}'"
        ))
    })?;

    let rest = &line[first.len()..];
    let marker = find_ci(rest, "ex.")
        .ok_or_else(|| EngineError::Grammar("missing 'Ex.<action>' marker".to_string()))?;
    let after = &rest[marker + 3..];
    let action: String = after
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if action.is_empty() {
        return Err(EngineError::Grammar(
            "missing action name after 'Ex.'".to_string(),
        ));
    }

    let params = match after.split_once("--") {
        Some((_, tail)) => tail.trim(),
        None => {
            return Err(EngineError::Grammar(
                "missing '--' parameter block".to_string(),
            ))
        }
    };
    if params.is_empty() {
        return Err(EngineError::Grammar(
            "empty parameter block after '--'".to_string(),
        ));
    }

    Ok(Command {
        agent,
        action: action.to_ascii_lowercase(),
        raw_params: params.to_string(),
    })
}

/// Byte-wise case-insensitive find; the needle is always ASCII here.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let cmd = parse("Raitha Ex.watch -- https://youtu.be/abc.2").unwrap();
        assert_eq!(cmd.agent, Agent::Raitha);
        assert_eq!(cmd.action, "watch");
        assert_eq!(cmd.raw_params, "https://youtu.be/abc.2");
    }

    #[test]
    fn test_parse_case_insensitive() {
        let cmd = parse("rAITHA eX.WATCH -- x").unwrap();
        assert_eq!(cmd.agent, Agent::Raitha);
        assert_eq!(cmd.action, "watch");

        let cmd = parse("KALA Ex.LOOP -- y").unwrap();
        assert_eq!(cmd.agent, Agent::Kala);
        assert_eq!(cmd.action, "loop");
    }

    #[test]
    fn test_parse_unknown_agent() {
        let err = parse("Bob Ex.watch -- x").unwrap_err();
        assert!(matches!(err, EngineError::Grammar(_)));
        assert!(err.to_string().contains("Bob"));
    }

    #[test]
    fn test_parse_missing_marker() {
        let err = parse("Raitha watch -- x").unwrap_err();
        assert!(err.to_string().contains("Ex."));
    }

    #[test]
    fn test_parse_missing_param_block() {
        assert!(parse("Raitha Ex.watch x").is_err());
        assert!(parse("Raitha Ex.watch --").is_err());
        assert!(parse("Raitha Ex.watch --   ").is_err());
    }

    #[test]
    fn test_parse_splits_on_first_double_dash() {
        // Later `--` occurrences are part of the params (nested commands).
        let cmd = parse("Kala Ex.loop -- Raitha Ex.watch -- https://youtu.be/a.1.3.1").unwrap();
        assert_eq!(cmd.action, "loop");
        assert_eq!(cmd.raw_params, "Raitha Ex.watch -- https://youtu.be/a.1.3.1");
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }
}
