use thiserror::Error;

/// Everything a command can fail with. There is no fatal class: the engine
/// catches all of these at the dispatch boundary and keeps processing.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("grammar error: {0}")]
    Grammar(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("unknown action '{action}' for {agent} (valid: {valid})")]
    UnknownAction {
        agent: &'static str,
        action: String,
        valid: String,
    },

    #[error("bad parameters: expected {expected}, got '{got}'")]
    ParameterFormat { expected: &'static str, got: String },

    #[error("could not extract a media id from '{0}'")]
    Extraction(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported capability: {0}")]
    Unsupported(String),
}
