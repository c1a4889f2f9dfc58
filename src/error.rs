use thiserror::Error;

/// Failures raised while executing a scenario inside an isolated browser
/// sandbox. All of these are fatal for the whole invocation: repeats exist to
/// stabilise measurements, not to paper over broken runs.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to launch browser sandbox: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("timed out after {waited_ms}ms waiting for the completion signal at {url}")]
    Timeout { url: String, waited_ms: u64 },

    #[error("completion signal at {url} is unreadable: {reason}")]
    SignalUnreadable { url: String, reason: String },
}

/// Failures raised while walking the benchmark root for scenarios.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("benchmark root {0} does not exist")]
    RootMissing(String),

    #[error("no benchmark scenarios found under {0}")]
    NoScenarios(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures talking to the external comment sink. Never fatal: the invocation
/// outcome is driven by the comparator verdict, not by reporting integration.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("comment sink request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("comment sink responded with status {status}: {body}")]
    Api { status: u16, body: String },
}
