use std::{
    ffi::OsStr,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::SandboxError;

/// Global the harness page assigns its metrics object to once rendering is
/// complete. The adapter polls for it becoming non-null.
pub const COMPLETION_SIGNAL: &str = "__renderbench_result";

const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Outcome of one sandbox execution. `fps` is NaN when the payload carries no
/// numeric `fps` field; the comparator treats such series as incomparable.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub name: String,
    pub fps: f64,
    pub raw: Value,
}

impl RunResult {
    pub fn from_payload(raw: Value) -> Self {
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let fps = raw.get("fps").and_then(Value::as_f64).unwrap_or(f64::NAN);
        Self { name, fps, raw }
    }
}

/// One isolated browsing context. Implementations must release every OS
/// resource they hold when dropped, on success and failure paths alike.
pub trait Sandbox {
    fn execute(&mut self, url: &str, timeout: Duration) -> Result<RunResult, SandboxError>;
}

/// Produces fresh sandbox instances. Each acquisition must yield a context
/// sharing no cookies, cache, or GPU warm-up state with any previous one.
pub trait SandboxFactory {
    type Instance: Sandbox;

    fn acquire(&self) -> Result<Self::Instance, SandboxError>;
}

/// Launches a dedicated headless Chromium process per acquisition.
#[derive(Debug, Clone)]
pub struct ChromeSandboxFactory {
    pub window: (u32, u32),
}

impl Default for ChromeSandboxFactory {
    fn default() -> Self {
        Self { window: (800, 600) }
    }
}

impl SandboxFactory for ChromeSandboxFactory {
    type Instance = ChromeSandbox;

    fn acquire(&self) -> Result<ChromeSandbox, SandboxError> {
        let launch_opts = LaunchOptionsBuilder::default()
            .headless(true)
            .window_size(Some(self.window))
            .idle_browser_timeout(Duration::from_secs(300))
            .args(vec![
                OsStr::new("--force-device-scale-factor=1"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-networking"),
                OsStr::new("--disable-sync"),
                OsStr::new("--hide-scrollbars"),
                OsStr::new("--mute-audio"),
            ])
            .build()
            .map_err(|err| SandboxError::Launch(err.to_string()))?;
        let browser =
            Browser::new(launch_opts).map_err(|err| SandboxError::Launch(err.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|err| SandboxError::Launch(err.to_string()))?;
        Ok(ChromeSandbox { browser, tab })
    }
}

/// Sandbox backed by an exclusively owned Chromium process. Dropping the
/// struct tears the whole process down, so no run can leak into the next.
pub struct ChromeSandbox {
    // Held for its lifetime; the process dies when this is dropped.
    #[allow(dead_code)]
    browser: Browser,
    tab: Arc<Tab>,
}

impl Sandbox for ChromeSandbox {
    fn execute(&mut self, url: &str, timeout: Duration) -> Result<RunResult, SandboxError> {
        debug!(url, "navigating sandbox");
        self.tab
            .navigate_to(url)
            .map_err(|err| SandboxError::NavigationFailed {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        self.tab
            .wait_until_navigated()
            .map_err(|err| SandboxError::NavigationFailed {
                url: url.to_string(),
                reason: err.to_string(),
            })?;

        let probe = format!(
            "window.{signal} ? JSON.stringify(window.{signal}) : null",
            signal = COMPLETION_SIGNAL
        );
        let started = Instant::now();
        loop {
            match self.tab.evaluate(&probe, false) {
                Ok(evaluation) => match evaluation.value {
                    Some(Value::String(serialized)) => {
                        let raw: Value = serde_json::from_str(&serialized).map_err(|err| {
                            SandboxError::SignalUnreadable {
                                url: url.to_string(),
                                reason: err.to_string(),
                            }
                        })?;
                        return Ok(RunResult::from_payload(raw));
                    }
                    Some(Value::Null) | None => {}
                    Some(other) => {
                        return Err(SandboxError::SignalUnreadable {
                            url: url.to_string(),
                            reason: format!("expected a JSON string, got {other}"),
                        });
                    }
                },
                // Evaluation can fail transiently while the page is still
                // loading; keep polling until the deadline.
                Err(err) => trace!(url, error = %err, "signal probe failed; retrying"),
            }

            if started.elapsed() >= timeout {
                return Err(SandboxError::Timeout {
                    url: url.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            thread::sleep(SIGNAL_POLL_INTERVAL);
        }
    }
}
