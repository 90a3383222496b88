mod executor;

use crate::script::{BrowserConfig, Script};
use crate::{Error, Result};
use eoka::{Browser, Page};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Outcome of replaying a script.
#[derive(Debug)]
pub struct RunResult {
    pub success: bool,
    /// Why the final attempt stopped.
    pub error: Option<String>,
    /// Actions completed in the final attempt.
    pub actions_executed: usize,
    /// Failing action as `#n name`, when one failed.
    pub failed_action: Option<String>,
    pub duration_ms: u64,
    /// Attempts made after the first.
    pub retries: u32,
    /// Where the failure screenshot went, if one was written.
    pub screenshot: Option<String>,
}

/// Where one attempt stopped.
struct Stopped {
    completed: usize,
    action: Option<String>,
    error: Error,
}

/// Replays scripts in a browser of its own.
pub struct Runner {
    browser: Browser,
    page: Page,
}

impl Runner {
    pub async fn new(config: &BrowserConfig) -> Result<Self> {
        debug!(
            "launching replay browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let browser = Browser::launch_with_config(config.stealth()).await?;
        let page = browser.new_page("about:blank").await?;
        Ok(Self { browser, page })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Replay from `target.url`. A failed attempt starts over from the top,
    /// up to `on_failure.retry.attempts` times.
    pub async fn run(&mut self, script: &Script) -> Result<RunResult> {
        let start = Instant::now();
        let retry = script.on_failure.as_ref().and_then(|f| f.retry.as_ref());
        let attempts = retry.map_or(1, |r| r.attempts.max(1));
        let delay = Duration::from_millis(retry.map_or(0, |r| r.delay_ms));

        let mut last = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                info!("retrying {} ({}/{})", script.name, attempt, attempts);
                tokio::time::sleep(delay).await;
            }
            match self.attempt(script).await {
                Ok(completed) => {
                    return Ok(RunResult {
                        success: true,
                        error: None,
                        actions_executed: completed,
                        failed_action: None,
                        duration_ms: start.elapsed().as_millis() as u64,
                        retries: attempt - 1,
                        screenshot: None,
                    });
                }
                Err(stopped) => {
                    warn!(
                        "attempt {} stopped after {} actions: {}",
                        attempt, stopped.completed, stopped.error
                    );
                    last = Some(stopped);
                }
            }
        }

        let screenshot = self.failure_screenshot(script).await;
        let (completed, action, error) = match last {
            Some(s) => (s.completed, s.action, Some(s.error.to_string())),
            None => (0, None, None),
        };
        Ok(RunResult {
            success: false,
            error,
            actions_executed: completed,
            failed_action: action,
            duration_ms: start.elapsed().as_millis() as u64,
            retries: attempts - 1,
            screenshot,
        })
    }

    async fn attempt(&mut self, script: &Script) -> std::result::Result<usize, Stopped> {
        info!("opening {}", script.target.url);
        if let Err(e) = self.page.goto(&script.target.url).await {
            return Err(Stopped {
                completed: 0,
                action: None,
                error: e.into(),
            });
        }
        for (i, action) in script.actions.iter().enumerate() {
            debug!("action #{}: {}", i + 1, action.name());
            if let Err(error) = executor::execute(&self.page, action).await {
                return Err(Stopped {
                    completed: i,
                    action: Some(format!("#{} {}", i + 1, action.name())),
                    error,
                });
            }
        }
        Ok(script.actions.len())
    }

    /// Write `on_failure.screenshot`, expanding `{timestamp}` and `{name}`.
    async fn failure_screenshot(&self, script: &Script) -> Option<String> {
        let template = script.on_failure.as_ref()?.screenshot.as_ref()?;
        let path = screenshot_path(template, &script.name, unix_now());
        let data = match self.page.screenshot().await {
            Ok(data) => data,
            Err(e) => {
                warn!("failure screenshot not taken: {}", e);
                return None;
            }
        };
        match std::fs::write(&path, data) {
            Ok(()) => {
                info!("failure screenshot saved to {}", path);
                Some(path)
            }
            Err(e) => {
                warn!("failure screenshot not written to {}: {}", path, e);
                None
            }
        }
    }

    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn screenshot_path(template: &str, name: &str, timestamp: u64) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    template
        .replace("{timestamp}", &timestamp.to_string())
        .replace("{name}", slug.trim_matches('-'))
}
