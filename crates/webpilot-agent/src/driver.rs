//! The browser seam. Everything above this module talks to a [`Driver`],
//! never to a concrete browser, so the catalog, executor and loop can be
//! exercised against a scripted driver in tests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Error, Result};

/// What the core needs from a browser page.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Navigate. A navigation timeout is logged and tolerated, not an error.
    async fn goto(&self, url: &str, timeout_ms: u64) -> Result<()>;

    /// Evaluate a script expression in the top document.
    async fn evaluate(&self, js: &str) -> Result<Value>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Clear and type into the element.
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    /// Type into whatever has focus.
    async fn type_text(&self, text: &str) -> Result<()>;

    async fn press_key(&self, key: &str) -> Result<()>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn wait(&self, ms: u64);

    /// Best-effort wait for the network to go quiet.
    async fn settle(&self, idle_ms: u64, timeout_ms: u64) {
        let _ = (idle_ms, timeout_ms);
        self.wait(50).await;
    }

    /// All frames reachable from the top document.
    async fn frames(&self) -> Result<Vec<FrameInfo>> {
        eval_as(self, FRAMES_JS).await
    }
}

/// A frame of the current page.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FrameInfo {
    /// Iframe indices from the top document; empty for the main frame.
    pub path: Vec<usize>,
    pub url: String,
    /// Cross-origin frames are listed but cannot be scripted.
    pub same_origin: bool,
}

const FRAMES_JS: &str = r#"(() => {
    const out = [];
    function walk(doc, path, url) {
        out.push({ path, url, same_origin: true });
        doc.querySelectorAll('iframe, frame').forEach((f, i) => {
            let child = null;
            try { child = f.contentDocument; } catch (e) { child = null; }
            if (child && child.documentElement) {
                walk(child, path.concat([i]), child.location ? child.location.href : (f.src || ''));
            } else {
                out.push({ path: path.concat([i]), url: f.src || '', same_origin: false });
            }
        });
    }
    walk(document, [], location.href);
    return JSON.stringify(out);
})()"#;

/// Evaluate and deserialize. Scripts may return either a JSON string (the
/// convention for large payloads) or a plain value.
pub async fn eval_as<T, D>(driver: &D, js: &str) -> Result<T>
where
    T: DeserializeOwned,
    D: Driver + ?Sized,
{
    let value = driver.evaluate(js).await?;
    decode(value)
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    match value {
        Value::String(s) => serde_json::from_str(&s).map_err(|e| {
            let head: String = s.chars().take(80).collect();
            Error::PageScript(format!("{} (got: {})", e, head))
        }),
        other => serde_json::from_value(other).map_err(|e| Error::PageScript(e.to_string())),
    }
}

/// JSON-encode a value for splicing into a script.
pub(crate) fn js_arg<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}

#[async_trait]
impl Driver for eoka::Page {
    async fn goto(&self, url: &str, timeout_ms: u64) -> Result<()> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), eoka::Page::goto(self, url))
            .await
        {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!("navigation to {} timed out after {}ms, continuing", url, timeout_ms);
                Ok(())
            }
        }
    }

    async fn evaluate(&self, js: &str) -> Result<Value> {
        Ok(eoka::Page::evaluate::<Value>(self, js).await?)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        debug!("click {}", selector);
        Ok(eoka::Page::click(self, selector).await?)
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        Ok(eoka::Page::fill(self, selector, text).await?)
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        Ok(eoka::Page::type_text(self, text).await?)
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        Ok(self.human().press_key(key).await?)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(eoka::Page::screenshot(self).await?)
    }

    async fn url(&self) -> Result<String> {
        Ok(eoka::Page::url(self).await?)
    }

    async fn title(&self) -> Result<String> {
        Ok(eoka::Page::title(self).await?)
    }

    async fn wait(&self, ms: u64) {
        eoka::Page::wait(self, ms).await;
    }

    async fn settle(&self, idle_ms: u64, timeout_ms: u64) {
        // Some sites poll forever; a timeout here is normal
        let _ = self.wait_for_network_idle(idle_ms, timeout_ms).await;
        eoka::Page::wait(self, 50).await;
    }
}
