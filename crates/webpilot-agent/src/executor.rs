//! Execute one resolved operation and verify it changed the page.
//!
//! Driver errors never escape from here: every outcome is an
//! [`ActionResult`] with a success flag and a message.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use webpilot_script::{ExecutionCommand, SelectorBundle};

use crate::config::TimingConfig;
use crate::driver::{decode, js_arg, Driver};
use crate::verify::{self, FingerprintTarget, StateFingerprint, Verification};
use crate::ElementDescriptor;

/// Outcome of one action.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub state_changed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_selector: Option<String>,
    /// Replayable commands produced by a successful action
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<ExecutionCommand>,
    /// Elements the action was resolved against
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<ElementDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }

    fn with_failed(mut self, selector: &str) -> Self {
        self.failed_selector = Some(selector.to_string());
        self
    }

    pub fn with_matched(mut self, matched: Vec<ElementDescriptor>) -> Self {
        self.matched = matched;
        self
    }
}

/// Where to act: a catalog element, or a raw selector from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRef {
    pub css: String,
    pub frame: Vec<usize>,
    pub selectors: SelectorBundle,
    pub description: String,
    /// Semantic target text for the marker probe
    pub text: Option<String>,
}

impl ElementRef {
    pub fn selector(css: impl Into<String>) -> Self {
        let css = css.into();
        Self {
            selectors: SelectorBundle {
                css: Some(css.clone()),
                ..Default::default()
            },
            description: css.clone(),
            css,
            frame: Vec::new(),
            text: None,
        }
    }
}

impl From<&ElementDescriptor> for ElementRef {
    fn from(el: &ElementDescriptor) -> Self {
        let text = if el.text.is_empty() { &el.label } else { &el.text };
        Self {
            css: el.css.clone(),
            frame: el.frame_path.clone(),
            selectors: el.selector_bundle(),
            description: el.describe(),
            text: (!text.is_empty()).then(|| text.clone()),
        }
    }
}

/// A fully resolved operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Navigate(String),
    Click(ElementRef),
    Type { target: ElementRef, text: String },
    Press(String),
    Scroll(String),
    Wait(u64),
}

/// In-document element script for frames and value read-back.
const ELEMENT_JS: &str = r#"((arg) => { /* wp:element */
    let doc = document;
    for (const i of arg.frame) {
        const f = doc.querySelectorAll('iframe, frame')[i];
        if (!f || !f.contentDocument) return JSON.stringify({ ok: false, error: 'frame ' + i + ' not reachable' });
        doc = f.contentDocument;
    }
    let el;
    try { el = doc.querySelector(arg.css); } catch (e) { return JSON.stringify({ ok: false, error: 'bad selector: ' + e.message }); }
    if (!el) return JSON.stringify({ ok: false, error: 'element not found' });
    if (arg.op === 'value') {
        return JSON.stringify({ ok: true, value: el.isContentEditable ? el.textContent : (el.value ?? '') });
    }
    el.scrollIntoView({ block: 'center' });
    if (arg.op === 'click') {
        el.click();
        return JSON.stringify({ ok: true });
    }
    if (arg.op === 'fill') {
        el.focus();
        const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
        const desc = Object.getOwnPropertyDescriptor(proto, 'value');
        if (desc && desc.set && (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA')) desc.set.call(el, arg.value);
        else el.textContent = arg.value;
        el.dispatchEvent(new Event('input', { bubbles: true }));
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return JSON.stringify({ ok: true });
    }
    return JSON.stringify({ ok: false, error: 'unknown op ' + arg.op });
})"#;

const SCROLL_JS: &str = r#"((dir) => { /* wp:scroll */
    const h = window.innerHeight * 0.8;
    if (dir === 'top') window.scrollTo(0, 0);
    else if (dir === 'bottom') window.scrollTo(0, document.documentElement.scrollHeight);
    else window.scrollBy(0, dir === 'up' ? -h : h);
    return window.scrollY;
})"#;

#[derive(Debug, Deserialize)]
struct ElementOutcome {
    ok: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Run a script op against one element; `Ok(value)` on success.
pub(crate) async fn element_op(
    driver: &dyn Driver,
    target: &ElementRef,
    op: &str,
    value: Option<&str>,
) -> Result<Option<String>, String> {
    let arg = serde_json::json!({
        "frame": target.frame,
        "css": target.css,
        "op": op,
        "value": value,
    });
    let js = format!("{}({})", ELEMENT_JS, js_arg(&arg));
    let raw = driver.evaluate(&js).await.map_err(|e| e.to_string())?;
    let outcome: ElementOutcome = decode(raw).map_err(|e| e.to_string())?;
    if outcome.ok {
        Ok(outcome.value)
    } else {
        Err(outcome.error.unwrap_or_else(|| "element script failed".into()))
    }
}

pub struct Executor<'a> {
    driver: &'a dyn Driver,
    timing: TimingConfig,
}

impl<'a> Executor<'a> {
    pub fn new(driver: &'a dyn Driver, timing: TimingConfig) -> Self {
        Self { driver, timing }
    }

    pub async fn execute(&self, op: &Operation) -> ActionResult {
        match op {
            Operation::Navigate(url) => self.navigate(url).await,
            Operation::Click(target) => self.click(target).await,
            Operation::Type { target, text } => self.type_text(target, text).await,
            Operation::Press(key) => self.press(key).await,
            Operation::Scroll(direction) => self.scroll(direction).await,
            Operation::Wait(ms) => self.wait(*ms).await,
        }
    }

    async fn settle(&self) {
        self.driver
            .settle(self.timing.network_idle_ms, self.timing.network_timeout_ms)
            .await;
        self.driver.wait(self.timing.settle_ms).await;
    }

    async fn fingerprint(&self, target: &ElementRef) -> Result<StateFingerprint, ActionResult> {
        let around = FingerprintTarget {
            text: target.text.as_deref(),
            css: Some(target.css.as_str()),
            framed: !target.frame.is_empty(),
        };
        verify::fingerprint(self.driver, &around)
            .await
            .map_err(|e| ActionResult::failure(format!("could not read page state: {}", e)))
    }

    /// Click and verify. A click that changes nothing observable fails.
    pub async fn click(&self, target: &ElementRef) -> ActionResult {
        let before = match self.fingerprint(target).await {
            Ok(fp) => fp,
            Err(failed) => return failed.with_failed(&target.css),
        };

        let clicked = if target.frame.is_empty() {
            self.driver.click(&target.css).await.map_err(|e| e.to_string())
        } else {
            element_op(self.driver, target, "click", None).await.map(|_| ())
        };
        if let Err(e) = clicked {
            warn!("click {} failed: {}", target.css, e);
            return ActionResult::failure(format!("click on {} failed: {}", target.description, e))
                .with_failed(&target.css);
        }

        self.settle().await;
        let after = match self.fingerprint(target).await {
            Ok(fp) => fp,
            Err(failed) => return failed.with_failed(&target.css),
        };

        match verify::compare(&before, &after) {
            Some(v) => {
                info!("clicked {}: {}", target.description, v);
                ActionResult {
                    success: true,
                    state_changed: true,
                    message: format!("clicked {} ({})", target.description, v.reason.describe()),
                    commands: vec![ExecutionCommand::click(
                        target.css.clone(),
                        Some(target.selectors.clone()),
                        format!("click {}", target.description),
                    )],
                    verification: Some(v),
                    ..Default::default()
                }
            }
            None => {
                warn!("dead click on {}", target.description);
                ActionResult::failure(format!(
                    "click on {} produced no observable change",
                    target.description
                ))
                .with_failed(&target.css)
            }
        }
    }

    /// Type into a field and read the value back.
    pub async fn type_text(&self, target: &ElementRef, text: &str) -> ActionResult {
        let filled = if target.frame.is_empty() {
            self.driver.fill(&target.css, text).await.map_err(|e| e.to_string())
        } else {
            element_op(self.driver, target, "fill", Some(text)).await.map(|_| ())
        };
        if let Err(e) = filled {
            warn!("fill {} failed: {}", target.css, e);
            return ActionResult::failure(format!("typing into {} failed: {}", target.description, e))
                .with_failed(&target.css);
        }
        self.driver.wait(100).await;

        let value = match element_op(self.driver, target, "value", None).await {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                return ActionResult::failure(format!(
                    "{} could not be read back: {}",
                    target.description, e
                ))
                .with_failed(&target.css)
            }
        };
        if !value_matches(&value, text) {
            return ActionResult::failure(format!(
                "{} holds {:?} after typing {:?}",
                target.description, value, text
            ))
            .with_failed(&target.css);
        }

        debug!("typed into {}", target.description);
        ActionResult {
            success: true,
            state_changed: true,
            message: format!("typed \"{}\" into {}", text, target.description),
            commands: vec![ExecutionCommand::type_text(
                target.css.clone(),
                text,
                Some(target.selectors.clone()),
                format!("type into {}", target.description),
            )],
            ..Default::default()
        }
    }

    pub async fn navigate(&self, url: &str) -> ActionResult {
        if let Err(e) = self.driver.goto(url, self.timing.navigation_timeout_ms).await {
            return ActionResult::failure(format!("navigation to {} failed: {}", url, e));
        }
        self.settle().await;
        ActionResult {
            success: true,
            state_changed: true,
            message: format!("navigated to {}", url),
            commands: vec![ExecutionCommand::navigate(url)],
            ..Default::default()
        }
    }

    pub async fn press(&self, key: &str) -> ActionResult {
        if let Err(e) = self.driver.press_key(key).await {
            return ActionResult::failure(format!("pressing {} failed: {}", key, e));
        }
        self.settle().await;
        ActionResult {
            commands: vec![ExecutionCommand::press(key)],
            ..ActionResult::ok(format!("pressed {}", key))
        }
    }

    pub async fn scroll(&self, direction: &str) -> ActionResult {
        let direction = match direction.trim().to_ascii_lowercase().as_str() {
            d @ ("up" | "top" | "bottom") => d.to_string(),
            _ => "down".to_string(),
        };
        let js = format!("{}({})", SCROLL_JS, js_arg(&direction));
        match self.driver.evaluate(&js).await {
            Ok(_) => {
                self.driver.wait(200).await;
                ActionResult::ok(format!("scrolled {}", direction))
            }
            Err(e) => ActionResult::failure(format!("scroll failed: {}", e)),
        }
    }

    pub async fn wait(&self, ms: u64) -> ActionResult {
        self.driver.wait(ms).await;
        ActionResult {
            commands: vec![ExecutionCommand::wait(ms)],
            ..ActionResult::ok(format!("waited {}ms", ms))
        }
    }
}

/// Fields may reformat what was typed (masks, separators), so compare on
/// alphanumerics only.
fn value_matches(value: &str, typed: &str) -> bool {
    let squash = |s: &str| {
        s.chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect::<String>()
    };
    let (v, t) = (squash(value), squash(typed));
    v == t || (!t.is_empty() && v.contains(&t)) || (t.is_empty() && value == typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{element, fingerprint, MockDriver};
    use serde_json::json;

    fn fp(hash: u32) -> serde_json::Value {
        json!(fingerprint("https://example.test/", hash, 20).to_string())
    }

    #[tokio::test]
    async fn test_click_with_change_succeeds() {
        let driver = MockDriver::new();
        driver.on_seq("wp:fingerprint", vec![fp(1), fp(2)]);
        let el = element(0, "button", "Show more");
        let result = Executor::new(&driver, TimingConfig::default())
            .click(&ElementRef::from(&el))
            .await;

        assert!(result.success, "{}", result.message);
        assert!(result.state_changed);
        assert_eq!(result.commands.len(), 1);
        assert_eq!(result.commands[0].target, el.css);
        assert!(driver.calls().contains(&format!("click:{}", el.css)));
    }

    #[tokio::test]
    async fn test_dead_click_fails_without_driver_error() {
        let driver = MockDriver::new();
        driver.on("wp:fingerprint", fp(1));
        let el = element(0, "button", "Does nothing");
        let result = Executor::new(&driver, TimingConfig::default())
            .click(&ElementRef::from(&el))
            .await;

        assert!(!result.success);
        assert!(!result.state_changed);
        assert!(result.commands.is_empty());
        assert_eq!(result.failed_selector.as_deref(), Some(el.css.as_str()));
        assert!(result.message.contains("no observable change"), "{}", result.message);
    }

    #[tokio::test]
    async fn test_click_that_only_focuses_its_button_is_dead() {
        let driver = MockDriver::new();
        let mut focused = fingerprint("https://example.test/", 1, 20);
        focused["focus"] = json!("button#noop[]");
        focused["focus_on_target"] = json!(true);
        driver.on_seq("wp:fingerprint", vec![fp(1), json!(focused.to_string())]);
        let result = Executor::new(&driver, TimingConfig::default())
            .click(&ElementRef::selector("#noop"))
            .await;

        assert!(!result.success, "{}", result.message);
        assert_eq!(result.failed_selector.as_deref(), Some("#noop"));
    }

    #[tokio::test]
    async fn test_driver_error_becomes_failure() {
        let driver = MockDriver::new();
        driver.on("wp:fingerprint", fp(1));
        driver.fail_click("#gone");
        let result = Executor::new(&driver, TimingConfig::default())
            .click(&ElementRef::selector("#gone"))
            .await;
        assert!(!result.success);
        assert_eq!(result.failed_selector.as_deref(), Some("#gone"));
        assert!(result.message.contains("failed"), "{}", result.message);
    }

    #[tokio::test]
    async fn test_framed_click_goes_through_script() {
        let driver = MockDriver::new();
        driver.on_seq("wp:fingerprint", vec![fp(1), fp(5)]);
        driver.on("wp:element", json!("{\"ok\":true}"));
        let mut el = element(0, "button", "Pay");
        el.frame_path = vec![1];
        let result = Executor::new(&driver, TimingConfig::default())
            .click(&ElementRef::from(&el))
            .await;
        assert!(result.success);
        assert_eq!(result.commands[0].selectors.as_ref().unwrap().frame, vec![1]);
        assert!(!driver.calls().iter().any(|c| c.starts_with("click:")));
    }

    #[tokio::test]
    async fn test_type_reads_value_back() {
        let driver = MockDriver::new();
        driver.on("wp:element", json!("{\"ok\":true,\"value\":\"(555) 123-4567\"}"));
        let el = element(0, "input", "");
        let exec = Executor::new(&driver, TimingConfig::default());

        let result = exec.type_text(&ElementRef::from(&el), "5551234567").await;
        assert!(result.success, "{}", result.message);
        assert_eq!(result.commands[0].value.as_deref(), Some("5551234567"));

        let result = exec.type_text(&ElementRef::from(&el), "other").await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_wait_and_navigate_record_commands() {
        let driver = MockDriver::new();
        let exec = Executor::new(&driver, TimingConfig::default());
        let r = exec.execute(&Operation::Wait(250)).await;
        assert_eq!(r.commands[0].wait_ms(), 250);
        let r = exec.execute(&Operation::Navigate("https://b.test/".into())).await;
        assert!(r.success);
        assert!(driver.calls().contains(&"goto:https://b.test/".to_string()));
        let r = exec.execute(&Operation::Scroll("sideways".into())).await;
        assert_eq!(r.message, "scrolled down");
        assert!(r.commands.is_empty());
    }

    #[test]
    fn test_value_matches() {
        assert!(value_matches("hello", "hello"));
        assert!(value_matches("Hello World", "hello world"));
        assert!(value_matches("(555) 123-4567", "5551234567"));
        assert!(!value_matches("", "x"));
        assert!(value_matches("", ""));
    }
}
