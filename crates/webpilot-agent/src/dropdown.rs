//! Dropdown interaction: resolve the trigger, open it, pick an option.
//!
//! Native `<select>` elements short-circuit to a direct selection. Everything
//! else walks a fixed ladder of strategies and stops at the first that works.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use webpilot_script::{ExecutionCommand, SelectorBundle};

use crate::driver::{eval_as, js_arg, Driver};
use crate::executor::{element_op, ElementRef};
use crate::selector::{self, Lineage, LINEAGE_FN};
use crate::{Error, Result};

/// What a dropdown instruction asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropdownIntent {
    OpenThenSelect { dropdown: String, option: String },
    /// The dropdown is assumed to be open already.
    SelectOnly { option: String },
}

impl DropdownIntent {
    /// Split "open X and select Y" / "select Y from X" / "select Y".
    pub fn parse(instruction: &str) -> Option<Self> {
        static OPEN_THEN: OnceLock<Regex> = OnceLock::new();
        static FROM: OnceLock<Regex> = OnceLock::new();
        static ONLY: OnceLock<Regex> = OnceLock::new();
        let open_then = OPEN_THEN.get_or_init(|| {
            Regex::new(r"(?i)^\s*(?:open|click|expand)\s+(?:on\s+)?(?:the\s+)?(.+?)\s+(?:and|then|,)\s+(?:then\s+)?(?:select|choose|pick|click)\s+(?:on\s+)?(?:the\s+)?(.+?)\s*$")
                .expect("open-then pattern is valid")
        });
        let from = FROM.get_or_init(|| {
            Regex::new(r"(?i)^\s*(?:select|choose|pick)\s+(?:the\s+)?(.+?)\s+(?:from|in|on)\s+(?:the\s+)?(.+?)\s*$")
                .expect("from pattern is valid")
        });
        let only = ONLY.get_or_init(|| {
            Regex::new(r"(?i)^\s*(?:select|choose|pick|click)\s+(?:on\s+)?(?:the\s+)?(.+?)\s*$")
                .expect("select pattern is valid")
        });

        let (dropdown, option) = if let Some(c) = open_then.captures(instruction) {
            (clean(&c[1]), clean(&c[2]))
        } else if let Some(c) = from.captures(instruction) {
            (clean(&c[2]), clean(&c[1]))
        } else if let Some(c) = only.captures(instruction) {
            (String::new(), clean(&c[1]))
        } else {
            (String::new(), clean(instruction))
        };

        if option.is_empty() {
            return None;
        }
        Some(if dropdown.is_empty() {
            DropdownIntent::SelectOnly { option }
        } else {
            DropdownIntent::OpenThenSelect { dropdown, option }
        })
    }

    pub fn option(&self) -> &str {
        match self {
            Self::OpenThenSelect { option, .. } | Self::SelectOnly { option } => option,
        }
    }
}

/// Strip quotes and trailing control nouns: `"State" dropdown` → `State`.
fn clean(s: &str) -> String {
    const SUFFIXES: [&str; 7] = ["dropdown", "drop-down", "menu", "list", "select", "option", "field"];
    let mut out = s.trim().to_string();
    while let Some(cut) = SUFFIXES.iter().find_map(|suf| {
        let cut = out.len().checked_sub(suf.len())?;
        let matches = cut > 0
            && out.is_char_boundary(cut)
            && out[cut..].eq_ignore_ascii_case(suf)
            && out[..cut].ends_with(' ');
        matches.then_some(cut)
    }) {
        out.truncate(cut);
        out = out.trim_end().to_string();
    }
    out.trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”' || c.is_whitespace())
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    Click,
    Keyboard,
    NativeSelect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Native,
    FocusedInput,
    RoleOption,
    FloatingMenu,
    VisualScan,
    BlindType,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Native => "native select",
            Self::FocusedInput => "focused input",
            Self::RoleOption => "role option",
            Self::FloatingMenu => "floating menu",
            Self::VisualScan => "visual scan",
            Self::BlindType => "blind type",
        }
    }
}

/// How an option was chosen and how to replay it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropdownSelection {
    pub method: SelectionMethod,
    pub strategy: Strategy,
    /// Selector of the concrete option node, when one was captured
    pub option_selector: Option<String>,
    /// Option text, for keyboard selections without a selector
    pub text_fallback: Option<String>,
    /// Value of a native option
    pub value: Option<String>,
    pub commands: Vec<ExecutionCommand>,
}

#[derive(Debug)]
struct OpenedTrigger {
    native: bool,
    css: String,
    selectors: SelectorBundle,
    description: String,
}

#[derive(Debug, Deserialize)]
struct TriggerProbe {
    found: bool,
    #[serde(default)]
    native: bool,
    #[serde(default)]
    text: String,
    #[serde(default)]
    lineage: Option<Lineage>,
}

#[derive(Debug, Deserialize)]
struct NativeProbe {
    ok: bool,
    #[serde(default)]
    text: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    option: Option<Lineage>,
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OptionProbe {
    ok: bool,
    #[serde(default)]
    text: String,
    #[serde(default)]
    lineage: Option<Lineage>,
}

const HELPERS: &str = r#"
const norm = s => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
const shown = el => {
    const r = el.getBoundingClientRect();
    if (r.width === 0 || r.height === 0) return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && parseFloat(s.opacity) > 0;
};
const nameOf = el => norm(el.getAttribute('aria-label') || el.innerText || el.textContent || el.value || '');
const trigger = document.querySelector('[data-webpilot-dropdown="' + arg.token + '"]');
const want = norm(arg.label);
const leafOf = list => list.find(e => !list.some(o => o !== e && e.contains(o))) || list[0];
const mark = el => {
    document.querySelectorAll('[data-webpilot-option]').forEach(e => e.removeAttribute('data-webpilot-option'));
    el.setAttribute('data-webpilot-option', arg.token);
    return JSON.stringify({ ok: true, text: (el.innerText || el.textContent || '').trim().slice(0, 80), lineage: wpLineage(el) });
};
const miss = () => JSON.stringify({ ok: false });
"#;

const TRIGGER_BODY: &str = r#"/* wp:dropdown-trigger */
let el = null;
try { el = document.querySelector(arg.query); } catch (e) { el = null; }
if (!el) {
    const q = norm(arg.query);
    const groups = ['button, [role="button"]', 'a', '[role="combobox"], select, [aria-haspopup]', 'label, span, div, li, p'];
    for (const sel of groups) {
        const list = Array.from(document.querySelectorAll(sel)).filter(shown);
        const label = e => norm(e.getAttribute('aria-label') || e.getAttribute('placeholder') || e.getAttribute('name') || e.innerText || '');
        el = list.find(e => label(e) === q) || list.find(e => label(e).includes(q) && label(e).length < q.length + 40) || null;
        if (el) break;
    }
    if (el && el.localName === 'label' && el.control) el = el.control;
}
if (!el) return JSON.stringify({ found: false });
const native = el.localName === 'select' ? el : el.querySelector('select');
const node = native || el;
node.setAttribute('data-webpilot-dropdown', arg.token);
return JSON.stringify({ found: true, native: !!native, text: (node.innerText || node.getAttribute('aria-label') || '').trim().slice(0, 80), lineage: wpLineage(node) });
"#;

const NATIVE_BODY: &str = r#"/* wp:native-select */
if (!trigger) return JSON.stringify({ ok: false });
const opts = Array.from(trigger.options);
const opt = opts.find(o => norm(o.text) === want) || opts.find(o => norm(o.text).includes(want));
if (!opt) return JSON.stringify({ ok: false, options: opts.slice(0, 30).map(o => o.text.trim()) });
trigger.value = opt.value;
opt.selected = true;
trigger.dispatchEvent(new Event('input', { bubbles: true }));
trigger.dispatchEvent(new Event('change', { bubbles: true }));
return JSON.stringify({ ok: true, text: opt.text.trim(), value: trigger.value, option: wpLineage(opt) });
"#;

const FOCUSED_BODY: &str = r#"/* wp:focused-input */
const a = document.activeElement;
if (!a || a === document.body || a === document.documentElement) return miss();
const type = (a.getAttribute('type') || 'text').toLowerCase();
const textual = (a.localName === 'input' && ['text', 'search', 'email', 'tel', 'url'].includes(type))
    || a.localName === 'textarea' || a.getAttribute('role') === 'combobox' || a.isContentEditable;
return textual ? JSON.stringify({ ok: true, lineage: wpLineage(a) }) : miss();
"#;

const ROLE_BODY: &str = r#"/* wp:role-option */
const list = Array.from(document.querySelectorAll('[role="option"], [role="menuitem"], [role="menuitemradio"], [role="menuitemcheckbox"], [role="link"], [role="button"], a, button'))
    .filter(e => e !== trigger && shown(e));
const el = list.find(e => nameOf(e) === want)
    || list.filter(e => /option|menuitem/.test(e.getAttribute('role') || '')).find(e => nameOf(e).includes(want));
return el ? mark(el) : miss();
"#;

const FLOATING_BODY: &str = r#"/* wp:floating-menu */
const containers = Array.from(document.querySelectorAll('[role="listbox"], [role="menu"], .dropdown-menu, [class*="dropdown"], [class*="popover"], [class*="menu"], [class*="options"]')).filter(shown);
for (const el of document.body.querySelectorAll('*')) {
    const s = getComputedStyle(el);
    if ((s.position === 'absolute' || s.position === 'fixed') && parseInt(s.zIndex, 10) >= 10 && shown(el)) containers.push(el);
}
for (const c of containers) {
    const items = Array.from(c.querySelectorAll('*')).filter(e => e !== trigger && nameOf(e) === want && shown(e));
    if (!items.length) continue;
    const leaf = leafOf(items);
    const item = leaf.closest('li, [role="option"], [role="menuitem"], a, button');
    return mark(item && c.contains(item) ? item : leaf);
}
return miss();
"#;

const SCAN_BODY: &str = r#"/* wp:visual-scan */
if (!want) return miss();
const found = [];
for (const el of document.body.querySelectorAll('li, a, button, span, div, p, td, label, [role], [tabindex]')) {
    if (el === trigger || (trigger && el.contains(trigger))) continue;
    const name = nameOf(el);
    if (!name.includes(want) || !shown(el)) continue;
    found.push(el);
    if (found.length >= 20) break;
}
const exact = found.filter(e => nameOf(e) === want);
const pool = exact.length ? exact : found;
return pool.length ? mark(leafOf(pool)) : miss();
"#;

fn script(body: &str, arg: &serde_json::Value) -> String {
    format!(
        "((arg) => {{\n{}\n{}\n{}\n}})({})",
        LINEAGE_FN,
        HELPERS,
        body,
        js_arg(arg)
    )
}

fn unique_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("wp{:x}", nanos)
}

/// One dropdown interaction.
pub struct Dropdown<'a> {
    driver: &'a dyn Driver,
    settle_ms: u64,
    token: String,
    trigger: Option<OpenedTrigger>,
    pending: Vec<ExecutionCommand>,
}

impl<'a> Dropdown<'a> {
    pub fn new(driver: &'a dyn Driver, settle_ms: u64) -> Self {
        Self {
            driver,
            settle_ms,
            token: unique_token(),
            trigger: None,
            pending: Vec::new(),
        }
    }

    /// Parse-free entry point for a whole intent.
    pub async fn run(&mut self, intent: &DropdownIntent) -> Result<DropdownSelection> {
        if let DropdownIntent::OpenThenSelect { dropdown, .. } = intent {
            self.open(dropdown).await?;
        }
        self.select_option(intent.option()).await
    }

    fn arg(&self, extra: serde_json::Value) -> serde_json::Value {
        let mut arg = serde_json::json!({ "token": self.token, "label": "" });
        if let (Some(obj), serde_json::Value::Object(more)) = (arg.as_object_mut(), extra) {
            obj.extend(more);
        }
        arg
    }

    fn option_marker(&self) -> String {
        format!("[data-webpilot-option=\"{}\"]", self.token)
    }

    /// Resolve the trigger and, unless it is a native select, click it open.
    pub async fn open(&mut self, trigger: &str) -> Result<()> {
        let js = script(TRIGGER_BODY, &self.arg(serde_json::json!({ "query": trigger })));
        let probe: TriggerProbe = eval_as(self.driver, &js).await?;
        if !probe.found {
            return Err(Error::ElementNotFound(format!("dropdown '{}'", trigger)));
        }

        let marker = format!("[data-webpilot-dropdown=\"{}\"]", self.token);
        let (css, xpath) = match &probe.lineage {
            Some(l) => {
                let s = selector::synthesize(l);
                (s.css, Some(s.xpath))
            }
            None => (marker.clone(), None),
        };
        let text = if probe.text.is_empty() { trigger.to_string() } else { probe.text.clone() };
        let opened = OpenedTrigger {
            native: probe.native,
            selectors: SelectorBundle {
                css: Some(css.clone()),
                xpath,
                id: None,
                text: Some(text.clone()),
                frame: Vec::new(),
            },
            css,
            description: format!("'{}' dropdown", text),
        };
        debug!("dropdown trigger {} (native: {})", opened.css, opened.native);

        if !opened.native {
            match self.driver.click(&marker).await {
                Ok(()) => self.pending.push(ExecutionCommand::click(
                    opened.css.clone(),
                    Some(opened.selectors.clone()),
                    format!("open {}", opened.description),
                )),
                // Some widgets open on focus alone
                Err(e) => debug!("trigger click failed, continuing: {}", e),
            }
            self.driver.wait(self.settle_ms).await;
        }
        self.trigger = Some(opened);
        Ok(())
    }

    /// Pick `label`, first strategy that works wins.
    pub async fn select_option(&mut self, label: &str) -> Result<DropdownSelection> {
        if self.trigger.as_ref().is_some_and(|t| t.native) {
            return self.select_native(label).await;
        }

        if let Some(focused) = self.probe(FOCUSED_BODY, label).await {
            return self
                .keyboard(label, Strategy::FocusedInput, None, focused.lineage.as_ref())
                .await;
        }
        for (body, strategy, force) in [
            (ROLE_BODY, Strategy::RoleOption, false),
            (FLOATING_BODY, Strategy::FloatingMenu, false),
            (SCAN_BODY, Strategy::VisualScan, true),
        ] {
            if let Some(found) = self.probe(body, label).await {
                if let Some(selection) = self.click_marked(found, label, strategy, force).await {
                    return Ok(selection);
                }
            }
        }

        // Last resort: type blind, then look for something to record
        let located = self.probe(SCAN_BODY, label).await;
        self.keyboard(label, Strategy::BlindType, located, None).await
    }

    async fn probe(&self, body: &str, label: &str) -> Option<OptionProbe> {
        let js = script(body, &self.arg(serde_json::json!({ "label": label })));
        match eval_as::<OptionProbe, _>(self.driver, &js).await {
            Ok(p) if p.ok => Some(p),
            Ok(_) => None,
            Err(e) => {
                debug!("dropdown probe failed: {}", e);
                None
            }
        }
    }

    async fn select_native(&mut self, label: &str) -> Result<DropdownSelection> {
        let js = script(NATIVE_BODY, &self.arg(serde_json::json!({ "label": label })));
        let probe: NativeProbe = eval_as(self.driver, &js).await?;
        if !probe.ok {
            return Err(Error::ElementNotFound(format!(
                "option '{}' (available: {})",
                label,
                probe.options.join(", ")
            )));
        }
        let trigger = self
            .trigger
            .as_ref()
            .ok_or_else(|| Error::ElementNotFound("native select trigger".into()))?;
        info!("selected '{}' in {}", probe.text, trigger.description);
        let mut commands = std::mem::take(&mut self.pending);
        commands.push(ExecutionCommand::select(
            trigger.css.clone(),
            probe.text.clone(),
            Some(trigger.selectors.clone()),
            format!("select '{}' in {}", probe.text, trigger.description),
        ));
        Ok(DropdownSelection {
            method: SelectionMethod::NativeSelect,
            strategy: Strategy::Native,
            option_selector: probe.option.as_ref().map(|l| selector::synthesize(l).css),
            text_fallback: None,
            value: Some(probe.value),
            commands,
        })
    }

    async fn click_marked(
        &mut self,
        found: OptionProbe,
        label: &str,
        strategy: Strategy,
        force: bool,
    ) -> Option<DropdownSelection> {
        let marker = self.option_marker();
        if let Err(e) = self.driver.click(&marker).await {
            if !force {
                debug!("{} click failed: {}", strategy.name(), e);
                return None;
            }
            if let Err(e) = element_op(self.driver, &ElementRef::selector(marker), "click", None).await {
                debug!("{} forced click failed: {}", strategy.name(), e);
                return None;
            }
        }
        self.driver.wait(self.settle_ms).await;

        let text = if found.text.is_empty() { label.to_string() } else { found.text };
        let (css, bundle) = recorded(found.lineage.as_ref(), &text);
        info!("selected '{}' via {}", text, strategy.name());
        let mut click = ExecutionCommand::click(
            css.clone().unwrap_or_else(|| text.clone()),
            Some(bundle),
            format!("select '{}'", text),
        );
        if force {
            click = click.forced();
        }
        let mut commands = std::mem::take(&mut self.pending);
        commands.push(click);
        Some(DropdownSelection {
            method: SelectionMethod::Click,
            strategy,
            option_selector: css,
            text_fallback: None,
            value: None,
            commands,
        })
    }

    /// Type `label` and press Enter. `located` is an option found afterwards,
    /// recorded as a click; otherwise the typing itself is recorded, against
    /// `field` when the focused input is known.
    async fn keyboard(
        &mut self,
        label: &str,
        strategy: Strategy,
        located: Option<OptionProbe>,
        field: Option<&Lineage>,
    ) -> Result<DropdownSelection> {
        self.driver.type_text(label).await?;
        self.driver.wait(self.settle_ms).await;
        self.driver.press_key("Enter").await?;
        self.driver.wait(self.settle_ms).await;
        info!("selected '{}' via {}", label, strategy.name());

        let mut commands = std::mem::take(&mut self.pending);
        let (option_selector, text_fallback) = match located.and_then(|p| p.lineage) {
            Some(lineage) => {
                let (css, bundle) = recorded(Some(&lineage), label);
                commands.push(ExecutionCommand::click(
                    css.clone().unwrap_or_else(|| label.to_string()),
                    Some(bundle),
                    format!("select '{}'", label),
                ));
                (css, None)
            }
            None => {
                let (target, selectors) = match field.map(selector::synthesize) {
                    Some(sel) => (
                        sel.css.clone(),
                        Some(SelectorBundle {
                            css: Some(sel.css),
                            xpath: Some(sel.xpath),
                            ..Default::default()
                        }),
                    ),
                    None => (String::new(), None),
                };
                commands.push(ExecutionCommand::type_text(
                    target,
                    label,
                    selectors,
                    format!("type '{}'", label),
                ));
                commands.push(ExecutionCommand::press("Enter"));
                (None, Some(label.to_string()))
            }
        };
        Ok(DropdownSelection {
            method: SelectionMethod::Keyboard,
            strategy,
            option_selector,
            text_fallback,
            value: None,
            commands,
        })
    }
}

fn recorded(lineage: Option<&Lineage>, text: &str) -> (Option<String>, SelectorBundle) {
    let synthesized = lineage.map(selector::synthesize);
    let bundle = SelectorBundle {
        css: synthesized.as_ref().map(|s| s.css.clone()),
        xpath: synthesized.as_ref().map(|s| s.xpath.clone()),
        id: None,
        text: Some(text.to_string()),
        frame: Vec::new(),
    };
    (synthesized.map(|s| s.css), bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;
    use serde_json::json;
    use webpilot_script::CommandKind;

    fn lineage(tag: &str, id: Option<&str>, parent: Option<(&str, &str)>) -> serde_json::Value {
        let mut steps = vec![json!({"tag": tag, "id": id, "id_unique": id.is_some(), "nth_of_type": 1, "same_tag": 2, "nth_child": 1})];
        if let Some((ptag, pid)) = parent {
            steps.push(json!({"tag": ptag, "id": pid, "id_unique": true, "nth_of_type": 1, "same_tag": 1, "nth_child": 1}));
        }
        steps.push(json!({"tag": "body", "nth_of_type": 1, "same_tag": 1, "nth_child": 2}));
        steps.push(json!({"tag": "html", "nth_of_type": 1, "same_tag": 1, "nth_child": 1}));
        json!({"tag": tag, "id": id, "id_unique": id.is_some(), "steps": steps})
    }

    #[test]
    fn test_intent_parse() {
        assert_eq!(
            DropdownIntent::parse("open the State dropdown and select Indiana"),
            Some(DropdownIntent::OpenThenSelect {
                dropdown: "State".into(),
                option: "Indiana".into()
            })
        );
        assert_eq!(
            DropdownIntent::parse("select \"Large\" from the Size menu"),
            Some(DropdownIntent::OpenThenSelect {
                dropdown: "Size".into(),
                option: "Large".into()
            })
        );
        assert_eq!(
            DropdownIntent::parse("Select 'Blue'"),
            Some(DropdownIntent::SelectOnly { option: "Blue".into() })
        );
        assert_eq!(
            DropdownIntent::parse("Iowa"),
            Some(DropdownIntent::SelectOnly { option: "Iowa".into() })
        );
        assert_eq!(DropdownIntent::parse("  "), None);
    }

    #[test]
    fn test_clean_strips_suffixes_and_quotes() {
        assert_eq!(clean("\"Country\" drop-down"), "Country");
        assert_eq!(clean("Sort menu"), "Sort");
        assert_eq!(clean("menu"), "menu");
    }

    #[tokio::test]
    async fn test_native_select_scenario() {
        let driver = MockDriver::new();
        driver.on(
            "wp:dropdown-trigger",
            json!(json!({"found": true, "native": true, "text": "", "lineage": lineage("select", Some("state"), None)}).to_string()),
        );
        driver.on(
            "wp:native-select",
            json!(json!({"ok": true, "text": "Indiana", "value": "Indiana",
                         "option": lineage("option", None, Some(("select", "state")))}).to_string()),
        );

        let mut dropdown = Dropdown::new(&driver, 0);
        dropdown.open("#state").await.unwrap();
        let selection = dropdown.select_option("Indiana").await.unwrap();

        assert_eq!(selection.method, SelectionMethod::NativeSelect);
        assert_eq!(selection.value.as_deref(), Some("Indiana"));
        assert_eq!(selection.option_selector.as_deref(), Some("#state > option:nth-of-type(1)"));
        assert_eq!(selection.commands.len(), 1);
        assert_eq!(selection.commands[0].kind, CommandKind::Select);
        assert_eq!(selection.commands[0].target, "#state");
        assert_eq!(selection.commands[0].value.as_deref(), Some("Indiana"));
        assert!(!driver.calls().iter().any(|c| c.starts_with("click:")));
    }

    #[tokio::test]
    async fn test_native_select_missing_option() {
        let driver = MockDriver::new();
        driver.on(
            "wp:dropdown-trigger",
            json!(json!({"found": true, "native": true, "lineage": lineage("select", Some("state"), None)}).to_string()),
        );
        driver.on("wp:native-select", json!("{\"ok\":false,\"options\":[\"Indiana\",\"Iowa\"]}"));
        let mut dropdown = Dropdown::new(&driver, 0);
        dropdown.open("#state").await.unwrap();
        let err = dropdown.select_option("Texas").await.unwrap_err().to_string();
        assert!(err.contains("Indiana, Iowa"), "{}", err);
    }

    #[tokio::test]
    async fn test_role_option_stops_the_ladder() {
        let driver = MockDriver::new();
        driver.on(
            "wp:dropdown-trigger",
            json!(json!({"found": true, "native": false, "text": "Size", "lineage": lineage("button", Some("size"), None)}).to_string()),
        );
        driver.on("wp:focused-input", json!("{\"ok\":false}"));
        driver.on(
            "wp:role-option",
            json!(json!({"ok": true, "text": "Large", "lineage": lineage("li", None, Some(("ul", "sizes")))}).to_string()),
        );

        let mut dropdown = Dropdown::new(&driver, 0);
        let intent = DropdownIntent::parse("open Size and select Large").unwrap();
        let selection = dropdown.run(&intent).await.unwrap();

        assert_eq!(selection.method, SelectionMethod::Click);
        assert_eq!(selection.strategy, Strategy::RoleOption);
        assert_eq!(selection.option_selector.as_deref(), Some("#sizes > li:nth-of-type(1)"));
        assert_eq!(driver.evaluated("wp:role-option"), 1);
        assert_eq!(driver.evaluated("wp:floating-menu"), 0);
        assert_eq!(driver.evaluated("wp:visual-scan"), 0);
        assert!(!driver.calls().iter().any(|c| c.starts_with("type:")));

        // open click, then option click
        let kinds: Vec<CommandKind> = selection.commands.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CommandKind::Click, CommandKind::Click]);
        assert_eq!(selection.commands[0].target, "#size");
        assert!(!selection.commands[1].force);
    }

    #[tokio::test]
    async fn test_visual_scan_records_forced_click() {
        let driver = MockDriver::new();
        driver.on("wp:focused-input", json!("{\"ok\":false}"));
        driver.on("wp:role-option", json!("{\"ok\":false}"));
        driver.on("wp:floating-menu", json!("{\"ok\":false}"));
        driver.on(
            "wp:visual-scan",
            json!(json!({"ok": true, "text": "Teal", "lineage": lineage("div", None, Some(("div", "palette")))}).to_string()),
        );

        let mut dropdown = Dropdown::new(&driver, 0);
        let selection = dropdown.select_option("Teal").await.unwrap();

        assert_eq!(selection.strategy, Strategy::VisualScan);
        assert_eq!(selection.commands.len(), 1);
        assert_eq!(selection.commands[0].kind, CommandKind::Click);
        assert!(selection.commands[0].force);
    }

    #[tokio::test]
    async fn test_focused_input_types_and_commits() {
        let driver = MockDriver::new();
        driver.on(
            "wp:focused-input",
            json!(json!({"ok": true, "lineage": lineage("input", Some("city"), None)}).to_string()),
        );
        let mut dropdown = Dropdown::new(&driver, 0);
        let selection = dropdown.select_option("Chicago").await.unwrap();

        assert_eq!(selection.method, SelectionMethod::Keyboard);
        assert_eq!(selection.strategy, Strategy::FocusedInput);
        assert_eq!(selection.text_fallback.as_deref(), Some("Chicago"));
        assert_eq!(driver.evaluated("wp:role-option"), 0);
        let calls = driver.calls();
        assert!(calls.contains(&"type:Chicago".to_string()));
        assert!(calls.contains(&"press:Enter".to_string()));

        // replay types into the same input rather than whatever has focus
        assert_eq!(selection.commands[0].kind, CommandKind::Type);
        assert_eq!(selection.commands[0].target, "#city");
        let bundle = selection.commands[0].selectors.as_ref().unwrap();
        assert_eq!(bundle.css.as_deref(), Some("#city"));
    }

    #[tokio::test]
    async fn test_blind_type_is_last_resort() {
        let driver = MockDriver::new();
        let mut dropdown = Dropdown::new(&driver, 0);
        let selection = dropdown.select_option("Blue").await.unwrap();

        assert_eq!(selection.strategy, Strategy::BlindType);
        assert_eq!(selection.option_selector, None);
        assert_eq!(selection.text_fallback.as_deref(), Some("Blue"));
        let kinds: Vec<CommandKind> = selection.commands.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CommandKind::Type, CommandKind::Press]);
    }

    #[tokio::test]
    async fn test_missing_trigger_is_not_found() {
        let driver = MockDriver::new();
        driver.on("wp:dropdown-trigger", json!("{\"found\":false}"));
        let mut dropdown = Dropdown::new(&driver, 0);
        assert!(matches!(
            dropdown.open("Nonexistent").await,
            Err(Error::ElementNotFound(_))
        ));
    }
}
