//! Scripted driver and fixtures for unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::driver::Driver;
use crate::planner::{AgentAction, Planner, PlannerContext};
use crate::{ElementDescriptor, Error, Rect, Region, Result, RoleHint};

struct Rule {
    needle: String,
    queue: VecDeque<Value>,
    last: Value,
}

/// A driver whose `evaluate` answers are keyed by a substring of the script.
///
/// Sequenced answers are consumed in order; the final one repeats.
#[derive(Default)]
pub(crate) struct MockDriver {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    failing_clicks: Mutex<HashSet<String>>,
    url: Mutex<String>,
}

impl MockDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        *driver.url.lock().unwrap() = "https://example.test/".into();
        driver
    }

    pub fn on(&self, needle: &str, value: Value) {
        self.on_seq(needle, vec![value]);
    }

    pub fn on_seq(&self, needle: &str, values: Vec<Value>) {
        let last = values.last().cloned().unwrap_or(Value::Null);
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            queue: values.into(),
            last,
        });
    }

    pub fn fail_click(&self, selector: &str) {
        self.failing_clicks.lock().unwrap().insert(selector.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// How many evaluations matched `needle`.
    pub fn evaluated(&self, needle: &str) -> usize {
        let key = format!("eval:{}", needle);
        self.calls.lock().unwrap().iter().filter(|c| **c == key).count()
    }

    fn log(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn goto(&self, url: &str, _timeout_ms: u64) -> Result<()> {
        self.log(format!("goto:{}", url));
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> Result<Value> {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if js.contains(&rule.needle) {
                let value = rule.queue.pop_front().unwrap_or_else(|| rule.last.clone());
                let entry = format!("eval:{}", rule.needle);
                drop(rules);
                self.log(entry);
                return Ok(value);
            }
        }
        drop(rules);
        self.log("eval:?".into());
        Ok(Value::Null)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.log(format!("click:{}", selector));
        if self.failing_clicks.lock().unwrap().contains(selector) {
            return Err(Error::Browser(eoka::Error::ElementNotFound(selector.to_string())));
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        self.log(format!("fill:{}={}", selector, text));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.log(format!("type:{}", text));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.log(format!("press:{}", key));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn title(&self) -> Result<String> {
        Ok("Test Page".into())
    }

    async fn wait(&self, _ms: u64) {}
}

/// A visible main-frame element with a unique test selector.
pub(crate) fn element(index: usize, tag: &str, text: &str) -> ElementDescriptor {
    let role = match tag {
        "button" => RoleHint::Button,
        "a" => RoleHint::Link,
        "input" | "textarea" => RoleHint::Input,
        "select" => RoleHint::Listbox,
        "option" => RoleHint::Option,
        _ => RoleHint::Other,
    };
    ElementDescriptor {
        index,
        tag: tag.to_string(),
        id: None,
        classes: Vec::new(),
        text: text.to_string(),
        label: String::new(),
        context: String::new(),
        role,
        region: Region::Main,
        visible: true,
        bbox: Rect {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 30.0,
        },
        css: format!("[data-idx=\"{}\"]", index),
        xpath: format!("/html/body/{}[{}]", tag, index + 1),
        frame_path: Vec::new(),
        attributes: BTreeMap::new(),
    }
}

/// Fingerprint payload as the page script returns it.
pub(crate) fn fingerprint(url: &str, text_hash: u32, element_count: usize) -> Value {
    json!({
        "url": url,
        "title": "Test Page",
        "element_count": element_count,
        "text_hash": text_hash,
        "dialogs": 0,
        "expanded": 0,
        "toasts": 0,
        "floating": 0,
        "focus": "",
        "target_markers": 0,
    })
}

/// Raw catalog entry with a unique id, so its selector is `#id`.
pub(crate) fn raw_element(tag: &str, id: &str, text: &str) -> Value {
    json!({
        "tag": tag,
        "id": id,
        "classes": [],
        "text": text,
        "label": "",
        "context": "",
        "landmark": null,
        "visible": true,
        "x": 10.0, "y": 100.0, "width": 80.0, "height": 20.0,
        "page_y": 100.0,
        "doc_height": 2000.0,
        "attributes": {},
        "lineage": {
            "tag": tag,
            "id": id,
            "id_unique": true,
            "steps": [
                {"tag": tag, "id": id, "id_unique": true, "nth_of_type": 1, "same_tag": 1, "nth_child": 1},
                {"tag": "body", "nth_of_type": 1, "same_tag": 1, "nth_child": 2},
                {"tag": "html", "nth_of_type": 1, "same_tag": 1, "nth_child": 1}
            ]
        },
        "frame_path": []
    })
}

/// Catalog script answer for the given raw entries.
pub(crate) fn catalog(items: Vec<Value>) -> Value {
    Value::String(Value::Array(items).to_string())
}

/// A planner that replays canned answers and remembers what it was shown.
///
/// Once the script runs out it proposes `finish`.
#[derive(Default)]
pub(crate) struct ScriptedPlanner {
    answers: Mutex<VecDeque<Result<Vec<AgentAction>>>>,
    seen: Mutex<Vec<PlannerContext>>,
}

impl ScriptedPlanner {
    pub fn new(answers: Vec<Result<Vec<AgentAction>>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every answer is the same single action.
    pub fn repeating(action: AgentAction, times: usize) -> Self {
        Self::new((0..times).map(|_| Ok(vec![action.clone()])).collect())
    }

    pub fn contexts(&self) -> Vec<PlannerContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn propose(&self, ctx: &PlannerContext) -> Result<Vec<AgentAction>> {
        self.seen.lock().unwrap().push(ctx.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![AgentAction::finish("script exhausted")]))
    }
}
