//! Planner boundary. Everything the planner says is untrusted text until it
//! has been extracted, repaired and parsed into [`AgentAction`]s here.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::target::ActionTarget;
use crate::{ElementDescriptor, Error, Region, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    SelectOption,
    Scroll,
    Wait,
    Finish,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Type => "type",
            Self::SelectOption => "select_option",
            Self::Scroll => "scroll",
            Self::Wait => "wait",
            Self::Finish => "finish",
        }
    }

    /// Lenient name matching for planner output.
    pub fn from_loose(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "navigate" | "goto" | "go_to" | "open_url" | "visit" => Self::Navigate,
            "click" | "tap" | "press_button" => Self::Click,
            "type" | "fill" | "input" | "enter_text" | "type_text" => Self::Type,
            "select_option" | "select" | "choose" | "dropdown" => Self::SelectOption,
            "scroll" => Self::Scroll,
            "wait" | "sleep" => Self::Wait,
            "finish" | "done" | "complete" | "stop" => Self::Finish,
            _ => return None,
        })
    }
}

/// One proposed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ActionTarget>,
    /// Text to type, URL, option label, scroll direction or wait millis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// The planner's own description of an indexed element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub rationale: String,
}

impl AgentAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target: None,
            value: None,
            label: None,
            rationale: String::new(),
        }
    }

    pub fn finish(rationale: impl Into<String>) -> Self {
        Self {
            rationale: rationale.into(),
            ..Self::new(ActionKind::Finish)
        }
    }

    pub fn wait(ms: u64, rationale: impl Into<String>) -> Self {
        Self {
            value: Some(ms.to_string()),
            rationale: rationale.into(),
            ..Self::new(ActionKind::Wait)
        }
    }

    pub fn with_target(mut self, target: ActionTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Kind plus target, for loop detection.
    pub fn signature(&self) -> String {
        match &self.target {
            Some(t) => format!("{}:{}", self.kind.name(), t),
            None => format!("{}:{}", self.kind.name(), self.value.as_deref().unwrap_or("")),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self.kind {
            ActionKind::Click if self.target.is_none() => Err("click without target".into()),
            ActionKind::Type if self.value.is_none() => Err("type without value".into()),
            ActionKind::SelectOption if self.value.is_none() => Err("select_option without option".into()),
            ActionKind::Navigate if self.value.is_none() => Err("navigate without url".into()),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for AgentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind.name())?;
        if let Some(ref t) = self.target {
            write!(f, " {}", t)?;
        }
        if let Some(ref v) = self.value {
            write!(f, " \"{}\"", v)?;
        }
        Ok(())
    }
}

/// Catalog row sent to the planner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannerElement {
    pub index: usize,
    pub tag: String,
    pub text: String,
    pub label: String,
    pub region: Region,
    pub selector: String,
}

impl From<&ElementDescriptor> for PlannerElement {
    fn from(el: &ElementDescriptor) -> Self {
        Self {
            index: el.index,
            tag: el.tag.clone(),
            text: el.text.clone(),
            label: el.label.clone(),
            region: el.region,
            selector: el.css.clone(),
        }
    }
}

/// Everything the planner sees for one step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlannerContext {
    pub goal: String,
    pub step: usize,
    pub url: String,
    pub title: String,
    pub elements: Vec<PlannerElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_b64: Option<String>,
    /// Recent committed commands, oldest first
    pub history: Vec<String>,
    /// Why the previous attempt at this step failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Proposes the next action(s) for a goal.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn propose(&self, ctx: &PlannerContext) -> Result<Vec<AgentAction>>;
}

/// Pull the first JSON object or array out of free text: code fence first,
/// then the first balanced bracket span.
pub fn extract_json(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if (trimmed.starts_with('{') || trimmed.starts_with('[')) && balanced_end(trimmed) == Some(trimmed.len()) {
        return Some(trimmed.to_string());
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after = &raw[start + fence.len()..];
        let after = after.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after.find(fence) {
            let block = after[..end].trim();
            if block.contains('{') || block.contains('[') {
                return extract_json(block).or_else(|| Some(block.to_string()));
            }
        }
    }

    let start = raw.find(['{', '['])?;
    let end = balanced_end(&raw[start..])?;
    Some(raw[start..start + end].to_string())
}

/// Byte length of the balanced bracket span at the start of `s`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Rewrite `'single quoted'` strings outside double-quoted ones as JSON strings.
fn requote_single(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;
    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '\'' => {
                let mut body = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' if chars.peek() == Some(&'\'') => {
                            body.push('\'');
                            chars.next();
                        }
                        '\'' => {
                            closed = true;
                            break;
                        }
                        _ => body.push(c),
                    }
                }
                if closed {
                    out.push_str(&serde_json::Value::String(body).to_string());
                } else {
                    out.push('\'');
                    out.push_str(&body);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Quote bare keys, turn single-quoted strings into JSON strings and drop
/// trailing commas.
pub fn repair_json(s: &str) -> String {
    static BARE_KEY: OnceLock<Regex> = OnceLock::new();
    static TRAILING: OnceLock<Regex> = OnceLock::new();
    let bare = BARE_KEY.get_or_init(|| {
        Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).expect("bare key pattern is valid")
    });
    let trailing = TRAILING
        .get_or_init(|| Regex::new(r",\s*([}\]])").expect("trailing comma pattern is valid"));
    let requoted = requote_single(s);
    let quoted = bare.replace_all(&requoted, "$1\"$2\":");
    trailing.replace_all(&quoted, "$1").into_owned()
}

/// Parse planner output into actions. Entries that are unusable are dropped;
/// an answer with nothing usable is an error.
pub fn parse_proposals(raw: &str) -> Result<Vec<AgentAction>> {
    let json = extract_json(raw)
        .ok_or_else(|| Error::Planner(format!("no JSON in planner output: {}", head(raw))))?;
    let value: Value = match serde_json::from_str(&json) {
        Ok(v) => v,
        Err(_) => serde_json::from_str(&repair_json(&json))
            .map_err(|e| Error::Planner(format!("unparseable planner JSON ({}): {}", e, head(&json))))?,
    };

    let entries: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(ref obj) => match obj.get("actions") {
            Some(Value::Array(items)) => items.clone(),
            _ => vec![value],
        },
        _ => Vec::new(),
    };

    let mut actions = Vec::new();
    for entry in &entries {
        match proposal_from(entry) {
            Ok(action) => actions.push(action),
            Err(e) => warn!("dropping planner proposal: {}", e),
        }
    }
    if actions.is_empty() {
        return Err(Error::Planner(format!("no usable action in: {}", head(&json))));
    }
    Ok(actions)
}

fn head(s: &str) -> String {
    s.chars().take(120).collect()
}

fn proposal_from(entry: &Value) -> std::result::Result<AgentAction, String> {
    let obj = entry.as_object().ok_or("proposal is not an object")?;
    let field = |names: &[&str]| names.iter().find_map(|n| obj.get(*n)).filter(|v| !v.is_null());
    let text = |names: &[&str]| {
        field(names).and_then(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    let kind_name = text(&["action", "kind", "type", "action_type"]).ok_or("missing action kind")?;
    let kind = ActionKind::from_loose(&kind_name).ok_or_else(|| format!("unknown action '{}'", kind_name))?;

    let target = match field(&["target", "element", "index", "element_index", "selector"]) {
        Some(Value::Number(n)) => n.as_u64().map(|i| ActionTarget::Index(i as usize)),
        Some(Value::String(s)) if !s.trim().is_empty() => Some(ActionTarget::parse(s)),
        _ => None,
    };
    let mut action = AgentAction {
        kind,
        target,
        value: text(&["value", "text", "input", "option", "url", "direction", "ms"]),
        label: text(&["label", "element_label", "description"]),
        rationale: text(&["rationale", "reason", "thought", "reasoning"]).unwrap_or_default(),
    };

    // A URL given as the target
    if kind == ActionKind::Navigate && action.value.is_none() {
        if let Some(ActionTarget::Description(url)) = action.target.take() {
            action.value = Some(url);
        }
    }
    action.validate()?;
    Ok(action)
}

const SYSTEM_PROMPT: &str = "You operate a web browser to accomplish a goal. \
Each turn you receive the page URL, title, a numbered list of interactive elements, \
and the recent action history. Reply with JSON only: one action object, or an array \
of actions to run in order (for example several form fields). \
Action object: {\"action\": \"navigate|click|type|select_option|scroll|wait|finish\", \
\"target\": <element index, \"css:<selector>\", or a short description>, \
\"label\": \"<text of the element you mean>\", \"value\": \"<text, url, option, direction or ms>\", \
\"rationale\": \"<one sentence>\"}. Use finish when the goal is done.";

/// Planner behind an OpenAI-style chat completions endpoint.
pub struct HttpPlanner {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl HttpPlanner {
    pub fn new(config: &PlannerConfig, timeout: Duration) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("planner.endpoint is not set".into()))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key: std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty()),
            model: config.model.clone().unwrap_or_else(|| "gpt-4o-mini".into()),
        })
    }

    fn user_content(ctx: &PlannerContext) -> Value {
        let mut lines = vec![
            format!("Goal: {}", ctx.goal),
            format!("Step: {}", ctx.step),
            format!("URL: {}", ctx.url),
            format!("Title: {}", ctx.title),
        ];
        if let Some(ref failure) = ctx.failure {
            lines.push(format!("Previous attempt failed: {}", failure));
        }
        if !ctx.history.is_empty() {
            lines.push("History:".into());
            lines.extend(ctx.history.iter().map(|h| format!("  {}", h)));
        }
        lines.push("Elements:".into());
        for el in &ctx.elements {
            lines.push(format!(
                "[{}] <{}> \"{}\" label=\"{}\" ({}) {}",
                el.index,
                el.tag,
                el.text,
                el.label,
                el.region.name(),
                el.selector
            ));
        }
        let text = lines.join("\n");
        match ctx.screenshot_b64 {
            Some(ref b64) => json!([
                {"type": "text", "text": text},
                {"type": "image_url", "image_url": {"url": format!("data:image/png;base64,{}", b64)}}
            ]),
            None => Value::String(text),
        }
    }
}

#[async_trait]
impl Planner for HttpPlanner {
    async fn propose(&self, ctx: &PlannerContext) -> Result<Vec<AgentAction>> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": Self::user_content(ctx)},
            ],
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Planner(format!("planner returned {}: {}", status, head(&text))));
        }

        // Chat completion envelope, or the proposal itself
        let content = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| {
                v.pointer("/choices/0/message/content")
                    .and_then(Value::as_str)
                    .map(String::from)
            })
            .unwrap_or(text);
        debug!("planner replied: {}", head(&content));
        parse_proposals(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_fenced_block() {
        let input = "Here is the plan:\n```json\n{\"action\":\"click\",\"target\":3}\n```\nGood luck";
        let extracted = extract_json(input).unwrap();
        assert_eq!(extracted, "{\"action\":\"click\",\"target\":3}");
    }

    #[test]
    fn test_extract_balanced_with_braces_in_strings() {
        let input = "I will do {\"action\":\"type\",\"value\":\"a } b\"} next";
        assert_eq!(extract_json(input).unwrap(), "{\"action\":\"type\",\"value\":\"a } b\"}");
        assert!(extract_json("no json here").is_none());
    }

    #[test]
    fn test_repair_json() {
        assert_eq!(
            repair_json("{action: \"click\", target: 2,}"),
            "{\"action\": \"click\", \"target\": 2}"
        );
        assert_eq!(repair_json("[1, 2, ]"), "[1, 2]");
        assert_eq!(
            repair_json("{action: 'type', value: 'it\\'s \"here\"'}"),
            "{\"action\": \"type\", \"value\": \"it's \\\"here\\\"\"}"
        );
        // apostrophes inside double-quoted strings are left alone
        assert_eq!(repair_json("{\"value\": \"don't\"}"), "{\"value\": \"don't\"}");
    }

    #[test]
    fn test_parse_single_and_batch() {
        let one = parse_proposals("{\"action\": \"click\", \"target\": 4, \"label\": \"Log In\", \"rationale\": \"sign in\"}")
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].kind, ActionKind::Click);
        assert_eq!(one[0].target, Some(ActionTarget::Index(4)));
        assert_eq!(one[0].label.as_deref(), Some("Log In"));

        let batch = parse_proposals(
            "```\n[{action: 'x'}, {\"action\":\"type\",\"target\":\"Email\",\"value\":\"a@b.c\"}, {\"action\":\"fill\",\"target\":2,\"text\":\"pw\"},]\n```",
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].target, Some(ActionTarget::Description("Email".into())));
        assert_eq!(batch[1].value.as_deref(), Some("pw"));
    }

    #[test]
    fn test_parse_actions_envelope_and_navigate_target() {
        let actions = parse_proposals(
            "{\"actions\": [{\"type\": \"goto\", \"target\": \"https://example.com\"}, {\"action\": \"done\"}]}",
        )
        .unwrap();
        assert_eq!(actions[0].kind, ActionKind::Navigate);
        assert_eq!(actions[0].value.as_deref(), Some("https://example.com"));
        assert_eq!(actions[0].target, None);
        assert_eq!(actions[1].kind, ActionKind::Finish);
    }

    #[test]
    fn test_parse_rejects_unusable() {
        assert!(matches!(parse_proposals("sorry, I can't"), Err(Error::Planner(_))));
        assert!(matches!(parse_proposals("{\"action\": \"click\"}"), Err(Error::Planner(_))));
        assert!(matches!(parse_proposals("{\"thought\": \"hmm\"}"), Err(Error::Planner(_))));
    }

    #[test]
    fn test_signature() {
        let a = AgentAction::new(ActionKind::Click).with_target(ActionTarget::Index(3));
        let b = AgentAction {
            rationale: "different words".into(),
            ..a.clone()
        };
        assert_eq!(a.signature(), b.signature());
        assert_ne!(
            a.signature(),
            AgentAction::new(ActionKind::Click)
                .with_target(ActionTarget::Index(4))
                .signature()
        );
    }

    #[test]
    fn test_context_serializes_without_screenshot() {
        let ctx = PlannerContext {
            goal: "find docs".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert!(json.get("screenshot_b64").is_none());
        assert_eq!(json["goal"], "find docs");
    }
}
