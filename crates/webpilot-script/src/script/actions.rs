use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An element target. Tried in order: `selector`, `xpath`, `text`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Target {
    /// CSS selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// XPath expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    /// Visible text to find.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Iframe indices from the top document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frame: Vec<usize>,
}

impl Target {
    pub fn is_empty(&self) -> bool {
        self.selector.is_none() && self.xpath.is_none() && self.text.is_none()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.selector, &self.xpath, &self.text) {
            (Some(s), _, _) => write!(f, "selector '{}'", s)?,
            (_, Some(x), _) => write!(f, "xpath '{}'", x)?,
            (_, _, Some(t)) => write!(f, "text '{}'", t)?,
            _ => write!(f, "unknown")?,
        }
        if !self.frame.is_empty() {
            write!(f, " in frame {:?}", self.frame)?;
        }
        Ok(())
    }
}

/// A replay step.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Goto(GotoAction),
    Click(ClickAction),
    /// Clear and type into a field. An empty target types into the focused element.
    Fill(FillAction),
    Select(SelectAction),
    PressKey(PressKeyAction),
    Wait(WaitAction),
}

impl Action {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Goto(_) => "goto",
            Self::Click(_) => "click",
            Self::Fill(_) => "fill",
            Self::Select(_) => "select",
            Self::PressKey(_) => "press_key",
            Self::Wait(_) => "wait",
        }
    }

    /// Element target, for actions that need one.
    pub fn target(&self) -> Option<&Target> {
        match self {
            Self::Click(a) => Some(&a.target),
            Self::Select(a) => Some(&a.target),
            _ => None,
        }
    }
}

const ACTION_NAMES: &[&str] = &["goto", "click", "fill", "select", "press_key", "wait"];

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ActionVisitor)
    }
}

struct ActionVisitor;

impl<'de> Visitor<'de> for ActionVisitor {
    type Value = Action;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an action map with a single key")
    }

    fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected action type key"))?;

        let action = match key.as_str() {
            "goto" => Action::Goto(map.next_value()?),
            "click" => Action::Click(map.next_value()?),
            "fill" => Action::Fill(map.next_value()?),
            "select" => Action::Select(map.next_value()?),
            "press_key" => Action::PressKey(map.next_value()?),
            "wait" => Action::Wait(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, ACTION_NAMES)),
        };

        Ok(action)
    }
}

impl Serialize for Action {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Goto(a) => map.serialize_entry("goto", a)?,
            Self::Click(a) => map.serialize_entry("click", a)?,
            Self::Fill(a) => map.serialize_entry("fill", a)?,
            Self::Select(a) => map.serialize_entry("select", a)?,
            Self::PressKey(a) => map.serialize_entry("press_key", a)?,
            Self::Wait(a) => map.serialize_entry("wait", a)?,
        }
        map.end()
    }
}

// --- Action payloads ---

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GotoAction {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClickAction {
    #[serde(flatten)]
    pub target: Target,
    /// Dispatch the click from script when the pointer click fails.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FillAction {
    #[serde(flatten)]
    pub target: Target,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SelectAction {
    #[serde(flatten)]
    pub target: Target,
    /// Option label (value is accepted as a fallback).
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PressKeyAction {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct WaitAction {
    pub ms: u64,
}
