use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Navigate,
    Click,
    Type,
    /// Native `<select>` choice, replayed by option label.
    Select,
    /// Single key press, usually the commit key after type-to-filter.
    Press,
    Wait,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Type => "type",
            Self::Select => "select",
            Self::Press => "press",
            Self::Wait => "wait",
        }
    }
}

/// Every locator captured for an element at the moment it was acted on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Iframe indices from the top document; empty for the main frame.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frame: Vec<usize>,
}

impl SelectorBundle {
    pub fn is_empty(&self) -> bool {
        self.css.is_none() && self.xpath.is_none() && self.id.is_none() && self.text.is_none()
    }
}

/// One durable, replayable step of a session.
///
/// Commands are created when an action succeeds and never change after they
/// are committed to a history. The only later transformation is elision by
/// [`crate::optimize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCommand {
    pub kind: CommandKind,
    /// URL for navigations, selector for element steps, milliseconds for waits,
    /// key name for presses. Empty for keyboard typing into the focused element.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<SelectorBundle>,
    #[serde(default)]
    pub description: String,
    /// Click went through without actionability checks and needs the same on replay.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

impl ExecutionCommand {
    pub fn navigate(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            kind: CommandKind::Navigate,
            description: format!("navigate to {}", url),
            target: url,
            value: None,
            selectors: None,
            force: false,
        }
    }

    pub fn click(
        target: impl Into<String>,
        selectors: Option<SelectorBundle>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: CommandKind::Click,
            target: target.into(),
            value: None,
            selectors,
            description: description.into(),
            force: false,
        }
    }

    pub fn type_text(
        target: impl Into<String>,
        text: impl Into<String>,
        selectors: Option<SelectorBundle>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: CommandKind::Type,
            target: target.into(),
            value: Some(text.into()),
            selectors,
            description: description.into(),
            force: false,
        }
    }

    pub fn select(
        target: impl Into<String>,
        label: impl Into<String>,
        selectors: Option<SelectorBundle>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: CommandKind::Select,
            target: target.into(),
            value: Some(label.into()),
            selectors,
            description: description.into(),
            force: false,
        }
    }

    pub fn press(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            kind: CommandKind::Press,
            description: format!("press {}", key),
            target: key,
            value: None,
            selectors: None,
            force: false,
        }
    }

    pub fn wait(ms: u64) -> Self {
        Self {
            kind: CommandKind::Wait,
            target: ms.to_string(),
            value: None,
            selectors: None,
            description: format!("wait {}ms", ms),
            force: false,
        }
    }

    /// Mark a click as forced.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Milliseconds of a wait command. Unparseable targets count as zero.
    pub fn wait_ms(&self) -> u64 {
        if self.kind != CommandKind::Wait {
            return 0;
        }
        self.target.trim().parse().unwrap_or(0)
    }

    /// Same kind, target and captured selectors.
    pub fn same_step(&self, other: &ExecutionCommand) -> bool {
        self.kind == other.kind
            && self.target == other.target
            && self.value == other.value
            && self.selectors == other.selectors
            && self.force == other.force
    }
}

impl fmt::Display for ExecutionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.name(), self.target)?;
        if let Some(ref v) = self.value {
            write!(f, " = \"{}\"", v)?;
        }
        if !self.description.is_empty() {
            write!(f, "  # {}", self.description)?;
        }
        Ok(())
    }
}
