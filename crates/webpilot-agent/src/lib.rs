//! # webpilot-agent
//!
//! Find the one element a loose description means, act on it, prove the page
//! changed, and keep a clean record of what happened.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webpilot_agent::{Pilot, PilotConfig, Resolution};
//!
//! # #[tokio::main]
//! # async fn main() -> webpilot_agent::Result<()> {
//! let mut pilot = Pilot::launch(PilotConfig::default()).await?;
//! pilot.goto("https://example.com").await?;
//!
//! // Catalog → resolve a loose target → act with verification
//! pilot.observe().await?;
//! println!("{}", pilot.element_list());
//! if let Resolution::Unique(hit) = pilot.resolve("More information link") {
//!     println!("best match: {}", hit.element);
//! }
//! let result = pilot.click("More information").await?;
//! println!("{} (changed: {})", result.message, result.state_changed);
//!
//! println!("{}", pilot.compile(&Default::default())?);
//! pilot.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod annotate;
pub mod catalog;
pub mod config;
pub mod driver;
pub mod dropdown;
pub mod executor;
pub mod history;
pub mod planner;
pub mod resolver;
pub mod selector;
pub mod session;
pub mod target;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{Agent, LoopDetector, RunReport, RunStatus};
pub use config::PilotConfig;
pub use driver::Driver;
pub use dropdown::{DropdownIntent, DropdownSelection, SelectionMethod};
pub use executor::{ActionResult, Executor};
pub use history::History;
pub use planner::{ActionKind, AgentAction, HttpPlanner, Planner, PlannerContext};
pub use resolver::{Resolution, Resolver, Scored};
pub use session::Pilot;
pub use target::ActionTarget;
pub use verify::{FingerprintTarget, StateFingerprint, Verification};

// Re-export the types that cross into the script crate and the browser
pub use eoka::{Browser, StealthConfig};
pub use webpilot_script::{CommandKind, CompileOptions, ExecutionCommand, Format, SelectorBundle};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Result type for webpilot-agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the agent layer.
///
/// Driver failures during an action never escape [`Executor`]; they become a
/// failed [`ActionResult`]. What reaches callers here is setup, configuration,
/// observation and contract violations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    /// An operation was attempted before a browser session existed.
    #[error("session not initialized: {0}")]
    SessionNotInitialized(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("planner error: {0}")]
    Planner(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("page script returned unexpected data: {0}")]
    PageScript(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("script error: {0}")]
    Script(#[from] webpilot_script::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("run cancelled")]
    Cancelled,
}

/// Coarse kind of an interactive node, fixed at observation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoleHint {
    Button,
    Link,
    Input,
    Option,
    Listbox,
    #[default]
    Other,
}

impl RoleHint {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Link => "link",
            Self::Input => "input",
            Self::Option => "option",
            Self::Listbox => "listbox",
            Self::Other => "other",
        }
    }
}

/// Page region an element sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Header,
    #[default]
    Main,
    Footer,
    Sidebar,
}

impl Region {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Main => "main",
            Self::Footer => "footer",
            Self::Sidebar => "sidebar",
        }
    }
}

/// Bounding box in top-level viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One interactive element from one observation.
///
/// Indices are only meaningful within the catalog that produced them; the DOM
/// node behind a descriptor may be gone by the next observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Position in the catalog it came from
    pub index: usize,
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Own text, richer screen-reader text, or the current value for inputs
    pub text: String,
    /// aria-label, placeholder, title, associated label or nearby text
    pub label: String,
    /// Nearest preceding heading-like text
    pub context: String,
    pub role: RoleHint,
    pub region: Region,
    pub visible: bool,
    pub bbox: Rect,
    pub css: String,
    pub xpath: String,
    /// Iframe indices from the top document; empty for the main frame
    pub frame_path: Vec<usize>,
    pub attributes: BTreeMap<String, String>,
}

impl ElementDescriptor {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.attr("placeholder")
    }

    pub fn in_frame(&self) -> bool {
        !self.frame_path.is_empty()
    }

    /// Search inputs, by type, role or naming.
    pub fn is_search_field(&self) -> bool {
        if self.attr("type") == Some("search") || self.attr("role") == Some("searchbox") {
            return true;
        }
        if self.role != RoleHint::Input {
            return false;
        }
        let named = |s: &str| s.to_lowercase().contains("search");
        self.id.as_deref().is_some_and(named)
            || self.attr("name").is_some_and(named)
            || self.placeholder().is_some_and(named)
            || self.label.to_lowercase().contains("search")
    }

    /// Every locator captured for this element, for the command history.
    pub fn selector_bundle(&self) -> SelectorBundle {
        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
        let text = if self.text.is_empty() { &self.label } else { &self.text };
        SelectorBundle {
            css: non_empty(&self.css),
            xpath: non_empty(&self.xpath),
            id: self.id.clone().filter(|s| !s.trim().is_empty()),
            text: non_empty(text),
            frame: self.frame_path.clone(),
        }
    }

    /// Short human description: `<button> "Log In"`.
    pub fn describe(&self) -> String {
        let shown = if self.text.is_empty() { &self.label } else { &self.text };
        if shown.is_empty() {
            format!("<{}> {}", self.tag, self.css)
        } else {
            format!("<{}> \"{}\"", self.tag, shown)
        }
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] <{}", self.index, self.tag)?;
        if let Some(t) = self.attr("type") {
            if t != "text" {
                write!(f, " type=\"{}\"", t)?;
            }
        }
        f.write_str(">")?;
        if !self.text.is_empty() {
            write!(f, " \"{}\"", self.text)?;
        }
        if !self.label.is_empty() && self.label != self.text {
            write!(f, " label=\"{}\"", self.label)?;
        }
        let redundant = matches!(
            (self.role, self.tag.as_str()),
            (RoleHint::Button, "button")
                | (RoleHint::Link, "a")
                | (RoleHint::Input, "input" | "textarea")
                | (RoleHint::Listbox, "select")
                | (RoleHint::Other, _)
        );
        if !redundant {
            write!(f, " role={}", self.role.name())?;
        }
        if self.region != Region::Main {
            write!(f, " ({})", self.region.name())?;
        }
        if !self.visible {
            f.write_str(" [hidden]")?;
        }
        if self.in_frame() {
            write!(f, " [frame {:?}]", self.frame_path)?;
        }
        Ok(())
    }
}

/// Compact element list for planner prompts, one element per line.
pub fn element_list(elements: &[ElementDescriptor]) -> String {
    let mut out = String::with_capacity(elements.len() * 40);
    for el in elements {
        out.push_str(&el.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::element;

    #[test]
    fn test_element_display_basic() {
        let el = element(0, "button", "Submit");
        assert_eq!(el.to_string(), "[0] <button> \"Submit\"");
    }

    #[test]
    fn test_element_display_with_type_label_and_region() {
        let mut el = element(3, "input", "");
        el.role = RoleHint::Input;
        el.label = "Email".into();
        el.region = Region::Header;
        el.attributes.insert("type".into(), "email".into());
        assert_eq!(el.to_string(), "[3] <input type=\"email\"> label=\"Email\" (header)");
    }

    #[test]
    fn test_element_display_text_type_suppressed() {
        let mut el = element(1, "input", "");
        el.role = RoleHint::Input;
        el.attributes.insert("type".into(), "text".into());
        assert_eq!(el.to_string(), "[1] <input>");
    }

    #[test]
    fn test_element_display_meaningful_role_and_flags() {
        let mut el = element(2, "div", "Open menu");
        el.role = RoleHint::Button;
        el.visible = false;
        el.frame_path = vec![0];
        assert_eq!(
            el.to_string(),
            "[2] <div> \"Open menu\" role=button [hidden] [frame [0]]"
        );
    }

    #[test]
    fn test_search_field_detection() {
        let mut el = element(0, "input", "");
        el.role = RoleHint::Input;
        assert!(!el.is_search_field());
        el.attributes.insert("placeholder".into(), "Search docs".into());
        assert!(el.is_search_field());

        let mut typed = element(1, "input", "");
        typed.attributes.insert("type".into(), "search".into());
        assert!(typed.is_search_field());
    }

    #[test]
    fn test_selector_bundle_falls_back_to_label() {
        let mut el = element(0, "input", "");
        el.label = "Email".into();
        el.id = Some("email".into());
        let bundle = el.selector_bundle();
        assert_eq!(bundle.text.as_deref(), Some("Email"));
        assert_eq!(bundle.id.as_deref(), Some("email"));
        assert_eq!(bundle.css.as_deref(), Some(el.css.as_str()));
    }

    #[test]
    fn test_element_list() {
        let list = element_list(&[element(0, "a", "Home"), element(1, "button", "Go")]);
        assert_eq!(list, "[0] <a> \"Home\"\n[1] <button> \"Go\"\n");
    }
}
