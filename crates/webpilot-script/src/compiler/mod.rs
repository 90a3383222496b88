//! Command history → automation script.

mod optimize;
mod playwright;
mod yaml;

pub use optimize::{optimize, OptimizeOptions};

use crate::command::ExecutionCommand;
use crate::Result;
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Playwright for Python (sync API).
    #[default]
    Playwright,
    /// The replay runner's YAML script.
    Yaml,
}

impl FromStr for Format {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "playwright" | "python" | "py" => Ok(Self::Playwright),
            "yaml" | "yml" | "runner" => Ok(Self::Yaml),
            other => Err(crate::Error::Script(format!(
                "unknown output format '{}' (expected playwright or yaml)",
                other
            ))),
        }
    }
}

/// Compilation settings.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub format: Format,
    /// Script name, used as the YAML `name` and the Python docstring.
    pub name: String,
    /// Run [`optimize`] first.
    pub optimize: bool,
    pub optimize_options: OptimizeOptions,
    /// Pause after every click in the generated script.
    pub click_delay_ms: u64,
    pub headless: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            format: Format::default(),
            name: "webpilot session".into(),
            optimize: true,
            optimize_options: OptimizeOptions::default(),
            click_delay_ms: 500,
            headless: false,
        }
    }
}

/// How a recorded element is located on replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
    Id(String),
    Text(String),
    /// The command's raw target string, used verbatim.
    Raw(String),
}

/// Text that looks like an internal reference rather than what a user sees:
/// `[12]`, `el-3`, `#submit`, `.btn-primary`.
fn is_placeholder_text(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(?:\[\d+\]|[A-Za-z]+[-_]\d+|#[\w-]+|\.[\w-]+(?:\.[\w-]+)*)$")
            .expect("placeholder pattern is valid")
    });
    re.is_match(text.trim())
}

/// Pick the locator for a command: captured CSS, then XPath, then id, then
/// visible text unless it looks like an internal reference, then the raw target.
pub fn locator_for(cmd: &ExecutionCommand) -> Locator {
    fn present(v: &Option<String>) -> Option<&str> {
        v.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    if let Some(ref b) = cmd.selectors {
        if let Some(css) = present(&b.css) {
            return Locator::Css(css.to_string());
        }
        if let Some(xpath) = present(&b.xpath) {
            return Locator::XPath(xpath.to_string());
        }
        if let Some(id) = present(&b.id) {
            return Locator::Id(id.to_string());
        }
        if let Some(text) = present(&b.text) {
            if !is_placeholder_text(text) {
                return Locator::Text(text.to_string());
            }
        }
    }
    Locator::Raw(cmd.target.clone())
}

/// Compile a history into script source.
pub fn compile(history: &[ExecutionCommand], opts: &CompileOptions) -> Result<String> {
    let commands = if opts.optimize {
        optimize(history, &opts.optimize_options)
    } else {
        history.to_vec()
    };
    tracing::debug!(
        "compiling {} commands ({} before optimization) as {:?}",
        commands.len(),
        history.len(),
        opts.format
    );
    match opts.format {
        Format::Playwright => Ok(playwright::render(&commands, opts)),
        Format::Yaml => yaml::render(&commands, opts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SelectorBundle;

    fn click_with(bundle: SelectorBundle) -> ExecutionCommand {
        ExecutionCommand::click("raw-target", Some(bundle), "test")
    }

    #[test]
    fn test_locator_precedence() {
        let full = SelectorBundle {
            css: Some("#login".into()),
            xpath: Some("/html/body/button".into()),
            id: Some("login".into()),
            text: Some("Log In".into()),
            frame: vec![],
        };
        assert_eq!(locator_for(&click_with(full.clone())), Locator::Css("#login".into()));

        let no_css = SelectorBundle { css: None, ..full.clone() };
        assert_eq!(
            locator_for(&click_with(no_css.clone())),
            Locator::XPath("/html/body/button".into())
        );

        let id_only = SelectorBundle { xpath: None, ..no_css };
        assert_eq!(locator_for(&click_with(id_only.clone())), Locator::Id("login".into()));

        let text_only = SelectorBundle { id: None, ..id_only };
        assert_eq!(locator_for(&click_with(text_only)), Locator::Text("Log In".into()));
    }

    #[test]
    fn test_placeholder_text_falls_through_to_raw() {
        for text in ["[12]", "el-3", "#submit", ".btn-primary"] {
            let cmd = click_with(SelectorBundle {
                text: Some(text.into()),
                ..Default::default()
            });
            assert_eq!(locator_for(&cmd), Locator::Raw("raw-target".into()), "{}", text);
        }
    }

    #[test]
    fn test_no_bundle_uses_raw_target() {
        let cmd = ExecutionCommand::click("button.go", None, "go");
        assert_eq!(locator_for(&cmd), Locator::Raw("button.go".into()));
    }

    #[test]
    fn test_blank_selectors_are_skipped() {
        let cmd = click_with(SelectorBundle {
            css: Some("  ".into()),
            xpath: Some("//a".into()),
            ..Default::default()
        });
        assert_eq!(locator_for(&cmd), Locator::XPath("//a".into()));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("python".parse::<Format>().unwrap(), Format::Playwright);
        assert_eq!("YAML".parse::<Format>().unwrap(), Format::Yaml);
        assert!("cobol".parse::<Format>().is_err());
    }
}
