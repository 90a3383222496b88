//! # webpilot-script
//!
//! The durable side of a browser session: recorded [`ExecutionCommand`]s, an
//! optimizer that elides retry noise, a compiler to Playwright or YAML, and a
//! runner that replays the YAML form deterministically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webpilot_script::{compile, CompileOptions, ExecutionCommand, Format};
//!
//! # fn main() -> webpilot_script::Result<()> {
//! let history = vec![
//!     ExecutionCommand::navigate("https://example.com"),
//!     ExecutionCommand::navigate("https://example.com"),
//!     ExecutionCommand::click("#more", None, "More information link"),
//! ];
//! let opts = CompileOptions { format: Format::Playwright, ..Default::default() };
//! println!("{}", compile(&history, &opts)?);
//! # Ok(())
//! # }
//! ```

mod command;
mod compiler;
mod runner;
pub mod script;

pub use command::{CommandKind, ExecutionCommand, SelectorBundle};
pub use compiler::{compile, locator_for, optimize, CompileOptions, Format, Locator, OptimizeOptions};
pub use runner::{RunResult, Runner};
pub use script::{Action, BrowserConfig, Script, Target, TargetUrl};

/// Result type for webpilot-script operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, compiling or replaying scripts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("script error: {0}")]
    Script(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("action failed: {0}")]
    ActionFailed(String),
}

/// Read a JSON history file as written by `webpilot run --history`.
pub fn load_history<P: AsRef<std::path::Path>>(path: P) -> Result<Vec<ExecutionCommand>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&content)?)
}
