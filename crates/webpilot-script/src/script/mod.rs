pub mod actions;
pub mod schema;

pub use actions::{Action, Target};
pub use schema::{BrowserConfig, OnFailure, RetryConfig, Script, TargetUrl, Viewport};
