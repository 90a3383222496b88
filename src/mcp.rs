use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use webpilot_agent::{
    ActionKind, ActionResult, ActionTarget, AgentAction, CompileOptions, Error, Format, Pilot,
    PilotConfig, Resolution,
};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct NavigateRequest {
    #[schemars(description = "URL to navigate to")]
    pub url: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ScreenshotRequest {
    #[schemars(description = "Draw element indices over the page (default true)")]
    pub annotated: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ResolveRequest {
    #[schemars(description = "Loose description of an element, e.g. 'the Login button' or 'search box'")]
    pub query: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ActRequest {
    #[schemars(description = "One of: navigate, click, type, select_option, scroll, wait")]
    pub action: String,
    #[schemars(
        description = "Element index from observe, 'css:<selector>', or a description resolved against the page"
    )]
    pub target: Option<String>,
    #[schemars(description = "Text to type, URL, option label, scroll direction or wait milliseconds")]
    pub value: Option<String>,
    #[schemars(description = "What the indexed element says; a mismatching index is re-resolved by this label")]
    pub label: Option<String>,
    #[schemars(description = "Attach a screenshot taken after the action")]
    pub screenshot: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SelectOptionRequest {
    #[schemars(description = "Dropdown to open first (selector or label); omit when it is already open")]
    pub dropdown: Option<String>,
    #[schemars(description = "Option label, or a whole 'open X dropdown and select Y' instruction")]
    pub option: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RunGoalRequest {
    #[schemars(description = "What to accomplish on the current page")]
    pub goal: String,
    #[schemars(description = "Navigate here before starting")]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CompileRequest {
    #[schemars(description = "playwright (default) or yaml")]
    pub format: Option<String>,
    #[schemars(description = "Script name")]
    pub name: Option<String>,
    #[schemars(description = "Collapse duplicate navigations, repeated clicks and waits (default true)")]
    pub optimize: Option<bool>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

fn err(e: impl std::fmt::Display) -> ErrorData {
    ErrorData::internal_error(e.to_string(), None::<Value>)
}

fn not_started() -> ErrorData {
    err(Error::SessionNotInitialized("use navigate first".into()))
}

fn text_ok(s: impl Into<String>) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::text(s.into())]))
}

fn json_text<T: serde::Serialize>(value: &T) -> Result<Content, ErrorData> {
    Ok(Content::text(serde_json::to_string_pretty(value).map_err(err)?))
}

/// Action results are reported, not raised: a failed click is an answer.
fn action_reply(result: &ActionResult, png: Option<Vec<u8>>) -> Result<CallToolResult, ErrorData> {
    let mut content = vec![json_text(result)?];
    if let Some(png) = png {
        content.push(Content::image(BASE64.encode(&png), "image/png"));
    }
    Ok(if result.success {
        CallToolResult::success(content)
    } else {
        CallToolResult::error(content)
    })
}

#[derive(Clone)]
pub struct WebpilotServer {
    config: PilotConfig,
    pilot: Arc<Mutex<Option<Pilot>>>,
    /// Cancels the goal run in flight, if any
    current_run: Arc<std::sync::Mutex<Option<CancellationToken>>>,
    tool_router: ToolRouter<Self>,
}

impl WebpilotServer {
    async fn ensure_pilot(&self) -> Result<(), ErrorData> {
        let mut guard = self.pilot.lock().await;
        if guard.is_none() {
            let pilot = Pilot::launch(self.config.clone()).await.map_err(err)?;
            *guard = Some(pilot);
        }
        Ok(())
    }

    fn set_current_run(&self, token: Option<CancellationToken>) {
        if let Ok(mut current) = self.current_run.lock() {
            *current = token;
        }
    }
}

#[tool_router]
impl WebpilotServer {
    pub fn new(config: PilotConfig) -> Self {
        Self {
            config,
            pilot: Arc::new(Mutex::new(None)),
            current_run: Arc::new(std::sync::Mutex::new(None)),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Navigate to a URL. Launches the browser on first call. Recorded in the history.")]
    async fn navigate(&self, req: Parameters<NavigateRequest>) -> Result<CallToolResult, ErrorData> {
        self.ensure_pilot().await?;
        let mut guard = self.pilot.lock().await;
        let pilot = guard.as_mut().ok_or_else(not_started)?;
        let result = pilot.goto(&req.0.url).await.map_err(err)?;
        if !result.success {
            return action_reply(&result, None);
        }
        let url = pilot.url().await.map_err(err)?;
        let title = pilot.title().await.map_err(err)?;
        text_ok(format!("Navigated to: {}\nTitle: {}", url, title))
    }

    #[tool(
        description = "List the interactive elements of the page, frames included. Indices are valid until the next state-changing action."
    )]
    async fn observe(&self) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.pilot.lock().await;
        let pilot = guard.as_mut().ok_or_else(not_started)?;
        pilot.observe().await.map_err(err)?;
        let list = pilot.element_list();
        text_ok(if list.is_empty() {
            "No interactive elements found.".into()
        } else {
            list
        })
    }

    #[tool(description = "Screenshot of the page, annotated with element indices unless annotated=false.")]
    async fn screenshot(&self, req: Parameters<ScreenshotRequest>) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.pilot.lock().await;
        let pilot = guard.as_mut().ok_or_else(not_started)?;
        let annotated = req.0.annotated.unwrap_or(true);
        let png = pilot.screenshot(annotated).await.map_err(err)?;
        Ok(CallToolResult::success(vec![
            Content::image(BASE64.encode(&png), "image/png"),
            Content::text(format!("{} interactive elements on page.", pilot.elements().len())),
        ]))
    }

    #[tool(
        description = "Resolve a loose description to one element. Reports 'ambiguous' with the tied candidates instead of guessing."
    )]
    async fn resolve(&self, req: Parameters<ResolveRequest>) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.pilot.lock().await;
        let pilot = guard.as_mut().ok_or_else(not_started)?;
        if pilot.elements().is_empty() {
            pilot.observe().await.map_err(err)?;
        }
        let out = match pilot.resolve(&req.0.query) {
            Resolution::Unique(hit) => format!("unique (score {}):\n{}", hit.score, hit.element),
            Resolution::Ambiguous(tied) => {
                let lines: Vec<String> = tied
                    .iter()
                    .map(|s| format!("{} (score {})", s.element, s.score))
                    .collect();
                format!("ambiguous, {} candidates:\n{}", tied.len(), lines.join("\n"))
            }
            Resolution::None => format!("no element matches '{}'", req.0.query),
        };
        text_ok(out)
    }

    #[tool(
        description = "Perform one action and verify the page changed. Succeeds only if the action had an observable effect; successful actions are recorded."
    )]
    async fn act(&self, req: Parameters<ActRequest>) -> Result<CallToolResult, ErrorData> {
        let req = req.0;
        let kind = ActionKind::from_loose(&req.action)
            .filter(|k| *k != ActionKind::Finish)
            .ok_or_else(|| {
                ErrorData::invalid_params(
                    format!("unknown action '{}'", req.action),
                    None::<Value>,
                )
            })?;
        let action = AgentAction {
            kind,
            target: req.target.as_deref().map(ActionTarget::parse),
            value: req.value,
            label: req.label,
            rationale: String::new(),
        };

        if kind == ActionKind::Navigate {
            self.ensure_pilot().await?;
        }
        let mut guard = self.pilot.lock().await;
        let pilot = guard.as_mut().ok_or_else(not_started)?;
        let result = pilot.act(&action).await.map_err(err)?;
        let png = if req.screenshot.unwrap_or(false) {
            Some(pilot.screenshot(false).await.map_err(err)?)
        } else {
            None
        };
        action_reply(&result, png)
    }

    #[tool(
        description = "Choose an option from a native select or a custom dropdown widget, opening the dropdown first when named."
    )]
    async fn select_option(&self, req: Parameters<SelectOptionRequest>) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.pilot.lock().await;
        let pilot = guard.as_mut().ok_or_else(not_started)?;
        let result = pilot
            .select_option(req.0.dropdown.as_deref(), &req.0.option)
            .await
            .map_err(err)?;
        action_reply(&result, None)
    }

    #[tool(
        description = "Pursue a goal with the configured planner: observe, plan, act, verify, retry. Returns the narration and the commands recorded."
    )]
    async fn run_goal(&self, req: Parameters<RunGoalRequest>) -> Result<CallToolResult, ErrorData> {
        self.ensure_pilot().await?;
        let mut guard = self.pilot.lock().await;
        let pilot = guard.as_mut().ok_or_else(not_started)?;
        let planner = pilot
            .http_planner()
            .map_err(|e| ErrorData::invalid_params(e.to_string(), None::<Value>))?;
        if let Some(ref url) = req.0.url {
            pilot.goto(url).await.map_err(err)?;
        }

        let token = CancellationToken::new();
        self.set_current_run(Some(token.clone()));
        let report = pilot.run_goal(&req.0.goal, &planner, token).await;
        self.set_current_run(None);
        let report = report.map_err(err)?;
        info!("goal '{}' ended: {:?}", report.goal, report.status);

        Ok(CallToolResult::success(vec![
            Content::text(report.narration.join("\n")),
            json_text(&report.commands)?,
        ]))
    }

    #[tool(description = "The committed command history as JSON.")]
    async fn history(&self) -> Result<CallToolResult, ErrorData> {
        let guard = self.pilot.lock().await;
        let pilot = guard.as_ref().ok_or_else(not_started)?;
        Ok(CallToolResult::success(vec![json_text(&pilot.history())?]))
    }

    #[tool(description = "Compile the history into a Playwright (Python) or YAML replay script.")]
    async fn compile_script(&self, req: Parameters<CompileRequest>) -> Result<CallToolResult, ErrorData> {
        let guard = self.pilot.lock().await;
        let pilot = guard.as_ref().ok_or_else(not_started)?;
        let mut opts = CompileOptions {
            headless: self.config.browser.headless,
            ..Default::default()
        };
        if let Some(ref format) = req.0.format {
            opts.format = format
                .parse::<Format>()
                .map_err(|e| ErrorData::invalid_params(e.to_string(), None::<Value>))?;
        }
        if let Some(name) = req.0.name {
            opts.name = name;
        }
        if let Some(optimize) = req.0.optimize {
            opts.optimize = optimize;
        }
        text_ok(pilot.compile(&opts).map_err(err)?)
    }

    #[tool(description = "Forget the recorded history.")]
    async fn reset_history(&self) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.pilot.lock().await;
        let pilot = guard.as_mut().ok_or_else(not_started)?;
        pilot.reset_history();
        text_ok("History cleared.")
    }

    #[tool(description = "Stop any running goal, close the browser and release resources.")]
    async fn close(&self) -> Result<CallToolResult, ErrorData> {
        if let Ok(current) = self.current_run.lock() {
            if let Some(ref token) = *current {
                token.cancel();
            }
        }
        let mut guard = self.pilot.lock().await;
        if let Some(pilot) = guard.take() {
            pilot.close().await.map_err(err)?;
        }
        text_ok("Browser closed.")
    }
}

#[tool_handler]
impl ServerHandler for WebpilotServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "webpilot".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Self-verifying browser automation. Use 'navigate' to open a URL (launches the browser), \
                 'observe' to list elements, 'resolve' to check what a description matches, \
                 'act' and 'select_option' to interact (targets by index, css: selector, or description), \
                 or 'run_goal' to let the planner drive. Only actions that visibly change the page are \
                 recorded; 'compile_script' turns the history into a replayable script."
                    .into(),
            ),
        }
    }
}

pub async fn run_server(config: PilotConfig) -> anyhow::Result<()> {
    use rmcp::ServiceExt;

    let server = WebpilotServer::new(config);
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
