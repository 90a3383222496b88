//! [`Pilot`]: one browser session with its catalog, history and narration.

use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use webpilot_script::{compile, CompileOptions, ExecutionCommand};

use crate::agent::{Actor, Agent, RunReport};
use crate::annotate;
use crate::catalog;
use crate::config::PilotConfig;
use crate::driver::Driver;
use crate::executor::{ActionResult, Executor};
use crate::history::History;
use crate::planner::{ActionKind, AgentAction, HttpPlanner, Planner};
use crate::resolver::{Resolution, Resolver};
use crate::target::ActionTarget;
use crate::{element_list, Browser, ElementDescriptor, Result};

/// Narration lines kept for late subscribers.
const NARRATION_CAPACITY: usize = 256;

/// A browser session that owns its browser, page and command history.
/// This is the primary API for most use cases.
pub struct Pilot {
    browser: Option<Browser>,
    driver: Box<dyn Driver>,
    config: PilotConfig,
    resolver: Resolver,
    catalog: Vec<ElementDescriptor>,
    history: History,
    narration: broadcast::Sender<String>,
}

impl Pilot {
    /// Launch a browser per `config.browser` and open a blank page.
    pub async fn launch(config: PilotConfig) -> Result<Self> {
        config.validate()?;
        let browser = Browser::launch_with_config(config.browser.stealth()).await?;
        let page = browser.new_page("about:blank").await?;
        info!("browser launched (headless: {})", config.browser.headless);
        let mut pilot = Self::with_driver(Box::new(page), config);
        pilot.browser = Some(browser);
        Ok(pilot)
    }

    /// A session over an existing driver, with no browser of its own.
    pub fn with_driver(driver: Box<dyn Driver>, config: PilotConfig) -> Self {
        let (narration, _) = broadcast::channel(NARRATION_CAPACITY);
        Self {
            browser: None,
            driver,
            resolver: Resolver::new(config.resolver.clone()),
            config,
            catalog: Vec::new(),
            history: History::new(),
            narration,
        }
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Rebuild the element catalog.
    pub async fn observe(&mut self) -> Result<&[ElementDescriptor]> {
        self.catalog = catalog::extract(self.driver.as_ref(), self.config.agent.max_catalog).await?;
        debug!("observed {} elements", self.catalog.len());
        Ok(&self.catalog)
    }

    /// Elements of the latest observation.
    pub fn elements(&self) -> &[ElementDescriptor] {
        &self.catalog
    }

    /// Compact text list for planner prompts.
    pub fn element_list(&self) -> String {
        element_list(&self.catalog)
    }

    /// Screenshot, with catalog indices drawn on when `annotated`.
    pub async fn screenshot(&mut self, annotated: bool) -> Result<Vec<u8>> {
        if !annotated {
            return self.driver.screenshot().await;
        }
        if self.catalog.is_empty() {
            self.observe().await?;
        }
        annotate::annotated_screenshot(self.driver.as_ref(), &self.catalog).await
    }

    pub async fn url(&self) -> Result<String> {
        self.driver.url().await
    }

    pub async fn title(&self) -> Result<String> {
        self.driver.title().await
    }

    /// Resolve a loose description against the latest observation.
    pub fn resolve(&self, query: &str) -> Resolution {
        self.resolver.resolve(query, &self.catalog)
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Navigate and record the step.
    pub async fn goto(&mut self, url: &str) -> Result<ActionResult> {
        let result = Executor::new(self.driver.as_ref(), self.config.timing.clone())
            .navigate(url)
            .await;
        Ok(self.record(result))
    }

    pub async fn click(&mut self, target: &str) -> Result<ActionResult> {
        self.act(&AgentAction::new(ActionKind::Click).with_target(ActionTarget::parse(target)))
            .await
    }

    pub async fn type_text(&mut self, target: &str, text: &str) -> Result<ActionResult> {
        let action = AgentAction::new(ActionKind::Type)
            .with_target(ActionTarget::parse(target))
            .with_value(text);
        self.act(&action).await
    }

    /// Pick `option`, opening `dropdown` first when one is named. With no
    /// dropdown, `option` may be a whole "open X and select Y" instruction.
    pub async fn select_option(&mut self, dropdown: Option<&str>, option: &str) -> Result<ActionResult> {
        let mut action = AgentAction::new(ActionKind::SelectOption).with_value(option);
        action.target = dropdown.map(ActionTarget::parse);
        self.act(&action).await
    }

    /// Perform one action as a single step: its commands are committed on
    /// success and dropped on failure.
    pub async fn act(&mut self, action: &AgentAction) -> Result<ActionResult> {
        let needs_catalog = matches!(
            action.target,
            Some(ActionTarget::Description(_)) | Some(ActionTarget::Selector(_))
        );
        if needs_catalog && self.catalog.is_empty() {
            self.observe().await?;
        }
        if matches!(action.target, Some(ActionTarget::Index(_))) && self.catalog.is_empty() {
            return Ok(ActionResult::failure(
                "element indices refer to an observation; observe the page first",
            ));
        }

        let result = Actor::new(self.driver.as_ref(), &self.config, &self.resolver)
            .perform(action, &self.catalog, &HashSet::new())
            .await;
        Ok(self.record(result))
    }

    fn record(&mut self, result: ActionResult) -> ActionResult {
        let line = if result.success {
            format!("ok: {}", result.message)
        } else {
            format!("failed: {}", result.message)
        };
        info!("{}", line);
        let _ = self.narration.send(line);

        self.history.begin_step();
        if result.success {
            self.history.record_all(result.commands.iter().cloned());
            self.history.commit_step();
            if result.state_changed {
                // indices from the old observation no longer hold
                self.catalog.clear();
            }
        } else {
            self.history.discard_step();
        }
        result
    }

    // =========================================================================
    // Goals
    // =========================================================================

    /// The HTTP planner described by `config.planner`.
    pub fn http_planner(&self) -> Result<HttpPlanner> {
        HttpPlanner::new(
            &self.config.planner,
            Duration::from_secs(self.config.agent.planner_timeout_secs),
        )
    }

    /// Run the agent loop for `goal`.
    pub async fn run_goal(
        &mut self,
        goal: &str,
        planner: &dyn Planner,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let report = Agent::new(self.driver.as_ref(), planner, &self.config)
            .with_narration(self.narration.clone())
            .with_cancellation(cancel)
            .run(goal, &mut self.history)
            .await?;
        self.catalog.clear();
        Ok(report)
    }

    /// Live narration of actions and agent steps.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.narration.subscribe()
    }

    // =========================================================================
    // History
    // =========================================================================

    pub fn history(&self) -> &[ExecutionCommand] {
        self.history.commands()
    }

    pub fn compile(&self, opts: &CompileOptions) -> Result<String> {
        Ok(compile(self.history.commands(), opts)?)
    }

    pub fn reset_history(&mut self) {
        self.history.reset();
    }

    /// Close the browser, if this session launched one.
    pub async fn close(self) -> Result<()> {
        if let Some(browser) = self.browser {
            browser.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{catalog, fingerprint, raw_element, MockDriver, ScriptedPlanner};
    use crate::CommandKind;

    fn pilot(driver: MockDriver) -> Pilot {
        let mut config = PilotConfig::default();
        config.agent.screenshot = false;
        Pilot::with_driver(Box::new(driver), config)
    }

    #[tokio::test]
    async fn test_click_by_description_commits() {
        let driver = MockDriver::new();
        driver.on("wp:catalog", catalog(vec![raw_element("button", "more", "More information")]));
        driver.on_seq("wp:fingerprint", vec![fingerprint("u", 1, 4), fingerprint("u", 2, 4)]);
        let mut pilot = pilot(driver);
        let mut rx = pilot.subscribe();

        let result = pilot.click("More information").await.unwrap();
        assert!(result.success, "{}", result.message);
        assert_eq!(pilot.history().len(), 1);
        assert_eq!(pilot.history()[0].target, "#more");
        assert!(pilot.elements().is_empty());
        assert!(rx.recv().await.unwrap().starts_with("ok: clicked"));
    }

    #[tokio::test]
    async fn test_failed_action_records_nothing() {
        let driver = MockDriver::new();
        driver.on("wp:catalog", catalog(vec![raw_element("button", "go", "Go")]));
        driver.on("wp:fingerprint", fingerprint("u", 1, 4));
        let mut pilot = pilot(driver);

        let result = pilot.click("Go").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.failed_selector.as_deref(), Some("#go"));
        assert!(pilot.history().is_empty());

        let missing = pilot.click("Unsubscribe").await.unwrap();
        assert!(!missing.success);
        assert!(missing.message.contains("no element matches"));
    }

    #[tokio::test]
    async fn test_index_requires_observation() {
        let mut pilot = pilot(MockDriver::new());
        let result = pilot.click("3").await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("observe"));
    }

    #[tokio::test]
    async fn test_goto_and_compile() {
        let mut pilot = pilot(MockDriver::new());
        pilot.goto("https://example.com").await.unwrap();
        pilot.goto("https://example.com").await.unwrap();
        assert_eq!(pilot.history().len(), 2);

        let script = pilot.compile(&CompileOptions::default()).unwrap();
        assert_eq!(script.matches("page.goto(").count(), 1, "{}", script);

        pilot.reset_history();
        assert!(pilot.history().is_empty());
    }

    #[tokio::test]
    async fn test_run_goal_appends_to_history() {
        let driver = MockDriver::new();
        driver.on("wp:catalog", catalog(Vec::new()));
        let mut pilot = pilot(driver);
        pilot.goto("https://example.com").await.unwrap();

        let planner = ScriptedPlanner::new(vec![Ok(vec![AgentAction::wait(250, "let it load")])]);
        let report = pilot
            .run_goal("wait for the page", &planner, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.commands.len(), 1);
        let kinds: Vec<CommandKind> = pilot.history().iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CommandKind::Navigate, CommandKind::Wait]);
    }

    #[test]
    fn test_http_planner_needs_endpoint() {
        let pilot = pilot(MockDriver::new());
        assert!(pilot.http_planner().is_err());
    }
}
