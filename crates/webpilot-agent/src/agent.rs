//! The observe → plan → act → verify loop.
//!
//! One [`Agent::run`] drives one goal. Exclusions and loop state live for that
//! run only; the command history outlives it and only ever sees whole steps.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webpilot_script::ExecutionCommand;

use crate::catalog;
use crate::config::PilotConfig;
use crate::driver::Driver;
use crate::dropdown::{Dropdown, DropdownIntent, SelectionMethod};
use crate::executor::{ActionResult, ElementRef, Executor};
use crate::history::History;
use crate::planner::{ActionKind, AgentAction, Planner, PlannerContext, PlannerElement};
use crate::resolver::{passes_firewall, QueryKey, Resolution, Resolver};
use crate::target::ActionTarget;
use crate::{ElementDescriptor, Error, Result};

/// Flags a proposal repeated too often within a sliding window.
#[derive(Debug, Clone)]
pub struct LoopDetector {
    window: usize,
    threshold: usize,
    recent: VecDeque<String>,
}

impl LoopDetector {
    pub fn new(window: usize, threshold: usize) -> Self {
        Self {
            window: window.max(1),
            threshold: threshold.max(1),
            recent: VecDeque::new(),
        }
    }

    /// Record a proposal signature. True once the same signature has been
    /// seen `threshold` times within the window, this one included.
    pub fn observe(&mut self, signature: &str) -> bool {
        self.recent.push_back(signature.to_string());
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
        self.recent.iter().filter(|s| *s == signature).count() >= self.threshold
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

fn batch_signature(actions: &[AgentAction]) -> String {
    actions
        .iter()
        .map(AgentAction::signature)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Turns one proposal into driver work. Shared by the loop and by callers
/// acting one step at a time.
pub struct Actor<'a> {
    driver: &'a dyn Driver,
    config: &'a PilotConfig,
    resolver: &'a Resolver,
}

impl<'a> Actor<'a> {
    pub fn new(driver: &'a dyn Driver, config: &'a PilotConfig, resolver: &'a Resolver) -> Self {
        Self {
            driver,
            config,
            resolver,
        }
    }

    fn executor(&self) -> Executor<'a> {
        Executor::new(self.driver, self.config.timing.clone())
    }

    /// Perform one action against the given catalog. Never fails outright:
    /// every problem comes back as a failed [`ActionResult`].
    pub async fn perform(
        &self,
        action: &AgentAction,
        catalog: &[ElementDescriptor],
        excluded: &HashSet<String>,
    ) -> ActionResult {
        let value = action.value.as_deref().unwrap_or("");
        match action.kind {
            ActionKind::Navigate => self.executor().navigate(value).await,
            ActionKind::Click => match self.locate(action, catalog, excluded) {
                Ok((target, matched)) => self.executor().click(&target).await.with_matched(matched),
                Err(failed) => failed,
            },
            ActionKind::Type => match self.locate(action, catalog, excluded) {
                Ok((target, matched)) => self
                    .executor()
                    .type_text(&target, value)
                    .await
                    .with_matched(matched),
                Err(failed) => failed,
            },
            ActionKind::SelectOption => self.select(action, catalog, excluded).await,
            ActionKind::Scroll => self.executor().scroll(value).await,
            ActionKind::Wait => {
                let ms = value.trim().parse().unwrap_or(self.config.agent.planner_fallback_wait_ms);
                self.executor().wait(ms).await
            }
            ActionKind::Finish => ActionResult::ok(if action.rationale.is_empty() {
                "finished".to_string()
            } else {
                format!("finished: {}", action.rationale)
            }),
        }
    }

    /// Resolve the action's target to something the executor can act on.
    fn locate(
        &self,
        action: &AgentAction,
        catalog: &[ElementDescriptor],
        excluded: &HashSet<String>,
    ) -> std::result::Result<(ElementRef, Vec<ElementDescriptor>), ActionResult> {
        let Some(ref target) = action.target else {
            return Err(ActionResult::failure(format!("{} needs a target", action.kind.name())));
        };
        match target {
            ActionTarget::Index(i) => {
                let Some(el) = catalog.iter().find(|e| e.index == *i) else {
                    return Err(ActionResult::failure(format!(
                        "no element [{}] in the current catalog ({} elements)",
                        i,
                        catalog.len()
                    )));
                };
                if excluded.contains(&el.css) {
                    return Err(ActionResult::failure(format!(
                        "element [{}] {} already failed in this run",
                        i,
                        el.describe()
                    )));
                }
                match action.label.as_deref().filter(|l| !l.trim().is_empty()) {
                    Some(label) if !passes_firewall(&QueryKey::parse(label), el) => {
                        // The index points somewhere unrelated; trust the label instead
                        warn!("[{}] {} does not match label {:?}, resolving by label", i, el.describe(), label);
                        self.resolve(label, catalog, excluded)
                    }
                    _ => Ok((ElementRef::from(el), vec![el.clone()])),
                }
            }
            ActionTarget::Selector(css) => {
                if excluded.contains(css) {
                    return Err(ActionResult::failure(format!("{} already failed in this run", css)));
                }
                let matched: Vec<ElementDescriptor> =
                    catalog.iter().filter(|e| e.css == *css).cloned().collect();
                match matched.first() {
                    Some(el) => Ok((ElementRef::from(el), matched.clone())),
                    None => Ok((ElementRef::selector(css.clone()), matched)),
                }
            }
            ActionTarget::Description(query) => self.resolve(query, catalog, excluded),
        }
    }

    fn resolve(
        &self,
        query: &str,
        catalog: &[ElementDescriptor],
        excluded: &HashSet<String>,
    ) -> std::result::Result<(ElementRef, Vec<ElementDescriptor>), ActionResult> {
        match self.resolver.resolve_excluding(query, catalog, excluded) {
            Resolution::Unique(hit) => {
                debug!("'{}' resolved to {} (score {})", query, hit.element, hit.score);
                Ok((ElementRef::from(&hit.element), vec![hit.element]))
            }
            Resolution::Ambiguous(tied) => {
                let listed: Vec<String> = tied.iter().map(|s| s.element.describe()).collect();
                Err(ActionResult::failure(format!(
                    "'{}' is ambiguous between {} candidates: {}",
                    query,
                    tied.len(),
                    listed.join(", ")
                ))
                .with_matched(tied.into_iter().map(|s| s.element).collect()))
            }
            Resolution::None => Err(ActionResult::failure(format!("no element matches '{}'", query))),
        }
    }

    async fn select(
        &self,
        action: &AgentAction,
        catalog: &[ElementDescriptor],
        excluded: &HashSet<String>,
    ) -> ActionResult {
        let Some(option) = action.value.as_deref() else {
            return ActionResult::failure("select_option needs an option label");
        };
        let mut matched = Vec::new();
        let intent = match action.target {
            Some(ActionTarget::Index(_)) | Some(ActionTarget::Description(_)) => {
                match self.locate(action, catalog, excluded) {
                    Ok((target, found)) => {
                        matched = found;
                        DropdownIntent::OpenThenSelect {
                            dropdown: target.css,
                            option: option.to_string(),
                        }
                    }
                    Err(failed) => return failed,
                }
            }
            Some(ActionTarget::Selector(ref css)) => DropdownIntent::OpenThenSelect {
                dropdown: css.clone(),
                option: option.to_string(),
            },
            None => DropdownIntent::parse(option).unwrap_or_else(|| DropdownIntent::SelectOnly {
                option: option.to_string(),
            }),
        };

        let mut dropdown = Dropdown::new(self.driver, self.config.timing.dropdown_settle_ms);
        match dropdown.run(&intent).await {
            Ok(selection) => {
                let how = match selection.method {
                    SelectionMethod::NativeSelect => "native select",
                    SelectionMethod::Click => "click",
                    SelectionMethod::Keyboard => "keyboard",
                };
                ActionResult {
                    success: true,
                    state_changed: true,
                    message: format!(
                        "selected '{}' by {} ({})",
                        intent.option(),
                        how,
                        selection.strategy.name()
                    ),
                    commands: selection.commands,
                    matched,
                    ..Default::default()
                }
            }
            Err(e) => {
                let mut failed = ActionResult::failure(format!("select '{}' failed: {}", intent.option(), e));
                if let DropdownIntent::OpenThenSelect { ref dropdown, .. } = intent {
                    failed.failed_selector = Some(dropdown.clone());
                }
                failed.with_matched(matched)
            }
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Finished,
    MaxSteps,
    Cancelled,
}

/// Summary of one goal run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub goal: String,
    pub status: RunStatus,
    /// Steps whose commands were committed
    pub steps: usize,
    pub message: String,
    pub narration: Vec<String>,
    /// Commands committed during this run
    pub commands: Vec<ExecutionCommand>,
}

struct Narrator {
    sender: Option<broadcast::Sender<String>>,
    lines: Vec<String>,
}

impl Narrator {
    fn say(&mut self, line: String) {
        info!("{}", line);
        if let Some(ref tx) = self.sender {
            // No subscribers is fine
            let _ = tx.send(line.clone());
        }
        self.lines.push(line);
    }
}

struct Observation {
    catalog: Vec<ElementDescriptor>,
    context: PlannerContext,
}

pub struct Agent<'a> {
    driver: &'a dyn Driver,
    planner: &'a dyn Planner,
    config: &'a PilotConfig,
    resolver: Resolver,
    narration: Option<broadcast::Sender<String>>,
    cancel: CancellationToken,
}

impl<'a> Agent<'a> {
    pub fn new(driver: &'a dyn Driver, planner: &'a dyn Planner, config: &'a PilotConfig) -> Self {
        Self {
            driver,
            planner,
            config,
            resolver: Resolver::new(config.resolver.clone()),
            narration: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Broadcast every narration line on `sender`.
    pub fn with_narration(mut self, sender: broadcast::Sender<String>) -> Self {
        self.narration = Some(sender);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Drive `goal` to completion, committing successful steps to `history`.
    pub async fn run(&self, goal: &str, history: &mut History) -> Result<RunReport> {
        let limits = &self.config.agent;
        let actor = Actor::new(self.driver, self.config, &self.resolver);
        let mut narrator = Narrator {
            sender: self.narration.clone(),
            lines: Vec::new(),
        };
        let mut loops = LoopDetector::new(limits.loop_window, limits.loop_threshold);
        let mut excluded: HashSet<String> = HashSet::new();
        let first_new = history.len();
        let mut committed_steps = 0;
        let mut failure: Option<String> = None;

        narrator.say(format!("goal: {}", goal));
        let (status, message) = 'run: {
            for step in 1..=limits.max_steps {
                let mut attempt = 0;
                loop {
                    if self.cancel.is_cancelled() {
                        break 'run (RunStatus::Cancelled, "cancelled".to_string());
                    }

                    let observed = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break 'run (RunStatus::Cancelled, "cancelled".to_string()),
                        o = self.observe(goal, step, history, failure.clone()) => o,
                    };
                    let proposals = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break 'run (RunStatus::Cancelled, "cancelled".to_string()),
                        p = self.plan(&observed.context, &mut narrator) => p,
                    };

                    let proposals = if loops.observe(&batch_signature(&proposals)) {
                        narrator.say(format!(
                            "step {}: '{}' proposed {} times, finishing",
                            step,
                            batch_signature(&proposals),
                            limits.loop_threshold
                        ));
                        vec![AgentAction::finish("repeated proposal")]
                    } else {
                        proposals
                    };

                    history.begin_step();
                    let mut outcome: std::result::Result<bool, String> = Ok(false);
                    for action in &proposals {
                        if action.kind == ActionKind::Finish {
                            outcome = Ok(true);
                            let why = if action.rationale.is_empty() { "done" } else { action.rationale.as_str() };
                            narrator.say(format!("step {}: finish ({})", step, why));
                            break;
                        }
                        if action.rationale.is_empty() {
                            narrator.say(format!("step {}: {}", step, action));
                        } else {
                            narrator.say(format!("step {}: {} ({})", step, action, action.rationale));
                        }

                        let result = tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => {
                                history.discard_step();
                                break 'run (RunStatus::Cancelled, "cancelled".to_string());
                            }
                            r = actor.perform(action, &observed.catalog, &excluded) => r,
                        };
                        if !result.success {
                            if let Some(ref sel) = result.failed_selector {
                                excluded.insert(sel.clone());
                            }
                            narrator.say(format!("step {}: failed: {}", step, result.message));
                            outcome = Err(result.message);
                            break;
                        }
                        narrator.say(format!("step {}: ok: {}", step, result.message));
                        history.record_all(result.commands);
                    }

                    match outcome {
                        Ok(finished) => {
                            let n = history.commit_step();
                            debug!("step {} committed {} commands", step, n);
                            if n > 0 || !finished {
                                committed_steps += 1;
                            }
                            failure = None;
                            if finished {
                                break 'run (RunStatus::Finished, "goal finished".to_string());
                            }
                            break;
                        }
                        Err(msg) => {
                            let dropped = history.discard_step();
                            debug!("step {} discarded {} buffered commands", step, dropped);
                            failure = Some(msg);
                            attempt += 1;
                            if attempt > limits.max_retries {
                                narrator.say(format!("step {}: giving up after {} attempts", step, attempt));
                                break;
                            }
                            narrator.say(format!("step {}: retry {}/{}", step, attempt, limits.max_retries));
                        }
                    }
                }
            }
            (
                RunStatus::MaxSteps,
                format!("stopped after {} steps without finishing", limits.max_steps),
            )
        };

        narrator.say(format!("run ended: {}", message));
        Ok(RunReport {
            goal: goal.to_string(),
            status,
            steps: committed_steps,
            message,
            narration: narrator.lines,
            commands: history.commands().get(first_new..).unwrap_or_default().to_vec(),
        })
    }

    async fn observe(&self, goal: &str, step: usize, history: &History, failure: Option<String>) -> Observation {
        let limits = &self.config.agent;
        let catalog = match catalog::extract(self.driver, limits.max_catalog).await {
            Ok(c) => c,
            Err(e) => {
                warn!("observation failed, planning without a catalog: {}", e);
                Vec::new()
            }
        };
        let screenshot_b64 = if limits.screenshot {
            match self.driver.screenshot().await {
                Ok(png) => Some(BASE64.encode(png)),
                Err(e) => {
                    debug!("screenshot failed: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let context = PlannerContext {
            goal: goal.to_string(),
            step,
            url: self.driver.url().await.unwrap_or_default(),
            title: self.driver.title().await.unwrap_or_default(),
            elements: catalog.iter().map(PlannerElement::from).collect(),
            screenshot_b64,
            history: history
                .recent(limits.history_window)
                .iter()
                .map(|c| c.to_string())
                .collect(),
            failure,
        };
        Observation { catalog, context }
    }

    /// Ask the planner, falling back to a wait on error or timeout.
    async fn plan(&self, ctx: &PlannerContext, narrator: &mut Narrator) -> Vec<AgentAction> {
        let limits = &self.config.agent;
        let fallback = || vec![AgentAction::wait(limits.planner_fallback_wait_ms, "planner unavailable")];
        let timeout = Duration::from_secs(limits.planner_timeout_secs);
        match tokio::time::timeout(timeout, self.planner.propose(ctx)).await {
            Ok(Ok(actions)) if !actions.is_empty() => actions,
            Ok(Ok(_)) => {
                narrator.say(format!("step {}: planner proposed nothing, waiting", ctx.step));
                fallback()
            }
            Ok(Err(e)) => {
                narrator.say(format!("step {}: planner error, waiting: {}", ctx.step, e));
                fallback()
            }
            Err(_) => {
                let e = Error::Timeout(format!("planner did not answer within {}s", limits.planner_timeout_secs));
                narrator.say(format!("step {}: {}, waiting", ctx.step, e));
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{catalog, element, fingerprint, raw_element, MockDriver, ScriptedPlanner};
    use crate::CommandKind;
    use serde_json::json;

    fn config() -> PilotConfig {
        let mut config = PilotConfig::default();
        config.agent.screenshot = false;
        config
    }

    fn click(target: ActionTarget) -> AgentAction {
        AgentAction::new(ActionKind::Click).with_target(target)
    }

    #[test]
    fn test_loop_detector_window() {
        let mut loops = LoopDetector::new(4, 3);
        assert!(!loops.observe("click:1"));
        assert!(!loops.observe("click:1"));
        assert!(loops.observe("click:1"));

        loops.reset();
        assert!(!loops.observe("click:1"));
        assert!(!loops.observe("click:2"));
        assert!(!loops.observe("click:3"));
        assert!(!loops.observe("click:4"));
        // the first click:1 has slid out of the window
        assert!(!loops.observe("click:1"));
        assert!(!loops.observe("click:1"));
        assert!(loops.observe("click:1"));
    }

    #[tokio::test]
    async fn test_repeated_click_finishes_on_third() {
        let driver = MockDriver::new();
        driver.on("wp:catalog", catalog(vec![raw_element("button", "next", "Next")]));
        driver.on_seq(
            "wp:fingerprint",
            vec![
                fingerprint("https://example.test/", 1, 10),
                fingerprint("https://example.test/", 2, 10),
                fingerprint("https://example.test/", 3, 10),
                fingerprint("https://example.test/", 4, 10),
            ],
        );
        let planner = ScriptedPlanner::repeating(click(ActionTarget::Index(0)), 5);
        let config = config();
        let mut history = History::new();

        let report = Agent::new(&driver, &planner, &config)
            .run("page through results", &mut history)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Finished);
        assert_eq!(report.steps, 2);
        assert_eq!(history.len(), 2);
        assert!(history.commands().iter().all(|c| c.target == "#next"));
        assert_eq!(driver.calls().iter().filter(|c| *c == "click:#next").count(), 2);
        assert!(report.narration.iter().any(|l| l.contains("proposed 3 times")));
    }

    #[tokio::test]
    async fn test_dead_click_is_discarded_and_excluded() {
        let driver = MockDriver::new();
        driver.on(
            "wp:catalog",
            catalog(vec![
                raw_element("button", "save", "Save"),
                raw_element("button", "save-draft", "Save draft"),
            ]),
        );
        let same = fingerprint("https://example.test/", 7, 10);
        driver.on_seq(
            "wp:fingerprint",
            vec![same.clone(), same.clone(), same, fingerprint("https://example.test/", 8, 10)],
        );
        let planner = ScriptedPlanner::new(vec![
            Ok(vec![click(ActionTarget::Description("Save".into()))]),
            Ok(vec![click(ActionTarget::Description("Save".into()))]),
        ]);
        let config = config();
        let mut history = History::new();

        let report = Agent::new(&driver, &planner, &config)
            .run("save the form", &mut history)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Finished);
        assert_eq!(history.len(), 1);
        assert_eq!(history.commands()[0].target, "#save-draft");
        let seen = planner.contexts();
        assert!(seen[1].failure.as_deref().unwrap_or("").contains("no observable change"));
        assert!(seen[2].failure.is_none());
    }

    #[tokio::test]
    async fn test_failed_batch_commits_nothing() {
        let driver = MockDriver::new();
        driver.on(
            "wp:catalog",
            catalog(vec![
                raw_element("input", "email", ""),
                raw_element("button", "go", "Go"),
            ]),
        );
        driver.on("wp:element", json!("{\"ok\":true,\"value\":\"a@b.c\"}"));
        let same = fingerprint("https://example.test/", 1, 5);
        driver.on("wp:fingerprint", same);
        let batch = vec![
            AgentAction::new(ActionKind::Type)
                .with_target(ActionTarget::Index(0))
                .with_value("a@b.c"),
            click(ActionTarget::Index(1)),
        ];
        let planner = ScriptedPlanner::new(vec![Ok(batch), Ok(vec![AgentAction::finish("gave up")])]);
        let mut config = config();
        config.agent.max_retries = 0;
        let mut history = History::new();

        let report = Agent::new(&driver, &planner, &config)
            .run("submit", &mut history)
            .await
            .unwrap();

        // the type succeeded, but its step failed as a whole
        assert!(driver.calls().contains(&"fill:#email=a@b.c".to_string()));
        assert!(history.is_empty());
        assert!(report.commands.is_empty());
        assert_eq!(report.status, RunStatus::Finished);
    }

    #[tokio::test]
    async fn test_planner_error_falls_back_to_wait() {
        let driver = MockDriver::new();
        driver.on("wp:catalog", catalog(Vec::new()));
        let planner = ScriptedPlanner::new(vec![Err(Error::Planner("garbled".into()))]);
        let config = config();
        let mut history = History::new();

        let report = Agent::new(&driver, &planner, &config)
            .run("anything", &mut history)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Finished);
        assert_eq!(history.len(), 1);
        assert_eq!(history.commands()[0].kind, CommandKind::Wait);
        assert!(report.narration.iter().any(|l| l.contains("planner error")));
    }

    #[tokio::test]
    async fn test_max_steps() {
        let driver = MockDriver::new();
        driver.on("wp:catalog", catalog(Vec::new()));
        let planner = ScriptedPlanner::new(vec![
            Ok(vec![AgentAction::wait(10, "a")]),
            Ok(vec![AgentAction::wait(20, "b")]),
            Ok(vec![AgentAction::wait(30, "c")]),
        ]);
        let mut config = config();
        config.agent.max_steps = 2;
        let mut history = History::new();

        let report = Agent::new(&driver, &planner, &config)
            .run("wait around", &mut history)
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::MaxSteps);
        assert_eq!(report.steps, 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_planning() {
        let driver = MockDriver::new();
        let planner = ScriptedPlanner::default();
        let config = config();
        let token = CancellationToken::new();
        token.cancel();
        let mut history = History::new();

        let report = Agent::new(&driver, &planner, &config)
            .with_cancellation(token)
            .run("never", &mut history)
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Cancelled);
        assert!(planner.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_narration_is_broadcast() {
        let driver = MockDriver::new();
        driver.on("wp:catalog", catalog(Vec::new()));
        let planner = ScriptedPlanner::default();
        let config = config();
        let (tx, mut rx) = broadcast::channel(16);
        let mut history = History::new();

        Agent::new(&driver, &planner, &config)
            .with_narration(tx)
            .run("say hello", &mut history)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), "goal: say hello");
    }

    #[tokio::test]
    async fn test_actor_reports_ambiguity_with_candidates() {
        let driver = MockDriver::new();
        let config = config();
        let resolver = Resolver::new(config.resolver.clone());
        let actor = Actor::new(&driver, &config, &resolver);
        let cat = vec![element(0, "button", "Log In"), element(1, "a", "Login Help")];

        let result = actor
            .perform(&click(ActionTarget::Description("Login".into())), &cat, &HashSet::new())
            .await;
        assert!(!result.success);
        assert!(result.message.contains("ambiguous"), "{}", result.message);
        assert_eq!(result.matched.len(), 2);
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_actor_index_label_firewall() {
        let driver = MockDriver::new();
        driver.on_seq("wp:fingerprint", vec![fingerprint("u", 1, 3), fingerprint("u", 2, 3)]);
        let config = config();
        let resolver = Resolver::new(config.resolver.clone());
        let actor = Actor::new(&driver, &config, &resolver);
        let cat = vec![element(0, "a", "Privacy"), element(1, "button", "Checkout")];

        let mut action = click(ActionTarget::Index(0));
        action.label = Some("Checkout".into());
        let result = actor.perform(&action, &cat, &HashSet::new()).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(driver.calls().iter().filter(|c| c.starts_with("click:")).last().unwrap(), "click:[data-idx=\"1\"]");

        let missing = actor
            .perform(&click(ActionTarget::Index(9)), &cat, &HashSet::new())
            .await;
        assert!(!missing.success);
        assert!(missing.message.contains("no element [9]"));
    }
}
