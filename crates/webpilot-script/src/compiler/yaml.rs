//! Runner YAML output.

use super::{locator_for, CompileOptions, Locator};
use crate::command::{CommandKind, ExecutionCommand};
use crate::script::actions::{
    ClickAction, FillAction, GotoAction, PressKeyAction, SelectAction, Target, WaitAction,
};
use crate::script::{Action, BrowserConfig, Script, TargetUrl};
use crate::Result;

fn target_for(cmd: &ExecutionCommand) -> Target {
    let frame = cmd
        .selectors
        .as_ref()
        .map(|b| b.frame.clone())
        .unwrap_or_default();
    let mut target = Target {
        frame,
        ..Default::default()
    };
    match locator_for(cmd) {
        Locator::Css(s) | Locator::Raw(s) => target.selector = Some(s),
        Locator::XPath(x) => target.xpath = Some(x),
        Locator::Id(id) => target.selector = Some(format!("[id={}]", quote(&id))),
        Locator::Text(t) => target.text = Some(t),
    }
    target
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
}

fn action_for(cmd: &ExecutionCommand) -> Option<Action> {
    let value = cmd.value.clone().unwrap_or_default();
    let action = match cmd.kind {
        CommandKind::Navigate => Action::Goto(GotoAction {
            url: cmd.target.clone(),
        }),
        CommandKind::Click => Action::Click(ClickAction {
            target: target_for(cmd),
            force: cmd.force,
        }),
        CommandKind::Type => {
            let keyboard = cmd.target.is_empty() && cmd.selectors.as_ref().map_or(true, |b| b.is_empty());
            Action::Fill(FillAction {
                target: if keyboard { Target::default() } else { target_for(cmd) },
                value,
            })
        }
        CommandKind::Select => Action::Select(SelectAction {
            target: target_for(cmd),
            value,
        }),
        CommandKind::Press => Action::PressKey(PressKeyAction {
            key: cmd.target.clone(),
        }),
        CommandKind::Wait => {
            let ms = cmd.wait_ms();
            if ms == 0 {
                return None;
            }
            Action::Wait(WaitAction { ms })
        }
    };
    Some(action)
}

/// Build the replay script. The first navigation becomes the start URL.
pub fn to_script(commands: &[ExecutionCommand], opts: &CompileOptions) -> Script {
    let (url, rest) = match commands.first() {
        Some(first) if first.kind == CommandKind::Navigate => (first.target.clone(), &commands[1..]),
        _ => ("about:blank".to_string(), commands),
    };
    Script {
        name: opts.name.clone(),
        browser: BrowserConfig {
            headless: opts.headless,
            ..Default::default()
        },
        target: TargetUrl { url },
        actions: rest.iter().filter_map(action_for).collect(),
        on_failure: None,
    }
}

pub(super) fn render(commands: &[ExecutionCommand], opts: &CompileOptions) -> Result<String> {
    to_script(commands, opts).to_yaml()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SelectorBundle;
    use crate::compiler::{compile, Format};

    #[test]
    fn test_yaml_output_parses_back() {
        let history = vec![
            ExecutionCommand::navigate("https://example.com"),
            ExecutionCommand::click(
                "#menu",
                Some(SelectorBundle {
                    css: Some("#menu".into()),
                    ..Default::default()
                }),
                "menu",
            ),
            ExecutionCommand::click(
                "Settings",
                Some(SelectorBundle {
                    text: Some("Settings".into()),
                    frame: vec![0],
                    ..Default::default()
                }),
                "settings item",
            ),
            ExecutionCommand::select("#state", "Iowa", None, "state"),
            ExecutionCommand::type_text("", "Io", None, "filter"),
            ExecutionCommand::press("Enter"),
            ExecutionCommand::wait(250),
        ];
        let opts = CompileOptions {
            format: Format::Yaml,
            name: "replay".into(),
            ..Default::default()
        };
        let yaml = compile(&history, &opts).unwrap();
        let script = Script::parse(&yaml).unwrap();

        assert_eq!(script.name, "replay");
        assert_eq!(script.target.url, "https://example.com");
        assert_eq!(script.actions.len(), 6);
        match &script.actions[1] {
            Action::Click(a) => {
                assert_eq!(a.target.text.as_deref(), Some("Settings"));
                assert_eq!(a.target.frame, vec![0]);
            }
            other => panic!("expected click, got {:?}", other),
        }
        match &script.actions[3] {
            Action::Fill(a) => {
                assert!(a.target.is_empty());
                assert_eq!(a.value, "Io");
            }
            other => panic!("expected fill, got {:?}", other),
        }
        assert!(matches!(script.actions[5], Action::Wait(WaitAction { ms: 250 })));
    }

    #[test]
    fn test_forced_click_stays_forced() {
        let bundle = SelectorBundle {
            css: Some("#opt".into()),
            ..Default::default()
        };
        let history = vec![
            ExecutionCommand::click("#opt", Some(bundle.clone()), "scanned option").forced(),
            ExecutionCommand::click("#ok", None, "ok"),
        ];
        let yaml = compile(&history, &CompileOptions { format: Format::Yaml, ..Default::default() }).unwrap();
        let script = Script::parse(&yaml).unwrap();
        match (&script.actions[0], &script.actions[1]) {
            (Action::Click(forced), Action::Click(plain)) => {
                assert!(forced.force);
                assert!(!plain.force);
            }
            other => panic!("expected two clicks, got {:?}", other),
        }
    }

    #[test]
    fn test_history_without_navigation_starts_blank() {
        let history = vec![ExecutionCommand::press("Tab")];
        let script = to_script(&history, &CompileOptions::default());
        assert_eq!(script.target.url, "about:blank");
        assert_eq!(script.actions.len(), 1);
    }
}
