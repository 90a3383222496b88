//! History clean-up before compilation.

use crate::command::{CommandKind, ExecutionCommand};

/// Thresholds for the optimization pass.
#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    /// Waits shorter than this are dropped.
    pub min_wait_ms: u64,
    /// Merged consecutive waits are capped at this.
    pub max_wait_ms: u64,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            min_wait_ms: 100,
            max_wait_ms: 5_000,
        }
    }
}

/// Elide redundant commands.
///
/// Merges runs of waits (capped) and drops waits under the threshold, then
/// collapses consecutive identical navigations and drops a click that repeats
/// the one right before it. Dropping a short wait can make two clicks
/// adjacent, so waits go first. Nothing is reordered and no command is
/// invented.
pub fn optimize(commands: &[ExecutionCommand], opts: &OptimizeOptions) -> Vec<ExecutionCommand> {
    let mut out: Vec<ExecutionCommand> = Vec::with_capacity(commands.len());
    for cmd in settle_waits(commands, opts) {
        if out.last().is_some_and(|prev| repeats(prev, &cmd)) {
            continue;
        }
        out.push(cmd);
    }
    out
}

fn repeats(prev: &ExecutionCommand, cmd: &ExecutionCommand) -> bool {
    match cmd.kind {
        CommandKind::Navigate => prev.kind == CommandKind::Navigate && prev.target == cmd.target,
        CommandKind::Click => prev.same_step(cmd),
        _ => false,
    }
}

fn settle_waits(commands: &[ExecutionCommand], opts: &OptimizeOptions) -> Vec<ExecutionCommand> {
    let mut out: Vec<ExecutionCommand> = Vec::with_capacity(commands.len());
    for cmd in commands {
        if cmd.kind != CommandKind::Wait {
            out.push(cmd.clone());
            continue;
        }
        match out.last_mut() {
            Some(p) if p.kind == CommandKind::Wait => {
                let merged = (p.wait_ms() + cmd.wait_ms()).min(opts.max_wait_ms);
                *p = ExecutionCommand::wait(merged);
            }
            _ if cmd.wait_ms() > opts.max_wait_ms => out.push(ExecutionCommand::wait(opts.max_wait_ms)),
            _ => out.push(cmd.clone()),
        }
    }
    out.retain(|c| c.kind != CommandKind::Wait || c.wait_ms() >= opts.min_wait_ms);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> OptimizeOptions {
        OptimizeOptions::default()
    }

    #[test]
    fn test_collapse_duplicate_navigation() {
        let history = vec![
            ExecutionCommand::navigate("https://a.example"),
            ExecutionCommand::navigate("https://a.example"),
            ExecutionCommand::click("#x", None, "click x"),
        ];
        let out = optimize(&history, &opts());
        assert_eq!(
            out,
            vec![
                ExecutionCommand::navigate("https://a.example"),
                ExecutionCommand::click("#x", None, "click x"),
            ]
        );
    }

    #[test]
    fn test_distinct_navigations_kept() {
        let history = vec![
            ExecutionCommand::navigate("https://a.example"),
            ExecutionCommand::navigate("https://b.example"),
            ExecutionCommand::navigate("https://a.example"),
        ];
        assert_eq!(optimize(&history, &opts()).len(), 3);
    }

    #[test]
    fn test_repeated_click_dropped_only_when_adjacent() {
        let history = vec![
            ExecutionCommand::click("#go", None, "go"),
            ExecutionCommand::click("#go", None, "go again"),
            ExecutionCommand::type_text("#q", "rust", None, "query"),
            ExecutionCommand::click("#go", None, "go"),
        ];
        let out = optimize(&history, &opts());
        let kinds: Vec<_> = out.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![CommandKind::Click, CommandKind::Type, CommandKind::Click]
        );
    }

    #[test]
    fn test_waits_merged_capped_and_trimmed() {
        let history = vec![
            ExecutionCommand::wait(3_000),
            ExecutionCommand::wait(4_000),
            ExecutionCommand::click("#a", None, "a"),
            ExecutionCommand::wait(50),
            ExecutionCommand::click("#b", None, "b"),
        ];
        let out = optimize(&history, &opts());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].wait_ms(), 5_000);
        assert_eq!(out[1].target, "#a");
        assert_eq!(out[2].target, "#b");
    }

    #[test]
    fn test_short_waits_summing_over_threshold_survive() {
        let history = vec![ExecutionCommand::wait(60), ExecutionCommand::wait(60)];
        let out = optimize(&history, &opts());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].wait_ms(), 120);
    }

    #[test]
    fn test_click_repeated_across_short_wait_dropped() {
        let history = vec![
            ExecutionCommand::click("#a", None, "a"),
            ExecutionCommand::wait(50),
            ExecutionCommand::click("#a", None, "a again"),
            ExecutionCommand::wait(500),
            ExecutionCommand::click("#a", None, "a once more"),
        ];
        let out = optimize(&history, &opts());
        let kinds: Vec<_> = out.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![CommandKind::Click, CommandKind::Wait, CommandKind::Click]
        );
    }
}
