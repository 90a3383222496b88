//! Command history with a per-step buffer.
//!
//! While a step is open, recorded commands go to the buffer and are invisible
//! in [`History::commands`]. The buffer is committed or discarded as a whole.

use tracing::debug;
use webpilot_script::ExecutionCommand;

#[derive(Debug, Default, Clone)]
pub struct History {
    committed: Vec<ExecutionCommand>,
    buffer: Option<Vec<ExecutionCommand>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a step. An already open step is discarded first.
    pub fn begin_step(&mut self) {
        if let Some(stale) = self.buffer.replace(Vec::new()) {
            if !stale.is_empty() {
                debug!("discarding {} commands from an unfinished step", stale.len());
            }
        }
    }

    /// Record into the open step, or straight into history when none is open.
    pub fn record(&mut self, cmd: ExecutionCommand) {
        match self.buffer.as_mut() {
            Some(buf) => buf.push(cmd),
            None => self.committed.push(cmd),
        }
    }

    pub fn record_all(&mut self, cmds: impl IntoIterator<Item = ExecutionCommand>) {
        for cmd in cmds {
            self.record(cmd);
        }
    }

    /// Flush the open step into history. Returns how many commands landed.
    pub fn commit_step(&mut self) -> usize {
        let buf = self.buffer.take().unwrap_or_default();
        let n = buf.len();
        self.committed.extend(buf);
        n
    }

    /// Drop the open step. Returns how many commands were dropped.
    pub fn discard_step(&mut self) -> usize {
        self.buffer.take().map(|b| b.len()).unwrap_or(0)
    }

    pub fn in_step(&self) -> bool {
        self.buffer.is_some()
    }

    /// Committed commands only.
    pub fn commands(&self) -> &[ExecutionCommand] {
        &self.committed
    }

    /// The last `n` committed commands.
    pub fn recent(&self, n: usize) -> &[ExecutionCommand] {
        let start = self.committed.len().saturating_sub(n);
        &self.committed[start..]
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    pub fn reset(&mut self) {
        self.committed.clear();
        self.buffer = None;
    }
}
