use std::{
    fmt::{self, Display},
    time::{Duration, Instant},
};

use crate::Result;

#[derive(Debug, Clone, Default)]
struct TimerNode {
    total: Duration,
    calls: usize,
    children: Vec<(String, TimerNode)>,
}

impl TimerNode {
    fn child_mut(&mut self, key: &str) -> &mut TimerNode {
        let pos = match self.children.iter().position(|(k, _)| k == key) {
            Some(pos) => pos,
            None => {
                self.children.push((key.to_string(), TimerNode::default()));
                self.children.len() - 1
            }
        };

        &mut self.children[pos].1
    }

    fn child(&self, key: &str) -> Option<&TimerNode> {
        self.children.iter().find(|(k, _)| k == key).map(|(_, n)| n)
    }

    fn fmt_level(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for (key, node) in &self.children {
            let indent = depth * 2;
            writeln!(
                f,
                "{:indent$}{key}: {:.6}s ({} calls)",
                "",
                node.total.as_secs_f64(),
                node.calls
            )?;
            node.fmt_level(f, depth + 1)?;
        }

        Ok(())
    }
}

/// A tree of named, accumulating wall clock timers.
///
/// Keys are kept in first recorded order so the printed report follows the loop structure.
#[derive(Debug, Clone, Default)]
pub struct TimerMap {
    name: String,
    root: TimerNode,
}

impl TimerMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: TimerNode::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds `elapsed` to the timer at `path`, creating every missing level on the way.
    pub fn record(&mut self, path: &[&str], elapsed: Duration) {
        let node = path.iter().fold(&mut self.root, |node, key| node.child_mut(key));
        node.total += elapsed;
        node.calls += 1;
    }

    pub fn total(&self, path: &[&str]) -> Option<Duration> {
        self.find(path).map(|n| n.total)
    }

    pub fn calls(&self, path: &[&str]) -> Option<usize> {
        self.find(path).map(|n| n.calls)
    }

    fn find(&self, path: &[&str]) -> Option<&TimerNode> {
        path.iter()
            .try_fold(&self.root, |node, key| node.child(key))
    }
}

impl Display for TimerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        self.root.fmt_level(f, 1)
    }
}

/// Runs `f`, recording its wall clock time under `path` whether it fails or not.
pub(crate) fn timed<T, F>(timers: &mut TimerMap, path: &[&str], f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let start = Instant::now();
    let res = f();
    timers.record(path, start.elapsed());
    res
}
