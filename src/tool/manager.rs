//! Attachment paths of tools

use indexmap::{IndexMap, IndexSet};
use tracing::{trace, warn};

use super::{ToolError, ToolHandle};
use crate::scene::ScenePath;

#[derive(Debug, Default)]
struct Attachments {
    paths: Vec<ScenePath>,
    needs_pick: bool,
}

/// Which scene paths each tool is attached to
///
/// Used to pick the tools closest to a hit: a tool attached at a node is a
/// candidate for every pick path running through that node.
#[derive(Debug, Default)]
pub struct ToolManager {
    tools: IndexMap<ToolHandle, Attachments>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `tool` at `path`
    ///
    /// `needs_pick` is recorded on the first attachment. Returns whether this
    /// was the tool's first attachment.
    pub fn add_tool(
        &mut self,
        tool: ToolHandle,
        path: ScenePath,
        needs_pick: bool,
    ) -> Result<bool, ToolError> {
        let attachments = self.tools.entry(tool).or_insert_with(|| Attachments {
            paths: Vec::new(),
            needs_pick,
        });
        if attachments.paths.contains(&path) {
            return Err(ToolError::DuplicateAttachment { tool, path });
        }
        let first = attachments.paths.is_empty();
        attachments.paths.push(path);
        Ok(first)
    }

    /// Detaches `tool` from `path`; returns whether that was the last attachment
    pub fn remove_tool(&mut self, tool: ToolHandle, path: &ScenePath) -> Result<bool, ToolError> {
        let unknown = || ToolError::UnknownAttachment {
            tool,
            path: path.clone(),
        };
        let attachments = self.tools.get_mut(&tool).ok_or_else(unknown)?;
        let index = attachments
            .paths
            .iter()
            .position(|p| p == path)
            .ok_or_else(unknown)?;
        attachments.paths.remove(index);
        if attachments.paths.is_empty() {
            self.tools.shift_remove(&tool);
            return Ok(true);
        }
        Ok(false)
    }

    /// True iff the tool has at least one activation slot
    pub fn needs_pick(&self, tool: ToolHandle) -> bool {
        self.tools.get(&tool).is_some_and(|a| a.needs_pick)
    }

    /// Paths at which `tool` is attached
    pub fn attachments(&self, tool: ToolHandle) -> &[ScenePath] {
        self.tools
            .get(&tool)
            .map(|a| a.paths.as_slice())
            .unwrap_or_default()
    }

    pub fn is_attached(&self, tool: ToolHandle) -> bool {
        self.tools.contains_key(&tool)
    }

    /// Every attached tool, in attachment order
    pub fn tools(&self) -> impl Iterator<Item = ToolHandle> + '_ {
        self.tools.keys().copied()
    }

    /// Candidates attached closest to the end of `pick_path`
    ///
    /// Walks the first `depth` nodes of the pick path from the deepest node
    /// towards the root. At every node, the candidates attached exactly there
    /// form the selection; the first non-empty selection wins. Returns the
    /// depth at which it was found together with the selected tools, or
    /// `None` when no candidate is attached anywhere along the path.
    pub fn select_tools_for_path(
        &self,
        pick_path: &ScenePath,
        depth: usize,
        candidates: &IndexSet<ToolHandle>,
    ) -> Option<(usize, Vec<ToolHandle>)> {
        for level in (1..=depth.min(pick_path.len())).rev() {
            let prefix = pick_path.prefix(level);
            let selection: Vec<ToolHandle> = candidates
                .iter()
                .copied()
                .filter(|tool| {
                    if !self.needs_pick(*tool) {
                        warn!(%tool, "always-active tool among pick candidates");
                    }
                    self.attachments(*tool).contains(&prefix)
                })
                .collect();
            if !selection.is_empty() {
                trace!(level, path = %prefix, count = selection.len(), "selected pick tools");
                return Some((level, selection));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NodeId;

    fn path(ids: &[u64]) -> ScenePath {
        ids.iter().map(|&i| NodeId(i)).collect()
    }

    fn handle(i: usize) -> ToolHandle {
        ToolHandle(i)
    }

    #[test]
    fn test_first_and_last_attachment() {
        let mut manager = ToolManager::new();
        let tool = handle(0);
        assert_eq!(manager.add_tool(tool, path(&[0, 1]), true), Ok(true));
        assert_eq!(manager.add_tool(tool, path(&[0, 2]), true), Ok(false));
        assert_eq!(manager.remove_tool(tool, &path(&[0, 1])), Ok(false));
        assert_eq!(manager.remove_tool(tool, &path(&[0, 2])), Ok(true));
        assert!(!manager.is_attached(tool));
    }

    #[test]
    fn test_duplicate_and_unknown_attachments_fail() {
        let mut manager = ToolManager::new();
        let tool = handle(0);
        manager.add_tool(tool, path(&[0, 1]), false).unwrap();
        assert!(matches!(
            manager.add_tool(tool, path(&[0, 1]), false),
            Err(ToolError::DuplicateAttachment { .. })
        ));
        assert!(matches!(
            manager.remove_tool(tool, &path(&[0, 9])),
            Err(ToolError::UnknownAttachment { .. })
        ));
        assert!(matches!(
            manager.remove_tool(handle(5), &path(&[0])),
            Err(ToolError::UnknownAttachment { .. })
        ));
    }

    #[test]
    fn test_needs_pick() {
        let mut manager = ToolManager::new();
        manager.add_tool(handle(0), path(&[0]), true).unwrap();
        manager.add_tool(handle(1), path(&[0]), false).unwrap();
        assert!(manager.needs_pick(handle(0)));
        assert!(!manager.needs_pick(handle(1)));
        assert!(!manager.needs_pick(handle(2)));
    }

    #[test]
    fn test_closest_ancestor_wins() {
        let mut manager = ToolManager::new();
        let on_a = handle(0);
        let on_b = handle(1);
        manager.add_tool(on_a, path(&[0, 1]), true).unwrap();
        manager.add_tool(on_b, path(&[0, 1, 2]), true).unwrap();
        let candidates: IndexSet<_> = [on_a, on_b].into_iter().collect();

        let pick = path(&[0, 1, 2, 3]);
        let (level, tools) = manager
            .select_tools_for_path(&pick, pick.len(), &candidates)
            .unwrap();
        assert_eq!(level, 3);
        assert_eq!(tools, vec![on_b]);

        // Continuing above the first selection reaches the outer tool
        let (level, tools) = manager
            .select_tools_for_path(&pick, level - 1, &candidates)
            .unwrap();
        assert_eq!(level, 2);
        assert_eq!(tools, vec![on_a]);
    }

    #[test]
    fn test_non_candidates_are_ignored() {
        let mut manager = ToolManager::new();
        manager.add_tool(handle(0), path(&[0, 1]), true).unwrap();
        let candidates: IndexSet<_> = [handle(1)].into_iter().collect();
        assert_eq!(
            manager.select_tools_for_path(&path(&[0, 1]), 2, &candidates),
            None
        );
    }
}
