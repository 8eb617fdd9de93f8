//! Keeps tool attachments in step with the scene graph
//!
//! The scene layer reports structural changes as [`SceneChange`]s; the proxy
//! turns them into attach and detach calls on the [`ToolSystem`]. Every
//! attachment the proxy makes is recorded, so a removed subtree can be
//! detached without asking the scene what it used to contain.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::scene::{NodeId, SceneGraph, ScenePath};
use crate::system::ToolSystem;
use crate::tool::ToolHandle;

/// Structural change of the scene graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneChange {
    /// `node` (with its subtree) became a child of the last node of `parent`
    NodeAdded { parent: ScenePath, node: NodeId },
    /// `node` (with its subtree) was removed from the last node of `parent`
    NodeRemoved { parent: ScenePath, node: NodeId },
    /// `tool` was attached to the last node of `path`
    ToolAdded { path: ScenePath, tool: ToolHandle },
    /// `tool` was detached from the last node of `path`
    ToolRemoved { path: ScenePath, tool: ToolHandle },
}

/// Mirrors the tools found in a scene into a tool system
#[derive(Debug)]
pub struct ToolUpdateProxy {
    system: ToolSystem,
    attached: IndexMap<ScenePath, Vec<ToolHandle>>,
    root: Option<NodeId>,
    disposed: bool,
}

impl ToolUpdateProxy {
    pub fn new(system: ToolSystem) -> Self {
        Self {
            system,
            attached: IndexMap::new(),
            root: None,
            disposed: false,
        }
    }

    /// Attaches every tool below `root`, detaching those of a previous root
    pub fn set_scene_root(&mut self, scene: &dyn SceneGraph, root: NodeId) {
        if self.disposed {
            return;
        }
        if self.root.is_some() {
            self.detach_below(&ScenePath::new());
        }
        self.root = Some(root);
        self.attach_subtree(scene, ScenePath::root(root));
    }

    /// Applies one structural change
    pub fn handle_change(&mut self, scene: &dyn SceneGraph, change: SceneChange) {
        if self.disposed {
            debug!(?change, "proxy disposed, ignoring scene change");
            return;
        }
        match change {
            SceneChange::NodeAdded { parent, node } => {
                self.attach_subtree(scene, parent.child(node));
            }
            SceneChange::NodeRemoved { parent, node } => {
                self.detach_below(&parent.child(node));
            }
            SceneChange::ToolAdded { path, tool } => self.attach(tool, path),
            SceneChange::ToolRemoved { path, tool } => self.detach(tool, path),
        }
    }

    /// Tools attached through this proxy, by path
    pub fn attachments(&self) -> impl Iterator<Item = (&ScenePath, &[ToolHandle])> {
        self.attached
            .iter()
            .map(|(path, tools)| (path, tools.as_slice()))
    }

    /// Stops reacting to scene changes; attachments are left to the system
    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    fn attach_subtree(&mut self, scene: &dyn SceneGraph, path: ScenePath) {
        let Some(node) = path.last() else {
            return;
        };
        for tool in scene.tools(node) {
            self.attach(tool, path.clone());
        }
        for child in scene.children(node) {
            if path.nodes().contains(&child) {
                warn!(%path, child = child.0, "cycle in scene graph, skipping child");
                continue;
            }
            self.attach_subtree(scene, path.child(child));
        }
    }

    fn attach(&mut self, tool: ToolHandle, path: ScenePath) {
        match self.system.add_tool(tool, path.clone()) {
            Ok(()) => self.attached.entry(path).or_default().push(tool),
            Err(error) => warn!(%tool, %path, %error, "couldn't attach tool"),
        }
    }

    fn detach(&mut self, tool: ToolHandle, path: ScenePath) {
        if let Some(tools) = self.attached.get_mut(&path) {
            tools.retain(|t| *t != tool);
            if tools.is_empty() {
                self.attached.shift_remove(&path);
            }
        }
        if let Err(error) = self.system.remove_tool(tool, path.clone()) {
            warn!(%tool, %path, %error, "couldn't detach tool");
        }
    }

    /// Detaches every recorded tool at or below `prefix`, deepest first
    fn detach_below(&mut self, prefix: &ScenePath) {
        let mut removed: Vec<(ScenePath, Vec<ToolHandle>)> = Vec::new();
        self.attached.retain(|path, tools| {
            if path.starts_with(prefix) {
                removed.push((path.clone(), std::mem::take(tools)));
                false
            } else {
                true
            }
        });
        removed.sort_by_key(|(path, _)| std::cmp::Reverse(path.len()));
        for (path, tools) in removed {
            for tool in tools {
                if let Err(error) = self.system.remove_tool(tool, path.clone()) {
                    warn!(%tool, %path, %error, "couldn't detach tool");
                }
            }
        }
    }
}
