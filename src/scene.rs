//! Contracts with the scene and viewer layer
//!
//! The tool system never owns a scene graph. It names scene nodes by
//! [`NodeId`], addresses attachment points by [`ScenePath`], and reaches the
//! scene only through the traits defined here: a [`Viewer`] for camera
//! matrices, a [`PickSystem`] for ray casts, and a [`SceneGraph`] for the
//! structural walks of the update proxy.

use std::fmt;

use glam::{DMat4, DVec4};

use crate::tool::ToolHandle;

/// Identifier of a scene-graph component, assigned by the embedding scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Path of components from the scene root down to one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ScenePath(Vec<NodeId>);

impl ScenePath {
    /// Empty path
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Path consisting of the root only
    pub fn root(root: NodeId) -> Self {
        Self(vec![root])
    }

    /// Appends a node
    pub fn push(&mut self, node: NodeId) {
        self.0.push(node);
    }

    /// Copy of this path extended by `node`
    pub fn child(&self, node: NodeId) -> Self {
        let mut nodes = self.0.clone();
        nodes.push(node);
        Self(nodes)
    }

    /// Copy of the first `len` nodes
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    /// Whether this path starts with all of `other`
    pub fn starts_with(&self, other: &ScenePath) -> bool {
        self.0.starts_with(&other.0)
    }

    /// First node (the scene root)
    pub fn first(&self) -> Option<NodeId> {
        self.0.first().copied()
    }

    /// Last node
    pub fn last(&self) -> Option<NodeId> {
        self.0.last().copied()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty path
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Nodes from root to leaf
    pub fn nodes(&self) -> &[NodeId] {
        &self.0
    }
}

impl From<Vec<NodeId>> for ScenePath {
    fn from(nodes: Vec<NodeId>) -> Self {
        Self(nodes)
    }
}

impl FromIterator<NodeId> for ScenePath {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", node.0)?;
        }
        Ok(())
    }
}

/// One hit of a ray cast
#[derive(Debug, Clone, PartialEq)]
pub struct PickResult {
    /// Components from the root to the component holding the hit geometry
    pub path: ScenePath,
    /// Geometry that was hit, if the hit was on geometry
    pub geometry: Option<NodeId>,
    /// Hit point in world coordinates
    pub world_coordinates: DVec4,
    /// Distance along the ray
    pub distance: f64,
}

impl PickResult {
    /// Hit on `geometry` below `path`
    pub fn geometry_hit(path: ScenePath, geometry: NodeId, world_coordinates: DVec4) -> Self {
        Self {
            path,
            geometry: Some(geometry),
            world_coordinates,
            distance: 0.0,
        }
    }
}

/// Ray-cast oracle supplied by the viewer layer
pub trait PickSystem: Send {
    /// Hits along the ray from `from` towards `to`, nearest first
    ///
    /// Both points are homogeneous world coordinates; `to` may be a direction
    /// (w = 0).
    fn compute_pick(&mut self, from: DVec4, to: DVec4) -> Vec<PickResult>;
}

/// Pick system that never hits anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPick;

impl PickSystem for NoPick {
    fn compute_pick(&mut self, _from: DVec4, _to: DVec4) -> Vec<PickResult> {
        Vec::new()
    }
}

/// Camera and scene-root access supplied by the viewer layer
pub trait Viewer: Send {
    /// Root component of the scene
    fn scene_root(&self) -> NodeId;

    /// Path from the root to the camera, if a camera is set
    fn camera_path(&self) -> Option<ScenePath>;

    /// Accumulated local-to-world matrix of the last node of `path`
    fn path_matrix(&self, path: &ScenePath) -> DMat4;

    /// Camera to normalized device coordinates; `None` without a viewing
    /// component, in which case the identity is used
    fn camera_to_ndc(&self) -> Option<DMat4>;
}

/// Structural access to the scene for the update proxy
pub trait SceneGraph {
    /// Child components of `node`
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Tools attached directly to `node`
    fn tools(&self, node: NodeId) -> Vec<ToolHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(ids: &[u64]) -> ScenePath {
        ids.iter().map(|&i| NodeId(i)).collect()
    }

    #[test]
    fn test_prefix_and_starts_with() {
        let p = path(&[0, 1, 2, 3]);
        assert_eq!(p.prefix(2), path(&[0, 1]));
        assert_eq!(p.prefix(10), p);
        assert!(p.starts_with(&path(&[0, 1])));
        assert!(!p.starts_with(&path(&[1])));
    }

    #[test]
    fn test_child_extends_copy() {
        let root = ScenePath::root(NodeId(7));
        let child = root.child(NodeId(8));
        assert_eq!(root.len(), 1);
        assert_eq!(child.nodes(), &[NodeId(7), NodeId(8)]);
        assert_eq!(child.to_string(), "7/8");
    }
}
