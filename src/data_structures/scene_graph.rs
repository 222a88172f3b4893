//! Scene graph and hierarchical scene organization.
//!
//! The graph is an arena: nodes are addressed by index, hold their children by
//! index and keep a back reference to their parent. Indices of a graph decoded
//! from glTF match the node indices of the file, so animation channels and
//! skins can refer to nodes directly.

use cgmath::SquareMatrix;

use crate::data_structures::instance::Instance;

pub type NodeId = usize;

#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: String,
    /// Current local transform, written by the animation mixer.
    pub local: Instance,
    /// Local transform as authored; the mixer blends toward it.
    pub rest: Instance,
    /// Cached by [`SceneGraph::update_world_transforms`].
    pub world: cgmath::Matrix4<f32>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Index of the mesh drawn at this node.
    pub mesh: Option<usize>,
    /// Index of the skin deforming that mesh.
    pub skin: Option<usize>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, local: Instance) -> Self {
        Self {
            name: name.into(),
            rest: local.clone(),
            local,
            world: cgmath::Matrix4::identity(),
            parent: None,
            children: Vec::new(),
            mesh: None,
            skin: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    pub nodes: Vec<SceneNode>,
    pub roots: Vec<NodeId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a node without a parent. It is not a root until passed to
    /// [`SceneGraph::add_root`] or given a parent.
    pub fn add_node(&mut self, node: SceneNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_root(&mut self, id: NodeId) {
        if id < self.nodes.len() && !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    /// Links `child` below `parent`. Returns false, leaving the graph
    /// untouched, when either index is invalid, the child already has a
    /// parent or the link would close a cycle.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if parent >= self.nodes.len() || child >= self.nodes.len() {
            log::warn!("node {} or {} does not exist", parent, child);
            return false;
        }
        if self.nodes[child].parent.is_some() {
            log::warn!("node {} already has a parent", child);
            return false;
        }
        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            if id == child {
                log::warn!("linking node {} below {} would create a cycle", child, parent);
                return false;
            }
            ancestor = self.nodes[id].parent;
        }
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        true
    }

    pub fn local_transform(&self, id: NodeId) -> Option<&Instance> {
        self.nodes.get(id).map(|node| &node.local)
    }

    pub fn set_local_transform(&mut self, id: NodeId, instance: Instance) {
        match self.nodes.get_mut(id) {
            Some(node) => node.local = instance,
            None => log::warn!("tried to transform missing node {}", id),
        }
    }

    /// Puts every node back into its authored pose.
    pub fn reset_to_rest(&mut self) {
        for node in self.nodes.iter_mut() {
            node.local = node.rest.clone();
        }
    }

    /// Recomputes `world = parent.world * local` for every node reachable
    /// from the roots, with the roots placed in `root_transform`.
    pub fn update_world_transforms(&mut self, root_transform: &cgmath::Matrix4<f32>) {
        let mut stack: Vec<(NodeId, cgmath::Matrix4<f32>)> =
            self.roots.iter().rev().map(|&id| (id, *root_transform)).collect();
        while let Some((id, parent_world)) = stack.pop() {
            let node = &mut self.nodes[id];
            node.world = parent_world * node.local.to_matrix();
            let world = node.world;
            for &child in node.children.iter().rev() {
                stack.push((child, world));
            }
        }
    }

    pub fn world_transform(&self, id: NodeId) -> Option<cgmath::Matrix4<f32>> {
        self.nodes.get(id).map(|node| node.world)
    }

    /// Depth first, parents before children, each reachable node once.
    pub fn traverse(&self, mut visit: impl FnMut(NodeId, &SceneNode)) {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            visit(id, node);
            stack.extend(node.children.iter().rev());
        }
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        let mut found = None;
        self.traverse(|id, node| {
            if found.is_none() && node.name == name {
                found = Some(id);
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Vector4};

    fn chain() -> (SceneGraph, NodeId, NodeId, NodeId) {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(SceneNode::new(
            "root",
            Instance::new().with_position([0.0, 3.0, 0.0]),
        ));
        let arm = graph.add_node(SceneNode::new(
            "arm",
            Instance::new().with_position([1.0, 0.0, 0.0]),
        ));
        let hand = graph.add_node(SceneNode::new(
            "hand",
            Instance::new().with_position([0.0, 0.0, 2.0]),
        ));
        graph.add_root(root);
        assert!(graph.add_child(root, arm));
        assert!(graph.add_child(arm, hand));
        (graph, root, arm, hand)
    }

    fn origin_of(graph: &SceneGraph, id: NodeId) -> cgmath::Vector3<f32> {
        (graph.world_transform(id).unwrap() * Vector4::new(0.0, 0.0, 0.0, 1.0)).truncate()
    }

    #[test]
    fn world_transforms_compose_down_the_tree() {
        let (mut graph, _, _, hand) = chain();
        let scale = cgmath::Matrix4::from_scale(2.0);
        graph.update_world_transforms(&scale);
        let expected = cgmath::Vector3::new(2.0, 6.0, 4.0);
        assert!((origin_of(&graph, hand) - expected).magnitude() < 1e-5);
    }

    #[test]
    fn reset_to_rest_undoes_animation() {
        let (mut graph, _, arm, hand) = chain();
        graph.set_local_transform(arm, Instance::new().with_position([5.0, 0.0, 0.0]));
        graph.update_world_transforms(&cgmath::Matrix4::identity());
        assert!((origin_of(&graph, hand).x - 5.0).abs() < 1e-5);

        graph.reset_to_rest();
        graph.update_world_transforms(&cgmath::Matrix4::identity());
        assert!((origin_of(&graph, hand).x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn traverse_visits_parents_first_and_once() {
        let (mut graph, root, arm, hand) = chain();
        let sibling = graph.add_node(SceneNode::new("sibling", Instance::new()));
        assert!(graph.add_child(root, sibling));

        let mut order = Vec::new();
        graph.traverse(|id, _| order.push(id));
        assert_eq!(order, vec![root, arm, hand, sibling]);
        assert_eq!(graph.find("sibling"), Some(sibling));
        assert_eq!(graph.find("nobody"), None);
    }

    #[test]
    fn cycles_and_second_parents_are_refused() {
        let (mut graph, root, arm, hand) = chain();
        assert!(!graph.add_child(hand, root));
        assert!(!graph.add_child(root, hand));
        assert!(!graph.add_child(arm, 42));
        assert_eq!(graph.nodes[arm].children, vec![hand]);
    }
}
