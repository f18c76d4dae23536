//! Scenes and skeletons: flat node arenas linked by child indices.

use crate::util::Mat4;

/// Node of a scene. Children are indices into the owning scene's node list.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub model: Option<u32>,
    pub skeleton: Option<u32>,
    pub transform: Mat4,
    pub children: Vec<u32>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            skeleton: None,
            transform: Mat4::IDENTITY,
            children: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: u32) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_skeleton(mut self, skeleton: u32) -> Self {
        self.skeleton = Some(skeleton);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_children(mut self, children: Vec<u32>) -> Self {
        self.children = children;
        self
    }
}

/// Ordered node arena plus the nodes traversal starts from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    pub name: String,
    pub is_default: bool,
    /// Root node indices. Empty means "every node no other node lists as a child".
    pub roots: Vec<u32>,
    pub nodes: Vec<SceneNode>,
    /// Created by the reader because the file declared no scenes. Never written.
    pub synthesized: bool,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a node and return its index.
    pub fn push_node(&mut self, node: SceneNode) -> u32 {
        self.nodes.push(node);
        (self.nodes.len() - 1) as u32
    }

    /// Roots used for traversal: explicit roots, or inferred ones when none are declared.
    pub fn effective_roots(&self) -> Vec<u32> {
        if !self.roots.is_empty() {
            return self.roots.clone();
        }
        parentless(self.nodes.len(), self.nodes.iter().map(|n| n.children.as_slice()))
    }

    /// Object-library scene with one root node per model.
    pub fn library(model_names: &[&str]) -> Self {
        let nodes: Vec<SceneNode> = model_names
            .iter()
            .enumerate()
            .map(|(i, name)| SceneNode::new(*name).with_model(i as u32))
            .collect();
        Self {
            name: "default".to_string(),
            is_default: true,
            roots: (0..nodes.len() as u32).collect(),
            nodes,
            synthesized: true,
        }
    }
}

/// Skeleton joint. Children are indices into the owning skeleton's joint list.
#[derive(Clone, Debug, PartialEq)]
pub struct Joint {
    pub name: String,
    pub inverse_bind: Mat4,
    pub transform: Mat4,
    pub children: Vec<u32>,
}

impl Joint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inverse_bind: Mat4::IDENTITY,
            transform: Mat4::IDENTITY,
            children: Vec::new(),
        }
    }

    pub fn with_inverse_bind(mut self, m: Mat4) -> Self {
        self.inverse_bind = m;
        self
    }

    pub fn with_transform(mut self, m: Mat4) -> Self {
        self.transform = m;
        self
    }

    pub fn with_children(mut self, children: Vec<u32>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skeleton {
    pub name: String,
    pub joints: Vec<Joint>,
}

impl Skeleton {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            joints: Vec::new(),
        }
    }

    pub fn push_joint(&mut self, joint: Joint) -> u32 {
        self.joints.push(joint);
        (self.joints.len() - 1) as u32
    }

    /// Joints no other joint lists as a child.
    pub fn roots(&self) -> Vec<u32> {
        parentless(self.joints.len(), self.joints.iter().map(|j| j.children.as_slice()))
    }
}

fn parentless<'a>(count: usize, children: impl Iterator<Item = &'a [u32]>) -> Vec<u32> {
    let mut has_parent = vec![false; count];
    for list in children {
        for &c in list {
            if let Some(flag) = has_parent.get_mut(c as usize) {
                *flag = true;
            }
        }
    }
    (0..count as u32).filter(|&i| !has_parent[i as usize]).collect()
}
