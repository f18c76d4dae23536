//! Reference and structure validation of an [`EntityGraph`].
//!
//! The reader only enforces the scope grammar. Everything that depends on
//! cross-entity indices is checked here and reported as a list of
//! [`Issue`]s rather than as a failed parse.

use std::fmt;

use thiserror::Error;

use crate::graph::{AttributeRef, BufferType, EntityGraph, INDEX_SIZE};

/// How serious a finding is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// Entity that references buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    Primitive(usize),
    MorphTarget(usize),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(i) => write!(f, "primitive {}", i),
            Self::MorphTarget(i) => write!(f, "morph target {}", i),
        }
    }
}

/// One validation finding.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum Issue {
    // ---- errors ----
    #[error("{owner}: {attribute} buffer {buffer} does not exist")]
    MissingBuffer {
        owner: Owner,
        attribute: &'static str,
        buffer: u32,
    },

    #[error("{owner}: {attribute} offset {offset} is outside buffer {buffer} ({len} bytes)")]
    OffsetOutOfRange {
        owner: Owner,
        attribute: &'static str,
        buffer: u32,
        offset: u32,
        len: usize,
    },

    #[error("primitive {primitive}: {count} indices at offset {offset} overrun buffer {buffer} ({len} bytes)")]
    IndexRangeOverflow {
        primitive: usize,
        buffer: u32,
        offset: u32,
        count: u32,
        len: usize,
    },

    #[error("model {model}: primitive {primitive} does not exist")]
    MissingPrimitive { model: usize, primitive: u32 },

    #[error("scene {scene}: root {root} does not exist")]
    MissingRoot { scene: usize, root: u32 },

    #[error("scene {scene}: node {node} lists missing child {child}")]
    MissingChild { scene: usize, node: usize, child: u32 },

    #[error("scene {scene}: node {node} references missing model {model}")]
    MissingModel { scene: usize, node: usize, model: u32 },

    #[error("scene {scene}: node {node} references missing skeleton {skeleton}")]
    MissingSkeleton {
        scene: usize,
        node: usize,
        skeleton: u32,
    },

    #[error("scene {scene}: node {node} is its own ancestor")]
    RecursiveNode { scene: usize, node: usize },

    #[error("skeleton {skeleton}: joint {joint} lists missing child {child}")]
    MissingJoint {
        skeleton: usize,
        joint: usize,
        child: u32,
    },

    #[error("skeleton {skeleton}: joint {joint} is its own ancestor")]
    RecursiveJoint { skeleton: usize, joint: usize },

    #[error("primitive {primitive}: morph target {target} does not exist")]
    MissingMorphTarget { primitive: usize, target: u32 },

    #[error("primitive {primitive}: morph target {target} carries different attributes")]
    MorphLayoutMismatch { primitive: usize, target: u32 },

    #[error("animation {animation}: model {model} does not exist")]
    MissingAnimatedModel { animation: usize, model: u32 },

    #[error("animation {animation}: keyframe {keyframe} at {timestamp}s is earlier than its predecessor")]
    KeyframeOrder {
        animation: usize,
        keyframe: usize,
        timestamp: f32,
    },

    // ---- warnings ----
    #[error("{count} scenes are flagged as default")]
    MultipleDefaultScenes { count: usize },

    #[error("buffer {buffer} is not referenced")]
    UnusedBuffer { buffer: usize },

    #[error("scene {scene}: node {node} is unreachable from any root")]
    UnreachableNode { scene: usize, node: usize },

    #[error("{owner}: buffer {buffer} used as {attribute} is typed {kind:?}")]
    BufferTypeMismatch {
        owner: Owner,
        attribute: &'static str,
        buffer: u32,
        kind: BufferType,
    },
}

impl Issue {
    pub fn severity(&self) -> Severity {
        match self {
            Self::MultipleDefaultScenes { .. }
            | Self::UnusedBuffer { .. }
            | Self::UnreachableNode { .. }
            | Self::BufferTypeMismatch { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }
}

/// All findings of one validation run, in check order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| !i.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(Issue::is_error)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "{}: {}", issue.severity(), issue)?;
        }
        Ok(())
    }
}

impl EntityGraph {
    /// Run every validation check.
    pub fn validate(&self) -> ValidationReport {
        validate(self)
    }
}

/// Run every validation check against a graph.
pub fn validate(graph: &EntityGraph) -> ValidationReport {
    let mut v = Validator {
        graph,
        used: vec![false; graph.buffers.len()],
        issues: Vec::new(),
    };
    v.check_primitive_buffers();
    v.check_models();
    v.check_scenes();
    v.check_skeletons();
    v.check_morph_targets();
    v.check_animations();
    v.report_unused_buffers();
    ValidationReport { issues: v.issues }
}

// ============================================================================
// Hierarchy traversal
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Depth-first walk over an index hierarchy.
struct Traversal {
    marks: Vec<Mark>,
    /// Nodes reached again while still on the current path.
    recursive: Vec<usize>,
}

impl Traversal {
    fn new(count: usize) -> Self {
        Self {
            marks: vec![Mark::Unvisited; count],
            recursive: Vec::new(),
        }
    }

    fn visited(&self, node: usize) -> bool {
        self.marks[node] != Mark::Unvisited
    }

    /// Walk everything reachable from `start`. Out-of-range children are skipped.
    fn walk<'a>(&mut self, start: usize, children: impl Fn(usize) -> &'a [u32]) {
        if start >= self.marks.len() || self.visited(start) {
            return;
        }
        self.marks[start] = Mark::OnPath;
        let mut stack = vec![(start, 0usize)];
        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            let kids = children(node);
            if next == kids.len() {
                self.marks[node] = Mark::Done;
                stack.pop();
                continue;
            }
            top.1 += 1;
            let child = kids[next] as usize;
            match self.marks.get(child) {
                Some(Mark::Unvisited) => {
                    self.marks[child] = Mark::OnPath;
                    stack.push((child, 0));
                }
                Some(Mark::OnPath) => self.recursive.push(child),
                Some(Mark::Done) | None => {}
            }
        }
    }

    fn into_recursive(mut self) -> Vec<usize> {
        self.recursive.sort_unstable();
        self.recursive.dedup();
        self.recursive
    }
}

// ============================================================================
// Checks
// ============================================================================

struct Validator<'g> {
    graph: &'g EntityGraph,
    used: Vec<bool>,
    issues: Vec<Issue>,
}

impl<'g> Validator<'g> {
    /// Check that an attribute's buffer exists and its offset is inside it.
    /// Returns the buffer length when both hold.
    fn check_attribute(
        &mut self,
        owner: Owner,
        attribute: &'static str,
        attr: AttributeRef,
        expected: BufferType,
    ) -> Option<usize> {
        let graph = self.graph;
        let Some(buffer) = graph.buffers.get(attr.buffer as usize) else {
            self.issues.push(Issue::MissingBuffer {
                owner,
                attribute,
                buffer: attr.buffer,
            });
            return None;
        };
        self.used[attr.buffer as usize] = true;
        self.check_kind(owner, attribute, attr.buffer, buffer.kind, expected);

        if attr.offset as usize >= buffer.len() {
            self.issues.push(Issue::OffsetOutOfRange {
                owner,
                attribute,
                buffer: attr.buffer,
                offset: attr.offset,
                len: buffer.len(),
            });
            return None;
        }
        Some(buffer.len())
    }

    fn check_kind(
        &mut self,
        owner: Owner,
        attribute: &'static str,
        buffer: u32,
        kind: BufferType,
        expected: BufferType,
    ) {
        // Untyped buffers are accepted for any use.
        if !kind.is_empty() && !kind.intersects(expected) {
            self.issues.push(Issue::BufferTypeMismatch {
                owner,
                attribute,
                buffer,
                kind,
            });
        }
    }

    fn check_primitive_buffers(&mut self) {
        let graph = self.graph;
        for (i, prim) in graph.primitives.iter().enumerate() {
            let owner = Owner::Primitive(i);
            if let Some(len) = self.check_attribute(owner, "index", prim.indices, BufferType::INDICES) {
                let end = prim.indices.offset as u64 + prim.index_count as u64 * INDEX_SIZE as u64;
                if end > len as u64 {
                    self.issues.push(Issue::IndexRangeOverflow {
                        primitive: i,
                        buffer: prim.indices.buffer,
                        offset: prim.indices.offset,
                        count: prim.index_count,
                        len,
                    });
                }
            }
            self.check_attribute(owner, "vertex", prim.vertices, BufferType::VERTEX);
            if let Some(n) = prim.normals {
                self.check_attribute(owner, "normal", n, BufferType::VERTEX_NORMAL);
            }
            if let Some(uv) = prim.uvs {
                self.check_attribute(owner, "uv", uv, BufferType::TEXTURE_MAP);
            }
            if let Some(tex) = prim.texture {
                match graph.buffers.get(tex as usize) {
                    Some(buffer) => {
                        self.used[tex as usize] = true;
                        self.check_kind(owner, "texture", tex, buffer.kind, BufferType::TEXTURE);
                    }
                    None => self.issues.push(Issue::MissingBuffer {
                        owner,
                        attribute: "texture",
                        buffer: tex,
                    }),
                }
            }
        }
    }

    fn check_models(&mut self) {
        let graph = self.graph;
        let count = graph.primitives.len();
        for (m, model) in graph.models.iter().enumerate() {
            for &p in &model.primitives {
                if p as usize >= count {
                    self.issues.push(Issue::MissingPrimitive {
                        model: m,
                        primitive: p,
                    });
                }
            }
        }
    }

    fn check_scenes(&mut self) {
        let graph = self.graph;
        let defaults = graph.scenes.iter().filter(|s| s.is_default).count();
        if defaults > 1 {
            self.issues.push(Issue::MultipleDefaultScenes { count: defaults });
        }

        for (s, scene) in graph.scenes.iter().enumerate() {
            let count = scene.nodes.len();
            let roots = scene.effective_roots();
            for &root in &roots {
                if root as usize >= count {
                    self.issues.push(Issue::MissingRoot { scene: s, root });
                }
            }
            for (n, node) in scene.nodes.iter().enumerate() {
                for &child in &node.children {
                    if child as usize >= count {
                        self.issues.push(Issue::MissingChild { scene: s, node: n, child });
                    }
                }
                if let Some(model) = node.model {
                    if model as usize >= graph.models.len() {
                        self.issues.push(Issue::MissingModel { scene: s, node: n, model });
                    }
                }
                if let Some(skeleton) = node.skeleton {
                    if skeleton as usize >= graph.skeletons.len() {
                        self.issues.push(Issue::MissingSkeleton {
                            scene: s,
                            node: n,
                            skeleton,
                        });
                    }
                }
            }

            let children = move |i: usize| scene.nodes[i].children.as_slice();
            let mut walk = Traversal::new(count);
            for &root in &roots {
                walk.walk(root as usize, children);
            }
            let unreachable: Vec<usize> = (0..count).filter(|&n| !walk.visited(n)).collect();
            for &node in &unreachable {
                self.issues.push(Issue::UnreachableNode { scene: s, node });
            }
            // Unreachable nodes may still hide a cycle.
            for node in unreachable {
                walk.walk(node, children);
            }
            for node in walk.into_recursive() {
                self.issues.push(Issue::RecursiveNode { scene: s, node });
            }
        }
    }

    fn check_skeletons(&mut self) {
        let graph = self.graph;
        for (s, skeleton) in graph.skeletons.iter().enumerate() {
            let count = skeleton.joints.len();
            for (j, joint) in skeleton.joints.iter().enumerate() {
                for &child in &joint.children {
                    if child as usize >= count {
                        self.issues.push(Issue::MissingJoint {
                            skeleton: s,
                            joint: j,
                            child,
                        });
                    }
                }
            }

            let children = move |i: usize| skeleton.joints[i].children.as_slice();
            let mut walk = Traversal::new(count);
            for root in skeleton.roots() {
                walk.walk(root as usize, children);
            }
            // Joints left over sit on a cycle or hang below one.
            for j in 0..count {
                walk.walk(j, children);
            }
            for joint in walk.into_recursive() {
                self.issues.push(Issue::RecursiveJoint { skeleton: s, joint });
            }
        }
    }

    fn check_morph_targets(&mut self) {
        let graph = self.graph;
        for (p, prim) in graph.primitives.iter().enumerate() {
            let layout = prim.layout();
            for &t in &prim.morph_targets {
                match graph.morph_targets.get(t as usize) {
                    None => self.issues.push(Issue::MissingMorphTarget { primitive: p, target: t }),
                    Some(target) if target.layout() != layout => {
                        self.issues.push(Issue::MorphLayoutMismatch { primitive: p, target: t })
                    }
                    Some(_) => {}
                }
            }
        }

        for (t, target) in graph.morph_targets.iter().enumerate() {
            let owner = Owner::MorphTarget(t);
            self.check_attribute(owner, "vertex", target.vertices, BufferType::VERTEX);
            if let Some(n) = target.normals {
                self.check_attribute(owner, "normal", n, BufferType::VERTEX_NORMAL);
            }
            if let Some(uv) = target.uvs {
                self.check_attribute(owner, "uv", uv, BufferType::TEXTURE_MAP);
            }
        }
    }

    fn check_animations(&mut self) {
        let graph = self.graph;
        let models = graph.models.len();
        for (a, anim) in graph.animations.iter().enumerate() {
            if let Some(model) = anim.model {
                if model as usize >= models {
                    self.issues.push(Issue::MissingAnimatedModel { animation: a, model });
                }
            }
            for (k, pair) in anim.keyframes.windows(2).enumerate() {
                if pair[1].timestamp < pair[0].timestamp {
                    self.issues.push(Issue::KeyframeOrder {
                        animation: a,
                        keyframe: k + 1,
                        timestamp: pair[1].timestamp,
                    });
                }
            }
        }
    }

    fn report_unused_buffers(&mut self) {
        for (buffer, used) in self.used.iter().enumerate() {
            if !used {
                self.issues.push(Issue::UnusedBuffer { buffer });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::*;

    /// One triangle: 12-byte index buffer, 36-byte vertex buffer, one model.
    fn triangle() -> EntityGraph {
        let mut g = EntityGraph::default();
        let ib = g.add_buffer(Buffer::new(BufferType::INDICES, vec![0; 12]));
        let vb = g.add_buffer(Buffer::new(BufferType::VERTEX, vec![0; 36]));
        let p = g.add_primitive(MeshPrimitive::new(
            AttributeRef::new(ib, 0),
            3,
            AttributeRef::new(vb, 0),
        ));
        g.add_model(Model::new("tri").with_primitive(p));
        g.synthesize_default_scene();
        g
    }

    #[test]
    fn test_clean_graph() {
        let report = triangle().validate();
        assert!(report.is_clean(), "{}", report);
    }

    #[test]
    fn test_offset_at_length_is_error() {
        let mut g = triangle();
        g.primitives[0].vertices.offset = 36;
        let report = g.validate();
        assert!(report.has_errors());
        assert!(matches!(
            report.errors().next(),
            Some(Issue::OffsetOutOfRange { attribute: "vertex", offset: 36, len: 36, .. })
        ));
    }

    #[test]
    fn test_index_range_overflow() {
        let mut g = triangle();
        g.primitives[0].index_count = 4;
        let report = g.validate();
        assert!(matches!(
            report.issues.as_slice(),
            [Issue::IndexRangeOverflow { count: 4, len: 12, .. }]
        ));
    }

    #[test]
    fn test_missing_references() {
        let mut g = triangle();
        g.primitives[0].normals = Some(AttributeRef::new(9, 0));
        g.models[0].primitives.push(5);
        g.animations.push(Animation::new("a").with_model(3));
        let report = g.validate();
        let errors: Vec<&Issue> = report.errors().collect();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], Issue::MissingBuffer { buffer: 9, .. }));
        assert!(matches!(errors[1], Issue::MissingPrimitive { primitive: 5, .. }));
        assert!(matches!(errors[2], Issue::MissingAnimatedModel { model: 3, .. }));
    }

    #[test]
    fn test_self_cycle() {
        let mut g = triangle();
        let mut scene = Scene::new("s");
        scene.push_node(SceneNode::new("loop").with_children(vec![0]));
        scene.roots = vec![0];
        g.scenes = vec![scene];
        let report = g.validate();
        assert_eq!(
            report.issues,
            vec![Issue::RecursiveNode { scene: 0, node: 0 }]
        );
    }

    #[test]
    fn test_transitive_cycle_without_roots() {
        let mut g = triangle();
        let mut scene = Scene::new("s");
        scene.push_node(SceneNode::new("a").with_children(vec![1]));
        scene.push_node(SceneNode::new("b").with_children(vec![2]));
        scene.push_node(SceneNode::new("c").with_children(vec![0]));
        g.scenes = vec![scene];
        let report = g.validate();
        // No parentless node: everything is unreachable and one node closes the loop.
        assert_eq!(report.warnings().count(), 3);
        assert_eq!(report.errors().count(), 1);
        assert!(matches!(report.errors().next(), Some(Issue::RecursiveNode { .. })));
    }

    #[test]
    fn test_deep_chain_and_shared_child() {
        let mut g = triangle();
        let mut scene = Scene::new("chain");
        let depth = 10_000;
        for i in 0..depth {
            let children = if i + 1 < depth { vec![i as u32 + 1] } else { Vec::new() };
            scene.push_node(SceneNode::new(format!("n{}", i)).with_children(children));
        }
        // A second root sharing the tail is a DAG, not a cycle.
        scene.push_node(SceneNode::new("other").with_children(vec![depth as u32 - 1]));
        g.scenes = vec![scene];
        let report = g.validate();
        assert!(report.is_clean(), "{}", report);
    }

    #[test]
    fn test_skeleton_cycle() {
        let mut g = triangle();
        let mut skel = Skeleton::new("rig");
        skel.push_joint(Joint::new("root").with_children(vec![1]));
        skel.push_joint(Joint::new("a").with_children(vec![2, 7]));
        skel.push_joint(Joint::new("b").with_children(vec![1]));
        g.skeletons.push(skel);
        let report = g.validate();
        assert_eq!(
            report.issues,
            vec![
                Issue::MissingJoint { skeleton: 0, joint: 1, child: 7 },
                Issue::RecursiveJoint { skeleton: 0, joint: 1 },
            ]
        );
    }

    #[test]
    fn test_morph_layout_mismatch() {
        let mut g = triangle();
        g.buffers.push(Buffer::new(BufferType::VERTEX_NORMAL, vec![0; 36]));
        let t = g.add_morph_target(MorphTarget {
            vertices: AttributeRef::new(1, 0),
            normals: Some(AttributeRef::new(2, 0)),
            uvs: None,
        });
        g.primitives[0].morph_targets = vec![t, 4];
        let report = g.validate();
        assert_eq!(
            report.issues,
            vec![
                Issue::MorphLayoutMismatch { primitive: 0, target: 0 },
                Issue::MissingMorphTarget { primitive: 0, target: 4 },
            ]
        );
    }

    #[test]
    fn test_warnings() {
        let mut g = triangle();
        g.buffers[1].kind = BufferType::TEXTURE_PNG;
        g.add_buffer(Buffer::new(BufferType::VERTEX, vec![1]));
        let mut second = Scene::new("also default");
        second.is_default = true;
        g.scenes.push(second);
        let report = g.validate();
        assert!(!report.has_errors());
        assert_eq!(
            report.issues,
            vec![
                Issue::BufferTypeMismatch {
                    owner: Owner::Primitive(0),
                    attribute: "vertex",
                    buffer: 1,
                    kind: BufferType::TEXTURE_PNG,
                },
                Issue::MultipleDefaultScenes { count: 2 },
                Issue::UnusedBuffer { buffer: 2 },
            ]
        );
    }

    #[test]
    fn test_keyframe_order() {
        let mut g = triangle();
        let mut anim = Animation::new("bounce").with_model(0);
        anim.push_keyframe(Keyframe::at(0.0));
        anim.push_keyframe(Keyframe::at(1.0));
        anim.push_keyframe(Keyframe::at(0.5));
        g.animations.push(anim);
        let report = g.validate();
        assert_eq!(
            report.issues,
            vec![Issue::KeyframeOrder { animation: 0, keyframe: 2, timestamp: 0.5 }]
        );
    }
}
