//! In-memory entity graph.
//!
//! Every entity lives in a flat sequence owned by [`EntityGraph`]. Entities
//! refer to each other by `u32` index into a sibling sequence, exactly as the
//! file addresses them, so the graph has no internal borrows and can be
//! written back without any fix-up.

mod animation;
mod buffer;
mod mesh;
mod properties;
mod scene;

pub use animation::*;
pub use buffer::*;
pub use mesh::*;
pub use properties::*;
pub use scene::*;

use crate::util::{Error, Result};

/// One fully parsed scope.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Properties(Properties),
    Buffer(Buffer),
    Primitive(MeshPrimitive),
    MorphTarget(MorphTarget),
    Model(Model),
    Animation(Animation),
    Keyframe(Keyframe),
    Skeleton(Skeleton),
    Joint(Joint),
    Scene(Scene),
    Node(SceneNode),
}

/// Owner of all entities of one file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityGraph {
    pub properties: Properties,
    pub buffers: Vec<Buffer>,
    pub primitives: Vec<MeshPrimitive>,
    pub morph_targets: Vec<MorphTarget>,
    pub models: Vec<Model>,
    pub animations: Vec<Animation>,
    pub skeletons: Vec<Skeleton>,
    pub scenes: Vec<Scene>,
}

fn get<'a, T>(items: &'a [T], index: usize, kind: &'static str) -> Result<&'a T> {
    items.get(index).ok_or(Error::IndexOutOfRange {
        kind,
        index,
        count: items.len(),
    })
}

fn push<T>(items: &mut Vec<T>, item: T) -> u32 {
    items.push(item);
    (items.len() - 1) as u32
}

impl EntityGraph {
    pub fn new(properties: Properties) -> Self {
        Self {
            properties,
            ..Self::default()
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn buffer(&self, index: usize) -> Result<&Buffer> {
        get(&self.buffers, index, "buffer")
    }

    pub fn primitive(&self, index: usize) -> Result<&MeshPrimitive> {
        get(&self.primitives, index, "primitive")
    }

    pub fn morph_target(&self, index: usize) -> Result<&MorphTarget> {
        get(&self.morph_targets, index, "morph target")
    }

    pub fn model(&self, index: usize) -> Result<&Model> {
        get(&self.models, index, "model")
    }

    pub fn animation(&self, index: usize) -> Result<&Animation> {
        get(&self.animations, index, "animation")
    }

    pub fn skeleton(&self, index: usize) -> Result<&Skeleton> {
        get(&self.skeletons, index, "skeleton")
    }

    pub fn scene(&self, index: usize) -> Result<&Scene> {
        get(&self.scenes, index, "scene")
    }

    /// Primitives of a model, resolved through the primitive sequence.
    pub fn model_primitives(&self, index: usize) -> Result<Vec<&MeshPrimitive>> {
        self.model(index)?
            .primitives
            .iter()
            .map(|&p| self.primitive(p as usize))
            .collect()
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn add_buffer(&mut self, buffer: Buffer) -> u32 {
        push(&mut self.buffers, buffer)
    }

    pub fn add_primitive(&mut self, primitive: MeshPrimitive) -> u32 {
        push(&mut self.primitives, primitive)
    }

    pub fn add_morph_target(&mut self, target: MorphTarget) -> u32 {
        push(&mut self.morph_targets, target)
    }

    pub fn add_model(&mut self, model: Model) -> u32 {
        push(&mut self.models, model)
    }

    pub fn add_animation(&mut self, animation: Animation) -> u32 {
        push(&mut self.animations, animation)
    }

    pub fn add_skeleton(&mut self, skeleton: Skeleton) -> u32 {
        push(&mut self.skeletons, skeleton)
    }

    pub fn add_scene(&mut self, scene: Scene) -> u32 {
        push(&mut self.scenes, scene)
    }

    /// Append a top-level entity to its sequence.
    ///
    /// Keyframes, joints and nodes only exist inside their parent and are
    /// rejected here.
    pub fn insert(&mut self, entity: Entity) -> Result<()> {
        match entity {
            Entity::Properties(p) => self.properties = p,
            Entity::Buffer(b) => {
                self.add_buffer(b);
            }
            Entity::Primitive(p) => {
                self.add_primitive(p);
            }
            Entity::MorphTarget(t) => {
                self.add_morph_target(t);
            }
            Entity::Model(m) => {
                self.add_model(m);
            }
            Entity::Animation(a) => {
                self.add_animation(a);
            }
            Entity::Skeleton(s) => {
                self.add_skeleton(s);
            }
            Entity::Scene(s) => {
                self.add_scene(s);
            }
            Entity::Keyframe(_) | Entity::Joint(_) | Entity::Node(_) => {
                return Err(Error::other("nested entity inserted at top level"));
            }
        }
        Ok(())
    }

    /// Add the object-library scene covering every model. Used when a file
    /// declares no scene of its own.
    pub fn synthesize_default_scene(&mut self) -> u32 {
        let names: Vec<&str> = self.models.iter().map(|m| m.name.as_str()).collect();
        let scene = Scene::library(&names);
        self.add_scene(scene)
    }

    /// Index of the scene flagged as default, falling back to the first scene.
    pub fn default_scene(&self) -> Option<usize> {
        self.scenes
            .iter()
            .position(|s| s.is_default)
            .or(if self.scenes.is_empty() { None } else { Some(0) })
    }

    /// Total bytes held by all buffers.
    pub fn buffer_bytes(&self) -> usize {
        self.buffers.iter().map(Buffer::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_out_of_range() {
        let mut g = EntityGraph::default();
        g.add_buffer(Buffer::new(BufferType::VERTEX, vec![0; 12]));
        assert_eq!(g.buffer(0).unwrap().len(), 12);

        let err = g.buffer(1).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { kind: "buffer", index: 1, count: 1 }));
        assert!(g.model(0).is_err());
        assert!(g.animation(3).is_err());
    }

    #[test]
    fn test_insert_rejects_nested_entities() {
        let mut g = EntityGraph::default();
        assert!(g.insert(Entity::Keyframe(Keyframe::at(0.0))).is_err());
        assert!(g.insert(Entity::Model(Model::new("m"))).is_ok());
        assert_eq!(g.models.len(), 1);
    }

    #[test]
    fn test_default_scene_synthesis() {
        let mut g = EntityGraph::default();
        g.add_model(Model::new("a"));
        g.add_model(Model::new("b"));
        g.add_model(Model::new("c"));
        let idx = g.synthesize_default_scene();
        let scene = g.scene(idx as usize).unwrap();
        assert_eq!(scene.nodes.len(), 3);
        let covered: Vec<u32> = scene.nodes.iter().filter_map(|n| n.model).collect();
        assert_eq!(covered, vec![0, 1, 2]);
        assert_eq!(g.default_scene(), Some(0));
    }

    #[test]
    fn test_model_primitives() {
        let mut g = EntityGraph::default();
        let p = g.add_primitive(MeshPrimitive::new(
            AttributeRef::new(0, 0),
            3,
            AttributeRef::new(0, 0),
        ));
        g.add_model(Model::new("tri").with_primitive(p));
        let prims = g.model_primitives(0).unwrap();
        assert_eq!(prims[0].index_count, 3);

        g.add_model(Model::new("broken").with_primitive(7));
        assert!(g.model_primitives(1).is_err());
    }
}
