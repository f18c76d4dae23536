//! Mesh primitives, morph targets and models.

use crate::util::Mat4;

/// Byte size of one index in an index buffer.
pub const INDEX_SIZE: usize = 4;

/// Location of attribute data: buffer index plus byte offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AttributeRef {
    pub buffer: u32,
    pub offset: u32,
}

impl AttributeRef {
    pub const fn new(buffer: u32, offset: u32) -> Self {
        Self { buffer, offset }
    }
}

/// Which optional attributes a primitive or morph target carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttributeLayout {
    pub normals: bool,
    pub uvs: bool,
}

/// One drawable piece of a mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshPrimitive {
    /// Index buffer holding `index_count` u32 indices at the referenced offset.
    pub indices: AttributeRef,
    pub index_count: u32,
    pub vertices: AttributeRef,
    pub normals: Option<AttributeRef>,
    pub uvs: Option<AttributeRef>,
    /// Buffer holding an encoded texture image.
    pub texture: Option<u32>,
    /// Indices into the graph's morph target sequence.
    pub morph_targets: Vec<u32>,
}

impl MeshPrimitive {
    pub fn new(indices: AttributeRef, index_count: u32, vertices: AttributeRef) -> Self {
        Self {
            indices,
            index_count,
            vertices,
            normals: None,
            uvs: None,
            texture: None,
            morph_targets: Vec::new(),
        }
    }

    pub fn with_normals(mut self, normals: AttributeRef) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_uvs(mut self, uvs: AttributeRef) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn with_texture(mut self, buffer: u32) -> Self {
        self.texture = Some(buffer);
        self
    }

    pub fn with_morph_targets(mut self, targets: Vec<u32>) -> Self {
        self.morph_targets = targets;
        self
    }

    pub fn layout(&self) -> AttributeLayout {
        AttributeLayout {
            normals: self.normals.is_some(),
            uvs: self.uvs.is_some(),
        }
    }
}

/// Alternate attribute set a primitive can blend towards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MorphTarget {
    pub vertices: AttributeRef,
    pub normals: Option<AttributeRef>,
    pub uvs: Option<AttributeRef>,
}

impl MorphTarget {
    pub fn new(vertices: AttributeRef) -> Self {
        Self {
            vertices,
            ..Self::default()
        }
    }

    pub fn layout(&self) -> AttributeLayout {
        AttributeLayout {
            normals: self.normals.is_some(),
            uvs: self.uvs.is_some(),
        }
    }
}

/// Named group of primitives with a transform.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub name: String,
    /// Indices into the graph's primitive sequence.
    pub primitives: Vec<u32>,
    pub transform: Mat4,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primitives: Vec::new(),
            transform: Mat4::IDENTITY,
        }
    }

    pub fn with_primitive(mut self, primitive: u32) -> Self {
        self.primitives.push(primitive);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new("")
    }
}
