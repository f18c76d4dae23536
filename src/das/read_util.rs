//! Conversion of a closed scope frame into a typed entity.

use byteorder::{ByteOrder, LittleEndian};

use super::format::{keys::*, FieldKind, ScopeKind};
use crate::graph::*;
use crate::util::{
    mat4_from_le, quat_from_le, read_f32s, vec3_from_le, Error, Location, Mat4, Result,
};

/// Payload of one parsed field.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FieldValue {
    Text(String),
    Bytes(Vec<u8>),
}

/// Open scope: fields read so far plus already closed nested scopes.
#[derive(Debug)]
pub(crate) struct ScopeFrame {
    pub kind: ScopeKind,
    pub fields: Vec<(&'static str, FieldValue)>,
    pub children: Vec<Entity>,
}

impl ScopeFrame {
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| *k == key)
    }

    pub fn push(&mut self, key: &'static str, value: FieldValue) {
        self.fields.push((key, value));
    }

    fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    fn bytes(&self, key: &str) -> Option<&[u8]> {
        match self.get(key)? {
            FieldValue::Bytes(b) => Some(b),
            FieldValue::Text(_) => None,
        }
    }

    fn text(&self, key: &str) -> String {
        match self.get(key) {
            Some(FieldValue::Text(s)) => s.clone(),
            _ => String::new(),
        }
    }

    fn u8(&self, key: &str) -> Option<u8> {
        self.bytes(key).and_then(|b| b.first().copied())
    }

    fn u32(&self, key: &str) -> Option<u32> {
        self.bytes(key).map(LittleEndian::read_u32)
    }

    fn u64(&self, key: &str) -> Option<u64> {
        self.bytes(key).map(LittleEndian::read_u64)
    }

    fn f32(&self, key: &str) -> Option<f32> {
        self.bytes(key).map(LittleEndian::read_f32)
    }

    fn mat4(&self, key: &str) -> Mat4 {
        self.bytes(key).map(mat4_from_le).unwrap_or(Mat4::IDENTITY)
    }

    /// Element count declared by an integer count field.
    pub fn count(&self, key: &str) -> Option<u64> {
        match self.kind.field(key.as_bytes())?.kind {
            FieldKind::Fixed(8) => self.u64(key),
            _ => self.u32(key).map(u64::from),
        }
    }
}

fn missing(field: &'static str, at: &Location) -> Error {
    Error::MissingField {
        field,
        at: Location {
            field: Some(field.to_string()),
            ..at.clone()
        },
    }
}

fn required_u32(frame: &ScopeFrame, key: &'static str, at: &Location) -> Result<u32> {
    frame.u32(key).ok_or_else(|| missing(key, at))
}

/// List payload present, or empty when its count is absent or zero.
fn list<'a>(
    frame: &'a ScopeFrame,
    list_key: &'static str,
    count_key: &'static str,
    at: &Location,
) -> Result<Option<&'a [u8]>> {
    match frame.bytes(list_key) {
        Some(bytes) => Ok(Some(bytes)),
        None if frame.count(count_key).unwrap_or(0) > 0 => Err(missing(list_key, at)),
        None => Ok(None),
    }
}

fn u32_list(
    frame: &ScopeFrame,
    list_key: &'static str,
    count_key: &'static str,
    at: &Location,
) -> Result<Vec<u32>> {
    let Some(bytes) = list(frame, list_key, count_key, at)? else {
        return Ok(Vec::new());
    };
    let mut out = vec![0u32; bytes.len() / 4];
    LittleEndian::read_u32_into(&bytes[..out.len() * 4], &mut out);
    Ok(out)
}

fn f32_list(
    frame: &ScopeFrame,
    list_key: &'static str,
    count_key: &'static str,
    at: &Location,
) -> Result<Vec<f32>> {
    let Some(bytes) = list(frame, list_key, count_key, at)? else {
        return Ok(Vec::new());
    };
    let mut out = vec![0.0f32; bytes.len() / 4];
    read_f32s(bytes, &mut out);
    Ok(out)
}

/// Optional attribute: present when its buffer id is. Offset defaults to 0.
fn attribute(frame: &ScopeFrame, id_key: &str, offset_key: &str) -> Option<AttributeRef> {
    let buffer = frame.u32(id_key)?;
    Some(AttributeRef::new(buffer, frame.u32(offset_key).unwrap_or(0)))
}

/// Build the entity for a closed scope.
pub(crate) fn into_entity(frame: ScopeFrame, at: &Location) -> Result<Entity> {
    let entity = match frame.kind {
        ScopeKind::Properties => Entity::Properties(Properties {
            model: frame.text(MODEL),
            author: frame.text(AUTHOR),
            copyright: frame.text(COPYRIGHT),
            moddate: frame.u64(MODDATE).unwrap_or(0),
            compression: frame.u8(COMPRESSION).unwrap_or(0) != 0,
        }),

        ScopeKind::Buffer => {
            let declared = frame.u64(DATALEN).ok_or_else(|| missing(DATALEN, at))?;
            let kind = BufferType::from_bits_retain(frame.u32(TYPE).unwrap_or(0));
            let mut frame = frame;
            let idx = frame
                .fields
                .iter()
                .position(|(k, _)| *k == DATA)
                .ok_or_else(|| missing(DATA, at))?;
            let data = match frame.fields.swap_remove(idx).1 {
                FieldValue::Bytes(b) => b,
                FieldValue::Text(_) => return Err(missing(DATA, at)),
            };
            debug_assert_eq!(data.len() as u64, declared);
            Entity::Buffer(Buffer::new(kind, data))
        }

        ScopeKind::Primitive => {
            let indices = AttributeRef::new(
                required_u32(&frame, INDEX_BUFFER_ID, at)?,
                required_u32(&frame, INDEX_BUFFER_OFFSET, at)?,
            );
            let index_count = required_u32(&frame, INDICES_COUNT, at)?;
            let vertices = AttributeRef::new(
                required_u32(&frame, VERTEX_BUFFER_ID, at)?,
                required_u32(&frame, VERTEX_BUFFER_OFFSET, at)?,
            );
            Entity::Primitive(MeshPrimitive {
                indices,
                index_count,
                vertices,
                normals: attribute(&frame, NORMAL_BUFFER_ID, NORMAL_BUFFER_OFFSET),
                uvs: attribute(&frame, UV_BUFFER_ID, UV_BUFFER_OFFSET),
                texture: frame.u32(TEXTURE_ID),
                morph_targets: u32_list(&frame, MORPH_TARGETS, MORPH_TARGET_COUNT, at)?,
            })
        }

        ScopeKind::MorphTarget => Entity::MorphTarget(MorphTarget {
            vertices: AttributeRef::new(
                required_u32(&frame, VERTEX_BUFFER_ID, at)?,
                frame.u32(VERTEX_BUFFER_OFFSET).unwrap_or(0),
            ),
            normals: attribute(&frame, NORMAL_BUFFER_ID, NORMAL_BUFFER_OFFSET),
            uvs: attribute(&frame, UV_BUFFER_ID, UV_BUFFER_OFFSET),
        }),

        ScopeKind::Model => Entity::Model(Model {
            name: frame.text(NAME),
            primitives: u32_list(&frame, PRIMITIVES, PRIMITIVE_COUNT, at)?,
            transform: frame.mat4(TRANSFORM),
        }),

        ScopeKind::Animation => {
            let interpolation = match frame.u32(INTERPOLATION) {
                None => Interpolation::default(),
                Some(code) => Interpolation::from_u32(code).ok_or_else(|| Error::InvalidValue {
                    msg: format!("unknown interpolation mode {}", code),
                    at: Location {
                        field: Some(INTERPOLATION.to_string()),
                        ..at.clone()
                    },
                })?,
            };
            let name = frame.text(NAME);
            let model = frame.u32(MODEL);
            let keyframes = frame
                .children
                .into_iter()
                .filter_map(|e| match e {
                    Entity::Keyframe(k) => Some(k),
                    _ => None,
                })
                .collect();
            Entity::Animation(Animation {
                name,
                model,
                interpolation,
                keyframes,
            })
        }

        ScopeKind::Keyframe => Entity::Keyframe(Keyframe {
            timestamp: frame.f32(TIMESTAMP).ok_or_else(|| missing(TIMESTAMP, at))?,
            translation: frame.bytes(TRANSLATION).map(vec3_from_le),
            rotation: frame.bytes(ROTATION).map(quat_from_le),
            scale: frame.bytes(SCALE).map(vec3_from_le),
            weights: f32_list(&frame, WEIGHTS, WEIGHT_COUNT, at)?,
        }),

        ScopeKind::Skeleton => {
            let name = frame.text(NAME);
            let joints = frame
                .children
                .into_iter()
                .filter_map(|e| match e {
                    Entity::Joint(j) => Some(j),
                    _ => None,
                })
                .collect();
            Entity::Skeleton(Skeleton { name, joints })
        }

        ScopeKind::Joint => Entity::Joint(Joint {
            name: frame.text(NAME),
            inverse_bind: frame.mat4(INVERSE_BIND),
            transform: frame.mat4(TRANSFORM),
            children: u32_list(&frame, CHILDREN, CHILDREN_COUNT, at)?,
        }),

        ScopeKind::Scene => {
            let name = frame.text(NAME);
            let is_default = frame.u8(DEFAULT).unwrap_or(0) != 0;
            let roots = u32_list(&frame, ROOTS, ROOT_COUNT, at)?;
            let nodes = frame
                .children
                .into_iter()
                .filter_map(|e| match e {
                    Entity::Node(n) => Some(n),
                    _ => None,
                })
                .collect();
            Entity::Scene(Scene {
                name,
                is_default,
                roots,
                nodes,
                synthesized: false,
            })
        }

        ScopeKind::Node => Entity::Node(SceneNode {
            name: frame.text(NAME),
            model: frame.u32(MODEL),
            skeleton: frame.u32(SKELETON),
            transform: frame.mat4(TRANSFORM),
            children: u32_list(&frame, CHILDREN, CHILDREN_COUNT, at)?,
        }),
    };
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: ScopeKind, fields: Vec<(&'static str, Vec<u8>)>) -> ScopeFrame {
        let mut f = ScopeFrame::new(kind);
        for (k, v) in fields {
            f.push(k, FieldValue::Bytes(v));
        }
        f
    }

    fn le(v: u32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    #[test]
    fn test_properties_defaults() {
        let at = Location::default();
        let Entity::Properties(p) = into_entity(ScopeFrame::new(ScopeKind::Properties), &at).unwrap() else {
            panic!("expected properties");
        };
        assert_eq!(p, Properties::default());
    }

    #[test]
    fn test_primitive_requires_index_fields() {
        let f = frame(
            ScopeKind::Primitive,
            vec![(VERTEX_BUFFER_ID, le(0)), (VERTEX_BUFFER_OFFSET, le(0))],
        );
        let err = into_entity(f, &Location::default()).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: INDEX_BUFFER_ID, .. }));
    }

    #[test]
    fn test_count_without_list_is_missing() {
        let f = frame(ScopeKind::Model, vec![(PRIMITIVE_COUNT, le(2))]);
        let err = into_entity(f, &Location::default()).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: PRIMITIVES, .. }));

        let f = frame(ScopeKind::Model, vec![(PRIMITIVE_COUNT, le(0))]);
        let Entity::Model(m) = into_entity(f, &Location::default()).unwrap() else {
            panic!("expected model");
        };
        assert!(m.primitives.is_empty());
        assert_eq!(m.transform, Mat4::IDENTITY);
    }

    #[test]
    fn test_optional_attributes() {
        let f = frame(
            ScopeKind::MorphTarget,
            vec![(VERTEX_BUFFER_ID, le(1)), (UV_BUFFER_ID, le(2))],
        );
        let Entity::MorphTarget(t) = into_entity(f, &Location::default()).unwrap() else {
            panic!("expected morph target");
        };
        assert_eq!(t.vertices, AttributeRef::new(1, 0));
        assert_eq!(t.uvs, Some(AttributeRef::new(2, 0)));
        assert_eq!(t.normals, None);
    }

    #[test]
    fn test_bad_interpolation() {
        let f = frame(ScopeKind::Animation, vec![(INTERPOLATION, le(9))]);
        assert!(matches!(
            into_entity(f, &Location::default()),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_scene_collects_nodes() {
        let mut f = frame(ScopeKind::Scene, vec![(DEFAULT, vec![1])]);
        f.children.push(Entity::Node(SceneNode::new("a")));
        f.children.push(Entity::Node(SceneNode::new("b").with_model(0)));
        let Entity::Scene(s) = into_entity(f, &Location::default()).unwrap() else {
            panic!("expected scene");
        };
        assert!(s.is_default);
        assert_eq!(s.nodes.len(), 2);
        assert_eq!(s.nodes[1].model, Some(0));
    }
}
