//! DAS writer.
//!
//! [`ScopeWriter`] emits the signature as a placeholder, then one scope per
//! call, and flips the finalized flag in place when [`ScopeWriter::finish`]
//! runs. A file whose writer never finished is rejected by the reader.
//!
//! The writer does no layout: attribute offsets inside entities are taken
//! as given. After an error the output holds a partial scope and should be
//! discarded.

mod stream;

pub use stream::OStream;

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use tracing::debug;

use super::format::{
    keys::*, signature, ScopeKind, DEFAULT_MAX_TOKEN_LEN, END_SCOPE, FINALIZED_FLAG, FINALIZED_OFFSET,
};
use crate::graph::*;
use crate::util::{Error, Mat4, Quat, Result, Vec3};

/// Where a buffer landed in the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferPlacement {
    /// Offset of the `BUFFER` scope marker.
    pub scope: u64,
    /// Offset of the first raw payload byte.
    pub data: u64,
}

/// Write a whole graph to a new file.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn write_file(path: impl AsRef<Path>, graph: &EntityGraph) -> Result<()> {
    let mut writer = ScopeWriter::create(path)?;
    writer.write_graph(graph)?;
    writer.finish()
}

fn count(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::InvalidInput(format!("{} has {} entries", what, len)))
}

/// Sequential scope writer.
pub struct ScopeWriter<W: Write + Seek> {
    out: OStream<W>,
    open: Vec<ScopeKind>,
    wrote_properties: bool,
    finished: bool,
}

impl ScopeWriter<BufWriter<File>> {
    /// Create a DAS file, truncating any existing one.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_stream(OStream::create(path)?)
    }
}

impl<W: Write + Seek> ScopeWriter<W> {
    /// Start a DAS stream on a writer positioned at its start.
    pub fn new(writer: W) -> Result<Self> {
        Self::from_stream(OStream::new(writer))
    }

    fn from_stream(mut out: OStream<W>) -> Result<Self> {
        out.write_bytes(&signature(false))?;
        Ok(Self {
            out,
            open: Vec::new(),
            wrote_properties: false,
            finished: false,
        })
    }

    /// Current output position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.out.pos()
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Mark the file complete and flush it.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::Finalized);
        }
        let end = self.out.pos();
        self.out.seek(FINALIZED_OFFSET as u64)?;
        self.out.write_u8(FINALIZED_FLAG)?;
        self.out.seek(end)?;
        self.out.flush()?;
        self.finished = true;
        debug!(bytes = end, "file finalized");
        Ok(())
    }

    /// Release the underlying writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    fn begin(&mut self, kind: ScopeKind) -> Result<u64> {
        if self.finished {
            return Err(Error::Finalized);
        }
        if self.open.is_empty() {
            match (kind, self.wrote_properties) {
                (ScopeKind::Properties, true) => {
                    return Err(Error::InvalidInput("PROPERTIES already written".into()))
                }
                (ScopeKind::Properties, false) => self.wrote_properties = true,
                (_, false) => {
                    return Err(Error::InvalidInput(format!(
                        "{} written before PROPERTIES",
                        kind.name()
                    )))
                }
                _ => {}
            }
        }
        debug_assert_eq!(kind.required_parent(), self.open.last().copied());

        let start = self.out.pos();
        self.out.write_bytes(kind.name().as_bytes())?;
        self.out.write_u8(b'\n')?;
        self.open.push(kind);
        Ok(start)
    }

    fn end(&mut self) -> Result<()> {
        self.out.write_bytes(END_SCOPE)?;
        self.out.write_u8(b'\n')?;
        if let Some(kind) = self.open.pop() {
            debug!(scope = kind.name(), pos = self.out.pos(), "scope written");
        }
        Ok(())
    }

    // ========================================================================
    // Fields
    // ========================================================================

    fn key(&mut self, key: &str) -> Result<()> {
        self.out.write_bytes(key.as_bytes())?;
        self.out.write_bytes(b": ")
    }

    fn str_field(&mut self, key: &str, value: &str) -> Result<()> {
        if value.contains('\n') {
            return Err(Error::InvalidInput(format!("{} contains a line break", key)));
        }
        if value.len() > DEFAULT_MAX_TOKEN_LEN {
            return Err(Error::InvalidInput(format!(
                "{} is {} bytes, the limit is {}",
                key,
                value.len(),
                DEFAULT_MAX_TOKEN_LEN
            )));
        }
        self.key(key)?;
        self.out.write_u8(b'"')?;
        self.out.write_bytes(value.as_bytes())?;
        self.out.write_bytes(b"\"\n")
    }

    fn u8_field(&mut self, key: &str, value: u8) -> Result<()> {
        self.key(key)?;
        self.out.write_u8(value)?;
        self.out.write_u8(b'\n')
    }

    fn u32_field(&mut self, key: &str, value: u32) -> Result<()> {
        self.key(key)?;
        self.out.write_u32(value)?;
        self.out.write_u8(b'\n')
    }

    fn u64_field(&mut self, key: &str, value: u64) -> Result<()> {
        self.key(key)?;
        self.out.write_u64(value)?;
        self.out.write_u8(b'\n')
    }

    fn f32s_field(&mut self, key: &str, values: &[f32]) -> Result<()> {
        self.key(key)?;
        self.out.write_f32s(values)?;
        self.out.write_u8(b'\n')
    }

    fn vec3_field(&mut self, key: &str, v: Vec3) -> Result<()> {
        self.f32s_field(key, &v.to_array())
    }

    fn quat_field(&mut self, key: &str, q: Quat) -> Result<()> {
        self.f32s_field(key, &q.to_array())
    }

    fn mat4_field(&mut self, key: &str, m: &Mat4) -> Result<()> {
        self.f32s_field(key, &m.to_cols_array())
    }

    /// Count field followed by its index list.
    fn u32_list(&mut self, count_key: &str, key: &str, values: &[u32]) -> Result<()> {
        self.u32_field(count_key, count(values.len(), key)?)?;
        self.key(key)?;
        for &v in values {
            self.out.write_u32(v)?;
        }
        self.out.write_u8(b'\n')
    }

    fn attribute(&mut self, id_key: &str, offset_key: &str, attr: AttributeRef) -> Result<()> {
        self.u32_field(id_key, attr.buffer)?;
        self.u32_field(offset_key, attr.offset)
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Write the file properties. Must be the first scope.
    pub fn write_properties(&mut self, props: &Properties) -> Result<u64> {
        let start = self.begin(ScopeKind::Properties)?;
        if !props.model.is_empty() {
            self.str_field(MODEL, &props.model)?;
        }
        if !props.author.is_empty() {
            self.str_field(AUTHOR, &props.author)?;
        }
        if !props.copyright.is_empty() {
            self.str_field(COPYRIGHT, &props.copyright)?;
        }
        self.u64_field(MODDATE, props.moddate)?;
        self.u8_field(COMPRESSION, props.compression as u8)?;
        self.end()?;
        Ok(start)
    }

    /// Write a buffer. The payload is the concatenation of all spans.
    pub fn write_buffer(&mut self, view: &BufferView<'_>) -> Result<BufferPlacement> {
        let scope = self.begin(ScopeKind::Buffer)?;
        self.u32_field(TYPE, view.kind.bits())?;
        self.u64_field(DATALEN, view.len() as u64)?;
        self.key(DATA)?;
        let data = self.out.pos();
        for span in view.spans() {
            self.out.write_bytes(span)?;
        }
        self.out.write_u8(b'\n')?;
        self.end()?;
        Ok(BufferPlacement { scope, data })
    }

    pub fn write_primitive(&mut self, prim: &MeshPrimitive) -> Result<u64> {
        let start = self.begin(ScopeKind::Primitive)?;
        self.attribute(INDEX_BUFFER_ID, INDEX_BUFFER_OFFSET, prim.indices)?;
        self.u32_field(INDICES_COUNT, prim.index_count)?;
        self.attribute(VERTEX_BUFFER_ID, VERTEX_BUFFER_OFFSET, prim.vertices)?;
        if let Some(n) = prim.normals {
            self.attribute(NORMAL_BUFFER_ID, NORMAL_BUFFER_OFFSET, n)?;
        }
        if let Some(uv) = prim.uvs {
            self.attribute(UV_BUFFER_ID, UV_BUFFER_OFFSET, uv)?;
        }
        if let Some(tex) = prim.texture {
            self.u32_field(TEXTURE_ID, tex)?;
        }
        if !prim.morph_targets.is_empty() {
            self.u32_list(MORPH_TARGET_COUNT, MORPH_TARGETS, &prim.morph_targets)?;
        }
        self.end()?;
        Ok(start)
    }

    pub fn write_morph_target(&mut self, target: &MorphTarget) -> Result<u64> {
        let start = self.begin(ScopeKind::MorphTarget)?;
        self.attribute(VERTEX_BUFFER_ID, VERTEX_BUFFER_OFFSET, target.vertices)?;
        if let Some(n) = target.normals {
            self.attribute(NORMAL_BUFFER_ID, NORMAL_BUFFER_OFFSET, n)?;
        }
        if let Some(uv) = target.uvs {
            self.attribute(UV_BUFFER_ID, UV_BUFFER_OFFSET, uv)?;
        }
        self.end()?;
        Ok(start)
    }

    pub fn write_model(&mut self, model: &Model) -> Result<u64> {
        let start = self.begin(ScopeKind::Model)?;
        self.str_field(NAME, &model.name)?;
        self.u32_list(PRIMITIVE_COUNT, PRIMITIVES, &model.primitives)?;
        self.mat4_field(TRANSFORM, &model.transform)?;
        self.end()?;
        Ok(start)
    }

    /// Write an animation with all its keyframes.
    pub fn write_animation(&mut self, anim: &Animation) -> Result<u64> {
        let start = self.begin(ScopeKind::Animation)?;
        self.str_field(NAME, &anim.name)?;
        if let Some(model) = anim.model {
            self.u32_field(MODEL, model)?;
        }
        self.u32_field(INTERPOLATION, anim.interpolation.as_u32())?;
        for key in &anim.keyframes {
            self.write_keyframe(key)?;
        }
        self.end()?;
        Ok(start)
    }

    fn write_keyframe(&mut self, key: &Keyframe) -> Result<()> {
        self.begin(ScopeKind::Keyframe)?;
        self.f32s_field(TIMESTAMP, &[key.timestamp])?;
        if let Some(t) = key.translation {
            self.vec3_field(TRANSLATION, t)?;
        }
        if let Some(r) = key.rotation {
            self.quat_field(ROTATION, r)?;
        }
        if let Some(s) = key.scale {
            self.vec3_field(SCALE, s)?;
        }
        if !key.weights.is_empty() {
            self.u32_field(WEIGHT_COUNT, count(key.weights.len(), WEIGHTS)?)?;
            self.f32s_field(WEIGHTS, &key.weights)?;
        }
        self.end()
    }

    /// Write a skeleton with all its joints.
    pub fn write_skeleton(&mut self, skeleton: &Skeleton) -> Result<u64> {
        let start = self.begin(ScopeKind::Skeleton)?;
        self.str_field(NAME, &skeleton.name)?;
        for joint in &skeleton.joints {
            self.begin(ScopeKind::Joint)?;
            self.str_field(NAME, &joint.name)?;
            self.mat4_field(INVERSE_BIND, &joint.inverse_bind)?;
            self.mat4_field(TRANSFORM, &joint.transform)?;
            if !joint.children.is_empty() {
                self.u32_list(CHILDREN_COUNT, CHILDREN, &joint.children)?;
            }
            self.end()?;
        }
        self.end()?;
        Ok(start)
    }

    /// Write a scene with all its nodes.
    pub fn write_scene(&mut self, scene: &Scene) -> Result<u64> {
        let start = self.begin(ScopeKind::Scene)?;
        self.str_field(NAME, &scene.name)?;
        if scene.is_default {
            self.u8_field(DEFAULT, 1)?;
        }
        if !scene.roots.is_empty() {
            self.u32_list(ROOT_COUNT, ROOTS, &scene.roots)?;
        }
        for node in &scene.nodes {
            self.begin(ScopeKind::Node)?;
            self.str_field(NAME, &node.name)?;
            if let Some(model) = node.model {
                self.u32_field(MODEL, model)?;
            }
            if let Some(skeleton) = node.skeleton {
                self.u32_field(SKELETON, skeleton)?;
            }
            self.mat4_field(TRANSFORM, &node.transform)?;
            if !node.children.is_empty() {
                self.u32_list(CHILDREN_COUNT, CHILDREN, &node.children)?;
            }
            self.end()?;
        }
        self.end()?;
        Ok(start)
    }

    /// Write every entity of a graph in reader order. Synthesized scenes are skipped.
    pub fn write_graph(&mut self, graph: &EntityGraph) -> Result<()> {
        self.write_properties(&graph.properties)?;
        for buffer in &graph.buffers {
            self.write_buffer(&buffer.view())?;
        }
        for target in &graph.morph_targets {
            self.write_morph_target(target)?;
        }
        for prim in &graph.primitives {
            self.write_primitive(prim)?;
        }
        for model in &graph.models {
            self.write_model(model)?;
        }
        for anim in &graph.animations {
            self.write_animation(anim)?;
        }
        for skeleton in &graph.skeletons {
            self.write_skeleton(skeleton)?;
        }
        for scene in graph.scenes.iter().filter(|s| !s.synthesized) {
            self.write_scene(scene)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::das::format::{signature, SIGNATURE_SIZE};
    use std::io::Cursor;

    fn writer() -> ScopeWriter<Cursor<Vec<u8>>> {
        ScopeWriter::new(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn test_signature_finalized_on_finish() {
        let mut w = writer();
        w.write_properties(&Properties::default()).unwrap();
        let before = w.pos();
        w.finish().unwrap();
        assert_eq!(w.pos(), before);
        let bytes = w.into_inner().into_inner();
        assert_eq!(&bytes[..SIGNATURE_SIZE], &signature(true));
    }

    #[test]
    fn test_properties_layout() {
        let mut w = writer();
        let props = Properties {
            author: "A".into(),
            moddate: 5,
            ..Properties::default()
        };
        assert_eq!(w.write_properties(&props).unwrap(), SIGNATURE_SIZE as u64);
        let bytes = w.into_inner().into_inner();

        let mut expected = b"PROPERTIES\nAUTHOR: \"A\"\nMODDATE: ".to_vec();
        expected.extend_from_slice(&5u64.to_le_bytes());
        expected.extend_from_slice(b"\nCOMPRESSION: \x00\nENDSCOPE\n");
        assert_eq!(&bytes[SIGNATURE_SIZE..], &expected[..]);
    }

    #[test]
    fn test_buffer_concatenates_spans() {
        let mut w = writer();
        w.write_properties(&Properties::default()).unwrap();
        let a = [1u8, 2, 3];
        let b = [4u8];
        let view = BufferView::new(BufferType::VERTEX).with_span(&a).with_span(&b);
        let placed = w.write_buffer(&view).unwrap();
        let bytes = w.into_inner().into_inner();

        let data = placed.data as usize;
        assert_eq!(&bytes[data..data + 5], b"\x01\x02\x03\x04\n");
        assert!(bytes[placed.scope as usize..].starts_with(b"BUFFER\n"));
    }

    #[test]
    fn test_rejects_line_breaks() {
        let mut w = writer();
        w.write_properties(&Properties::default()).unwrap();
        let err = w.write_model(&Model::new("two\nlines")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_ordering_and_finalized_errors() {
        let mut w = writer();
        assert!(w.write_model(&Model::new("early")).is_err());
        w.write_properties(&Properties::default()).unwrap();
        assert!(w.write_properties(&Properties::default()).is_err());
        w.finish().unwrap();
        assert!(w.is_finished());
        assert!(matches!(w.write_model(&Model::new("late")), Err(Error::Finalized)));
        assert!(matches!(w.finish(), Err(Error::Finalized)));
    }
}
