//! DAS format constants, scope kinds and field tables.

use crate::util::{MAT4_SIZE, QUAT_SIZE, VEC3_SIZE};

/// Magic bytes at the start of a DAS file.
pub const DAS_MAGIC: &[u8; 3] = b"DAS";

/// Size of the file signature in bytes.
pub const SIGNATURE_SIZE: usize = 8;

/// Offset of the finalized flag in the signature.
pub const FINALIZED_OFFSET: usize = 3;

/// Offset of the version in the signature.
pub const VERSION_OFFSET: usize = 4;

/// Current DAS format version.
pub const CURRENT_VERSION: u16 = 1;

/// Finalized flag value once the writer has closed the file.
pub const FINALIZED_FLAG: u8 = 0xFF;

/// Finalized flag value while the file is still being written.
pub const NOT_FINALIZED_FLAG: u8 = 0x00;

/// Marker closing every scope.
pub const END_SCOPE: &[u8] = b"ENDSCOPE";

/// Delimiter the chunked stream never splits across refills.
pub const SCOPE_DELIMITER: &[u8] = b"ENDSCOPE\n";

/// Default chunk capacity in bytes.
pub const DEFAULT_CHUNK_CAPACITY: usize = 4096;

/// Smallest chunk capacity the stream accepts.
pub const MIN_CHUNK_CAPACITY: usize = 16;

/// Default upper bound on one text token (scope name, key, quoted string).
pub const DEFAULT_MAX_TOKEN_LEN: usize = 64 * 1024;

/// Build the signature bytes for the given finalized state.
pub const fn signature(finalized: bool) -> [u8; SIGNATURE_SIZE] {
    let version = CURRENT_VERSION.to_le_bytes();
    [
        DAS_MAGIC[0],
        DAS_MAGIC[1],
        DAS_MAGIC[2],
        if finalized { FINALIZED_FLAG } else { NOT_FINALIZED_FLAG },
        version[0],
        version[1],
        0,
        0,
    ]
}

// ============================================================================
// Scope kinds
// ============================================================================

/// Every scope name the format recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Properties,
    Buffer,
    Primitive,
    MorphTarget,
    Model,
    Animation,
    Keyframe,
    Skeleton,
    Joint,
    Scene,
    Node,
}

impl ScopeKind {
    /// Look up a scope by its on-disk name. `MESH` is read as `MODEL`.
    pub fn from_name(name: &[u8]) -> Option<Self> {
        let kind = match name {
            b"PROPERTIES" => Self::Properties,
            b"BUFFER" => Self::Buffer,
            b"PRIMITIVE" | b"MESH_PRIMITIVE" => Self::Primitive,
            b"MORPHTARGET" => Self::MorphTarget,
            b"MODEL" | b"MESH" => Self::Model,
            b"ANIMATION" => Self::Animation,
            b"KEYFRAME" => Self::Keyframe,
            b"SKELETON" => Self::Skeleton,
            b"JOINT" => Self::Joint,
            b"SCENE" => Self::Scene,
            b"NODE" => Self::Node,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical name written by the writer.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Properties => "PROPERTIES",
            Self::Buffer => "BUFFER",
            Self::Primitive => "PRIMITIVE",
            Self::MorphTarget => "MORPHTARGET",
            Self::Model => "MODEL",
            Self::Animation => "ANIMATION",
            Self::Keyframe => "KEYFRAME",
            Self::Skeleton => "SKELETON",
            Self::Joint => "JOINT",
            Self::Scene => "SCENE",
            Self::Node => "NODE",
        }
    }

    /// Scope a nested kind must appear in. `None` for top-level scopes.
    pub const fn required_parent(self) -> Option<ScopeKind> {
        match self {
            Self::Keyframe => Some(Self::Animation),
            Self::Joint => Some(Self::Skeleton),
            Self::Node => Some(Self::Scene),
            _ => None,
        }
    }

    /// Field layout for a key inside this scope.
    pub fn field(self, key: &[u8]) -> Option<Field> {
        FIELD_TABLE
            .iter()
            .find(|(scope, field)| *scope == self && field.key.as_bytes() == key)
            .map(|(_, field)| *field)
    }
}

// ============================================================================
// Field tables
// ============================================================================

/// How a field's payload is encoded after `KEY: `.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Double-quoted text terminated by `"\n`.
    Str,
    /// Fixed-width little-endian value of the given byte width.
    Fixed(usize),
    /// Raw payload of `count * width` bytes, where `count` is the value of
    /// the earlier integer field `count_key` in the same scope.
    Sized { count_key: &'static str, width: usize },
}

/// One recognized key and its payload kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub key: &'static str,
    pub kind: FieldKind,
}

const fn field(key: &'static str, kind: FieldKind) -> Field {
    Field { key, kind }
}

const STR: FieldKind = FieldKind::Str;
const U8: FieldKind = FieldKind::Fixed(1);
const U32: FieldKind = FieldKind::Fixed(4);
const U64: FieldKind = FieldKind::Fixed(8);
const F32: FieldKind = FieldKind::Fixed(4);
const VEC3: FieldKind = FieldKind::Fixed(VEC3_SIZE);
const QUAT: FieldKind = FieldKind::Fixed(QUAT_SIZE);
const MAT4: FieldKind = FieldKind::Fixed(MAT4_SIZE);

const fn u32_list(count_key: &'static str) -> FieldKind {
    FieldKind::Sized { count_key, width: 4 }
}

/// Field keys, shared by the reader and the writer.
pub mod keys {
    pub const MODEL: &str = "MODEL";
    pub const AUTHOR: &str = "AUTHOR";
    pub const COPYRIGHT: &str = "COPYRIGHT";
    pub const MODDATE: &str = "MODDATE";
    pub const COMPRESSION: &str = "COMPRESSION";

    pub const TYPE: &str = "TYPE";
    pub const DATALEN: &str = "DATALEN";
    pub const DATA: &str = "DATA";

    pub const INDEX_BUFFER_ID: &str = "INDEXBUFFERID";
    pub const INDEX_BUFFER_OFFSET: &str = "INDEXBUFFEROFFSET";
    pub const INDICES_COUNT: &str = "INDICESCOUNT";
    pub const VERTEX_BUFFER_ID: &str = "VERTEXBUFFERID";
    pub const VERTEX_BUFFER_OFFSET: &str = "VERTEXBUFFEROFFSET";
    pub const NORMAL_BUFFER_ID: &str = "VERTEXNORMALBUFFERID";
    pub const NORMAL_BUFFER_OFFSET: &str = "VERTEXNORMALBUFFEROFFSET";
    pub const UV_BUFFER_ID: &str = "UVBUFFERID";
    pub const UV_BUFFER_OFFSET: &str = "UVBUFFEROFFSET";
    pub const TEXTURE_ID: &str = "TEXTUREID";
    pub const MORPH_TARGET_COUNT: &str = "MORPHTARGETCOUNT";
    pub const MORPH_TARGETS: &str = "MORPHTARGETS";

    pub const NAME: &str = "NAME";
    pub const PRIMITIVE_COUNT: &str = "PRIMITIVECOUNT";
    pub const PRIMITIVES: &str = "PRIMITIVES";
    pub const TRANSFORM: &str = "TRANSFORM";

    pub const INTERPOLATION: &str = "INTERPOLATION";
    pub const TIMESTAMP: &str = "TIMESTAMP";
    pub const TRANSLATION: &str = "TRANSLATION";
    pub const ROTATION: &str = "ROTATION";
    pub const SCALE: &str = "SCALE";
    pub const WEIGHT_COUNT: &str = "WEIGHTCOUNT";
    pub const WEIGHTS: &str = "WEIGHTS";

    pub const INVERSE_BIND: &str = "INVERSEBIND";
    pub const CHILDREN_COUNT: &str = "CHILDRENCOUNT";
    pub const CHILDREN: &str = "CHILDREN";

    pub const DEFAULT: &str = "DEFAULT";
    pub const ROOT_COUNT: &str = "ROOTCOUNT";
    pub const ROOTS: &str = "ROOTS";
    pub const SKELETON: &str = "SKELETON";
}

use keys::*;

static FIELD_TABLE: &[(ScopeKind, Field)] = &[
    (ScopeKind::Properties, field(MODEL, STR)),
    (ScopeKind::Properties, field(AUTHOR, STR)),
    (ScopeKind::Properties, field(COPYRIGHT, STR)),
    (ScopeKind::Properties, field(MODDATE, U64)),
    (ScopeKind::Properties, field(COMPRESSION, U8)),
    (ScopeKind::Buffer, field(TYPE, U32)),
    (ScopeKind::Buffer, field(DATALEN, U64)),
    (ScopeKind::Buffer, field(DATA, FieldKind::Sized { count_key: DATALEN, width: 1 })),
    (ScopeKind::Primitive, field(INDEX_BUFFER_ID, U32)),
    (ScopeKind::Primitive, field(INDEX_BUFFER_OFFSET, U32)),
    (ScopeKind::Primitive, field(INDICES_COUNT, U32)),
    (ScopeKind::Primitive, field(VERTEX_BUFFER_ID, U32)),
    (ScopeKind::Primitive, field(VERTEX_BUFFER_OFFSET, U32)),
    (ScopeKind::Primitive, field(NORMAL_BUFFER_ID, U32)),
    (ScopeKind::Primitive, field(NORMAL_BUFFER_OFFSET, U32)),
    (ScopeKind::Primitive, field(UV_BUFFER_ID, U32)),
    (ScopeKind::Primitive, field(UV_BUFFER_OFFSET, U32)),
    (ScopeKind::Primitive, field(TEXTURE_ID, U32)),
    (ScopeKind::Primitive, field(MORPH_TARGET_COUNT, U32)),
    (ScopeKind::Primitive, field(MORPH_TARGETS, u32_list(MORPH_TARGET_COUNT))),
    (ScopeKind::MorphTarget, field(VERTEX_BUFFER_ID, U32)),
    (ScopeKind::MorphTarget, field(VERTEX_BUFFER_OFFSET, U32)),
    (ScopeKind::MorphTarget, field(NORMAL_BUFFER_ID, U32)),
    (ScopeKind::MorphTarget, field(NORMAL_BUFFER_OFFSET, U32)),
    (ScopeKind::MorphTarget, field(UV_BUFFER_ID, U32)),
    (ScopeKind::MorphTarget, field(UV_BUFFER_OFFSET, U32)),
    (ScopeKind::Model, field(NAME, STR)),
    (ScopeKind::Model, field(PRIMITIVE_COUNT, U32)),
    (ScopeKind::Model, field(PRIMITIVES, u32_list(PRIMITIVE_COUNT))),
    (ScopeKind::Model, field(TRANSFORM, MAT4)),
    (ScopeKind::Animation, field(NAME, STR)),
    (ScopeKind::Animation, field(MODEL, U32)),
    (ScopeKind::Animation, field(INTERPOLATION, U32)),
    (ScopeKind::Keyframe, field(TIMESTAMP, F32)),
    (ScopeKind::Keyframe, field(TRANSLATION, VEC3)),
    (ScopeKind::Keyframe, field(ROTATION, QUAT)),
    (ScopeKind::Keyframe, field(SCALE, VEC3)),
    (ScopeKind::Keyframe, field(WEIGHT_COUNT, U32)),
    (ScopeKind::Keyframe, field(WEIGHTS, FieldKind::Sized { count_key: WEIGHT_COUNT, width: 4 })),
    (ScopeKind::Skeleton, field(NAME, STR)),
    (ScopeKind::Joint, field(NAME, STR)),
    (ScopeKind::Joint, field(INVERSE_BIND, MAT4)),
    (ScopeKind::Joint, field(TRANSFORM, MAT4)),
    (ScopeKind::Joint, field(CHILDREN_COUNT, U32)),
    (ScopeKind::Joint, field(CHILDREN, u32_list(CHILDREN_COUNT))),
    (ScopeKind::Scene, field(NAME, STR)),
    (ScopeKind::Scene, field(DEFAULT, U8)),
    (ScopeKind::Scene, field(ROOT_COUNT, U32)),
    (ScopeKind::Scene, field(ROOTS, u32_list(ROOT_COUNT))),
    (ScopeKind::Node, field(NAME, STR)),
    (ScopeKind::Node, field(MODEL, U32)),
    (ScopeKind::Node, field(SKELETON, U32)),
    (ScopeKind::Node, field(TRANSFORM, MAT4)),
    (ScopeKind::Node, field(CHILDREN_COUNT, U32)),
    (ScopeKind::Node, field(CHILDREN, u32_list(CHILDREN_COUNT))),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature() {
        let sig = signature(true);
        assert_eq!(&sig[..3], DAS_MAGIC);
        assert_eq!(sig[FINALIZED_OFFSET], FINALIZED_FLAG);
        assert_eq!(sig[VERSION_OFFSET], 1);
        assert_eq!(sig[VERSION_OFFSET + 1], 0);
        assert_eq!(signature(false)[FINALIZED_OFFSET], NOT_FINALIZED_FLAG);
    }

    #[test]
    fn test_scope_names_roundtrip() {
        for kind in [
            ScopeKind::Properties,
            ScopeKind::Buffer,
            ScopeKind::Primitive,
            ScopeKind::MorphTarget,
            ScopeKind::Model,
            ScopeKind::Animation,
            ScopeKind::Keyframe,
            ScopeKind::Skeleton,
            ScopeKind::Joint,
            ScopeKind::Scene,
            ScopeKind::Node,
        ] {
            assert_eq!(ScopeKind::from_name(kind.name().as_bytes()), Some(kind));
        }
        assert_eq!(ScopeKind::from_name(b"MESH"), Some(ScopeKind::Model));
        assert_eq!(ScopeKind::from_name(b"ENDSCOPE"), None);
        assert_eq!(ScopeKind::from_name(b"LIGHT"), None);
    }

    #[test]
    fn test_field_lookup() {
        let data = ScopeKind::Buffer.field(b"DATA").unwrap();
        assert_eq!(data.kind, FieldKind::Sized { count_key: DATALEN, width: 1 });
        assert_eq!(ScopeKind::Model.field(b"TRANSFORM").unwrap().kind, FieldKind::Fixed(64));
        // Keys are scoped: DATA is not a model field.
        assert!(ScopeKind::Model.field(b"DATA").is_none());
    }

    #[test]
    fn test_sized_fields_reference_integer_counts() {
        for (scope, f) in FIELD_TABLE {
            if let FieldKind::Sized { count_key, .. } = f.kind {
                let count = scope.field(count_key.as_bytes()).expect("count field exists");
                assert!(matches!(count.kind, FieldKind::Fixed(4) | FieldKind::Fixed(8)));
            }
        }
    }
}
