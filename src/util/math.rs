//! Math type re-exports and helpers for the fixed-width value layout.
//!
//! Transforms and keyframe channels use `glam` types; the helpers here
//! convert them to and from the canonical little-endian field encoding.

use byteorder::{ByteOrder, LittleEndian};

pub use glam::{Mat4, Quat, Vec3};

/// Encoded width of a `vec3` field (3 x f32).
pub const VEC3_SIZE: usize = 12;

/// Encoded width of a `quat` field (x, y, z, w as f32).
pub const QUAT_SIZE: usize = 16;

/// Encoded width of a `mat4` field (16 x f32, column major).
pub const MAT4_SIZE: usize = 64;

/// Decode little-endian f32 values into `out`. `bytes` must hold `4 * out.len()` bytes.
#[inline]
pub(crate) fn read_f32s(bytes: &[u8], out: &mut [f32]) {
    LittleEndian::read_f32_into(&bytes[..out.len() * 4], out);
}

pub(crate) fn vec3_from_le(bytes: &[u8]) -> Vec3 {
    let mut v = [0.0f32; 3];
    read_f32s(bytes, &mut v);
    Vec3::from_array(v)
}

pub(crate) fn quat_from_le(bytes: &[u8]) -> Quat {
    let mut v = [0.0f32; 4];
    read_f32s(bytes, &mut v);
    Quat::from_array(v)
}

pub(crate) fn mat4_from_le(bytes: &[u8]) -> Mat4 {
    let mut v = [0.0f32; 16];
    read_f32s(bytes, &mut v);
    Mat4::from_cols_array(&v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_f32s(buf: &mut Vec<u8>, values: &[f32]) {
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    #[test]
    fn test_mat4_layout_is_column_major() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let mut buf = Vec::new();
        push_f32s(&mut buf, &m.to_cols_array());
        assert_eq!(buf.len(), MAT4_SIZE);
        // Translation lives in the fourth column, floats 12..15.
        assert_eq!(&buf[48..52], &1.0f32.to_le_bytes());
        assert_eq!(mat4_from_le(&buf), m);
    }

    #[test]
    fn test_quat_roundtrip() {
        let q = Quat::from_rotation_y(0.5);
        let mut buf = Vec::new();
        push_f32s(&mut buf, &q.to_array());
        assert_eq!(buf.len(), QUAT_SIZE);
        assert_eq!(quat_from_le(&buf), q);
    }

    #[test]
    fn test_vec3_decode() {
        let mut buf = Vec::new();
        push_f32s(&mut buf, &[0.5, -1.0, 2.0]);
        assert_eq!(buf.len(), VEC3_SIZE);
        assert_eq!(vec3_from_le(&buf), Vec3::new(0.5, -1.0, 2.0));
    }
}
