//! Typed byte buffers.
//!
//! A [`Buffer`] is the owned form produced by the reader. A [`BufferView`] is
//! the borrowed form handed to the writer: one logical buffer assembled from
//! any number of caller-owned spans without copying them.

use bitflags::bitflags;
use bytemuck::Pod;
use smallvec::SmallVec;

bitflags! {
    /// Buffer content bitmask. Texture encodings share the mask with the
    /// geometry attribute bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BufferType: u32 {
        const VERTEX = 1 << 0;
        const VERTEX_NORMAL = 1 << 1;
        const TEXTURE_MAP = 1 << 2;
        const INDICES = 1 << 3;
        const TEXTURE_JPEG = 1 << 4;
        const TEXTURE_PNG = 1 << 5;
        const TEXTURE_TGA = 1 << 6;
        const TEXTURE_BMP = 1 << 7;
        const TEXTURE_PPM = 1 << 8;
        const TEXTURE_RAW = 1 << 9;

        const TEXTURE = Self::TEXTURE_JPEG.bits()
            | Self::TEXTURE_PNG.bits()
            | Self::TEXTURE_TGA.bits()
            | Self::TEXTURE_BMP.bits()
            | Self::TEXTURE_PPM.bits()
            | Self::TEXTURE_RAW.bits();
    }
}

/// Owned buffer, as parsed from a file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Buffer {
    pub kind: BufferType,
    pub data: Vec<u8>,
}

impl Buffer {
    pub fn new(kind: BufferType, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Declared length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow this buffer as a single-span view for writing.
    pub fn view(&self) -> BufferView<'_> {
        BufferView::new(self.kind).with_span(&self.data)
    }
}

/// Borrowed buffer assembled from one or more caller-owned spans.
#[derive(Clone, Debug, Default)]
pub struct BufferView<'a> {
    pub kind: BufferType,
    spans: SmallVec<[&'a [u8]; 4]>,
}

impl<'a> BufferView<'a> {
    pub fn new(kind: BufferType) -> Self {
        Self {
            kind,
            spans: SmallVec::new(),
        }
    }

    /// View over a typed slice, reinterpreted as bytes.
    pub fn from_pod<T: Pod>(kind: BufferType, values: &'a [T]) -> Self {
        Self::new(kind).with_span(bytemuck::cast_slice(values))
    }

    pub fn with_span(mut self, span: &'a [u8]) -> Self {
        self.spans.push(span);
        self
    }

    /// Append a span and return its byte offset inside the logical buffer.
    pub fn push_span(&mut self, span: &'a [u8]) -> usize {
        let offset = self.len();
        self.spans.push(span);
        offset
    }

    /// Append a typed span and return its byte offset inside the logical buffer.
    pub fn push_pod<T: Pod>(&mut self, values: &'a [T]) -> usize {
        self.push_span(bytemuck::cast_slice(values))
    }

    pub fn spans(&self) -> &[&'a [u8]] {
        &self.spans
    }

    /// Declared length: the sum of all span lengths.
    pub fn len(&self) -> usize {
        self.spans.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the spans into an owned buffer.
    pub fn to_buffer(&self) -> Buffer {
        let mut data = Vec::with_capacity(self.len());
        for span in &self.spans {
            data.extend_from_slice(span);
        }
        Buffer::new(self.kind, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_length_is_sum_of_spans() {
        let a = [1u8, 2, 3];
        let b = [4u8, 5];
        let mut view = BufferView::new(BufferType::VERTEX).with_span(&a);
        assert_eq!(view.push_span(&b), 3);
        assert_eq!(view.len(), 5);
        assert_eq!(view.spans().len(), 2);

        let owned = view.to_buffer();
        assert_eq!(owned.data, vec![1, 2, 3, 4, 5]);
        assert_eq!(owned.len(), 5);
        assert_eq!(owned.kind, BufferType::VERTEX);
    }

    #[test]
    fn test_pod_spans() {
        let indices = [0u32, 1, 2];
        let positions = [0.0f32; 9];
        let mut view = BufferView::from_pod(BufferType::INDICES, &indices);
        assert_eq!(view.push_pod(&positions), 12);
        assert_eq!(view.len(), 12 + 36);
    }

    #[test]
    fn test_texture_mask() {
        assert!(BufferType::TEXTURE.contains(BufferType::TEXTURE_PNG));
        assert!(!BufferType::TEXTURE.intersects(BufferType::VERTEX | BufferType::INDICES));
        let kind = BufferType::from_bits_retain(BufferType::TEXTURE_JPEG.bits() | 1 << 20);
        assert!(kind.intersects(BufferType::TEXTURE));
        assert_eq!(kind.bits() >> 20, 1);
    }
}
