// renderer/skin.rs
use glam::Mat4;

/// Offset of a skinned instance's first joint matrix in the per-frame table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SkinTableId(u32);

impl SkinTableId {
    pub const NONE: Self = Self(u32::MAX);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Holds already-evaluated joint matrices for skinned instances.
///
/// Scene code allocates a slot per skinned instance before submitting its job;
/// the provider flushes everything to GPU-visible storage once per frame.
pub trait SkinMatrixProvider {
    fn allocate(&mut self, count: usize) -> (&mut [Mat4], SkinTableId);

    /// Matrices written this frame, in table order.
    fn matrices(&self) -> &[Mat4];

    fn reset(&mut self);
}

#[derive(Debug, Default)]
pub struct SkinMatrixTable {
    matrices: Vec<Mat4>,
}

impl SkinMatrixTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            matrices: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Hands the frame's matrices to `upload`, skipping empty frames.
    pub fn bake(&self, upload: impl FnOnce(&[Mat4])) {
        if !self.matrices.is_empty() {
            upload(&self.matrices);
        }
    }
}

/// `NONE` when the offset does not fit below the reserved sentinel.
fn offset_id(start: usize) -> SkinTableId {
    match u32::try_from(start) {
        Ok(raw) if raw != SkinTableId::NONE.raw() => SkinTableId::from_raw(raw),
        _ => {
            log::error!("Skin matrix offset {} is out of addressable range", start);
            SkinTableId::NONE
        }
    }
}

impl SkinMatrixProvider for SkinMatrixTable {
    fn allocate(&mut self, count: usize) -> (&mut [Mat4], SkinTableId) {
        let start = self.matrices.len();
        self.matrices.resize(start + count, Mat4::IDENTITY);
        (&mut self.matrices[start..], offset_id(start))
    }

    fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }

    fn reset(&mut self) {
        self.matrices.clear();
    }
}
