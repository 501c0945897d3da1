// renderer/variant.rs
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use thiserror::Error;

use crate::renderer::mask::MaskKey;

#[derive(Debug, Error)]
pub enum VariantError {
    #[error("failed to compile shader variant {mask:?}: {message}")]
    Compile { mask: MaskKey, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Position,
    Normal,
    Uv,
    Tangent,
    JointIndices,
    JointWeights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepMode {
    Vertex,
    Instance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexStream {
    pub step: StepMode,
    pub attributes: Vec<VertexAttribute>,
}

/// Vertex streams a variant expects, derived from the mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLayout {
    pub streams: Vec<VertexStream>,
}

impl InputLayout {
    pub fn for_mask(mask: MaskKey) -> Self {
        let mut base = vec![
            VertexAttribute::Position,
            VertexAttribute::Normal,
            VertexAttribute::Uv,
        ];
        if mask.contains(MaskKey::NORMAL_MAP) {
            base.push(VertexAttribute::Tangent);
        }

        let mut streams = vec![VertexStream {
            step: StepMode::Vertex,
            attributes: base,
        }];
        if mask.is_skinned() {
            streams.push(VertexStream {
                step: StepMode::Vertex,
                attributes: vec![VertexAttribute::JointIndices, VertexAttribute::JointWeights],
            });
        }
        streams.push(VertexStream {
            step: StepMode::Instance,
            attributes: Vec::new(),
        });

        Self { streams }
    }

    pub fn instance_slot(&self) -> u32 {
        self.streams
            .iter()
            .position(|stream| stream.step == StepMode::Instance)
            .unwrap_or(self.streams.len()) as u32
    }
}

/// Compiled program set for one mask. Owns its programs.
#[derive(Debug, Clone)]
pub struct Variant<P> {
    pub vertex: P,
    pub pixel: Option<P>,
    pub layout: Option<InputLayout>,
}

pub trait VariantCompiler {
    type Program;

    fn compile(&mut self, mask: MaskKey) -> Result<Variant<Self::Program>, VariantError>;
}

/// Process-lifetime cache of compiled variants. Entries are never evicted;
/// failures are not cached so the next frame retries.
#[derive(Debug)]
pub struct VariantTable<P> {
    variants: HashMap<MaskKey, Variant<P>>,
}

impl<P> Default for VariantTable<P> {
    fn default() -> Self {
        Self {
            variants: HashMap::new(),
        }
    }
}

impl<P> VariantTable<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn contains(&self, mask: MaskKey) -> bool {
        self.variants.contains_key(&mask)
    }

    pub fn get(&self, mask: MaskKey) -> Option<&Variant<P>> {
        self.variants.get(&mask)
    }

    /// Returns the variant for `mask`, compiling it synchronously on first use.
    pub fn resolve<C>(
        &mut self,
        mask: MaskKey,
        compiler: &mut C,
    ) -> Result<&Variant<P>, VariantError>
    where
        C: VariantCompiler<Program = P>,
    {
        match self.variants.entry(mask) {
            Entry::Occupied(entry) => Ok(&*entry.into_mut()),
            Entry::Vacant(entry) => {
                let variant = compiler.compile(mask)?;
                log::info!(
                    "Compiled shader variant {:#06x} [{}]",
                    mask.bits(),
                    mask.feature_names().collect::<Vec<_>>().join(", ")
                );
                Ok(&*entry.insert(variant))
            }
        }
    }
}
