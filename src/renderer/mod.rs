pub mod batch;
pub mod camera;
pub mod command;
pub mod dispatch;
pub mod gpu;
pub mod job;
pub mod job_store;
pub mod lights;
pub mod mask;
pub mod material;
pub mod model_renderer;
pub mod skin;
pub mod variant;
pub mod visibility;

pub use batch::{Batcher, JobBatch};
pub use camera::{Camera, CameraUniform, Frustum};
pub use command::{
    ColorTargetDesc, CommandSink, GroupSetup, GroupTarget, PassState, ResourcePool,
};
pub use dispatch::{DispatchStats, Dispatcher, FrameContext};
pub use job::{
    Aabb, Group, InstanceData, JobKind, MeshKey, Pass, RenderJob, Skinned, SkinnedJob, Static,
    StaticJob,
};
pub use job_store::{JobCounts, JobStore};
pub use lights::{DirectionalLight, LightSet, PointLight, SpotLight};
pub use mask::MaskKey;
pub use material::{
    BlendMode, CullMode, DepthMode, Material, MaterialKey, ShadingParams, TextureHandle,
    TextureSlot,
};
pub use model_renderer::ModelRenderer;
pub use skin::{SkinMatrixProvider, SkinMatrixTable, SkinTableId};
pub use variant::{InputLayout, Variant, VariantCompiler, VariantError, VariantTable};
pub use visibility::{AlwaysVisible, FrustumTester, OcclusionTester, Visibility};
