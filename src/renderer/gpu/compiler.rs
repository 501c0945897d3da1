// renderer/gpu/compiler.rs
use std::borrow::Cow;
use std::fmt::Write;

use crate::renderer::mask::{MaskKey, FEATURE_TABLE};
use crate::renderer::variant::{
    InputLayout, StepMode, Variant, VariantCompiler, VariantError, VertexAttribute,
};

use super::mesh::attribute_format;

/// One entry point of a compiled WGSL module.
#[derive(Debug, Clone)]
pub struct WgpuProgram {
    pub module: wgpu::ShaderModule,
    pub entry: &'static str,
}

/// Compiles the model shader once per mask by prepending the mask's feature
/// constants and vertex input declaration.
pub struct WgpuVariantCompiler {
    device: wgpu::Device,
    source: Cow<'static, str>,
}

impl WgpuVariantCompiler {
    pub fn new(device: &wgpu::Device) -> Self {
        Self::with_source(device, include_str!("../../shader/model.wgsl"))
    }

    /// Uses a custom shader body. It must declare `vs_static`, `vs_skinned`,
    /// `fs_gbuffer` and `fs_forward` against the generated `VertexIn`.
    pub fn with_source(device: &wgpu::Device, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            device: device.clone(),
            source: source.into(),
        }
    }

    pub fn variant_source(&self, mask: MaskKey, layout: &InputLayout) -> String {
        let mut source = variant_header(mask, layout);
        source.push_str(&self.source);
        source
    }
}

impl VariantCompiler for WgpuVariantCompiler {
    type Program = WgpuProgram;

    fn compile(&mut self, mask: MaskKey) -> Result<Variant<WgpuProgram>, VariantError> {
        let layout = InputLayout::for_mask(mask);
        let source = self.variant_source(mask, &layout);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("ModelVariantShader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(VariantError::Compile {
                mask,
                message: err.to_string(),
            });
        }

        let vertex_entry = if mask.is_skinned() {
            "vs_skinned"
        } else {
            "vs_static"
        };
        let pixel_entry = if mask.is_alpha_blended() {
            "fs_forward"
        } else {
            "fs_gbuffer"
        };

        Ok(Variant {
            vertex: WgpuProgram {
                module: module.clone(),
                entry: vertex_entry,
            },
            pixel: Some(WgpuProgram {
                module,
                entry: pixel_entry,
            }),
            layout: Some(layout),
        })
    }
}

fn wgsl_type(format: wgpu::VertexFormat) -> &'static str {
    match format {
        wgpu::VertexFormat::Float32x2 => "vec2<f32>",
        wgpu::VertexFormat::Float32x3 => "vec3<f32>",
        wgpu::VertexFormat::Uint32x4 => "vec4<u32>",
        wgpu::VertexFormat::Uint32 => "u32",
        _ => "vec4<f32>",
    }
}

fn field_name(attribute: VertexAttribute) -> &'static str {
    match attribute {
        VertexAttribute::Position => "position",
        VertexAttribute::Normal => "normal",
        VertexAttribute::Uv => "uv",
        VertexAttribute::Tangent => "tangent",
        VertexAttribute::JointIndices => "joints",
        VertexAttribute::JointWeights => "weights",
    }
}

/// Feature constants, the `VertexIn` struct matching `layout`, and helpers
/// that hide attributes absent from the layout.
pub(crate) fn variant_header(mask: MaskKey, layout: &InputLayout) -> String {
    let mut header = String::new();
    for (bit, name) in FEATURE_TABLE {
        let _ = writeln!(header, "const {}: bool = {};", name, mask.contains(bit));
    }

    header.push_str("\nstruct VertexIn {\n");
    let has = |wanted: VertexAttribute| {
        layout
            .streams
            .iter()
            .any(|stream| stream.attributes.contains(&wanted))
    };
    let has_tangent = has(VertexAttribute::Tangent);
    let has_joints = has(VertexAttribute::JointIndices);
    for stream in &layout.streams {
        if stream.step == StepMode::Instance {
            for column in 0..4 {
                let _ = writeln!(
                    header,
                    "    @location({}) model_{}: vec4<f32>,",
                    6 + column,
                    column
                );
            }
            header.push_str("    @location(10) skin_table: u32,\n");
            continue;
        }
        for &attribute in &stream.attributes {
            let (location, format, _) = attribute_format(attribute);
            let _ = writeln!(
                header,
                "    @location({}) {}: {},",
                location,
                field_name(attribute),
                wgsl_type(format)
            );
        }
    }
    header.push_str("};\n\n");

    if has_tangent {
        header.push_str("fn vertex_tangent(v: VertexIn) -> vec4<f32> { return v.tangent; }\n");
    } else {
        header.push_str(
            "fn vertex_tangent(v: VertexIn) -> vec4<f32> { return vec4<f32>(1.0, 0.0, 0.0, 1.0); }\n",
        );
    }

    if has_joints {
        header.push_str(
            "fn skin_transform(v: VertexIn) -> mat4x4<f32> {\n\
             \x20   let base = v.skin_table;\n\
             \x20   return skin_matrices[base + v.joints.x] * v.weights.x\n\
             \x20       + skin_matrices[base + v.joints.y] * v.weights.y\n\
             \x20       + skin_matrices[base + v.joints.z] * v.weights.z\n\
             \x20       + skin_matrices[base + v.joints.w] * v.weights.w;\n\
             }\n\n",
        );
    } else {
        header.push_str(
            "fn skin_transform(v: VertexIn) -> mat4x4<f32> {\n\
             \x20   return mat4x4<f32>(\n\
             \x20       vec4<f32>(1.0, 0.0, 0.0, 0.0),\n\
             \x20       vec4<f32>(0.0, 1.0, 0.0, 0.0),\n\
             \x20       vec4<f32>(0.0, 0.0, 1.0, 0.0),\n\
             \x20       vec4<f32>(0.0, 0.0, 0.0, 1.0),\n\
             \x20   );\n\
             }\n\n",
        );
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_declares_every_feature_constant() {
        let mask = MaskKey::DIFFUSE_MAP | MaskKey::USE_INSTANCING;
        let header = variant_header(mask, &InputLayout::for_mask(mask));

        assert!(header.contains("const USE_DIFFUSE_MAP: bool = true;"));
        assert!(header.contains("const USE_INSTANCING: bool = true;"));
        assert!(header.contains("const USE_SKINNING: bool = false;"));
        assert_eq!(header.matches("const USE_").count(), FEATURE_TABLE.len());
    }

    #[test]
    fn header_inputs_follow_the_layout() {
        let static_mask = MaskKey::empty();
        let header = variant_header(static_mask, &InputLayout::for_mask(static_mask));
        assert!(!header.contains("tangent: vec4<f32>,"));
        assert!(!header.contains("joints"));
        assert!(header.contains("@location(10) skin_table: u32,"));

        let skinned = MaskKey::USE_SKINNING | MaskKey::NORMAL_MAP;
        let header = variant_header(skinned, &InputLayout::for_mask(skinned));
        assert!(header.contains("@location(3) tangent: vec4<f32>,"));
        assert!(header.contains("@location(4) joints: vec4<u32>,"));
        assert!(header.contains("skin_matrices[base + v.joints.x]"));
    }
}
