// renderer/camera.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::renderer::job::Aabb;

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub view: Mat4,
    pub proj: Mat4,
    pub position: Vec3,
}

impl Camera {
    pub fn look_at(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        fovy: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            view: Mat4::look_at_rh(position, target, up),
            proj: Mat4::perspective_rh(fovy, aspect, near, far),
            position,
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    /// Distance in front of the camera along its view axis; used as a job's
    /// `sort_depth`.
    pub fn view_depth(&self, point: Vec3) -> f32 {
        -self.view.transform_point3(point).z
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_proj(self.view_proj())
    }

    pub fn uniform(&self) -> CameraUniform {
        CameraUniform::from_matrix(self.view_proj(), self.position)
    }
}

/// Six normalized planes (left, right, bottom, top, near, far) facing inward.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_view_proj(m: Mat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        // wgpu clip space has z in [0, 1], so the near plane is just row 2.
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|plane| {
            let len = plane.truncate().length();
            if len > 0.0 {
                plane / len
            } else {
                plane
            }
        });
        Self { planes }
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let center = aabb.center();
        let extents = aabb.half_extents();
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let radius = extents.dot(normal.abs());
            normal.dot(center) + plane.w >= -radius
        })
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub _padding: f32,
}

impl CameraUniform {
    pub fn from_matrix(view_proj: Mat4, camera_pos: Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: camera_pos.to_array(),
            _padding: 0.0,
        }
    }
}
