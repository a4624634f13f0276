/// Camera and projection utilities
use nalgebra::{Matrix4, Point2, Point3, Vector3};

use crate::geometry::Aabb;
use crate::projection::{Projectable, Raycastable, Viewport};
use crate::raycast::Ray;
use crate::transform::Orbit;

/// Projection mode for rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionMode {
    Orthographic,
    Perspective,
}

/// Camera configuration for 3D rendering
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub mode: ProjectionMode,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 10.0),
            target: Point3::new(0.0, 0.0, 0.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            fov: 75f32.to_radians(),
            aspect: width as f32 / height.max(1) as f32,
            near: 0.1,
            far: 1000.0,
            mode: ProjectionMode::Perspective,
        }
    }

    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    /// Create the projection matrix
    pub fn projection_matrix(&self) -> Matrix4<f32> {
        match self.mode {
            ProjectionMode::Perspective => {
                Matrix4::new_perspective(self.aspect, self.fov, self.near, self.far)
            }
            ProjectionMode::Orthographic => {
                let height = (self.position - self.target).norm();
                let width = height * self.aspect;
                Matrix4::new_orthographic(
                    -width / 2.0,
                    width / 2.0,
                    -height / 2.0,
                    height / 2.0,
                    self.near,
                    self.far,
                )
            }
        }
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }

    /// Track a new viewport size
    pub fn set_viewport(&mut self, viewport: &Viewport) {
        if viewport.height > 0.0 {
            self.aspect = viewport.width / viewport.height;
        }
    }

    /// Move the eye to the orbit position around the current target
    pub fn apply_orbit(&mut self, orbit: &Orbit) {
        self.position = orbit.eye(&self.target);
    }

    /// Distance that frames a model with these bounds: twice its longest side
    pub fn framing_distance(&self, bounds: &Aabb) -> f32 {
        (bounds.max_extent() * 2.0).max(self.near * 2.0)
    }

    /// Look at the bounds' center from `framing_distance` along the current view axis
    pub fn frame_bounds(&mut self, bounds: &Aabb) {
        let distance = self.framing_distance(bounds);
        let axis = (self.position - self.target)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::z);
        self.target = bounds.center();
        self.position = self.target + axis * distance;
        self.far = self.far.max(distance * 4.0);
    }
}

impl Projectable for Camera {
    fn project_to_ndc(&self, point: &Point3<f32>) -> Option<Point3<f32>> {
        let clip = self.view_projection() * point.to_homogeneous();
        if clip.w <= f32::EPSILON {
            return None;
        }

        let ndc = clip.xyz() / clip.w;
        // In front of the near plane counts as behind the viewer
        if ndc.z < -1.0 {
            return None;
        }
        Some(Point3::from(ndc))
    }
}

impl Raycastable for Camera {
    fn unproject_ray(&self, ndc: &Point2<f32>) -> Option<Ray> {
        let inverse = self.view_projection().try_inverse()?;
        let near = inverse.transform_point(&Point3::new(ndc.x, ndc.y, -1.0));
        let far = inverse.transform_point(&Point3::new(ndc.x, ndc.y, 1.0));
        let direction = (far - near).try_normalize(f32::EPSILON)?;
        Some(Ray::new(near, direction))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(800, 600)
    }
}
