/// Ray casting from a screen pointer onto the decoded surface
use log::debug;
use nalgebra::{Point2, Point3, Vector3};

use crate::geometry::{Triangle, TriangleBuffer};
use crate::projection::{Raycastable, Viewport};

/// Parallel-ray tolerance, relative to the edge and direction lengths
const EPSILON: f32 = 1e-7;
/// Slack on the barycentric bounds so rays through shared edges hit a neighbour
const EDGE_TOLERANCE: f32 = 1e-6;

/// A half-line in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
}

/// Where a ray crosses a triangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Ray parameter
    pub t: f32,
    /// Interpolated from the barycentric coordinates, so it lies in the triangle's plane
    pub point: Point3<f32>,
}

impl Ray {
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self { origin, direction }
    }

    pub fn at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }

    /// Moller-Trumbore intersection.
    ///
    /// Rays parallel to the triangle and hits behind the origin are rejected.
    pub fn intersect_triangle(&self, triangle: &Triangle) -> Option<Intersection> {
        let [v0, v1, v2] = triangle.positions();
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let p = self.direction.cross(&edge2);
        let det = edge1.dot(&p);
        let scale = edge1.norm() * edge2.norm() * self.direction.norm();
        if det.abs() <= EPSILON * scale {
            return None;
        }
        let inv_det = 1.0 / det;

        let s = self.origin - v0;
        let u = s.dot(&p) * inv_det;
        if !(-EDGE_TOLERANCE..=1.0 + EDGE_TOLERANCE).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = self.direction.dot(&q) * inv_det;
        if v < -EDGE_TOLERANCE || u + v > 1.0 + EDGE_TOLERANCE {
            return None;
        }

        let t = edge2.dot(&q) * inv_det;
        (t > 0.0).then(|| Intersection {
            t,
            point: v0 + edge1 * u + edge2 * v,
        })
    }
}

/// Nearest surface point under the pointer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub point: Point3<f32>,
    /// Ray parameter of the intersection
    pub distance: f32,
    /// Index into the triangle buffer
    pub triangle: usize,
}

/// Finds the surface point under a screen position
pub struct HitTester;

impl HitTester {
    /// Cast a ray through `pointer` and return the nearest intersection.
    ///
    /// Linear in the number of triangles; only run on click.
    pub fn test(
        pointer: &Point2<f32>,
        viewport: &Viewport,
        camera: &impl Raycastable,
        mesh: &TriangleBuffer,
    ) -> Option<Hit> {
        let ndc = viewport.pointer_to_ndc(pointer);
        let ray = camera.unproject_ray(&ndc)?;
        let hit = Self::nearest(&ray, mesh);
        debug!("pointer {:?} (ndc {:?}) -> {:?}", pointer, ndc, hit);
        hit
    }

    /// Closest intersection of `ray` with any triangle in `mesh`
    pub fn nearest(ray: &Ray, mesh: &TriangleBuffer) -> Option<Hit> {
        mesh.triangles
            .iter()
            .enumerate()
            .filter_map(|(index, triangle)| {
                ray.intersect_triangle(triangle).map(|hit| (index, hit))
            })
            .min_by(|(_, a), (_, b)| a.t.total_cmp(&b.t))
            .map(|(triangle, hit)| Hit {
                point: hit.point,
                distance: hit.t,
                triangle,
            })
    }
}
