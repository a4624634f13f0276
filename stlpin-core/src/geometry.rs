/// Geometry primitives for decoded STL surfaces
use nalgebra::{Point3, Vector3};

/// Normals shorter than this are treated as missing
const NORMAL_EPSILON: f32 = 1e-12;

/// A 3D vertex with position and normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
}

impl Vertex {
    pub fn new(x: f32, y: f32, z: f32, nx: f32, ny: f32, nz: f32) -> Self {
        Self {
            position: Point3::new(x, y, z),
            normal: Vector3::new(nx, ny, nz),
        }
    }
}

/// A triangle face defined by three vertices sharing one facet normal
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

impl Triangle {
    pub fn new(v0: Vertex, v1: Vertex, v2: Vertex) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }

    /// Build a triangle from an STL facet, replicating the normal onto each corner.
    ///
    /// Exporters frequently write `0 0 0` normals; those are recomputed from the
    /// winding order so shading still works.
    pub fn from_facet(normal: Vector3<f32>, corners: [Point3<f32>; 3]) -> Self {
        let mut triangle = Self {
            vertices: corners.map(|position| Vertex { position, normal }),
        };
        let usable = normal.iter().all(|c| c.is_finite()) && normal.norm_squared() > NORMAL_EPSILON;
        if !usable {
            let computed = triangle.calculate_normal();
            for vertex in &mut triangle.vertices {
                vertex.normal = computed;
            }
        }
        triangle
    }

    /// Calculate the face normal from the triangle's vertices.
    ///
    /// Degenerate triangles yield a zero vector.
    pub fn calculate_normal(&self) -> Vector3<f32> {
        let v0 = self.vertices[0].position;
        let v1 = self.vertices[1].position;
        let v2 = self.vertices[2].position;

        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        edge1
            .cross(&edge2)
            .try_normalize(NORMAL_EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    /// The facet normal
    pub fn normal(&self) -> Vector3<f32> {
        self.vertices[0].normal
    }

    pub fn positions(&self) -> [Point3<f32>; 3] {
        self.vertices.map(|v| v.position)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// Smallest box containing every point, or `None` for an empty iterator
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f32>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        Some(points.fold(Self { min: first, max: first }, |bounds, p| Self {
            min: bounds.min.inf(p),
            max: bounds.max.sup(p),
        }))
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Length of the longest side
    pub fn max_extent(&self) -> f32 {
        self.size().max()
    }
}

/// Ordered triangle list produced by the STL decoder
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TriangleBuffer {
    pub triangles: Vec<Triangle>,
}

impl TriangleBuffer {
    pub fn new() -> Self {
        Self {
            triangles: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            triangles: Vec::with_capacity(capacity),
        }
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Vertex positions, three per triangle
    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.triangles
            .iter()
            .flat_map(|t| t.vertices.iter())
            .map(|v| v.position.coords.into())
            .collect()
    }

    /// Per-vertex normals, the facet normal repeated three times per triangle
    pub fn normals(&self) -> Vec<[f32; 3]> {
        self.triangles
            .iter()
            .flat_map(|t| t.vertices.iter())
            .map(|v| v.normal.into())
            .collect()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(
            self.triangles
                .iter()
                .flat_map(|t| t.vertices.iter())
                .map(|v| &v.position),
        )
    }

    /// Translate every position so the bounding box is centered on the origin.
    ///
    /// Returns the translation that was applied.
    pub fn recenter(&mut self) -> Vector3<f32> {
        let Some(bounds) = self.bounds() else {
            return Vector3::zeros();
        };
        let offset = -bounds.center().coords;
        for vertex in self.triangles.iter_mut().flat_map(|t| t.vertices.iter_mut()) {
            vertex.position += offset;
        }
        offset
    }

    /// Create a cube mesh centered on the origin (12 triangles, outward normals)
    pub fn cube(size: f32) -> Self {
        let half = size / 2.0;
        let mut mesh = Self::with_capacity(12);

        // +Z
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, half, 0.0, 0.0, 1.0),
            Vertex::new(half, -half, half, 0.0, 0.0, 1.0),
            Vertex::new(half, half, half, 0.0, 0.0, 1.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, half, 0.0, 0.0, 1.0),
            Vertex::new(half, half, half, 0.0, 0.0, 1.0),
            Vertex::new(-half, half, half, 0.0, 0.0, 1.0),
        ));

        // -Z
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, 0.0, 0.0, -1.0),
            Vertex::new(-half, half, -half, 0.0, 0.0, -1.0),
            Vertex::new(half, half, -half, 0.0, 0.0, -1.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, 0.0, 0.0, -1.0),
            Vertex::new(half, half, -half, 0.0, 0.0, -1.0),
            Vertex::new(half, -half, -half, 0.0, 0.0, -1.0),
        ));

        // +Y
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, half, -half, 0.0, 1.0, 0.0),
            Vertex::new(-half, half, half, 0.0, 1.0, 0.0),
            Vertex::new(half, half, half, 0.0, 1.0, 0.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, half, -half, 0.0, 1.0, 0.0),
            Vertex::new(half, half, half, 0.0, 1.0, 0.0),
            Vertex::new(half, half, -half, 0.0, 1.0, 0.0),
        ));

        // -Y
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, 0.0, -1.0, 0.0),
            Vertex::new(half, -half, -half, 0.0, -1.0, 0.0),
            Vertex::new(half, -half, half, 0.0, -1.0, 0.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, 0.0, -1.0, 0.0),
            Vertex::new(half, -half, half, 0.0, -1.0, 0.0),
            Vertex::new(-half, -half, half, 0.0, -1.0, 0.0),
        ));

        // +X
        mesh.add_triangle(Triangle::new(
            Vertex::new(half, -half, -half, 1.0, 0.0, 0.0),
            Vertex::new(half, half, -half, 1.0, 0.0, 0.0),
            Vertex::new(half, half, half, 1.0, 0.0, 0.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(half, -half, -half, 1.0, 0.0, 0.0),
            Vertex::new(half, half, half, 1.0, 0.0, 0.0),
            Vertex::new(half, -half, half, 1.0, 0.0, 0.0),
        ));

        // -X
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, -1.0, 0.0, 0.0),
            Vertex::new(-half, -half, half, -1.0, 0.0, 0.0),
            Vertex::new(-half, half, half, -1.0, 0.0, 0.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, -1.0, 0.0, 0.0),
            Vertex::new(-half, half, half, -1.0, 0.0, 0.0),
            Vertex::new(-half, half, -half, -1.0, 0.0, 0.0),
        ));

        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_normal_is_recomputed() {
        let triangle = Triangle::from_facet(
            Vector3::zeros(),
            [
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
        );
        assert_eq!(triangle.normal(), Vector3::new(0.0, 0.0, 1.0));
        assert!(triangle.vertices.iter().all(|v| v.normal == triangle.normal()));
    }

    #[test]
    fn test_degenerate_triangle_keeps_zero_normal() {
        let p = Point3::new(1.0, 1.0, 1.0);
        let triangle = Triangle::from_facet(Vector3::zeros(), [p, p, p]);
        assert_eq!(triangle.normal(), Vector3::zeros());
    }

    #[test]
    fn test_recenter_moves_bounds_to_origin() {
        let mut mesh = TriangleBuffer::new();
        mesh.add_triangle(Triangle::from_facet(
            Vector3::z(),
            [
                Point3::new(10.0, 20.0, 30.0),
                Point3::new(12.0, 20.0, 30.0),
                Point3::new(10.0, 24.0, 34.0),
            ],
        ));

        let offset = mesh.recenter();
        assert_eq!(offset, Vector3::new(-11.0, -22.0, -32.0));

        let bounds = mesh.bounds().unwrap();
        assert_eq!(bounds.center(), Point3::origin());
        assert_eq!(bounds.size(), Vector3::new(2.0, 4.0, 4.0));
        assert_eq!(bounds.max_extent(), 4.0);
    }

    #[test]
    fn test_flat_arrays_replicate_normals() {
        let mesh = TriangleBuffer::cube(2.0);
        assert_eq!(mesh.len(), 12);
        assert_eq!(mesh.positions().len(), 36);
        let normals = mesh.normals();
        assert_eq!(normals.len(), 36);
        assert_eq!(normals[0], normals[1]);
        assert_eq!(normals[1], normals[2]);
    }

    #[test]
    fn test_empty_buffer_has_no_bounds() {
        let mut mesh = TriangleBuffer::default();
        assert!(mesh.bounds().is_none());
        assert_eq!(mesh.recenter(), Vector3::zeros());
    }
}
