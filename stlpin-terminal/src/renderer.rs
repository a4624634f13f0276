/// ASCII rasterizer for terminal rendering
use crossterm::{
    cursor,
    style::{Color, Print, ResetColor, SetForegroundColor},
    QueueableCommand,
};
use nalgebra::Vector3;
use std::io::Write;
use stlpin_core::{
    Aabb, Camera, DisplayList, Orbit, Projectable, Triangle, TriangleBuffer, Viewport,
};

/// Character luminosity ramp for depth/shading (darkest to lightest)
const LUMINOSITY_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Terminal cells are roughly twice as tall as they are wide
pub const CELL_ASPECT: f32 = 0.5;

/// What the terminal displays: the current mesh and the camera looking at it
pub struct Scene {
    pub mesh: Option<TriangleBuffer>,
    pub camera: Camera,
    pub orbit: Orbit,
}

impl Scene {
    pub fn new(camera: Camera) -> Self {
        let orbit = Orbit::facing((camera.position - camera.target).norm());
        Self {
            mesh: None,
            camera,
            orbit,
        }
    }

    /// Match the camera to a viewport measured in cells
    pub fn set_viewport(&mut self, viewport: &Viewport) {
        if viewport.height > 0.0 {
            self.camera.aspect = viewport.width * CELL_ASPECT / viewport.height;
        }
    }

    /// Move the camera to the current orbit
    pub fn update_camera(&mut self) {
        self.camera.apply_orbit(&self.orbit);
    }
}

impl DisplayList for Scene {
    fn show_mesh(&mut self, mesh: &TriangleBuffer, bounds: Option<Aabb>) {
        if let Some(bounds) = bounds {
            self.camera.target = bounds.center();
            self.orbit = Orbit::facing(self.camera.framing_distance(&bounds));
            self.camera.frame_bounds(&bounds);
            self.update_camera();
        }
        self.mesh = Some(mesh.clone());
    }

    fn clear(&mut self) {
        self.mesh = None;
    }
}

/// ASCII renderer that converts 3D meshes to terminal characters
pub struct AsciiRenderer {
    width: usize,
    height: usize,
    depth_buffer: Vec<f32>,
    char_buffer: Vec<char>,
}

impl AsciiRenderer {
    pub fn new(width: usize, height: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            depth_buffer: vec![f32::INFINITY; size],
            char_buffer: vec![' '; size],
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width as f32, self.height as f32)
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        *self = Self::new(width, height);
    }

    pub fn clear(&mut self) {
        self.depth_buffer.fill(f32::INFINITY);
        self.char_buffer.fill(' ');
    }

    pub fn char_at(&self, x: usize, y: usize) -> Option<char> {
        (x < self.width && y < self.height).then(|| self.char_buffer[y * self.width + x])
    }

    pub fn render_mesh(&mut self, mesh: &TriangleBuffer, camera: &Camera) {
        let to_eye = (camera.position - camera.target)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::z);
        for triangle in &mesh.triangles {
            self.render_triangle(triangle, camera, &to_eye);
        }
    }

    fn render_triangle(&mut self, triangle: &Triangle, camera: &impl Projectable, to_eye: &Vector3<f32>) {
        let viewport = self.viewport();

        // Project vertices to screen space
        let mut screen_coords = [(0.0, 0.0, 0.0); 3];
        for (coords, vertex) in screen_coords.iter_mut().zip(&triangle.vertices) {
            let Some(ndc) = camera.project_to_ndc(&vertex.position) else {
                return; // Behind the viewer
            };
            let screen = viewport.ndc_to_screen(&ndc.xy());
            *coords = (screen.x, screen.y, ndc.z);
        }

        // Facet normal against the view direction
        let brightness = triangle.normal().dot(to_eye).max(0.0);

        // Map brightness to character
        let char_index = (brightness * (LUMINOSITY_RAMP.len() - 1) as f32) as usize;
        let char_index = char_index.min(LUMINOSITY_RAMP.len() - 1);
        let character = LUMINOSITY_RAMP[char_index];

        self.rasterize_triangle(&screen_coords, character);
    }

    fn rasterize_triangle(&mut self, coords: &[(f32, f32, f32); 3], character: char) {
        let [v0, v1, v2] = *coords;

        // Bounding box
        let min_x = v0.0.min(v1.0).min(v2.0).floor() as i32;
        let max_x = v0.0.max(v1.0).max(v2.0).ceil() as i32;
        let min_y = v0.1.min(v1.1).min(v2.1).floor() as i32;
        let max_y = v0.1.max(v1.1).max(v2.1).ceil() as i32;

        // Clip to screen bounds
        let min_x = min_x.max(0);
        let max_x = max_x.min(self.width as i32 - 1);
        let min_y = min_y.max(0);
        let max_y = max_y.min(self.height as i32 - 1);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;

                if let Some((w0, w1, w2)) = barycentric(
                    (v0.0, v0.1),
                    (v1.0, v1.1),
                    (v2.0, v2.1),
                    (px, py),
                ) {
                    if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                        let depth = w0 * v0.2 + w1 * v1.2 + w2 * v2.2;

                        let idx = y as usize * self.width + x as usize;
                        if depth < self.depth_buffer[idx] {
                            self.depth_buffer[idx] = depth;
                            self.char_buffer[idx] = character;
                        }
                    }
                }
            }
        }
    }

    pub fn draw<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for y in 0..self.height {
            writer.queue(cursor::MoveTo(0, y as u16))?;
            for x in 0..self.width {
                let c = self.char_buffer[y * self.width + x];

                // Color based on character intensity
                let color = match c {
                    ' ' | '.' | ':' => Color::DarkGrey,
                    '-' | '=' => Color::Grey,
                    '+' | '*' => Color::White,
                    '#' | '%' | '@' => Color::Cyan,
                    _ => Color::White,
                };

                writer.queue(SetForegroundColor(color))?;
                writer.queue(Print(c))?;
            }
        }
        writer.queue(ResetColor)?;
        Ok(())
    }
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(
    v0: (f32, f32),
    v1: (f32, f32),
    v2: (f32, f32),
    p: (f32, f32),
) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_barycentric_inside_and_degenerate() {
        let (w0, w1, w2) =
            barycentric((0.0, 0.0), (4.0, 0.0), (0.0, 4.0), (1.0, 1.0)).unwrap();
        assert!((w0 - 0.5).abs() < 1e-6);
        assert!((w1 - 0.25).abs() < 1e-6);
        assert!((w2 - 0.25).abs() < 1e-6);
        assert!(barycentric((0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (1.0, 1.0)).is_none());
    }

    #[test]
    fn test_cube_facing_camera_fills_center() {
        let mut scene = Scene::new(Camera::new(80, 24));
        let mut renderer = AsciiRenderer::new(80, 24);
        scene.set_viewport(&renderer.viewport());

        let mesh = TriangleBuffer::cube(2.0);
        scene.show_mesh(&mesh, mesh.bounds());
        renderer.render_mesh(scene.mesh.as_ref().unwrap(), &scene.camera);

        // +Z face points straight at the eye
        assert_eq!(renderer.char_at(40, 12), Some('@'));
        assert_eq!(renderer.char_at(0, 0), Some(' '));
        assert_eq!(renderer.char_at(80, 0), None);
    }

    #[test]
    fn test_show_mesh_frames_and_clear_removes() {
        let mut scene = Scene::new(Camera::default());
        let mesh = TriangleBuffer::cube(3.0);
        scene.show_mesh(&mesh, mesh.bounds());

        assert!((scene.orbit.distance - 6.0).abs() < 1e-5);
        assert!((scene.camera.position - Point3::new(0.0, 0.0, 6.0)).norm() < 1e-5);
        assert_eq!(scene.mesh.as_ref().map(|m| m.len()), Some(12));

        scene.clear();
        assert!(scene.mesh.is_none());
    }

    #[test]
    fn test_draw_writes_every_cell() {
        let renderer = AsciiRenderer::new(4, 2);
        let mut out = Vec::new();
        renderer.draw(&mut out).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert_eq!(text.matches(' ').count(), 8);
    }
}
