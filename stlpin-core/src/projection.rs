/// Camera capabilities and the screen-space mapping for annotation labels
use nalgebra::{Point2, Point3};

use crate::raycast::Ray;

/// Maps world points to normalized device coordinates
pub trait Projectable {
    /// `None` when the point is behind the viewer
    fn project_to_ndc(&self, point: &Point3<f32>) -> Option<Point3<f32>>;
}

/// Produces world-space rays through normalized device coordinates
pub trait Raycastable {
    /// `None` when the camera transform cannot be inverted
    fn unproject_ray(&self, ndc: &Point2<f32>) -> Option<Ray>;
}

/// Current drawable area in screen units (pixels, or cells for the terminal)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Screen position (y down) to NDC (y up)
    pub fn pointer_to_ndc(&self, pointer: &Point2<f32>) -> Point2<f32> {
        Point2::new(
            pointer.x / self.width * 2.0 - 1.0,
            1.0 - pointer.y / self.height * 2.0,
        )
    }

    /// NDC (y up) to screen position (y down)
    pub fn ndc_to_screen(&self, ndc: &Point2<f32>) -> Point2<f32> {
        Point2::new(
            (ndc.x * 0.5 + 0.5) * self.width,
            (-ndc.y * 0.5 + 0.5) * self.height,
        )
    }

    pub fn contains(&self, point: &Point2<f32>) -> bool {
        (0.0..self.width).contains(&point.x) && (0.0..self.height).contains(&point.y)
    }
}

/// Result of projecting a label anchor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScreenPosition {
    OnScreen(Point2<f32>),
    /// Behind the viewer; the label must be hidden
    OffScreen,
}

impl ScreenPosition {
    pub fn on_screen(&self) -> Option<Point2<f32>> {
        match self {
            ScreenPosition::OnScreen(point) => Some(*point),
            ScreenPosition::OffScreen => None,
        }
    }
}

/// Re-projects 3D anchors into 2D every frame
pub struct ScreenProjector;

impl ScreenProjector {
    /// Project a 3D point to screen space.
    ///
    /// Points in front of the camera but outside the view still get a
    /// coordinate; only points behind the viewer are reported off-screen.
    pub fn project(
        point: &Point3<f32>,
        camera: &impl Projectable,
        viewport: &Viewport,
    ) -> ScreenPosition {
        match camera.project_to_ndc(point) {
            Some(ndc) => ScreenPosition::OnScreen(viewport.ndc_to_screen(&ndc.xy())),
            None => ScreenPosition::OffScreen,
        }
    }
}
