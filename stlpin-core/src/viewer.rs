/// Viewer controller: load lifecycle, picking and label placement
use log::{debug, info, warn};
use nalgebra::{Point2, Point3, Vector2};

use crate::annotation::{Annotation, AnnotationId, AnnotationStore};
use crate::error::{Error, FetchError, Result};
use crate::geometry::{Aabb, TriangleBuffer};
use crate::gesture::{Gesture, GestureClassifier};
use crate::projection::{Projectable, Raycastable, ScreenPosition, ScreenProjector, Viewport};
use crate::raycast::HitTester;
use crate::stl;

/// Rendering collaborator that displays the current mesh
pub trait DisplayList {
    /// Replace whatever is displayed with `mesh`
    fn show_mesh(&mut self, mesh: &TriangleBuffer, bounds: Option<Aabb>);
    /// Remove the displayed mesh
    fn clear(&mut self);
}

/// Identifies one load attempt; completions for older tickets are dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewerState {
    #[default]
    Idle,
    Loading {
        url: String,
    },
    Ready,
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded {
        triangles: usize,
        bounds: Option<Aabb>,
    },
    /// A newer load started after this one
    Superseded,
}

/// Everything tied to one successfully loaded model
#[derive(Debug)]
pub struct ViewerSession {
    generation: u64,
    url: String,
    mesh: TriangleBuffer,
    bounds: Option<Aabb>,
    annotations: AnnotationStore,
}

impl ViewerSession {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mesh(&self) -> &TriangleBuffer {
        &self.mesh
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }
}

/// A surface point picked by a click, waiting for its text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingAnnotation {
    generation: u64,
    pub position: Point3<f32>,
    pub triangle: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerOutcome {
    /// Release without a preceding press
    Ignored,
    Dragged,
    /// Click that did not hit the model
    Missed,
    Picked(PendingAnnotation),
}

/// Screen placement of one annotation label for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPlacement {
    pub id: AnnotationId,
    pub label: u32,
    pub screen: ScreenPosition,
}

/// Orchestrates decoding, picking and annotation for a single view
#[derive(Debug, Default)]
pub struct ViewerController {
    generation: u64,
    state: ViewerState,
    session: Option<ViewerSession>,
    gestures: GestureClassifier,
}

impl ViewerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn session(&self) -> Option<&ViewerSession> {
        self.session.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start loading `url`, discarding the current model and its annotations
    pub fn begin_load(&mut self, url: impl Into<String>, display: &mut impl DisplayList) -> LoadTicket {
        let url = url.into();
        self.discard(display);
        info!("loading {} (generation {})", url, self.generation);
        self.state = ViewerState::Loading { url: url.clone() };
        LoadTicket {
            generation: self.generation,
            url,
        }
    }

    /// Apply the result of a fetch started by `begin_load`.
    ///
    /// Each ticket completes once. Completions for superseded or already
    /// completed tickets leave the viewer untouched.
    pub fn complete_load(
        &mut self,
        ticket: &LoadTicket,
        fetched: std::result::Result<Vec<u8>, FetchError>,
        display: &mut impl DisplayList,
    ) -> Result<LoadOutcome> {
        if ticket.generation != self.generation {
            warn!(
                "dropping stale load of {} (generation {}, current {})",
                ticket.url, ticket.generation, self.generation
            );
            return Ok(LoadOutcome::Superseded);
        }
        if !matches!(self.state, ViewerState::Loading { .. }) {
            warn!(
                "ignoring repeated completion of {} (generation {})",
                ticket.url, ticket.generation
            );
            return Ok(LoadOutcome::Superseded);
        }

        let decoded = fetched
            .map_err(Error::from)
            .and_then(|bytes| stl::decode_centered(&bytes).map_err(Error::from));

        let mesh = match decoded {
            Ok(mesh) => mesh,
            Err(e) => {
                warn!("load of {} failed: {}", ticket.url, e);
                self.session = None;
                display.clear();
                self.state = ViewerState::Failed {
                    message: e.to_string(),
                };
                return Err(e);
            }
        };

        let bounds = mesh.bounds();
        let triangles = mesh.len();
        display.show_mesh(&mesh, bounds);
        info!("loaded {} triangles from {}", triangles, ticket.url);

        self.session = Some(ViewerSession {
            generation: ticket.generation,
            url: ticket.url.clone(),
            mesh,
            bounds,
            annotations: AnnotationStore::new(),
        });
        self.gestures.reset();
        self.state = ViewerState::Ready;
        Ok(LoadOutcome::Loaded { triangles, bounds })
    }

    /// Withdraw the model; any load still in flight becomes stale
    pub fn teardown(&mut self, display: &mut impl DisplayList) {
        self.discard(display);
        self.state = ViewerState::Idle;
    }

    fn discard(&mut self, display: &mut impl DisplayList) {
        self.generation += 1;
        if self.session.take().is_some() {
            display.clear();
        }
        self.gestures.reset();
    }

    pub fn pointer_down(&mut self, position: Point2<f32>) {
        self.gestures.pointer_down(position);
    }

    /// Incremental drag delta, for hosts that orbit the camera
    pub fn pointer_move(&mut self, position: Point2<f32>) -> Option<Vector2<f32>> {
        self.gestures.pointer_move(position)
    }

    /// Finish a gesture; a click runs the hit test against the current model
    pub fn pointer_up(
        &mut self,
        position: Point2<f32>,
        camera: &impl Raycastable,
        viewport: &Viewport,
    ) -> PointerOutcome {
        let pointer = match self.gestures.pointer_up(position) {
            None => return PointerOutcome::Ignored,
            Some(Gesture::Drag) => return PointerOutcome::Dragged,
            Some(Gesture::Click(pointer)) => pointer,
        };

        let Some(session) = &self.session else {
            return PointerOutcome::Missed;
        };

        match HitTester::test(&pointer, viewport, camera, &session.mesh) {
            Some(hit) => PointerOutcome::Picked(PendingAnnotation {
                generation: session.generation,
                position: hit.point,
                triangle: hit.triangle,
            }),
            None => {
                debug!("click at {:?} missed the model", pointer);
                PointerOutcome::Missed
            }
        }
    }

    /// Create the annotation for a picked point once its text is known
    pub fn commit_annotation(&mut self, pending: &PendingAnnotation, text: &str) -> Result<Annotation> {
        let session = self
            .session
            .as_mut()
            .filter(|s| s.generation == pending.generation)
            .ok_or(Error::StaleSession)?;
        Ok(session.annotations.create(pending.position, text)?)
    }

    pub fn update_annotation(&mut self, id: AnnotationId, text: &str) -> Result<bool> {
        let session = self.session.as_mut().ok_or(Error::NoSession)?;
        Ok(session.annotations.update_text(id, text))
    }

    pub fn delete_annotation(&mut self, id: AnnotationId) -> Result<Option<Annotation>> {
        let session = self.session.as_mut().ok_or(Error::NoSession)?;
        Ok(session.annotations.delete(id))
    }

    /// Annotations of the current model in insertion order
    pub fn annotations(&self) -> &[Annotation] {
        self.session
            .as_ref()
            .map(|s| s.annotations.list())
            .unwrap_or(&[])
    }

    /// Recompute every label's screen position for this frame.
    ///
    /// `out` is cleared and refilled so callers can reuse its allocation.
    pub fn project_labels(
        &self,
        camera: &impl Projectable,
        viewport: &Viewport,
        out: &mut Vec<LabelPlacement>,
    ) {
        out.clear();
        out.extend(self.annotations().iter().map(|annotation| LabelPlacement {
            id: annotation.id,
            label: annotation.label,
            screen: ScreenProjector::project(&annotation.position, camera, viewport),
        }));
    }
}
