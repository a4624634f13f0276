/// stlpin core library - STL decoding and surface annotation
///
/// This library holds the host-independent parts of the viewer: the STL
/// decoder, camera projection and ray casting, click/drag classification,
/// the annotation store and the controller that ties them together.

pub mod annotation;
pub mod camera;
pub mod error;
pub mod geometry;
pub mod gesture;
pub mod projection;
pub mod raycast;
pub mod stl;
pub mod transform;
pub mod viewer;

// Re-export commonly used types
pub use annotation::{Annotation, AnnotationId, AnnotationStore};
pub use camera::{Camera, ProjectionMode};
pub use error::{AnnotationError, Error, FetchError, Result, StlError};
pub use geometry::{Aabb, Triangle, TriangleBuffer, Vertex};
pub use gesture::{Gesture, GestureClassifier, GesturePhase, DRAG_THRESHOLD};
pub use projection::{Projectable, Raycastable, ScreenPosition, ScreenProjector, Viewport};
pub use raycast::{Hit, HitTester, Ray};
pub use transform::Orbit;
pub use viewer::{
    DisplayList, LabelPlacement, LoadOutcome, LoadTicket, PendingAnnotation, PointerOutcome,
    ViewerController, ViewerSession, ViewerState,
};
