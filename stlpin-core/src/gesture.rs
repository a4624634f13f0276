/// Click versus drag classification for pointer input
use log::debug;
use nalgebra::{Point2, Vector2};

/// Movement (in screen units) tolerated before a press becomes a drag
pub const DRAG_THRESHOLD: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GesturePhase {
    #[default]
    Idle,
    Pressed,
    Dragging,
}

/// Outcome emitted on pointer release
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// Released within the threshold, at the last pointer position
    Click(Point2<f32>),
    Drag,
}

/// Turns pointer down/move/up events into clicks and drags
#[derive(Debug, Clone, Default)]
pub struct GestureClassifier {
    phase: GesturePhase,
    press_origin: Option<Point2<f32>>,
    last_position: Option<Point2<f32>>,
}

impl GestureClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn press_origin(&self) -> Option<Point2<f32>> {
        self.press_origin
    }

    pub fn pointer_down(&mut self, position: Point2<f32>) {
        self.phase = GesturePhase::Pressed;
        self.press_origin = Some(position);
        self.last_position = Some(position);
    }

    /// Track movement; returns the incremental delta while dragging
    pub fn pointer_move(&mut self, position: Point2<f32>) -> Option<Vector2<f32>> {
        let previous = self.last_position?;
        match self.phase {
            GesturePhase::Idle => return None,
            GesturePhase::Pressed => {
                let origin = self.press_origin.unwrap_or(previous);
                if nalgebra::distance(&origin, &position) <= DRAG_THRESHOLD {
                    self.last_position = Some(position);
                    return None;
                }
                debug!("press at {:?} became a drag", origin);
                self.phase = GesturePhase::Dragging;
                self.last_position = Some(position);
                Some(position - origin)
            }
            GesturePhase::Dragging => {
                self.last_position = Some(position);
                Some(position - previous)
            }
        }
    }

    /// Finish the gesture; `None` if no press was in progress
    pub fn pointer_up(&mut self, position: Point2<f32>) -> Option<Gesture> {
        let phase = self.phase;
        let last = self.last_position.unwrap_or(position);
        self.reset();

        match phase {
            GesturePhase::Idle => None,
            GesturePhase::Pressed => Some(Gesture::Click(last)),
            GesturePhase::Dragging => Some(Gesture::Drag),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
