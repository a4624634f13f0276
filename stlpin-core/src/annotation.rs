/// Ordered collection of point annotations on the model surface
use log::debug;
use nalgebra::Point3;
use serde::Serialize;

use crate::error::AnnotationError;

/// Unique for the lifetime of the store that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AnnotationId(pub u64);

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A text note pinned to a point in mesh-local space
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub id: AnnotationId,
    /// Display ordinal: the store size at creation plus one
    pub label: u32,
    pub text: String,
    pub position: Point3<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    next_id: u64,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new annotation; blank text is rejected
    pub fn create(
        &mut self,
        position: Point3<f32>,
        text: impl Into<String>,
    ) -> Result<Annotation, AnnotationError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(AnnotationError::EmptyText);
        }

        self.next_id += 1;
        let annotation = Annotation {
            id: AnnotationId(self.next_id),
            label: self.annotations.len() as u32 + 1,
            text,
            position,
        };
        debug!("created annotation {} label {}", annotation.id, annotation.label);
        self.annotations.push(annotation.clone());
        Ok(annotation)
    }

    /// Replace the text of an existing annotation; `false` if it is absent
    pub fn update_text(&mut self, id: AnnotationId, text: impl Into<String>) -> bool {
        match self.annotations.iter_mut().find(|a| a.id == id) {
            Some(annotation) => {
                annotation.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Remove an annotation; the remaining labels are left as they are
    pub fn delete(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        Some(self.annotations.remove(index))
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    /// Annotations in insertion order
    pub fn list(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}
