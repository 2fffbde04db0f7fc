//! Per-page annotation overlay.
//!
//! Shapes are plain values stored in unrotated page space; whatever draws them
//! (screen preview or export compositor) derives its transform from the
//! page's rotation and never writes coordinates back.

use crate::{EditError, EditResult, PagePoint, ShapeSize};
use serde::{Deserialize, Serialize};

/// Unique identifier for an annotation shape.
pub type ShapeId = uuid::Uuid;

/// 8-bit RGBA. Alpha applies to painted shapes; text is always opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };

    /// Channels scaled to `0.0..=1.0`.
    pub fn to_normalized(&self) -> (f32, f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    pub stroke: Color,
    pub stroke_width: f32,
    #[serde(default)]
    pub fill: Option<Color>,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self { stroke: Color::BLACK, stroke_width: 1.0, fill: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeKind {
    /// Text box; `position` is its top-left corner, `size` the box it wraps in.
    Text { content: String, font_size: f32 },
    Rectangle,
    /// Ellipse inscribed in the shape's bounding box.
    Ellipse,
    /// Line from `position` to `position + size`.
    Line,
}

impl ShapeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Rectangle => "rectangle",
            Self::Ellipse => "ellipse",
            Self::Line => "line",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationShape {
    pub id: ShapeId,
    pub kind: ShapeKind,
    pub position: PagePoint,
    pub size: ShapeSize,
    #[serde(default)]
    pub style: ShapeStyle,
}

/// A shape as supplied by the caller, before the overlay assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShape {
    pub kind: ShapeKind,
    pub position: PagePoint,
    #[serde(default)]
    pub size: ShapeSize,
    #[serde(default)]
    pub style: ShapeStyle,
}

impl NewShape {
    pub fn text(content: impl Into<String>, position: PagePoint) -> Self {
        Self {
            kind: ShapeKind::Text { content: content.into(), font_size: 12.0 },
            position,
            size: ShapeSize::new(200.0, 16.0),
            style: ShapeStyle::default(),
        }
    }

    pub fn rectangle(position: PagePoint, size: ShapeSize) -> Self {
        Self { kind: ShapeKind::Rectangle, position, size, style: ShapeStyle::default() }
    }

    pub fn ellipse(position: PagePoint, size: ShapeSize) -> Self {
        Self { kind: ShapeKind::Ellipse, position, size, style: ShapeStyle::default() }
    }

    pub fn line(from: PagePoint, to: PagePoint) -> Self {
        Self {
            kind: ShapeKind::Line,
            position: from,
            size: ShapeSize::new(to.x - from.x, to.y - from.y),
            style: ShapeStyle::default(),
        }
    }

    pub fn with_style(mut self, style: ShapeStyle) -> Self {
        self.style = style;
        self
    }
}

/// Partial update merged into an existing shape; `None` fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeUpdate {
    #[serde(default)]
    pub position: Option<PagePoint>,
    #[serde(default)]
    pub size: Option<ShapeSize>,
    #[serde(default)]
    pub style: Option<ShapeStyle>,
    /// Replacement text; only valid for text shapes.
    #[serde(default)]
    pub text: Option<String>,
}

impl ShapeUpdate {
    pub fn position(position: PagePoint) -> Self {
        Self { position: Some(position), ..Self::default() }
    }

    pub fn with_size(mut self, size: ShapeSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_style(mut self, style: ShapeStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Ordered list of shapes for one page. List order is paint order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationOverlay {
    shapes: Vec<AnnotationShape>,
}

impl AnnotationOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shapes(&self) -> &[AnnotationShape] {
        &self.shapes
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn get(&self, id: ShapeId) -> Option<&AnnotationShape> {
        self.shapes.iter().find(|shape| shape.id == id)
    }

    fn position_of(&self, id: ShapeId) -> EditResult<usize> {
        self.shapes.iter().position(|shape| shape.id == id).ok_or(EditError::ShapeNotFound(id))
    }

    pub fn add_shape(&mut self, shape: NewShape) -> ShapeId {
        let id = ShapeId::new_v4();
        self.shapes.push(AnnotationShape {
            id,
            kind: shape.kind,
            position: shape.position,
            size: shape.size,
            style: shape.style,
        });
        id
    }

    pub fn update_shape(&mut self, id: ShapeId, update: ShapeUpdate) -> EditResult<()> {
        let index = self.position_of(id)?;
        let shape = &mut self.shapes[index];

        // Validate before touching anything so a rejected update is a no-op.
        if update.text.is_some() && !matches!(shape.kind, ShapeKind::Text { .. }) {
            return Err(EditError::InvalidArgument(format!(
                "cannot set text on a {} shape",
                shape.kind.name()
            )));
        }

        if let Some(position) = update.position {
            shape.position = position;
        }
        if let Some(size) = update.size {
            shape.size = size;
        }
        if let Some(style) = update.style {
            shape.style = style;
        }
        if let (Some(text), ShapeKind::Text { content, .. }) = (update.text, &mut shape.kind) {
            *content = text;
        }

        Ok(())
    }

    pub fn remove_shape(&mut self, id: ShapeId) -> EditResult<AnnotationShape> {
        let index = self.position_of(id)?;
        Ok(self.shapes.remove(index))
    }

    pub fn bring_to_front(&mut self, id: ShapeId) -> EditResult<()> {
        let index = self.position_of(id)?;
        let shape = self.shapes.remove(index);
        self.shapes.push(shape);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.shapes.clear();
    }

    /// Copy of this overlay with freshly minted shape ids.
    pub fn duplicated(&self) -> Self {
        Self {
            shapes: self
                .shapes
                .iter()
                .map(|shape| AnnotationShape { id: ShapeId::new_v4(), ..shape.clone() })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_shape_mints_distinct_ids_and_appends() {
        let mut overlay = AnnotationOverlay::new();
        let first = overlay.add_shape(NewShape::text("hello", PagePoint::new(10.0, 10.0)));
        let second =
            overlay.add_shape(NewShape::rectangle(PagePoint::new(0.0, 0.0), ShapeSize::new(5.0, 5.0)));

        assert_ne!(first, second);
        assert_eq!(overlay.len(), 2);
        assert_eq!(overlay.shapes()[0].id, first);
        assert_eq!(overlay.shapes()[1].id, second);
    }

    #[test]
    fn update_shape_merges_only_given_fields() {
        let mut overlay = AnnotationOverlay::new();
        let id = overlay.add_shape(NewShape::text("draft", PagePoint::new(1.0, 2.0)));

        overlay
            .update_shape(id, ShapeUpdate::position(PagePoint::new(30.0, 40.0)).with_text("final"))
            .expect("update should succeed");

        let shape = overlay.get(id).expect("shape present");
        assert_eq!(shape.position, PagePoint::new(30.0, 40.0));
        assert_eq!(shape.size, ShapeSize::new(200.0, 16.0));
        assert!(matches!(&shape.kind, ShapeKind::Text { content, .. } if content == "final"));
    }

    #[test]
    fn update_unknown_shape_is_not_found() {
        let mut overlay = AnnotationOverlay::new();
        let missing = ShapeId::new_v4();

        let err = overlay.update_shape(missing, ShapeUpdate::default()).expect_err("must fail");
        assert_eq!(err, EditError::ShapeNotFound(missing));
    }

    #[test]
    fn text_update_on_rectangle_is_rejected_without_side_effects() {
        let mut overlay = AnnotationOverlay::new();
        let id =
            overlay.add_shape(NewShape::rectangle(PagePoint::new(0.0, 0.0), ShapeSize::new(5.0, 5.0)));
        let before = overlay.clone();

        let err = overlay
            .update_shape(id, ShapeUpdate::position(PagePoint::new(9.0, 9.0)).with_text("nope"))
            .expect_err("must fail");

        assert!(matches!(err, EditError::InvalidArgument(_)));
        assert_eq!(overlay, before);
    }

    #[test]
    fn remove_and_reorder_shapes() {
        let mut overlay = AnnotationOverlay::new();
        let a = overlay.add_shape(NewShape::line(PagePoint::new(0.0, 0.0), PagePoint::new(5.0, 5.0)));
        let b = overlay.add_shape(NewShape::ellipse(PagePoint::new(1.0, 1.0), ShapeSize::new(2.0, 2.0)));
        let c = overlay.add_shape(NewShape::text("c", PagePoint::new(3.0, 3.0)));

        overlay.bring_to_front(a).expect("present");
        let order: Vec<_> = overlay.shapes().iter().map(|shape| shape.id).collect();
        assert_eq!(order, vec![b, c, a]);

        let removed = overlay.remove_shape(c).expect("present");
        assert_eq!(removed.id, c);
        assert!(overlay.remove_shape(c).expect_err("already removed").is_not_found());
    }

    #[test]
    fn duplicated_overlay_keeps_content_with_new_ids() {
        let mut overlay = AnnotationOverlay::new();
        let id = overlay.add_shape(NewShape::text("copy me", PagePoint::new(4.0, 4.0)));

        let copy = overlay.duplicated();
        assert_eq!(copy.len(), 1);
        assert_ne!(copy.shapes()[0].id, id);
        assert_eq!(copy.shapes()[0].kind, overlay.shapes()[0].kind);
        assert_eq!(copy.shapes()[0].position, overlay.shapes()[0].position);
    }

    #[test]
    fn line_size_is_the_delta_between_endpoints() {
        let shape = NewShape::line(PagePoint::new(10.0, 20.0), PagePoint::new(4.0, 50.0));
        assert_eq!(shape.size, ShapeSize::new(-6.0, 30.0));
    }
}
