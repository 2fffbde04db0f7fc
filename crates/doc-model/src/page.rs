use crate::{Affine, AnnotationOverlay, EditError, EditResult, PageDimensions, PagePoint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable page identity, independent of the page's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

/// Identifies a loaded source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Where a page's content is rasterized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: SourceId,
    pub page_index: u32,
}

impl SourceRef {
    pub fn new(source: SourceId, page_index: u32) -> Self {
        Self { source, page_index }
    }
}

/// Clockwise page rotation relative to the source page's natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270];

    /// Converts a rotation in degrees, accepting any multiple of 90 (negative
    /// values rotate counter-clockwise).
    pub fn from_degrees(degrees: i32) -> EditResult<Self> {
        if degrees % 90 != 0 {
            return Err(EditError::InvalidArgument(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            )));
        }

        Ok(Self::from_quarter_turns(degrees / 90))
    }

    fn from_quarter_turns(turns: i32) -> Self {
        Self::ALL[turns.rem_euclid(4) as usize]
    }

    fn quarter_turns(self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 1,
            Self::Deg180 => 2,
            Self::Deg270 => 3,
        }
    }

    pub fn degrees(self) -> u16 {
        self.quarter_turns() as u16 * 90
    }

    /// `(self + delta) mod 360`. Fails when `delta` is not a multiple of 90.
    pub fn rotate_by(self, delta: i32) -> EditResult<Self> {
        let delta = Self::from_degrees(delta)?;
        Ok(Self::from_quarter_turns(self.quarter_turns() + delta.quarter_turns()))
    }

    /// True when the page's width and height are swapped on screen.
    pub fn is_sideways(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }

    pub fn rotated_size(self, page: PageDimensions) -> PageDimensions {
        if self.is_sideways() {
            PageDimensions::new(page.height, page.width)
        } else {
            page
        }
    }

    /// Transform from unrotated page space into the rotated frame.
    ///
    /// Display-only: shapes keep their stored coordinates and the renderer
    /// applies this on the way out.
    pub fn frame_transform(self, page: PageDimensions) -> Affine {
        let (w, h) = (page.width, page.height);
        match self {
            Self::Deg0 => Affine::IDENTITY,
            Self::Deg90 => Affine::from_row(0.0, 1.0, -1.0, 0.0, h, 0.0),
            Self::Deg180 => Affine::from_row(-1.0, 0.0, 0.0, -1.0, w, h),
            Self::Deg270 => Affine::from_row(0.0, -1.0, 1.0, 0.0, 0.0, w),
        }
    }

    pub fn map_point(self, point: PagePoint, page: PageDimensions) -> PagePoint {
        self.frame_transform(page).apply(point)
    }
}

impl TryFrom<u16> for Rotation {
    type Error = EditError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value >= 360 {
            return Err(EditError::InvalidArgument(format!("rotation {value} is not below 360")));
        }
        Self::from_degrees(value as i32)
    }
}

impl From<Rotation> for u16 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// One page of the document being edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageModel {
    pub(crate) id: PageId,
    pub(crate) source: SourceRef,
    pub(crate) rotation: Rotation,
    pub(crate) overlay: AnnotationOverlay,
}

impl PageModel {
    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn source(&self) -> SourceRef {
        self.source
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn overlay(&self) -> &AnnotationOverlay {
        &self.overlay
    }

    pub(crate) fn from_template(id: PageId, template: PageTemplate) -> Self {
        Self { id, source: template.source, rotation: template.rotation, overlay: template.overlay }
    }
}

/// Content for a page about to be inserted; the document mints its id.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTemplate {
    pub source: SourceRef,
    pub rotation: Rotation,
    pub overlay: AnnotationOverlay,
}

impl PageTemplate {
    pub fn new(source: SourceRef) -> Self {
        Self { source, rotation: Rotation::Deg0, overlay: AnnotationOverlay::new() }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_overlay(mut self, overlay: AnnotationOverlay) -> Self {
        self.overlay = overlay;
        self
    }
}

impl From<SourceRef> for PageTemplate {
    fn from(source: SourceRef) -> Self {
        Self::new(source)
    }
}
