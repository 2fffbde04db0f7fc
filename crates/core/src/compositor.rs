//! Flattens a document into an output PDF.
//!
//! Every page is rendered fresh at export resolution in its stored rotation.
//! Rectangle, ellipse and line shapes are painted onto that bitmap with
//! tiny-skia; text shapes become vector text runs placed in the same rotated
//! frame.

use crate::{ExportError, PageRasterizer, RenderError};
use pagedeck_engine::{OutputPage, PdfWriter, RgbaImage, TextRun};
use pagedeck_model::{
    Affine, AnnotationShape, Color, DocumentState, PageDimensions, PageModel, ShapeKind,
};
use tiny_skia::{
    ColorU8, FillRule, LineCap, Paint, Path, PathBuilder, Pixmap, Rect, Stroke, Transform,
};

/// One page ready to be written: bitmap plus the text drawn over it.
#[derive(Debug, Clone)]
pub struct ComposedPage {
    /// Page size in points, after rotation.
    pub size: PageDimensions,
    pub image: RgbaImage,
    pub text_runs: Vec<TextRun>,
}

impl ComposedPage {
    pub fn into_output_page(self) -> OutputPage {
        let mut page =
            OutputPage::blank(self.size.width, self.size.height).with_image(self.image);
        for run in self.text_runs {
            page = page.with_text(run);
        }
        page
    }
}

pub struct ExportCompositor<'a> {
    rasterizer: &'a dyn PageRasterizer,
    scale: f32,
}

impl<'a> ExportCompositor<'a> {
    /// `scale` is the export resolution in pixels per point.
    pub fn new(rasterizer: &'a dyn PageRasterizer, scale: f32) -> Self {
        Self { rasterizer, scale }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Renders `page` in its rotation and flattens its overlay onto it.
    pub fn composite_page(&self, page: &PageModel) -> Result<ComposedPage, RenderError> {
        let natural = self.rasterizer.page_size(page.source())?;
        let rotation = page.rotation();
        let size = rotation.rotated_size(natural);
        let image = self.rasterizer.rasterize(page.source(), rotation, self.scale)?;

        let frame = rotation.frame_transform(natural);
        let (width, height) = image.dimensions();
        let to_pixels = frame.then(&Affine::scale(
            width as f32 / size.width,
            height as f32 / size.height,
        ));
        // PDF user space has its origin at the bottom-left.
        let to_pdf = frame.then(&Affine::from_row(1.0, 0.0, 0.0, -1.0, 0.0, size.height));

        let mut pixmap = to_pixmap(&image)?;
        let mut text_runs = Vec::new();
        for shape in page.overlay().shapes() {
            match &shape.kind {
                ShapeKind::Text { content, font_size } => {
                    text_runs.push(text_run(shape, content, *font_size, &to_pdf));
                }
                _ => paint_shape(&mut pixmap, shape, to_skia(&to_pixels)),
            }
        }

        Ok(ComposedPage { size, image: from_pixmap(&pixmap), text_runs })
    }

    /// Composites every page in order and serializes the result.
    ///
    /// All or nothing: the first page that fails aborts the export.
    pub fn export(&self, document: &DocumentState) -> Result<Vec<u8>, ExportError> {
        if document.is_empty() {
            return Err(ExportError::Empty);
        }

        let mut writer = PdfWriter::new();
        for (index, page) in document.pages().iter().enumerate() {
            let composed = self.composite_page(page).map_err(|err| {
                log::warn!("export of page {} failed: {err}", index + 1);
                ExportError::Page { index, page: page.id(), reason: err.to_string() }
            })?;
            writer.add_page(composed.into_output_page());
        }

        let bytes = writer.finish()?;
        log::info!("exported {} pages ({} bytes)", document.len(), bytes.len());
        Ok(bytes)
    }
}

fn to_skia(affine: &Affine) -> Transform {
    Transform::from_row(affine.sx, affine.ky, affine.kx, affine.sy, affine.tx, affine.ty)
}

fn to_pixmap(image: &RgbaImage) -> Result<Pixmap, RenderError> {
    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        RenderError::Composite(format!("cannot allocate {width}x{height} canvas"))
    })?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

fn from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let color = src.demultiply();
        dst.0 = [color.red(), color.green(), color.blue(), color.alpha()];
    }
    image
}

fn paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

/// Path of a non-text shape in unrotated page space.
fn shape_path(shape: &AnnotationShape) -> Option<Path> {
    let (x, y) = (shape.position.x, shape.position.y);
    let (w, h) = (shape.size.width, shape.size.height);

    match shape.kind {
        ShapeKind::Line if w == 0.0 && h == 0.0 => None,
        ShapeKind::Rectangle | ShapeKind::Ellipse if w == 0.0 || h == 0.0 => None,
        ShapeKind::Line => {
            let mut builder = PathBuilder::new();
            builder.move_to(x, y);
            builder.line_to(x + w, y + h);
            builder.finish()
        }
        ShapeKind::Rectangle | ShapeKind::Ellipse => {
            // Sizes may be negative when a shape was dragged up or left.
            let rect = Rect::from_xywh(x.min(x + w), y.min(y + h), w.abs(), h.abs())?;
            if matches!(shape.kind, ShapeKind::Ellipse) {
                PathBuilder::from_oval(rect)
            } else {
                Some(PathBuilder::from_rect(rect))
            }
        }
        ShapeKind::Text { .. } => None,
    }
}

fn paint_shape(pixmap: &mut Pixmap, shape: &AnnotationShape, transform: Transform) {
    let Some(path) = shape_path(shape) else {
        log::debug!("skipping degenerate {} {}", shape.kind.name(), shape.id);
        return;
    };

    if let (Some(fill), false) = (shape.style.fill, matches!(shape.kind, ShapeKind::Line)) {
        pixmap.fill_path(&path, &paint(fill), FillRule::Winding, transform, None);
    }

    if shape.style.stroke_width > 0.0 {
        let stroke = Stroke {
            width: shape.style.stroke_width,
            line_cap: LineCap::Round,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint(shape.style.stroke), &stroke, transform, None);
    }
}

fn text_run(shape: &AnnotationShape, content: &str, font_size: f32, to_pdf: &Affine) -> TextRun {
    // Text space is y-up with its origin on the first baseline.
    let glyphs = Affine::from_row(
        1.0,
        0.0,
        0.0,
        -1.0,
        shape.position.x,
        shape.position.y + font_size,
    );
    let m = glyphs.then(to_pdf);
    let (r, g, b, _) = shape.style.stroke.to_normalized();

    TextRun {
        matrix: [m.sx, m.ky, m.kx, m.sy, m.tx, m.ty],
        font_size,
        color: [r, g, b],
        text: content.to_string(),
    }
}
