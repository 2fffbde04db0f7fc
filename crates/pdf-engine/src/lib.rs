use image::{ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use pagedeck_model::Rotation;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

mod writer;

pub use writer::{OutputPage, PdfWriter, TextRun, WriteError};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

const PAGE_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);
const FRAME_COLOR: Rgba<u8> = Rgba([220, 220, 220, 255]);
const MARKER_COLOR: Rgba<u8> = Rgba([40, 40, 40, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    /// Pixels per point.
    pub scale: f32,
    pub rotation: Rotation,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0, rotation: Rotation::Deg0 }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Source-document capability: parse documents and rasterize their pages.
pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;
    /// Renders one page at `request.scale` pixels per point, already rotated.
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    page_sizes: Vec<PageSize>,
}

/// lopdf-backed engine.
///
/// Page geometry comes from the parsed document; rasterization is a
/// placeholder that draws the page frame plus a marker in the page's natural
/// top-left corner, so orientation survives into thumbnails and exports.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (number, object_id) in pages {
            let media_box = inherited(&doc, object_id, b"MediaBox")?.ok_or_else(|| {
                PdfEngineError::Backend(format!("page {number} has no MediaBox"))
            })?;
            sizes.push(media_box_size(&doc, media_box)?);
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        Ok(sizes)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        log::debug!("opened document {} with {} pages", handle.raw(), page_sizes.len());
        self.docs.insert(handle, DocumentRecord { page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let record = self.record(handle)?;
        record.page_sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: record.page_sizes.len() as u32,
        })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page_size = self.page_size(handle, request.page_index)?;
        let scale = if request.scale <= 0.0 { 1.0 } else { request.scale };

        let width = (page_size.width_pt * scale).round().max(1.0) as u32;
        let height = (page_size.height_pt * scale).round().max(1.0) as u32;

        let mut image = RgbaImage::from_pixel(width, height, PAGE_FILL);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, FRAME_COLOR);
                image.put_pixel(x, height - 1, FRAME_COLOR);
            }
            for y in 0..height {
                image.put_pixel(0, y, FRAME_COLOR);
                image.put_pixel(width - 1, y, FRAME_COLOR);
            }

            let marker = (width.min(height) / 8).max(1);
            for y in 1..=marker.min(height - 2) {
                for x in 1..=marker.min(width - 2) {
                    image.put_pixel(x, y, MARKER_COLOR);
                }
            }
        }

        Ok(rotate_image(image, request.rotation))
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

/// Page tree depth past which a `/Parent` chain is treated as a cycle.
const MAX_TREE_DEPTH: usize = 64;

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, PdfEngineError> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// Looks `key` up on the page, then up the page tree through `/Parent`.
fn inherited<'a>(
    doc: &'a Document,
    page: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, PdfEngineError> {
    let mut current = page;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current)?;
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value).map(Some);
        }
        match dict.get(b"Parent") {
            Ok(parent) => current = parent.as_reference()?,
            Err(_) => return Ok(None),
        }
    }
    Err(PdfEngineError::Backend("page tree /Parent chain is too deep".to_owned()))
}

fn media_box_size(doc: &Document, media_box: &Object) -> Result<PageSize, PdfEngineError> {
    let array = media_box.as_array()?;
    if array.len() != 4 {
        return Err(PdfEngineError::Backend(format!(
            "MediaBox has {} entries, expected 4",
            array.len()
        )));
    }

    let mut coords = [0.0f32; 4];
    for (coord, value) in coords.iter_mut().zip(array) {
        *coord = match resolve(doc, value)? {
            Object::Integer(value) => *value as f32,
            Object::Real(value) => *value,
            other => {
                return Err(PdfEngineError::Backend(format!(
                    "MediaBox entry is not a number: {other:?}"
                )))
            }
        };
    }
    let [x0, y0, x1, y1] = coords;

    let size = PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() };
    if size.width_pt <= 0.0 || size.height_pt <= 0.0 {
        return Err(PdfEngineError::Backend("MediaBox has zero area".to_owned()));
    }
    Ok(size)
}

/// Rotates a rendered page clockwise into its display orientation.
pub fn rotate_image(image: RgbaImage, rotation: Rotation) -> RgbaImage {
    match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => image::imageops::rotate90(&image),
        Rotation::Deg180 => image::imageops::rotate180(&image),
        Rotation::Deg270 => image::imageops::rotate270(&image),
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pdf_bytes(sizes: &[(f32, f32)]) -> Vec<u8> {
        let mut writer = PdfWriter::new();
        for &(width, height) in sizes {
            writer.add_page(OutputPage::blank(width, height));
        }
        writer.finish().expect("fixture should serialize")
    }

    /// Two pages under one `/Pages` node. The node carries `tree_box` as an
    /// indirect object; each page may override it with its own MediaBox.
    fn page_tree_pdf_bytes(
        tree_box: Option<[i64; 4]>,
        page_boxes: [Option<[i64; 4]>; 2],
    ) -> Vec<u8> {
        use lopdf::dictionary;

        let to_array = |values: [i64; 4]| Object::Array(values.iter().map(|&v| v.into()).collect());

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = page_boxes
            .iter()
            .map(|page_box| {
                let mut page = dictionary! { "Type" => "Page", "Parent" => pages_id };
                if let Some(values) = page_box {
                    page.set("MediaBox", to_array(*values));
                }
                Object::from(doc.add_object(page))
            })
            .collect();

        let mut pages = dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => 2 };
        if let Some(values) = tree_box {
            let box_id = doc.add_object(to_array(values));
            pages.set("MediaBox", box_id);
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("fixture should serialize");
        bytes
    }

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes(&[(100.0, 200.0), (300.0, 400.0)])))
            .expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 2);
        assert_eq!(
            engine.page_size(handle, 1).expect("size should succeed"),
            PageSize { width_pt: 300.0, height_pt: 400.0 }
        );
    }

    #[test]
    fn render_page_swaps_dimensions_when_sideways() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes(&[(100.0, 200.0)])))
            .expect("open should succeed");

        let upright = engine
            .render_page(handle, RenderRequest { page_index: 0, scale: 0.5, rotation: Rotation::Deg0 })
            .expect("render should succeed");
        let sideways = engine
            .render_page(handle, RenderRequest { page_index: 0, scale: 0.5, rotation: Rotation::Deg90 })
            .expect("render should succeed");

        assert_eq!(upright.dimensions(), (50, 100));
        assert_eq!(sideways.dimensions(), (100, 50));
    }

    #[test]
    fn orientation_marker_follows_rotation() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes(&[(80.0, 160.0)])))
            .expect("open should succeed");

        let render = |rotation| {
            engine
                .render_page(handle, RenderRequest { page_index: 0, scale: 1.0, rotation })
                .expect("render should succeed")
        };

        let upright = render(Rotation::Deg0);
        assert_eq!(*upright.get_pixel(3, 3), MARKER_COLOR);

        // Clockwise quarter turn carries the natural top-left to the top-right.
        let quarter = render(Rotation::Deg90);
        assert_eq!(*quarter.get_pixel(quarter.width() - 4, 3), MARKER_COLOR);
        assert_eq!(*quarter.get_pixel(3, 3), PAGE_FILL);

        let half = render(Rotation::Deg180);
        assert_eq!(*half.get_pixel(half.width() - 4, half.height() - 4), MARKER_COLOR);
    }

    #[test]
    fn media_box_is_inherited_from_page_tree() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(page_tree_pdf_bytes(
                Some([0, 0, 200, 100]),
                [None, Some([0, 0, 50, 80])],
            )))
            .expect("open should succeed");

        assert_eq!(
            engine.page_size(handle, 0).expect("size should succeed"),
            PageSize { width_pt: 200.0, height_pt: 100.0 }
        );
        // A page's own MediaBox wins over the inherited one.
        assert_eq!(
            engine.page_size(handle, 1).expect("size should succeed"),
            PageSize { width_pt: 50.0, height_pt: 80.0 }
        );
    }

    #[test]
    fn missing_media_box_is_an_error() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(page_tree_pdf_bytes(None, [Some([0, 0, 10, 10]), None])))
            .expect_err("a page without MediaBox must not open");

        assert!(matches!(err, PdfEngineError::Backend(message) if message.contains("MediaBox")));
    }

    #[test]
    fn page_out_of_range_is_reported() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes(&[(100.0, 100.0)])))
            .expect("open should succeed");

        let err = engine.page_size(handle, 3).expect_err("page 3 does not exist");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 3, page_count: 1 }));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"not a pdf at all".to_vec()))
            .expect_err("garbage must not open");

        assert!(matches!(err, PdfEngineError::Parse(_)));
    }

    #[test]
    fn encrypted_marker_is_rejected() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"%PDF-1.5\n/Encrypt 5 0 R\n".to_vec()))
            .expect_err("encrypted must not open");

        assert!(matches!(err, PdfEngineError::EncryptedUnsupported));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }

    #[test]
    fn close_releases_handle() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes(&[(100.0, 100.0)])))
            .expect("open should succeed");

        engine.close(handle).expect("close should succeed");
        assert!(matches!(engine.close(handle), Err(PdfEngineError::InvalidHandle(_))));
    }
}
