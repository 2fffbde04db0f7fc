//! Output document assembly.
//!
//! Every page is a full-bleed raster image with optional vector text runs on
//! top. Text uses the standard Helvetica font in WinAnsiEncoding, so only
//! characters that encoding covers survive; others are written as `?`.

use crate::RgbaImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

const FONT_RESOURCE: &str = "F1";

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("cannot write a document without pages")]
    Empty,
    #[error("invalid page size {width}x{height}")]
    InvalidPageSize { width: f32, height: f32 },
    #[error("PDF encoding error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One line of text placed with a PDF text matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Text matrix `[a b c d e f]` in PDF user space (origin bottom-left).
    pub matrix: [f32; 6],
    pub font_size: f32,
    /// Fill color, components in `0.0..=1.0`.
    pub color: [f32; 3],
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct OutputPage {
    pub width_pt: f32,
    pub height_pt: f32,
    /// Stretched over the whole page when present.
    pub image: Option<RgbaImage>,
    pub text_runs: Vec<TextRun>,
}

impl OutputPage {
    pub fn blank(width_pt: f32, height_pt: f32) -> Self {
        Self { width_pt, height_pt, image: None, text_runs: Vec::new() }
    }

    pub fn with_image(mut self, image: RgbaImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_text(mut self, run: TextRun) -> Self {
        self.text_runs.push(run);
        self
    }
}

/// Collects pages and serializes them into a new PDF.
#[derive(Debug, Default)]
pub struct PdfWriter {
    pages: Vec<OutputPage>,
}

impl PdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&mut self, page: OutputPage) {
        self.pages.push(page);
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn finish(self) -> Result<Vec<u8>, WriteError> {
        if self.pages.is_empty() {
            return Err(WriteError::Empty);
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let page_id = write_page(&mut doc, pages_id, font_id, page)?;
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf)?;
        log::debug!("wrote {} pages ({} bytes)", self.pages.len(), buf.len());
        Ok(buf)
    }
}

fn write_page(
    doc: &mut Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    page: &OutputPage,
) -> Result<ObjectId, WriteError> {
    let (width, height) = (page.width_pt, page.height_pt);
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return Err(WriteError::InvalidPageSize { width, height });
    }

    let mut operations = Vec::new();
    let mut xobjects = lopdf::Dictionary::new();

    if let Some(image) = &page.image {
        let image_id = doc.add_object(image_stream(image));
        xobjects.set("Im0", image_id);
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            vec![width.into(), 0.into(), 0.into(), height.into(), 0.into(), 0.into()],
        ));
        operations.push(Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]));
        operations.push(Operation::new("Q", vec![]));
    }

    for run in &page.text_runs {
        let [r, g, b] = run.color;
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), run.font_size.into()],
        ));
        operations.push(Operation::new("Tm", run.matrix.iter().map(|&v| v.into()).collect()));
        operations.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(&run.text))]));
        operations.push(Operation::new("ET", vec![]));
    }

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { FONT_RESOURCE => font_id },
            "XObject" => xobjects,
        },
    });

    Ok(page_id)
}

fn image_stream(image: &RgbaImage) -> Stream {
    let (width, height) = image.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for pixel in image.pixels() {
        // Flatten onto white; exported page images are opaque.
        let alpha = pixel[3] as u32;
        for channel in &pixel.0[..3] {
            rgb.push(((*channel as u32 * alpha + 255 * (255 - alpha)) / 255) as u8);
        }
    }

    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb,
    )
}

/// Encodes `text` as WinAnsiEncoding bytes.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(ch: char) -> u8 {
    match ch {
        ' '..='~' | '\u{a0}'..='\u{ff}' => ch as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8a,
        '‹' => 0x8b,
        'Œ' => 0x8c,
        'Ž' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '•' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9a,
        '›' => 0x9b,
        'œ' => 0x9c,
        'ž' => 0x9e,
        'Ÿ' => 0x9f,
        // C1 controls share 0x80..=0x9f with the glyphs above.
        _ => b'?',
    }
}
