use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::RgbaImage;
use pagedeck_core::{EditorConfig, EditorSession, RenderState};
use pagedeck_engine::{default_engine, OpenSource, PdfEngine};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod script;

pub use script::{EditOp, EditScript};

const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "pagedeck-cli")]
#[command(about = "Inspect, preview and rearrange PDF pages")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable page information.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render a page thumbnail to PNG.
    RenderThumb {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Thumbnail width in pixels; the height follows the page.
        #[arg(long)]
        width: Option<u32>,
        /// Clockwise rotation in degrees, a multiple of 90.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        rotation: i32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Apply a JSON edit script and export the result.
    Edit {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "SCRIPT")]
        script: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Export resolution in pixels per point.
        #[arg(long)]
        scale: Option<f32>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageInfo>,
}

/// Page size rounded to whole points.
#[derive(Debug, Serialize)]
struct PageInfo {
    index: u32,
    width_pt: u32,
    height_pt: u32,
}

#[derive(Debug, Serialize)]
struct EditSummary {
    output: String,
    page_count: usize,
    bytes: usize,
    pages: Vec<PageSummary>,
}

#[derive(Debug, Serialize)]
struct PageSummary {
    /// Source document, 1 for the edited file and higher for inserted ones.
    source: u64,
    /// 1-based page number within the source.
    source_page: u32,
    rotation: u16,
    shapes: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::RenderThumb { file, page, width, rotation, output } => {
            run_render_thumb(&file, page, width, rotation, output.as_deref())
        }
        Commands::Edit { file, script, output, scale } => {
            run_edit(&file, &script, &output, scale)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let pages = (0..page_count)
        .map(|index| {
            let size = engine.page_size(handle, index)?;
            Ok(PageInfo {
                index: index + 1,
                width_pt: size.width_pt.round() as u32,
                height_pt: size.height_pt.round() as u32,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let payload = InfoOutput { path: file.display().to_string(), page_count, pages };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    engine.close(handle)?;

    Ok(())
}

fn run_render_thumb(
    file: &Path,
    page: usize,
    width: Option<u32>,
    rotation: i32,
    output: Option<&Path>,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    if page == 0 {
        bail!("--page is 1-based and must be >= 1");
    }

    let mut config = EditorConfig::from_env()?;
    if let Some(width) = width {
        config = config.with_thumbnail_width(width);
    }
    let mut session = EditorSession::with_config(config)?;
    // Nothing renders until the requested page is known.
    session.set_visible(Some(Vec::new()));
    session.load(OpenSource::from(file)).context("failed to open PDF")?;

    let id = {
        let document = session.document().context("no document is open")?;
        match document.page_at(page - 1) {
            Some(model) => model.id(),
            None => bail!("no page {page} (document has {} pages)", document.len()),
        }
    };
    session.set_visible(Some(vec![id]));
    if rotation != 0 {
        session.rotate_page(id, rotation)?;
    }

    if !session.wait_idle(RENDER_TIMEOUT) {
        bail!("timed out rendering page {page}");
    }
    if let Some(RenderState::Failed(reason)) = session.page_state(id) {
        bail!("failed to render thumbnail: {reason}");
    }
    let thumbnail = session.thumbnail(id).context("thumbnail was not rendered")?;

    let image = RgbaImage::from_raw(thumbnail.width, thumbnail.height, thumbnail.pixels.to_vec())
        .context("thumbnail buffer has the wrong size")?;

    let output =
        output.map(ToOwned::to_owned).unwrap_or_else(|| default_thumbnail_output(file, page));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn run_edit(file: &Path, script_path: &Path, output: &Path, scale: Option<f32>) -> Result<()> {
    ensure_pdf_exists(file)?;
    let script = EditScript::from_file(script_path)?;

    let mut config = EditorConfig::from_env()?;
    if let Some(scale) = scale {
        config = config.with_export_scale(scale);
    }
    let mut session = EditorSession::with_config(config)?;
    // Exports render at full resolution; thumbnails are not needed.
    session.set_visible(Some(Vec::new()));
    session.load(OpenSource::from(file)).context("failed to open PDF")?;

    let base_dir = script_path.parent().unwrap_or_else(|| Path::new("."));
    script.apply(&mut session, base_dir)?;

    let bytes = session.export().context("export failed")?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;

    let document = session.document().context("no document is open")?;
    let summary = EditSummary {
        output: output.display().to_string(),
        page_count: document.len(),
        bytes: bytes.len(),
        pages: document
            .pages()
            .iter()
            .map(|page| PageSummary {
                source: page.source().source.0,
                source_page: page.source().page_index + 1,
                rotation: page.rotation().degrees(),
                shapes: page.overlay().len(),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_thumbnail_output(file: &Path, page: usize) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("thumbnail");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
