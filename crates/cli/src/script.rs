//! JSON edit scripts for the `edit` command.
//!
//! A script is an object with an `ops` array, applied in order. Page numbers
//! are 1-based positions in the document as it stands when the op runs.
//!
//! ```json
//! { "ops": [
//!     { "op": "move", "page": 3, "to": 1 },
//!     { "op": "rotate", "page": 2, "degrees": 90 },
//!     { "op": "delete", "page": 3 },
//!     { "op": "insert", "file": "appendix.pdf", "at": 3, "pages": [1, 2] },
//!     { "op": "annotate", "page": 1, "shape": {
//!         "kind": { "type": "rectangle" },
//!         "position": { "x": 10, "y": 10 },
//!         "size": { "width": 50, "height": 20 } } }
//! ] }
//! ```

use anyhow::{bail, Context, Result};
use pagedeck_core::{EditorSession, LoadedSource};
use pagedeck_engine::OpenSource;
use pagedeck_model::{AnnotationOverlay, NewShape, PageId, PageTemplate, SourceRef};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditScript {
    pub ops: Vec<EditOp>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum EditOp {
    Move { page: usize, to: usize },
    Rotate { page: usize, degrees: i32 },
    RotateAll { degrees: i32 },
    Delete { page: usize },
    Duplicate { page: usize },
    /// Inserts pages of another PDF so the first lands at position `at`.
    /// `pages` defaults to every page of `file`.
    Insert {
        file: PathBuf,
        at: usize,
        #[serde(default)]
        pages: Option<Vec<u32>>,
    },
    Annotate { page: usize, shape: NewShape },
    /// Removes every annotation from a page.
    Clear { page: usize },
}

impl EditOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Rotate { .. } => "rotate",
            Self::RotateAll { .. } => "rotate_all",
            Self::Delete { .. } => "delete",
            Self::Duplicate { .. } => "duplicate",
            Self::Insert { .. } => "insert",
            Self::Annotate { .. } => "annotate",
            Self::Clear { .. } => "clear",
        }
    }
}

impl EditScript {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid edit script {}", path.display()))
    }

    /// Runs every op against `session`. Relative `insert` paths resolve
    /// against `base_dir`. Stops at the first failing op.
    pub fn apply(self, session: &mut EditorSession, base_dir: &Path) -> Result<()> {
        for (index, op) in self.ops.into_iter().enumerate() {
            let name = op.name();
            apply_op(session, op, base_dir)
                .with_context(|| format!("op {} ({name}) failed", index + 1))?;
        }
        Ok(())
    }
}

fn apply_op(session: &mut EditorSession, op: EditOp, base_dir: &Path) -> Result<()> {
    log::debug!("applying {}", op.name());
    match op {
        EditOp::Move { page, to } => {
            let id = page_at(session, page)?;
            session.move_page(id, position(to)?)?;
        }
        EditOp::Rotate { page, degrees } => {
            let id = page_at(session, page)?;
            session.rotate_page(id, degrees)?;
        }
        EditOp::RotateAll { degrees } => session.rotate_all(degrees)?,
        EditOp::Delete { page } => {
            let id = page_at(session, page)?;
            session.delete_page(id)?;
        }
        EditOp::Duplicate { page } => {
            let id = page_at(session, page)?;
            session.duplicate_page(id)?;
        }
        EditOp::Insert { file, at, pages } => {
            let path = if file.is_absolute() { file } else { base_dir.join(file) };
            let loaded = session
                .add_source(OpenSource::from(path.as_path()))
                .with_context(|| format!("failed to open {}", path.display()))?;

            let inserted = templates(&path, loaded, pages).and_then(|templates| {
                session.insert_pages(position(at)?, templates)?;
                Ok(())
            });
            if inserted.is_err() {
                // Nothing references the new source.
                session.rasterizer().close(loaded.id);
            }
            inserted?;
        }
        EditOp::Annotate { page, shape } => {
            let id = page_at(session, page)?;
            session.add_shape(id, shape)?;
        }
        EditOp::Clear { page } => {
            let id = page_at(session, page)?;
            session.set_overlay(id, AnnotationOverlay::new())?;
        }
    }
    Ok(())
}

/// One template per 1-based page number, or every page of `loaded`.
fn templates(
    path: &Path,
    loaded: LoadedSource,
    pages: Option<Vec<u32>>,
) -> Result<Vec<PageTemplate>> {
    let numbers = pages.unwrap_or_else(|| (1..=loaded.page_count).collect());
    numbers
        .into_iter()
        .map(|number| {
            if number == 0 || number > loaded.page_count {
                bail!("{} has no page {number}", path.display());
            }
            Ok(PageTemplate::new(SourceRef::new(loaded.id, number - 1)))
        })
        .collect()
}

fn position(number: usize) -> Result<usize> {
    number.checked_sub(1).context("positions are 1-based and must be >= 1")
}

fn page_at(session: &EditorSession, number: usize) -> Result<PageId> {
    let index = position(number)?;
    let document = session.document().context("no document is open")?;
    match document.page_at(index) {
        Some(page) => Ok(page.id()),
        None => bail!("no page {number} (document has {} pages)", document.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagedeck_core::EditorConfig;
    use pagedeck_engine::{OutputPage, PdfWriter};
    use pagedeck_model::ShapeKind;

    #[test]
    fn parses_every_op() {
        let script: EditScript = serde_json::from_str(
            r#"{ "ops": [
                { "op": "move", "page": 3, "to": 1 },
                { "op": "rotate", "page": 1, "degrees": -90 },
                { "op": "rotate_all", "degrees": 180 },
                { "op": "delete", "page": 2 },
                { "op": "duplicate", "page": 1 },
                { "op": "insert", "file": "extra.pdf", "at": 1 },
                { "op": "annotate", "page": 1, "shape": {
                    "kind": { "type": "text", "content": "Draft", "font_size": 18 },
                    "position": { "x": 20, "y": 30 } } },
                { "op": "clear", "page": 1 }
            ] }"#,
        )
        .expect("valid script");

        let names: Vec<&str> = script.ops.iter().map(EditOp::name).collect();
        assert_eq!(
            names,
            ["move", "rotate", "rotate_all", "delete", "duplicate", "insert", "annotate", "clear"]
        );

        match &script.ops[6] {
            EditOp::Annotate { shape, .. } => {
                assert!(matches!(&shape.kind, ShapeKind::Text { content, .. } if content == "Draft"));
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert!(matches!(&script.ops[5], EditOp::Insert { pages: None, at: 1, .. }));
    }

    #[test]
    fn rejects_unknown_ops() {
        let result: serde_json::Result<EditScript> =
            serde_json::from_str(r#"{ "ops": [ { "op": "shuffle" } ] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn failed_insert_closes_its_source() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let pdf = |sizes: &[(f32, f32)]| {
            let mut writer = PdfWriter::new();
            for &(width, height) in sizes {
                writer.add_page(OutputPage::blank(width, height));
            }
            writer.finish().expect("fixture should serialize")
        };
        std::fs::write(temp.path().join("extra.pdf"), pdf(&[(50.0, 80.0)])).expect("write");

        let mut session = EditorSession::with_config(EditorConfig::default()).expect("session");
        session.set_visible(Some(Vec::new()));
        session.load(pdf(&[(100.0, 100.0)])).expect("load");

        let script: EditScript = serde_json::from_str(
            r#"{ "ops": [ { "op": "insert", "file": "extra.pdf", "at": 1, "pages": [1, 4] } ] }"#,
        )
        .expect("valid script");
        let err = script.apply(&mut session, temp.path()).expect_err("page 4 does not exist");

        assert!(format!("{err:#}").contains("has no page 4"));
        assert_eq!(session.rasterizer().sources().len(), 1);
        assert_eq!(session.document().map(|doc| doc.len()), Some(1));
    }

    #[test]
    fn positions_are_one_based() {
        assert_eq!(position(1).expect("first"), 0);
        assert!(position(0).is_err());
    }
}
