//! Ordered page collection and its structural edit operations.
//!
//! Every operation borrows the current state and returns a new one, so a
//! failed edit can never leave a half-applied model behind and readers holding
//! an older snapshot are unaffected.

use crate::{
    AnnotationOverlay, EditError, EditResult, PageId, PageModel, PageTemplate, Rotation,
    SourceId, SourceRef,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    pages: Vec<PageModel>,
    selection: Option<PageId>,
    next_page_id: u64,
}

impl DocumentState {
    /// One page per source page, in source order, rotation 0, no overlay.
    pub fn load(source: SourceId, page_count: u32) -> EditResult<Self> {
        if page_count == 0 {
            return Err(EditError::Invariant("a document needs at least one page"));
        }

        let templates = (0..page_count).map(|index| PageTemplate::new(SourceRef::new(source, index)));
        Self::default().insert_pages(0, templates.collect())
    }

    fn mint_page_id(&mut self) -> PageId {
        self.next_page_id += 1;
        PageId(self.next_page_id)
    }

    /// Advances the id mint to at least `other`'s, so an older snapshot
    /// restored over `other` never hands out an id `other` already used.
    pub(crate) fn carry_id_mint(mut self, other: &DocumentState) -> Self {
        self.next_page_id = self.next_page_id.max(other.next_page_id);
        self
    }

    pub fn pages(&self) -> &[PageModel] {
        &self.pages
    }

    pub fn page_ids(&self) -> Vec<PageId> {
        self.pages.iter().map(PageModel::id).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page(&self, id: PageId) -> Option<&PageModel> {
        self.pages.iter().find(|page| page.id == id)
    }

    pub fn index_of(&self, id: PageId) -> Option<usize> {
        self.pages.iter().position(|page| page.id == id)
    }

    pub fn page_at(&self, index: usize) -> Option<&PageModel> {
        self.pages.get(index)
    }

    pub fn selection(&self) -> Option<PageId> {
        self.selection
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selection.and_then(|id| self.index_of(id))
    }

    fn require_index(&self, id: PageId) -> EditResult<usize> {
        self.index_of(id).ok_or(EditError::PageNotFound(id))
    }

    /// Inserts a contiguous run of pages before `at` (`0` = start, `len` = end).
    pub fn insert_pages(&self, at: usize, pages: Vec<PageTemplate>) -> EditResult<Self> {
        if at > self.pages.len() {
            return Err(EditError::IndexOutOfRange { index: at, len: self.pages.len() });
        }
        if pages.is_empty() {
            return Err(EditError::InvalidArgument("no pages to insert".to_owned()));
        }

        let mut next = self.clone();
        let inserted: Vec<PageModel> = pages
            .into_iter()
            .map(|template| {
                let id = next.mint_page_id();
                PageModel::from_template(id, template)
            })
            .collect();

        if next.selection.is_none() {
            next.selection = inserted.first().map(PageModel::id);
        }
        next.pages.splice(at..at, inserted);

        Ok(next)
    }

    pub fn delete_page(&self, id: PageId) -> EditResult<Self> {
        let index = self.require_index(id)?;
        if self.pages.len() == 1 {
            return Err(EditError::Invariant("cannot delete the last remaining page"));
        }

        let mut next = self.clone();
        next.pages.remove(index);

        if next.selection == Some(id) {
            let fallback = index.min(next.pages.len() - 1);
            next.selection = Some(next.pages[fallback].id);
        }

        Ok(next)
    }

    /// Moves a page so that it ends up at `new_index`, keeping its id,
    /// rotation and overlay.
    pub fn move_page(&self, id: PageId, new_index: usize) -> EditResult<Self> {
        let index = self.require_index(id)?;
        if new_index >= self.pages.len() {
            return Err(EditError::IndexOutOfRange { index: new_index, len: self.pages.len() });
        }

        let mut next = self.clone();
        let page = next.pages.remove(index);
        next.pages.insert(new_index, page);

        Ok(next)
    }

    pub fn rotate_page(&self, id: PageId, delta_degrees: i32) -> EditResult<Self> {
        let index = self.require_index(id)?;
        let rotation = self.pages[index].rotation.rotate_by(delta_degrees)?;

        let mut next = self.clone();
        next.pages[index].rotation = rotation;

        Ok(next)
    }

    pub fn rotate_all(&self, delta_degrees: i32) -> EditResult<Self> {
        Rotation::from_degrees(delta_degrees)?;

        let mut next = self.clone();
        for page in &mut next.pages {
            page.rotation = page.rotation.rotate_by(delta_degrees)?;
        }

        Ok(next)
    }

    /// Replaces one page's annotation set.
    pub fn set_overlay(&self, id: PageId, overlay: AnnotationOverlay) -> EditResult<Self> {
        let index = self.require_index(id)?;

        let mut next = self.clone();
        next.pages[index].overlay = overlay;

        Ok(next)
    }

    /// Edits one page's overlay through `edit` and returns the new state plus
    /// whatever `edit` produced. The state is unchanged if `edit` fails.
    pub fn update_overlay<T, F>(&self, id: PageId, edit: F) -> EditResult<(Self, T)>
    where
        F: FnOnce(&mut AnnotationOverlay) -> EditResult<T>,
    {
        let index = self.require_index(id)?;

        let mut overlay = self.pages[index].overlay.clone();
        let output = edit(&mut overlay)?;

        Ok((self.set_overlay(id, overlay)?, output))
    }

    /// Inserts a copy of the page right after it. The copy gets a fresh page id
    /// and fresh shape ids.
    pub fn duplicate_page(&self, id: PageId) -> EditResult<Self> {
        let index = self.require_index(id)?;
        let page = &self.pages[index];
        let template = PageTemplate::new(page.source)
            .with_rotation(page.rotation)
            .with_overlay(page.overlay.duplicated());

        self.insert_pages(index + 1, vec![template])
    }

    pub fn select(&self, id: PageId) -> EditResult<Self> {
        self.require_index(id)?;

        let mut next = self.clone();
        next.selection = Some(id);

        Ok(next)
    }

    /// Checks the structural invariants: unique ids, a selection that points
    /// at an existing page, and no selection only when there are no pages.
    pub fn check_invariants(&self) -> EditResult<()> {
        let mut seen = HashSet::with_capacity(self.pages.len());
        if !self.pages.iter().all(|page| seen.insert(page.id)) {
            return Err(EditError::Invariant("duplicate page id"));
        }

        match self.selection {
            Some(id) if self.index_of(id).is_none() => {
                Err(EditError::Invariant("selection references a missing page"))
            }
            None if !self.pages.is_empty() => Err(EditError::Invariant("selection is missing")),
            _ => Ok(()),
        }
    }
}
