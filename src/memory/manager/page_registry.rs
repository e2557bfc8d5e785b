/*!
 * Page Registry
 * Maps pages to the memory type they were allocated from
 */

use crate::core::types::TypeIndex;
use crate::memory::block::{Page, PageId};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;

struct RegisteredPage<M> {
    type_index: TypeIndex,
    // Keeps the page, and therefore its identity, alive
    _page: Arc<Page<M>>,
}

/// Registry of every page owned by an allocator
///
/// Entries are never removed: pages live as long as the allocator.
pub(crate) struct PageRegistry<M> {
    pages: DashMap<PageId, RegisteredPage<M>, RandomState>,
}

impl<M> PageRegistry<M> {
    pub fn new() -> Self {
        Self {
            pages: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn register(&self, page: Arc<Page<M>>) -> PageId {
        let id = PageId::of(&page);
        self.pages.insert(
            id,
            RegisteredPage {
                type_index: page.type_index(),
                _page: page,
            },
        );
        id
    }

    /// Memory type of a registered page
    pub fn type_of(&self, page: PageId) -> Option<TypeIndex> {
        self.pages.get(&page).map(|entry| entry.value().type_index)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }
}
