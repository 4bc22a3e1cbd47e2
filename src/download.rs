//! Paginated listing of a folder as a pull-based item source.
//!
//! [`PaginatedSource`] walks the folder listing in fixed windows of
//! [`PAGE_SIZE`] items, most recently updated first. It only asks for the
//! next page once the consumer has drained the previous one, and never has
//! more than one page request outstanding. A page shorter than the window
//! marks the end of the listing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use tracing::debug;

use crate::contract::{FileDescriptor, ItemRange, RemoteClient, PAGE_SIZE};
use crate::error::SyncError;
use crate::pool::ItemSource;

pub struct PaginatedSource<C> {
    client: Arc<C>,
    folder_id: String,
    page_size: usize,
    /// Items received so far; also the start of the next window.
    offset: usize,
    pages_requested: usize,
    buffered: VecDeque<FileDescriptor>,
    exhausted: bool,
}

impl<C: RemoteClient> PaginatedSource<C> {
    pub fn new(client: Arc<C>, folder_id: impl Into<String>) -> Self {
        Self {
            client,
            folder_id: folder_id.into(),
            page_size: PAGE_SIZE,
            offset: 0,
            pages_requested: 0,
            buffered: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Number of descriptors received from the API so far.
    pub fn received(&self) -> usize {
        self.offset
    }

    pub fn pages_requested(&self) -> usize {
        self.pages_requested
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next descriptor, or `None` once the listing is exhausted.
    pub async fn next(&mut self) -> Result<Option<FileDescriptor>, SyncError> {
        if self.buffered.is_empty() && !self.exhausted {
            self.request_page().await?;
        }
        Ok(self.buffered.pop_front())
    }

    async fn request_page(&mut self) -> Result<(), SyncError> {
        let range = ItemRange::page(self.offset, self.page_size);
        self.pages_requested += 1;
        let page = self
            .client
            .list_files(&self.folder_id, range)
            .await
            .map_err(|e| SyncError::listing(self.offset, e))?;

        let received = page.len();
        self.offset += received;
        self.buffered.extend(page);

        if received < self.page_size {
            self.exhausted = true;
            debug!(folder_id = %self.folder_id, count = self.offset, "scraped listing");
        } else {
            debug!(folder_id = %self.folder_id, %range, received, "Received full listing page");
        }
        Ok(())
    }

    /// The same sequence as a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<FileDescriptor, SyncError>> {
        stream::try_unfold(self, |mut source| async move {
            let next = source.next().await?;
            Ok::<_, SyncError>(next.map(|item| (item, source)))
        })
    }
}

#[async_trait]
impl<C: RemoteClient> ItemSource for PaginatedSource<C> {
    type Item = FileDescriptor;

    async fn next_item(&mut self) -> Result<Option<FileDescriptor>, SyncError> {
        self.next().await
    }
}
