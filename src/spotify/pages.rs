use std::{collections::VecDeque, marker::PhantomData};

use serde::de::DeserializeOwned;

use crate::spotify::{
    client::SpotifyClient,
    error::ProviderError,
    payload::{Page, Rejected},
};

/// Cursor-following producer over a paginated provider feed.
///
/// Pages are requested lazily: the next page is only fetched once every
/// item of the current one has been consumed, so a consumer that stops
/// early never triggers further requests. The walk ends when the provider
/// reports no `next` cursor, or after the first error. Items without a
/// catalog id (local files) are skipped with a warning. It cannot be
/// restarted; ask the client for a new producer instead.
pub struct Pages<'a, P, T> {
    client: &'a SpotifyClient,
    operation: &'static str,
    next: Option<String>,
    buffer: VecDeque<P>,
    pages_fetched: usize,
    failed: bool,
    _item: PhantomData<T>,
}

impl<'a, P, T> Pages<'a, P, T>
where
    P: DeserializeOwned,
    T: TryFrom<P>,
    T::Error: Into<Rejected>,
{
    pub(crate) fn new(client: &'a SpotifyClient, operation: &'static str, first_url: String) -> Self {
        Self {
            client,
            operation,
            next: Some(first_url),
            buffer: VecDeque::new(),
            pages_fetched: 0,
            failed: false,
            _item: PhantomData,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn fetch_next_page(&mut self) -> Result<(), ProviderError> {
        let Some(url) = self.next.take() else {
            return Ok(());
        };
        let page: Page<P> = self.client.get_json(self.operation, &url)?;
        self.pages_fetched += 1;
        log::debug!(
            "{}: page {} with {} items, more: {}",
            self.operation,
            self.pages_fetched,
            page.items.len(),
            page.next.is_some()
        );
        self.buffer.extend(page.items);
        self.next = page.next;
        Ok(())
    }
}

impl<P, T> Iterator for Pages<'_, P, T>
where
    P: DeserializeOwned,
    T: TryFrom<P>,
    T::Error: Into<Rejected>,
{
    type Item = Result<T, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            // a page may come back empty while still pointing further
            while self.buffer.is_empty() {
                self.next.as_ref()?;
                if let Err(e) = self.fetch_next_page() {
                    self.failed = true;
                    return Some(Err(e));
                }
            }

            let raw = self.buffer.pop_front()?;
            match T::try_from(raw).map_err(Into::into) {
                Ok(item) => return Some(Ok(item)),
                Err(Rejected::Unidentified(what)) => {
                    log::warn!("{}: skipping {what}, it has no catalog id", self.operation);
                }
                Err(Rejected::Malformed(reason)) => {
                    self.failed = true;
                    return Some(Err(ProviderError::malformed(self.operation, reason)));
                }
            }
        }
    }
}
