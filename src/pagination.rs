//! # Pagination
//!
//! Generic token-follow listing over the remote service's paged responses.
//!
//! List responses carry an opaque `position` token; a response without one
//! ends the listing. All pages are drained before any name resolution
//! happens, and a failure on any page aborts the whole listing with no
//! partial results.

use anyhow::{bail, Result};

use crate::constants::MAX_LIST_PAGES;

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token for the next page, if any.
    pub position: Option<String>,
}

impl<T> Page<T> {
    /// A terminal page with no items, used where the remote service reports
    /// the whole resource group as absent.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            position: None,
        }
    }
}

/// Drain a paginated listing into a single vector.
///
/// `fetch` is invoked with `None` for the first page and with the previous
/// page's continuation token afterwards, until a page comes back without a
/// token. Listing more than [`MAX_LIST_PAGES`] pages is treated as a
/// misbehaving remote service and fails the listing.
pub async fn list_all<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: std::future::Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut position: Option<String> = None;

    for _ in 0..MAX_LIST_PAGES {
        let page = fetch(position.take()).await?;
        items.extend(page.items);
        match page.position {
            Some(token) => position = Some(token),
            None => return Ok(items),
        }
    }

    bail!("Listing exceeded {MAX_LIST_PAGES} pages without a terminal page")
}
