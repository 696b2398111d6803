//! The seam between the chat logic and the browser.
//!
//! The watcher and dispatcher only ever see a [`DocumentClient`]: query the
//! rendered page, read attributes and text, type and click. The session owns
//! a [`BrowserHost`] that opens and closes pages. Production code implements
//! both on top of Chrome (see [`crate::chrome`]); tests script them.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::DocumentError;

/// Read and drive one rendered page.
///
/// Element handles are only meaningful until the next document-rooted query;
/// callers read everything they need from a handle before querying again.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    /// Handle to an element on the page.
    type Element: Clone + Debug + Send + Sync;

    /// All elements matching `selector`, in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<Self::Element>, DocumentError>;

    /// The first element matching `selector`, if any.
    async fn find_one(&self, selector: &str) -> Result<Option<Self::Element>, DocumentError>;

    /// Value of attribute `name` on `element`; `None` when absent.
    async fn read_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, DocumentError>;

    /// Current text content of `element`.
    async fn read_text(&self, element: &Self::Element) -> Result<String, DocumentError>;

    /// Whether any descendant of `element` matches `selector`.
    async fn has_descendant(
        &self,
        element: &Self::Element,
        selector: &str,
    ) -> Result<bool, DocumentError>;

    /// Type `text` into the element matched by `selector`.
    async fn type_into(&self, selector: &str, text: &str) -> Result<(), DocumentError>;

    /// Click the element matched by `selector`.
    async fn click(&self, selector: &str) -> Result<(), DocumentError>;

    /// PNG capture of the page, for diagnostics. Backends without one return `None`.
    async fn screenshot(&self) -> Result<Option<Vec<u8>>, DocumentError> {
        Ok(None)
    }
}

/// Owns the browser and hands out pages.
#[async_trait]
pub trait BrowserHost: Send {
    type Page: DocumentClient;

    /// Open a page and load `url` in it.
    async fn open_page(&mut self, url: &str) -> Result<Self::Page, DocumentError>;

    /// Close a page returned by [`open_page`](Self::open_page).
    async fn close_page(&mut self, page: Self::Page) -> Result<(), DocumentError>;

    /// Stop the browser.
    async fn shutdown(&mut self) -> Result<(), DocumentError>;
}
