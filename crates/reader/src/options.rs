use crate::filter::Reducer;
use ptex_io::{FileInputHandler, HandlerRef};
use std::fmt;
use std::sync::Arc;

/// How a [`Reader`](crate::Reader) opens and decodes a file.
///
/// # Examples
///
/// ```
/// use ptex_reader::ReaderOptions;
///
/// let options = ReaderOptions::default().with_premultiply(true);
/// assert!(options.premultiply());
/// ```
#[derive(Clone)]
pub struct ReaderOptions {
    pub(crate) handler: HandlerRef,
    pub(crate) premultiply: bool,
    pub(crate) reducer: Reducer,
}

impl ReaderOptions {
    /// Use a custom input handler (descriptor pool, virtual filesystem, ...).
    pub fn with_handler(mut self, handler: HandlerRef) -> Self {
        self.handler = handler;
        self
    }

    /// Multiply colour channels by alpha as faces are decoded.
    pub fn with_premultiply(mut self, premultiply: bool) -> Self {
        self.premultiply = premultiply;
        self
    }

    /// Replace the box filters used to synthesize reduced resolutions.
    pub fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn premultiply(&self) -> bool {
        self.premultiply
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { handler: Arc::new(FileInputHandler::default()), premultiply: false, reducer: Reducer::default() }
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("handler", &self.handler.name())
            .field("premultiply", &self.premultiply)
            .field("reducer", &self.reducer)
            .finish()
    }
}
