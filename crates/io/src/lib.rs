//! Input handlers: the byte-stream boundary of the texture reader.
//!
//! A reader never touches the filesystem directly. It asks an
//! [`InputHandler`] to open a path and then issues seeks and reads against
//! the returned [`InputHandle`]. Swapping the handler lets callers plug in
//! their own file layer (descriptor pools, virtual filesystems, test doubles).

pub mod error;
pub mod handler;

pub use crate::handler::{FileInputHandler, InputHandle, InputHandler};
#[cfg(feature = "mock")]
pub use crate::handler::{HandlerStats, MemoryInputHandler};
use std::sync::Arc;

/// Shared handler reference, as held by readers.
pub type HandlerRef = Arc<dyn InputHandler>;
