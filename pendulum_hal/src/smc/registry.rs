//! Registry of open motor controller links.
//!
//! A serial device may only have one link: two handshakes on the same tty
//! interleave frames. The application owns one `SerialRegistry` and asks it
//! for links by device path; no global state.

use super::link::SmcLink;
use super::transport::{SerialTransport, TermiosPort};
use pendulum_common::hal::HalError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// One shared [`SmcLink`] per device path.
pub struct SerialRegistry<T: SerialTransport = TermiosPort> {
    links: HashMap<PathBuf, Arc<SmcLink<T>>>,
}

impl<T: SerialTransport> SerialRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            links: HashMap::new(),
        }
    }

    /// Link for `path`, creating it with `open` on first use.
    ///
    /// # Errors
    /// Propagates the error from `open`; nothing is cached on failure.
    pub fn get_or_open_with<F>(&mut self, path: &Path, open: F) -> Result<Arc<SmcLink<T>>, HalError>
    where
        F: FnOnce(&Path) -> Result<SmcLink<T>, HalError>,
    {
        if let Some(link) = self.links.get(path) {
            return Ok(Arc::clone(link));
        }
        let link = Arc::new(open(path)?);
        debug!("Registered motor controller at {}", path.display());
        self.links.insert(path.to_path_buf(), Arc::clone(&link));
        Ok(link)
    }

    /// Number of open links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no link is open.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl SerialRegistry<TermiosPort> {
    /// Link for the tty at `path`, opening and handshaking on first use.
    pub fn get_or_open(&mut self, path: &Path) -> Result<Arc<SmcLink>, HalError> {
        self.get_or_open_with(path, SmcLink::<TermiosPort>::open)
    }
}

impl<T: SerialTransport> Default for SerialRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
