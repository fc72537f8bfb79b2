//! Box storage.
//!
//! Boxes are machine template archives cached under `data_dir/boxes/<name>`.
//! Acquisition is pluggable through [`BoxFetcher`]; the built-in
//! [`FileFetcher`] covers archives already on the host. A fetch writes to a
//! temporary file first and renames on success, so an interrupted fetch
//! never leaves a half-written archive that storage would later mistake for
//! a valid one.

use crate::error::{CoreError, Result};
use crate::topology::attr::AttrValue;
use crate::topology::node::NodeRef;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Archive file name inside a box directory.
const ARCHIVE_NAME: &str = "box.img";

/// Acquires a box archive from a URL.
pub trait BoxFetcher {
    /// Fetches `url` into `dest`.
    ///
    /// Implementations must clean up any partial `dest` on failure.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be read or the copy fails.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Fetcher for `file:` URLs and plain local paths.
#[derive(Debug, Default)]
pub struct FileFetcher;

impl BoxFetcher for FileFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let source = url.strip_prefix("file://").unwrap_or(url);
        debug!(source, dest = %dest.display(), "copying box archive");
        if let Err(err) = std::fs::copy(source, dest) {
            // Leave no partial archive behind.
            let _ = std::fs::remove_file(dest);
            return Err(err.into());
        }
        Ok(())
    }
}

/// On-disk cache of box archives.
///
/// Construction touches nothing; directories are created on first fetch.
#[derive(Debug, Clone)]
pub struct BoxStorage {
    root: PathBuf,
}

impl BoxStorage {
    /// Storage rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory for a named box.
    #[must_use]
    pub fn box_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Path of a named box's archive.
    #[must_use]
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.box_dir(name).join(ARCHIVE_NAME)
    }

    /// True when the archive for a named box is cached.
    #[must_use]
    pub fn present(&self, name: &str) -> bool {
        self.archive_path(name).is_file()
    }

    /// Ensures the named box is in storage, fetching it when absent.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unnamed box or a missing URL,
    /// and propagates fetcher failures.
    pub fn ensure(&self, name: &str, url: &str, fetcher: &dyn BoxFetcher) -> Result<PathBuf> {
        if name.is_empty() {
            return Err(CoreError::configuration("box has no name"));
        }
        let archive = self.archive_path(name);
        if archive.is_file() {
            debug!(name, "box already in storage");
            return Ok(archive);
        }
        if url.is_empty() {
            return Err(CoreError::configuration(format!(
                "box \"{name}\" is not in storage and has no url"
            )));
        }

        std::fs::create_dir_all(self.box_dir(name))?;
        let staging = archive.with_extension("partial");
        fetcher.fetch(url, &staging)?;
        std::fs::rename(&staging, &archive)?;
        info!(name, "box fetched into storage");
        Ok(archive)
    }

    /// Refreshes a box node's `missing`/`path` attributes from storage.
    pub fn refresh(&self, box_node: &NodeRef) {
        let name = box_node.name();
        let present = !name.is_empty() && self.present(&name);
        box_node.set("missing", AttrValue::Bool(!present));
        if present {
            box_node.set(
                "path",
                AttrValue::Str(self.archive_path(&name).display().to_string()),
            );
        }
    }
}
