//! Function descriptor cache.
//!
//! Descriptors fetched from catalogue servers are kept in the workspace so
//! later runs can package them without network access. The packager only
//! sees the [`DescriptorCache`] trait; [`FsDescriptorCache`] is the workspace
//! directory and [`MemoryDescriptorCache`] an in-process stand-in.

use crate::{Workspace, WorkspaceError};
use nfpack_schema::{DescriptorFile, FunctionId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;

pub trait DescriptorCache {
    fn contains(&self, id: &FunctionId) -> bool;

    /// Store a descriptor under `id`, replacing any previous content.
    fn store(&self, id: &FunctionId, file_name: &str, content: &str) -> Result<(), WorkspaceError>;

    /// Load the descriptor cached under `id`, or `None` if absent.
    fn load(&self, id: &FunctionId) -> Result<Option<DescriptorFile>, WorkspaceError>;
}

/// Cache backed by `<workspace>/<catalogues_dir>/vnfs/<FunctionId>/`.
#[derive(Debug, Clone)]
pub struct FsDescriptorCache {
    dir: PathBuf,
    extension: String,
}

impl FsDescriptorCache {
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.to_owned(),
        }
    }

    pub fn for_workspace(workspace: &Workspace) -> Self {
        Self::new(
            workspace.function_cache_dir(),
            workspace.descriptor_extension(),
        )
    }

    #[inline]
    pub fn entry_dir(&self, id: &FunctionId) -> PathBuf {
        self.dir.join(id.as_str())
    }
}

impl DescriptorCache for FsDescriptorCache {
    fn contains(&self, id: &FunctionId) -> bool {
        self.entry_dir(id).is_dir()
    }

    fn store(&self, id: &FunctionId, file_name: &str, content: &str) -> Result<(), WorkspaceError> {
        let dir = self.entry_dir(id);
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        let dest = dir.join(file_name);
        tmp.persist(&dest).map_err(|e| WorkspaceError::Io(e.error))?;
        debug!("cached {id} at {}", dest.display());
        Ok(())
    }

    fn load(&self, id: &FunctionId) -> Result<Option<DescriptorFile>, WorkspaceError> {
        if !self.contains(id) {
            return Ok(None);
        }
        let file = DescriptorFile::locate(&self.entry_dir(id), &self.extension)?;
        Ok(Some(file))
    }
}

/// In-memory cache. Loaded descriptors have no base directory, so they can
/// only reference remote or container artifacts.
#[derive(Debug, Default)]
pub struct MemoryDescriptorCache {
    entries: RefCell<BTreeMap<FunctionId, (String, String)>>,
}

impl MemoryDescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn ids(&self) -> Vec<FunctionId> {
        self.entries.borrow().keys().cloned().collect()
    }
}

impl DescriptorCache for MemoryDescriptorCache {
    fn contains(&self, id: &FunctionId) -> bool {
        self.entries.borrow().contains_key(id)
    }

    fn store(&self, id: &FunctionId, file_name: &str, content: &str) -> Result<(), WorkspaceError> {
        self.entries
            .borrow_mut()
            .insert(id.clone(), (file_name.to_owned(), content.to_owned()));
        Ok(())
    }

    fn load(&self, id: &FunctionId) -> Result<Option<DescriptorFile>, WorkspaceError> {
        Ok(self
            .entries
            .borrow()
            .get(id)
            .map(|(file_name, content)| DescriptorFile {
                label: id.to_string(),
                file_name: file_name.clone(),
                content: content.clone(),
                base_dir: None,
            }))
    }
}
