//! Folder scanning and the lazily expanded folder tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::decoder::ImageKind;

/// Collect every supported image under `folder`, sorted by path.
///
/// Entries that can't be read (permissions, broken links) are skipped.
pub fn scan_images(folder: &Path, recursive: bool) -> Vec<PathBuf> {
    log::info!("🔍 Scanning folder: {}", folder.display());

    let mut walker = WalkDir::new(folder).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut images: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| ImageKind::from_path(entry.path()).is_some())
        .map(|entry| entry.into_path())
        .collect();
    images.sort();

    log::info!("📷 Found {} images", images.len());
    images
}

/// Index of a node in a [`FolderTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    Unexpanded,
    Expanded,
    /// Listing failed; the node stays a leaf
    Unreadable,
}

#[derive(Debug, Clone)]
pub struct FolderNode {
    pub path: PathBuf,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub expansion: Expansion,
}

impl FolderNode {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Directory tree stored as an arena; children are listed on first expand
#[derive(Debug, Clone)]
pub struct FolderTree {
    nodes: Vec<FolderNode>,
}

impl FolderTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            nodes: vec![FolderNode {
                path: root.into(),
                parent: None,
                children: Vec::new(),
                expansion: Expansion::Unexpanded,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> Option<&FolderNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// List the subdirectories of `id` once and return them.
    /// A folder that can't be listed is marked [`Expansion::Unreadable`].
    pub fn expand(&mut self, id: NodeId) -> &[NodeId] {
        let Some(node) = self.nodes.get(id.0) else {
            return &[];
        };
        if node.expansion == Expansion::Unexpanded {
            let expansion = match list_subfolders(&node.path) {
                Ok(folders) => {
                    for path in folders {
                        let child = NodeId(self.nodes.len());
                        self.nodes.push(FolderNode {
                            path,
                            parent: Some(id),
                            children: Vec::new(),
                            expansion: Expansion::Unexpanded,
                        });
                        self.nodes[id.0].children.push(child);
                    }
                    Expansion::Expanded
                }
                Err(e) => {
                    log::warn!("Can't list {}: {}", self.nodes[id.0].path.display(), e);
                    Expansion::Unreadable
                }
            };
            self.nodes[id.0].expansion = expansion;
        }
        &self.nodes[id.0].children
    }

    /// Nodes from the root down to `id`
    pub fn ancestry(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|id| self.get(id).map(|node| (id, node))) {
            chain.push(node.0);
            current = node.1.parent;
        }
        chain.reverse();
        chain
    }
}

/// Subdirectories of `path`, sorted by name; unreadable entries are skipped
fn list_subfolders(path: &Path) -> io::Result<Vec<PathBuf>> {
    let mut folders: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    folders.sort();
    Ok(folders)
}
