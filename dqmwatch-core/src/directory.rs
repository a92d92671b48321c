//! Directory nodes and read-only directory views.

use crate::path::DirPath;

/// Objects stored in directories are identified by name.
pub trait Named {
    fn name(&self) -> &str;
}

/// Stable handle to a directory of a [`Storage`](crate::Storage).
///
/// Handles carry a generation, so a handle to a removed directory never
/// resolves to a directory created later in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectoryId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

#[derive(Debug)]
pub(crate) struct Node<T> {
    pub(crate) name: String,
    pub(crate) generation: u32,
    pub(crate) parent: Option<DirectoryId>,
    pub(crate) children: Vec<DirectoryId>,
    pub(crate) contents: Vec<T>,
}

impl<T> Node<T> {
    pub(crate) fn new(name: String, generation: u32, parent: Option<DirectoryId>) -> Self {
        Self {
            name,
            generation,
            parent,
            children: Vec::new(),
            contents: Vec::new(),
        }
    }
}

/// Read-only view of a directory.
pub struct Directory<'a, T> {
    pub(crate) id: DirectoryId,
    pub(crate) node: &'a Node<T>,
    pub(crate) storage: &'a crate::Storage<T>,
}

impl<'a, T> Clone for Directory<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for Directory<'a, T> {}

impl<'a, T: Named> Directory<'a, T> {
    pub fn id(&self) -> DirectoryId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        &self.node.name
    }

    /// Handle of the parent, `None` for the root.
    pub fn parent(&self) -> Option<DirectoryId> {
        self.node.parent
    }

    /// Whether this is the storage root.
    pub fn is_root(&self) -> bool {
        self.node.parent.is_none()
    }

    /// No child directories and no objects.
    pub fn is_empty(&self) -> bool {
        self.node.children.is_empty() && self.node.contents.is_empty()
    }

    /// Objects held directly by this directory, in insertion order.
    pub fn contents(&self) -> &'a [T] {
        &self.node.contents
    }

    /// Child directories in insertion order.
    pub fn children(&self) -> impl Iterator<Item = Directory<'a, T>> + 'a {
        let storage = self.storage;
        self.node
            .children
            .iter()
            .filter_map(move |&child| storage.directory(child))
    }

    /// Child directory named `name`.
    pub fn child(&self, name: &str) -> Option<Directory<'a, T>> {
        self.children().find(|d| d.name() == name)
    }

    /// Object named `name`.
    pub fn object(&self, name: &str) -> Option<&'a T> {
        self.node.contents.iter().find(|o| o.name() == name)
    }

    /// Whether an object named `name` is held here.
    pub fn contains(&self, name: &str) -> bool {
        self.object(name).is_some()
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut parent = self.node.parent;
        while let Some(id) = parent {
            depth += 1;
            parent = self.storage.node(id).and_then(|n| n.parent);
        }
        depth
    }

    /// Absolute path of the directory.
    ///
    /// The root is `/` and its name never appears, so a directory created
    /// with `mkdir("/a/b/c")` has full path `/a/b/c`.
    pub fn full_path(&self) -> DirPath {
        let mut names = Vec::new();
        let mut cursor = Some(self.id);
        while let Some(id) = cursor {
            match self.storage.node(id) {
                Some(node) if node.parent.is_some() => {
                    names.push(node.name.as_str());
                    cursor = node.parent;
                }
                _ => break,
            }
        }
        names.reverse();
        DirPath::new(format!("/{}", names.join("/")))
    }
}

impl<'a, T> core::fmt::Debug for Directory<'a, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Directory")
            .field("id", &self.id)
            .field("name", &self.node.name)
            .field("children", &self.node.children.len())
            .field("objects", &self.node.contents.len())
            .finish()
    }
}
