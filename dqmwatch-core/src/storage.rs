//! Hierarchical object storage.
//!
//! Directories live in an arena and refer to each other by [`DirectoryId`],
//! so parents and children never own each other. A cursor tracks the current
//! directory for relative paths.

use std::ops::ControlFlow;

use tracing::debug;

use crate::directory::{Directory, DirectoryId, Named, Node};
use crate::error::{DqmError, Result};
use crate::path::{is_valid_name, DirPath};

/// A tree of named directories holding named objects.
///
/// # Example
///
/// ```rust
/// use dqmwatch_core::{Named, Storage};
///
/// struct Item(String);
/// impl Named for Item {
///     fn name(&self) -> &str {
///         &self.0
///     }
/// }
///
/// let mut storage = Storage::new();
/// storage.mkdir("/detector/ecal").unwrap();
/// storage.add("/detector/ecal", Item("hits".into())).unwrap();
///
/// assert!(storage.dir_exists("/detector"));
/// assert!(storage.find_object("/detector/ecal", |i| i.0 == "hits").is_some());
/// ```
#[derive(Debug)]
pub struct Storage<T> {
    nodes: Vec<Option<Node<T>>>,
    generations: Vec<u32>,
    free: Vec<u32>,
    root: DirectoryId,
    current: DirectoryId,
}

impl<T: Named> Storage<T> {
    /// Create a storage with an unnamed root.
    pub fn new() -> Self {
        Self::with_root_name("")
    }

    /// Create a storage whose root carries `name`.
    pub fn with_root_name(name: impl Into<String>) -> Self {
        let root = DirectoryId {
            index: 0,
            generation: 0,
        };
        Self {
            nodes: vec![Some(Node::new(name.into(), 0, None))],
            generations: vec![0],
            free: Vec::new(),
            root,
            current: root,
        }
    }

    pub(crate) fn node(&self, id: DirectoryId) -> Option<&Node<T>> {
        self.nodes
            .get(id.index as usize)
            .and_then(|slot| slot.as_ref())
            .filter(|node| node.generation == id.generation)
    }

    fn node_mut(&mut self, id: DirectoryId) -> Option<&mut Node<T>> {
        self.nodes
            .get_mut(id.index as usize)
            .and_then(|slot| slot.as_mut())
            .filter(|node| node.generation == id.generation)
    }

    /// View of the directory `id`, if it still exists.
    pub fn directory(&self, id: DirectoryId) -> Option<Directory<'_, T>> {
        self.node(id).map(|node| Directory {
            id,
            node,
            storage: self,
        })
    }

    /// Handle of the root directory.
    pub fn root(&self) -> DirectoryId {
        self.root
    }

    /// Handle of the current directory.
    pub fn current(&self) -> DirectoryId {
        self.current
    }

    /// Name of the current directory.
    pub fn pwd(&self) -> &str {
        self.node(self.current).map_or("", |n| n.name.as_str())
    }

    /// Full path of the current directory.
    pub fn current_path(&self) -> DirPath {
        self.directory(self.current)
            .map(|d| d.full_path())
            .unwrap_or_else(|| DirPath::new("/"))
    }

    /// Number of directories, root included.
    pub fn directory_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Number of objects over all directories.
    pub fn object_count(&self) -> usize {
        self.nodes.iter().flatten().map(|n| n.contents.len()).sum()
    }

    fn child_named(&self, id: DirectoryId, name: &str) -> Option<DirectoryId> {
        let node = self.node(id)?;
        node.children
            .iter()
            .copied()
            .find(|&child| self.node(child).is_some_and(|c| c.name == name))
    }

    fn parse(path: &str) -> Result<DirPath> {
        let path = DirPath::new(path);
        if path.is_valid() {
            Ok(path)
        } else {
            Err(DqmError::invalid(format!("malformed path '{path}'")))
        }
    }

    /// Resolve `path` to a directory handle.
    ///
    /// Returns `Ok(None)` when a segment does not exist and an error only
    /// for malformed paths.
    pub fn resolve(&self, path: &str) -> Result<Option<DirectoryId>> {
        let path = Self::parse(path)?;
        let mut id = if path.is_absolute() { self.root } else { self.current };
        for segment in path.segments() {
            id = match segment {
                "." => id,
                ".." => self.node(id).and_then(|n| n.parent).unwrap_or(self.root),
                name => match self.child_named(id, name) {
                    Some(child) => child,
                    None => return Ok(None),
                },
            };
        }
        Ok(Some(id))
    }

    /// Full path designated by `path`, resolved from the current directory
    /// without touching the tree. The directories need not exist.
    pub fn absolute_path(&self, path: &str) -> Result<DirPath> {
        let path = Self::parse(path)?;
        let mut segments: Vec<String> = if path.is_absolute() {
            Vec::new()
        } else {
            self.current_path().segments().map(str::to_string).collect()
        };
        for segment in path.segments() {
            match segment {
                "." => {}
                ".." => {
                    segments.pop();
                }
                name => segments.push(name.to_string()),
            }
        }
        Ok(DirPath::new(format!("/{}", segments.join("/"))))
    }

    fn resolve_existing(&self, path: &str) -> Result<DirectoryId> {
        self.resolve(path)?
            .ok_or_else(|| DqmError::not_found(format!("directory '{path}'")))
    }

    /// Whether `path` names an existing directory.
    pub fn dir_exists(&self, path: &str) -> bool {
        matches!(self.resolve(path), Ok(Some(_)))
    }

    fn allocate(&mut self, name: String, parent: DirectoryId) -> DirectoryId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.nodes.push(None);
                self.generations.push(0);
                (self.nodes.len() - 1) as u32
            }
        };
        let generation = self.generations[index as usize];
        self.nodes[index as usize] = Some(Node::new(name, generation, Some(parent)));
        let id = DirectoryId { index, generation };
        if let Some(parent) = self.node_mut(parent) {
            parent.children.push(id);
        }
        id
    }

    /// Create every missing directory along `path`.
    ///
    /// Existing directories are returned unchanged, so calling `mkdir`
    /// twice yields the same handle.
    pub fn mkdir(&mut self, path: &str) -> Result<DirectoryId> {
        let parsed = Self::parse(path)?;
        let mut id = if parsed.is_absolute() { self.root } else { self.current };
        for segment in parsed.segments() {
            id = match segment {
                "." => id,
                ".." => self.node(id).and_then(|n| n.parent).unwrap_or(self.root),
                name => {
                    if !is_valid_name(name) {
                        return Err(DqmError::invalid(format!("invalid directory name '{name}'")));
                    }
                    match self.child_named(id, name) {
                        Some(child) => child,
                        None => {
                            debug!("Creating directory '{}' in '{}'", name, path);
                            self.allocate(name.to_string(), id)
                        }
                    }
                }
            };
        }
        Ok(id)
    }

    /// Move the cursor to `path`.
    pub fn cd(&mut self, path: &str) -> Result<()> {
        self.current = self.resolve_existing(path)?;
        Ok(())
    }

    /// Move the cursor to the root.
    pub fn cd_root(&mut self) {
        self.current = self.root;
    }

    /// Move the cursor to the parent directory.
    pub fn go_up(&mut self) -> Result<()> {
        let parent = self
            .node(self.current)
            .and_then(|n| n.parent)
            .ok_or_else(|| DqmError::not_found("parent of the root directory"))?;
        self.current = parent;
        Ok(())
    }

    /// Remove the directory at `path` with everything below it.
    ///
    /// If the cursor was inside the removed tree it moves to the parent of
    /// the removed directory.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let id = self.resolve_existing(path)?;
        let parent = self
            .node(id)
            .and_then(|n| n.parent)
            .ok_or_else(|| DqmError::NotAllowed("the root directory cannot be removed".into()))?;

        if self.is_within(self.current, id) {
            self.current = parent;
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.retain(|&child| child != id);
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.release(next) {
                stack.extend(node.children);
            }
        }
        debug!("Removed directory '{}'", path);
        Ok(())
    }

    fn release(&mut self, id: DirectoryId) -> Option<Node<T>> {
        self.node(id)?;
        let node = self.nodes[id.index as usize].take();
        self.generations[id.index as usize] = id.generation.wrapping_add(1);
        self.free.push(id.index);
        node
    }

    fn is_within(&self, id: DirectoryId, ancestor: DirectoryId) -> bool {
        let mut cursor = Some(id);
        while let Some(c) = cursor {
            if c == ancestor {
                return true;
            }
            cursor = self.node(c).and_then(|n| n.parent);
        }
        false
    }

    /// Remove all directories and objects, keeping an empty root.
    pub fn clear(&mut self) {
        let root_children = self
            .node_mut(self.root)
            .map(|root| {
                root.contents.clear();
                std::mem::take(&mut root.children)
            })
            .unwrap_or_default();
        let mut stack = root_children;
        while let Some(next) = stack.pop() {
            if let Some(node) = self.release(next) {
                stack.extend(node.children);
            }
        }
        self.current = self.root;
    }

    /// Add `object` to the existing directory at `path`.
    pub fn add(&mut self, path: &str, object: T) -> Result<()> {
        let id = self.resolve_existing(path)?;
        self.add_to(id, object)
    }

    /// Add `object` to the directory `id`.
    pub fn add_to(&mut self, id: DirectoryId, object: T) -> Result<()> {
        let node = self
            .node_mut(id)
            .ok_or_else(|| DqmError::not_found("directory handle"))?;
        if !is_valid_name(object.name()) {
            return Err(DqmError::invalid(format!("invalid object name '{}'", object.name())));
        }
        if node.contents.iter().any(|o| o.name() == object.name()) {
            return Err(DqmError::already_present(format!(
                "object '{}' in directory '{}'",
                object.name(),
                node.name
            )));
        }
        node.contents.push(object);
        Ok(())
    }

    /// Remove every object in `path` matching `predicate`.
    ///
    /// Returns the removed objects, or NOT_FOUND if nothing matched.
    pub fn remove<F>(&mut self, path: &str, mut predicate: F) -> Result<Vec<T>>
    where
        F: FnMut(&T) -> bool,
    {
        let id = self.resolve_existing(path)?;
        let node = self
            .node_mut(id)
            .ok_or_else(|| DqmError::not_found(format!("directory '{path}'")))?;
        let (removed, kept): (Vec<T>, Vec<T>) =
            std::mem::take(&mut node.contents).into_iter().partition(|o| predicate(o));
        node.contents = kept;
        if removed.is_empty() {
            return Err(DqmError::not_found(format!("no matching object in '{path}'")));
        }
        Ok(removed)
    }

    /// Remove the object named `name` from `path`.
    pub fn remove_named(&mut self, path: &str, name: &str) -> Result<T> {
        let mut removed = self.remove(path, |o| o.name() == name)?;
        removed
            .pop()
            .ok_or_else(|| DqmError::not_found(format!("object '{name}' in '{path}'")))
    }

    /// First object in `path` matching `predicate`.
    pub fn find_object<F>(&self, path: &str, mut predicate: F) -> Option<&T>
    where
        F: FnMut(&T) -> bool,
    {
        let id = self.resolve(path).ok().flatten()?;
        self.node(id)?.contents.iter().find(|o| predicate(o))
    }

    /// Mutable access to the first object in `path` matching `predicate`.
    pub fn find_object_mut<F>(&mut self, path: &str, mut predicate: F) -> Option<&mut T>
    where
        F: FnMut(&T) -> bool,
    {
        let id = self.resolve(path).ok().flatten()?;
        self.node_mut(id)?.contents.iter_mut().find(|o| predicate(o))
    }

    /// Whether `path` holds an object matching `predicate`.
    pub fn contains<F>(&self, path: &str, predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.find_object(path, predicate).is_some()
    }

    /// Depth-first handles: a directory comes before its children, siblings
    /// in insertion order.
    fn walk(&self) -> Vec<DirectoryId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.node(id) {
                order.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    /// First object anywhere matching `predicate`, with its directory.
    ///
    /// Each directory's own objects are searched before its children.
    pub fn find_global<F>(&self, mut predicate: F) -> Option<(DirectoryId, &T)>
    where
        F: FnMut(&T) -> bool,
    {
        self.walk().into_iter().find_map(|id| {
            self.node(id)?
                .contents
                .iter()
                .find(|o| predicate(o))
                .map(|o| (id, o))
        })
    }

    /// Location of the first object anywhere matching `predicate`.
    pub fn locate<F>(&self, predicate: F) -> Option<DirPath>
    where
        F: FnMut(&T) -> bool,
    {
        let (id, _) = self.find_global(predicate)?;
        self.directory(id).map(|d| d.full_path())
    }

    /// Visit every (directory, object) pair in traversal order.
    ///
    /// Returns `false` if the visitor stopped early.
    pub fn iterate<'a, F>(&'a self, mut visitor: F) -> bool
    where
        F: FnMut(Directory<'a, T>, &'a T) -> ControlFlow<()>,
    {
        for id in self.walk() {
            let Some(dir) = self.directory(id) else {
                continue;
            };
            for object in dir.contents() {
                if visitor(dir, object).is_break() {
                    return false;
                }
            }
        }
        true
    }

    /// Apply `f` to every object mutably.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut T),
    {
        for node in self.nodes.iter_mut().flatten() {
            node.contents.iter_mut().for_each(&mut f);
        }
    }
}

impl<T: Named> Default for Storage<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Hero {
        name: String,
        power: u32,
    }

    impl Hero {
        fn new(name: &str, power: u32) -> Self {
            Self {
                name: name.to_string(),
                power,
            }
        }
    }

    impl Named for Hero {
        fn name(&self) -> &str {
            &self.name
        }
    }

    fn heroes() -> Storage<Hero> {
        let mut storage = Storage::new();
        storage.mkdir("/heroes/best").unwrap();
        storage.mkdir("/heroes/worst").unwrap();
        storage.add("/heroes/best", Hero::new("superman", 100)).unwrap();
        storage.add("/heroes/best", Hero::new("batman", 80)).unwrap();
        storage.add("/heroes/best", Hero::new("wonderwoman", 95)).unwrap();
        storage.add("/heroes/worst", Hero::new("aquaman", 10)).unwrap();
        storage.add("/heroes/worst", Hero::new("hawkman", 5)).unwrap();
        storage.add("/heroes/worst", Hero::new("plasticman", 2)).unwrap();
        storage
    }

    // ========================================================================
    // Directory Tests
    // ========================================================================

    #[test]
    fn new_storage_has_single_empty_root() {
        let storage: Storage<Hero> = Storage::new();
        let root = storage.directory(storage.root()).unwrap();
        assert!(root.is_root());
        assert!(root.is_empty());
        assert_eq!(root.full_path().as_str(), "/");
        assert_eq!(storage.directory_count(), 1);
    }

    #[test]
    fn mkdir_is_idempotent() {
        let mut storage: Storage<Hero> = Storage::new();
        let first = storage.mkdir("/a/b/c").unwrap();
        assert_eq!(storage.directory_count(), 4);
        let second = storage.mkdir("/a/b/c").unwrap();
        assert_eq!(first, second);
        assert_eq!(storage.directory_count(), 4);
    }

    #[test]
    fn full_path_excludes_root_name() {
        let mut storage: Storage<Hero> = Storage::with_root_name("root");
        let id = storage.mkdir("/a/b/c").unwrap();
        let dir = storage.directory(id).unwrap();
        assert_eq!(dir.full_path().as_str(), "/a/b/c");
        assert_eq!(dir.depth(), 3);
        assert!(!dir.is_root());
    }

    #[test]
    fn child_parent_links() {
        let mut storage: Storage<Hero> = Storage::with_root_name("root");
        let id = storage.mkdir("bibou").unwrap();
        let dir = storage.directory(id).unwrap();
        assert_eq!(dir.parent(), Some(storage.root()));
        assert_eq!(dir.name(), "bibou");
        let root = storage.directory(storage.root()).unwrap();
        assert_eq!(root.child("bibou").map(|d| d.id()), Some(id));
    }

    #[test]
    fn mkdir_rejects_malformed_names() {
        let mut storage: Storage<Hero> = Storage::new();
        assert_eq!(
            storage.mkdir("/a/b?c").unwrap_err().code(),
            crate::StatusCode::InvalidParameter
        );
        assert_eq!(storage.directory_count(), 1);
    }

    #[test]
    fn add_remove_and_clear_objects() {
        let mut storage = Storage::with_root_name("root");
        storage.mkdir("heroes").unwrap();
        storage.add("heroes", Hero::new("superman", 100)).unwrap();
        storage.add("heroes", Hero::new("batman", 80)).unwrap();
        storage.add("heroes", Hero::new("flash", 60)).unwrap();
        assert_eq!(storage.object_count(), 3);

        let removed = storage.remove("heroes", |h| h.power < 70).unwrap();
        assert_eq!(removed, vec![Hero::new("flash", 60)]);
        assert_eq!(storage.object_count(), 2);

        storage.clear();
        assert!(storage.directory(storage.root()).unwrap().is_empty());
        assert_eq!(storage.directory_count(), 1);
    }

    #[test]
    fn add_duplicate_name_is_already_present() {
        let mut storage = Storage::new();
        storage.add("/", Hero::new("superman", 100)).unwrap();
        let err = storage.add("/", Hero::new("superman", 1)).unwrap_err();
        assert_eq!(err.code(), crate::StatusCode::AlreadyPresent);
        assert_eq!(storage.object_count(), 1);
        assert_eq!(storage.find_object("/", |h| h.name == "superman").unwrap().power, 100);
    }

    #[test]
    fn add_to_missing_directory_is_not_found() {
        let mut storage = Storage::new();
        let err = storage.add("/nowhere", Hero::new("x", 1)).unwrap_err();
        assert_eq!(err.code(), crate::StatusCode::NotFound);
    }

    #[test]
    fn remove_without_match_is_not_found() {
        let mut storage = heroes();
        let err = storage.remove("/heroes/best", |h| h.power > 1000).unwrap_err();
        assert_eq!(err.code(), crate::StatusCode::NotFound);
        assert_eq!(storage.object_count(), 6);
    }

    // ========================================================================
    // Navigation Tests
    // ========================================================================

    #[test]
    fn cd_pwd_and_go_up() {
        let mut storage = heroes();
        storage.cd("/heroes/worst").unwrap();
        assert_eq!(storage.pwd(), "worst");
        assert_eq!(storage.current_path().as_str(), "/heroes/worst");

        assert!(storage.dir_exists("/heroes/best"));
        assert!(!storage.dir_exists("best"));
        assert!(storage.dir_exists("../best"));

        storage.go_up().unwrap();
        assert_eq!(storage.pwd(), "heroes");
        storage.cd_root();
        assert_eq!(storage.go_up().unwrap_err().code(), crate::StatusCode::NotFound);
    }

    #[test]
    fn cd_to_missing_directory_is_not_found() {
        let mut storage = heroes();
        assert_eq!(storage.cd("/villains").unwrap_err().code(), crate::StatusCode::NotFound);
        assert_eq!(storage.current(), storage.root());
    }

    #[test]
    fn relative_add_uses_cursor() {
        let mut storage = heroes();
        storage.cd("/heroes").unwrap();
        storage.mkdir("neutral").unwrap();
        storage.add("neutral", Hero::new("deadpool", 50)).unwrap();
        assert!(storage.contains("/heroes/neutral", |h| h.name == "deadpool"));
    }

    #[test]
    fn absolute_path_resolves_without_creating() {
        let mut storage = heroes();
        storage.cd("/heroes/worst").unwrap();
        let before = storage.directory_count();
        assert_eq!(storage.absolute_path("deep/er").unwrap().as_str(), "/heroes/worst/deep/er");
        assert_eq!(storage.absolute_path("../best").unwrap().as_str(), "/heroes/best");
        assert_eq!(storage.absolute_path("./.").unwrap().as_str(), "/heroes/worst");
        assert_eq!(storage.absolute_path("/villains").unwrap().as_str(), "/villains");
        assert_eq!(storage.absolute_path("../../..").unwrap().as_str(), "/");
        assert_eq!(storage.directory_count(), before);
        assert!(storage.absolute_path("a?b").is_err());
    }

    // ========================================================================
    // rmdir Tests
    // ========================================================================

    #[test]
    fn rmdir_removes_subtree() {
        let mut storage = heroes();
        storage.mkdir("/heroes/worst/deep/deeper").unwrap();
        let before = storage.directory_count();
        storage.rmdir("/heroes/worst").unwrap();
        assert_eq!(storage.directory_count(), before - 3);
        assert_eq!(storage.object_count(), 3);
        assert!(!storage.dir_exists("/heroes/worst"));
    }

    #[test]
    fn rmdir_moves_cursor_out_of_removed_tree() {
        let mut storage = heroes();
        storage.cd("/heroes/worst").unwrap();
        storage.rmdir("/heroes/worst").unwrap();
        assert_eq!(storage.pwd(), "heroes");
    }

    #[test]
    fn rmdir_root_is_not_allowed() {
        let mut storage = heroes();
        assert_eq!(storage.rmdir("/").unwrap_err().code(), crate::StatusCode::NotAllowed);
    }

    #[test]
    fn stale_handle_does_not_resolve() {
        let mut storage = heroes();
        let old = storage.resolve("/heroes/worst").unwrap().unwrap();
        storage.rmdir("/heroes/worst").unwrap();
        let new = storage.mkdir("/heroes/other").unwrap();
        assert!(storage.directory(old).is_none());
        assert!(storage.directory(new).is_some());
    }

    // ========================================================================
    // Search Tests
    // ========================================================================

    #[test]
    fn find_global_is_depth_first() {
        let mut storage = heroes();
        storage.add("/", Hero::new("root-hero", 1)).unwrap();
        let (id, hero) = storage.find_global(|h| h.power < 20).unwrap();
        assert_eq!(hero.name, "root-hero");
        assert!(storage.directory(id).unwrap().is_root());

        let (id, hero) = storage.find_global(|h| h.power < 20 && h.power > 1).unwrap();
        assert_eq!(hero.name, "aquaman");
        assert_eq!(storage.directory(id).unwrap().full_path().as_str(), "/heroes/worst");
    }

    #[test]
    fn locate_returns_directory_path() {
        let storage = heroes();
        assert_eq!(
            storage.locate(|h| h.name == "batman").map(|p| p.to_string()),
            Some("/heroes/best".to_string())
        );
        assert!(storage.locate(|h| h.name == "joker").is_none());
    }

    #[test]
    fn iterate_visits_all_and_can_stop() {
        let storage = heroes();
        let mut seen = Vec::new();
        assert!(storage.iterate(|dir, hero| {
            seen.push(format!("{}/{}", dir.full_path(), hero.name));
            ControlFlow::Continue(())
        }));
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0], "/heroes/best/superman");

        let mut count = 0;
        let completed = storage.iterate(|_, _| {
            count += 1;
            if count == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(!completed);
        assert_eq!(count, 2);
    }

    #[test]
    fn for_each_mut_reaches_every_object() {
        let mut storage = heroes();
        storage.for_each_mut(|h| h.power += 1);
        assert_eq!(storage.find_object("/heroes/worst", |h| h.name == "plasticman").unwrap().power, 3);
    }
}
