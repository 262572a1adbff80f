use async_trait::async_trait;
use duplex_types::{
    FileSystemClient, FileSystemError, FileSystemErrorCode, FsResult, NodeInfo, RevisionCreationProcess, RootInfo,
};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Store {
    prefix: String,
    next_id: u64,
    roots: Vec<RootInfo>,
    items: BTreeMap<String, NodeInfo>,
    failures: HashMap<String, FileSystemErrorCode>,
}

impl Store {
    fn allocate(&mut self) -> String {
        self.next_id += 1;
        format!("{}{}", self.prefix, self.next_id)
    }

    fn fail_on(&self, id: Option<&String>) -> FsResult<()> {
        match id.and_then(|id| self.failures.get(id)) {
            Some(code) => Err(FileSystemError::new(*code, id.cloned(), "injected failure")),
            None => Ok(()),
        }
    }

    fn item(&self, id: Option<&String>) -> FsResult<&NodeInfo> {
        id.and_then(|id| self.items.get(id))
            .ok_or_else(|| FileSystemError::new(FileSystemErrorCode::ObjectNotFound, id.cloned(), "no such item"))
    }

    fn children(&self, id: &str) -> Vec<NodeInfo> {
        self.items
            .values()
            .filter(|item| item.parent_id.as_deref() == Some(id))
            .cloned()
            .collect()
    }

    fn ensure_free_name(&self, parent_id: Option<&String>, name: &str) -> FsResult<()> {
        let parent = self.item(parent_id).map_err(|error| FileSystemError {
            code: FileSystemErrorCode::DirectoryNotFound,
            ..error
        })?;
        if !parent.is_directory() {
            return Err(FileSystemError::new(
                FileSystemErrorCode::DirectoryNotFound,
                parent.id.clone(),
                "parent is a file",
            ));
        }
        let taken = parent
            .id
            .as_deref()
            .is_some_and(|parent| self.children(parent).iter().any(|child| child.name.eq_ignore_ascii_case(name)));
        if taken {
            return Err(FileSystemError::new(
                FileSystemErrorCode::DuplicateName,
                parent_id.cloned(),
                format!("\"{name}\" already exists"),
            ));
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) {
        for child in self.children(id) {
            if let Some(child) = child.id {
                self.remove(&child);
            }
        }
        self.items.remove(id);
    }
}

/// Replica whose items live in memory.
///
/// Item ids are the replica prefix followed by a counter. Clones share the same items.
#[derive(Debug, Clone)]
pub struct MemoryReplica {
    store: Arc<Mutex<Store>>,
}

impl MemoryReplica {
    /// Replica with one enabled sync root (root id 1 on volume 1)
    pub fn new(prefix: &str) -> Self {
        let root_id = format!("{prefix}root");
        let mut store = Store {
            prefix: prefix.to_string(),
            ..Store::default()
        };
        store.roots.push(RootInfo::new(1, 1, root_id.clone()));
        store
            .items
            .insert(root_id.clone(), NodeInfo::directory(root_id, "", "1"));
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Replica without sync roots
    pub fn empty(prefix: &str) -> Self {
        let replica = Self::new(prefix);
        replica.lock().roots.clear();
        replica
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Item id of the sync root directory
    pub fn root_id(&self) -> String {
        self.lock()
            .roots
            .first()
            .map(|root| root.node_id.clone())
            .unwrap_or_default()
    }

    /// Add a directory under `parent` and return its item id
    pub fn add_directory(&self, parent: &str, name: &str) -> String {
        let mut store = self.lock();
        let id = store.allocate();
        store
            .items
            .insert(id.clone(), NodeInfo::directory(id.clone(), parent, name));
        id
    }

    /// Add a file of `size` bytes under `parent` and return its item id
    pub fn add_file(&self, parent: &str, name: &str, size: u64) -> String {
        let mut store = self.lock();
        let id = store.allocate();
        store
            .items
            .insert(id.clone(), NodeInfo::file(id.clone(), parent, name, size));
        id
    }

    /// Rename an item in place
    pub fn rename(&self, id: &str, name: &str) {
        if let Some(item) = self.lock().items.get_mut(id) {
            item.name = name.to_string();
        }
    }

    /// Move an item under another directory
    pub fn move_to(&self, id: &str, parent: &str) {
        if let Some(item) = self.lock().items.get_mut(id) {
            item.parent_id = Some(parent.to_string());
        }
    }

    /// Replace the content of a file
    pub fn edit(&self, id: &str, size: u64) {
        if let Some(item) = self.lock().items.get_mut(id) {
            item.size = Some(size);
        }
    }

    /// Remove an item and its subtree
    pub fn remove(&self, id: &str) {
        self.lock().remove(id);
    }

    /// Make every call concerning `id` fail with `code`
    pub fn fail_with(&self, id: &str, code: FileSystemErrorCode) {
        self.lock().failures.insert(id.to_string(), code);
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Current metadata of an item
    pub fn item(&self, id: &str) -> Option<NodeInfo> {
        self.lock().items.get(id).cloned()
    }

    /// Item id of the child of `parent` named `name`
    pub fn find(&self, parent: &str, name: &str) -> Option<String> {
        self.lock()
            .children(parent)
            .into_iter()
            .find(|child| child.name == name)
            .and_then(|child| child.id)
    }
}

/// Content being written to a [`MemoryReplica`]
struct MemoryRevision {
    store: Arc<Mutex<Store>>,
    info: NodeInfo,
    written: u64,
}

#[async_trait]
impl RevisionCreationProcess for MemoryRevision {
    fn file_info(&self) -> &NodeInfo {
        &self.info
    }

    async fn write(&mut self, chunk: &[u8]) -> FsResult<()> {
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> FsResult<NodeInfo> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let mut info = self.info;
        info.size = Some(self.written);
        if let Some(id) = info.id.clone() {
            store.items.insert(id, info.clone());
        }
        Ok(info)
    }
}

#[async_trait]
impl FileSystemClient for MemoryReplica {
    async fn enumerate_roots(&self, _cancel: &CancellationToken) -> FsResult<Vec<RootInfo>> {
        Ok(self.lock().roots.clone())
    }

    async fn get_info(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<NodeInfo> {
        let store = self.lock();
        store.fail_on(info.id.as_ref())?;
        store.item(info.id.as_ref()).cloned()
    }

    fn enumerate<'a>(&'a self, info: &'a NodeInfo, _cancel: &'a CancellationToken) -> BoxStream<'a, FsResult<NodeInfo>> {
        let store = self.lock();
        let listing = store
            .fail_on(info.id.as_ref())
            .and_then(|()| store.item(info.id.as_ref()).map(|_| ()))
            .map(|()| store.children(info.id.as_deref().unwrap_or_default()));
        drop(store);
        match listing {
            Ok(children) => stream::iter(children.into_iter().map(Ok)).boxed(),
            Err(error) => stream::once(async move { Err(error) }).boxed(),
        }
    }

    async fn create_directory(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<NodeInfo> {
        let mut store = self.lock();
        store.ensure_free_name(info.parent_id.as_ref(), &info.name)?;
        let id = store.allocate();
        let created = NodeInfo::directory(id.clone(), info.parent_id.clone().unwrap_or_default(), info.name.clone());
        store.items.insert(id, created.clone());
        Ok(created)
    }

    async fn create_file(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<Box<dyn RevisionCreationProcess>> {
        let mut store = self.lock();
        store.ensure_free_name(info.parent_id.as_ref(), &info.name)?;
        let id = store.allocate();
        let info = NodeInfo::file(id, info.parent_id.clone().unwrap_or_default(), info.name.clone(), 0);
        Ok(Box::new(MemoryRevision {
            store: Arc::clone(&self.store),
            info,
            written: 0,
        }))
    }

    async fn create_revision(
        &self,
        info: &NodeInfo,
        _cancel: &CancellationToken,
    ) -> FsResult<Box<dyn RevisionCreationProcess>> {
        let store = self.lock();
        store.fail_on(info.id.as_ref())?;
        let current = store.item(info.id.as_ref())?.clone();
        Ok(Box::new(MemoryRevision {
            store: Arc::clone(&self.store),
            info: current,
            written: 0,
        }))
    }

    async fn move_node(&self, info: &NodeInfo, destination: &NodeInfo, _cancel: &CancellationToken) -> FsResult<()> {
        let mut store = self.lock();
        store.fail_on(info.id.as_ref())?;
        store.item(info.id.as_ref())?;
        store.ensure_free_name(destination.parent_id.as_ref(), &destination.name)?;
        if let Some(item) = info.id.as_ref().and_then(|id| store.items.get_mut(id)) {
            item.parent_id = destination.parent_id.clone();
            item.name = destination.name.clone();
        }
        Ok(())
    }

    async fn delete(&self, info: &NodeInfo, cancel: &CancellationToken) -> FsResult<()> {
        self.delete_permanently(info, cancel).await
    }

    async fn delete_permanently(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<()> {
        let mut store = self.lock();
        store.fail_on(info.id.as_ref())?;
        store.item(info.id.as_ref())?;
        if let Some(id) = &info.id {
            store.remove(id);
        }
        Ok(())
    }

    async fn delete_revision(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<()> {
        let store = self.lock();
        store.fail_on(info.id.as_ref())?;
        store.item(info.id.as_ref()).map(|_| ())
    }

    async fn set_in_sync_state(&self, info: &NodeInfo) -> FsResult<()> {
        self.lock().item(info.id.as_ref()).map(|_| ())
    }

    async fn hydrate_file(&self, info: &NodeInfo, _cancel: &CancellationToken) -> FsResult<()> {
        let store = self.lock();
        store.fail_on(info.id.as_ref())?;
        let item = store.item(info.id.as_ref())?;
        if item.is_directory() {
            return Err(FileSystemError::new(
                FileSystemErrorCode::UnauthorizedAccess,
                info.id.clone(),
                "directories are not hydrated",
            ));
        }
        Ok(())
    }
}
