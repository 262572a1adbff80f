//! Collaborator contracts consumed by the sync core

use crate::fs::{EventLogEntry, FsResult, NodeInfo, RootInfo};
use crate::types::{NodeId, NodeType};
use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Handle to a file or revision being written
#[async_trait]
pub trait RevisionCreationProcess: Send {
    /// Metadata of the item being written
    fn file_info(&self) -> &NodeInfo;

    /// Append a chunk of content
    async fn write(&mut self, chunk: &[u8]) -> FsResult<()>;

    /// Commit the revision and return the resulting item
    async fn finish(self: Box<Self>) -> FsResult<NodeInfo>;
}

/// Access to one replica's items
#[async_trait]
pub trait FileSystemClient: Send + Sync {
    /// List the sync roots the replica exposes
    async fn enumerate_roots(&self, cancel: &CancellationToken) -> FsResult<Vec<RootInfo>>;

    /// Fetch the current metadata of an item
    async fn get_info(&self, info: &NodeInfo, cancel: &CancellationToken) -> FsResult<NodeInfo>;

    /// Stream the children of a directory
    fn enumerate<'a>(
        &'a self,
        info: &'a NodeInfo,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, FsResult<NodeInfo>>;

    /// Create a directory
    async fn create_directory(&self, info: &NodeInfo, cancel: &CancellationToken) -> FsResult<NodeInfo>;

    /// Start writing a new file
    async fn create_file(
        &self,
        info: &NodeInfo,
        cancel: &CancellationToken,
    ) -> FsResult<Box<dyn RevisionCreationProcess>>;

    /// Start writing a new revision of an existing file
    async fn create_revision(
        &self,
        info: &NodeInfo,
        cancel: &CancellationToken,
    ) -> FsResult<Box<dyn RevisionCreationProcess>>;

    /// Move or rename an item
    async fn move_node(
        &self,
        info: &NodeInfo,
        destination: &NodeInfo,
        cancel: &CancellationToken,
    ) -> FsResult<()>;

    /// Move an item to the replica's trash
    async fn delete(&self, info: &NodeInfo, cancel: &CancellationToken) -> FsResult<()>;

    /// Delete an item without keeping it in the trash
    async fn delete_permanently(&self, info: &NodeInfo, cancel: &CancellationToken) -> FsResult<()>;

    /// Delete one revision of a file
    async fn delete_revision(&self, info: &NodeInfo, cancel: &CancellationToken) -> FsResult<()>;

    /// Mark an item as in sync with the other replica
    async fn set_in_sync_state(&self, info: &NodeInfo) -> FsResult<()>;

    /// Download the content of an on-demand file
    async fn hydrate_file(&self, info: &NodeInfo, cancel: &CancellationToken) -> FsResult<()>;
}

/// Receives batches of event log entries
pub type EventLogSink = Box<dyn Fn(Vec<EventLogEntry>) + Send + Sync>;

/// Source of change notifications for one replica
pub trait EventLogClient: Send + Sync {
    /// Start delivering batches to `sink`
    fn enable(&self, sink: EventLogSink);

    /// Stop delivering batches
    fn disable(&self);
}

/// Produces replacement names for nodes that must be renamed
pub trait FileNameFactory: Send + Sync {
    /// A new name for the node
    fn name_for(&self, id: NodeId, name: &str, node_type: NodeType) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BufferedRevision {
        info: NodeInfo,
        content: Vec<u8>,
    }

    #[async_trait]
    impl RevisionCreationProcess for BufferedRevision {
        fn file_info(&self) -> &NodeInfo {
            &self.info
        }

        async fn write(&mut self, chunk: &[u8]) -> FsResult<()> {
            self.content.extend_from_slice(chunk);
            Ok(())
        }

        async fn finish(self: Box<Self>) -> FsResult<NodeInfo> {
            let mut info = self.info;
            info.size = Some(self.content.len() as u64);
            Ok(info)
        }
    }

    #[test]
    fn test_revision_process_is_object_safe() {
        let mut process: Box<dyn RevisionCreationProcess> = Box::new(BufferedRevision {
            info: NodeInfo::file("f1", "root", "a.txt", 0),
            content: Vec::new(),
        });

        let info = tokio_test::block_on(async move {
            process.write(b"hello ").await?;
            process.write(b"world").await?;
            process.finish().await
        })
        .unwrap();

        assert_eq!(info.name, "a.txt");
        assert_eq!(info.size, Some(11));
    }
}
