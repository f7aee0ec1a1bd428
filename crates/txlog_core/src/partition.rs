//! Partition registry: the boundary towards topic management.
//!
//! Topic and partition lifecycle belongs to an outer admin layer; this
//! registry only constructs one [`LogEngine`] per `(topic, partition)` and
//! tears it down again. Retention and compaction are out of scope: removing
//! a partition drops the engine, and for file-backed partitions the
//! directory is left for the caller to delete.

use crate::config::LogConfig;
use crate::engine::LogEngine;
use crate::error::{LogError, LogResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Constructs and tracks per-partition log engines.
///
/// The registry is created with a template configuration; each partition
/// gets a copy, with its own directory under the template's `dir` (when
/// one is set) following a `<topic>/partition-<n>` layout.
pub struct PartitionRegistry {
    template: LogConfig,
    partitions: RwLock<HashMap<(String, u32), Arc<LogEngine>>>,
}

impl PartitionRegistry {
    /// Creates a registry from a template configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the template configuration is invalid.
    pub fn new(template: LogConfig) -> LogResult<Self> {
        template.validate()?;
        Ok(Self {
            template,
            partitions: RwLock::new(HashMap::new()),
        })
    }

    /// Creates the log engine for a partition.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::PartitionExists`] if the partition is already
    /// registered, or any engine-open error.
    pub fn create(&self, topic: &str, partition: u32) -> LogResult<Arc<LogEngine>> {
        let key = (topic.to_string(), partition);
        let mut partitions = self.partitions.write();
        if partitions.contains_key(&key) {
            return Err(LogError::PartitionExists {
                topic: topic.to_string(),
                partition,
            });
        }

        let mut config = self.template.clone();
        config.dir = self
            .template
            .dir
            .as_ref()
            .map(|root| partition_dir(root, topic, partition));

        let engine = Arc::new(LogEngine::open(config)?);
        partitions.insert(key, Arc::clone(&engine));

        info!(topic, partition, "partition created");
        Ok(engine)
    }

    /// Returns the engine for a partition, if registered.
    #[must_use]
    pub fn get(&self, topic: &str, partition: u32) -> Option<Arc<LogEngine>> {
        self.partitions
            .read()
            .get(&(topic.to_string(), partition))
            .cloned()
    }

    /// Removes a partition, dropping the registry's engine reference.
    ///
    /// Outstanding `Arc` handles keep the engine alive until released; the
    /// partition's files stay on disk.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::PartitionNotFound`] if the partition is not
    /// registered.
    pub fn remove(&self, topic: &str, partition: u32) -> LogResult<()> {
        let removed = self
            .partitions
            .write()
            .remove(&(topic.to_string(), partition));

        match removed {
            Some(_) => {
                info!(topic, partition, "partition removed");
                Ok(())
            }
            None => Err(LogError::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            }),
        }
    }

    /// Returns the number of registered partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.read().len()
    }

    /// Returns whether no partitions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.read().is_empty()
    }
}

impl std::fmt::Debug for PartitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionRegistry")
            .field("partitions", &self.len())
            .finish_non_exhaustive()
    }
}

/// Directory for one partition's segment files.
fn partition_dir(root: &Path, topic: &str, partition: u32) -> PathBuf {
    root.join(topic).join(format!("partition-{partition}"))
}
