//! Dataset registry implementation
//!
//! The central directory from dataset name to live connections, and the
//! single authority for fan-out. Entries are created lazily by the first
//! attach (source or sink) and deleted as soon as the last referencing
//! connection detaches.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Notify, RwLock};

use crate::queue::BoundedQueue;
use crate::registry::entry::{DatasetEntry, SourceSlot};
use crate::stats::BrokerStats;

/// Handle returned by [`DataRegistry::attach_source`]
pub struct SourceHandle {
    /// Fires if a newer source attaches to the same dataset; the holder
    /// must stop reading and close its connection
    pub evicted: Arc<Notify>,
    /// Whether this attach evicted an existing source
    pub replaced: bool,
}

/// Handle returned by [`DataRegistry::attach_sink`]
pub struct SinkHandle {
    /// The queue this sink pops from; exclusively owned by the holder
    pub queue: Arc<BoundedQueue>,
}

/// Central registry for all live datasets.
///
/// Thread-safe via nested `RwLock`s: the outer lock guards the name map,
/// the per-dataset lock guards a single entry. `publish` takes only read
/// locks and the non-blocking queue push, so it is bounded in cost by the
/// number of sinks and never suspends on a slow consumer.
pub struct DataRegistry {
    /// Map of dataset name to entry
    datasets: RwLock<HashMap<String, Arc<RwLock<DatasetEntry>>>>,

    /// Capacity of each newly created sink queue
    queue_capacity: usize,

    /// Broker-wide counters
    stats: BrokerStats,
}

impl DataRegistry {
    /// Create a registry whose sink queues hold `queue_capacity` packets
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            datasets: RwLock::new(HashMap::new()),
            queue_capacity,
            stats: BrokerStats::new(),
        }
    }

    /// Broker-wide counters
    pub fn stats(&self) -> &BrokerStats {
        &self.stats
    }

    /// Register `session_id` as the source for `name`, creating the
    /// dataset if needed.
    ///
    /// A dataset is produced by one logical experiment run at a time, so an
    /// already-attached source is evicted rather than the new attach being
    /// rejected; a producer reconnecting after a crash resumes publishing
    /// without operator intervention. The evicted connection's task
    /// observes its handle's `evicted` signal and closes.
    pub async fn attach_source(&self, name: &str, session_id: u64) -> SourceHandle {
        // The map lock is held across the entry mutation so a concurrent
        // detach cannot delete the entry between lookup and attach
        let mut datasets = self.datasets.write().await;
        let entry_arc = Self::get_or_create(&mut datasets, name);
        let mut entry = entry_arc.write().await;

        let replaced = match entry.source.take() {
            Some(old) => {
                old.evict.notify_one();
                tracing::info!(
                    dataset = %name,
                    session_id,
                    evicted_session_id = old.session_id,
                    "Source replaced"
                );
                true
            }
            None => {
                tracing::info!(
                    dataset = %name,
                    session_id,
                    sinks = entry.sink_count(),
                    "Source attached"
                );
                false
            }
        };

        let evict = Arc::new(Notify::new());
        entry.source = Some(SourceSlot {
            session_id,
            evict: Arc::clone(&evict),
        });

        SourceHandle {
            evicted: evict,
            replaced,
        }
    }

    /// Register `session_id` as a sink for `name`, creating the dataset if
    /// needed. The returned handle owns a fresh queue; no backlog is
    /// delivered, so the first pop waits for the next publish.
    pub async fn attach_sink(&self, name: &str, session_id: u64) -> SinkHandle {
        let mut datasets = self.datasets.write().await;
        let entry_arc = Self::get_or_create(&mut datasets, name);
        let mut entry = entry_arc.write().await;

        let queue = Arc::new(BoundedQueue::new(self.queue_capacity));
        entry.sinks.insert(session_id, Arc::clone(&queue));

        tracing::info!(
            dataset = %name,
            session_id,
            sinks = entry.sink_count(),
            "Sink attached"
        );

        SinkHandle { queue }
    }

    /// Fan a packet out to every sink of `name`.
    ///
    /// Never blocks regardless of how many sinks are slow or absent: a full
    /// sink queue evicts its oldest packet, and a dataset with no sinks
    /// buffers nothing.
    pub async fn publish(&self, name: &str, packet: Bytes) {
        let datasets = self.datasets.read().await;

        if let Some(entry_arc) = datasets.get(name) {
            let entry = entry_arc.read().await;
            let (fanned_out, dropped) = entry.fan_out(&packet);
            self.stats.packet_published(packet.len(), fanned_out, dropped);

            if dropped > 0 {
                tracing::debug!(
                    dataset = %name,
                    dropped,
                    "Slow sink(s), oldest packets evicted"
                );
            }
        }
    }

    /// Remove `session_id` as the source of `name`.
    ///
    /// A replaced source that detaches later must not clobber its
    /// successor, so the id is checked first.
    pub async fn detach_source(&self, name: &str, session_id: u64) {
        let mut datasets = self.datasets.write().await;

        if let Some(entry_arc) = datasets.get(name) {
            let mut entry = entry_arc.write().await;

            match &entry.source {
                Some(slot) if slot.session_id == session_id => {
                    entry.source = None;
                    tracing::info!(
                        dataset = %name,
                        session_id,
                        sinks = entry.sink_count(),
                        "Source detached"
                    );
                }
                _ => return,
            }

            if entry.is_empty() {
                let age = entry.created_at.elapsed();
                drop(entry);
                datasets.remove(name);
                tracing::info!(dataset = %name, age_secs = age.as_secs(), "Dataset removed");
            }
        }
    }

    /// Remove `session_id` as a sink of `name` and close its queue
    pub async fn detach_sink(&self, name: &str, session_id: u64) {
        let mut datasets = self.datasets.write().await;

        if let Some(entry_arc) = datasets.get(name) {
            let mut entry = entry_arc.write().await;

            if let Some(queue) = entry.sinks.remove(&session_id) {
                queue.close();
                tracing::info!(
                    dataset = %name,
                    session_id,
                    sinks = entry.sink_count(),
                    "Sink detached"
                );
            }

            if entry.is_empty() {
                let age = entry.created_at.elapsed();
                drop(entry);
                datasets.remove(name);
                tracing::info!(dataset = %name, age_secs = age.as_secs(), "Dataset removed");
            }
        }
    }

    /// Names of all live datasets
    pub async fn dataset_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.datasets.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of live datasets
    pub async fn dataset_count(&self) -> usize {
        self.datasets.read().await.len()
    }

    /// Whether `name` currently has a source attached
    pub async fn has_source(&self, name: &str) -> bool {
        let datasets = self.datasets.read().await;
        match datasets.get(name) {
            Some(entry_arc) => entry_arc.read().await.has_source(),
            None => false,
        }
    }

    /// Number of sinks currently attached to `name`
    pub async fn sink_count(&self, name: &str) -> usize {
        let datasets = self.datasets.read().await;
        match datasets.get(name) {
            Some(entry_arc) => entry_arc.read().await.sink_count(),
            None => 0,
        }
    }

    /// Close every sink queue, waking all blocked sink tasks.
    ///
    /// Used during shutdown so sink loops observe `Closed` even if they
    /// miss the broadcast signal. Source tasks are woken by the shutdown
    /// signal itself.
    pub async fn close_all(&self) {
        let datasets = self.datasets.read().await;
        for entry_arc in datasets.values() {
            let entry = entry_arc.read().await;
            for queue in entry.sinks.values() {
                queue.close();
            }
        }
    }

    fn get_or_create(
        datasets: &mut HashMap<String, Arc<RwLock<DatasetEntry>>>,
        name: &str,
    ) -> Arc<RwLock<DatasetEntry>> {
        match datasets.get(name) {
            Some(entry) => Arc::clone(entry),
            None => {
                let entry = Arc::new(RwLock::new(DatasetEntry::new()));
                datasets.insert(name.to_string(), Arc::clone(&entry));
                tracing::info!(dataset = %name, "Dataset created");
                entry
            }
        }
    }
}
