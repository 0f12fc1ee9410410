//! Deduplicated chunk work set and the shared work queue.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::manifest::{ChunkId, ChunkIdentity, Manifest};

/// Where a chunk's plaintext goes: file index in the manifest plus offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub file: usize,
    pub offset: u64,
}

/// One distinct chunk and every place it must be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub identity: ChunkIdentity,
    pub destinations: Vec<Destination>,
}

impl WorkItem {
    pub fn plaintext_len(&self) -> u64 {
        u64::from(self.identity.original_len)
    }
}

/// Group every chunk reference of the manifest by content hash.
///
/// Items keep the order in which their chunk first appears; destinations
/// keep manifest order. Directory entries contribute nothing.
pub fn build_work_set(manifest: &Manifest) -> Vec<WorkItem> {
    let mut index: HashMap<ChunkId, usize> = HashMap::new();
    let mut items: Vec<WorkItem> = Vec::new();

    for (file, entry) in manifest.files.iter().enumerate() {
        if entry.is_directory() {
            continue;
        }
        for chunk in &entry.chunks {
            let destination = Destination {
                file,
                offset: chunk.offset,
            };
            match index.get(&chunk.identity.id) {
                Some(&i) => items[i].destinations.push(destination),
                None => {
                    index.insert(chunk.identity.id, items.len());
                    items.push(WorkItem {
                        identity: chunk.identity,
                        destinations: vec![destination],
                    });
                }
            }
        }
    }

    items
}

/// FIFO queue drained by the worker pool.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
}

impl WorkQueue {
    pub fn new(items: impl IntoIterator<Item = WorkItem>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().collect()),
        }
    }

    pub fn pop(&self) -> Option<WorkItem> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Remove and return everything still queued.
    pub fn drain(&self) -> Vec<WorkItem> {
        self.items.lock().drain(..).collect()
    }
}
