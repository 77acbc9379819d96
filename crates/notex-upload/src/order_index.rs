//! Per-note order index allocation.
//!
//! Produces a display position for a new image such that no two images of the
//! same note ever share one, even with concurrent workers. Serialization is
//! per note, not global: a fixed-size array of locks hashed by note id keeps
//! uploads to different notes fully parallel without an ever-growing lock
//! table. The storage layer's UNIQUE (note_id, order_index) constraint backs
//! this up.

use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use notex_core::models::{NewNoteImage, NoteImage};
use notex_db::NoteImageStore;

const LOCK_SHARDS: usize = 64;

pub struct OrderIndexAllocator {
    images: Arc<dyn NoteImageStore>,
    shards: Vec<Mutex<()>>,
}

impl OrderIndexAllocator {
    pub fn new(images: Arc<dyn NoteImageStore>) -> Self {
        Self {
            images,
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard_for(note_id: &Uuid) -> usize {
        let mut hasher = DefaultHasher::new();
        note_id.hash(&mut hasher);
        (hasher.finish() as usize) % LOCK_SHARDS
    }

    /// Assign the next order index for `note_id` and insert the image record.
    ///
    /// The read of the current maximum and the insert happen under the same
    /// per-note exclusive section, so concurrent uploads to one note claim
    /// strictly increasing indices. Existing indices may be sparse (the note
    /// editor compacts after deletions); the next index is simply max + 1, or
    /// 0 for a note with no images.
    pub async fn assign_next(&self, note_id: Uuid, filename: &str) -> Result<NoteImage> {
        let _guard = self.shards[Self::shard_for(&note_id)].lock().await;

        let next = self
            .images
            .max_order_index(note_id)
            .await
            .context("Failed to read current max order index")?
            .map(|max| max + 1)
            .unwrap_or(0);

        self.images
            .insert(NewNoteImage {
                note_id,
                filename: filename.to_string(),
                order_index: next,
            })
            .await
            .context("Failed to insert note image")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockNoteImageStore;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_allocations_for_one_note_are_dense_and_distinct() {
        let images = Arc::new(MockNoteImageStore::new());
        let allocator = Arc::new(OrderIndexAllocator::new(images.clone()));
        let note_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for i in 0..12 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                allocator
                    .assign_next(note_id, &format!("file-{i}.png"))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut indices: Vec<i32> = images
            .list_for_note(note_id)
            .await
            .unwrap()
            .into_iter()
            .map(|img| img.order_index)
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..12).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn sparse_existing_indices_are_tolerated() {
        let images = Arc::new(MockNoteImageStore::new());
        let note_id = Uuid::new_v4();
        images.seed(note_id, &[0, 7]).await;

        let allocator = OrderIndexAllocator::new(images);
        let image = allocator.assign_next(note_id, "next.png").await.unwrap();
        assert_eq!(image.order_index, 8);
    }

    #[tokio::test]
    async fn first_image_gets_index_zero() {
        let images = Arc::new(MockNoteImageStore::new());
        let allocator = OrderIndexAllocator::new(images);
        let image = allocator
            .assign_next(Uuid::new_v4(), "first.png")
            .await
            .unwrap();
        assert_eq!(image.order_index, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_note_does_not_block_other_notes() {
        let images = Arc::new(MockNoteImageStore::new());
        let allocator = Arc::new(OrderIndexAllocator::new(images.clone()));

        let slow_note = Uuid::new_v4();
        // Pick a fast note hashed to a different lock shard.
        let fast_note = loop {
            let candidate = Uuid::new_v4();
            if OrderIndexAllocator::shard_for(&candidate)
                != OrderIndexAllocator::shard_for(&slow_note)
            {
                break candidate;
            }
        };

        images
            .delay_max_index(slow_note, Duration::from_millis(500))
            .await;

        let slow = {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.assign_next(slow_note, "slow.png").await })
        };
        // Give the slow allocation time to take its shard lock.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let fast = tokio::time::timeout(
            Duration::from_millis(250),
            allocator.assign_next(fast_note, "fast.png"),
        )
        .await;
        assert!(fast.is_ok(), "allocation for another note was blocked");

        slow.await.unwrap().unwrap();
    }
}
