//! Bounded per-kind FIFO admission for the fetch backend.
//!
//! Each media kind has its own lane: a FIFO of queued entries plus a single
//! processing slot. Lanes never interact. All operations take a short
//! synchronous lock and never block on I/O.

mod types;

pub use types::{LaneStatus, QueueEntry, QueueError, QueueStatus, QueueSnapshot};

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::config::QueueConfig;
use crate::media::MediaKind;
use crate::metrics;

#[derive(Debug)]
struct Lane {
    capacity: usize,
    queued: VecDeque<QueueEntry>,
    processing: Option<QueueEntry>,
}

impl Lane {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queued: VecDeque::new(),
            processing: None,
        }
    }

    fn contains(&self, media_id: i64) -> bool {
        self.processing.as_ref().is_some_and(|e| e.media_id == media_id)
            || self.queued.iter().any(|e| e.media_id == media_id)
    }

    /// Processing entry first, then queued entries in order.
    fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.processing.iter().chain(self.queued.iter())
    }

    fn status(&self) -> LaneStatus {
        LaneStatus {
            queued: self.queued.len(),
            capacity: self.capacity,
            processing: self.processing.as_ref().map(|e| e.media_id),
        }
    }
}

#[derive(Debug)]
struct Lanes {
    movie: Lane,
    show: Lane,
}

impl Lanes {
    fn lane(&self, kind: MediaKind) -> &Lane {
        match kind {
            MediaKind::Movie => &self.movie,
            MediaKind::Show => &self.show,
        }
    }

    fn lane_mut(&mut self, kind: MediaKind) -> &mut Lane {
        match kind {
            MediaKind::Movie => &mut self.movie,
            MediaKind::Show => &mut self.show,
        }
    }

    fn kind_of(&self, media_id: i64) -> Option<MediaKind> {
        MediaKind::ALL
            .into_iter()
            .find(|&kind| self.lane(kind).contains(media_id))
    }
}

/// Two independent bounded queues, one per media kind.
#[derive(Debug)]
pub struct DispatchQueue {
    lanes: Mutex<Lanes>,
    average_item: Duration,
}

impl DispatchQueue {
    pub fn new(movie_capacity: usize, show_capacity: usize, average_item: Duration) -> Self {
        Self {
            lanes: Mutex::new(Lanes {
                movie: Lane::new(movie_capacity),
                show: Lane::new(show_capacity),
            }),
            average_item,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.movie_max_size,
            config.tv_max_size,
            Duration::from_secs(config.average_item_secs),
        )
    }

    fn lanes(&self) -> MutexGuard<'_, Lanes> {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append to the tail of the kind's queue.
    pub fn enqueue(&self, media_id: i64, kind: MediaKind) -> Result<QueueEntry, QueueError> {
        let mut lanes = self.lanes();
        if lanes.kind_of(media_id).is_some() {
            metrics::QUEUE_REJECTIONS
                .with_label_values(&[kind.as_str(), "already_queued"])
                .inc();
            return Err(QueueError::AlreadyQueued { media_id });
        }

        let lane = lanes.lane_mut(kind);
        if lane.queued.len() >= lane.capacity {
            metrics::QUEUE_REJECTIONS
                .with_label_values(&[kind.as_str(), "queue_full"])
                .inc();
            return Err(QueueError::QueueFull {
                kind,
                capacity: lane.capacity,
            });
        }

        let entry = QueueEntry {
            media_id,
            kind,
            queue_status: QueueStatus::Queued,
            queue_added_at: Utc::now(),
            processing_started_at: None,
        };
        lane.queued.push_back(entry.clone());
        update_depth(kind, lane);
        debug!("Enqueued media {} on {} queue", media_id, kind);
        Ok(entry)
    }

    /// Move the head into the processing slot.
    ///
    /// Returns `None` when the slot is occupied or nothing is queued.
    pub fn promote_next(&self, kind: MediaKind) -> Option<QueueEntry> {
        let mut lanes = self.lanes();
        let lane = lanes.lane_mut(kind);
        if lane.processing.is_some() {
            return None;
        }
        let mut entry = lane.queued.pop_front()?;
        entry.queue_status = QueueStatus::Processing;
        entry.processing_started_at = Some(Utc::now());
        lane.processing = Some(entry.clone());
        update_depth(kind, lane);
        Some(entry)
    }

    /// Remove the entry in whatever state it is. Skipping an absent entry is a no-op.
    pub fn skip(&self, media_id: i64) -> Option<QueueEntry> {
        let mut lanes = self.lanes();
        let kind = lanes.kind_of(media_id)?;
        let lane = lanes.lane_mut(kind);

        let removed = if lane.processing.as_ref().is_some_and(|e| e.media_id == media_id) {
            lane.processing.take()
        } else {
            let pos = lane.queued.iter().position(|e| e.media_id == media_id)?;
            lane.queued.remove(pos)
        };
        update_depth(kind, lane);
        removed
    }

    /// Remove every entry of `kind` (both kinds when `None`), returning them
    /// in queue order with processing entries first.
    pub fn drain(&self, kind: Option<MediaKind>) -> Vec<QueueEntry> {
        let mut lanes = self.lanes();
        let kinds: Vec<MediaKind> = match kind {
            Some(k) => vec![k],
            None => MediaKind::ALL.to_vec(),
        };

        let mut drained = Vec::new();
        for k in kinds {
            let lane = lanes.lane_mut(k);
            drained.extend(lane.processing.take());
            drained.extend(lane.queued.drain(..));
            update_depth(k, lane);
        }
        drained
    }

    /// Release the processing slot held by `media_id`.
    pub fn complete(&self, media_id: i64) -> Option<QueueEntry> {
        let mut lanes = self.lanes();
        let kind = lanes.kind_of(media_id)?;
        let lane = lanes.lane_mut(kind);
        if lane.processing.as_ref().is_some_and(|e| e.media_id == media_id) {
            lane.processing.take()
        } else {
            None
        }
    }

    /// Put the processing entry for `media_id` back at the head of its queue.
    ///
    /// The entry was already admitted, so this may exceed capacity by one.
    pub fn requeue_front(&self, media_id: i64) -> bool {
        let mut lanes = self.lanes();
        let Some(kind) = lanes.kind_of(media_id) else {
            return false;
        };
        let lane = lanes.lane_mut(kind);
        match lane.processing.take() {
            Some(mut entry) if entry.media_id == media_id => {
                entry.queue_status = QueueStatus::Queued;
                entry.processing_started_at = None;
                lane.queued.push_front(entry);
                update_depth(kind, lane);
                true
            }
            other => {
                lane.processing = other;
                false
            }
        }
    }

    pub fn contains(&self, media_id: i64) -> bool {
        self.lanes().kind_of(media_id).is_some()
    }

    pub fn get(&self, media_id: i64) -> Option<QueueEntry> {
        let lanes = self.lanes();
        let kind = lanes.kind_of(media_id)?;
        // Bound before returning so the iterator drops ahead of the guard.
        let found = lanes
            .lane(kind)
            .entries()
            .find(|e| e.media_id == media_id)
            .cloned();
        found
    }

    /// The entry currently processing for `kind`.
    pub fn current(&self, kind: MediaKind) -> Option<QueueEntry> {
        self.lanes().lane(kind).processing.clone()
    }

    /// Entries of one kind, or of both (movies first), in queue order.
    pub fn list(&self, kind: Option<MediaKind>) -> Vec<QueueEntry> {
        let lanes = self.lanes();
        let entries = match kind {
            Some(k) => lanes.lane(k).entries().cloned().collect(),
            None => MediaKind::ALL
                .into_iter()
                .flat_map(|k| lanes.lane(k).entries().cloned().collect::<Vec<_>>())
                .collect(),
        };
        entries
    }

    pub fn status(&self) -> QueueSnapshot {
        let lanes = self.lanes();
        QueueSnapshot {
            movie: lanes.movie.status(),
            show: lanes.show.status(),
        }
    }

    /// Advisory wait before `media_id` reaches the processing slot.
    /// Zero when it is processing; `None` when it is not queued.
    pub fn estimated_wait(&self, media_id: i64) -> Option<Duration> {
        let lanes = self.lanes();
        let kind = lanes.kind_of(media_id)?;
        let lane = lanes.lane(kind);
        if lane.processing.as_ref().is_some_and(|e| e.media_id == media_id) {
            return Some(Duration::ZERO);
        }
        let position = lane.queued.iter().position(|e| e.media_id == media_id)?;
        let ahead = position + usize::from(lane.processing.is_some());
        Some(self.average_item * ahead as u32)
    }
}

fn update_depth(kind: MediaKind, lane: &Lane) {
    metrics::QUEUE_DEPTH
        .with_label_values(&[kind.as_str()])
        .set(lane.queued.len() as i64);
}
