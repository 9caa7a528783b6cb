//! Per-chat playback queue
//!
//! Index 0 is the current (playing or about to play) track. The head only
//! leaves the queue through `get_next` or `clear`; every other mutation
//! works behind it.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::VecDeque;

use super::track::Track;

/// Outcome of appending a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "position", rename_all = "snake_case")]
pub enum Enqueued {
    /// Queue was empty; the track became current
    Started,
    /// Track waits at this position, counted from the head (1 = next)
    QueuedAt(usize),
}

/// Ordered tracks of one chat
#[derive(Debug, Clone, Default)]
pub struct ChatQueue {
    items: VecDeque<Track>,
}

impl ChatQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail
    pub fn add(&mut self, track: Track) -> Enqueued {
        self.items.push_back(track);
        match self.items.len() - 1 {
            0 => Enqueued::Started,
            position => Enqueued::QueuedAt(position),
        }
    }

    /// Insert so the track plays next, optionally deleting an older copy
    ///
    /// `remove_at` names the index of a copy already in the queue; it is
    /// removed before insertion so the track appears once. Returns the
    /// index the track landed at: 0 when the queue was empty, else 1.
    ///
    /// A `remove_at` of 0 refers to the current track itself; the queue is
    /// left untouched and 0 is returned.
    pub fn force_add(&mut self, track: Track, remove_at: Option<usize>) -> usize {
        match remove_at {
            Some(0) if !self.items.is_empty() => return 0,
            Some(index) if index < self.items.len() => {
                self.items.remove(index);
            }
            _ => {}
        }

        if self.items.is_empty() {
            self.items.push_back(track);
            0
        } else {
            self.items.insert(1, track);
            1
        }
    }

    /// Current track without removing it
    pub fn current(&self) -> Option<&Track> {
        self.items.front()
    }

    pub fn current_mut(&mut self) -> Option<&mut Track> {
        self.items.front_mut()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.items.get_mut(index)
    }

    /// Drop the head and return the new head
    ///
    /// The only operation that advances the current track.
    pub fn get_next(&mut self) -> Option<&Track> {
        self.items.pop_front();
        self.items.front()
    }

    /// Locate a track by id
    ///
    /// Returns None when the id is no longer queued (it may have been
    /// consumed by an earlier advance).
    pub fn check_item(&self, track_id: &str) -> Option<(usize, &Track)> {
        self.items
            .iter()
            .enumerate()
            .find(|(_, track)| track.id == track_id)
    }

    /// Randomize everything behind the head
    ///
    /// Returns false (and leaves the order alone) with fewer than two
    /// upcoming tracks.
    pub fn shuffle(&mut self) -> bool {
        self.shuffle_with(&mut rand::thread_rng())
    }

    /// `shuffle` with a caller-supplied random source
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.items.len() < 3 {
            return false;
        }
        self.items.make_contiguous()[1..].shuffle(rng);
        true
    }

    /// Remove every track
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Read-only copy in playback order
    pub fn snapshot(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all track durations, head included
    pub fn total_duration_seconds(&self) -> u64 {
        self.items.iter().map(|t| t.duration_seconds).sum()
    }
}
