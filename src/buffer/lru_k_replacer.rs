use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

#[derive(Debug, Default)]
struct History {
    /// Last k access times, oldest first
    accesses: VecDeque<Timestamp>,
    evictable: bool,
}

impl History {
    fn touch(&mut self, now: Timestamp, k: usize) {
        if self.accesses.len() == k {
            self.accesses.pop_front();
        }
        self.accesses.push_back(now);
    }

    /// Eviction rank: frames with fewer than k accesses rank first (infinite
    /// backward distance), then the oldest k-th access wins.
    fn rank(&self, k: usize) -> (bool, Reverse<Timestamp>) {
        let oldest = self.accesses.front().copied().unwrap_or(0);
        (self.accesses.len() < k, Reverse(oldest))
    }
}

#[derive(Debug, Default)]
struct ReplacerState {
    clock: Timestamp,
    frames: HashMap<FrameId, History>,
    evictable: usize,
}

/// LRU-K replacement policy over buffer pool frames.
///
/// Evicts the evictable frame with the largest backward k-distance. Frames
/// seen fewer than k times count as infinitely distant and fall back to
/// plain LRU among themselves.
pub struct LruKReplacer {
    k: usize,
    capacity: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    pub fn new(k: usize, capacity: usize) -> Self {
        Self {
            k: k.max(1),
            capacity,
            state: Mutex::new(ReplacerState::default()),
        }
    }

    /// Picks and forgets a victim frame. `None` when nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.evictable == 0 {
            return None;
        }

        let k = self.k;
        let victim = state
            .frames
            .iter()
            .filter(|(_, history)| history.evictable)
            .max_by_key(|(_, history)| history.rank(k))
            .map(|(frame_id, _)| *frame_id)?;

        state.frames.remove(&victim);
        state.evictable -= 1;
        Some(victim)
    }

    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.capacity {
            return;
        }
        let mut state = self.state.lock();
        let now = state.clock;
        state.clock += 1;
        state.frames.entry(frame_id).or_default().touch(now, self.k);
    }

    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        if frame_id.as_usize() >= self.capacity {
            return;
        }
        let mut state = self.state.lock();
        let history = state.frames.entry(frame_id).or_default();
        if history.evictable == evictable {
            return;
        }
        history.evictable = evictable;
        if evictable {
            state.evictable += 1;
        } else {
            state.evictable -= 1;
        }
    }

    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(history) = state.frames.remove(&frame_id) {
            if history.evictable {
                state.evictable -= 1;
            }
        }
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().evictable
    }

    pub fn k(&self) -> usize {
        self.k
    }
}
