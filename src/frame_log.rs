use crate::codec::{describe, Frame, FrameDescription};
use heapless::Deque;
use serde::{Deserialize, Serialize};

pub const FRAME_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLogStats {
    pub appended: u64,
    pub discarded_while_paused: u64,
    pub evicted: u64,
    pub clears: u32,
}

/// A coherent copy of the log, newest frame first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSnapshot {
    pub frames: Vec<Frame>,
    pub paused: bool,
    pub message_count: usize,
    pub revision: u64,
}

impl LogSnapshot {
    pub fn describe(&self) -> Vec<FrameDescription> {
        self.frames.iter().map(describe).collect()
    }
}

/// Bounded most-recent-first log of emitted frames.
///
/// While paused, appends are dropped rather than buffered, so resuming shows
/// live traffic instead of replaying what was missed.
#[derive(Debug)]
pub struct FrameLog {
    frames: Deque<Frame, FRAME_LOG_CAPACITY>,
    limit: usize,
    paused: bool,
    revision: u64,
    stats: FrameLogStats,
}

impl FrameLog {
    pub fn new() -> Self {
        Self::with_limit(FRAME_LOG_CAPACITY)
    }

    /// Log holding at most `limit` frames (clamped to 1..=1000).
    pub fn with_limit(limit: usize) -> Self {
        Self {
            frames: Deque::new(),
            limit: limit.clamp(1, FRAME_LOG_CAPACITY),
            paused: false,
            revision: 0,
            stats: FrameLogStats::default(),
        }
    }

    /// Prepends `frame`, evicting the oldest entries past the limit.
    /// Returns false when the log is paused and the frame was dropped.
    pub fn append(&mut self, frame: Frame) -> bool {
        if self.paused {
            self.stats.discarded_while_paused += 1;
            return false;
        }

        while self.frames.len() >= self.limit {
            self.frames.pop_back();
            self.stats.evicted += 1;
        }

        let _ = self.frames.push_front(frame);
        self.stats.appended += 1;
        self.revision += 1;

        debug_assert!(
            self.frames.len() <= self.limit,
            "frame log length {} over limit {}",
            self.frames.len(),
            self.limit
        );
        true
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            self.revision += 1;
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.revision += 1;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Empties the log regardless of pause state.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.stats.clears += 1;
        self.revision += 1;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bumped on every append, clear, pause or resume.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn stats(&self) -> FrameLogStats {
        self.stats
    }

    /// Frames newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn latest(&self, count: usize) -> Vec<Frame> {
        self.frames.iter().take(count).cloned().collect()
    }

    pub fn snapshot(&self) -> LogSnapshot {
        LogSnapshot {
            frames: self.frames.iter().cloned().collect(),
            paused: self.paused,
            message_count: self.frames.len(),
            revision: self.revision,
        }
    }
}

impl Default for FrameLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CanId;

    fn frame(timestamp_ms: u64) -> Frame {
        Frame::padded(CanId::VEHICLE_SPEED, timestamp_ms, &[])
    }

    #[test]
    fn test_newest_frame_first() {
        let mut log = FrameLog::new();
        log.append(frame(1));
        log.append(frame(2));

        let timestamps: Vec<u64> = log.iter().map(Frame::timestamp_ms).collect();
        assert_eq!(timestamps, vec![2, 1]);
    }

    #[test]
    fn test_revision_tracks_mutations() {
        let mut log = FrameLog::new();
        assert_eq!(log.revision(), 0);
        log.append(frame(1));
        log.pause();
        log.pause();
        assert_eq!(log.revision(), 2);
        assert!(!log.append(frame(2)));
        assert_eq!(log.revision(), 2);
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(FrameLog::with_limit(0).limit(), 1);
        assert_eq!(FrameLog::with_limit(50_000).limit(), FRAME_LOG_CAPACITY);
    }
}
