use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::encoder::RowSelect;
use crate::{PanelSink, Segment};

/// Error injected by [`RecordingSink::fail_next_writes`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("injected write failure")]
pub struct InjectedFailure;

/// Owned copy of a [`Segment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSegment {
    pub row: RowSelect,
    pub address: usize,
    pub plane: u8,
    pub duration_ns: u32,
    pub columns: Vec<u32>,
}

impl From<&Segment<'_>> for RecordedSegment {
    fn from(segment: &Segment<'_>) -> Self {
        Self {
            row: segment.row,
            address: segment.address,
            plane: segment.plane,
            duration_ns: segment.duration_ns,
            columns: segment.columns.to_vec(),
        }
    }
}

/// A frame that reached `end_frame`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordedFrame {
    pub segments: Vec<RecordedSegment>,
}

impl RecordedFrame {
    /// True when every column word is zero.
    pub fn is_blank(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| segment.columns.iter().all(|&word| word == 0))
    }
}

#[derive(Debug, Default)]
struct Recording {
    frames: VecDeque<RecordedFrame>,
    limit: Option<usize>,
    pending: Option<RecordedFrame>,
    last_abandoned: Option<RecordedFrame>,
    completed: u64,
    abandoned: u64,
    writes_before_failure: usize,
    failures_left: usize,
}

/// Panel sink that keeps completed frames in memory.
///
/// Clones share one recording, so a test can hand one clone to a
/// [`RefreshLoop`](crate::RefreshLoop) and inspect another. A frame is
/// recorded only once `end_frame` is called; a frame interrupted by a
/// failure is counted as abandoned when the next one begins.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSink {
    /// Record every frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the most recent `limit` frames.
    pub fn bounded(limit: usize) -> Self {
        let sink = Self::new();
        sink.lock().limit = Some(limit.max(1));
        sink
    }

    /// Fail the next `count` segment writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes_after(0, count);
    }

    /// Let `successes` segment writes through, then fail the next `count`.
    /// Failing part way into a frame leaves its segments on the panel.
    pub fn fail_writes_after(&self, successes: usize, count: usize) {
        let mut recording = self.lock();
        recording.writes_before_failure = successes;
        recording.failures_left = count;
    }

    /// Retained frames, oldest first.
    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.lock().frames.iter().cloned().collect()
    }

    pub fn last_frame(&self) -> Option<RecordedFrame> {
        self.lock().frames.back().cloned()
    }

    /// Number of frames completed, including any no longer retained.
    pub fn completed(&self) -> u64 {
        self.lock().completed
    }

    /// Segments written by the most recent frame that was never completed.
    pub fn last_abandoned(&self) -> Option<RecordedFrame> {
        self.lock().last_abandoned.clone()
    }

    /// Number of frames begun but never completed.
    pub fn abandoned(&self) -> u64 {
        let recording = self.lock();
        recording.abandoned + u64::from(recording.pending.is_some())
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PanelSink for RecordingSink {
    type Error = InjectedFailure;

    fn begin_frame(&mut self) -> Result<(), Self::Error> {
        let mut recording = self.lock();
        if let Some(partial) = recording.pending.replace(RecordedFrame::default()) {
            recording.abandoned += 1;
            recording.last_abandoned = Some(partial);
        }
        Ok(())
    }

    fn write_segment(&mut self, segment: &Segment<'_>) -> Result<(), Self::Error> {
        let mut recording = self.lock();
        if recording.failures_left > 0 {
            if recording.writes_before_failure > 0 {
                recording.writes_before_failure -= 1;
            } else {
                recording.failures_left -= 1;
                return Err(InjectedFailure);
            }
        }
        recording
            .pending
            .get_or_insert_with(RecordedFrame::default)
            .segments
            .push(segment.into());
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), Self::Error> {
        let mut recording = self.lock();
        let Some(frame) = recording.pending.take() else {
            return Ok(());
        };
        if let Some(limit) = recording.limit {
            while recording.frames.len() >= limit {
                recording.frames.pop_front();
            }
        }
        recording.frames.push_back(frame);
        recording.completed += 1;
        Ok(())
    }
}
