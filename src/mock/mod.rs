mod recording;
mod terminal;

pub use recording::{InjectedFailure, RecordedFrame, RecordedSegment, RecordingSink};
pub use terminal::{TerminalError, TerminalSink};
