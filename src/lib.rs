pub mod canvas;
pub mod color;
pub mod encoder;
pub mod mapper;
pub mod options;
pub mod pixel_buffer;
pub mod refresh;
pub mod swap;
pub mod telemetry;

pub use canvas::Canvas;
pub use color::Color;
pub use encoder::{EncodedFrame, FrameEncoder, RowSelect, Segment};
pub use mapper::{MapperChain, PixelMapper};
pub use options::{ConfigError, MatrixConfig, MatrixOptions};
pub use pixel_buffer::{OutOfRange, PixelBuffer};
pub use refresh::{LoopState, RefreshLoop, RefreshStats, StateError, StateWatch};
pub use swap::{DoubleBuffer, FrontBuffer};
pub use telemetry::{LogTelemetry, RefreshTelemetry};

/// Trait for driving encoded frames out to a panel.
///
/// Abstracts over the GPIO bit-banging driver (ESP32) and host-side
/// recording or terminal rendering, giving [`RefreshLoop`] a uniform
/// output interface.
pub trait PanelSink {
    /// Error type for hardware write failures.
    type Error: std::fmt::Debug + std::fmt::Display;

    /// Called before the first segment of every frame.
    fn begin_frame(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Shift out the segment's column words, latch them, select its row and
    /// keep the output enabled for `segment.duration_ns`.
    fn write_segment(&mut self, segment: &Segment<'_>) -> Result<(), Self::Error>;

    /// Called after the last segment of a frame that was emitted completely.
    fn end_frame(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
pub mod esp32;

#[cfg(not(target_os = "espidf"))]
pub mod mock;
