use std::sync::{Arc, Mutex, PoisonError};

use crate::Canvas;
use crate::options::MatrixConfig;

/// Read side of a [`DoubleBuffer`], handed to the refresh loop.
///
/// The published front canvas is immutable behind an `Arc`. Taking a
/// snapshot holds the slot lock only long enough to clone the pointer, so
/// the reader never blocks the drawing side for longer than a swap.
#[derive(Debug, Clone)]
pub struct FrontBuffer {
    slot: Arc<Mutex<Arc<Canvas>>>,
}

impl FrontBuffer {
    /// The canvas currently on display.
    pub fn snapshot(&self) -> Arc<Canvas> {
        // The slot only ever holds a whole pointer, so a poisoned lock still
        // guards a consistent value.
        Arc::clone(&self.slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn exchange(&self, canvas: Arc<Canvas>) -> Arc<Canvas> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, canvas)
    }
}

/// Front and back canvases with a tear-free swap.
///
/// The drawing side owns the `DoubleBuffer` and draws into
/// [`back_buffer`](Self::back_buffer), which nothing else can see.
/// [`swap`](Self::swap) publishes the back canvas as the new front in a
/// single pointer exchange and hands the previous front back for drawing.
#[derive(Debug)]
pub struct DoubleBuffer {
    back: Canvas,
    front: FrontBuffer,
}

impl DoubleBuffer {
    /// Two black canvases sized for `config`, at the configured brightness.
    pub fn new(config: &MatrixConfig) -> Self {
        let mut canvas = Canvas::new(config.width(), config.height());
        canvas.set_brightness(config.brightness());
        Self::from_canvases(canvas.clone(), canvas)
    }

    /// Start from explicit canvases.
    pub fn from_canvases(front: Canvas, back: Canvas) -> Self {
        Self {
            back,
            front: FrontBuffer {
                slot: Arc::new(Mutex::new(Arc::new(front))),
            },
        }
    }

    /// Canvas for drawing the next frame.
    #[inline]
    pub fn back_buffer(&mut self) -> &mut Canvas {
        &mut self.back
    }

    /// Canvas currently published for display.
    pub fn front_buffer(&self) -> Arc<Canvas> {
        self.front.snapshot()
    }

    /// Handle the refresh loop reads the front canvas through.
    pub fn front_handle(&self) -> FrontBuffer {
        self.front.clone()
    }

    /// Publish the back canvas and take the old front as the new back.
    ///
    /// If the refresh loop is still emitting the old front, the new back
    /// starts as a copy of it instead; the published canvas is never touched.
    pub fn swap(&mut self) {
        let width = self.back.width();
        let height = self.back.height();
        let drawn = std::mem::replace(&mut self.back, Canvas::new(width, height));
        let previous = self.front.exchange(Arc::new(drawn));
        self.back = Arc::try_unwrap(previous).unwrap_or_else(|shared| (*shared).clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use crate::options::MatrixOptions;

    fn buffers() -> DoubleBuffer {
        DoubleBuffer::from_canvases(Canvas::new(4, 4), Canvas::new(4, 4))
    }

    #[test]
    fn new_buffers_match_config() {
        let config = MatrixOptions {
            rows: 16,
            cols: 32,
            chain_length: 2,
            brightness: 40,
            ..MatrixOptions::default()
        }
        .validate()
        .expect("valid");

        let mut buffers = DoubleBuffer::new(&config);

        assert_eq!(buffers.front_buffer().width(), 64);
        assert_eq!(buffers.back_buffer().height(), 16);
        assert_eq!(buffers.back_buffer().brightness(), 40);
    }

    #[test]
    fn swap_publishes_back_buffer() {
        let mut buffers = buffers();
        buffers.back_buffer().set_pixel(1, 1, Color::RED);
        let drawn = buffers.back_buffer().clone();

        buffers.swap();

        assert_eq!(*buffers.front_buffer(), drawn);
    }

    #[test]
    fn swap_returns_previous_front() {
        let mut buffers = buffers();
        buffers.back_buffer().fill(Color::GREEN);
        buffers.swap();
        buffers.back_buffer().fill(Color::BLUE);

        buffers.swap();

        assert_eq!(buffers.back_buffer().pixel(0, 0), Some(Color::GREEN));
        assert_eq!(buffers.front_buffer().pixel(0, 0), Some(Color::BLUE));
    }

    #[test]
    fn drawing_does_not_touch_front() {
        let mut buffers = buffers();
        let before = buffers.front_buffer();

        buffers.back_buffer().fill(Color::WHITE);

        assert_eq!(buffers.front_buffer(), before);
        assert_eq!(buffers.front_buffer().pixel(0, 0), Some(Color::BLACK));
    }

    #[test]
    fn held_snapshot_survives_swap() {
        let mut buffers = buffers();
        buffers.back_buffer().fill(Color::RED);
        buffers.swap();
        let on_display = buffers.front_handle().snapshot();

        buffers.back_buffer().fill(Color::GREEN);
        buffers.swap();
        // The old front comes back as a copy while the snapshot is alive
        buffers.back_buffer().fill(Color::BLUE);

        assert_eq!(on_display.pixel(0, 0), Some(Color::RED));
        assert_eq!(buffers.front_buffer().pixel(0, 0), Some(Color::GREEN));
    }

    #[test]
    fn front_handle_sees_swaps() {
        let mut buffers = buffers();
        let handle = buffers.front_handle();

        buffers.back_buffer().set_pixel(3, 3, Color::WHITE);
        buffers.swap();

        assert_eq!(handle.snapshot().pixel(3, 3), Some(Color::WHITE));
    }
}
