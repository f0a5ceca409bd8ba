use std::ops::RangeInclusive;

use crate::{Color, PixelBuffer};

/// Maximum value accepted by [`Canvas::set_brightness`].
pub const MAX_BRIGHTNESS: u8 = 100;

/// Drawing surface for one frame.
///
/// `x` is the column and `y` the row. Coordinates are signed so shapes may
/// hang off any edge; every operation clips silently and only touches pixels
/// that land on the canvas.
///
/// Brightness and luminance correction are stored, not applied: raw pixel
/// values read back exactly as written and the [`FrameEncoder`](crate::FrameEncoder)
/// applies both when the frame goes out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    pixels: PixelBuffer,
    brightness: u8,
    luminance_correction: bool,
}

impl Canvas {
    /// Create a black canvas at full brightness with luminance correction on.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            pixels: PixelBuffer::new(height, width),
            brightness: MAX_BRIGHTNESS,
            luminance_correction: true,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.pixels.cols()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.pixels.rows()
    }

    /// Underlying pixel storage.
    #[inline]
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    #[inline]
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Set output brightness in percent. Values above 100 saturate.
    pub fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness.min(MAX_BRIGHTNESS);
    }

    #[inline]
    pub fn luminance_correction(&self) -> bool {
        self.luminance_correction
    }

    pub fn set_luminance_correction(&mut self, enabled: bool) {
        self.luminance_correction = enabled;
    }

    /// Color at `(x, y)`, or `None` off the canvas.
    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        let (col, row) = self.locate(i64::from(x), i64::from(y))?;
        self.pixels.get(row, col).ok()
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        self.plot(i64::from(x), i64::from(y), color);
    }

    /// Set the whole canvas to black.
    pub fn clear(&mut self) {
        self.pixels.fill(Color::BLACK);
    }

    pub fn fill(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    /// Fill the `w × h` region whose top-left corner is `(x, y)`.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Color) {
        let Some((cols, rows)) = self.clip_rect(x, y, w, h) else {
            return;
        };
        for row in rows {
            for col in cols.clone() {
                // Clipped to the buffer above
                let _ = self.pixels.set(row, col, color);
            }
        }
    }

    /// Reset the `w × h` region whose top-left corner is `(x, y)` to black.
    pub fn clear_rect(&mut self, x: i32, y: i32, w: u32, h: u32) {
        self.fill_rect(x, y, w, h, Color::BLACK);
    }

    /// Line from `(x0, y0)` to `(x1, y1)`, both ends inclusive.
    ///
    /// One pixel per step along the major axis with the minor coordinate
    /// rounded to nearest. Only steps whose major coordinate lands on the
    /// canvas are visited, so the cost is bounded by the canvas size however
    /// far the endpoints lie.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
        let (x0, y0) = (i64::from(x0), i64::from(y0));
        let (x1, y1) = (i64::from(x1), i64::from(y1));

        if self.misses(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)) {
            return;
        }

        let x_major = (x1 - x0).abs() >= (y1 - y0).abs();
        let (major0, major1, minor0, minor1, extent) = if x_major {
            (x0, x1, y0, y1, self.width())
        } else {
            (y0, y1, x0, x1, self.height())
        };
        let steps = (major1 - major0).abs();
        let dir = if major1 >= major0 { 1 } else { -1 };

        for step in steps_within(major0, dir, steps, extent) {
            let major = major0 + dir * step;
            let minor = minor0 + rounded_share(minor1 - minor0, step, steps);
            if x_major {
                self.plot(major, minor, color);
            } else {
                self.plot(minor, major, color);
            }
        }
    }

    /// Midpoint circle outline centered on `(cx, cy)`.
    ///
    /// On each row offset `y` of the first octant the outline sits at the
    /// largest `x` whose pixel midpoint `x - 1/2` is inside the radius. The
    /// octant is mirrored eight ways, visiting only offsets that reach a
    /// canvas row or column. A radius of zero plots the center only; negative
    /// radii draw nothing.
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Color) {
        if radius < 0 {
            return;
        }
        let (cx, cy, r) = (i64::from(cx), i64::from(cy), i64::from(radius));
        if self.misses(cx - r, cy - r, cx + r, cy + r) {
            return;
        }

        for dir in [1, -1] {
            // Octants that run along rows: (cx ± x, cy ± y)
            for y in steps_within(cy, dir, r, self.height()) {
                let x = circle_offset(r, y);
                if y <= x {
                    self.plot(cx + x, cy + dir * y, color);
                    self.plot(cx - x, cy + dir * y, color);
                }
            }
            // Octants that run along columns: (cx ± y, cy ± x)
            for y in steps_within(cx, dir, r, self.width()) {
                let x = circle_offset(r, y);
                if y <= x {
                    self.plot(cx + dir * y, cy + x, color);
                    self.plot(cx + dir * y, cy - x, color);
                }
            }
        }
    }

    /// Outline of the `w × h` rectangle whose top-left corner is `(x, y)`.
    pub fn draw_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Color) {
        if w == 0 || h == 0 {
            return;
        }
        let (left, top) = (i64::from(x), i64::from(y));
        let right = left + i64::from(w) - 1;
        let bottom = top + i64::from(h) - 1;
        if self.misses(left, top, right, bottom) {
            return;
        }

        for col in left.max(-1)..=right.min(self.width() as i64) {
            self.plot(col, top, color);
            self.plot(col, bottom, color);
        }
        for row in top.max(-1)..=bottom.min(self.height() as i64) {
            self.plot(left, row, color);
            self.plot(right, row, color);
        }
    }

    /// Copy a row-major block of pixels `width` wide with its top-left corner
    /// at `(x, y)`. A trailing partial row is drawn as far as it goes.
    pub fn draw_buffer(&mut self, x: i32, y: i32, width: usize, pixels: &[Color]) {
        if width == 0 {
            return;
        }
        for (dy, row) in pixels.chunks(width).enumerate() {
            for (dx, &color) in row.iter().enumerate() {
                self.plot(i64::from(x) + dx as i64, i64::from(y) + dy as i64, color);
            }
        }
    }

    fn plot(&mut self, x: i64, y: i64, color: Color) {
        if let Some((col, row)) = self.locate(x, y) {
            // locate() only yields in-range coordinates
            let _ = self.pixels.set(row, col, color);
        }
    }

    fn locate(&self, x: i64, y: i64) -> Option<(usize, usize)> {
        let col = usize::try_from(x).ok().filter(|&c| c < self.width())?;
        let row = usize::try_from(y).ok().filter(|&r| r < self.height())?;
        Some((col, row))
    }

    /// True when the bounding box shares no pixel with the canvas.
    fn misses(&self, left: i64, top: i64, right: i64, bottom: i64) -> bool {
        right < 0 || bottom < 0 || left >= self.width() as i64 || top >= self.height() as i64
    }

    fn clip_rect(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
    ) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let left = i64::from(x).max(0);
        let top = i64::from(y).max(0);
        let right = (i64::from(x) + i64::from(w)).min(self.width() as i64);
        let bottom = (i64::from(y) + i64::from(h)).min(self.height() as i64);
        if left >= right || top >= bottom {
            return None;
        }
        Some((
            left as usize..right as usize,
            top as usize..bottom as usize,
        ))
    }
}

/// Steps in `0..=steps` for which `origin + dir * step` falls in `0..extent`.
fn steps_within(origin: i64, dir: i64, steps: i64, extent: usize) -> RangeInclusive<i64> {
    let last_index = extent as i64 - 1;
    let (first, last) = if dir >= 0 {
        (-origin, last_index - origin)
    } else {
        (origin - last_index, origin)
    };
    first.max(0)..=last.min(steps)
}

/// `delta * step / steps` rounded to nearest, halves toward positive.
fn rounded_share(delta: i64, step: i64, steps: i64) -> i64 {
    if steps == 0 {
        return 0;
    }
    let (delta, step, steps) = (i128::from(delta), i128::from(step), i128::from(steps));
    (2 * delta * step + steps).div_euclid(2 * steps) as i64
}

/// Largest `x` with `(x - 1/2)^2 < r^2 - y^2`, or 0 when there is none.
fn circle_offset(radius: i64, y: i64) -> i64 {
    let inside = i128::from(radius) * i128::from(radius) - i128::from(y) * i128::from(y);
    // The float root is within one of the answer; settle it exactly
    let mut x = (inside.max(0) as f64).sqrt() as i128 + 2;
    while x > 0 && x * (x - 1) >= inside {
        x -= 1;
    }
    x as i64
}
