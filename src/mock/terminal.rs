use std::io::{self, Write};

use crate::encoder::column_bit;
use crate::options::MatrixConfig;
use crate::{PanelSink, Segment};

/// Error type for terminal sink operations.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("failed to write to terminal: {0}")]
    Io(#[from] io::Error),
    #[error("segment for row {address} with {columns} columns does not fit the panel")]
    Geometry { address: usize, columns: usize },
}

/// Terminal panel for development without hardware.
///
/// Reassembles the bit planes of each frame into per-LED levels and draws
/// the hardware view (scan rows as driven, shift positions left to right,
/// one block per chain and half) with ANSI truecolor backgrounds. The
/// screen is only redrawn when a frame differs from the last one shown.
#[derive(Debug)]
pub struct TerminalSink<W: Write = io::Stdout> {
    writer: W,
    scan_rows: usize,
    shift_length: usize,
    parallel: usize,
    max_level: u32,
    levels: Vec<[u16; 3]>,
    shown: Option<Vec<[u16; 3]>>,
}

impl TerminalSink {
    /// Render to stdout.
    pub fn new(config: &MatrixConfig) -> Self {
        Self::with_writer(config, io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    /// Render to any writer.
    pub fn with_writer(config: &MatrixConfig, writer: W) -> Self {
        let (scan_rows, shift_length, parallel) =
            (config.scan_rows(), config.shift_length(), config.parallel());
        Self {
            writer,
            scan_rows,
            shift_length,
            parallel,
            max_level: (1 << config.pwm_bits()) - 1,
            levels: vec![[0; 3]; parallel * 2 * scan_rows * shift_length],
            shown: None,
        }
    }

    /// Give the writer back.
    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Hardware rows on screen: both halves of every parallel chain.
    fn display_rows(&self) -> usize {
        self.parallel * 2 * self.scan_rows
    }

    fn index(&self, chain: usize, lower: bool, address: usize, position: usize) -> usize {
        let row = chain * 2 * self.scan_rows + usize::from(lower) * self.scan_rows + address;
        row * self.shift_length + position
    }
}

impl<W: Write> PanelSink for TerminalSink<W> {
    type Error = TerminalError;

    fn begin_frame(&mut self) -> Result<(), Self::Error> {
        self.levels.fill([0; 3]);
        Ok(())
    }

    fn write_segment(&mut self, segment: &Segment<'_>) -> Result<(), Self::Error> {
        if segment.address >= self.scan_rows || segment.columns.len() != self.shift_length {
            return Err(TerminalError::Geometry {
                address: segment.address,
                columns: segment.columns.len(),
            });
        }

        let weight = 1u16 << segment.plane;
        for (position, &word) in segment.columns.iter().enumerate() {
            if word == 0 {
                continue;
            }
            for chain in 0..self.parallel {
                for lower in [false, true] {
                    let index = self.index(chain, lower, segment.address, position);
                    for pin in 0..3 {
                        if word & column_bit(chain, lower, pin) != 0 {
                            self.levels[index][pin] |= weight;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), Self::Error> {
        if self.shown.as_ref() == Some(&self.levels) {
            return Ok(());
        }
        let rows = self.display_rows();
        render_levels(
            &mut self.writer,
            &self.levels,
            rows,
            self.shift_length,
            self.max_level,
        )?;
        self.shown = Some(self.levels.clone());
        Ok(())
    }
}

/// Draw a level grid, two characters per LED. Extracted for testability.
fn render_levels(
    w: &mut impl Write,
    levels: &[[u16; 3]],
    rows: usize,
    cols: usize,
    max_level: u32,
) -> Result<(), TerminalError> {
    // Cursor home so frames overwrite each other
    write!(w, "\x1b[H")?;
    for row in levels.chunks(cols).take(rows) {
        for &led in row {
            let [r, g, b] = led.map(|level| to_byte(level, max_level));
            write!(w, "\x1b[48;2;{r};{g};{b}m  ")?;
        }
        writeln!(w, "\x1b[0m")?;
    }
    w.flush()?;
    Ok(())
}

fn to_byte(level: u16, max_level: u32) -> u8 {
    (u32::from(level) * 255 / max_level.max(1)).min(255) as u8
}
