mod luminance;
mod multiplex;

use luminance::{IntensityTable, quantize};
use multiplex::{PanelMap, scan_order};

use crate::options::{MatrixConfig, RowAddressType};
use crate::{Canvas, Color};

/// Data bits per parallel chain in a column word: R1 G1 B1 R2 G2 B2.
pub const BITS_PER_CHAIN: usize = 6;

/// Mask of the data bit for one pin of one chain.
///
/// `lower` selects the lower half of the panel (the R2/G2/B2 pins); `pin` is
/// 0 for R, 1 for G and 2 for B.
#[inline]
pub const fn column_bit(chain: usize, lower: bool, pin: usize) -> u32 {
    let half = if lower { 3 } else { 0 };
    1 << (chain * BITS_PER_CHAIN + half + pin)
}

/// How a sink selects the scan row a segment is shown on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowSelect {
    /// Put this binary address on the A..E lines.
    Lines(u8),
    /// Flush the row shift register with one zero clock per scan row, then
    /// clock in a single one. Selects the first scan row whatever the
    /// register held before, including bits left by an abandoned frame.
    Restart,
    /// Clock a zero into the row shift register, moving the selection to
    /// the next scan row.
    Advance,
    /// Keep the row selected by an earlier segment.
    Hold,
}

/// One scan row of an encoded frame: a column word vector per bit plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanRow {
    address: usize,
    select: RowSelect,
    planes: Vec<Vec<u32>>,
}

impl ScanRow {
    /// Row address; the row and the row half a panel below it are lit.
    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Column words of bit plane `plane`, in shift order.
    pub fn plane(&self, plane: usize) -> Option<&[u32]> {
        self.planes.get(plane).map(Vec::as_slice)
    }
}

/// Borrowed (row select, column data, duration) triple handed to a
/// [`PanelSink`](crate::PanelSink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub row: RowSelect,
    pub address: usize,
    pub plane: u8,
    /// How long the output stays enabled after latching `columns`.
    pub duration_ns: u32,
    /// Column words in shift order; see [`column_bit`] for the bit layout.
    pub columns: &'a [u32],
}

/// Complete binary-coded-modulation sequence for one refresh.
///
/// Immutable once built. Emitting it means walking [`EncodedFrame::segments`]
/// in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedFrame {
    plane_durations_ns: Vec<u32>,
    scan_rows: Vec<ScanRow>,
}

impl EncodedFrame {
    /// Number of bit planes per scan row.
    #[inline]
    pub fn plane_count(&self) -> usize {
        self.plane_durations_ns.len()
    }

    /// On-time of each plane, least significant first.
    #[inline]
    pub fn plane_durations_ns(&self) -> &[u32] {
        &self.plane_durations_ns
    }

    /// Scan rows in emission order.
    #[inline]
    pub fn scan_rows(&self) -> &[ScanRow] {
        &self.scan_rows
    }

    /// Every segment of the frame in emission order: all planes of the first
    /// scan row, then all planes of the next.
    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> + '_ {
        self.scan_rows.iter().flat_map(move |row| {
            row.planes.iter().enumerate().map(move |(plane, columns)| Segment {
                row: match (plane, row.select) {
                    (0, select) => select,
                    (_, RowSelect::Restart | RowSelect::Advance) => RowSelect::Hold,
                    (_, select) => select,
                },
                address: row.address,
                plane: plane as u8,
                duration_ns: self.plane_durations_ns[plane],
                columns,
            })
        })
    }

    /// True when no data bit is set anywhere.
    pub fn is_blank(&self) -> bool {
        self.scan_rows
            .iter()
            .flat_map(|row| row.planes.iter())
            .all(|plane| plane.iter().all(|&word| word == 0))
    }
}

/// Turns canvas snapshots into [`EncodedFrame`]s for one configuration.
///
/// Everything derived from the configuration (pixel mapping, scan order)
/// is computed up front; the intensity table is rebuilt only when a canvas
/// arrives with a different brightness or luminance setting.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    config: MatrixConfig,
    map: PanelMap,
    order: Vec<usize>,
    intensity: IntensityTable,
}

impl FrameEncoder {
    pub fn new(config: &MatrixConfig) -> Self {
        Self {
            map: PanelMap::new(config),
            order: scan_order(config.scan_rows(), config.scan_mode()),
            intensity: IntensityTable::new(config.brightness(), true),
            config: config.clone(),
        }
    }

    /// Encode `canvas` into bit planes.
    ///
    /// Pixels the configuration expects but the canvas lacks encode as black.
    pub fn encode(&mut self, canvas: &Canvas) -> EncodedFrame {
        if !self
            .intensity
            .matches(canvas.brightness(), canvas.luminance_correction())
        {
            self.intensity =
                IntensityTable::new(canvas.brightness(), canvas.luminance_correction());
        }

        let scan_rows = self
            .order
            .iter()
            .enumerate()
            .map(|(position, &address)| ScanRow {
                address,
                select: self.row_select(position, address),
                planes: self.encode_row(canvas, address),
            })
            .collect();

        EncodedFrame {
            plane_durations_ns: self.plane_durations(),
            scan_rows,
        }
    }

    /// All-zero frame with the shape of a real one. Emitting it turns every
    /// LED off.
    pub fn blank_frame(&self) -> EncodedFrame {
        let shift_length = self.config.shift_length();
        let planes = usize::from(self.config.pwm_bits());
        let scan_rows = self
            .order
            .iter()
            .enumerate()
            .map(|(position, &address)| ScanRow {
                address,
                select: self.row_select(position, address),
                planes: vec![vec![0; shift_length]; planes],
            })
            .collect();

        EncodedFrame {
            plane_durations_ns: self.plane_durations(),
            scan_rows,
        }
    }

    fn plane_durations(&self) -> Vec<u32> {
        (0..self.config.pwm_bits())
            .map(|plane| self.config.plane_duration_ns(plane))
            .collect()
    }

    fn row_select(&self, position: usize, address: usize) -> RowSelect {
        match self.config.row_address_type() {
            RowAddressType::Direct => RowSelect::Lines(address as u8),
            RowAddressType::ShiftRegister if position == 0 => RowSelect::Restart,
            RowAddressType::ShiftRegister => RowSelect::Advance,
        }
    }

    fn encode_row(&self, canvas: &Canvas, address: usize) -> Vec<Vec<u32>> {
        let config = &self.config;
        let pwm_bits = config.pwm_bits();
        let dither_bits = config.pwm_dither_bits();
        let scan_rows = config.scan_rows();
        let mut planes = vec![vec![0u32; config.shift_length()]; usize::from(pwm_bits)];

        for chain in 0..config.parallel() {
            for (half, lower) in [(0, false), (1, true)] {
                let hw_row = address + half * scan_rows;
                for position in 0..config.shift_length() {
                    let Some((x, y)) = self.map.source(chain, hw_row, position) else {
                        continue;
                    };
                    let color = canvas.pixels().get(y, x).unwrap_or(Color::BLACK);
                    if color.is_black() && !config.inverse_colors() {
                        continue;
                    }

                    for (pin, value) in config.led_sequence().pin_values(color).into_iter().enumerate() {
                        let value = if config.inverse_colors() { 255 - value } else { value };
                        let level = quantize(self.intensity.get(value), pwm_bits, dither_bits, x, y);
                        if level == 0 {
                            continue;
                        }
                        let mask = column_bit(chain, lower, pin);
                        for (plane, words) in planes.iter_mut().enumerate() {
                            if (level >> plane) & 1 == 1 {
                                words[position] |= mask;
                            }
                        }
                    }
                }
            }
        }

        planes
    }
}
