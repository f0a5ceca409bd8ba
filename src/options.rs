use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::Color;
use crate::mapper::MapperChain;

/// Largest supported PWM bit depth.
pub const MAX_PWM_BITS: u8 = 11;

/// Largest supported dither depth.
pub const MAX_DITHER_BITS: u8 = 2;

const ROWS_RANGE: std::ops::RangeInclusive<usize> = 8..=64;
const COLS_RANGE: std::ops::RangeInclusive<usize> = 8..=256;
const CHAIN_RANGE: std::ops::RangeInclusive<usize> = 1..=8;
const PARALLEL_RANGE: std::ops::RangeInclusive<usize> = 1..=4;
const LSB_NANOS_RANGE: std::ops::RangeInclusive<u32> = 50..=3000;
const BRIGHTNESS_RANGE: std::ops::RangeInclusive<u8> = 1..=100;

/// Rejected configuration. Fatal at startup: nothing refreshes until the
/// options validate.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rows must be an even number between 8 and 64, got {0}")]
    Rows(usize),
    #[error("cols must be between 8 and 256, got {0}")]
    Cols(usize),
    #[error("chain_length must be between 1 and 8, got {0}")]
    ChainLength(usize),
    #[error("parallel must be between 1 and 4, got {0}")]
    Parallel(usize),
    #[error("pwm_bits must be between 1 and 11, got {0}")]
    PwmBits(u8),
    #[error("pwm_dither_bits must be at most 2 and below pwm_bits ({pwm_bits}), got {dither_bits}")]
    DitherBits { dither_bits: u8, pwm_bits: u8 },
    #[error("pwm_lsb_nanoseconds must be between 50 and 3000, got {0}")]
    LsbNanoseconds(u32),
    #[error("brightness must be between 1 and 100, got {0}")]
    Brightness(u8),
    #[error("unknown multiplexing scheme {0}")]
    UnknownMultiplexing(u8),
    #[error("unknown row address type {0}")]
    UnknownRowAddressType(u8),
    #[error("unknown scan mode {0}")]
    UnknownScanMode(u8),
    #[error("unknown LED sequence '{0}'")]
    UnknownLedSequence(String),
    #[error("{multiplexing} multiplexing needs rows divisible by 4 and even cols, got {rows}x{cols}")]
    PanelShape {
        multiplexing: Multiplexing,
        rows: usize,
        cols: usize,
    },
    #[error("unknown pixel mapper '{0}'")]
    UnknownPixelMapper(String),
    #[error("Rotate needs an angle that is a multiple of 90, got '{0}'")]
    RotateAngle(String),
    #[error("U-mapper needs an even width and a height divisible by {parallel} chains, got {width}x{height}")]
    UMapperGeometry {
        width: usize,
        height: usize,
        parallel: usize,
    },
    #[error("shift-register row addressing cannot skip rows, use progressive scan")]
    ShiftAddressingInterlaced,
    #[error("invalid options document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How a panel's pixels are wired to its shift registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplexing {
    /// Hardware rows and columns match the logical panel.
    Direct,
    /// Outdoor 1:4/1:8 scan panels driving alternating row quarters as
    /// one long stripe.
    Stripe,
    /// Like [`Multiplexing::Stripe`] with left and right halves of each
    /// quarter interleaved in a checker pattern.
    Checker,
}

impl TryFrom<u8> for Multiplexing {
    type Error = ConfigError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Self::Direct),
            1 => Ok(Self::Stripe),
            2 => Ok(Self::Checker),
            other => Err(ConfigError::UnknownMultiplexing(other)),
        }
    }
}

impl fmt::Display for Multiplexing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Stripe => write!(f, "stripe"),
            Self::Checker => write!(f, "checker"),
        }
    }
}

/// How the panel selects the active scan row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowAddressType {
    /// Row index written in binary on the A..E lines.
    Direct,
    /// Row shift register on the A (data) and B (clock) lines, as found on
    /// some 64x64 panels.
    ShiftRegister,
}

impl TryFrom<u8> for RowAddressType {
    type Error = ConfigError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Self::Direct),
            1 => Ok(Self::ShiftRegister),
            other => Err(ConfigError::UnknownRowAddressType(other)),
        }
    }
}

/// Order in which scan rows are refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    Progressive,
    /// Even rows first, then odd rows.
    Interlaced,
}

impl TryFrom<u8> for ScanMode {
    type Error = ConfigError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Self::Progressive),
            1 => Ok(Self::Interlaced),
            other => Err(ConfigError::UnknownScanMode(other)),
        }
    }
}

/// Which color channel drives each of the panel's R, G and B data pins.
///
/// Some panels swap their LEDs internally; `Bgr` puts the blue value on the
/// pin labeled R and the red value on the pin labeled B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LedSequence {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl LedSequence {
    /// Channel values in pin order (R, G, B pins).
    #[inline]
    pub fn pin_values(self, color: Color) -> [u8; 3] {
        let [r, g, b] = color.channels();
        match self {
            Self::Rgb => [r, g, b],
            Self::Rbg => [r, b, g],
            Self::Grb => [g, r, b],
            Self::Gbr => [g, b, r],
            Self::Brg => [b, r, g],
            Self::Bgr => [b, g, r],
        }
    }
}

impl FromStr for LedSequence {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RGB" => Ok(Self::Rgb),
            "RBG" => Ok(Self::Rbg),
            "GRB" => Ok(Self::Grb),
            "GBR" => Ok(Self::Gbr),
            "BRG" => Ok(Self::Brg),
            "BGR" => Ok(Self::Bgr),
            _ => Err(ConfigError::UnknownLedSequence(s.to_string())),
        }
    }
}

/// Raw matrix options as supplied by the application or a JSON document.
///
/// Scheme fields carry numeric ids, mirroring how panel setups are usually
/// described. Nothing here is trusted until [`MatrixOptions::validate`] turns
/// it into a [`MatrixConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MatrixOptions {
    /// Rows of a single panel.
    pub rows: usize,
    /// Columns of a single panel.
    pub cols: usize,
    /// Panels daisy-chained on one data line.
    pub chain_length: usize,
    /// Data lines driven concurrently.
    pub parallel: usize,
    pub multiplexing: u8,
    pub pwm_bits: u8,
    pub pwm_dither_bits: u8,
    /// On-time of the least significant bit plane.
    pub pwm_lsb_nanoseconds: u32,
    pub row_address_type: u8,
    pub scan_mode: u8,
    pub disable_hardware_pulsing: bool,
    pub inverse_colors: bool,
    pub show_refresh_rate: bool,
    /// Initial brightness in percent.
    pub brightness: u8,
    pub led_rgb_sequence: String,
    /// `;` separated pixel mappers, e.g. `"U-mapper;Rotate:90"`. Empty for
    /// none.
    pub pixel_mapper_config: String,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self {
            rows: 32,
            cols: 32,
            chain_length: 1,
            parallel: 1,
            multiplexing: 0,
            pwm_bits: MAX_PWM_BITS,
            pwm_dither_bits: 0,
            pwm_lsb_nanoseconds: 130,
            row_address_type: 0,
            scan_mode: 0,
            disable_hardware_pulsing: false,
            inverse_colors: false,
            show_refresh_rate: false,
            brightness: 100,
            led_rgb_sequence: "RGB".to_string(),
            pixel_mapper_config: String::new(),
        }
    }
}

impl MatrixOptions {
    /// Parse a JSON options document without validating it. Missing fields
    /// take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check every field and combination once, producing the immutable
    /// configuration the rest of the crate works from.
    pub fn validate(&self) -> Result<MatrixConfig, ConfigError> {
        if !ROWS_RANGE.contains(&self.rows) || self.rows % 2 != 0 {
            return Err(ConfigError::Rows(self.rows));
        }
        if !COLS_RANGE.contains(&self.cols) {
            return Err(ConfigError::Cols(self.cols));
        }
        if !CHAIN_RANGE.contains(&self.chain_length) {
            return Err(ConfigError::ChainLength(self.chain_length));
        }
        if !PARALLEL_RANGE.contains(&self.parallel) {
            return Err(ConfigError::Parallel(self.parallel));
        }
        if !(1..=MAX_PWM_BITS).contains(&self.pwm_bits) {
            return Err(ConfigError::PwmBits(self.pwm_bits));
        }
        if self.pwm_dither_bits > MAX_DITHER_BITS || self.pwm_dither_bits >= self.pwm_bits {
            return Err(ConfigError::DitherBits {
                dither_bits: self.pwm_dither_bits,
                pwm_bits: self.pwm_bits,
            });
        }
        if !LSB_NANOS_RANGE.contains(&self.pwm_lsb_nanoseconds) {
            return Err(ConfigError::LsbNanoseconds(self.pwm_lsb_nanoseconds));
        }
        if !BRIGHTNESS_RANGE.contains(&self.brightness) {
            return Err(ConfigError::Brightness(self.brightness));
        }

        let multiplexing = Multiplexing::try_from(self.multiplexing)?;
        let row_address_type = RowAddressType::try_from(self.row_address_type)?;
        let scan_mode = ScanMode::try_from(self.scan_mode)?;
        let led_sequence = self.led_rgb_sequence.parse::<LedSequence>()?;

        let shape_ok = match multiplexing {
            Multiplexing::Direct => true,
            Multiplexing::Stripe => self.rows % 4 == 0,
            Multiplexing::Checker => self.rows % 4 == 0 && self.cols % 2 == 0,
        };
        if !shape_ok {
            return Err(ConfigError::PanelShape {
                multiplexing,
                rows: self.rows,
                cols: self.cols,
            });
        }
        if row_address_type == RowAddressType::ShiftRegister && scan_mode == ScanMode::Interlaced {
            return Err(ConfigError::ShiftAddressingInterlaced);
        }
        let mappers = MapperChain::parse(
            &self.pixel_mapper_config,
            (self.cols * self.chain_length, self.rows * self.parallel),
            self.parallel,
        )?;

        Ok(MatrixConfig {
            rows: self.rows,
            cols: self.cols,
            chain_length: self.chain_length,
            parallel: self.parallel,
            multiplexing,
            pwm_bits: self.pwm_bits,
            pwm_dither_bits: self.pwm_dither_bits,
            pwm_lsb_nanoseconds: self.pwm_lsb_nanoseconds,
            row_address_type,
            scan_mode,
            hardware_pulsing: !self.disable_hardware_pulsing,
            inverse_colors: self.inverse_colors,
            show_refresh_rate: self.show_refresh_rate,
            brightness: self.brightness,
            led_sequence,
            mappers,
        })
    }
}

/// Validated, immutable matrix configuration.
///
/// Only obtainable through [`MatrixOptions::validate`] (or
/// [`MatrixConfig::from_json`]), so holding one proves the geometry and
/// timing are consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixConfig {
    rows: usize,
    cols: usize,
    chain_length: usize,
    parallel: usize,
    multiplexing: Multiplexing,
    pwm_bits: u8,
    pwm_dither_bits: u8,
    pwm_lsb_nanoseconds: u32,
    row_address_type: RowAddressType,
    scan_mode: ScanMode,
    hardware_pulsing: bool,
    inverse_colors: bool,
    show_refresh_rate: bool,
    brightness: u8,
    led_sequence: LedSequence,
    mappers: MapperChain,
}

impl MatrixConfig {
    /// Parse a JSON options document and validate it. Missing fields take
    /// their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        MatrixOptions::from_json(json)?.validate()
    }

    /// Rows of a single panel.
    #[inline]
    pub fn panel_rows(&self) -> usize {
        self.rows
    }

    /// Columns of a single panel.
    #[inline]
    pub fn panel_cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn chain_length(&self) -> usize {
        self.chain_length
    }

    #[inline]
    pub fn parallel(&self) -> usize {
        self.parallel
    }

    /// Width of the panel matrix: every panel of one chain side by side.
    #[inline]
    pub fn matrix_width(&self) -> usize {
        self.cols * self.chain_length
    }

    /// Height of the panel matrix: the parallel chains stacked.
    #[inline]
    pub fn matrix_height(&self) -> usize {
        self.rows * self.parallel
    }

    /// Width of the canvas applications draw on, after pixel mapping.
    #[inline]
    pub fn width(&self) -> usize {
        self.mappers.visible_size().0
    }

    /// Height of the canvas applications draw on, after pixel mapping.
    #[inline]
    pub fn height(&self) -> usize {
        self.mappers.visible_size().1
    }

    /// Mappers between the canvas and the panel matrix.
    #[inline]
    pub fn pixel_mappers(&self) -> &MapperChain {
        &self.mappers
    }

    #[inline]
    pub fn multiplexing(&self) -> Multiplexing {
        self.multiplexing
    }

    #[inline]
    pub fn pwm_bits(&self) -> u8 {
        self.pwm_bits
    }

    #[inline]
    pub fn pwm_dither_bits(&self) -> u8 {
        self.pwm_dither_bits
    }

    #[inline]
    pub fn pwm_lsb_nanoseconds(&self) -> u32 {
        self.pwm_lsb_nanoseconds
    }

    #[inline]
    pub fn row_address_type(&self) -> RowAddressType {
        self.row_address_type
    }

    #[inline]
    pub fn scan_mode(&self) -> ScanMode {
        self.scan_mode
    }

    /// Whether sinks may use a pulse peripheral for output-enable timing.
    #[inline]
    pub fn hardware_pulsing(&self) -> bool {
        self.hardware_pulsing
    }

    #[inline]
    pub fn inverse_colors(&self) -> bool {
        self.inverse_colors
    }

    #[inline]
    pub fn show_refresh_rate(&self) -> bool {
        self.show_refresh_rate
    }

    /// Brightness new canvases start with.
    #[inline]
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    #[inline]
    pub fn led_sequence(&self) -> LedSequence {
        self.led_sequence
    }

    /// Panel `(rows, cols)` as seen by the shift registers.
    ///
    /// Stripe and checker panels present half the rows at twice the width.
    pub fn hardware_panel_size(&self) -> (usize, usize) {
        match self.multiplexing {
            Multiplexing::Direct => (self.rows, self.cols),
            Multiplexing::Stripe | Multiplexing::Checker => (self.rows / 2, self.cols * 2),
        }
    }

    /// Row addresses per frame. Each address lights an upper and a lower row.
    pub fn scan_rows(&self) -> usize {
        self.hardware_panel_size().0 / 2
    }

    /// Column words shifted out per scan row across the whole chain.
    pub fn shift_length(&self) -> usize {
        self.hardware_panel_size().1 * self.chain_length
    }

    /// On-time of bit plane `plane`.
    #[inline]
    pub fn plane_duration_ns(&self, plane: u8) -> u32 {
        self.pwm_lsb_nanoseconds << plane
    }

    /// On-time of bit plane `plane` in ticks of a `tick_hz` timer.
    ///
    /// The LSB is rounded to whole ticks, at least one, before shifting, so
    /// planes keep exact binary weights at any timer resolution.
    pub fn plane_ticks(&self, plane: u8, tick_hz: u64) -> u64 {
        let lsb = (u128::from(self.pwm_lsb_nanoseconds) * u128::from(tick_hz) + 500_000_000)
            / 1_000_000_000;
        u64::try_from(lsb).unwrap_or(u64::MAX).max(1) << plane
    }

    /// Minimum time to show one full frame: every scan row lit for the sum
    /// of all plane durations. Shift and latch time come on top, so this is
    /// a lower bound.
    ///
    /// Each extra PWM bit roughly doubles it.
    pub fn frame_period(&self) -> Duration {
        let planes_ns: u64 = (0..self.pwm_bits)
            .map(|plane| u64::from(self.plane_duration_ns(plane)))
            .sum();
        Duration::from_nanos(planes_ns * self.scan_rows() as u64)
    }

    /// Upper bound on the achievable refresh rate in Hz.
    pub fn max_refresh_hz(&self) -> f64 {
        1.0 / self.frame_period().as_secs_f64()
    }
}
