/// Full-scale intensity produced by [`IntensityTable`].
pub(crate) const FULL_SCALE: u32 = u16::MAX as u32;

/// CIE 1931 lightness to relative luminance.
fn cie1931(lightness: f64) -> f64 {
    let l = lightness * 100.0;
    if l <= 8.0 {
        l / 902.3
    } else {
        ((l + 16.0) / 116.0).powi(3)
    }
}

/// Per-channel value to 16-bit output intensity for one brightness and
/// luminance-correction setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IntensityTable {
    brightness: u8,
    luminance_correction: bool,
    values: [u16; 256],
}

impl IntensityTable {
    pub(crate) fn new(brightness: u8, luminance_correction: bool) -> Self {
        let mut values = [0u16; 256];
        for (value, out) in values.iter_mut().enumerate() {
            let linear = value as f64 / 255.0 * f64::from(brightness) / 100.0;
            let corrected = if luminance_correction {
                cie1931(linear)
            } else {
                linear
            };
            *out = (corrected.clamp(0.0, 1.0) * f64::from(FULL_SCALE)).round() as u16;
        }
        Self {
            brightness,
            luminance_correction,
            values,
        }
    }

    #[inline]
    pub(crate) fn matches(&self, brightness: u8, luminance_correction: bool) -> bool {
        self.brightness == brightness && self.luminance_correction == luminance_correction
    }

    #[inline]
    pub(crate) fn get(&self, value: u8) -> u16 {
        self.values[usize::from(value)]
    }
}

/// 2x2 ordered dither ranks, indexed `[y % 2][x % 2]`.
const BAYER_2X2: [[u32; 2]; 2] = [[0, 2], [3, 1]];

/// Reduce a 16-bit intensity to a `pwm_bits` deep level for the pixel at
/// `(x, y)`.
///
/// Without dithering the level is rounded to nearest. With `dither_bits`
/// the full remainder below one level is compared against an ordered
/// threshold at the middle of one of `2^dither_bits` phases: a checkerboard
/// (1/4, 3/4) for one bit, a 2x2 Bayer pattern (1/8, 3/8, 5/8, 7/8) for two.
/// Over a tile the mean level then tracks the true intensity to within
/// `1 / 2^(dither_bits + 1)` of a level.
pub(crate) fn quantize(intensity: u16, pwm_bits: u8, dither_bits: u8, x: usize, y: usize) -> u16 {
    let max_level = (1u32 << pwm_bits) - 1;
    let scaled = u32::from(intensity) * max_level;
    let level = scaled / FULL_SCALE;
    let remainder = scaled % FULL_SCALE;

    let rank = match dither_bits {
        0 => None,
        1 => Some(((x + y) % 2) as u32),
        _ => Some(BAYER_2X2[y % 2][x % 2]),
    };
    let round_up = match rank {
        None => remainder * 2 >= FULL_SCALE,
        Some(rank) => {
            let phases = 1u32 << dither_bits.min(2);
            remainder * 2 * phases >= (2 * rank + 1) * FULL_SCALE
        }
    };

    (level + u32::from(round_up)).min(max_level) as u16
}
