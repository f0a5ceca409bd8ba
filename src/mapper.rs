use std::fmt;
use std::str::FromStr;

use crate::options::ConfigError;

/// Transformation between the canvas an application draws on and the
/// physical arrangement of chained and parallel panels behind it.
///
/// Each mapper turns the size below it into a new visible size, and maps
/// every visible pixel back to exactly one pixel below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelMapper {
    /// Each chain folded in two: the second half of the chain hangs upside
    /// down below the first, so the canvas is half as wide and twice as tall.
    U,
    /// Clockwise rotation by 0, 90, 180 or 270 degrees.
    Rotate(u16),
}

impl PixelMapper {
    /// Visible size produced from a `(width, height)` area below.
    pub fn visible_size(self, (width, height): (usize, usize)) -> (usize, usize) {
        match self {
            Self::U => (width / 2, height * 2),
            Self::Rotate(90 | 270) => (height, width),
            Self::Rotate(_) => (width, height),
        }
    }

    /// Position below of visible pixel `(x, y)`, for an area below of
    /// `(width, height)` stacking `parallel` chains.
    pub fn to_below(
        self,
        (width, height): (usize, usize),
        parallel: usize,
        x: usize,
        y: usize,
    ) -> (usize, usize) {
        match self {
            Self::U => {
                let panel_height = height / parallel;
                let slab = 2 * panel_height;
                let base = (y / slab) * panel_height;
                let y = y % slab;
                if y < panel_height {
                    (x + width / 2, base + y)
                } else {
                    (width / 2 - x - 1, base + slab - y - 1)
                }
            }
            Self::Rotate(90) => (width - y - 1, x),
            Self::Rotate(180) => (width - x - 1, height - y - 1),
            Self::Rotate(270) => (y, height - x - 1),
            Self::Rotate(_) => (x, y),
        }
    }
}

impl fmt::Display for PixelMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U => f.write_str("U-mapper"),
            Self::Rotate(angle) => write!(f, "Rotate:{angle}"),
        }
    }
}

impl FromStr for PixelMapper {
    type Err = ConfigError;

    /// Parse `U-mapper` or `Rotate:<degrees>`; names ignore case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, param) = match s.split_once(':') {
            Some((name, param)) => (name.trim(), Some(param.trim())),
            None => (s, None),
        };

        if name.eq_ignore_ascii_case("U-mapper") && param.is_none() {
            return Ok(Self::U);
        }
        if name.eq_ignore_ascii_case("Rotate") {
            let param = param.unwrap_or_default();
            let angle: i32 = param
                .parse()
                .map_err(|_| ConfigError::RotateAngle(param.to_string()))?;
            if angle % 90 != 0 {
                return Err(ConfigError::RotateAngle(param.to_string()));
            }
            return Ok(Self::Rotate(angle.rem_euclid(360) as u16));
        }
        Err(ConfigError::UnknownPixelMapper(s.to_string()))
    }
}

/// Validated list of mappers applied between canvas and matrix.
///
/// The first mapper sits directly on the matrix; each following one sits on
/// the visible area of the one before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperChain {
    /// Each mapper with the size of the area below it.
    stages: Vec<(PixelMapper, (usize, usize))>,
    visible: (usize, usize),
    parallel: usize,
}

impl MapperChain {
    /// Parse a `;` separated list such as `"U-mapper;Rotate:90"` for a
    /// matrix of `matrix` size stacking `parallel` chains.
    pub(crate) fn parse(
        config: &str,
        matrix: (usize, usize),
        parallel: usize,
    ) -> Result<Self, ConfigError> {
        let mut stages = Vec::new();
        let mut size = matrix;
        for entry in config.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let mapper: PixelMapper = entry.parse()?;
            if mapper == PixelMapper::U && (size.0 % 2 != 0 || size.1 % parallel != 0) {
                return Err(ConfigError::UMapperGeometry {
                    width: size.0,
                    height: size.1,
                    parallel,
                });
            }
            stages.push((mapper, size));
            size = mapper.visible_size(size);
        }
        Ok(Self {
            stages,
            visible: size,
            parallel,
        })
    }

    /// Canvas size after every mapper.
    #[inline]
    pub fn visible_size(&self) -> (usize, usize) {
        self.visible
    }

    pub fn mappers(&self) -> impl Iterator<Item = PixelMapper> + '_ {
        self.stages.iter().map(|&(mapper, _)| mapper)
    }

    /// Matrix position of canvas pixel `(x, y)`.
    pub fn to_matrix(&self, x: usize, y: usize) -> (usize, usize) {
        self.stages
            .iter()
            .rev()
            .fold((x, y), |(x, y), &(mapper, below)| {
                mapper.to_below(below, self.parallel, x, y)
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use test_case::test_case;

    #[test_case("U-mapper", PixelMapper::U)]
    #[test_case("u-MAPPER", PixelMapper::U; "case insensitive")]
    #[test_case("Rotate:90", PixelMapper::Rotate(90))]
    #[test_case(" Rotate : -90 ", PixelMapper::Rotate(270); "negative angle")]
    #[test_case("Rotate:450", PixelMapper::Rotate(90); "full turns dropped")]
    fn parses_mapper(text: &str, expected: PixelMapper) {
        assert_eq!(text.parse::<PixelMapper>().unwrap(), expected);
    }

    #[test]
    fn rejects_bad_mappers() {
        assert!(matches!(
            "Rotate:45".parse::<PixelMapper>(),
            Err(ConfigError::RotateAngle(_))
        ));
        assert!(matches!(
            "Rotate".parse::<PixelMapper>(),
            Err(ConfigError::RotateAngle(_))
        ));
        assert!(matches!(
            "Mirror:H".parse::<PixelMapper>(),
            Err(ConfigError::UnknownPixelMapper(_))
        ));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for mapper in [PixelMapper::U, PixelMapper::Rotate(180)] {
            assert_eq!(mapper.to_string().parse::<PixelMapper>().unwrap(), mapper);
        }
    }

    #[test]
    fn empty_config_is_identity() {
        let chain = MapperChain::parse(" ; ", (64, 32), 1).unwrap();

        assert_eq!(chain.visible_size(), (64, 32));
        assert_eq!(chain.to_matrix(5, 7), (5, 7));
        assert_eq!(chain.mappers().count(), 0);
    }

    #[test_case("Rotate:90", (64, 32), 1; "quarter turn")]
    #[test_case("Rotate:180", (64, 32), 2; "half turn")]
    #[test_case("Rotate:270", (32, 64), 1; "three quarter turn")]
    #[test_case("U-mapper", (128, 32), 1; "u")]
    #[test_case("U-mapper", (128, 64), 2; "u parallel")]
    #[test_case("U-mapper;Rotate:90", (128, 32), 1; "u then rotate")]
    fn mapping_is_a_bijection(config: &str, matrix: (usize, usize), parallel: usize) {
        let chain = MapperChain::parse(config, matrix, parallel).unwrap();
        let (width, height) = chain.visible_size();
        assert_eq!(width * height, matrix.0 * matrix.1);

        let mut seen = HashSet::new();
        for y in 0..height {
            for x in 0..width {
                let (mx, my) = chain.to_matrix(x, y);
                assert!(mx < matrix.0 && my < matrix.1, "({x}, {y}) -> ({mx}, {my})");
                assert!(seen.insert((mx, my)), "({mx}, {my}) used twice");
            }
        }
    }

    #[test]
    fn rotate_quarter_turn_moves_corners_clockwise() {
        let chain = MapperChain::parse("Rotate:90", (64, 32), 1).unwrap();

        assert_eq!(chain.visible_size(), (32, 64));
        // Visible top-left is the matrix top-right
        assert_eq!(chain.to_matrix(0, 0), (63, 0));
        assert_eq!(chain.to_matrix(31, 0), (63, 31));
        assert_eq!(chain.to_matrix(0, 63), (0, 0));
    }

    #[test]
    fn u_mapper_folds_chain_under_itself() {
        // Four 32x32 panels in one chain, shown as a 2x2 block
        let chain = MapperChain::parse("U-mapper", (128, 32), 1).unwrap();

        assert_eq!(chain.visible_size(), (64, 64));
        // Upper half is the far end of the chain, upright
        assert_eq!(chain.to_matrix(0, 0), (64, 0));
        assert_eq!(chain.to_matrix(63, 31), (127, 31));
        // Lower half is the near end, upside down
        assert_eq!(chain.to_matrix(0, 32), (63, 31));
        assert_eq!(chain.to_matrix(63, 63), (0, 0));
    }

    #[test]
    fn u_mapper_needs_an_even_width() {
        let result = MapperChain::parse("U-mapper", (96, 32), 1);
        assert!(result.is_ok());

        let result = MapperChain::parse("Rotate:90;U-mapper", (64, 33), 1);
        assert!(matches!(
            result,
            Err(ConfigError::UMapperGeometry { width: 33, .. })
        ));
    }
}
