use crate::options::{MatrixConfig, Multiplexing, ScanMode};

/// Lookup from hardware shift positions back to canvas pixels.
///
/// Built once per configuration by sending every canvas pixel through the
/// pixel mappers and then the panel multiplexing. Indexed by parallel chain,
/// hardware row and shift position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PanelMap {
    hw_rows: usize,
    shift_length: usize,
    pixels: Vec<Option<(usize, usize)>>,
}

impl PanelMap {
    pub(crate) fn new(config: &MatrixConfig) -> Self {
        let (rows, cols) = (config.panel_rows(), config.panel_cols());
        let (hw_rows, hw_cols) = config.hardware_panel_size();
        let shift_length = config.shift_length();
        let mappers = config.pixel_mappers();
        let mut pixels = vec![None; config.parallel() * hw_rows * shift_length];

        for y in 0..config.height() {
            for x in 0..config.width() {
                let (mx, my) = mappers.to_matrix(x, y);
                let (chain, chain_y) = (my / rows, my % rows);
                let (panel, panel_x) = (mx / cols, mx % cols);
                let (hw_x, hw_y) = map_pixel(config.multiplexing(), rows, cols, panel_x, chain_y);
                let row = chain * hw_rows + hw_y;
                pixels[row * shift_length + panel * hw_cols + hw_x] = Some((x, y));
            }
        }

        Self {
            hw_rows,
            shift_length,
            pixels,
        }
    }

    /// Canvas pixel shown at `position` in the shift sequence of `hw_row`
    /// on parallel chain `chain`.
    #[inline]
    pub(crate) fn source(
        &self,
        chain: usize,
        hw_row: usize,
        position: usize,
    ) -> Option<(usize, usize)> {
        let row = chain * self.hw_rows + hw_row;
        self.pixels[row * self.shift_length + position]
    }
}

/// Map a pixel of one logical panel to its position on the hardware panel.
///
/// Stripe and checker panels are driven as `rows / 2` hardware rows of
/// `2 * cols` columns. Each half of the panel is split into quarters: the
/// first quarter of every half goes to the far end of the shift sequence,
/// the second quarter to the near end. The checker variant additionally
/// interleaves the left and right halves of each quarter.
pub(crate) fn map_pixel(
    multiplexing: Multiplexing,
    rows: usize,
    cols: usize,
    x: usize,
    y: usize,
) -> (usize, usize) {
    if multiplexing == Multiplexing::Direct {
        return (x, y);
    }

    let half = rows / 2;
    let quarter = rows / 4;
    let top_quarter = (y % half) < quarter;
    let hw_y = (y / half) * quarter + y % quarter;

    let hw_x = match multiplexing {
        Multiplexing::Stripe if top_quarter => x + cols,
        Multiplexing::Stripe => x,
        Multiplexing::Checker => {
            let left = x < cols / 2;
            match (top_quarter, left) {
                (true, true) => x + cols / 2,
                (true, false) => x + cols,
                (false, true) => x,
                (false, false) => x + cols / 2,
            }
        }
        Multiplexing::Direct => x,
    };

    (hw_x, hw_y)
}

/// Row addresses in the order a frame visits them.
pub(crate) fn scan_order(scan_rows: usize, mode: ScanMode) -> Vec<usize> {
    match mode {
        ScanMode::Progressive => (0..scan_rows).collect(),
        ScanMode::Interlaced => (0..scan_rows)
            .step_by(2)
            .chain((1..scan_rows).step_by(2))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::options::MatrixOptions;
    use test_case::test_case;

    #[test_case(Multiplexing::Direct; "direct")]
    #[test_case(Multiplexing::Stripe; "stripe")]
    #[test_case(Multiplexing::Checker; "checker")]
    fn mapping_is_a_bijection(multiplexing: Multiplexing) {
        let (rows, cols) = (16, 32);
        let (hw_rows, hw_cols) = match multiplexing {
            Multiplexing::Direct => (rows, cols),
            _ => (rows / 2, cols * 2),
        };

        let mut seen = HashSet::new();
        for y in 0..rows {
            for x in 0..cols {
                let (hw_x, hw_y) = map_pixel(multiplexing, rows, cols, x, y);
                assert!(hw_x < hw_cols && hw_y < hw_rows, "({x}, {y}) -> ({hw_x}, {hw_y})");
                assert!(seen.insert((hw_x, hw_y)), "({hw_x}, {hw_y}) used twice");
            }
        }
        assert_eq!(seen.len(), rows * cols);
    }

    #[test]
    fn stripe_puts_top_quarter_at_far_end() {
        // rows 16: quarters of 4 rows, hardware panel is 8x64
        assert_eq!(map_pixel(Multiplexing::Stripe, 16, 32, 0, 0), (32, 0));
        assert_eq!(map_pixel(Multiplexing::Stripe, 16, 32, 0, 4), (0, 0));
        assert_eq!(map_pixel(Multiplexing::Stripe, 16, 32, 5, 9), (37, 5));
    }

    #[test]
    fn checker_interleaves_halves() {
        assert_eq!(map_pixel(Multiplexing::Checker, 16, 32, 0, 0), (16, 0));
        assert_eq!(map_pixel(Multiplexing::Checker, 16, 32, 16, 0), (48, 0));
        assert_eq!(map_pixel(Multiplexing::Checker, 16, 32, 0, 4), (0, 0));
        assert_eq!(map_pixel(Multiplexing::Checker, 16, 32, 16, 4), (32, 0));
    }

    #[test]
    fn panel_map_covers_chain() {
        let config = MatrixOptions {
            rows: 8,
            cols: 8,
            chain_length: 2,
            ..MatrixOptions::default()
        }
        .validate()
        .expect("valid");

        let map = PanelMap::new(&config);

        assert_eq!(map.source(0, 0, 0), Some((0, 0)));
        assert_eq!(map.source(0, 3, 7), Some((7, 3)));
        assert_eq!(map.source(0, 3, 8), Some((8, 3)));
        assert_eq!(map.source(0, 7, 15), Some((15, 7)));
    }

    #[test]
    fn panel_map_offsets_parallel_chains() {
        let config = MatrixOptions {
            rows: 8,
            cols: 8,
            parallel: 2,
            ..MatrixOptions::default()
        }
        .validate()
        .expect("valid");

        let map = PanelMap::new(&config);

        assert_eq!(map.source(1, 0, 0), Some((0, 8)));
        assert_eq!(map.source(1, 7, 7), Some((7, 15)));
    }

    #[test_case("U-mapper", 1; "u")]
    #[test_case("Rotate:90", 2; "rotate parallel")]
    #[test_case("U-mapper;Rotate:270", 1; "u then rotate")]
    fn mapped_panel_map_shows_every_canvas_pixel_once(mappers: &str, parallel: usize) {
        let config = MatrixOptions {
            rows: 16,
            cols: 32,
            chain_length: 2,
            parallel,
            multiplexing: 1,
            pixel_mapper_config: mappers.to_string(),
            ..MatrixOptions::default()
        }
        .validate()
        .expect("valid");
        let (hw_rows, _) = config.hardware_panel_size();

        let map = PanelMap::new(&config);

        let mut seen = HashSet::new();
        for chain in 0..parallel {
            for hw_row in 0..hw_rows {
                for position in 0..config.shift_length() {
                    let (x, y) = map.source(chain, hw_row, position).expect("every LED mapped");
                    assert!(x < config.width() && y < config.height());
                    assert!(seen.insert((x, y)), "({x}, {y}) shown twice");
                }
            }
        }
        assert_eq!(seen.len(), config.width() * config.height());
    }

    #[test]
    fn rotated_canvas_swaps_dimensions() {
        let config = MatrixOptions {
            rows: 16,
            cols: 32,
            pixel_mapper_config: "Rotate:90".to_string(),
            ..MatrixOptions::default()
        }
        .validate()
        .expect("valid");

        let map = PanelMap::new(&config);

        assert_eq!((config.width(), config.height()), (16, 32));
        // Top-left of the canvas lands on the top-right LED
        assert_eq!(map.source(0, 0, 31), Some((0, 0)));
    }

    #[test]
    fn interlaced_visits_even_rows_first() {
        assert_eq!(scan_order(6, ScanMode::Interlaced), vec![0, 2, 4, 1, 3, 5]);
        assert_eq!(scan_order(4, ScanMode::Progressive), vec![0, 1, 2, 3]);
    }
}
