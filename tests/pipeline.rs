#![cfg(not(target_os = "espidf"))]

use led_matrix_engine::encoder::column_bit;
use led_matrix_engine::{
    Canvas, Color, ConfigError, FrameEncoder, MatrixConfig, MatrixOptions, OutOfRange,
};
use test_case::test_case;

/// Helper: validated options for an 8x8 panel at the given PWM depth.
fn panel(pwm_bits: u8) -> MatrixConfig {
    MatrixOptions {
        rows: 8,
        cols: 8,
        pwm_bits,
        ..MatrixOptions::default()
    }
    .validate()
    .expect("valid options")
}

/// Helper: PWM level of one channel of one pixel, read back from the planes.
fn level(config: &MatrixConfig, canvas: &Canvas, x: usize, y: usize, pin: usize) -> u32 {
    let frame = FrameEncoder::new(config).encode(canvas);
    let scan_rows = config.scan_rows();
    let mask = column_bit(0, y >= scan_rows, pin);
    frame
        .segments()
        .filter(|segment| segment.address == y % scan_rows)
        .filter(|segment| segment.columns[x] & mask != 0)
        .map(|segment| 1 << segment.plane)
        .sum()
}

// ---------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------

#[test]
fn diagonal_line_sets_five_pixels() {
    let mut canvas = Canvas::new(8, 8);

    canvas.draw_line(0, 0, 4, 4, Color::WHITE);

    let lit: Vec<(usize, usize)> = (0..8)
        .flat_map(|y| (0..8).map(move |x| (x, y)))
        .filter(|&(x, y)| canvas.pixels().get(y, x) == Ok(Color::WHITE))
        .collect();
    assert_eq!(lit, vec![(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)]);
}

#[test]
fn set_then_get_everywhere() {
    let mut canvas = Canvas::new(16, 8);

    for y in 0..8 {
        for x in 0..16 {
            let color = Color::new(x as u8 * 16, y as u8 * 32, 7);
            canvas.set_pixel(x, y, color);
            assert_eq!(canvas.pixel(x, y), Some(color));
        }
    }
}

#[test]
fn low_level_access_fails_explicitly() {
    let canvas = Canvas::new(8, 8);

    assert_eq!(
        canvas.pixels().get(8, 0),
        Err(OutOfRange {
            row: 8,
            col: 0,
            rows: 8,
            cols: 8
        })
    );
}

// ---------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------

#[test_case(1)]
#[test_case(6)]
#[test_case(11)]
fn plane_durations_double(pwm_bits: u8) {
    let config = panel(pwm_bits);
    let frame = FrameEncoder::new(&config).encode(&Canvas::new(8, 8));

    let durations = frame.plane_durations_ns();
    assert_eq!(durations.len(), usize::from(pwm_bits));
    for pair in durations.windows(2) {
        assert_eq!(pair[1], pair[0] * 2);
    }
}

#[test]
fn same_canvas_encodes_identically() {
    let config = panel(8);
    let mut canvas = Canvas::new(8, 8);
    canvas.draw_circle(4, 4, 3, Color::new(200, 100, 50));
    let mut encoder = FrameEncoder::new(&config);

    let first = encoder.encode(&canvas);
    let second = encoder.encode(&canvas);

    assert_eq!(first, second);
}

#[test]
fn brightness_changes_output_not_pixels() {
    let config = panel(8);
    let mut canvas = Canvas::new(8, 8);
    canvas.set_luminance_correction(false);
    canvas.set_pixel(1, 1, Color::WHITE);
    let full = level(&config, &canvas, 1, 1, 0);

    canvas.set_brightness(50);

    assert_eq!(canvas.pixel(1, 1), Some(Color::WHITE));
    assert_eq!(full, 255);
    assert_eq!(level(&config, &canvas, 1, 1, 0), 128);
}

#[test]
fn luminance_correction_dims_midtones() {
    let config = panel(8);
    let mut canvas = Canvas::new(8, 8);
    canvas.set_pixel(2, 6, Color::new(128, 128, 128));
    let corrected = level(&config, &canvas, 2, 6, 1);

    canvas.set_luminance_correction(false);
    let linear = level(&config, &canvas, 2, 6, 1);

    assert!(corrected < linear, "{corrected} should be below {linear}");
}

#[test]
fn u_mapped_chain_folds_canvas_onto_panels() {
    let config = MatrixOptions {
        rows: 8,
        cols: 8,
        chain_length: 2,
        pwm_bits: 1,
        pixel_mapper_config: "U-mapper".to_string(),
        ..MatrixOptions::default()
    }
    .validate()
    .expect("valid options");
    assert_eq!((config.width(), config.height()), (8, 16));
    let mut canvas = Canvas::new(config.width(), config.height());
    // Top-left of the upper half and top-left of the upside-down lower half
    canvas.set_pixel(0, 0, Color::RED);
    canvas.set_pixel(0, 8, Color::GREEN);

    let frame = FrameEncoder::new(&config).encode(&canvas);

    let lit: Vec<(usize, usize, u32)> = frame
        .segments()
        .flat_map(|segment| {
            let address = segment.address;
            segment
                .columns
                .iter()
                .enumerate()
                .filter(|(_, word)| **word != 0)
                .map(move |(position, &word)| (address, position, word))
        })
        .collect();
    assert_eq!(
        lit,
        vec![
            (0, 8, column_bit(0, false, 0)),
            (3, 7, column_bit(0, true, 1)),
        ]
    );
}

// ---------------------------------------------------------------
// Validation
// ---------------------------------------------------------------

#[test]
fn zero_pwm_bits_rejected() {
    let options = MatrixOptions {
        pwm_bits: 0,
        ..MatrixOptions::default()
    };

    assert!(matches!(options.validate(), Err(ConfigError::PwmBits(0))));
}

#[test]
fn unknown_multiplexing_rejected() {
    let result = MatrixConfig::from_json(r#"{ "multiplexing": 42 }"#);

    assert!(matches!(result, Err(ConfigError::UnknownMultiplexing(42))));
}

#[test]
fn more_pwm_bits_lower_refresh() {
    let shallow = panel(4);
    let deep = panel(11);

    assert!(deep.frame_period() > shallow.frame_period());
    assert!(deep.max_refresh_hz() < shallow.max_refresh_hz());
}
