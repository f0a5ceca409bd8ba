//! Prints how PWM depth trades against refresh rate for a panel
//! configuration, optionally read from a JSON options file.

use std::process::ExitCode;

use led_matrix_engine::options::{ConfigError, MAX_PWM_BITS};
use led_matrix_engine::{MatrixConfig, MatrixOptions};

/// Why the table could not be printed.
#[derive(Debug, thiserror::Error)]
enum DiagnosticsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid matrix options: {0}")]
    Config(#[from] ConfigError),
}

fn load(path: Option<String>) -> Result<MatrixOptions, DiagnosticsError> {
    let Some(path) = path else {
        return Ok(MatrixOptions::default());
    };
    let json =
        std::fs::read_to_string(&path).map_err(|source| DiagnosticsError::Read { path, source })?;
    Ok(MatrixOptions::from_json(&json)?)
}

fn describe(config: &MatrixConfig) {
    println!(
        "{}x{} pixels ({} x {}x{} panels, {} parallel), {} multiplexing, {} scan rows, LSB {} ns",
        config.width(),
        config.height(),
        config.chain_length(),
        config.panel_cols(),
        config.panel_rows(),
        config.parallel(),
        config.multiplexing(),
        config.scan_rows(),
        config.pwm_lsb_nanoseconds(),
    );
    let mappers: Vec<String> = config.pixel_mappers().mappers().map(|m| m.to_string()).collect();
    if !mappers.is_empty() {
        println!(
            "Pixel mappers {} turn the {}x{} matrix into this canvas",
            mappers.join(";"),
            config.matrix_width(),
            config.matrix_height(),
        );
    }
}

fn run(path: Option<String>) -> Result<(), DiagnosticsError> {
    let options = load(path)?;
    let selected = options.validate()?;

    describe(&selected);
    println!();
    println!("pwm_bits  colors/channel  frame period  max refresh");
    for pwm_bits in 1..=MAX_PWM_BITS {
        // Dither bits must stay below the PWM depth
        let candidate = MatrixOptions {
            pwm_bits,
            pwm_dither_bits: options.pwm_dither_bits.min(pwm_bits - 1),
            ..options.clone()
        };
        let Ok(config) = candidate.validate() else {
            continue;
        };
        let marker = if pwm_bits == selected.pwm_bits() { " <" } else { "" };
        println!(
            "{pwm_bits:>8}  {:>14}  {:>12.3?}  {:>8.1} Hz{marker}",
            1u32 << pwm_bits,
            config.frame_period(),
            config.max_refresh_hz(),
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
