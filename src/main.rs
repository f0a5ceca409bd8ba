use led_matrix_engine::options::ConfigError;
use led_matrix_engine::{Canvas, Color, StateError};

/// Why the demo could not run.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[cfg(not(target_os = "espidf"))]
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid matrix options: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Refresh(#[from] StateError),
    #[cfg(target_os = "espidf")]
    #[error("peripheral setup failed: {0}")]
    Esp(#[from] esp_idf_svc::sys::EspError),
    #[cfg(target_os = "espidf")]
    #[error(transparent)]
    Hub75(#[from] led_matrix_engine::esp32::Hub75Error),
}

/// One frame of the demo: a circle bouncing over a sweeping diagonal.
fn draw_demo(canvas: &mut Canvas, tick: u32) {
    let width = canvas.width() as i32;
    let height = canvas.height() as i32;
    let t = tick as i32;

    canvas.clear();
    let sweep = t % (width + height);
    canvas.draw_line(sweep, 0, sweep - height, height - 1, Color::new(0, 40, 120));

    let radius = (height / 4).max(2);
    let span_x = (width - 2 * radius).max(1);
    let span_y = (height - 2 * radius).max(1);
    let bounce = |t: i32, span: i32| {
        let phase = t % (2 * span);
        if phase < span { phase } else { 2 * span - phase }
    };
    let cx = radius + bounce(t, span_x);
    let cy = radius + bounce(t * 2 / 3, span_y);
    let hue = (tick * 5 % 256) as u8;
    canvas.draw_circle(cx, cy, radius, Color::new(255 - hue, hue, 96));
    canvas.draw_rect(0, 0, width as u32, height as u32, Color::new(64, 64, 64));
}

#[cfg(target_os = "espidf")]
fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("LED matrix - ESP32");

    if let Err(e) = run() {
        log::error!("{e}");
    }
}

#[cfg(target_os = "espidf")]
fn run() -> Result<(), StartupError> {
    use esp_idf_svc::hal::delay::FreeRtos;
    use esp_idf_svc::hal::gpio::{OutputPin, PinDriver};
    use esp_idf_svc::hal::peripherals::Peripherals;
    use led_matrix_engine::esp32::{GpioHub75Sink, Hub75Pins, OutputEnable};
    use led_matrix_engine::{DoubleBuffer, MatrixOptions, RefreshLoop};

    let config = MatrixOptions {
        rows: 32,
        cols: 64,
        pwm_bits: 8,
        ..MatrixOptions::default()
    }
    .validate()?;

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;
    let output_enable = if config.hardware_pulsing() {
        OutputEnable::pulsed(peripherals.rmt.channel0, pins.gpio15)?
    } else {
        OutputEnable::Gpio(PinDriver::output(pins.gpio15.downgrade_output())?)
    };
    let hub75 = Hub75Pins {
        data: vec![[
            PinDriver::output(pins.gpio25.downgrade_output())?,
            PinDriver::output(pins.gpio26.downgrade_output())?,
            PinDriver::output(pins.gpio27.downgrade_output())?,
            PinDriver::output(pins.gpio14.downgrade_output())?,
            PinDriver::output(pins.gpio12.downgrade_output())?,
            PinDriver::output(pins.gpio13.downgrade_output())?,
        ]],
        address: vec![
            PinDriver::output(pins.gpio23.downgrade_output())?,
            PinDriver::output(pins.gpio19.downgrade_output())?,
            PinDriver::output(pins.gpio5.downgrade_output())?,
            PinDriver::output(pins.gpio17.downgrade_output())?,
            PinDriver::output(pins.gpio18.downgrade_output())?,
        ],
        clock: PinDriver::output(pins.gpio16.downgrade_output())?,
        latch: PinDriver::output(pins.gpio4.downgrade_output())?,
        output_enable,
    };

    let sink = GpioHub75Sink::new(&config, hub75)?;
    let mut buffers = DoubleBuffer::new(&config);
    let mut refresh = RefreshLoop::new(config, buffers.front_handle(), sink);
    refresh.start()?;

    let mut tick = 0u32;
    loop {
        draw_demo(buffers.back_buffer(), tick);
        buffers.swap();
        tick = tick.wrapping_add(1);
        FreeRtos::delay_ms(33);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> std::process::ExitCode {
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
    {
        eprintln!("Failed to install logger: {e}");
    }

    match run(std::env::args().nth(1)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn run(options_path: Option<String>) -> Result<(), StartupError> {
    use std::thread;
    use std::time::Duration;

    use led_matrix_engine::mock::TerminalSink;
    use led_matrix_engine::{DoubleBuffer, MatrixConfig, MatrixOptions, RefreshLoop};

    const DEMO_TICKS: u32 = 300;

    let config = match options_path {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .map_err(|source| StartupError::Read { path, source })?;
            MatrixConfig::from_json(&json)?
        }
        None => MatrixOptions::default().validate()?,
    };

    // Clear once; the sink redraws from the top-left corner
    print!("\x1b[2J");

    let mut buffers = DoubleBuffer::new(&config);
    let mut refresh = RefreshLoop::new(
        config.clone(),
        buffers.front_handle(),
        TerminalSink::new(&config),
    );
    refresh.start()?;

    for tick in 0..DEMO_TICKS {
        draw_demo(buffers.back_buffer(), tick);
        buffers.swap();
        thread::sleep(Duration::from_millis(33));
    }

    refresh.stop()?;
    let stats = refresh.stats();
    log::info!(
        "Emitted {} frames, dropped {}",
        stats.frames_emitted,
        stats.frames_dropped
    );
    Ok(())
}
