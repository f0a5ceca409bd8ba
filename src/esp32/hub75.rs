use std::time::Instant;

use esp_idf_svc::hal::gpio::{AnyOutputPin, Level, Output, OutputPin, PinDriver};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::rmt::config::TransmitConfig;
use esp_idf_svc::hal::rmt::{
    PinState, Pulse, PulseTicks, RmtChannel, TxRmtDriver, VariableLengthSignal,
};
use esp_idf_svc::sys::EspError;

use crate::encoder::{BITS_PER_CHAIN, RowSelect};
use crate::options::{MatrixConfig, RowAddressType};
use crate::{PanelSink, Segment};

/// Output pin as driven by the sink.
pub type OutputDriver = PinDriver<'static, AnyOutputPin, Output>;

/// Longest low time one RMT item can hold.
const MAX_PULSE_TICKS: u64 = 32_767;

/// Error types for HUB75 GPIO output.
#[derive(Debug, thiserror::Error)]
pub enum Hub75Error {
    #[error("GPIO operation failed: {0}")]
    Gpio(#[from] EspError),
    #[error("{parallel} parallel chains need {parallel} data pin sets, got {given}")]
    DataPins { parallel: usize, given: usize },
    #[error("row addressing needs {needed} address lines, got {given}")]
    AddressPins { needed: usize, given: usize },
    #[error("no on-time for bit plane {0}")]
    Plane(u8),
}

/// How the active-low output enable line is driven.
pub enum OutputEnable {
    /// Plain GPIO; on-time is a calibrated busy wait.
    Gpio(OutputDriver),
    /// RMT channel shaping the enable pulse in hardware.
    Rmt(TxRmtDriver<'static>),
}

impl OutputEnable {
    /// Hand the enable pin to an RMT channel clocked at the full APB rate.
    /// The line idles high so the panel stays dark between pulses.
    pub fn pulsed<C: RmtChannel>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = impl OutputPin> + 'static,
    ) -> Result<Self, EspError> {
        let config = TransmitConfig::new()
            .clock_divider(1)
            .idle(Some(PinState::High));
        Ok(Self::Rmt(TxRmtDriver::new(channel, pin, &config)?))
    }
}

/// GPIO connections of a HUB75 port.
pub struct Hub75Pins {
    /// R1 G1 B1 R2 G2 B2 for each parallel chain.
    pub data: Vec<[OutputDriver; BITS_PER_CHAIN]>,
    /// A, B, C, D, E. With shift register addressing A carries the row data
    /// and B clocks it.
    pub address: Vec<OutputDriver>,
    pub clock: OutputDriver,
    pub latch: OutputDriver,
    pub output_enable: OutputEnable,
}

/// Output enable together with the per-plane on-times in its own ticks.
enum OnTime {
    Spin {
        pin: OutputDriver,
        rounds: Vec<u64>,
    },
    Rmt {
        tx: TxRmtDriver<'static>,
        signals: Vec<VariableLengthSignal>,
    },
}

/// HUB75 panel driven by bit-banging ESP32 GPIOs.
///
/// Every segment is shifted out with the output disabled, latched, and then
/// shown for its plane's on-time. On-times are counted in whole ticks of
/// the timing source, the LSB rounded once and doubled per plane, so the
/// binary weights hold exactly. An RMT driven enable line gets 12.5ns ticks
/// with no CPU jitter; a GPIO one falls back to a busy loop calibrated when
/// the sink is built.
pub struct GpioHub75Sink {
    data: Vec<[OutputDriver; BITS_PER_CHAIN]>,
    address: Vec<OutputDriver>,
    clock: OutputDriver,
    latch: OutputDriver,
    on_time: OnTime,
    scan_rows: usize,
}

impl GpioHub75Sink {
    pub fn new(config: &MatrixConfig, pins: Hub75Pins) -> Result<Self, Hub75Error> {
        if pins.data.len() != config.parallel() {
            return Err(Hub75Error::DataPins {
                parallel: config.parallel(),
                given: pins.data.len(),
            });
        }
        let needed = match config.row_address_type() {
            RowAddressType::Direct => address_lines(config.scan_rows()),
            RowAddressType::ShiftRegister => 2,
        };
        if pins.address.len() < needed {
            return Err(Hub75Error::AddressPins {
                needed,
                given: pins.address.len(),
            });
        }

        let Hub75Pins {
            data,
            address,
            mut clock,
            mut latch,
            output_enable,
        } = pins;
        clock.set_low()?;
        latch.set_low()?;

        let planes = 0..config.pwm_bits();
        let on_time = match output_enable {
            OutputEnable::Rmt(tx) => {
                let tick_hz = u64::from(tx.counter_clock()?.0);
                let signals = planes
                    .map(|plane| low_pulse(config.plane_ticks(plane, tick_hz)))
                    .collect::<Result<_, _>>()?;
                log::info!("Output enable pulsed by RMT at {tick_hz} Hz");
                OnTime::Rmt { tx, signals }
            }
            OutputEnable::Gpio(mut pin) => {
                pin.set_high()?;
                if config.hardware_pulsing() {
                    log::warn!("Hardware pulsing requested but output enable is a plain GPIO");
                }
                let rate = spin_rate();
                log::info!("Output enable timed by busy wait at {rate} rounds/s");
                OnTime::Spin {
                    pin,
                    rounds: planes.map(|plane| config.plane_ticks(plane, rate)).collect(),
                }
            }
        };

        log::info!(
            "HUB75 output ready: {} chain(s), {} address lines",
            config.parallel(),
            needed,
        );

        Ok(Self {
            data,
            address,
            clock,
            latch,
            on_time,
            scan_rows: config.scan_rows(),
        })
    }

    fn shift(&mut self, columns: &[u32]) -> Result<(), EspError> {
        for &word in columns {
            for (chain, pins) in self.data.iter_mut().enumerate() {
                for (bit, pin) in pins.iter_mut().enumerate() {
                    pin.set_level(level((word >> (chain * BITS_PER_CHAIN + bit)) & 1 == 1))?;
                }
            }
            self.clock.set_high()?;
            self.clock.set_low()?;
        }
        Ok(())
    }

    fn select(&mut self, row: RowSelect) -> Result<(), EspError> {
        match row {
            RowSelect::Lines(address) => {
                for (line, pin) in self.address.iter_mut().enumerate() {
                    pin.set_level(level((address >> line) & 1 == 1))?;
                }
            }
            RowSelect::Restart => {
                for _ in 0..self.scan_rows {
                    self.clock_row(false)?;
                }
                self.clock_row(true)?;
            }
            RowSelect::Advance => self.clock_row(false)?,
            RowSelect::Hold => {}
        }
        Ok(())
    }

    /// One clock of the row shift register: A carries the bit, B clocks it.
    fn clock_row(&mut self, data: bool) -> Result<(), EspError> {
        let [a, b, ..] = self.address.as_mut_slice() else {
            return Ok(());
        };
        a.set_level(level(data))?;
        b.set_high()?;
        b.set_low()
    }

    fn show(&mut self, plane: u8) -> Result<(), Hub75Error> {
        match &mut self.on_time {
            OnTime::Spin { pin, rounds } => {
                let rounds = *rounds.get(usize::from(plane)).ok_or(Hub75Error::Plane(plane))?;
                pin.set_low()?;
                spin(rounds);
                pin.set_high()?;
            }
            OnTime::Rmt { tx, signals } => {
                let signal = signals.get(usize::from(plane)).ok_or(Hub75Error::Plane(plane))?;
                tx.start_blocking(signal)?;
            }
        }
        Ok(())
    }
}

impl PanelSink for GpioHub75Sink {
    type Error = Hub75Error;

    fn write_segment(&mut self, segment: &Segment<'_>) -> Result<(), Self::Error> {
        self.shift(segment.columns)?;
        self.select(segment.row)?;
        self.latch.set_high()?;
        self.latch.set_low()?;
        self.show(segment.plane)
    }

    fn end_frame(&mut self) -> Result<(), Self::Error> {
        if let OnTime::Spin { pin, .. } = &mut self.on_time {
            pin.set_high()?;
        }
        Ok(())
    }
}

/// Low pulse of `ticks`, split across as many RMT items as it needs.
fn low_pulse(ticks: u64) -> Result<VariableLengthSignal, EspError> {
    let mut signal = VariableLengthSignal::new();
    let mut left = ticks;
    while left > 0 {
        let chunk = left.min(MAX_PULSE_TICKS);
        let pulse = Pulse::new(PinState::Low, PulseTicks::new(chunk as u16)?);
        signal.push([&pulse])?;
        left -= chunk;
    }
    Ok(signal)
}

/// Busy-wait rounds per second on the calling core.
fn spin_rate() -> u64 {
    const ROUNDS: u64 = 1 << 20;
    let start = Instant::now();
    spin(ROUNDS);
    let elapsed = start.elapsed().as_nanos().max(1);
    u64::try_from(u128::from(ROUNDS) * 1_000_000_000 / elapsed).unwrap_or(u64::MAX)
}

#[inline(always)]
fn spin(rounds: u64) {
    for round in 0..rounds {
        std::hint::black_box(round);
    }
}

/// Address lines needed to select `scan_rows` rows.
fn address_lines(scan_rows: usize) -> usize {
    (usize::BITS - scan_rows.saturating_sub(1).leading_zeros()) as usize
}

#[inline]
fn level(high: bool) -> Level {
    if high { Level::High } else { Level::Low }
}
