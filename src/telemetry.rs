/// Receives refresh rate measurements from a running [`RefreshLoop`](crate::RefreshLoop).
pub trait RefreshTelemetry: Send {
    /// Called about once per second with the measured refresh rate.
    fn report_refresh_rate(&mut self, hz: f64);
}

/// Reports refresh rates through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl RefreshTelemetry for LogTelemetry {
    fn report_refresh_rate(&mut self, hz: f64) {
        log::info!("Refresh rate: {hz:.1} Hz");
    }
}
