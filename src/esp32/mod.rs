mod hub75;

pub use hub75::{GpioHub75Sink, Hub75Error, Hub75Pins, OutputDriver, OutputEnable};
