//! The common color-sensor interface.
//!
//! [`SensorDevice`] is the narrow surface higher layers program against;
//! [`HueySensor`](crate::huey::HueySensor) is the hardware implementation
//! and [`DummySensor`] returns canned values for callers without a device.

use crate::color::Vec3;
use crate::error::ProbeError;
use crate::huey::{HueySensor, HueyTransport};

/// What kind of display the sensor is pointed at.
///
/// Affects the ambient flag byte and which calibration matrix applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Lcd,
    Crt,
}

impl OutputType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lcd" => Some(Self::Lcd),
            "crt" => Some(Self::Crt),
            _ => None,
        }
    }
}

/// A color sensor a caller can point at a display.
///
/// All methods block for the full hardware transaction; serialize access
/// per device handle.
pub trait SensorDevice {
    /// Prepare the device for measurements (unlock, read calibration).
    fn startup(&mut self) -> Result<(), ProbeError>;

    /// Choose how samples and ambient reads are interpreted.
    fn set_output_type(&mut self, output: OutputType);

    /// Ambient light level in lux.
    fn get_ambient(&mut self) -> Result<f64, ProbeError>;

    /// Measure the current display patch as XYZ.
    fn sample(&mut self) -> Result<Vec3, ProbeError>;

    /// Light the indicator LEDs given by `mask`.
    fn set_leds(&mut self, mask: u8) -> Result<(), ProbeError>;
}

impl<T: HueyTransport> SensorDevice for HueySensor<T> {
    fn startup(&mut self) -> Result<(), ProbeError> {
        HueySensor::startup(self)
    }

    fn set_output_type(&mut self, output: OutputType) {
        HueySensor::set_output_type(self, output);
    }

    fn get_ambient(&mut self) -> Result<f64, ProbeError> {
        HueySensor::get_ambient(self)
    }

    fn sample(&mut self) -> Result<Vec3, ProbeError> {
        HueySensor::sample(self)
    }

    fn set_leds(&mut self, mask: u8) -> Result<(), ProbeError> {
        HueySensor::set_leds(self, mask)
    }
}

/// A sensor that needs no hardware and always measures the same thing.
#[derive(Debug, Default)]
pub struct DummySensor {
    output_type: Option<OutputType>,
}

impl DummySensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SensorDevice for DummySensor {
    fn startup(&mut self) -> Result<(), ProbeError> {
        Ok(())
    }

    fn set_output_type(&mut self, output: OutputType) {
        self.output_type = Some(output);
    }

    fn get_ambient(&mut self) -> Result<f64, ProbeError> {
        if self.output_type.is_none() {
            return Err(ProbeError::OutputTypeNotSet);
        }
        Ok(7.7)
    }

    fn sample(&mut self) -> Result<Vec3, ProbeError> {
        // A plausible mid-gray measurement
        Ok(Vec3::new(42.0, 48.0, 35.0))
    }

    fn set_leds(&mut self, _mask: u8) -> Result<(), ProbeError> {
        Ok(())
    }
}
