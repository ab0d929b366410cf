//! Colorprobe library.
//!
//! Talks to GretagMacbeth HUEY colorimeters over USB and to monitors
//! over DDC/CI on Linux I2C buses, and carries the colorimetric math to
//! turn raw sensor counts into XYZ.
//!
//! # Quick Start
//!
//! ```no_run
//! use colorprobe_linux::{HueySensor, OutputType, SensorDevice};
//!
//! let mut sensor = HueySensor::open()?;
//! sensor.startup()?;
//! sensor.set_output_type(OutputType::Lcd);
//!
//! let xyz = sensor.sample()?;
//! println!("XYZ: {xyz}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod capabilities;
mod color;
mod ddc;
mod edid;
mod error;
mod framing;
mod huey;
pub mod protocol;
mod sensor;

pub use capabilities::{Capabilities, DisplayKind, VcpControl, parse_capabilities};
pub use color::{Mat3x3, Vec3, Yxy, convert_device_rgb_to_xyz, xyz_to_yxy, yxy_to_xyz};
pub use ddc::{DdcDevice, I2cBus, LinuxI2c, VcpValue};
pub use edid::EdidInfo;
pub use error::ProbeError;
pub use huey::{HueySensor, HueyTransport, HueyUsb};
pub use sensor::{DummySensor, OutputType, SensorDevice};
