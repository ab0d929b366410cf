//! HUEY USB colorimeter protocol.
//!
//! Every operation is one 8-byte request and one or more 8-byte replies.
//! Requests go out as a vendor control transfer, replies come back on
//! interrupt endpoint 0x81.  The reply status byte drives a small state
//! machine: success completes, retry re-reads (bounded), locked and error
//! codes are terminal.  A reply that echoes the wrong command always
//! aborts — it means host and device are desynchronized.

use rusb::{Context, DeviceHandle, UsbContext};
use tracing::debug;

use crate::color::{Mat3x3, Vec3, convert_device_rgb_to_xyz};
use crate::error::ProbeError;
use crate::framing::{be_f32, be_u32, hex};
use crate::protocol::*;
use crate::sensor::OutputType;

/// Byte-exchange capability the protocol layer drives.
///
/// The shipped implementation is [`HueyUsb`]; tests substitute a scripted
/// transport to exercise the reply state machine without hardware.
pub trait HueyTransport {
    /// Send one 8-byte request frame.
    fn send_request(&mut self, request: &[u8; HUEY_FRAME_LEN]) -> Result<(), ProbeError>;
    /// Block for one 8-byte reply frame.
    fn read_reply(&mut self, reply: &mut [u8; HUEY_FRAME_LEN]) -> Result<(), ProbeError>;
}

// ---------------------------------------------------------------------------
// USB transport
// ---------------------------------------------------------------------------

/// rusb-backed transport for a real HUEY on the USB bus.
pub struct HueyUsb {
    handle: DeviceHandle<Context>,
    kernel_driver_was_active: bool,
}

impl HueyUsb {
    /// Scan the USB bus for 0971:2005, open it and claim interface 0.
    pub fn open() -> Result<Self, ProbeError> {
        let context = Context::new()?;

        for device in context.devices()?.iter() {
            let desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if desc.vendor_id() != HUEY_VENDOR_ID || desc.product_id() != HUEY_PRODUCT_ID {
                continue;
            }

            let handle = device.open()?;
            let kernel_driver_was_active = handle.kernel_driver_active(HUEY_INTERFACE)?;
            if kernel_driver_was_active {
                handle.detach_kernel_driver(HUEY_INTERFACE)?;
                debug!("detached kernel driver from interface {}", HUEY_INTERFACE);
            }
            handle.claim_interface(HUEY_INTERFACE)?;

            return Ok(Self {
                handle,
                kernel_driver_was_active,
            });
        }

        Err(ProbeError::DeviceNotFound)
    }
}

impl HueyTransport for HueyUsb {
    fn send_request(&mut self, request: &[u8; HUEY_FRAME_LEN]) -> Result<(), ProbeError> {
        debug!("huey TX {:02x?}", request);
        let written = self.handle.write_control(
            HUEY_REQUEST_TYPE,
            HUEY_REQUEST,
            0,
            0,
            request,
            HUEY_USB_TIMEOUT,
        )?;
        if written != HUEY_FRAME_LEN {
            return Err(ProbeError::ShortTransfer {
                expected: HUEY_FRAME_LEN,
                got: written,
            });
        }
        Ok(())
    }

    fn read_reply(&mut self, reply: &mut [u8; HUEY_FRAME_LEN]) -> Result<(), ProbeError> {
        let read = self
            .handle
            .read_interrupt(HUEY_EP_REPLY, reply, HUEY_USB_TIMEOUT)?;
        if read != HUEY_FRAME_LEN {
            return Err(ProbeError::ShortTransfer {
                expected: HUEY_FRAME_LEN,
                got: read,
            });
        }
        debug!("huey RX {:02x?}", reply);
        Ok(())
    }
}

impl Drop for HueyUsb {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(HUEY_INTERFACE) {
            debug!("failed to release interface: {}", e);
        }
        if self.kernel_driver_was_active {
            let _ = self.handle.attach_kernel_driver(HUEY_INTERFACE);
        }
    }
}

// ---------------------------------------------------------------------------
// Protocol layer
// ---------------------------------------------------------------------------

/// An opened HUEY sensor session.
///
/// Open once, run [`startup()`](Self::startup) to unlock and pull the
/// calibration data, then issue sample/ambient/LED operations for the
/// lifetime of the handle.  Operations require exclusive access per
/// handle; callers must serialize.
pub struct HueySensor<T: HueyTransport = HueyUsb> {
    transport: T,
    output_type: Option<OutputType>,
    calibration_lcd: Mat3x3,
    calibration_crt: Mat3x3,
    dark_offset: Vec3,
    unlock_string: String,
}

impl HueySensor<HueyUsb> {
    /// Open the first HUEY on the USB bus.
    pub fn open() -> Result<Self, ProbeError> {
        Ok(Self::with_transport(HueyUsb::open()?))
    }
}

impl<T: HueyTransport> HueySensor<T> {
    /// Build a sensor over an already-opened transport.
    ///
    /// Calibration state starts as identity/zero until
    /// [`startup()`](Self::startup) reads the device registers.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            output_type: None,
            calibration_lcd: Mat3x3::identity(),
            calibration_crt: Mat3x3::identity(),
            dark_offset: Vec3::default(),
            unlock_string: String::new(),
        }
    }

    /// One full request/reply cycle through the reply state machine.
    ///
    /// Sends once, then reads up to [`HUEY_MAX_READS`] replies.  A retry
    /// status re-reads; every other non-success status is terminal.
    fn run_command(
        &mut self,
        request: [u8; HUEY_FRAME_LEN],
    ) -> Result<[u8; HUEY_FRAME_LEN], ProbeError> {
        self.transport.send_request(&request)?;

        let mut reply = [0u8; HUEY_FRAME_LEN];
        for _ in 0..HUEY_MAX_READS {
            self.transport.read_reply(&mut reply)?;

            // Wrong command echo means we are reading somebody else's
            // reply; retrying blindly would make it worse.
            if reply[1] != request[0] {
                return Err(ProbeError::CommandMismatch {
                    sent: request[0],
                    got: reply[1],
                });
            }

            match reply[0] {
                HUEY_RETVAL_SUCCESS => return Ok(reply),
                HUEY_RETVAL_RETRY => continue,
                HUEY_RETVAL_LOCKED => return Err(ProbeError::Locked),
                HUEY_RETVAL_ERROR => {
                    return Err(ProbeError::DeviceError {
                        code: reply[0],
                        detail: hex(&reply[2..]),
                    });
                }
                code => return Err(ProbeError::UnknownReturnCode(code)),
            }
        }

        Err(ProbeError::RetriesExhausted {
            reads: HUEY_MAX_READS,
        })
    }

    fn command(cmd: u8, params: &[u8]) -> [u8; HUEY_FRAME_LEN] {
        let mut request = [0u8; HUEY_FRAME_LEN];
        request[0] = cmd;
        request[1..1 + params.len()].copy_from_slice(params);
        request
    }

    // --- Register reads ---

    /// Read one register byte.  Address goes in param1, data comes back
    /// in reply byte 3.
    pub fn read_register_byte(&mut self, addr: u8) -> Result<u8, ProbeError> {
        let reply = self.run_command(Self::command(HUEY_CMD_REGISTER_READ, &[addr]))?;
        Ok(reply[3])
    }

    /// Read `len` sequential register bytes as an ASCII string.
    pub fn read_register_string(&mut self, addr: u8, len: u8) -> Result<String, ProbeError> {
        let mut bytes = Vec::with_capacity(len as usize);
        for i in 0..len {
            bytes.push(self.read_register_byte(addr + i)?);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read four sequential register bytes as a big-endian 32-bit word.
    pub fn read_register_word(&mut self, addr: u8) -> Result<u32, ProbeError> {
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read_register_byte(addr + i as u8)?;
        }
        Ok(be_u32(bytes))
    }

    /// Read a register word reinterpreted as an IEEE-754 single.
    pub fn read_register_float(&mut self, addr: u8) -> Result<f64, ProbeError> {
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read_register_byte(addr + i as u8)?;
        }
        Ok(f64::from(be_f32(bytes)))
    }

    /// Read nine sequential register floats as a row-major 3×3 matrix.
    pub fn read_register_matrix(&mut self, addr: u8) -> Result<Mat3x3, ProbeError> {
        let mut m = [0.0; 9];
        for (i, cell) in m.iter_mut().enumerate() {
            *cell = self.read_register_float(addr + (i * 4) as u8)?;
        }
        Ok(Mat3x3::new(m))
    }

    fn read_register_vector(&mut self, addr: u8) -> Result<Vec3, ProbeError> {
        Ok(Vec3::new(
            self.read_register_float(addr)?,
            self.read_register_float(addr + 4)?,
            self.read_register_float(addr + 8)?,
        ))
    }

    // --- Session operations ---

    /// Send the fixed unlock command.  The device answers every other
    /// command with the locked status until this has succeeded.
    pub fn unlock(&mut self) -> Result<(), ProbeError> {
        self.run_command(HUEY_UNLOCK_PAYLOAD)?;
        Ok(())
    }

    /// Unlock and pull the per-device calibration state: both matrices,
    /// the dark-offset vector and the diagnostic unlock string.
    pub fn startup(&mut self) -> Result<(), ProbeError> {
        self.unlock()?;
        self.calibration_lcd = self.read_register_matrix(HUEY_REG_CALIBRATION_LCD)?;
        self.calibration_crt = self.read_register_matrix(HUEY_REG_CALIBRATION_CRT)?;
        self.dark_offset = self.read_register_vector(HUEY_REG_DARK_OFFSET)?;
        self.unlock_string =
            self.read_register_string(HUEY_REG_UNLOCK_STRING, HUEY_UNLOCK_STRING_LEN)?;
        debug!("unlock string: {}", self.unlock_string);
        Ok(())
    }

    /// Diagnostic status string from the device.
    pub fn get_status(&mut self) -> Result<String, ProbeError> {
        let reply = self.run_command(Self::command(HUEY_CMD_GET_STATUS, &[]))?;
        Ok(String::from_utf8_lossy(&reply[2..])
            .trim_end_matches('\0')
            .to_string())
    }

    /// Select LCD or CRT interpretation for ambient reads and sampling.
    pub fn set_output_type(&mut self, output: OutputType) {
        self.output_type = Some(output);
    }

    /// Ambient light level in lux.
    ///
    /// Fails with [`ProbeError::OutputTypeNotSet`] until an output type
    /// has been chosen.
    pub fn get_ambient(&mut self) -> Result<f64, ProbeError> {
        let flag = match self.output_type {
            Some(OutputType::Lcd) => HUEY_AMBIENT_FLAG_LCD,
            Some(OutputType::Crt) => HUEY_AMBIENT_FLAG_CRT,
            None => return Err(ProbeError::OutputTypeNotSet),
        };
        let reply = self.run_command(Self::command(
            HUEY_CMD_GET_AMBIENT,
            &[HUEY_AMBIENT_ARG, flag],
        ))?;
        let counts = f64::from(reply[5]) * 255.0 + f64::from(reply[6]);
        Ok(counts / HUEY_AMBIENT_UNITS_TO_LUX)
    }

    /// Light the LEDs given by `mask` (bit set = LED on).
    ///
    /// The hardware is active low, so the mask goes out inverted.
    pub fn set_leds(&mut self, mask: u8) -> Result<(), ProbeError> {
        self.run_command(Self::command(HUEY_CMD_SET_LEDS, &[0x00, !mask]))?;
        Ok(())
    }

    /// One tri-stimulus measure pass with explicit per-channel gains.
    ///
    /// The red count comes back in the measure command's own reply; green
    /// and blue need separate accessor commands.  Counts are inverse
    /// brightness, hence the reciprocal.
    pub fn sample_for_threshold(
        &mut self,
        gain_r: u16,
        gain_g: u16,
        gain_b: u16,
    ) -> Result<Vec3, ProbeError> {
        let [rh, rl] = gain_r.to_be_bytes();
        let [gh, gl] = gain_g.to_be_bytes();
        let [bh, bl] = gain_b.to_be_bytes();
        let reply = self.run_command(Self::command(
            HUEY_CMD_MEASURE_RGB,
            &[rh, rl, gh, gl, bh, bl],
        ))?;
        let red = Self::channel_value(&reply)?;
        let reply = self.run_command(Self::command(HUEY_CMD_READ_GREEN, &[]))?;
        let green = Self::channel_value(&reply)?;
        let reply = self.run_command(Self::command(HUEY_CMD_READ_BLUE, &[]))?;
        let blue = Self::channel_value(&reply)?;
        Ok(Vec3::new(red, green, blue))
    }

    fn channel_value(reply: &[u8; HUEY_FRAME_LEN]) -> Result<f64, ProbeError> {
        let count = u32::from(reply[3]) * 255 + u32::from(reply[4]);
        if count == 0 {
            return Err(ProbeError::InvalidResponse(format!(
                "zero sample count in reply: {}",
                hex(reply)
            )));
        }
        Ok(1.0 / f64::from(count))
    }

    /// Adaptive-gain XYZ sample.
    ///
    /// A unity-gain rough pass finds dim channels; those get an integer
    /// gain of threshold/value (longer integration collects more signal),
    /// a second pass measures with the gains, the readings are multiplied
    /// back by their gains and the native RGB is converted to XYZ with the
    /// LCD calibration matrix and the empirical post scale.
    pub fn sample(&mut self) -> Result<Vec3, ProbeError> {
        let rough = self.sample_for_threshold(1, 1, 1)?;
        let gain_r = Self::gain_for(rough.x);
        let gain_g = Self::gain_for(rough.y);
        let gain_b = Self::gain_for(rough.z);

        let measured = self.sample_for_threshold(gain_r, gain_g, gain_b)?;
        let native = Vec3::new(
            measured.x * f64::from(gain_r),
            measured.y * f64::from(gain_g),
            measured.z * f64::from(gain_b),
        );

        Ok(convert_device_rgb_to_xyz(
            native,
            &self.calibration_lcd,
            self.dark_offset,
            1.0,
            HUEY_POST_SCALE,
        ))
    }

    fn gain_for(value: f64) -> u16 {
        if value >= HUEY_PRECISION_THRESHOLD || value <= 0.0 {
            return 1;
        }
        let gain = (HUEY_PRECISION_THRESHOLD / value) as u64;
        gain.clamp(1, u64::from(u16::MAX)) as u16
    }

    /// The CRT calibration matrix read during startup.
    pub fn calibration_crt(&self) -> &Mat3x3 {
        &self.calibration_crt
    }

    /// The LCD calibration matrix read during startup.
    pub fn calibration_lcd(&self) -> &Mat3x3 {
        &self.calibration_lcd
    }

    /// The diagnostic unlock string read during startup.
    pub fn unlock_string(&self) -> &str {
        &self.unlock_string
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
