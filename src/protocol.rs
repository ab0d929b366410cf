//! Protocol constants for the HUEY USB colorimeter and DDC/CI monitors.
//!
//! All magic numbers, opcodes, register addresses and timing constants are
//! defined here so the rest of the codebase references named constants
//! instead of raw hex.

use std::time::Duration;

// ---------------------------------------------------------------------------
// HUEY — USB device identifiers
// ---------------------------------------------------------------------------

/// HUEY colorimeter vendor ID (Gretag-Macbeth).
pub const HUEY_VENDOR_ID: u16 = 0x0971;
/// HUEY colorimeter product ID.
pub const HUEY_PRODUCT_ID: u16 = 0x2005;
/// The single interface the HUEY exposes.
pub const HUEY_INTERFACE: u8 = 0;

// ---------------------------------------------------------------------------
// HUEY — command/reply framing
// ---------------------------------------------------------------------------

/// Every HUEY request and reply is exactly 8 bytes.
/// Request: `[command, param1..param7]`.
/// Reply:   `[status, echoed-command, data0..data5]`.
pub const HUEY_FRAME_LEN: usize = 8;

/// bmRequestType for the command control transfer (vendor, interface, out).
pub const HUEY_REQUEST_TYPE: u8 = 0x43;
/// bRequest for the command control transfer.
pub const HUEY_REQUEST: u8 = 0x00;
/// Interrupt IN endpoint carrying the 8-byte reply.
pub const HUEY_EP_REPLY: u8 = 0x81;

/// Control/interrupt transfer timeout.  Generous because some commands
/// (long integration times) keep the device busy for several seconds.
pub const HUEY_USB_TIMEOUT: Duration = Duration::from_millis(50_000);

/// How many replies to read for one command before giving up on the
/// retry status code.
pub const HUEY_MAX_READS: usize = 5;

// ---------------------------------------------------------------------------
// HUEY — command opcodes (0x00–0x21)
// ---------------------------------------------------------------------------

/// Diagnostic status string read.
pub const HUEY_CMD_GET_STATUS: u8 = 0x00;
/// Read back the green channel count after a measure.
pub const HUEY_CMD_READ_GREEN: u8 = 0x02;
/// Read back the blue channel count after a measure.
pub const HUEY_CMD_READ_BLUE: u8 = 0x03;
/// Write a device value slot.
pub const HUEY_CMD_SET_VALUE: u8 = 0x05;
/// Read a device value slot.
pub const HUEY_CMD_GET_VALUE: u8 = 0x06;
/// Read one register byte; address in param1, data in reply byte 3.
pub const HUEY_CMD_REGISTER_READ: u8 = 0x08;
/// Unlock the device; must be sent before anything else works reliably.
pub const HUEY_CMD_UNLOCK: u8 = 0x0e;
/// Tri-stimulus measure; red count comes back in this command's own reply.
pub const HUEY_CMD_MEASURE_RGB: u8 = 0x16;
/// Ambient light level read.
pub const HUEY_CMD_GET_AMBIENT: u8 = 0x17;
/// LED control; mask in param2, active low.
pub const HUEY_CMD_SET_LEDS: u8 = 0x18;

// ---------------------------------------------------------------------------
// HUEY — reply status bytes
// ---------------------------------------------------------------------------

/// Command completed.
pub const HUEY_RETVAL_SUCCESS: u8 = 0x00;
/// Device is still locked; unlock() has not been run.
pub const HUEY_RETVAL_LOCKED: u8 = 0xc0;
/// Device-internal error; ASCII detail in reply bytes 2..
pub const HUEY_RETVAL_ERROR: u8 = 0x80;
/// Result not ready yet; read the reply again.
pub const HUEY_RETVAL_RETRY: u8 = 0x90;
/// Seen in the wild, meaning unknown.
pub const HUEY_RETVAL_UNKNOWN_5A: u8 = 0x5a;
/// Seen in the wild, meaning unknown.
pub const HUEY_RETVAL_UNKNOWN_81: u8 = 0x81;

// ---------------------------------------------------------------------------
// HUEY — register map
// ---------------------------------------------------------------------------

/// LCD calibration matrix: 9 big-endian IEEE-754 floats, 36 bytes.
pub const HUEY_REG_CALIBRATION_LCD: u8 = 0x04;
/// Dark-offset vector: 3 big-endian IEEE-754 floats, 12 bytes.
pub const HUEY_REG_DARK_OFFSET: u8 = 0x2a;
/// CRT calibration matrix: 9 big-endian IEEE-754 floats, 36 bytes.
pub const HUEY_REG_CALIBRATION_CRT: u8 = 0x36;
/// 5-char ASCII unlock string, diagnostic only.
pub const HUEY_REG_UNLOCK_STRING: u8 = 0x7a;
/// Length of the unlock string register.
pub const HUEY_UNLOCK_STRING_LEN: u8 = 5;

/// Fixed unlock payload; the 7 parameter bytes spell "GrMbked".
pub const HUEY_UNLOCK_PAYLOAD: [u8; 8] =
    [HUEY_CMD_UNLOCK, b'G', b'r', b'M', b'b', b'k', b'e', b'd'];

// ---------------------------------------------------------------------------
// HUEY — sampling parameters
// ---------------------------------------------------------------------------

/// Fixed first parameter of the ambient command.
pub const HUEY_AMBIENT_ARG: u8 = 0x03;
/// Ambient flag byte for LCD output.
pub const HUEY_AMBIENT_FLAG_LCD: u8 = 0x00;
/// Ambient flag byte for CRT output.
pub const HUEY_AMBIENT_FLAG_CRT: u8 = 0x10;
/// Raw ambient counts per lux.
pub const HUEY_AMBIENT_UNITS_TO_LUX: f64 = 125.0;

/// Channels whose unity-gain reading falls below this get a longer
/// integration pass.  Empirically chosen upstream; no derivation known.
pub const HUEY_PRECISION_THRESHOLD: f64 = 0.15;

/// Scalar applied to the XYZ result of sample().  The upstream source
/// documents this as "picked out of thin air"; do not assume it
/// generalizes to other hardware units.
pub const HUEY_POST_SCALE: f64 = 6880.0;

// ---------------------------------------------------------------------------
// DDC/CI — I2C addresses and framing
// ---------------------------------------------------------------------------

/// DDC/CI command and control I2C slave address.
pub const DDC_CI_ADDR: u16 = 0x37;
/// EDID EEPROM I2C slave address.
pub const DDC_EDID_ADDR: u16 = 0x50;

/// First byte of every host→display frame (host sub-address magic).
pub const DDC_HOST_MAGIC: u8 = 0x51;
/// Virtual host address used to seed the checksum of display→host frames.
pub const DDC_CHECKSUM_SEED_RECV: u8 = 0x50;
/// High bit set on every length byte.
pub const DDC_LEN_FLAG: u8 = 0x80;
/// Length is 7 bits, so a payload can never exceed this.
pub const DDC_MAX_PAYLOAD: usize = 0x7f;

// ---------------------------------------------------------------------------
// DDC/CI — opcodes
// ---------------------------------------------------------------------------

/// Get VCP feature request.
pub const DDC_VCP_REQUEST: u8 = 0x01;
/// Get VCP feature reply.
pub const DDC_VCP_REPLY: u8 = 0x02;
/// Set VCP feature.
pub const DDC_VCP_SET: u8 = 0x03;
/// Reset VCP feature to factory default.
pub const DDC_VCP_RESET: u8 = 0x09;
/// Save current settings to display NVRAM.
pub const DDC_SAVE_CURRENT_SETTINGS: u8 = 0x0c;
/// Capability string read request.
pub const DDC_CAPABILITIES_REQUEST: u8 = 0xf3;
/// Capability string read reply.
pub const DDC_CAPABILITIES_REPLY: u8 = 0xe3;

/// Samsung vendor control: enable "application report" mode.
pub const DDC_VCP_ENABLE_APPLICATION_REPORT: u8 = 0xf5;
/// Generic "command present" probe; allowed to fail on most displays.
pub const DDC_VCP_COMMAND_PRESENT: u8 = 0xf7;

/// EDID vendor PNP-ID prefix that needs the application-report quirk.
pub const DDC_QUIRK_PNP_PREFIX: &str = "SAM";

// ---------------------------------------------------------------------------
// DDC/CI — pacing and retry
// ---------------------------------------------------------------------------

/// Settle time required after a read before the next transaction.
pub const DDC_DELAY_READ: Duration = Duration::from_millis(40);
/// Settle time required after a write before the next transaction.
pub const DDC_DELAY_WRITE: Duration = Duration::from_millis(50);
/// Settle time required after a save-settings write.
pub const DDC_DELAY_SAVE: Duration = Duration::from_millis(200);
/// Extra settle after a VCP set, on top of the write pacing.
pub const DDC_DELAY_VCP_SET: Duration = Duration::from_millis(50);

/// Retry budget while fetching the first capability chunk.
pub const DDC_CAPS_ATTEMPTS_FIRST: usize = 5;
/// Retry budget after at least one chunk has been read successfully.
pub const DDC_CAPS_ATTEMPTS_LATER: usize = 3;
/// Maximum capability chunk payload (3-byte header + data) we request.
pub const DDC_CAPS_CHUNK_LEN: usize = 32;

// ---------------------------------------------------------------------------
// EDID
// ---------------------------------------------------------------------------

/// Base EDID block size.
pub const EDID_BLOCK_LEN: usize = 128;
/// Fixed EDID header.
pub const EDID_HEADER: [u8; 8] = [0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];
