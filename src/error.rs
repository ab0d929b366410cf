//! Custom error types for the colorprobe-linux tool.
//!
//! Provides structured errors instead of `Box<dyn Error>`, so callers can
//! programmatically distinguish between transport failures, protocol
//! violations, and caller mistakes.  Protocol errors carry the offending
//! device bytes in hex for diagnosability.

use thiserror::Error;

/// Top-level error type for all colorprobe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// No HUEY colorimeter was found on the USB bus.
    #[error("HUEY colorimeter not found. Make sure it's connected.\n\
             Known ID: 0971:2005")]
    DeviceNotFound,

    /// A USB/libusb transport error occurred.
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// An I2C character-device transport error occurred.
    #[error("I2C error: {0}")]
    I2c(#[from] std::io::Error),

    /// A USB transfer returned the wrong number of bytes.
    #[error("short transfer: expected {expected} bytes, got {got}")]
    ShortTransfer { expected: usize, got: usize },

    /// The reply echoed a different command than the one sent.
    ///
    /// Indicates the device and host are desynchronized; never retried.
    #[error("reply for wrong command: sent 0x{sent:02x}, got 0x{got:02x}")]
    CommandMismatch { sent: u8, got: u8 },

    /// The HUEY reported an internal error for this command.
    #[error("device error 0x{code:02x}, reply data: {detail}")]
    DeviceError { code: u8, detail: String },

    /// The HUEY is locked; run unlock() and try again.
    #[error("device is locked")]
    Locked,

    /// The device kept asking for another read and we ran out of patience.
    #[error("gave up after {reads} reads")]
    RetriesExhausted { reads: usize },

    /// The reply status byte is not one we know how to handle.
    #[error("return value unknown: 0x{0:02x}")]
    UnknownReturnCode(u8),

    /// A DDC/CI reply failed structural validation.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A DDC/CI reply declared more payload than we asked for.
    #[error("reply too large: {len} bytes, asked for at most {max_len}")]
    ReplyTooLong { len: usize, max_len: usize },

    /// A DDC/CI reply failed its XOR checksum.
    #[error("corrupted data: checksum residue 0x{residue:02x} over {frame}")]
    CorruptFrame { residue: u8, frame: String },

    /// `vcp_set` was given a value outside the control's permitted set.
    #[error("value {value} is not allowed for VCP 0x{id:02x}, valid values: {allowed}")]
    ValueOutOfRange { id: u8, value: u16, allowed: String },

    /// The capability string could not be parsed.
    #[error("cannot parse capability string: {0}")]
    CapabilityParse(String),

    /// The EDID block is missing or malformed.
    #[error("invalid EDID: {0}")]
    InvalidEdid(String),

    /// A sampling or ambient call was made before the output type was set.
    ///
    /// Caller programming error; never retried.
    #[error("no output type set, use set_output_type() first")]
    OutputTypeNotSet,
}
