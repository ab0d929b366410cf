//! DDC/CI monitor control over an I2C character device.
//!
//! Frames are `[0x51, 0x80|len, payload..., checksum]` with an XOR
//! checksum seeded by the destination address shifted left one bit.
//! Replies are validated the other way around: XOR seeded with the 0x50
//! virtual host address over the whole frame must come out zero.
//!
//! The bus is paced: every transaction records a settle deadline (40ms
//! after reads, 50ms after writes, 200ms after a save) that the next
//! transaction waits out first.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use crate::capabilities::{Capabilities, VcpControl, parse_capabilities};
use crate::edid::{self, EdidInfo};
use crate::error::ProbeError;
use crate::framing::{hex, xor_checksum};
use crate::protocol::*;

/// Byte-exchange capability over one I2C bus.
///
/// The shipped implementation is [`LinuxI2c`]; tests substitute a
/// scripted bus.
pub trait I2cBus {
    /// Select the slave address for subsequent reads/writes.
    fn set_slave_address(&mut self, addr: u16) -> Result<(), ProbeError>;
    /// Write raw bytes to the selected slave.
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), ProbeError>;
    /// Read raw bytes from the selected slave; returns bytes read.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, ProbeError>;
}

// ---------------------------------------------------------------------------
// Linux /dev/i2c-N transport
// ---------------------------------------------------------------------------

// From <linux/i2c-dev.h>
const I2C_SLAVE: nix::libc::c_int = 0x0703;

nix::ioctl_write_int_bad!(ioctl_i2c_slave, I2C_SLAVE);

/// An open `/dev/i2c-N` character device.
pub struct LinuxI2c {
    file: File,
    path: PathBuf,
    slave: Option<u16>,
}

impl LinuxI2c {
    /// Open the I2C character device at `path`.
    pub fn open(path: &Path) -> Result<Self, ProbeError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            slave: None,
        })
    }
}

impl I2cBus for LinuxI2c {
    fn set_slave_address(&mut self, addr: u16) -> Result<(), ProbeError> {
        if self.slave == Some(addr) {
            return Ok(());
        }
        unsafe { ioctl_i2c_slave(self.file.as_raw_fd(), i32::from(addr)) }
            .map_err(|e| ProbeError::I2c(e.into()))?;
        self.slave = Some(addr);
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), ProbeError> {
        debug!("ddc TX {} {:02x?}", self.path.display(), data);
        self.file.write_all(data)?;
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, ProbeError> {
        let n = self.file.read(buf)?;
        debug!("ddc RX {} {:02x?}", self.path.display(), &buf[..n]);
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Protocol layer
// ---------------------------------------------------------------------------

/// Current and maximum value of a VCP feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpValue {
    pub current: u16,
    pub maximum: u16,
}

/// An open DDC/CI session with one monitor.
///
/// The EDID is read once at open; the capability string is fetched and
/// parsed lazily on first control access and cached for the handle's
/// lifetime.  All operations block and must be serialized per handle.
pub struct DdcDevice<B: I2cBus = LinuxI2c> {
    bus: B,
    earliest_next: Option<Instant>,
    capabilities: Option<Capabilities>,
    edid_raw: Vec<u8>,
    edid_info: Option<EdidInfo>,
    quirk_enabled: bool,
}

impl DdcDevice<LinuxI2c> {
    /// Open the monitor behind an I2C character device path and run the
    /// startup sequence.
    pub fn open(path: &Path) -> Result<Self, ProbeError> {
        let mut device = Self::with_bus(LinuxI2c::open(path)?);
        device.startup()?;
        Ok(device)
    }
}

impl<B: I2cBus> DdcDevice<B> {
    /// Build a session over an already-opened bus without touching the
    /// hardware.  Call [`startup()`](Self::startup) before anything else.
    pub fn with_bus(bus: B) -> Self {
        Self {
            bus,
            earliest_next: None,
            capabilities: None,
            edid_raw: Vec::new(),
            edid_info: None,
            quirk_enabled: false,
        }
    }

    /// Read the EDID and apply the vendor startup quirk.
    ///
    /// Samsung displays need an "enable application report" VCP set
    /// before they honor other transactions; everyone else gets a
    /// command-presence probe that is allowed to fail.
    pub fn startup(&mut self) -> Result<(), ProbeError> {
        self.edid_raw = self.read_edid_block()?;
        let info = edid::parse(&self.edid_raw)?;
        debug!(
            "EDID vendor {} product 0x{:04x} serial 0x{:08x}",
            info.pnp_id, info.product_code, info.serial
        );

        if info.pnp_id.starts_with(DDC_QUIRK_PNP_PREFIX) {
            self.vcp_set_raw(DDC_VCP_ENABLE_APPLICATION_REPORT, 1)?;
            self.quirk_enabled = true;
        } else if let Err(e) = self.vcp_run(DDC_VCP_COMMAND_PRESENT) {
            // Absence of the feature is normal; nothing to do about it
            debug!("command-present probe failed (non-fatal): {e}");
        }

        self.edid_info = Some(info);
        Ok(())
    }

    /// The raw 128-byte EDID block read at startup.
    pub fn get_edid(&self) -> &[u8] {
        &self.edid_raw
    }

    /// Identity fields decoded from the EDID.
    pub fn edid_info(&self) -> Option<&EdidInfo> {
        self.edid_info.as_ref()
    }

    // --- Paced framing ---

    /// Sleep out whatever settle deadline the previous transaction set.
    fn pace(&mut self) {
        if let Some(deadline) = self.earliest_next.take() {
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
        }
    }

    /// Frame and send one DDC/CI payload.
    fn write(&mut self, payload: &[u8]) -> Result<(), ProbeError> {
        if payload.is_empty() || payload.len() > DDC_MAX_PAYLOAD {
            return Err(ProbeError::InvalidResponse(format!(
                "payload length {} out of range",
                payload.len()
            )));
        }

        let mut frame = Vec::with_capacity(payload.len() + 3);
        frame.push(DDC_HOST_MAGIC);
        frame.push(DDC_LEN_FLAG | payload.len() as u8);
        frame.extend_from_slice(payload);
        frame.push(xor_checksum((DDC_CI_ADDR as u8) << 1, &frame));

        self.bus.set_slave_address(DDC_CI_ADDR)?;
        self.pace();
        self.bus.write_bytes(&frame)?;
        self.earliest_next = Some(Instant::now() + DDC_DELAY_WRITE);
        Ok(())
    }

    /// Read and validate one DDC/CI reply, returning its payload.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, ProbeError> {
        self.bus.set_slave_address(DDC_CI_ADDR)?;
        self.pace();

        let mut buf = vec![0u8; max_len + 3];
        let got = self.bus.read_bytes(&mut buf)?;
        if got < 3 {
            return Err(ProbeError::InvalidResponse(format!(
                "reply too short: {} bytes",
                got
            )));
        }

        if buf[0] != (DDC_CI_ADDR as u8) * 2 {
            return Err(ProbeError::InvalidResponse(format!(
                "first byte wrong (0x{:02x}), device busy?",
                buf[0]
            )));
        }

        if buf[1] & DDC_LEN_FLAG == 0 {
            // Some vendors (Fujitsu Siemens among them) send the length
            // byte without the magic high bit; tolerate it
            warn!("length byte 0x{:02x} missing magic bit, tolerating", buf[1]);
        }
        let len = (buf[1] & !DDC_LEN_FLAG) as usize;
        if len > max_len {
            return Err(ProbeError::ReplyTooLong { len, max_len });
        }

        let residue = xor_checksum(DDC_CHECKSUM_SEED_RECV, &buf[..len + 3]);
        if residue != 0 {
            return Err(ProbeError::CorruptFrame {
                residue,
                frame: hex(&buf[..len + 3]),
            });
        }

        let payload = buf[2..2 + len].to_vec();
        self.earliest_next = Some(Instant::now() + DDC_DELAY_READ);
        Ok(payload)
    }

    // --- VCP operations ---

    /// Read the current and maximum value of a VCP feature.
    pub fn vcp_request(&mut self, id: u8) -> Result<VcpValue, ProbeError> {
        self.write(&[DDC_VCP_REQUEST, id])?;
        let reply = self.read(8)?;
        if reply.len() < 8 {
            return Err(ProbeError::InvalidResponse(format!(
                "VCP reply too short: {}",
                hex(&reply)
            )));
        }
        if reply[0] != DDC_VCP_REPLY {
            return Err(ProbeError::InvalidResponse(format!(
                "expected VCP reply 0x{DDC_VCP_REPLY:02x}, got 0x{:02x}",
                reply[0]
            )));
        }
        if reply[1] != 0 {
            return Err(ProbeError::InvalidResponse(format!(
                "VCP feature 0x{id:02x} unsupported (rc 0x{:02x})",
                reply[1]
            )));
        }
        if reply[2] != id {
            return Err(ProbeError::InvalidResponse(format!(
                "wrong feature echoed: asked 0x{id:02x}, got 0x{:02x}",
                reply[2]
            )));
        }
        Ok(VcpValue {
            maximum: u16::from_be_bytes([reply[4], reply[5]]),
            current: u16::from_be_bytes([reply[6], reply[7]]),
        })
    }

    /// Set a VCP feature, enforcing the control's permitted value set
    /// when the capability string declares one.
    pub fn vcp_set(&mut self, id: u8, value: u16) -> Result<(), ProbeError> {
        let caps = self.ensure_capabilities()?;
        if let Some(control) = caps.control(id) {
            if !control.permits(value) {
                let allowed = control
                    .allowed
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                return Err(ProbeError::ValueOutOfRange { id, value, allowed });
            }
        }
        self.vcp_set_raw(id, value)
    }

    /// Set a VCP feature without consulting the capability string.
    /// Startup quirks use this before capabilities are available.
    fn vcp_set_raw(&mut self, id: u8, value: u16) -> Result<(), ProbeError> {
        let [hi, lo] = value.to_be_bytes();
        self.write(&[DDC_VCP_SET, id, hi, lo])?;
        // Extra settle on top of the write pacing; some monitors drop
        // the next command otherwise
        thread::sleep(DDC_DELAY_VCP_SET);
        Ok(())
    }

    /// Reset a VCP feature to its factory default.
    pub fn vcp_reset(&mut self, id: u8) -> Result<(), ProbeError> {
        self.write(&[DDC_VCP_RESET, id])
    }

    /// Run a one-byte VCP command with no sub-command (e.g. degauss).
    pub fn vcp_run(&mut self, id: u8) -> Result<(), ProbeError> {
        self.write(&[id])
    }

    /// Ask the display to persist its current settings.
    pub fn save_current_settings(&mut self) -> Result<(), ProbeError> {
        self.write(&[DDC_SAVE_CURRENT_SETTINGS])?;
        self.earliest_next = Some(Instant::now() + DDC_DELAY_SAVE);
        Ok(())
    }

    // --- Capabilities ---

    /// The monitor's VCP controls, fetching the capability string on
    /// first access.
    pub fn get_controls(&mut self) -> Result<Vec<VcpControl>, ProbeError> {
        Ok(self.ensure_capabilities()?.controls.clone())
    }

    fn ensure_capabilities(&mut self) -> Result<&Capabilities, ProbeError> {
        let caps = match self.capabilities.take() {
            Some(caps) => caps,
            None => {
                let raw = self.capabilities_string()?;
                parse_capabilities(&raw)?
            }
        };
        Ok(self.capabilities.insert(caps))
    }

    /// Fetch the raw capability string chunk by chunk.
    ///
    /// Each chunk request carries the running offset; a malformed reply
    /// burns one attempt from the budget (5 before the first chunk
    /// lands, 3 thereafter).  Bus I/O failures propagate immediately,
    /// only validation failures are retried.  An empty chunk terminates
    /// the loop.
    pub fn capabilities_string(&mut self) -> Result<String, ProbeError> {
        let mut raw = Vec::new();
        let mut offset: u16 = 0;
        let mut budget = DDC_CAPS_ATTEMPTS_FIRST;

        loop {
            match self.capabilities_chunk(offset) {
                Ok(chunk) => {
                    if chunk.is_empty() {
                        break;
                    }
                    raw.extend_from_slice(&chunk);
                    offset = next_offset(offset, chunk.len())?;
                    budget = DDC_CAPS_ATTEMPTS_LATER;
                }
                Err(e @ (ProbeError::I2c(_) | ProbeError::Usb(_))) => return Err(e),
                Err(e) => {
                    budget -= 1;
                    if budget == 0 {
                        return Err(e);
                    }
                    debug!("capability chunk at offset {offset} failed, retrying: {e}");
                }
            }
        }

        Ok(String::from_utf8_lossy(&raw)
            .trim_end_matches('\0')
            .to_string())
    }

    fn capabilities_chunk(&mut self, offset: u16) -> Result<Vec<u8>, ProbeError> {
        let [hi, lo] = offset.to_be_bytes();
        self.write(&[DDC_CAPABILITIES_REQUEST, hi, lo])?;
        let payload = self.read(DDC_CAPS_CHUNK_LEN + 3)?;

        if payload.len() < 3 {
            return Err(ProbeError::InvalidResponse(format!(
                "capability reply too short: {}",
                hex(&payload)
            )));
        }
        if payload[0] != DDC_CAPABILITIES_REPLY {
            return Err(ProbeError::InvalidResponse(format!(
                "expected capability reply 0x{DDC_CAPABILITIES_REPLY:02x}, got 0x{:02x}",
                payload[0]
            )));
        }
        let echoed = u16::from_be_bytes([payload[1], payload[2]]);
        if echoed != offset {
            return Err(ProbeError::InvalidResponse(format!(
                "capability offset mismatch: asked {offset}, got {echoed}"
            )));
        }

        Ok(payload[3..].to_vec())
    }

    // --- EDID ---

    /// Read the base EDID block from the 0x50 EEPROM address.
    fn read_edid_block(&mut self) -> Result<Vec<u8>, ProbeError> {
        self.bus.set_slave_address(DDC_EDID_ADDR)?;
        self.pace();
        self.bus.write_bytes(&[0x00])?;

        let mut block = vec![0u8; EDID_BLOCK_LEN];
        let got = self.bus.read_bytes(&mut block)?;
        if got < EDID_BLOCK_LEN {
            return Err(ProbeError::InvalidEdid(format!(
                "short read: {got} of {EDID_BLOCK_LEN} bytes"
            )));
        }
        self.earliest_next = Some(Instant::now() + DDC_DELAY_READ);
        Ok(block)
    }
}

/// Advance the capability chunk offset.  The wire carries it as a u16,
/// so a string that would run past that bound is an error, not a
/// wrap-around back to offset zero.
fn next_offset(offset: u16, chunk_len: usize) -> Result<u16, ProbeError> {
    u16::try_from(chunk_len)
        .ok()
        .and_then(|len| offset.checked_add(len))
        .ok_or_else(|| ProbeError::InvalidResponse("capability string too long".to_string()))
}

impl<B: I2cBus> Drop for DdcDevice<B> {
    fn drop(&mut self) {
        // Undo the Samsung application-report quirk; best effort only
        if self.quirk_enabled {
            if let Err(e) = self.vcp_set_raw(DDC_VCP_ENABLE_APPLICATION_REPORT, 0) {
                warn!("failed to disable application report on close: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EDID_BLOCK_LEN, EDID_HEADER};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::Duration;

    /// Shared-state scripted bus so written frames survive device drop.
    #[derive(Clone, Default)]
    struct FakeBus {
        written: Rc<RefCell<Vec<(u16, Vec<u8>)>>>,
        reads: Rc<RefCell<VecDeque<Vec<u8>>>>,
        slave: Rc<RefCell<u16>>,
    }

    impl FakeBus {
        fn push_read(&self, frame: Vec<u8>) {
            self.reads.borrow_mut().push_back(frame);
        }

        fn frames(&self) -> Vec<(u16, Vec<u8>)> {
            self.written.borrow().clone()
        }
    }

    impl I2cBus for FakeBus {
        fn set_slave_address(&mut self, addr: u16) -> Result<(), ProbeError> {
            *self.slave.borrow_mut() = addr;
            Ok(())
        }

        fn write_bytes(&mut self, data: &[u8]) -> Result<(), ProbeError> {
            self.written
                .borrow_mut()
                .push((*self.slave.borrow(), data.to_vec()));
            Ok(())
        }

        fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, ProbeError> {
            let frame = self
                .reads
                .borrow_mut()
                .pop_front()
                .expect("read script exhausted");
            let n = frame.len().min(buf.len());
            buf[..n].copy_from_slice(&frame[..n]);
            Ok(n)
        }
    }

    /// Build a well-formed display→host frame around `payload`.
    fn ddc_reply(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x6e, DDC_LEN_FLAG | payload.len() as u8];
        frame.extend_from_slice(payload);
        frame.push(xor_checksum(DDC_CHECKSUM_SEED_RECV, &frame));
        frame
    }

    fn device() -> (DdcDevice<FakeBus>, FakeBus) {
        let bus = FakeBus::default();
        (DdcDevice::with_bus(bus.clone()), bus)
    }

    fn edid_block(pnp_hi: u8, pnp_lo: u8) -> Vec<u8> {
        let mut block = vec![0u8; EDID_BLOCK_LEN];
        block[..8].copy_from_slice(&EDID_HEADER);
        block[8] = pnp_hi;
        block[9] = pnp_lo;
        block
    }

    // --- Framing ---

    #[test]
    fn write_frames_carry_xor_checksum() {
        for len in [1usize, 7, 32, DDC_MAX_PAYLOAD] {
            let (mut dev, bus) = device();
            let payload: Vec<u8> = (0..len as u8).collect();
            dev.write(&payload).unwrap();

            let (slave, frame) = bus.frames().remove(0);
            assert_eq!(slave, DDC_CI_ADDR);
            assert_eq!(frame[0], DDC_HOST_MAGIC);
            assert_eq!(frame[1], DDC_LEN_FLAG | len as u8);
            assert_eq!(&frame[2..2 + len], payload.as_slice());
            let expected = xor_checksum((DDC_CI_ADDR as u8) << 1, &frame[..frame.len() - 1]);
            assert_eq!(*frame.last().unwrap(), expected);
        }
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let (mut dev, _bus) = device();
        let payload = vec![0u8; DDC_MAX_PAYLOAD + 1];
        assert!(dev.write(&payload).is_err());
    }

    #[test]
    fn read_rejects_wrong_first_byte() {
        let (mut dev, bus) = device();
        let mut frame = ddc_reply(&[0x02]);
        frame[0] = 0x50;
        bus.push_read(frame);
        let err = dev.read(8).unwrap_err();
        assert!(err.to_string().contains("device busy"), "got: {err}");
    }

    #[test]
    fn read_rejects_corrupt_checksum() {
        let (mut dev, bus) = device();
        let mut frame = ddc_reply(&[0x02, 0x00]);
        *frame.last_mut().unwrap() ^= 0xff;
        bus.push_read(frame);
        assert!(matches!(
            dev.read(8).unwrap_err(),
            ProbeError::CorruptFrame { .. }
        ));
    }

    #[test]
    fn read_tolerates_missing_length_magic_bit() {
        let (mut dev, bus) = device();
        // Length byte without the 0x80 flag, checksum still valid
        let payload = [0xaa, 0xbb];
        let mut frame = vec![0x6e, payload.len() as u8];
        frame.extend_from_slice(&payload);
        frame.push(xor_checksum(DDC_CHECKSUM_SEED_RECV, &frame));
        bus.push_read(frame);
        assert_eq!(dev.read(8).unwrap(), payload.to_vec());
    }

    #[test]
    fn read_rejects_oversize_length() {
        let (mut dev, bus) = device();
        let frame = ddc_reply(&[0u8; 20]);
        bus.push_read(frame);
        assert!(matches!(
            dev.read(8).unwrap_err(),
            ProbeError::ReplyTooLong { len: 20, max_len: 8 }
        ));
    }

    #[test]
    fn consecutive_transactions_are_paced() {
        let (mut dev, _bus) = device();
        dev.write(&[0x01, 0x00]).unwrap();
        let start = Instant::now();
        dev.write(&[0x01, 0x00]).unwrap();
        assert!(
            start.elapsed() >= Duration::from_millis(45),
            "second write should wait out the 50ms settle"
        );
    }

    // --- VCP ---

    #[test]
    fn vcp_request_parses_value_and_max() {
        let (mut dev, bus) = device();
        bus.push_read(ddc_reply(&[
            DDC_VCP_REPLY,
            0x00,
            0x10,
            0x00,
            0x00,
            0x64,
            0x00,
            0x32,
        ]));
        let value = dev.vcp_request(0x10).unwrap();
        assert_eq!(value, VcpValue { current: 0x32, maximum: 0x64 });

        // Request frame: 51 82 01 10 chk
        let (_, frame) = bus.frames().remove(0);
        assert_eq!(frame[..4], [0x51, 0x82, DDC_VCP_REQUEST, 0x10]);
    }

    #[test]
    fn vcp_request_rejects_unsupported_feature() {
        let (mut dev, bus) = device();
        bus.push_read(ddc_reply(&[DDC_VCP_REPLY, 0x01, 0x10, 0, 0, 0, 0, 0]));
        let err = dev.vcp_request(0x10).unwrap_err();
        assert!(err.to_string().contains("unsupported"), "got: {err}");
    }

    #[test]
    fn vcp_request_rejects_wrong_echo() {
        let (mut dev, bus) = device();
        bus.push_read(ddc_reply(&[DDC_VCP_REPLY, 0x00, 0x12, 0, 0, 0, 0, 0]));
        assert!(dev.vcp_request(0x10).is_err());
    }

    #[test]
    fn vcp_set_enforces_permitted_values() {
        let (mut dev, bus) = device();
        dev.capabilities = Some(
            parse_capabilities("vcp(10(10 20 30))").unwrap(),
        );

        let err = dev.vcp_set(0x10, 15).unwrap_err();
        assert!(matches!(err, ProbeError::ValueOutOfRange { id: 0x10, value: 15, .. }));
        assert!(err.to_string().contains("10 20 30"), "got: {err}");
        assert!(bus.frames().is_empty(), "rejected set must not hit the bus");

        dev.vcp_set(0x10, 20).unwrap();
        let (_, frame) = bus.frames().remove(0);
        assert_eq!(frame[..6], [0x51, 0x84, DDC_VCP_SET, 0x10, 0x00, 20]);
    }

    #[test]
    fn vcp_set_allows_unlisted_features() {
        let (mut dev, bus) = device();
        dev.capabilities = Some(parse_capabilities("vcp(10)").unwrap());
        dev.vcp_set(0xf5, 1).unwrap();
        assert_eq!(bus.frames().len(), 1);
    }

    #[test]
    fn vcp_reset_and_run_frames() {
        let (mut dev, bus) = device();
        dev.vcp_reset(0x10).unwrap();
        dev.vcp_run(0xf7).unwrap();
        let frames = bus.frames();
        assert_eq!(frames[0].1[..4], [0x51, 0x82, DDC_VCP_RESET, 0x10]);
        assert_eq!(frames[1].1[..3], [0x51, 0x81, 0xf7]);
    }

    // --- Capabilities ---

    fn caps_chunk_reply(offset: u16, data: &[u8]) -> Vec<u8> {
        let [hi, lo] = offset.to_be_bytes();
        let mut payload = vec![DDC_CAPABILITIES_REPLY, hi, lo];
        payload.extend_from_slice(data);
        ddc_reply(&payload)
    }

    #[test]
    fn capability_string_assembles_chunks() {
        let (mut dev, bus) = device();
        bus.push_read(caps_chunk_reply(0, b"(type(lcd)"));
        bus.push_read(caps_chunk_reply(10, b"vcp(10 12(1 2)))"));
        bus.push_read(caps_chunk_reply(26, b""));

        let caps = dev.capabilities_string().unwrap();
        assert_eq!(caps, "(type(lcd)vcp(10 12(1 2)))");

        // Offsets ride along big-endian in each request
        let frames = bus.frames();
        assert_eq!(frames[0].1[..5], [0x51, 0x83, 0xf3, 0x00, 0x00]);
        assert_eq!(frames[1].1[..5], [0x51, 0x83, 0xf3, 0x00, 10]);
        assert_eq!(frames[2].1[..5], [0x51, 0x83, 0xf3, 0x00, 26]);
    }

    #[test]
    fn capability_fetch_retries_on_bad_chunk() {
        let (mut dev, bus) = device();
        bus.push_read(caps_chunk_reply(0, b"vcp(10)"));
        // Wrong offset echo burns one retry, then the empty chunk lands
        bus.push_read(caps_chunk_reply(99, b"junk"));
        bus.push_read(caps_chunk_reply(7, b""));

        assert_eq!(dev.capabilities_string().unwrap(), "vcp(10)");
    }

    #[test]
    fn capability_fetch_gives_up_after_budget() {
        let (mut dev, bus) = device();
        for _ in 0..DDC_CAPS_ATTEMPTS_FIRST {
            bus.push_read(caps_chunk_reply(99, b"wrong offset"));
        }
        assert!(dev.capabilities_string().is_err());
        assert_eq!(bus.frames().len(), DDC_CAPS_ATTEMPTS_FIRST);
    }

    /// Bus whose reads always fail at the I/O layer.
    struct DeadReadBus {
        requests: usize,
    }

    impl I2cBus for DeadReadBus {
        fn set_slave_address(&mut self, _addr: u16) -> Result<(), ProbeError> {
            Ok(())
        }

        fn write_bytes(&mut self, _data: &[u8]) -> Result<(), ProbeError> {
            self.requests += 1;
            Ok(())
        }

        fn read_bytes(&mut self, _buf: &mut [u8]) -> Result<usize, ProbeError> {
            Err(ProbeError::I2c(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )))
        }
    }

    #[test]
    fn capability_fetch_propagates_transport_errors() {
        let mut dev = DdcDevice::with_bus(DeadReadBus { requests: 0 });
        let err = dev.capabilities_string().unwrap_err();
        assert!(matches!(err, ProbeError::I2c(_)), "got: {err}");
        assert_eq!(
            dev.bus.requests, 1,
            "an I/O failure must not burn the retry budget"
        );
    }

    #[test]
    fn capability_offset_cannot_wrap() {
        assert_eq!(next_offset(0, 32).unwrap(), 32);
        assert_eq!(next_offset(u16::MAX - 32, 32).unwrap(), u16::MAX);
        assert!(matches!(
            next_offset(u16::MAX - 10, 32).unwrap_err(),
            ProbeError::InvalidResponse(_)
        ));
    }

    #[test]
    fn get_controls_parses_and_caches() {
        let (mut dev, bus) = device();
        bus.push_read(caps_chunk_reply(0, b"vcp(10 12(1 2))"));
        bus.push_read(caps_chunk_reply(15, b""));

        let controls = dev.get_controls().unwrap();
        assert_eq!(controls.len(), 2);
        assert_eq!(controls[1].allowed, vec![1, 2]);

        // Second call must not touch the bus again
        let before = bus.frames().len();
        dev.get_controls().unwrap();
        assert_eq!(bus.frames().len(), before);
    }

    // --- Startup quirks ---

    #[test]
    fn samsung_quirk_enables_and_disables_application_report() {
        let bus = FakeBus::default();
        {
            let mut dev = DdcDevice::with_bus(bus.clone());
            // SAM = 0x4c2d
            bus.push_read(edid_block(0x4c, 0x2d));
            dev.startup().unwrap();

            let frames = bus.frames();
            assert_eq!(frames[0], (DDC_EDID_ADDR, vec![0x00]));
            assert_eq!(
                frames[1].1[..6],
                [0x51, 0x84, DDC_VCP_SET, DDC_VCP_ENABLE_APPLICATION_REPORT, 0x00, 0x01]
            );
        }
        // Dropping the handle sends the matching disable
        let frames = bus.frames();
        let last = &frames.last().unwrap().1;
        assert_eq!(
            last[..6],
            [0x51, 0x84, DDC_VCP_SET, DDC_VCP_ENABLE_APPLICATION_REPORT, 0x00, 0x00]
        );
    }

    #[test]
    fn other_vendors_get_presence_probe() {
        let (mut dev, bus) = device();
        // DEL = D(4) E(5) L(12) → 0b0_00100_00101_01100 = 0x10ac
        bus.push_read(edid_block(0x10, 0xac));
        dev.startup().unwrap();

        let frames = bus.frames();
        assert_eq!(frames[1].1[..3], [0x51, 0x81, DDC_VCP_COMMAND_PRESENT]);
        assert!(!dev.quirk_enabled);
    }

    #[test]
    fn startup_rejects_garbage_edid() {
        let (mut dev, bus) = device();
        bus.push_read(vec![0u8; EDID_BLOCK_LEN]);
        assert!(matches!(
            dev.startup().unwrap_err(),
            ProbeError::InvalidEdid(_)
        ));
    }

    #[test]
    fn save_extends_the_settle_deadline() {
        let (mut dev, _bus) = device();
        dev.save_current_settings().unwrap();
        let deadline = dev.earliest_next.unwrap();
        assert!(deadline > Instant::now() + Duration::from_millis(150));
    }
}
