//! DSI packet types, DCS opcodes and the command record
//!
//! A panel command travels over the DSI link as a packet of a given data type
//! carrying a DCS (or generic) payload. In the declarative panel description
//! each command is encoded as a 7-byte header followed by its payload:
//!
//! | byte | field                                          |
//! |------|------------------------------------------------|
//! | 0    | data type (`DTYPE_*`)                          |
//! | 1    | last-in-frame flag (0 = batched with the next) |
//! | 2    | virtual channel                                |
//! | 3    | ack requested                                  |
//! | 4    | wait after sending, in milliseconds            |
//! | 5..7 | payload length, big-endian                     |
//!
//! ## Example
//!
//! ```
//! use dsi_panel::command::{self, Command};
//!
//! let cmd = Command::dcs_short_write(command::DCS_SET_DISPLAY_BRIGHTNESS, 0x80);
//! assert_eq!(cmd.opcode(), Some(0x51));
//! assert_eq!(cmd.payload(), &[0x51, 0x80]);
//! ```

use alloc::vec::Vec;

/// Size of the encoded command header in bytes
pub const HEADER_LEN: usize = 7;

// DSI data types

/// DCS short write, no parameter (0x05)
pub const DTYPE_DCS_WRITE: u8 = 0x05;
/// DCS short write, one parameter (0x15)
pub const DTYPE_DCS_WRITE1: u8 = 0x15;
/// DCS read (0x06)
pub const DTYPE_DCS_READ: u8 = 0x06;
/// DCS long write (0x39)
pub const DTYPE_DCS_LWRITE: u8 = 0x39;
/// Generic short write, no parameter (0x03)
pub const DTYPE_GEN_WRITE: u8 = 0x03;
/// Generic short write, one parameter (0x13)
pub const DTYPE_GEN_WRITE1: u8 = 0x13;
/// Generic short write, two parameters (0x23)
pub const DTYPE_GEN_WRITE2: u8 = 0x23;
/// Generic long write (0x29)
pub const DTYPE_GEN_LWRITE: u8 = 0x29;
/// Generic read, no parameter (0x04)
pub const DTYPE_GEN_READ: u8 = 0x04;
/// Generic read, one parameter (0x14)
pub const DTYPE_GEN_READ1: u8 = 0x14;
/// Generic read, two parameters (0x24)
pub const DTYPE_GEN_READ2: u8 = 0x24;
/// Set maximum return packet size (0x37)
pub const DTYPE_MAX_PKTSIZE: u8 = 0x37;
/// Null packet (0x09)
pub const DTYPE_NULL_PKT: u8 = 0x09;
/// Blanking packet (0x19)
pub const DTYPE_BLANK_PKT: u8 = 0x19;
/// Shut down peripheral (0x22)
pub const DTYPE_PERIPHERAL_OFF: u8 = 0x22;
/// Turn on peripheral (0x32)
pub const DTYPE_PERIPHERAL_ON: u8 = 0x32;

// DCS opcodes

/// Read display power mode (0x0A)
///
/// The usual status register for register-read ESD checks.
pub const DCS_GET_POWER_MODE: u8 = 0x0A;
/// Read the DSI error counter (0x05)
pub const DCS_GET_ERROR_COUNT: u8 = 0x05;
/// Set column address window (0x2A)
///
/// Requires 4 bytes: [start_MSB, start_LSB, end_MSB, end_LSB]
pub const DCS_SET_COLUMN_ADDRESS: u8 = 0x2A;
/// Set page (row) address window (0x2B)
///
/// Requires 4 bytes: [start_MSB, start_LSB, end_MSB, end_LSB]
pub const DCS_SET_PAGE_ADDRESS: u8 = 0x2B;
/// Set display brightness (0x51)
pub const DCS_SET_DISPLAY_BRIGHTNESS: u8 = 0x51;
/// Write CTRL display (0x53)
///
/// Used to enter and leave high-brightness mode.
pub const DCS_WRITE_CTRL_DISPLAY: u8 = 0x53;
/// Read CTRL display (0x54)
pub const DCS_READ_CTRL_DISPLAY: u8 = 0x54;
/// Write content adaptive brightness control (0x55)
///
/// Carries the ACL level on panels that support it.
pub const DCS_WRITE_CABC: u8 = 0x55;

/// Largest payload the 16-bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Raw command header, kept byte-for-byte as declared
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandHeader {
    /// DSI data type
    pub dtype: u8,
    /// Nonzero when this packet ends the frame
    pub last: u8,
    /// Virtual channel
    pub vc: u8,
    /// Nonzero when an acknowledge is requested
    pub ack: u8,
    /// Wait after sending, in milliseconds
    pub wait_ms: u8,
}

/// One command of a [`CommandSequence`](crate::sequence::CommandSequence)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    header: CommandHeader,
    payload: Vec<u8>,
}

impl Command {
    /// Create a command from a header and payload
    ///
    /// Payloads longer than [`MAX_PAYLOAD_LEN`] are cut to that length so the
    /// 16-bit length field always matches.
    pub fn new(header: CommandHeader, mut payload: Vec<u8>) -> Self {
        if payload.len() > MAX_PAYLOAD_LEN {
            log::warn!(
                "command: payload of {} bytes truncated to {}",
                payload.len(),
                MAX_PAYLOAD_LEN
            );
            payload.truncate(MAX_PAYLOAD_LEN);
        }
        Self { header, payload }
    }

    /// DCS short write with one parameter, ending its frame
    pub fn dcs_short_write(opcode: u8, param: u8) -> Self {
        Self::new(
            CommandHeader {
                dtype: DTYPE_DCS_WRITE1,
                last: 1,
                ..CommandHeader::default()
            },
            alloc::vec![opcode, param],
        )
    }

    /// DCS long write
    ///
    /// `last` controls whether the packet closes the frame or is batched with
    /// the next one.
    pub fn dcs_long_write(bytes: &[u8], last: bool) -> Self {
        Self::new(
            CommandHeader {
                dtype: DTYPE_DCS_LWRITE,
                last: u8::from(last),
                ..CommandHeader::default()
            },
            bytes.to_vec(),
        )
    }

    /// DCS read of `register`
    ///
    /// The second payload byte is the parameter the panel expects with the
    /// read request (0x00 for most status registers).
    pub fn dcs_read(register: u8, param: u8) -> Self {
        Self::new(
            CommandHeader {
                dtype: DTYPE_DCS_READ,
                last: 1,
                ack: 1,
                wait_ms: 5,
                ..CommandHeader::default()
            },
            alloc::vec![register, param],
        )
    }

    /// The command header
    pub fn header(&self) -> &CommandHeader {
        &self.header
    }

    /// DSI data type
    pub fn dtype(&self) -> u8 {
        self.header.dtype
    }

    /// Whether this packet closes the frame
    pub fn is_last(&self) -> bool {
        self.header.last != 0
    }

    /// Milliseconds to wait after sending
    pub fn wait_ms(&self) -> u8 {
        self.header.wait_ms
    }

    /// Whether this is a read request
    pub fn is_read(&self) -> bool {
        matches!(
            self.header.dtype,
            DTYPE_DCS_READ | DTYPE_GEN_READ | DTYPE_GEN_READ1 | DTYPE_GEN_READ2
        )
    }

    /// Payload bytes (opcode first for DCS packets)
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// DCS opcode, if the payload is not empty
    pub fn opcode(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Parameters following the opcode
    pub fn params(&self) -> &[u8] {
        self.payload.get(1..).unwrap_or(&[])
    }

    /// Encoded size of this command in bytes
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Append the 7-byte header and payload to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let dlen = u16::try_from(self.payload.len()).unwrap_or(u16::MAX);
        out.extend_from_slice(&[
            self.header.dtype,
            self.header.last,
            self.header.vc,
            self.header.ack,
            self.header.wait_ms,
        ]);
        out.extend_from_slice(&dlen.to_be_bytes());
        out.extend_from_slice(&self.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dcs_read_requests_ack() {
        let cmd = Command::dcs_read(DCS_GET_POWER_MODE, 0x00);
        assert!(cmd.is_read());
        assert_eq!(cmd.header().ack, 1);
        assert_eq!(cmd.params(), &[0x00]);
    }

    #[test]
    fn test_oversized_payload_truncated_to_length_field() {
        let cmd = Command::dcs_long_write(&alloc::vec![0x2C; MAX_PAYLOAD_LEN + 10], true);
        assert_eq!(cmd.payload().len(), MAX_PAYLOAD_LEN);

        let mut out = Vec::new();
        cmd.encode_into(&mut out);
        assert_eq!(&out[5..HEADER_LEN], &[0xFF, 0xFF]);
        assert_eq!(out.len(), cmd.encoded_len());
    }

    #[test]
    fn test_encode_writes_big_endian_length() {
        let payload = alloc::vec![0xAAu8; 0x0102];
        let cmd = Command::new(
            CommandHeader {
                dtype: DTYPE_GEN_LWRITE,
                last: 1,
                vc: 0,
                ack: 0,
                wait_ms: 20,
            },
            payload,
        );
        let mut out = Vec::new();
        cmd.encode_into(&mut out);
        assert_eq!(&out[..HEADER_LEN], &[0x29, 0x01, 0x00, 0x00, 20, 0x01, 0x02]);
        assert_eq!(out.len(), cmd.encoded_len());
    }

    #[test]
    fn test_empty_payload_has_no_opcode() {
        let cmd = Command::new(CommandHeader::default(), Vec::new());
        assert_eq!(cmd.opcode(), None);
        assert!(cmd.params().is_empty());
    }
}
