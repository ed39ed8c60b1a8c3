//! Command sequences and the keyed sequence store
//!
//! A [`CommandSequence`] is parsed once from its DCS declaration and never
//! modified afterwards; reconfiguring the panel replaces it wholesale in the
//! [`SequenceStore`].

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::command::{Command, CommandHeader, HEADER_LEN};
use crate::error::ParseError;

/// Link state a sequence must be transmitted in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
    /// DSI low-power mode (panel on/off sequences default to this)
    #[default]
    LowPower,
    /// DSI high-speed mode
    HighSpeed,
}

impl LinkState {
    /// Parse the link-state property value (`dsi_hs_mode` / `dsi_lp_mode`)
    ///
    /// Anything other than `dsi_hs_mode` selects low-power mode.
    pub fn from_property(value: Option<&str>) -> Self {
        match value {
            Some("dsi_hs_mode") => Self::HighSpeed,
            _ => Self::LowPower,
        }
    }
}

/// An immutable, ordered list of panel commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandSequence {
    commands: Vec<Command>,
    link_state: LinkState,
}

impl CommandSequence {
    /// Build a sequence from already constructed commands
    pub fn from_commands(commands: Vec<Command>, link_state: LinkState) -> Self {
        Self {
            commands,
            link_state,
        }
    }

    /// Parse a DCS declaration
    ///
    /// The declaration is a run of 7-byte headers, each followed by the number
    /// of payload bytes its big-endian length field declares.
    ///
    /// # Errors
    ///
    /// - [`ParseError::Empty`] if `raw` is empty
    /// - [`ParseError::Truncated`] if a header declares more bytes than remain
    /// - [`ParseError::TrailingBytes`] if bytes remain that do not form a header
    ///
    /// # Example
    ///
    /// ```
    /// use dsi_panel::{CommandSequence, LinkState};
    ///
    /// // exit_sleep (wait 120ms), display_on (wait 20ms)
    /// let raw = [
    ///     0x05, 0x01, 0x00, 0x00, 0x78, 0x00, 0x01, 0x11,
    ///     0x05, 0x01, 0x00, 0x00, 0x14, 0x00, 0x01, 0x29,
    /// ];
    /// let seq = match CommandSequence::parse(&raw, LinkState::LowPower) {
    ///     Ok(seq) => seq,
    ///     Err(_) => return,
    /// };
    /// assert_eq!(seq.len(), 2);
    /// assert_eq!(seq.to_bytes(), raw.to_vec());
    /// ```
    pub fn parse(raw: &[u8], link_state: LinkState) -> Result<Self, ParseError> {
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut commands = Vec::new();
        let mut offset = 0usize;

        while raw.len() - offset >= HEADER_LEN {
            let Some(hdr) = raw.get(offset..offset + HEADER_LEN) else {
                break;
            };
            let declared = u16::from_be_bytes([hdr[5], hdr[6]]) as usize;
            let body_start = offset + HEADER_LEN;
            let remaining = raw.len() - body_start;
            if declared > remaining {
                log::error!(
                    "dcs declaration: dtype={:#04x} declares {} bytes, {} remain",
                    hdr[0],
                    declared,
                    remaining
                );
                return Err(ParseError::Truncated {
                    offset,
                    declared,
                    remaining,
                });
            }

            let header = CommandHeader {
                dtype: hdr[0],
                last: hdr[1],
                vc: hdr[2],
                ack: hdr[3],
                wait_ms: hdr[4],
            };
            let payload = raw
                .get(body_start..body_start + declared)
                .map(<[u8]>::to_vec)
                .unwrap_or_default();
            commands.push(Command::new(header, payload));
            offset = body_start + declared;
        }

        if offset != raw.len() {
            log::error!(
                "dcs declaration: {} trailing bytes at offset {}",
                raw.len() - offset,
                offset
            );
            return Err(ParseError::TrailingBytes {
                offset,
                len: raw.len() - offset,
            });
        }

        log::debug!(
            "dcs declaration: first={:#04x} len={} cmds={} link={:?}",
            raw[0],
            raw.len(),
            commands.len(),
            link_state
        );

        Ok(Self {
            commands,
            link_state,
        })
    }

    /// Re-encode the sequence into its declaration bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for cmd in &self.commands {
            cmd.encode_into(&mut out);
        }
        out
    }

    /// Total encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        self.commands.iter().map(Command::encoded_len).sum()
    }

    /// Commands in transmission order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Link state to transmit in
    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the sequence holds no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Purpose a stored sequence serves
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SequenceKey {
    /// Panel on
    On,
    /// Panel off
    Off,
    /// Dynamic switch from video to command mode
    VideoToCommand,
    /// Dynamic switch from command to video mode
    CommandToVideo,
    /// Status read used by register-read ESD checks
    Status,
    /// CABC disabled
    CabcOff,
    /// CABC tuned for user-interface content
    CabcUi,
    /// CABC tuned for still images
    CabcStill,
    /// CABC tuned for moving pictures
    CabcVideo,
    /// Alternate on sequence, balanced tone
    OnCabcBalance,
    /// Alternate on sequence, warm tone
    OnCabcYellow,
    /// Alternate on sequence, neutral tone
    OnCabcNormal,
}

/// Independent sequences selected by [`SequenceKey`]
#[derive(Clone, Debug, Default)]
pub struct SequenceStore {
    sequences: BTreeMap<SequenceKey, CommandSequence>,
}

impl SequenceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `sequence` under `key`, replacing any previous one
    pub fn insert(&mut self, key: SequenceKey, sequence: CommandSequence) {
        self.sequences.insert(key, sequence);
    }

    /// Parse `raw` and store it under `key`
    ///
    /// On a parse error the key is left absent; other keys are untouched.
    pub fn load(
        &mut self,
        key: SequenceKey,
        raw: &[u8],
        link_state: LinkState,
    ) -> Result<(), ParseError> {
        match CommandSequence::parse(raw, link_state) {
            Ok(seq) => {
                self.sequences.insert(key, seq);
                Ok(())
            }
            Err(e) => {
                self.sequences.remove(&key);
                Err(e)
            }
        }
    }

    /// Look up a non-empty sequence
    pub fn get(&self, key: SequenceKey) -> Option<&CommandSequence> {
        self.sequences.get(&key).filter(|seq| !seq.is_empty())
    }

    /// Whether a non-empty sequence is stored under `key`
    pub fn contains(&self, key: SequenceKey) -> bool {
        self.get(key).is_some()
    }

    /// Remove and return the sequence stored under `key`
    pub fn remove(&mut self, key: SequenceKey) -> Option<CommandSequence> {
        self.sequences.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_seq() -> alloc::vec::Vec<u8> {
        alloc::vec![
            0x39, 0x01, 0x00, 0x00, 0x00, 0x00, 0x03, 0xF0, 0x5A, 0x5A, // unlock
            0x05, 0x01, 0x00, 0x00, 0x78, 0x00, 0x01, 0x11, // exit sleep
            0x05, 0x01, 0x00, 0x00, 0x14, 0x00, 0x01, 0x29, // display on
        ]
    }

    #[test]
    fn test_parse_counts_commands_and_consumes_buffer() {
        let raw = on_seq();
        let seq = CommandSequence::parse(&raw, LinkState::LowPower).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.commands()[0].payload(), &[0xF0, 0x5A, 0x5A]);
        assert_eq!(seq.commands()[1].wait_ms(), 0x78);
        assert_eq!(seq.commands()[2].opcode(), Some(0x29));
        assert_eq!(seq.encoded_len(), raw.len());
    }

    #[test]
    fn test_parse_reencodes_bit_exact() {
        let raw = on_seq();
        let seq = CommandSequence::parse(&raw, LinkState::HighSpeed).unwrap();
        assert_eq!(seq.to_bytes(), raw);
        assert_eq!(seq.link_state(), LinkState::HighSpeed);
    }

    #[test]
    fn test_parse_declared_length_past_end_is_error() {
        let raw = [0x39, 0x01, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x01, 0x02];
        let result = CommandSequence::parse(&raw, LinkState::LowPower);
        assert_eq!(
            result,
            Err(ParseError::Truncated {
                offset: 0,
                declared: 0xFFFF,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_parse_truncated_second_command() {
        let mut raw = on_seq();
        raw.extend_from_slice(&[0x15, 0x01, 0x00, 0x00, 0x00, 0x00, 0x02, 0x51]);
        let result = CommandSequence::parse(&raw, LinkState::LowPower);
        assert!(matches!(
            result,
            Err(ParseError::Truncated {
                offset: 24,
                declared: 2,
                remaining: 1
            })
        ));
    }

    #[test]
    fn test_parse_trailing_partial_header_is_error() {
        let mut raw = on_seq();
        raw.extend_from_slice(&[0x05, 0x01, 0x00]);
        let result = CommandSequence::parse(&raw, LinkState::LowPower);
        assert_eq!(
            result,
            Err(ParseError::TrailingBytes {
                offset: 24,
                len: 3
            })
        );
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert_eq!(
            CommandSequence::parse(&[], LinkState::LowPower),
            Err(ParseError::Empty)
        );
    }

    #[test]
    fn test_zero_length_payload_is_allowed() {
        let raw = [0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        let seq = CommandSequence::parse(&raw, LinkState::LowPower).unwrap();
        assert_eq!(seq.len(), 1);
        assert!(seq.commands()[0].payload().is_empty());
    }

    #[test]
    fn test_link_state_from_property() {
        assert_eq!(
            LinkState::from_property(Some("dsi_hs_mode")),
            LinkState::HighSpeed
        );
        assert_eq!(
            LinkState::from_property(Some("dsi_lp_mode")),
            LinkState::LowPower
        );
        assert_eq!(LinkState::from_property(None), LinkState::LowPower);
    }

    #[test]
    fn test_store_parse_error_leaves_only_that_key_absent() {
        let mut store = SequenceStore::new();
        store
            .load(SequenceKey::On, &on_seq(), LinkState::LowPower)
            .unwrap();
        store
            .load(SequenceKey::Off, &on_seq(), LinkState::LowPower)
            .unwrap();

        let bad = [0x05, 0x01, 0x00, 0x00, 0x00, 0x00, 0x09];
        assert!(store
            .load(SequenceKey::Off, &bad, LinkState::LowPower)
            .is_err());

        assert!(store.contains(SequenceKey::On));
        assert!(!store.contains(SequenceKey::Off));
    }
}
