//! Transport abstraction
//!
//! This module provides the [`DsiLink`] trait the controller sends command
//! sequences through, the [`TearSignal`] trait used by the tear-signal ESD
//! check, and embedded-hal backed implementations of both:
//!
//! - [`SpiLink`] drives a DBI (MIPI type C, 4-wire) panel over SPI with a
//!   data/command pin, sending each [`Command`] as opcode plus parameters
//! - [`TePin`] polls the panel's tear-effect output pin for a rising edge
//!
//! ## Example
//!
//! ```rust,no_run
//! use dsi_panel::{Command, DsiLink, LinkState, SpiLink, TxRequest};
//! # use core::convert::Infallible;
//! # use embedded_hal::delay::DelayNs;
//! # use embedded_hal::digital::OutputPin;
//! # use embedded_hal::spi::{Operation, SpiDevice};
//! # struct MockSpi;
//! # impl embedded_hal::spi::ErrorType for MockSpi { type Error = Infallible; }
//! # impl SpiDevice for MockSpi {
//! #     fn transaction(
//! #         &mut self,
//! #         _operations: &mut [Operation<'_, u8>],
//! #     ) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! # }
//! # struct MockPin;
//! # impl embedded_hal::digital::ErrorType for MockPin { type Error = Infallible; }
//! # impl OutputPin for MockPin {
//! #     fn set_low(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! #     fn set_high(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # struct MockDelay;
//! # impl DelayNs for MockDelay { fn delay_ns(&mut self, _ns: u32) {} }
//! let mut link = SpiLink::new(MockSpi, MockPin, MockPin, MockDelay);
//!
//! // Set brightness to half
//! let cmd = Command::dcs_short_write(0x51, 0x80);
//! let _ = link.transmit(&[cmd], TxRequest::new(LinkState::HighSpeed));
//! ```

use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::{Operation, SpiDevice};

use crate::command::{Command, DCS_GET_POWER_MODE};
use crate::sequence::LinkState;

type LinkResult<T, E> = core::result::Result<T, E>;

/// Per-transfer options passed to a [`DsiLink`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxRequest {
    /// Link state to switch to for this transfer
    pub link_state: LinkState,
    /// Send only on this link, even when the host broadcasts to both
    pub unicast: bool,
}

impl TxRequest {
    /// Broadcast-capable transfer in `link_state`
    pub fn new(link_state: LinkState) -> Self {
        Self {
            link_state,
            unicast: false,
        }
    }

    /// Mark the transfer as unicast
    pub fn unicast(mut self) -> Self {
        self.unicast = true;
        self
    }
}

/// One DSI (or DBI) link to a panel controller
///
/// The dispatcher holds one of these per physical link and guarantees a
/// single in-flight sequence on it at a time.
pub trait DsiLink {
    /// Error type for link operations
    type Error: Debug;

    /// Send `commands` in order, honoring each command's wait
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware rejects or fails to acknowledge a
    /// command. Commands after the failing one are not sent.
    fn transmit(&mut self, commands: &[Command], request: TxRequest)
    -> LinkResult<(), Self::Error>;

    /// Issue a read request and collect the response into `buf`
    ///
    /// Returns the number of bytes received.
    fn read(
        &mut self,
        command: &Command,
        request: TxRequest,
        buf: &mut [u8],
    ) -> LinkResult<usize, Self::Error>;

    /// Hand bus ownership to the panel and back
    ///
    /// An error means the panel did not respond.
    fn bus_turnaround(&mut self) -> LinkResult<(), Self::Error>;
}

/// Source of tear-effect pulses
pub trait TearSignal {
    /// Error type for reading the signal
    type Error: Debug;

    /// Block until a pulse arrives or `timeout_ms` elapses
    ///
    /// Returns `Ok(true)` when a pulse was seen, `Ok(false)` on timeout.
    fn wait_for_pulse(&mut self, timeout_ms: u32) -> LinkResult<bool, Self::Error>;
}

/// [`TearSignal`] for panels without a tear-effect line
///
/// Never reports a pulse.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTearSignal;

impl TearSignal for NoTearSignal {
    type Error = core::convert::Infallible;

    fn wait_for_pulse(&mut self, _timeout_ms: u32) -> LinkResult<bool, Self::Error> {
        Ok(false)
    }
}

/// Errors that can occur at the interface level
///
/// Generic over SPI and GPIO error types.
#[derive(Debug)]
pub enum InterfaceError<SpiErr, PinErr> {
    /// SPI communication error
    Spi(SpiErr),
    /// GPIO pin error
    Pin(PinErr),
    /// A command had no opcode to send
    EmptyCommand,
}

impl<SpiErr: Debug, PinErr: Debug> core::fmt::Display for InterfaceError<SpiErr, PinErr> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "SPI error: {e:?}"),
            Self::Pin(e) => write!(f, "Pin error: {e:?}"),
            Self::EmptyCommand => write!(f, "Command without opcode"),
        }
    }
}

impl<SpiErr: Debug, PinErr: Debug> core::error::Error for InterfaceError<SpiErr, PinErr> {}

/// One step of a hardware reset sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResetStep {
    /// Level to drive the reset line to
    pub high: bool,
    /// Time to hold that level in milliseconds
    pub delay_ms: u32,
}

/// DBI-over-SPI implementation of [`DsiLink`]
///
/// ## Type Parameters
///
/// * `SPI` - SPI device implementing [`SpiDevice`]
/// * `DC` - Data/Command pin implementing [`OutputPin`]
/// * `RST` - Reset pin implementing [`OutputPin`]
/// * `D` - Delay used for per-command waits and reset timing
pub struct SpiLink<SPI, DC, RST, D> {
    spi: SPI,
    /// Data/Command select pin (low=command, high=data)
    dc: DC,
    /// Reset pin (active low)
    rst: RST,
    delay: D,
}

impl<SPI, DC, RST, D> SpiLink<SPI, DC, RST, D>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    D: DelayNs,
{
    /// Create a new link
    ///
    /// # Arguments
    ///
    /// * `spi` - SPI device (must implement [`SpiDevice`])
    /// * `dc` - Data/Command pin (output, low=command, high=data)
    /// * `rst` - Reset pin (output, active low)
    /// * `delay` - Delay provider
    pub fn new(spi: SPI, dc: DC, rst: RST, delay: D) -> Self {
        Self {
            spi,
            dc,
            rst,
            delay,
        }
    }

    /// Drive the reset line through `steps`
    ///
    /// Pin errors are ignored, as a failed reset shows up in the first
    /// command sent afterwards.
    pub fn hardware_reset(&mut self, steps: &[ResetStep]) {
        for step in steps {
            let _ = if step.high {
                self.rst.set_high()
            } else {
                self.rst.set_low()
            };
            self.delay.delay_ms(step.delay_ms);
        }
    }

    /// Release the SPI device and pins
    pub fn release(self) -> (SPI, DC, RST, D) {
        (self.spi, self.dc, self.rst, self.delay)
    }

    fn write_opcode(&mut self, opcode: u8) -> LinkResult<(), InterfaceError<SPI::Error, DC::Error>> {
        self.dc.set_low().map_err(InterfaceError::Pin)?;
        self.spi.write(&[opcode]).map_err(InterfaceError::Spi)
    }
}

impl<SPI, DC, RST, D, PinErr> DsiLink for SpiLink<SPI, DC, RST, D>
where
    SPI: SpiDevice,
    SPI::Error: Debug,
    DC: OutputPin<Error = PinErr>,
    RST: OutputPin<Error = PinErr>,
    D: DelayNs,
    PinErr: Debug,
{
    type Error = InterfaceError<SPI::Error, PinErr>;

    fn transmit(
        &mut self,
        commands: &[Command],
        _request: TxRequest,
    ) -> LinkResult<(), Self::Error> {
        for cmd in commands {
            let opcode = cmd.opcode().ok_or(InterfaceError::EmptyCommand)?;
            self.write_opcode(opcode)?;
            let params = cmd.params();
            if !params.is_empty() {
                self.dc.set_high().map_err(InterfaceError::Pin)?;
                self.spi.write(params).map_err(InterfaceError::Spi)?;
            }
            if cmd.wait_ms() > 0 {
                self.delay.delay_ms(u32::from(cmd.wait_ms()));
            }
        }
        Ok(())
    }

    fn read(
        &mut self,
        command: &Command,
        _request: TxRequest,
        buf: &mut [u8],
    ) -> LinkResult<usize, Self::Error> {
        let opcode = command.opcode().ok_or(InterfaceError::EmptyCommand)?;
        self.dc.set_low().map_err(InterfaceError::Pin)?;
        self.spi
            .transaction(&mut [Operation::Write(&[opcode]), Operation::Read(&mut *buf)])
            .map_err(InterfaceError::Spi)?;
        Ok(buf.len())
    }

    fn bus_turnaround(&mut self) -> LinkResult<(), Self::Error> {
        // DBI has no turnaround; a power mode read exercises the same path
        let mut mode = [0u8; 1];
        self.dc.set_low().map_err(InterfaceError::Pin)?;
        self.spi
            .transaction(&mut [
                Operation::Write(&[DCS_GET_POWER_MODE]),
                Operation::Read(&mut mode),
            ])
            .map_err(InterfaceError::Spi)
    }
}

/// Default interval between tear pin samples in microseconds
pub const DEFAULT_TE_POLL_US: u32 = 100;

/// Polled tear-effect pin implementing [`TearSignal`]
///
/// A pulse is a low-to-high transition of the pin. Sampling starts fresh on
/// every wait, so a pin that is already high must go low first.
pub struct TePin<P, D> {
    pin: P,
    delay: D,
    poll_us: u32,
}

impl<P, D> TePin<P, D>
where
    P: InputPin,
    D: DelayNs,
{
    /// Create a tear pin sampler
    pub fn new(pin: P, delay: D) -> Self {
        Self {
            pin,
            delay,
            poll_us: DEFAULT_TE_POLL_US,
        }
    }

    /// Set the sampling interval in microseconds
    ///
    /// Zero is treated as one.
    pub fn set_poll_interval(&mut self, poll_us: u32) -> &mut Self {
        self.poll_us = poll_us.max(1);
        self
    }

    /// Sampling interval in microseconds
    pub fn poll_interval(&self) -> u32 {
        self.poll_us
    }
}

impl<P, D> TearSignal for TePin<P, D>
where
    P: InputPin,
    P::Error: Debug,
    D: DelayNs,
{
    type Error = P::Error;

    fn wait_for_pulse(&mut self, timeout_ms: u32) -> LinkResult<bool, Self::Error> {
        let budget_us = timeout_ms.saturating_mul(1000);
        let mut elapsed_us = 0u32;
        let mut was_high = self.pin.is_high()?;

        loop {
            self.delay.delay_us(self.poll_us);
            elapsed_us = elapsed_us.saturating_add(self.poll_us);

            let high = self.pin.is_high()?;
            if high && !was_high {
                return Ok(true);
            }
            was_high = high;

            if elapsed_us >= budget_us {
                return Ok(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;
    use embedded_hal::spi::ErrorType as SpiErrorType;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Dc(bool),
        Rst(bool),
        Write(Vec<u8>),
        Read(usize),
        Delay(u32),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct MockSpi(Log);
    struct MockDc(Log);
    struct MockRst(Log);
    struct MockDelay(Log);

    impl SpiErrorType for MockSpi {
        type Error = Infallible;
    }

    impl SpiDevice for MockSpi {
        fn transaction(
            &mut self,
            operations: &mut [Operation<'_, u8>],
        ) -> Result<(), Self::Error> {
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        self.0.borrow_mut().push(Event::Write(bytes.to_vec()));
                    }
                    Operation::Read(buf) => {
                        buf.fill(0x9C);
                        self.0.borrow_mut().push(Event::Read(buf.len()));
                    }
                    _ => {}
                }
            }
            Ok(())
        }
    }

    impl ErrorType for MockDc {
        type Error = Infallible;
    }

    impl OutputPin for MockDc {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().push(Event::Dc(false));
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().push(Event::Dc(true));
            Ok(())
        }
    }

    impl ErrorType for MockRst {
        type Error = Infallible;
    }

    impl OutputPin for MockRst {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().push(Event::Rst(false));
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().push(Event::Rst(true));
            Ok(())
        }
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, _ns: u32) {}
        fn delay_ms(&mut self, ms: u32) {
            self.0.borrow_mut().push(Event::Delay(ms));
        }
    }

    fn test_link() -> (SpiLink<MockSpi, MockDc, MockRst, MockDelay>, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let link = SpiLink::new(
            MockSpi(log.clone()),
            MockDc(log.clone()),
            MockRst(log.clone()),
            MockDelay(log.clone()),
        );
        (link, log)
    }

    #[test]
    fn test_transmit_splits_opcode_and_params() {
        let (mut link, log) = test_link();
        let cmd = Command::dcs_long_write(&[0x2A, 0x00, 0x00, 0x01, 0xDF], true);
        link.transmit(&[cmd], TxRequest::new(LinkState::HighSpeed))
            .unwrap();

        assert_eq!(
            *log.borrow(),
            alloc::vec![
                Event::Dc(false),
                Event::Write(alloc::vec![0x2A]),
                Event::Dc(true),
                Event::Write(alloc::vec![0x00, 0x00, 0x01, 0xDF]),
            ]
        );
    }

    #[test]
    fn test_transmit_honors_command_wait() {
        let (mut link, log) = test_link();
        let raw = [0x05, 0x01, 0x00, 0x00, 0x78, 0x00, 0x01, 0x11];
        let seq = crate::sequence::CommandSequence::parse(&raw, LinkState::LowPower).unwrap();
        link.transmit(seq.commands(), TxRequest::new(seq.link_state()))
            .unwrap();

        assert_eq!(log.borrow().last(), Some(&Event::Delay(120)));
    }

    #[test]
    fn test_transmit_rejects_empty_command() {
        let (mut link, _log) = test_link();
        let cmd = Command::new(crate::command::CommandHeader::default(), Vec::new());
        let result = link.transmit(&[cmd], TxRequest::new(LinkState::LowPower));
        assert!(matches!(result, Err(InterfaceError::EmptyCommand)));
    }

    #[test]
    fn test_read_fills_buffer() {
        let (mut link, log) = test_link();
        let mut buf = [0u8; 3];
        let cmd = Command::dcs_read(DCS_GET_POWER_MODE, 0x00);
        let n = link
            .read(&cmd, TxRequest::new(LinkState::LowPower), &mut buf)
            .unwrap();

        assert_eq!(n, 3);
        assert_eq!(buf, [0x9C; 3]);
        assert!(log.borrow().contains(&Event::Read(3)));
    }

    #[test]
    fn test_hardware_reset_follows_steps() {
        let (mut link, log) = test_link();
        link.hardware_reset(&[
            ResetStep {
                high: true,
                delay_ms: 20,
            },
            ResetStep {
                high: false,
                delay_ms: 1,
            },
            ResetStep {
                high: true,
                delay_ms: 20,
            },
        ]);

        assert_eq!(
            *log.borrow(),
            alloc::vec![
                Event::Rst(true),
                Event::Delay(20),
                Event::Rst(false),
                Event::Delay(1),
                Event::Rst(true),
                Event::Delay(20),
            ]
        );
    }

    struct ScriptedPin {
        levels: Vec<bool>,
        idx: usize,
    }

    impl ErrorType for ScriptedPin {
        type Error = Infallible;
    }

    impl InputPin for ScriptedPin {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            let level = self.levels.get(self.idx).copied().unwrap_or(false);
            self.idx += 1;
            Ok(level)
        }
        fn is_low(&mut self) -> Result<bool, Self::Error> {
            self.is_high().map(|h| !h)
        }
    }

    struct NoDelay;
    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn test_te_pin_detects_rising_edge() {
        let pin = ScriptedPin {
            levels: alloc::vec![false, false, true],
            idx: 0,
        };
        let mut te = TePin::new(pin, NoDelay);
        assert!(te.wait_for_pulse(100).unwrap());
    }

    #[test]
    fn test_te_pin_stuck_high_times_out() {
        let pin = ScriptedPin {
            levels: alloc::vec![true; 2000],
            idx: 0,
        };
        let mut te = TePin::new(pin, NoDelay);
        te.set_poll_interval(1000);
        assert!(!te.wait_for_pulse(100).unwrap());
    }

    #[test]
    fn test_no_tear_signal_never_pulses() {
        assert!(!NoTearSignal.wait_for_pulse(100).unwrap());
    }
}
