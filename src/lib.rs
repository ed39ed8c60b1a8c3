//! MIPI-DSI Panel Controller
//!
//! Command, backlight and ESD control for MIPI-DSI (and DBI) display panels
//! described by a property tree.
//!
//! ## Features
//!
//! - `no_std` compatible (needs `alloc`)
//! - `embedded-hal` v1.0 support
//! - Bit-exact DCS command declaration parsing
//! - Single and split (dual-link) panels with command-by-left and
//!   synchronized broadcast routing
//! - LED trigger, PWM and DCS backlight control
//! - Bus turnaround, register read and tear-signal ESD checks
//! - Background ESD worker (with `std` feature)
//! - `embedded-graphics` dirty rectangles as partial-update regions (with
//!   `graphics` feature)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core::convert::Infallible;
//! use embedded_hal::delay::DelayNs;
//! use embedded_hal::digital::OutputPin;
//! use embedded_hal::spi::{Operation, SpiDevice};
//! use dsi_panel::property::keys;
//! use dsi_panel::{
//!     resolve, BootParams, Links, NoLed, NoPwm, PanelController, PanelOps, PropertyMap,
//!     SpiLink, VariantId,
//! };
//!
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
//! let props = PropertyMap::new()
//!     .with_str(keys::PANEL_NAME, "truly 480p video mode dsi panel")
//!     .with_u32(keys::WIDTH, 480)
//!     .with_u32(keys::HEIGHT, 854)
//!     .with_u32(keys::BPP, 24)
//!     .with_bytes(keys::PHY_TIMINGS, &[0; 12])
//!     .with_str(keys::BL_CONTROL_TYPE, "bl_ctrl_dcs")
//!     .with_u32_array(keys::RESET_SEQUENCE, &[1, 20, 0, 2, 1, 20])
//!     .with_bytes(keys::ON_COMMAND, &[
//!         0x05, 0x01, 0x00, 0x00, 0x78, 0x00, 0x01, 0x11, // sleep out, 120ms
//!         0x05, 0x01, 0x00, 0x00, 0x14, 0x00, 0x01, 0x29, // display on, 20ms
//!     ]);
//!
//! let boot = BootParams::parse("console=ttyHSL0 androidboot.mode=normal");
//! let panel = match resolve(&VariantId::new("truly 480p video mode dsi panel", 0), &props, &boot) {
//!     Ok(panel) => panel,
//!     Err(_) => return,
//! };
//!
//! let mut link = SpiLink::new(MockSpi, MockPin, MockPin, MockDelay);
//! link.hardware_reset(&panel.config.reset_sequence);
//!
//! let mut controller = PanelController::new(Links::Single(link), panel, NoLed, NoPwm);
//! let _ = controller.power_on(0);
//! let _ = controller.set_brightness(128);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Backlight mechanisms and controller
pub mod backlight;
/// Boot mode from the kernel command line
pub mod boot_mode;
/// DSI packet types, DCS opcodes and the command record
pub mod command;
/// Panel configuration types and builder
pub mod config;
/// Link routing and partial-update addressing
pub mod dispatcher;
/// Error types for the controller
pub mod error;
/// Display failure (ESD) detection
pub mod esd;
/// Hardware link abstraction
pub mod interface;
/// Panel power state machine
pub mod panel;
/// Declarative panel description
pub mod property;
/// Panel description resolver
pub mod resolver;
/// Partial-update regions
pub mod roi;
/// Command sequences and the sequence store
pub mod sequence;

/// Background ESD worker (requires `std` feature)
#[cfg(feature = "std")]
pub mod worker;

#[cfg(test)]
mod mock;

pub use backlight::{
    Backlight, BacklightConfig, BacklightMechanism, HalPwm, LedTrigger, NoLed, NoPwm, PwmOutput,
};
pub use boot_mode::{BootMode, BootParams};
pub use command::{Command, CommandHeader};
pub use config::{Builder, Dimensions, PanelConfig, PanelMode};
pub use dispatcher::{Dispatcher, LinkRole, Links, RoutingPolicy, SyncWait, Target};
pub use error::{ConfigError, Error, ParseError};
pub use esd::{DisplaySwitch, EsdConfig, EsdFailure, EsdMode, EsdMonitor, EsdOutcome};
pub use interface::{
    DEFAULT_TE_POLL_US, DsiLink, InterfaceError, NoTearSignal, ResetStep, SpiLink, TePin,
    TearSignal, TxRequest,
};
pub use panel::{CabcMode, ModeSwitch, OnTone, PanelController, PanelOps, PowerState, Transition};
pub use property::{PropertyMap, PropertySource, PropertyValue};
pub use resolver::{FeatureSet, ResolvedPanel, VariantDescriptor, VariantId, resolve};
pub use roi::{Roi, RoiRequest};
pub use sequence::{CommandSequence, LinkState, SequenceKey, SequenceStore};

#[cfg(feature = "std")]
pub use worker::EsdWorker;
