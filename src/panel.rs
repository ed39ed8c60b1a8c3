//! Panel power state machine
//!
//! [`PanelController`] owns the links (through a [`Dispatcher`]), the parsed
//! command sequences, the backlight and the ESD monitor of one panel, and
//! implements [`PanelOps`] on top of them. Exclusive access (`&mut self`)
//! serializes every operation, so an ESD check never interleaves with a
//! power transition or a backlight change.
//!
//! ## Example
//!
//! ```
//! # use dsi_panel::{Command, DsiLink, TxRequest};
//! # struct Link;
//! # impl DsiLink for Link {
//! #     type Error = core::convert::Infallible;
//! #     fn transmit(&mut self, _: &[Command], _: TxRequest) -> Result<(), Self::Error> { Ok(()) }
//! #     fn read(&mut self, _: &Command, _: TxRequest, _: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! #     fn bus_turnaround(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! use dsi_panel::property::keys;
//! use dsi_panel::{
//!     resolve, BootParams, Links, NoLed, NoPwm, PanelController, PanelOps, PowerState,
//!     PropertyMap, VariantId,
//! };
//!
//! let props = PropertyMap::new()
//!     .with_u32(keys::WIDTH, 720)
//!     .with_u32(keys::HEIGHT, 1280)
//!     .with_u32(keys::BPP, 24)
//!     .with_bytes(keys::PHY_TIMINGS, &[0; 12])
//!     .with_bytes(keys::ON_COMMAND, &[0x05, 0x01, 0x00, 0x00, 0x78, 0x00, 0x01, 0x11]);
//! let panel = match resolve(&VariantId::new("panel", 0), &props, &BootParams::default()) {
//!     Ok(panel) => panel,
//!     Err(_) => return,
//! };
//!
//! let mut controller = PanelController::new(Links::Single(Link), panel, NoLed, NoPwm);
//! let transition = controller.power_on(0);
//! assert_eq!(transition.state, PowerState::Unblanked);
//! assert!(transition.delivered);
//! ```

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write as _;

use crate::backlight::{Backlight, LedTrigger, PwmOutput};
use crate::command::{
    Command, CommandHeader, DCS_GET_ERROR_COUNT, DCS_GET_POWER_MODE, DCS_WRITE_CABC,
    DCS_WRITE_CTRL_DISPLAY, DTYPE_DCS_WRITE1,
};
use crate::config::PanelConfig;
use crate::dispatcher::{Dispatcher, Links, Target};
use crate::error::Error;
use crate::esd::{DisplaySwitch, EsdFailure, EsdMode, EsdMonitor, EsdOutcome, VARIANT_READ_LEN};
use crate::interface::{DsiLink, TearSignal};
use crate::resolver::{FeatureSet, ResolvedPanel};
use crate::roi::RoiRequest;
use crate::sequence::{LinkState, SequenceKey, SequenceStore};

/// Highest ACL level
pub const MAX_ACL_LEVEL: u8 = 3;
/// Display control values for HBM levels 0 to 2
pub const HBM_CONTROL: [u8; 3] = [0x20, 0x60, 0xE0];
/// Parameter sent with diagnostic register reads
const DIAG_READ_PARAM: u8 = 0x08;

/// Power state of the panel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PowerState {
    /// Powered down
    #[default]
    Off,
    /// On sequence in progress
    TransitioningOn,
    /// Displaying
    Unblanked,
    /// Displaying in the host's low-power mode
    LowPower,
    /// Off sequence in progress
    TransitioningOff,
}

impl PowerState {
    /// Whether the panel is displaying
    pub fn is_on(self) -> bool {
        matches!(self, Self::Unblanked | Self::LowPower)
    }
}

/// Result of a power transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// State after the transition
    pub state: PowerState,
    /// Whether every command was accepted by the links
    pub delivered: bool,
}

/// Dynamic mode switch direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeSwitch {
    /// Video to command mode
    ToCommand,
    /// Command to video mode
    ToVideo,
}

/// Content adaptive backlight control mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CabcMode {
    /// CABC off
    Close,
    /// User-interface content
    Low,
    /// Still images
    Middle,
    /// Moving pictures (the panel's power-on default)
    #[default]
    High,
}

impl CabcMode {
    /// Mode for a numeric level 0 to 3
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::Close),
            1 => Some(Self::Low),
            2 => Some(Self::Middle),
            3 => Some(Self::High),
            _ => None,
        }
    }

    fn sequence(self) -> SequenceKey {
        match self {
            Self::Close => SequenceKey::CabcOff,
            Self::Low => SequenceKey::CabcUi,
            Self::Middle => SequenceKey::CabcStill,
            Self::High => SequenceKey::CabcVideo,
        }
    }
}

/// Color tone of the alternate on sequences
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnTone {
    /// Balanced
    Balance,
    /// Warm
    Yellow,
    /// Neutral
    Normal,
}

/// Operations a host performs on a panel
pub trait PanelOps {
    /// Error type of the fallible operations
    type Error;

    /// Power the panel on
    ///
    /// Transport errors are logged and the transition still completes;
    /// [`Transition::delivered`] reports them.
    fn power_on(&mut self, now_ms: u64) -> Transition;

    /// Power the panel off
    fn power_off(&mut self) -> Transition;

    /// Enter or leave low-power mode; no commands are sent
    fn set_low_power(&mut self, enable: bool) -> Result<PowerState, Self::Error>;

    /// Set the backlight level, returning the level applied
    fn set_brightness(&mut self, level: u32) -> u32;

    /// Switch between video and command mode
    fn switch_mode(&mut self, mode: ModeSwitch) -> Result<(), Self::Error>;

    /// Address a partial update, returning whether addressing was sent
    fn handle_partial_update(&mut self, request: RoiRequest) -> Result<bool, Self::Error>;
}

/// Controller for one panel
pub struct PanelController<L, T, P> {
    dispatcher: Dispatcher<L>,
    sequences: SequenceStore,
    config: PanelConfig,
    features: FeatureSet,
    backlight: Backlight<T, P>,
    esd: EsdMonitor,
    display_switch: DisplaySwitch,
    state: PowerState,
    acl_level: u8,
    cabc: CabcMode,
}

impl<L, T, P> PanelController<L, T, P>
where
    L: DsiLink,
    T: LedTrigger,
    P: PwmOutput,
{
    /// Create a controller for a resolved panel
    ///
    /// The panel starts [`PowerState::Off`].
    pub fn new(links: Links<L>, panel: ResolvedPanel, led: T, pwm: P) -> Self {
        let forced_off = panel.backlight_forced_off();
        let features = panel.features();
        let ResolvedPanel {
            config, sequences, ..
        } = panel;

        let mut backlight = Backlight::new(config.backlight, led, pwm);
        backlight.set_force_off(forced_off);

        Self {
            dispatcher: Dispatcher::new(links, config.routing()),
            esd: EsdMonitor::new(config.esd),
            sequences,
            config,
            features,
            backlight,
            display_switch: DisplaySwitch::default(),
            state: PowerState::Off,
            acl_level: 0,
            cabc: CabcMode::default(),
        }
    }

    /// Current power state
    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Panel configuration
    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Optional features of this panel
    pub fn features(&self) -> FeatureSet {
        self.features
    }

    /// ESD monitor
    pub fn esd(&self) -> &EsdMonitor {
        &self.esd
    }

    /// Failure switch toggled by tear-signal timeouts
    pub fn display_switch(&self) -> DisplaySwitch {
        self.display_switch
    }

    /// Flip the failure switch by hand
    pub fn toggle_display_switch(&mut self) {
        self.display_switch.toggle();
    }

    /// Backlight controller
    pub fn backlight(&self) -> &Backlight<T, P> {
        &self.backlight
    }

    /// Dispatcher over the panel's links
    pub fn dispatcher(&self) -> &Dispatcher<L> {
        &self.dispatcher
    }

    /// Stored ACL level
    pub fn acl_level(&self) -> u8 {
        self.acl_level
    }

    /// Stored CABC mode
    pub fn cabc_mode(&self) -> CabcMode {
        self.cabc
    }

    /// Release the links
    pub fn release(self) -> Links<L> {
        self.dispatcher.release()
    }

    /// Send a stored sequence to every routed link
    fn send_sequence(&mut self, key: SequenceKey) -> Result<(), Error<L::Error>> {
        match self.sequences.get(key) {
            Some(sequence) => self.dispatcher.send(sequence, Target::Both),
            None => Err(Error::ConfigurationMissing(sequence_name(key))),
        }
    }

    /// Send a single DCS short write carrying a one millisecond settle time
    fn send_write(&mut self, opcode: u8, param: u8) -> Result<(), Error<L::Error>> {
        let command = Command::new(
            CommandHeader {
                dtype: DTYPE_DCS_WRITE1,
                last: 1,
                wait_ms: 1,
                ..CommandHeader::default()
            },
            alloc::vec![opcode, param],
        );
        self.dispatcher
            .send_commands(&[command], LinkState::HighSpeed, Target::Both)
    }

    /// Set the ACL level (0 to 3)
    ///
    /// The level is remembered and re-applied on power-on even when the
    /// panel is off, in which case `PanelOff` is returned.
    pub fn set_acl(&mut self, level: u8) -> Result<(), Error<L::Error>> {
        if !self.features.acl_hbm {
            return Err(Error::ConfigurationMissing("acl"));
        }
        if level > MAX_ACL_LEVEL {
            log::error!("panel: invalid acl level {}", level);
            return Err(Error::InvalidLevel {
                level,
                max: MAX_ACL_LEVEL,
            });
        }
        self.acl_level = level;
        if !self.state.is_on() {
            log::info!("panel: off, acl {} deferred", level);
            return Err(Error::PanelOff);
        }
        log::debug!("panel: acl level={}", level);
        self.send_write(DCS_WRITE_CABC, level)
    }

    /// Set high brightness mode (0 to 2)
    pub fn set_hbm(&mut self, level: u8) -> Result<(), Error<L::Error>> {
        if !self.features.acl_hbm {
            return Err(Error::ConfigurationMissing("hbm"));
        }
        let Some(&control) = HBM_CONTROL.get(usize::from(level)) else {
            log::error!("panel: invalid hbm level {}", level);
            return Err(Error::InvalidLevel {
                level,
                max: (HBM_CONTROL.len() - 1) as u8,
            });
        };
        if !self.state.is_on() {
            log::info!("panel: off, hbm request dropped");
            return Err(Error::PanelOff);
        }
        log::debug!("panel: hbm level={} ctrl={:#04x}", level, control);
        self.send_write(DCS_WRITE_CTRL_DISPLAY, control)
    }

    /// Set the CABC mode
    ///
    /// While the panel is off the mode is only stored; it is applied on the
    /// next power-on.
    pub fn set_cabc(&mut self, mode: CabcMode) -> Result<(), Error<L::Error>> {
        if !self.features.cabc {
            return Err(Error::ConfigurationMissing("cabc"));
        }
        self.cabc = mode;
        if !self.state.is_on() {
            log::info!("panel: off, cabc {:?} deferred", mode);
            return Ok(());
        }
        log::debug!("panel: cabc {:?}", mode);
        self.send_sequence(mode.sequence())
    }

    /// Use the on sequence of the given tone from the next power-on
    pub fn select_on_tone(&mut self, tone: OnTone) -> Result<(), Error<L::Error>> {
        let key = match tone {
            OnTone::Balance => SequenceKey::OnCabcBalance,
            OnTone::Yellow => SequenceKey::OnCabcYellow,
            OnTone::Normal => SequenceKey::OnCabcNormal,
        };
        let sequence = self
            .sequences
            .get(key)
            .cloned()
            .ok_or(Error::ConfigurationMissing(sequence_name(key)))?;
        self.sequences.insert(SequenceKey::On, sequence);
        Ok(())
    }

    /// Read the power mode and error count registers
    ///
    /// Returns `reg0a=0x.., reg05=0x..` text for diagnostics.
    pub fn read_registers(&mut self) -> Result<String, Error<L::Error>> {
        let power_mode = self.read_byte(DCS_GET_POWER_MODE)?;
        let error_count = self.read_byte(DCS_GET_ERROR_COUNT)?;
        let mut text = String::new();
        // Writing to a String cannot fail
        let _ = write!(text, "reg0a={:#x}, reg05={:#x}", power_mode, error_count);
        Ok(text)
    }

    fn read_byte(&mut self, register: u8) -> Result<u8, Error<L::Error>> {
        let mut buf = [0u8; 1];
        self.dispatcher
            .read(&Command::dcs_read(register, DIAG_READ_PARAM), &mut buf)?;
        Ok(buf[0])
    }

    /// Run the configured check now, whatever the schedule
    ///
    /// A tear-signal timeout toggles the display switch and is reported as
    /// [`Error::Timeout`]; other failures as [`Error::EsdFailure`].
    pub fn run_esd_check<S: TearSignal>(&mut self, tear: &mut S) -> Result<(), Error<L::Error>> {
        let mode = self.esd.config().mode;
        let result = match mode {
            EsdMode::None => return Err(Error::ConfigurationMissing("esd check")),
            EsdMode::BusTurnaroundCheck => self
                .dispatcher
                .bus_turnaround()
                .map_err(|_| EsdFailure::NoResponse),
            EsdMode::RegisterRead | EsdMode::RegisterReadVariant => self.check_status()?,
            EsdMode::TearSignal => self.check_tear(tear),
        };
        result.map_err(|failure| {
            log::error!("esd: {:?} check failed: {}", mode, failure);
            match failure {
                EsdFailure::TearTimeout => Error::Timeout,
                other => Error::EsdFailure(other),
            }
        })
    }

    /// Run a check if one is due at `now_ms`
    ///
    /// The next check is scheduled one interval later whatever the outcome.
    pub fn check_esd<S: TearSignal>(&mut self, now_ms: u64, tear: &mut S) -> EsdOutcome {
        if !self.esd.is_due(now_ms) {
            return EsdOutcome::Skipped;
        }
        let outcome = match self.run_esd_check(tear) {
            Ok(()) => EsdOutcome::Healthy,
            Err(Error::Timeout) => EsdOutcome::Failed(EsdFailure::TearTimeout),
            Err(Error::EsdFailure(failure)) => EsdOutcome::Failed(failure),
            Err(e) => {
                log::warn!("esd: check skipped: {:?}", e);
                EsdOutcome::Skipped
            }
        };
        self.esd.reschedule(now_ms);
        outcome
    }

    /// Status register read; the outer error is a missing configuration
    ///
    /// Writes in the status sequence (page select, maximum return size) go
    /// out first, in declared order, to the link the read uses.
    fn check_status(&mut self) -> Result<Result<(), EsdFailure>, Error<L::Error>> {
        let sequence = self
            .sequences
            .get(SequenceKey::Status)
            .ok_or(Error::ConfigurationMissing("status command"))?;
        let read = sequence
            .commands()
            .iter()
            .find(|c| c.is_read())
            .cloned()
            .ok_or(Error::ConfigurationMissing("status command"))?;
        let writes: Vec<Command> = sequence
            .commands()
            .iter()
            .filter(|c| !c.is_read())
            .cloned()
            .collect();
        let link_state = sequence.link_state();

        if !writes.is_empty() {
            if let Err(e) = self
                .dispatcher
                .send_commands(&writes, link_state, Target::Left)
            {
                log::error!("esd: status setup failed: {:?}", e);
                return Ok(Err(EsdFailure::ReadFailed));
            }
        }

        let mut buf = [0u8; VARIANT_READ_LEN];
        let len = self.esd.config().read_len.min(buf.len());
        let n = match self.dispatcher.read(&read, &mut buf[..len]) {
            Ok(n) => n,
            Err(e) => {
                log::error!("esd: status read failed: {:?}", e);
                return Ok(Err(EsdFailure::ReadFailed));
            }
        };
        if let Err(failure) = self.esd.evaluate_status(&buf[..n]) {
            return Ok(Err(failure));
        }

        let Some(secondary) = self.esd.config().secondary else {
            return Ok(Ok(()));
        };
        let mut value = [0u8; 1];
        if let Err(e) = self
            .dispatcher
            .read(&Command::dcs_read(secondary.register, secondary.param), &mut value)
        {
            log::error!("esd: reg{:02x} read failed: {:?}", secondary.register, e);
            return Ok(Err(EsdFailure::ReadFailed));
        }
        Ok(self.esd.evaluate_secondary(value[0]))
    }

    fn check_tear<S: TearSignal>(&mut self, tear: &mut S) -> Result<(), EsdFailure> {
        let timeout = self.esd.config().tear_timeout_ms;
        match tear.wait_for_pulse(timeout) {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.display_switch.toggle();
                Err(EsdFailure::TearTimeout)
            }
            Err(e) => {
                log::error!("esd: tear signal error: {:?}", e);
                self.display_switch.toggle();
                Err(EsdFailure::TearTimeout)
            }
        }
    }

    /// Re-apply CABC and ACL after the on sequence
    fn restore_modes(&mut self) -> bool {
        let mut delivered = true;
        if self.features.cabc && self.cabc != CabcMode::High {
            log::debug!("panel: restoring cabc {:?}", self.cabc);
            if let Err(e) = self.send_sequence(self.cabc.sequence()) {
                log::error!("panel: cabc restore failed: {:?}", e);
                delivered = false;
            }
        }
        if self.features.acl_hbm && self.acl_level != 0 {
            log::debug!("panel: restoring acl {}", self.acl_level);
            if let Err(e) = self.send_write(DCS_WRITE_CABC, self.acl_level) {
                log::error!("panel: acl restore failed: {:?}", e);
                delivered = false;
            }
        }
        delivered
    }
}

fn sequence_name(key: SequenceKey) -> &'static str {
    match key {
        SequenceKey::On => "on sequence",
        SequenceKey::Off => "off sequence",
        SequenceKey::VideoToCommand => "video to command sequence",
        SequenceKey::CommandToVideo => "command to video sequence",
        SequenceKey::Status => "status command",
        SequenceKey::CabcOff => "cabc off sequence",
        SequenceKey::CabcUi => "cabc ui sequence",
        SequenceKey::CabcStill => "cabc still sequence",
        SequenceKey::CabcVideo => "cabc video sequence",
        SequenceKey::OnCabcBalance => "balance on sequence",
        SequenceKey::OnCabcYellow => "yellow on sequence",
        SequenceKey::OnCabcNormal => "normal on sequence",
    }
}

impl<L, T, P> PanelOps for PanelController<L, T, P>
where
    L: DsiLink,
    T: LedTrigger,
    P: PwmOutput,
{
    type Error = Error<L::Error>;

    /// Power on from [`PowerState::Off`]; a panel already on is left alone
    fn power_on(&mut self, now_ms: u64) -> Transition {
        if self.state != PowerState::Off {
            log::debug!("panel: already {:?}", self.state);
            return Transition {
                state: self.state,
                delivered: true,
            };
        }

        log::info!("panel: power on");
        self.state = PowerState::TransitioningOn;
        let mut delivered = match self.send_sequence(SequenceKey::On) {
            Ok(()) | Err(Error::ConfigurationMissing(_)) => true,
            Err(e) => {
                log::error!("panel: on sequence failed: {:?}", e);
                false
            }
        };
        delivered &= self.restore_modes();

        self.esd.start(now_ms);
        self.state = PowerState::Unblanked;
        Transition {
            state: self.state,
            delivered,
        }
    }

    fn power_off(&mut self) -> Transition {
        if self.state == PowerState::Off {
            return Transition {
                state: self.state,
                delivered: true,
            };
        }

        log::info!("panel: power off");
        self.state = PowerState::TransitioningOff;
        let delivered = match self.send_sequence(SequenceKey::Off) {
            Ok(()) | Err(Error::ConfigurationMissing(_)) => true,
            Err(e) => {
                log::error!("panel: off sequence failed: {:?}", e);
                false
            }
        };

        self.esd.stop();
        self.dispatcher.reset_roi();
        self.state = PowerState::Off;
        Transition {
            state: self.state,
            delivered,
        }
    }

    fn set_low_power(&mut self, enable: bool) -> Result<PowerState, Self::Error> {
        if !self.state.is_on() {
            return Err(Error::PanelOff);
        }
        self.state = if enable {
            PowerState::LowPower
        } else {
            PowerState::Unblanked
        };
        log::debug!("panel: {:?}", self.state);
        Ok(self.state)
    }

    fn set_brightness(&mut self, level: u32) -> u32 {
        self.backlight.set_brightness(level, &mut self.dispatcher)
    }

    fn switch_mode(&mut self, mode: ModeSwitch) -> Result<(), Self::Error> {
        if !self.config.features.dynamic_switch {
            return Err(Error::ConfigurationMissing("dynamic mode switch"));
        }
        let key = match mode {
            ModeSwitch::ToCommand => SequenceKey::VideoToCommand,
            ModeSwitch::ToVideo => SequenceKey::CommandToVideo,
        };
        log::info!("panel: switching {:?}", mode);
        self.send_sequence(key)
    }

    fn handle_partial_update(&mut self, request: RoiRequest) -> Result<bool, Self::Error> {
        if !self.config.features.partial_update {
            return Err(Error::ConfigurationMissing("partial update"));
        }
        if !self.state.is_on() {
            return Err(Error::PanelOff);
        }
        self.dispatcher.update_roi(request)
    }
}
