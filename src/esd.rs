//! Display failure (ESD) detection
//!
//! The [`EsdMonitor`] decides when a liveness check is due and judges its
//! result. The check itself is run by
//! [`PanelController::check_esd`](crate::panel::PanelController::check_esd),
//! which owns the links.
//!
//! Check modes:
//!
//! | mode                    | pass when                                          |
//! |-------------------------|----------------------------------------------------|
//! | `BusTurnaroundCheck`    | the panel answers a bus turnaround                 |
//! | `RegisterRead`          | the first status byte equals the expected value    |
//! | `RegisterReadVariant`   | as above, debounced over the alternate patterns    |
//! | `TearSignal`            | a tear pulse arrives within the timeout            |
//!
//! ## Example
//!
//! ```
//! use dsi_panel::{EsdConfig, EsdMode, EsdMonitor};
//!
//! let mut monitor = EsdMonitor::new(EsdConfig {
//!     mode: EsdMode::RegisterRead,
//!     expected: 0x9C,
//!     ..EsdConfig::default()
//! });
//! monitor.start(0);
//! assert!(!monitor.is_due(1_000));
//! assert!(monitor.is_due(3_000));
//! assert!(monitor.evaluate_status(&[0x9C]).is_ok());
//! assert!(monitor.evaluate_status(&[0x08]).is_err());
//! ```

/// Default interval between checks in milliseconds
pub const DEFAULT_INTERVAL_MS: u32 = 2_000;
/// Default delay before the first check after power-on, in milliseconds
pub const DEFAULT_START_DELAY_MS: u32 = 3_000;
/// Default time to wait for a tear pulse, in milliseconds
pub const DEFAULT_TEAR_TIMEOUT_MS: u32 = 100;
/// Default consecutive-mismatch threshold for the variant check
pub const DEFAULT_VARIANT_THRESHOLD: u32 = 2;
/// Status read length used by the variant check
pub const VARIANT_READ_LEN: usize = 8;

/// How liveness is checked
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EsdMode {
    /// No checking
    #[default]
    None,
    /// Bus turnaround must be acknowledged
    BusTurnaroundCheck,
    /// Status register must read the expected value
    RegisterRead,
    /// Status register checked against alternate good patterns with a
    /// consecutive-failure counter
    RegisterReadVariant,
    /// Tear-signal heartbeat
    TearSignal,
}

impl EsdMode {
    /// Parse the status-check mode property value
    ///
    /// Unknown values give `None`.
    pub fn from_property(value: &str) -> Option<Self> {
        match value {
            "bta_check" => Some(Self::BusTurnaroundCheck),
            "reg_read" => Some(Self::RegisterRead),
            "reg_read_nt35596" => Some(Self::RegisterReadVariant),
            "te_signal_check" => Some(Self::TearSignal),
            _ => None,
        }
    }

    /// Whether this mode reads the status register
    pub fn reads_status(self) -> bool {
        matches!(self, Self::RegisterRead | Self::RegisterReadVariant)
    }
}

/// Byte patterns of the variant check
///
/// Byte 3 is a gate: when it differs from `gate` the read is trusted as
/// healthy. When it matches, byte 4 or byte 5 must hold its alternate value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariantPattern {
    /// Expected byte 3
    pub gate: u8,
    /// Good value of byte 4
    pub alt4: u8,
    /// Good value of byte 5
    pub alt5: u8,
}

impl Default for VariantPattern {
    fn default() -> Self {
        Self {
            gate: 0x02,
            alt4: 0x40,
            alt5: 0x80,
        }
    }
}

/// Extra register read after the primary status check passes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecondaryCheck {
    /// Register to read
    pub register: u8,
    /// Parameter sent with the read
    pub param: u8,
    /// Value the register must hold
    pub expected: u8,
}

/// ESD check configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EsdConfig {
    /// Check mode
    pub mode: EsdMode,
    /// Expected first status byte
    pub expected: u8,
    /// Number of status bytes to read (0 sends the read and skips the compare)
    pub read_len: usize,
    /// Interval between checks in milliseconds
    pub interval_ms: u32,
    /// Consecutive mismatches before the variant check fails
    pub threshold: u32,
    /// Tear pulse timeout in milliseconds
    pub tear_timeout_ms: u32,
    /// Delay before the first check after power-on, in milliseconds
    pub start_delay_ms: u32,
    /// Variant check patterns
    pub variant: VariantPattern,
    /// Optional second register check
    pub secondary: Option<SecondaryCheck>,
}

impl Default for EsdConfig {
    fn default() -> Self {
        Self {
            mode: EsdMode::None,
            expected: 0,
            read_len: 1,
            interval_ms: DEFAULT_INTERVAL_MS,
            threshold: DEFAULT_VARIANT_THRESHOLD,
            tear_timeout_ms: DEFAULT_TEAR_TIMEOUT_MS,
            start_delay_ms: DEFAULT_START_DELAY_MS,
            variant: VariantPattern::default(),
            secondary: None,
        }
    }
}

/// Why a panel was judged non-responsive
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EsdFailure {
    /// The panel did not answer a bus turnaround
    NoResponse,
    /// The status read itself failed on the link
    ReadFailed,
    /// First status byte differs from the expected value
    StatusMismatch {
        /// Expected value
        expected: u8,
        /// Value read
        actual: u8,
    },
    /// The secondary register holds an unexpected value
    SecondaryMismatch {
        /// Register read
        register: u8,
        /// Value read
        actual: u8,
    },
    /// The variant patterns failed too many times in a row
    PatternMismatch {
        /// Consecutive mismatches seen
        count: u32,
    },
    /// No tear pulse within the timeout
    TearTimeout,
}

impl core::fmt::Display for EsdFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoResponse => write!(f, "no response to bus turnaround"),
            Self::ReadFailed => write!(f, "status read failed"),
            Self::StatusMismatch { expected, actual } => {
                write!(f, "status {actual:#04x}, expected {expected:#04x}")
            }
            Self::SecondaryMismatch { register, actual } => {
                write!(f, "reg{register:02x}={actual:#04x}")
            }
            Self::PatternMismatch { count } => {
                write!(f, "status pattern mismatch {count} times in a row")
            }
            Self::TearTimeout => write!(f, "no tear signal"),
        }
    }
}

/// Result of one scheduled check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EsdOutcome {
    /// Not due, monitor stopped, or nothing to check
    Skipped,
    /// The panel responded
    Healthy,
    /// The panel did not respond
    Failed(EsdFailure),
}

/// Scheduling and judgement of ESD checks
#[derive(Clone, Debug)]
pub struct EsdMonitor {
    config: EsdConfig,
    active: bool,
    next_due_ms: u64,
    error_count: u32,
}

impl EsdMonitor {
    /// Create a stopped monitor
    pub fn new(config: EsdConfig) -> Self {
        Self {
            config,
            active: false,
            next_due_ms: 0,
            error_count: 0,
        }
    }

    /// Configuration in effect
    pub fn config(&self) -> &EsdConfig {
        &self.config
    }

    /// Whether checks are enabled at all
    pub fn is_enabled(&self) -> bool {
        self.config.mode != EsdMode::None
    }

    /// Arm the monitor; the first check is due after the start delay
    pub fn start(&mut self, now_ms: u64) {
        if !self.is_enabled() {
            return;
        }
        self.active = true;
        self.error_count = 0;
        self.next_due_ms = now_ms + u64::from(self.config.start_delay_ms);
        log::debug!("esd: {:?} armed, first check at {}ms", self.config.mode, self.next_due_ms);
    }

    /// Disarm the monitor
    pub fn stop(&mut self) {
        self.active = false;
        self.error_count = 0;
    }

    /// Whether the monitor is armed
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether a check should run at `now_ms`
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.active && now_ms >= self.next_due_ms
    }

    /// Time the next check is due
    pub fn next_due(&self) -> Option<u64> {
        self.active.then_some(self.next_due_ms)
    }

    /// Schedule the next check one interval after `now_ms`
    pub fn reschedule(&mut self, now_ms: u64) {
        self.next_due_ms = now_ms + u64::from(self.config.interval_ms);
    }

    /// Consecutive variant mismatches so far
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Judge a status read-back
    ///
    /// # Errors
    ///
    /// Returns the failure when the panel is judged non-responsive.
    pub fn evaluate_status(&mut self, response: &[u8]) -> Result<(), EsdFailure> {
        if self.config.read_len == 0 {
            return Ok(());
        }

        let byte = |i: usize| response.get(i).copied().unwrap_or(0);
        let expected = self.config.expected;
        let actual = byte(0);

        if actual != expected {
            self.error_count = 0;
            log::error!("esd: status {:#04x}, expected {:#04x}", actual, expected);
            return Err(EsdFailure::StatusMismatch { expected, actual });
        }

        if self.config.mode != EsdMode::RegisterReadVariant {
            return Ok(());
        }

        let pattern = self.config.variant;
        if byte(3) != pattern.gate {
            self.error_count = 0;
            return Ok(());
        }
        if byte(4) == pattern.alt4 || byte(5) == pattern.alt5 {
            self.error_count = 0;
            return Ok(());
        }

        self.error_count += 1;
        log::warn!("esd: status pattern mismatch ({})", self.error_count);
        if self.error_count >= self.config.threshold {
            let count = self.error_count;
            self.error_count = 0;
            log::error!("esd: status pattern bad {} times in a row", count);
            return Err(EsdFailure::PatternMismatch { count });
        }
        Ok(())
    }

    /// Judge the secondary register value
    pub fn evaluate_secondary(&self, value: u8) -> Result<(), EsdFailure> {
        match self.config.secondary {
            Some(check) if value != check.expected => {
                log::error!("esd: reg{:02x}={:#04x}", check.register, value);
                Err(EsdFailure::SecondaryMismatch {
                    register: check.register,
                    actual: value,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Observable failure switch
///
/// Toggled once per tear-signal timeout so consumers watching it see a
/// change for every failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplaySwitch {
    state: bool,
    toggles: u32,
}

impl DisplaySwitch {
    /// Flip the switch
    pub fn toggle(&mut self) {
        self.state = !self.state;
        self.toggles = self.toggles.wrapping_add(1);
    }

    /// Current state
    pub fn state(&self) -> bool {
        self.state
    }

    /// Number of flips so far
    pub fn toggles(&self) -> u32 {
        self.toggles
    }
}
