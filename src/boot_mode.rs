//! Boot mode from the kernel command line
//!
//! Factory, RF and silent boots change what the panel is allowed to do
//! (ESD checks, continuous splash, backlight). The mode comes from the
//! `oppo_ftm_mode=` parameter; the Android boot mode and startup reason are
//! kept alongside for diagnostics.
//!
//! ## Example
//!
//! ```
//! use dsi_panel::{BootMode, BootParams};
//!
//! let params = BootParams::parse("console=ttyHSL0 androidboot.mode=charger oppo_ftm_mode=ftmsilence");
//! assert_eq!(params.mode, BootMode::Silence);
//! assert_eq!(params.android_mode.as_deref(), Some("charger"));
//! ```

use alloc::string::{String, ToString};

const FTM_MODE_KEY: &str = "oppo_ftm_mode=";
const ANDROID_MODE_KEY: &str = "androidboot.mode=";
const STARTUP_MODE_KEY: &str = "androidboot.startupmode=";

/// Manufacturing / special boot mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BootMode {
    /// Regular boot
    #[default]
    Normal,
    /// Factory test
    Factory,
    /// WLAN test
    Wlan,
    /// MOS test
    Mos,
    /// RF test
    Rf,
    /// Recovery
    Recovery,
    /// Silent boot, backlight kept off
    Silence,
}

/// Value prefixes and the mode each selects, matched in order
///
/// Only the given number of leading characters is compared.
const FTM_PREFIXES: [(&str, BootMode); 6] = [
    ("facto", BootMode::Factory),
    ("ftmwi", BootMode::Wlan),
    ("ftmmo", BootMode::Mos),
    ("ftmrf", BootMode::Rf),
    ("ftmre", BootMode::Recovery),
    ("ftmsilence", BootMode::Silence),
];

impl BootMode {
    /// Parse the value of `oppo_ftm_mode=`
    ///
    /// Unrecognized values are a normal boot.
    pub fn from_ftm_value(value: &str) -> Self {
        FTM_PREFIXES
            .iter()
            .find(|(prefix, _)| value.starts_with(prefix))
            .map_or(Self::Normal, |(_, mode)| *mode)
    }

    /// Whether this is a regular boot
    pub fn is_normal(self) -> bool {
        self == Self::Normal
    }
}

/// Boot parameters relevant to the panel
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootParams {
    /// Manufacturing mode
    pub mode: BootMode,
    /// `androidboot.mode` value
    pub android_mode: Option<String>,
    /// `androidboot.startupmode` value (power-on reason)
    pub startup_reason: Option<String>,
}

impl BootParams {
    /// Parse a kernel command line
    pub fn parse(cmdline: &str) -> Self {
        let mode = value_after(cmdline, FTM_MODE_KEY).map_or(BootMode::Normal, BootMode::from_ftm_value);
        let params = Self {
            mode,
            android_mode: token_after(cmdline, ANDROID_MODE_KEY),
            startup_reason: token_after(cmdline, STARTUP_MODE_KEY),
        };
        log::info!(
            "boot: mode={:?} android={:?} startup={:?}",
            params.mode,
            params.android_mode,
            params.startup_reason
        );
        params
    }
}

/// Rest of the command line after the first `key`
fn value_after<'a>(cmdline: &'a str, key: &str) -> Option<&'a str> {
    cmdline.find(key).map(|pos| &cmdline[pos + key.len()..])
}

/// Value after `key`, up to the next space
fn token_after(cmdline: &str, key: &str) -> Option<String> {
    value_after(cmdline, key).map(|rest| rest.split(' ').next().unwrap_or_default().to_string())
}
