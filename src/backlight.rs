//! Backlight control
//!
//! A panel's brightness is driven by exactly one mechanism, chosen when the
//! configuration is resolved:
//!
//! - [`BacklightMechanism::LedTrigger`]: an external LED driver takes the
//!   level, fire and forget
//! - [`BacklightMechanism::Pwm`]: a PWM channel whose duty cycle follows
//!   the level
//! - [`BacklightMechanism::Dcs`]: the panel itself, via DCS `0x51`
//!
//! [`Backlight::set_brightness`] never fails. Nonzero levels are clamped
//! into `[min, max]`, zero turns the output off.
//!
//! ## Example
//!
//! ```
//! use dsi_panel::{BacklightConfig, BacklightMechanism};
//!
//! let config = BacklightConfig {
//!     mechanism: BacklightMechanism::Pwm { period_us: 100 },
//!     min: 10,
//!     max: 255,
//! };
//! assert_eq!(config.clamp_level(3), 10);
//! assert_eq!(config.clamp_level(0), 0);
//! assert_eq!(config.clamp_level(400), 255);
//! ```

use core::fmt::Debug;
use embedded_hal::pwm::SetDutyCycle;

use crate::command::{Command, DCS_SET_DISPLAY_BRIGHTNESS};
use crate::dispatcher::{Dispatcher, Target};
use crate::interface::DsiLink;
use crate::sequence::LinkState;

/// How the backlight level reaches the hardware
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BacklightMechanism {
    /// External LED driver trigger
    #[default]
    LedTrigger,
    /// PWM channel with the given period
    Pwm {
        /// PWM period in microseconds
        period_us: u32,
    },
    /// DCS brightness command sent to the panel
    Dcs,
}

/// Backlight configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BacklightConfig {
    /// Mechanism
    pub mechanism: BacklightMechanism,
    /// Lowest nonzero level
    pub min: u32,
    /// Highest level
    pub max: u32,
}

impl Default for BacklightConfig {
    fn default() -> Self {
        Self {
            mechanism: BacklightMechanism::default(),
            min: 1,
            max: 255,
        }
    }
}

impl BacklightConfig {
    /// Clamp a nonzero level into `[min, max]`; zero passes through
    pub fn clamp_level(&self, level: u32) -> u32 {
        if level == 0 {
            0
        } else {
            level.max(self.min).min(self.max.max(self.min))
        }
    }

    /// One-byte brightness parameter for a clamped level
    ///
    /// Levels of a range wider than a byte are scaled into `1..=255`;
    /// only level 0 maps to 0.
    pub fn dcs_value(&self, level: u32) -> u8 {
        if self.max <= u32::from(u8::MAX) {
            return u8::try_from(level).unwrap_or(u8::MAX);
        }
        if level == 0 {
            return 0;
        }
        let scaled = u64::from(level) * u64::from(u8::MAX) / u64::from(self.max.max(level));
        u8::try_from(scaled.max(1)).unwrap_or(u8::MAX)
    }
}

/// External LED driver
pub trait LedTrigger {
    /// Forward `level` to the driver
    fn trigger(&mut self, level: u32);
}

impl<F: FnMut(u32)> LedTrigger for F {
    fn trigger(&mut self, level: u32) {
        self(level);
    }
}

/// PWM channel driving the backlight
pub trait PwmOutput {
    /// Error type for PWM operations
    type Error: Debug;

    /// Set duty and period, both in nanoseconds
    fn configure(&mut self, duty_ns: u64, period_ns: u64) -> Result<(), Self::Error>;

    /// Start the output
    fn enable(&mut self) -> Result<(), Self::Error>;

    /// Stop the output
    fn disable(&mut self) -> Result<(), Self::Error>;
}

/// Placeholder for panels without an LED trigger
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLed;

impl LedTrigger for NoLed {
    fn trigger(&mut self, _level: u32) {}
}

/// Placeholder for panels without a PWM channel
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPwm;

impl PwmOutput for NoPwm {
    type Error = core::convert::Infallible;

    fn configure(&mut self, _duty_ns: u64, _period_ns: u64) -> Result<(), Self::Error> {
        Ok(())
    }

    fn enable(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// [`PwmOutput`] over an embedded-hal [`SetDutyCycle`] channel
///
/// The channel's frequency is fixed by the HAL, so only the duty fraction
/// of the configured period is applied.
pub struct HalPwm<P> {
    pwm: P,
    duty_ns: u64,
    period_ns: u64,
    enabled: bool,
}

impl<P: SetDutyCycle> HalPwm<P> {
    /// Wrap a duty-cycle channel
    pub fn new(pwm: P) -> Self {
        Self {
            pwm,
            duty_ns: 0,
            period_ns: 1,
            enabled: false,
        }
    }

    /// Release the channel
    pub fn release(self) -> P {
        self.pwm
    }

    fn apply(&mut self) -> Result<(), P::Error> {
        let max = u64::from(self.pwm.max_duty_cycle());
        let duty = (self.duty_ns.min(self.period_ns) * max / self.period_ns) as u16;
        self.pwm.set_duty_cycle(duty)
    }
}

impl<P: SetDutyCycle> PwmOutput for HalPwm<P> {
    type Error = P::Error;

    fn configure(&mut self, duty_ns: u64, period_ns: u64) -> Result<(), Self::Error> {
        self.duty_ns = duty_ns;
        self.period_ns = period_ns.max(1);
        if self.enabled { self.apply() } else { Ok(()) }
    }

    fn enable(&mut self) -> Result<(), Self::Error> {
        self.enabled = true;
        self.apply()
    }

    fn disable(&mut self) -> Result<(), Self::Error> {
        self.enabled = false;
        self.pwm.set_duty_cycle_fully_off()
    }
}

/// Backlight controller
pub struct Backlight<T, P> {
    config: BacklightConfig,
    led: T,
    pwm: P,
    pwm_enabled: bool,
    force_off: bool,
    level: u32,
}

impl<T: LedTrigger, P: PwmOutput> Backlight<T, P> {
    /// Create a controller driving `led` or `pwm` as `config` selects
    pub fn new(config: BacklightConfig, led: T, pwm: P) -> Self {
        Self {
            config,
            led,
            pwm,
            pwm_enabled: false,
            force_off: false,
            level: 0,
        }
    }

    /// Keep the backlight dark whatever level is requested
    pub fn set_force_off(&mut self, force_off: bool) {
        self.force_off = force_off;
    }

    /// Configuration in effect
    pub fn config(&self) -> &BacklightConfig {
        &self.config
    }

    /// Last level applied
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Whether the PWM output is running
    pub fn pwm_enabled(&self) -> bool {
        self.pwm_enabled
    }

    /// Borrow the LED trigger
    pub fn led(&self) -> &T {
        &self.led
    }

    /// Borrow the PWM output
    pub fn pwm(&self) -> &P {
        &self.pwm
    }

    /// Apply `level`, returning the level actually applied
    ///
    /// Hardware errors are logged and otherwise ignored.
    pub fn set_brightness<L: DsiLink>(&mut self, level: u32, dispatcher: &mut Dispatcher<L>) -> u32 {
        let level = if self.force_off {
            log::warn!("backlight: forced off, ignoring level {}", level);
            0
        } else {
            self.config.clamp_level(level)
        };

        match self.config.mechanism {
            BacklightMechanism::LedTrigger => self.led.trigger(level),
            BacklightMechanism::Pwm { period_us } => self.set_pwm(level, period_us),
            BacklightMechanism::Dcs => {
                log::debug!("backlight: dcs level={}", level);
                let cmd = Command::dcs_short_write(
                    DCS_SET_DISPLAY_BRIGHTNESS,
                    self.config.dcs_value(level),
                );
                if let Err(e) =
                    dispatcher.send_commands(&[cmd], LinkState::HighSpeed, Target::Both)
                {
                    log::error!("backlight: dcs send failed: {:?}", e);
                }
            }
        }

        self.level = level;
        level
    }

    fn set_pwm(&mut self, level: u32, period_us: u32) {
        let period_ns = u64::from(period_us) * 1000;

        if level == 0 {
            if self.pwm_enabled {
                if let Err(e) = self.pwm.configure(0, period_ns) {
                    log::error!("backlight: pwm configure failed: {:?}", e);
                }
                if let Err(e) = self.pwm.disable() {
                    log::error!("backlight: pwm disable failed: {:?}", e);
                }
            }
            self.pwm_enabled = false;
            return;
        }

        let duty_ns = u64::from(level) * period_ns / u64::from(self.config.max.max(1));
        log::debug!("backlight: level={} duty={}ns period={}ns", level, duty_ns, period_ns);

        if let Err(e) = self.pwm.configure(duty_ns, period_ns) {
            log::error!("backlight: pwm configure failed: {:?}", e);
            return;
        }
        if !self.pwm_enabled {
            if let Err(e) = self.pwm.enable() {
                log::error!("backlight: pwm enable failed: {:?}", e);
            }
            self.pwm_enabled = true;
        }
    }
}
