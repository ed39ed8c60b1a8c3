//! Panel configuration types and builder
//!
//! [`PanelConfig`] carries everything known about a panel once its
//! description has been resolved: geometry, link timing, routing policy,
//! backlight and ESD settings. It is built with [`Builder`], either directly
//! or by the [`resolver`](crate::resolver).

use alloc::vec::Vec;

use crate::backlight::BacklightConfig;
use crate::dispatcher::{RoutingPolicy, SyncWait};
use crate::error::ConfigError;
use crate::esd::EsdConfig;
use crate::interface::ResetStep;
use crate::property::keys;

/// Number of PHY timing bytes
pub const PHY_TIMING_LEN: usize = 12;
/// Maximum number of reset sequence cells (level/delay pairs)
pub const MAX_RESET_CELLS: usize = 10;
/// Default frame rate in Hz
pub const DEFAULT_FRAME_RATE: u32 = 60;
/// Lowest refresh rate assumed for dynamic FPS when none is given
pub const MIN_REFRESH_RATE: u32 = 30;
/// Default MDP transfer time in microseconds
pub const DEFAULT_MDP_TRANSFER_TIME_US: u32 = 14_000;

/// Panel resolution in pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    /// Horizontal resolution
    pub xres: u16,
    /// Vertical resolution
    pub yres: u16,
}

impl Dimensions {
    /// Create new dimensions with validation
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidProperty` if either side is zero.
    pub fn new(xres: u16, yres: u16) -> Result<Self, ConfigError> {
        if xres == 0 {
            return Err(ConfigError::InvalidProperty {
                key: keys::WIDTH,
                reason: "must be nonzero",
            });
        }
        if yres == 0 {
            return Err(ConfigError::InvalidProperty {
                key: keys::HEIGHT,
                reason: "must be nonzero",
            });
        }
        Ok(Self { xres, yres })
    }
}

/// Blank border around the active area, in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Borders {
    /// Left border
    pub left: u16,
    /// Right border
    pub right: u16,
    /// Top border
    pub top: u16,
    /// Bottom border
    pub bottom: u16,
}

/// Video or command mode panel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PanelMode {
    /// Continuous video stream
    #[default]
    Video,
    /// Frames pushed on demand (supports partial update and TE)
    Command,
}

/// Pixel stream format on the link
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DstFormat {
    /// 3 bpp (command mode)
    Rgb111,
    /// 8 bpp (command mode)
    Rgb332,
    /// 12 bpp (command mode)
    Rgb444,
    /// 16 bpp
    Rgb565,
    /// 18 bpp, packed
    Rgb666,
    /// 18 bpp, loosely packed (video mode)
    Rgb666Loose,
    /// 24 bpp
    #[default]
    Rgb888,
}

impl DstFormat {
    /// Derive the stream format
    ///
    /// Returns `None` for a depth the mode cannot carry.
    pub fn from_bpp(bpp: u8, mode: PanelMode, loose: bool) -> Option<Self> {
        match (mode, bpp) {
            (PanelMode::Command, 3) => Some(Self::Rgb111),
            (PanelMode::Command, 8) => Some(Self::Rgb332),
            (PanelMode::Command, 12) => Some(Self::Rgb444),
            (_, 16) => Some(Self::Rgb565),
            (PanelMode::Video, 18) if loose => Some(Self::Rgb666Loose),
            (_, 18) => Some(Self::Rgb666),
            (_, 24) => Some(Self::Rgb888),
            _ => None,
        }
    }
}

/// Horizontal and vertical timing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Porches {
    /// Horizontal front porch
    pub h_front: u16,
    /// Horizontal back porch
    pub h_back: u16,
    /// Horizontal sync pulse width
    pub h_pulse: u16,
    /// Horizontal sync skew
    pub h_skew: u16,
    /// Vertical back porch
    pub v_back: u16,
    /// Vertical front porch
    pub v_front: u16,
    /// Vertical sync pulse width
    pub v_pulse: u16,
}

impl Default for Porches {
    fn default() -> Self {
        Self {
            h_front: 6,
            h_back: 6,
            h_pulse: 2,
            h_skew: 0,
            v_back: 6,
            v_front: 6,
            v_pulse: 2,
        }
    }
}

/// Video-mode traffic pattern
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrafficMode {
    /// Non-burst with sync pulses
    #[default]
    NonBurstSyncPulse,
    /// Non-burst with sync events
    NonBurstSyncEvent,
    /// Burst mode
    Burst,
}

impl TrafficMode {
    /// Parse the traffic-mode property value
    pub fn from_property(value: &str) -> Self {
        match value {
            "non_burst_sync_event" => Self::NonBurstSyncEvent,
            "burst_mode" => Self::Burst,
            _ => Self::NonBurstSyncPulse,
        }
    }
}

/// Logical-to-physical data lane mapping
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum LaneMap {
    #[default]
    Map0123,
    Map3012,
    Map2301,
    Map1230,
    Map0321,
    Map1032,
    Map2103,
    Map3210,
}

impl LaneMap {
    /// Parse the lane-map property value
    pub fn from_property(value: &str) -> Self {
        match value {
            "lane_map_3012" => Self::Map3012,
            "lane_map_2301" => Self::Map2301,
            "lane_map_1230" => Self::Map1230,
            "lane_map_0321" => Self::Map0321,
            "lane_map_1032" => Self::Map1032,
            "lane_map_2103" => Self::Map2103,
            "lane_map_3210" => Self::Map3210,
            _ => Self::Map0123,
        }
    }
}

/// Component order of transmitted pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ColorOrder {
    #[default]
    Rgb,
    Rbg,
    Bgr,
    Brg,
    Grb,
    Gbr,
}

impl ColorOrder {
    /// Parse the color-order property value
    pub fn from_property(value: &str) -> Self {
        match value {
            "rgb_swap_rbg" => Self::Rbg,
            "rgb_swap_bgr" => Self::Bgr,
            "rgb_swap_brg" => Self::Brg,
            "rgb_swap_grb" => Self::Grb,
            "rgb_swap_gbr" => Self::Gbr,
            _ => Self::Rgb,
        }
    }
}

/// Command transfer trigger
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Trigger {
    /// No trigger
    None,
    /// Tear-effect signal
    Te,
    /// Software
    #[default]
    Sw,
    /// Software, start/end of frame
    SwSeof,
    /// Software and tear-effect
    SwTe,
}

impl Trigger {
    /// Parse a trigger property value
    pub fn from_property(value: &str) -> Self {
        match value {
            "none" => Self::None,
            "trigger_te" => Self::Te,
            "trigger_sw_seof" => Self::SwSeof,
            "trigger_sw_te" => Self::SwTe,
            _ => Self::Sw,
        }
    }
}

/// Tear-check (TE) block parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TearCheck {
    /// Tear check enabled
    pub enabled: bool,
    /// Sync counter height
    pub sync_cfg_height: u32,
    /// Initial vsync counter value
    pub vsync_init_val: u32,
    /// Start threshold
    pub sync_threshold_start: u32,
    /// Continue threshold
    pub sync_threshold_continue: u32,
    /// Start position
    pub start_pos: u32,
    /// Read pointer interrupt line
    pub rd_ptr_irq: u32,
    /// Frame rate times 100
    pub refx100: u32,
}

impl TearCheck {
    /// Defaults for a panel `yres` lines tall
    pub fn for_yres(yres: u16) -> Self {
        let yres = u32::from(yres);
        Self {
            enabled: true,
            sync_cfg_height: 0xfff0,
            vsync_init_val: yres,
            sync_threshold_start: 4,
            sync_threshold_continue: 4,
            start_pos: yres,
            rd_ptr_irq: yres + 1,
            refx100: 6000,
        }
    }
}

/// Partial-update alignment constraints
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoiAlignment {
    /// Left edge alignment
    pub xstart: u16,
    /// Width alignment
    pub width: u16,
    /// Top edge alignment
    pub ystart: u16,
    /// Height alignment
    pub height: u16,
    /// Minimum width
    pub min_width: u16,
    /// Minimum height
    pub min_height: u16,
}

/// How the refresh rate is changed at runtime
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DfpsMode {
    /// Across a suspend/resume cycle
    #[default]
    SuspendResume,
    /// Immediately, by changing the clock
    ImmediateClock,
    /// Immediately, by changing the porches
    ImmediatePorch,
}

/// Dynamic refresh rate support
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DynamicFps {
    /// Update method
    pub mode: DfpsMode,
    /// Lowest rate in Hz
    pub min_fps: u32,
    /// Highest rate in Hz
    pub max_fps: u32,
}

/// Horizontal line idle entry for a range of line widths
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HorizontalIdle {
    /// Smallest width the entry covers
    pub min: u32,
    /// Largest width the entry covers
    pub max: u32,
    /// Idle cycles
    pub idle: u32,
}

/// Frame buffer compression parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fbc {
    /// Target bits per pixel
    pub bpp: u32,
    /// Packing mode
    pub packing: u32,
    /// Bias
    pub bias: u32,
}

/// Panel feature switches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Partial update (command mode only)
    pub partial_update: bool,
    /// Merge the halves of a split partial update
    pub roi_merge: bool,
    /// Only the left link sends commands
    pub cmd_by_left: bool,
    /// Video/command mode switching at runtime
    pub dynamic_switch: bool,
    /// ESD checking
    pub esd_check: bool,
    /// Ultra-low-power state
    pub ulps: bool,
    /// Ultra-low-power state while suspended
    pub ulps_suspend: bool,
    /// The panel does not acknowledge commands
    pub panel_ack_disabled: bool,
    /// Bootloader splash is still on screen at startup
    pub cont_splash: bool,
}

/// Resolved panel configuration
///
/// Use [`Builder`] to create a `PanelConfig`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelConfig {
    /// Resolution
    pub dimensions: Dimensions,
    /// Physical width in millimeters
    pub physical_width_mm: u32,
    /// Physical height in millimeters
    pub physical_height_mm: u32,
    /// Borders
    pub borders: Borders,
    /// Bits per pixel
    pub bpp: u8,
    /// Pixel stream format
    pub dst_format: DstFormat,
    /// Video or command mode
    pub mode: PanelMode,
    /// Timing
    pub porches: Porches,
    /// Video traffic mode
    pub traffic_mode: TrafficMode,
    /// Lane mapping
    pub lane_map: LaneMap,
    /// Enabled data lanes
    pub lanes: [bool; 4],
    /// Color order
    pub color_order: ColorOrder,
    /// Virtual channel
    pub virtual_channel: u8,
    /// MDP trigger
    pub mdp_trigger: Trigger,
    /// DMA trigger
    pub dma_trigger: Trigger,
    /// PHY timings
    pub phy_timings: [u8; PHY_TIMING_LEN],
    /// Frame rate in Hz
    pub frame_rate: u32,
    /// Link clock rate in Hz (0 = derived)
    pub clock_rate: u32,
    /// Time the MDP needs to push one frame, in microseconds
    pub mdp_transfer_time_us: u32,
    /// Tear check block
    pub tear_check: TearCheck,
    /// Partial-update alignment
    pub roi_alignment: Option<RoiAlignment>,
    /// Hardware reset sequence
    pub reset_sequence: Vec<ResetStep>,
    /// Dynamic refresh rate
    pub dynamic_fps: Option<DynamicFps>,
    /// Horizontal line idle table
    pub horizontal_idle: Vec<HorizontalIdle>,
    /// Frame buffer compression
    pub fbc: Option<Fbc>,
    /// Feature switches
    pub features: FeatureFlags,
    /// Synchronized broadcast on split panels
    pub sync_wait: Option<SyncWait>,
    /// Highest brightness exposed to users
    pub brightness_max: u32,
    /// Backlight
    pub backlight: BacklightConfig,
    /// ESD checking
    pub esd: EsdConfig,
}

impl PanelConfig {
    /// Routing policy for the dispatcher
    pub fn routing(&self) -> RoutingPolicy {
        RoutingPolicy {
            cmd_by_left: self.features.cmd_by_left,
            sync_wait: self.sync_wait,
            roi_merge: self.features.partial_update && self.features.roi_merge,
            left_xres: self.dimensions.xres,
        }
    }
}

/// Turn `level, delay` cell pairs into reset steps
///
/// # Errors
///
/// Returns `ConfigError::InvalidProperty` for an empty, odd-length, or
/// overlong list.
pub fn reset_steps(cells: &[u32]) -> Result<Vec<ResetStep>, ConfigError> {
    if cells.is_empty() || cells.len() > MAX_RESET_CELLS || cells.len() % 2 != 0 {
        return Err(ConfigError::InvalidProperty {
            key: keys::RESET_SEQUENCE,
            reason: "expected up to 5 level/delay pairs",
        });
    }
    Ok(cells
        .chunks_exact(2)
        .map(|pair| ResetStep {
            high: pair[0] != 0,
            delay_ms: pair[1],
        })
        .collect())
}

/// Builder for constructing panel configuration
///
/// # Example
///
/// ```
/// use dsi_panel::{Builder, Dimensions, PanelMode};
///
/// let dims = match Dimensions::new(1080, 1920) {
///     Ok(dims) => dims,
///     Err(_) => return,
/// };
/// let config = match Builder::new()
///     .dimensions(dims)
///     .bpp(24)
///     .mode(PanelMode::Command)
///     .phy_timings([0; 12])
///     .build()
/// {
///     Ok(config) => config,
///     Err(_) => return,
/// };
/// assert_eq!(config.tear_check.rd_ptr_irq, 1921);
/// ```
#[must_use]
pub struct Builder {
    /// Resolution (required)
    dimensions: Option<Dimensions>,
    /// Bits per pixel (required)
    bpp: Option<u8>,
    /// PHY timings (required)
    phy_timings: Option<[u8; PHY_TIMING_LEN]>,
    physical_size_mm: (u32, u32),
    borders: Borders,
    loose_packing: bool,
    mode: PanelMode,
    porches: Porches,
    traffic_mode: TrafficMode,
    lane_map: LaneMap,
    lanes: [bool; 4],
    color_order: ColorOrder,
    virtual_channel: u8,
    mdp_trigger: Trigger,
    dma_trigger: Trigger,
    frame_rate: u32,
    clock_rate: u32,
    mdp_transfer_time_us: u32,
    /// Tear check (derived from yres when unset)
    tear_check: Option<TearCheck>,
    roi_alignment: Option<RoiAlignment>,
    reset_sequence: Vec<ResetStep>,
    dynamic_fps: Option<DynamicFps>,
    horizontal_idle: Vec<HorizontalIdle>,
    fbc: Option<Fbc>,
    features: FeatureFlags,
    sync_wait: Option<SyncWait>,
    brightness_max: u32,
    backlight: BacklightConfig,
    esd: EsdConfig,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            dimensions: None,
            bpp: None,
            phy_timings: None,
            physical_size_mm: (0, 0),
            borders: Borders::default(),
            loose_packing: false,
            mode: PanelMode::Video,
            porches: Porches::default(),
            traffic_mode: TrafficMode::default(),
            lane_map: LaneMap::default(),
            lanes: [false; 4],
            color_order: ColorOrder::default(),
            virtual_channel: 0,
            mdp_trigger: Trigger::default(),
            dma_trigger: Trigger::default(),
            frame_rate: DEFAULT_FRAME_RATE,
            clock_rate: 0,
            mdp_transfer_time_us: DEFAULT_MDP_TRANSFER_TIME_US,
            tear_check: None,
            roi_alignment: None,
            reset_sequence: Vec::new(),
            dynamic_fps: None,
            horizontal_idle: Vec::new(),
            fbc: None,
            features: FeatureFlags::default(),
            sync_wait: None,
            brightness_max: 255,
            backlight: BacklightConfig::default(),
            esd: EsdConfig::default(),
        }
    }
}

impl Builder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set resolution (required)
    pub fn dimensions(self, dimensions: Dimensions) -> Self {
        Self {
            dimensions: Some(dimensions),
            ..self
        }
    }

    /// Set bits per pixel (required)
    pub fn bpp(self, bpp: u8) -> Self {
        Self {
            bpp: Some(bpp),
            ..self
        }
    }

    /// Set PHY timings (required)
    pub fn phy_timings(self, phy_timings: [u8; PHY_TIMING_LEN]) -> Self {
        Self {
            phy_timings: Some(phy_timings),
            ..self
        }
    }

    /// Set the physical size in millimeters
    pub fn physical_size_mm(self, width: u32, height: u32) -> Self {
        Self {
            physical_size_mm: (width, height),
            ..self
        }
    }

    /// Set borders
    pub fn borders(self, borders: Borders) -> Self {
        Self { borders, ..self }
    }

    /// Use loose pixel packing
    pub fn loose_packing(self, loose_packing: bool) -> Self {
        Self {
            loose_packing,
            ..self
        }
    }

    /// Set video or command mode
    pub fn mode(self, mode: PanelMode) -> Self {
        Self { mode, ..self }
    }

    /// Set timing
    pub fn porches(self, porches: Porches) -> Self {
        Self { porches, ..self }
    }

    /// Set traffic mode
    pub fn traffic_mode(self, traffic_mode: TrafficMode) -> Self {
        Self {
            traffic_mode,
            ..self
        }
    }

    /// Set lane mapping
    pub fn lane_map(self, lane_map: LaneMap) -> Self {
        Self { lane_map, ..self }
    }

    /// Set enabled data lanes
    pub fn lanes(self, lanes: [bool; 4]) -> Self {
        Self { lanes, ..self }
    }

    /// Set color order
    pub fn color_order(self, color_order: ColorOrder) -> Self {
        Self {
            color_order,
            ..self
        }
    }

    /// Set virtual channel
    pub fn virtual_channel(self, virtual_channel: u8) -> Self {
        Self {
            virtual_channel,
            ..self
        }
    }

    /// Set MDP and DMA triggers
    pub fn triggers(self, mdp_trigger: Trigger, dma_trigger: Trigger) -> Self {
        Self {
            mdp_trigger,
            dma_trigger,
            ..self
        }
    }

    /// Set frame rate in Hz
    pub fn frame_rate(self, frame_rate: u32) -> Self {
        Self { frame_rate, ..self }
    }

    /// Set link clock rate in Hz
    pub fn clock_rate(self, clock_rate: u32) -> Self {
        Self { clock_rate, ..self }
    }

    /// Set MDP transfer time in microseconds
    pub fn mdp_transfer_time_us(self, mdp_transfer_time_us: u32) -> Self {
        Self {
            mdp_transfer_time_us,
            ..self
        }
    }

    /// Set tear check parameters
    pub fn tear_check(self, tear_check: TearCheck) -> Self {
        Self {
            tear_check: Some(tear_check),
            ..self
        }
    }

    /// Set partial-update alignment
    pub fn roi_alignment(self, roi_alignment: RoiAlignment) -> Self {
        Self {
            roi_alignment: Some(roi_alignment),
            ..self
        }
    }

    /// Set hardware reset sequence
    pub fn reset_sequence(self, reset_sequence: Vec<ResetStep>) -> Self {
        Self {
            reset_sequence,
            ..self
        }
    }

    /// Enable dynamic refresh rate
    pub fn dynamic_fps(self, dynamic_fps: DynamicFps) -> Self {
        Self {
            dynamic_fps: Some(dynamic_fps),
            ..self
        }
    }

    /// Set horizontal line idle table
    pub fn horizontal_idle(self, horizontal_idle: Vec<HorizontalIdle>) -> Self {
        Self {
            horizontal_idle,
            ..self
        }
    }

    /// Enable frame buffer compression
    pub fn fbc(self, fbc: Fbc) -> Self {
        Self {
            fbc: Some(fbc),
            ..self
        }
    }

    /// Set feature switches
    pub fn features(self, features: FeatureFlags) -> Self {
        Self { features, ..self }
    }

    /// Enable synchronized broadcast
    pub fn sync_wait(self, sync_wait: SyncWait) -> Self {
        Self {
            sync_wait: Some(sync_wait),
            ..self
        }
    }

    /// Set the highest user brightness
    pub fn brightness_max(self, brightness_max: u32) -> Self {
        Self {
            brightness_max,
            ..self
        }
    }

    /// Set backlight configuration
    pub fn backlight(self, backlight: BacklightConfig) -> Self {
        Self { backlight, ..self }
    }

    /// Set ESD configuration
    pub fn esd(self, esd: EsdConfig) -> Self {
        Self { esd, ..self }
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingProperty` if dimensions, bpp or PHY
    /// timings were not set, and `ConfigError::InvalidProperty` for a reset
    /// sequence longer than the hardware supports.
    pub fn build(self) -> Result<PanelConfig, ConfigError> {
        let dimensions = self
            .dimensions
            .ok_or(ConfigError::MissingProperty(keys::WIDTH))?;
        let bpp = self.bpp.ok_or(ConfigError::MissingProperty(keys::BPP))?;
        let phy_timings = self
            .phy_timings
            .ok_or(ConfigError::MissingProperty(keys::PHY_TIMINGS))?;

        if self.reset_sequence.len() * 2 > MAX_RESET_CELLS {
            return Err(ConfigError::InvalidProperty {
                key: keys::RESET_SEQUENCE,
                reason: "expected up to 5 level/delay pairs",
            });
        }

        let dst_format =
            DstFormat::from_bpp(bpp, self.mode, self.loose_packing).unwrap_or_else(|| {
                log::debug!("config: no stream format for {}bpp, using rgb888", bpp);
                DstFormat::Rgb888
            });

        let mut features = self.features;
        let mut esd = self.esd;
        if self.mode == PanelMode::Video {
            features.partial_update = false;
            features.roi_merge = false;
            features.cmd_by_left = false;
        }
        if !features.esd_check {
            esd.mode = crate::esd::EsdMode::None;
        }

        Ok(PanelConfig {
            dimensions,
            physical_width_mm: self.physical_size_mm.0,
            physical_height_mm: self.physical_size_mm.1,
            borders: self.borders,
            bpp,
            dst_format,
            mode: self.mode,
            porches: self.porches,
            traffic_mode: self.traffic_mode,
            lane_map: self.lane_map,
            lanes: self.lanes,
            color_order: self.color_order,
            virtual_channel: self.virtual_channel,
            mdp_trigger: self.mdp_trigger,
            dma_trigger: self.dma_trigger,
            phy_timings,
            frame_rate: self.frame_rate,
            clock_rate: self.clock_rate,
            mdp_transfer_time_us: self.mdp_transfer_time_us,
            tear_check: self
                .tear_check
                .unwrap_or_else(|| TearCheck::for_yres(dimensions.yres)),
            roi_alignment: self.roi_alignment,
            reset_sequence: self.reset_sequence,
            dynamic_fps: self.dynamic_fps,
            horizontal_idle: self.horizontal_idle,
            fbc: self.fbc,
            features,
            sync_wait: self.sync_wait,
            brightness_max: self.brightness_max,
            backlight: self.backlight,
            esd,
        })
    }
}
