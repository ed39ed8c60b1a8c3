//! Panel description resolver
//!
//! [`resolve`] reads a [`PropertySource`] once and produces everything the
//! rest of the crate consumes: the [`PanelConfig`], the parsed command
//! sequences, and a data-only [`VariantDescriptor`] holding the board and
//! panel specific behavior. Nothing downstream looks at board numbers or
//! panel names again.
//!
//! ## Example
//!
//! ```
//! use dsi_panel::{resolve, BootParams, PropertyMap, SequenceKey, VariantId};
//! use dsi_panel::property::keys;
//!
//! let props = PropertyMap::new()
//!     .with_u32(keys::WIDTH, 720)
//!     .with_u32(keys::HEIGHT, 1280)
//!     .with_u32(keys::BPP, 24)
//!     .with_bytes(keys::PHY_TIMINGS, &[0; 12])
//!     .with_bytes(keys::ON_COMMAND, &[0x05, 0x01, 0x00, 0x00, 0x78, 0x00, 0x01, 0x11]);
//!
//! let variant = VariantId::new("generic 720p video mode dsi panel", 0);
//! let panel = match resolve(&variant, &props, &BootParams::default()) {
//!     Ok(panel) => panel,
//!     Err(_) => return,
//! };
//! assert!(panel.sequences.contains(SequenceKey::On));
//! assert!(!panel.features().acl_hbm);
//! ```

use alloc::vec::Vec;

use crate::backlight::{BacklightConfig, BacklightMechanism};
use crate::boot_mode::{BootMode, BootParams};
use crate::config::{
    Borders, Builder, ColorOrder, DfpsMode, Dimensions, DynamicFps, Fbc, FeatureFlags,
    HorizontalIdle, LaneMap, MIN_REFRESH_RATE, PHY_TIMING_LEN, PanelConfig, PanelMode, Porches,
    RoiAlignment, TearCheck, TrafficMode, Trigger, reset_steps,
};
use crate::dispatcher::{LinkRole, SyncWait};
use crate::error::ConfigError;
use crate::esd::{EsdConfig, EsdMode, SecondaryCheck, VARIANT_READ_LEN};
use crate::property::{PropertySource, keys};
use crate::sequence::{LinkState, SequenceKey, SequenceStore};

/// Identifies a panel on a particular board
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariantId<'a> {
    /// Panel name from the description
    pub panel_name: &'a str,
    /// Board (project) number
    pub board: u32,
}

impl<'a> VariantId<'a> {
    /// Create a variant id
    pub fn new(panel_name: &'a str, board: u32) -> Self {
        Self { panel_name, board }
    }
}

/// Optional panel features a variant supports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureSet {
    /// Adaptive current limiting and high brightness mode
    pub acl_hbm: bool,
    /// Content adaptive backlight control
    pub cabc: bool,
}

/// Board and panel specific behavior
///
/// Produced by [`VariantDescriptor::for_variant`]; unknown variants get
/// [`VariantDescriptor::default`], which enables no optional behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VariantDescriptor {
    /// Optional features
    pub features: FeatureSet,
    /// ESD checked through a dedicated tear-signal line
    pub te_esd: bool,
    /// Status read length for register-read checks
    pub status_read_len: Option<usize>,
    /// Extra register read after the primary status check
    pub secondary_check: Option<SecondaryCheck>,
    /// Alternate on sequences selected by CABC tone
    pub cabc_on_variants: bool,
    /// Backlight is driven by an external LED driver
    pub external_backlight: bool,
}

struct BoardRule {
    board: u32,
    acl_hbm: bool,
    cabc: bool,
    te_esd: bool,
    secondary_check: Option<SecondaryCheck>,
}

struct PanelRule {
    panel_name: &'static str,
    board: Option<u32>,
    te_esd: Option<bool>,
    status_read_len: Option<usize>,
    cabc_on_variants: bool,
}

const fn board(board: u32, acl_hbm: bool, cabc: bool, te_esd: bool) -> BoardRule {
    BoardRule {
        board,
        acl_hbm,
        cabc,
        te_esd,
        secondary_check: None,
    }
}

const BOARD_RULES: [BoardRule; 8] = [
    board(14005, true, false, true),
    board(15011, true, false, false),
    board(15018, true, false, false),
    board(15022, true, false, false),
    BoardRule {
        secondary_check: Some(SecondaryCheck {
            register: 0x05,
            param: 0x08,
            expected: 0x00,
        }),
        ..board(15085, true, false, false)
    },
    board(15009, false, true, true),
    board(15037, false, true, true),
    board(15035, false, true, true),
];

const PANEL_RULES: [PanelRule; 3] = [
    PanelRule {
        panel_name: "oppo15069tm otm9605a 540p video video mode dsi panel",
        board: None,
        te_esd: Some(false),
        status_read_len: Some(0),
        cabc_on_variants: false,
    },
    PanelRule {
        panel_name: "oppo15037truly hx8389c 540p video mode dsi panel",
        board: None,
        te_esd: None,
        status_read_len: Some(8),
        cabc_on_variants: false,
    },
    PanelRule {
        panel_name: "oppo15009jdi nt35592 720p video mode dsi panel",
        board: Some(15009),
        te_esd: None,
        status_read_len: None,
        cabc_on_variants: true,
    },
];

impl VariantDescriptor {
    /// Look up the descriptor for `variant`
    pub fn for_variant(variant: &VariantId<'_>) -> Self {
        let mut descriptor = Self::default();

        if let Some(rule) = BOARD_RULES.iter().find(|r| r.board == variant.board) {
            descriptor.features = FeatureSet {
                acl_hbm: rule.acl_hbm,
                cabc: rule.cabc,
            };
            descriptor.te_esd = rule.te_esd;
            descriptor.secondary_check = rule.secondary_check;
            descriptor.external_backlight = rule.cabc;
        }

        let panel_rules = PANEL_RULES.iter().filter(|r| {
            r.panel_name == variant.panel_name && r.board.is_none_or(|b| b == variant.board)
        });
        for rule in panel_rules {
            if let Some(te_esd) = rule.te_esd {
                descriptor.te_esd &= te_esd;
            }
            if rule.status_read_len.is_some() {
                descriptor.status_read_len = rule.status_read_len;
            }
            descriptor.cabc_on_variants |= rule.cabc_on_variants;
        }

        descriptor
    }
}

/// Output of [`resolve`]
#[derive(Clone, Debug)]
pub struct ResolvedPanel {
    /// Panel configuration
    pub config: PanelConfig,
    /// Parsed command sequences
    pub sequences: SequenceStore,
    /// Variant behavior
    pub descriptor: VariantDescriptor,
    /// Boot mode the panel was resolved for
    pub boot_mode: BootMode,
}

impl ResolvedPanel {
    /// Optional features of the variant
    pub fn features(&self) -> FeatureSet {
        self.descriptor.features
    }

    /// Whether the backlight must stay off for this boot
    pub fn backlight_forced_off(&self) -> bool {
        self.boot_mode == BootMode::Silence
    }
}

fn invalid(key: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidProperty { key, reason }
}

fn required_u32(source: &impl PropertySource, key: &'static str) -> Result<u32, ConfigError> {
    source.u32(key).ok_or(ConfigError::MissingProperty(key))
}

fn u16_or(
    source: &impl PropertySource,
    key: &'static str,
    default: u16,
) -> Result<u16, ConfigError> {
    source.u32(key).map_or(Ok(default), |value| {
        u16::try_from(value).map_err(|_| invalid(key, "out of range"))
    })
}

fn dimensions(source: &impl PropertySource) -> Result<Dimensions, ConfigError> {
    let xres = u16::try_from(required_u32(source, keys::WIDTH)?)
        .map_err(|_| invalid(keys::WIDTH, "out of range"))?;
    let yres = u16::try_from(required_u32(source, keys::HEIGHT)?)
        .map_err(|_| invalid(keys::HEIGHT, "out of range"))?;
    Dimensions::new(xres, yres)
}

fn phy_timings(source: &impl PropertySource) -> Result<[u8; PHY_TIMING_LEN], ConfigError> {
    let bytes = source
        .bytes(keys::PHY_TIMINGS)
        .ok_or(ConfigError::MissingProperty(keys::PHY_TIMINGS))?;
    bytes
        .try_into()
        .map_err(|_| invalid(keys::PHY_TIMINGS, "expected 12 bytes"))
}

fn porches(source: &impl PropertySource) -> Result<Porches, ConfigError> {
    let d = Porches::default();
    Ok(Porches {
        h_front: u16_or(source, keys::H_FRONT_PORCH, d.h_front)?,
        h_back: u16_or(source, keys::H_BACK_PORCH, d.h_back)?,
        h_pulse: u16_or(source, keys::H_PULSE_WIDTH, d.h_pulse)?,
        h_skew: u16_or(source, keys::H_SYNC_SKEW, d.h_skew)?,
        v_back: u16_or(source, keys::V_BACK_PORCH, d.v_back)?,
        v_front: u16_or(source, keys::V_FRONT_PORCH, d.v_front)?,
        v_pulse: u16_or(source, keys::V_PULSE_WIDTH, d.v_pulse)?,
    })
}

fn borders(source: &impl PropertySource) -> Result<Borders, ConfigError> {
    Ok(Borders {
        left: u16_or(source, keys::LEFT_BORDER, 0)?,
        right: u16_or(source, keys::RIGHT_BORDER, 0)?,
        top: u16_or(source, keys::TOP_BORDER, 0)?,
        bottom: u16_or(source, keys::BOTTOM_BORDER, 0)?,
    })
}

fn tear_check(source: &impl PropertySource, yres: u16) -> TearCheck {
    let d = TearCheck::for_yres(yres);
    TearCheck {
        enabled: !source.flag(keys::TE_CHECK_DISABLE),
        sync_cfg_height: source.u32_or(keys::TE_SYNC_CFG_HEIGHT, d.sync_cfg_height),
        vsync_init_val: source.u32_or(keys::TE_SYNC_INIT_VAL, d.vsync_init_val),
        sync_threshold_start: source.u32_or(keys::TE_THRESHOLD_START, d.sync_threshold_start),
        sync_threshold_continue: source
            .u32_or(keys::TE_THRESHOLD_CONTINUE, d.sync_threshold_continue),
        start_pos: source.u32_or(keys::TE_START_POS, d.start_pos),
        rd_ptr_irq: source.u32_or(keys::TE_RD_PTR_IRQ, d.rd_ptr_irq),
        refx100: source.u32_or(keys::TE_FRAME_RATE, d.refx100),
    }
}

fn roi_alignment(source: &impl PropertySource) -> Option<RoiAlignment> {
    let cells = source.u32_array(keys::ROI_ALIGNMENT)?;
    let &[xstart, width, ystart, height, min_width, min_height] = cells else {
        log::warn!("resolver: ignoring roi alignment with {} cells", cells.len());
        return None;
    };
    let cell = |v: u32| u16::try_from(v).unwrap_or(u16::MAX);
    Some(RoiAlignment {
        xstart: cell(xstart),
        width: cell(width),
        ystart: cell(ystart),
        height: cell(height),
        min_width: cell(min_width),
        min_height: cell(min_height),
    })
}

fn dynamic_fps(source: &impl PropertySource, frame_rate: u32) -> Option<DynamicFps> {
    if !source.flag(keys::DYNAMIC_FPS) {
        return None;
    }
    let Some(update) = source.str(keys::FPS_UPDATE) else {
        log::info!("resolver: dynamic fps enabled without update mode, disabling");
        return None;
    };
    let mode = match update {
        "dfps_immediate_clk_mode" => DfpsMode::ImmediateClock,
        "dfps_immediate_porch_mode" => DfpsMode::ImmediatePorch,
        _ => DfpsMode::SuspendResume,
    };
    Some(DynamicFps {
        mode,
        min_fps: source.u32_or(keys::MIN_REFRESH_RATE, MIN_REFRESH_RATE),
        max_fps: source.u32_or(keys::MAX_REFRESH_RATE, frame_rate),
    })
}

fn horizontal_idle(source: &impl PropertySource) -> Vec<HorizontalIdle> {
    let Some(cells) = source.u32_array(keys::HOR_LINE_IDLE) else {
        return Vec::new();
    };
    if cells.len() % 3 != 0 {
        log::warn!("resolver: ignoring horizontal idle table of {} cells", cells.len());
        return Vec::new();
    }
    cells
        .chunks_exact(3)
        .map(|c| HorizontalIdle {
            min: c[0],
            max: c[1],
            idle: c[2],
        })
        .collect()
}

fn backlight(
    source: &impl PropertySource,
    descriptor: &VariantDescriptor,
) -> Result<BacklightConfig, ConfigError> {
    let mechanism = if descriptor.external_backlight {
        BacklightMechanism::LedTrigger
    } else {
        match source.str(keys::BL_CONTROL_TYPE) {
            Some("bl_ctrl_pwm") => BacklightMechanism::Pwm {
                period_us: required_u32(source, keys::BL_PWM_PERIOD)?,
            },
            Some("bl_ctrl_dcs") => BacklightMechanism::Dcs,
            Some("bl_ctrl_wled") => BacklightMechanism::LedTrigger,
            other => {
                log::debug!("resolver: backlight control {:?}, using led trigger", other);
                BacklightMechanism::LedTrigger
            }
        }
    };
    Ok(BacklightConfig {
        mechanism,
        min: source.u32_or(keys::BL_MIN, 0),
        max: source.u32_or(keys::BL_MAX, 255),
    })
}

fn sync_wait(source: &impl PropertySource) -> Option<SyncWait> {
    source.flag(keys::SYNC_WAIT).then(|| SyncWait {
        trigger: match source.str(keys::SYNC_WAIT_TRIGGER) {
            Some("left") => LinkRole::Left,
            _ => LinkRole::Right,
        },
    })
}

/// Load `key` from `prop`, using the link state named by `state_key`
///
/// A malformed sequence is logged and left out.
fn load_sequence(
    store: &mut SequenceStore,
    source: &impl PropertySource,
    key: SequenceKey,
    prop: &'static str,
    state_key: &'static str,
) {
    let Some(raw) = source.bytes(prop) else {
        return;
    };
    let link_state = LinkState::from_property(source.str(state_key));
    if let Err(e) = store.load(key, raw, link_state) {
        log::error!("resolver: dropping {}: {}", prop, e);
    }
}

fn sequences(source: &impl PropertySource, descriptor: &VariantDescriptor) -> SequenceStore {
    let mut store = SequenceStore::new();
    load_sequence(&mut store, source, SequenceKey::Off, keys::OFF_COMMAND, keys::OFF_COMMAND_STATE);
    load_sequence(
        &mut store,
        source,
        SequenceKey::Status,
        keys::STATUS_COMMAND,
        keys::STATUS_COMMAND_STATE,
    );
    load_sequence(
        &mut store,
        source,
        SequenceKey::VideoToCommand,
        keys::VIDEO_TO_CMD,
        keys::ON_COMMAND_STATE,
    );
    load_sequence(
        &mut store,
        source,
        SequenceKey::CommandToVideo,
        keys::CMD_TO_VIDEO,
        keys::ON_COMMAND_STATE,
    );

    if descriptor.cabc_on_variants {
        let variants = [
            (SequenceKey::OnCabcBalance, keys::ON_COMMAND_CABC_BALANCE),
            (SequenceKey::OnCabcYellow, keys::ON_COMMAND_CABC_YELLOW),
            (SequenceKey::OnCabcNormal, keys::ON_COMMAND_CABC_NORMAL),
        ];
        for (key, prop) in variants {
            load_sequence(&mut store, source, key, prop, keys::ON_COMMAND_STATE);
        }
        if let Some(balance) = store.get(SequenceKey::OnCabcBalance).cloned() {
            store.insert(SequenceKey::On, balance);
        }
    } else {
        load_sequence(&mut store, source, SequenceKey::On, keys::ON_COMMAND, keys::ON_COMMAND_STATE);
    }

    if descriptor.features.cabc {
        let cabc = [
            (SequenceKey::CabcOff, keys::CABC_OFF_COMMAND),
            (SequenceKey::CabcUi, keys::CABC_UI_COMMAND),
            (SequenceKey::CabcStill, keys::CABC_STILL_COMMAND),
            (SequenceKey::CabcVideo, keys::CABC_VIDEO_COMMAND),
        ];
        for (key, prop) in cabc {
            load_sequence(&mut store, source, key, prop, keys::OFF_COMMAND_STATE);
        }
    }

    store
}

fn esd_config(
    source: &impl PropertySource,
    mode: PanelMode,
    descriptor: &VariantDescriptor,
) -> EsdConfig {
    let mut esd = EsdConfig {
        expected: source
            .u32(keys::STATUS_VALUE)
            .and_then(|v| u8::try_from(v).ok())
            .unwrap_or(0),
        ..EsdConfig::default()
    };

    esd.mode = match source.str(keys::STATUS_CHECK_MODE).and_then(EsdMode::from_property) {
        Some(EsdMode::TearSignal) if mode != PanelMode::Command => {
            log::error!("resolver: tear signal check needs a command mode panel");
            EsdMode::None
        }
        Some(m) => m,
        None => EsdMode::None,
    };

    match esd.mode {
        EsdMode::RegisterRead => {
            esd.read_len = descriptor.status_read_len.unwrap_or(1);
            esd.secondary = descriptor.secondary_check;
        }
        EsdMode::RegisterReadVariant => esd.read_len = VARIANT_READ_LEN,
        _ => {}
    }
    esd
}

/// Resolve a panel description
///
/// Apart from diagnostic logging this is a pure function of its inputs.
///
/// # Errors
///
/// Returns [`ConfigError::MissingProperty`] when width, height, bpp or PHY
/// timings are absent and [`ConfigError::InvalidProperty`] for malformed
/// values. Malformed command sequences are not errors; they are logged and
/// left out of [`ResolvedPanel::sequences`].
pub fn resolve(
    variant: &VariantId<'_>,
    source: &impl PropertySource,
    boot: &BootParams,
) -> Result<ResolvedPanel, ConfigError> {
    let descriptor = VariantDescriptor::for_variant(variant);

    let dims = dimensions(source)?;
    let bpp = u8::try_from(required_u32(source, keys::BPP)?)
        .map_err(|_| invalid(keys::BPP, "out of range"))?;
    let timings = phy_timings(source)?;

    let mode = match source.str(keys::PANEL_TYPE) {
        Some(t) if t.starts_with("dsi_cmd_mode") => PanelMode::Command,
        _ => PanelMode::Video,
    };
    let frame_rate = source.u32_or(keys::FRAME_RATE, crate::config::DEFAULT_FRAME_RATE);

    let sequences = sequences(source, &descriptor);

    let mut features = FeatureFlags {
        partial_update: source.flag(keys::PARTIAL_UPDATE),
        roi_merge: source.flag(keys::ROI_MERGE),
        cmd_by_left: source.flag(keys::CMD_BY_LEFT),
        dynamic_switch: source.flag(keys::DYNAMIC_SWITCH),
        esd_check: source.flag(keys::ESD_CHECK),
        ulps: source.flag(keys::ULPS),
        ulps_suspend: source.flag(keys::ULPS_SUSPEND),
        panel_ack_disabled: source.flag(keys::PANEL_ACK_DISABLED),
        cont_splash: source.flag(keys::CONT_SPLASH),
    };

    if features.dynamic_switch
        && !(sequences.contains(SequenceKey::VideoToCommand)
            && sequences.contains(SequenceKey::CommandToVideo))
    {
        log::info!("resolver: mode switch sequences missing, dynamic switch disabled");
        features.dynamic_switch = false;
    }

    if descriptor.features.cabc && matches!(boot.mode, BootMode::Factory | BootMode::Mos) {
        features.cont_splash = false;
    }

    let mut esd = esd_config(source, mode, &descriptor);
    if features.panel_ack_disabled && features.esd_check {
        log::warn!("resolver: panel ack disabled, ESD check turned off");
        features.esd_check = false;
    }
    if !boot.mode.is_normal() && descriptor.features.acl_hbm {
        features.esd_check = false;
    }
    if descriptor.te_esd && !(boot.mode == BootMode::Factory && descriptor.features.cabc) {
        esd.mode = EsdMode::TearSignal;
        features.esd_check = true;
    }

    let lanes = keys::LANE_STATE.map(|key| source.flag(key));
    let virtual_channel = u8::try_from(source.u32_or(keys::VIRTUAL_CHANNEL, 0))
        .map_err(|_| invalid(keys::VIRTUAL_CHANNEL, "out of range"))?;

    let mut builder = Builder::new()
        .dimensions(dims)
        .bpp(bpp)
        .phy_timings(timings)
        .physical_size_mm(
            source.u32_or(keys::PHYSICAL_WIDTH, 0),
            source.u32_or(keys::PHYSICAL_HEIGHT, 0),
        )
        .borders(borders(source)?)
        .loose_packing(source.str(keys::PIXEL_PACKING) == Some("loose"))
        .mode(mode)
        .porches(porches(source)?)
        .traffic_mode(source.str(keys::TRAFFIC_MODE).map_or_else(TrafficMode::default, TrafficMode::from_property))
        .lane_map(source.str(keys::LANE_MAP).map_or_else(LaneMap::default, LaneMap::from_property))
        .lanes(lanes)
        .color_order(source.str(keys::COLOR_ORDER).map_or_else(ColorOrder::default, ColorOrder::from_property))
        .virtual_channel(virtual_channel)
        .triggers(
            source.str(keys::MDP_TRIGGER).map_or_else(Trigger::default, Trigger::from_property),
            source.str(keys::DMA_TRIGGER).map_or_else(Trigger::default, Trigger::from_property),
        )
        .frame_rate(frame_rate)
        .clock_rate(source.u32_or(keys::CLOCK_RATE, 0))
        .mdp_transfer_time_us(
            source.u32_or(keys::MDP_TRANSFER_TIME, crate::config::DEFAULT_MDP_TRANSFER_TIME_US),
        )
        .tear_check(tear_check(source, dims.yres))
        .horizontal_idle(horizontal_idle(source))
        .features(features)
        .brightness_max(source.u32_or(keys::BRIGHTNESS_MAX, 255))
        .backlight(backlight(source, &descriptor)?)
        .esd(esd);

    if let Some(cells) = source.u32_array(keys::RESET_SEQUENCE) {
        match reset_steps(cells) {
            Ok(steps) => builder = builder.reset_sequence(steps),
            Err(e) => log::warn!("resolver: reset sequence ignored: {}", e),
        }
    }
    if let Some(alignment) = roi_alignment(source) {
        builder = builder.roi_alignment(alignment);
    }
    if let Some(dfps) = dynamic_fps(source, frame_rate) {
        builder = builder.dynamic_fps(dfps);
    }
    if source.flag(keys::FBC_ENABLE) {
        builder = builder.fbc(Fbc {
            bpp: source.u32_or(keys::FBC_BPP, u32::from(bpp)),
            packing: source.u32_or(keys::FBC_PACKING, 0),
            bias: source.u32_or(keys::FBC_BIAS, 0),
        });
    }
    if let Some(sync) = sync_wait(source) {
        builder = builder.sync_wait(sync);
    }

    let config = builder.build()?;

    log::info!(
        "resolver: {} board={} {:?} {}x{} esd={:?} acl_hbm={} cabc={} splash={}",
        variant.panel_name,
        variant.board,
        config.mode,
        config.dimensions.xres,
        config.dimensions.yres,
        config.esd.mode,
        descriptor.features.acl_hbm,
        descriptor.features.cabc,
        config.features.cont_splash
    );

    Ok(ResolvedPanel {
        config,
        sequences,
        descriptor,
        boot_mode: boot.mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyMap;

    const ON: [u8; 8] = [0x05, 0x01, 0x00, 0x00, 0x78, 0x00, 0x01, 0x11];
    const OFF: [u8; 8] = [0x05, 0x01, 0x00, 0x00, 0x32, 0x00, 0x01, 0x28];
    const STATUS: [u8; 9] = [0x06, 0x01, 0x00, 0x01, 0x05, 0x00, 0x02, 0x0A, 0x08];

    fn base() -> PropertyMap {
        PropertyMap::new()
            .with_u32(keys::WIDTH, 720)
            .with_u32(keys::HEIGHT, 1280)
            .with_u32(keys::BPP, 24)
            .with_bytes(keys::PHY_TIMINGS, &[0x7d; 12])
            .with_bytes(keys::ON_COMMAND, &ON)
            .with_bytes(keys::OFF_COMMAND, &OFF)
            .with_bytes(keys::STATUS_COMMAND, &STATUS)
    }

    fn reg_read() -> PropertyMap {
        base()
            .with_flag(keys::ESD_CHECK)
            .with_str(keys::STATUS_CHECK_MODE, "reg_read")
            .with_u32(keys::STATUS_VALUE, 0x9C)
    }

    #[test]
    fn test_unknown_variant_uses_default_descriptor() {
        let panel = resolve(&VariantId::new("unknown", 99999), &base(), &BootParams::default())
            .unwrap();
        assert_eq!(panel.descriptor, VariantDescriptor::default());
        assert_eq!(panel.config.esd.mode, EsdMode::None);
        assert_eq!(panel.config.mode, PanelMode::Video);
        assert!(panel.sequences.contains(SequenceKey::On));
        assert!(panel.sequences.contains(SequenceKey::Off));
    }

    #[test]
    fn test_missing_required_properties() {
        let mut props = base();
        props.remove(keys::HEIGHT);
        assert!(matches!(
            resolve(&VariantId::new("x", 0), &props, &BootParams::default()),
            Err(ConfigError::MissingProperty(keys::HEIGHT))
        ));

        let mut props = base();
        props.remove(keys::PHY_TIMINGS);
        assert!(matches!(
            resolve(&VariantId::new("x", 0), &props, &BootParams::default()),
            Err(ConfigError::MissingProperty(keys::PHY_TIMINGS))
        ));
    }

    #[test]
    fn test_short_phy_timings_rejected() {
        let props = base().with_bytes(keys::PHY_TIMINGS, &[0; 11]);
        assert!(matches!(
            resolve(&VariantId::new("x", 0), &props, &BootParams::default()),
            Err(ConfigError::InvalidProperty { key: keys::PHY_TIMINGS, .. })
        ));
    }

    #[test]
    fn test_malformed_sequence_left_out() {
        let props = base().with_bytes(keys::OFF_COMMAND, &OFF[..6]);
        let panel = resolve(&VariantId::new("x", 0), &props, &BootParams::default()).unwrap();
        assert!(!panel.sequences.contains(SequenceKey::Off));
        assert!(panel.sequences.contains(SequenceKey::On));
    }

    #[test]
    fn test_register_read_esd() {
        let panel = resolve(&VariantId::new("x", 0), &reg_read(), &BootParams::default()).unwrap();
        assert_eq!(panel.config.esd.mode, EsdMode::RegisterRead);
        assert_eq!(panel.config.esd.expected, 0x9C);
        assert_eq!(panel.config.esd.read_len, 1);
        assert_eq!(panel.config.esd.secondary, None);
    }

    #[test]
    fn test_secondary_check_on_board_15085() {
        let panel =
            resolve(&VariantId::new("x", 15085), &reg_read(), &BootParams::default()).unwrap();
        assert!(panel.features().acl_hbm);
        assert_eq!(
            panel.config.esd.secondary.map(|s| s.register),
            Some(0x05)
        );
    }

    #[test]
    fn test_non_normal_boot_disables_esd_on_acl_board() {
        let boot = BootParams {
            mode: BootMode::Rf,
            ..BootParams::default()
        };
        let panel = resolve(&VariantId::new("x", 15011), &reg_read(), &boot).unwrap();
        assert_eq!(panel.config.esd.mode, EsdMode::None);
        assert!(!panel.config.features.esd_check);

        // Unaffected on boards without ACL
        let panel = resolve(&VariantId::new("x", 0), &reg_read(), &boot).unwrap();
        assert_eq!(panel.config.esd.mode, EsdMode::RegisterRead);
    }

    #[test]
    fn test_panel_ack_disabled_forces_esd_off() {
        let props = reg_read().with_flag(keys::PANEL_ACK_DISABLED);
        let panel = resolve(&VariantId::new("x", 0), &props, &BootParams::default()).unwrap();
        assert_eq!(panel.config.esd.mode, EsdMode::None);
    }

    #[test]
    fn test_status_read_length_by_panel() {
        let truly = VariantId::new("oppo15037truly hx8389c 540p video mode dsi panel", 0);
        let panel = resolve(&truly, &reg_read(), &BootParams::default()).unwrap();
        assert_eq!(panel.config.esd.read_len, 8);

        let otm = VariantId::new("oppo15069tm otm9605a 540p video video mode dsi panel", 0);
        let panel = resolve(&otm, &reg_read(), &BootParams::default()).unwrap();
        assert_eq!(panel.config.esd.read_len, 0);

        let props = base()
            .with_flag(keys::ESD_CHECK)
            .with_str(keys::STATUS_CHECK_MODE, "reg_read_nt35596");
        let panel = resolve(&otm, &props, &BootParams::default()).unwrap();
        assert_eq!(panel.config.esd.read_len, VARIANT_READ_LEN);
    }

    #[test]
    fn test_tear_signal_mode_needs_command_mode() {
        let props = base()
            .with_flag(keys::ESD_CHECK)
            .with_str(keys::STATUS_CHECK_MODE, "te_signal_check");
        let panel = resolve(&VariantId::new("x", 0), &props, &BootParams::default()).unwrap();
        assert_eq!(panel.config.esd.mode, EsdMode::None);

        let props = props.with_str(keys::PANEL_TYPE, "dsi_cmd_mode");
        let panel = resolve(&VariantId::new("x", 0), &props, &BootParams::default()).unwrap();
        assert_eq!(panel.config.esd.mode, EsdMode::TearSignal);
        assert_eq!(panel.config.mode, PanelMode::Command);
    }

    #[test]
    fn test_cabc_board_boot_rules() {
        let props = base().with_flag(keys::CONT_SPLASH);
        let variant = VariantId::new("x", 15037);

        let panel = resolve(&variant, &props, &BootParams::default()).unwrap();
        assert!(panel.features().cabc);
        assert!(panel.config.features.cont_splash);
        assert_eq!(panel.config.esd.mode, EsdMode::TearSignal);
        assert_eq!(panel.config.backlight.mechanism, BacklightMechanism::LedTrigger);

        let factory = BootParams {
            mode: BootMode::Factory,
            ..BootParams::default()
        };
        let panel = resolve(&variant, &props, &factory).unwrap();
        assert!(!panel.config.features.cont_splash);
        assert_eq!(panel.config.esd.mode, EsdMode::None);

        let mos = BootParams {
            mode: BootMode::Mos,
            ..BootParams::default()
        };
        let panel = resolve(&variant, &props, &mos).unwrap();
        assert!(!panel.config.features.cont_splash);
        assert_eq!(panel.config.esd.mode, EsdMode::TearSignal);
    }

    #[test]
    fn test_otm9605a_on_15009_has_no_tear_check() {
        let variant = VariantId::new("oppo15069tm otm9605a 540p video video mode dsi panel", 15009);
        let panel = resolve(&variant, &base(), &BootParams::default()).unwrap();
        assert!(!panel.descriptor.te_esd);
        assert_eq!(panel.config.esd.mode, EsdMode::None);
    }

    #[test]
    fn test_cabc_on_variants_select_balance() {
        let balance = [0x05, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x29];
        let props = base()
            .with_bytes(keys::ON_COMMAND_CABC_BALANCE, &balance)
            .with_bytes(keys::ON_COMMAND_CABC_YELLOW, &ON);
        let variant = VariantId::new("oppo15009jdi nt35592 720p video mode dsi panel", 15009);
        let panel = resolve(&variant, &props, &BootParams::default()).unwrap();

        let on = panel.sequences.get(SequenceKey::On).unwrap();
        assert_eq!(on.to_bytes(), balance);
        assert!(panel.sequences.contains(SequenceKey::OnCabcYellow));
        assert!(!panel.sequences.contains(SequenceKey::OnCabcNormal));

        // Same panel on another board keeps the plain on sequence
        let variant = VariantId::new("oppo15009jdi nt35592 720p video mode dsi panel", 15037);
        let panel = resolve(&variant, &props, &BootParams::default()).unwrap();
        assert_eq!(panel.sequences.get(SequenceKey::On).unwrap().to_bytes(), ON);
    }

    #[test]
    fn test_dynamic_switch_needs_both_sequences() {
        let props = base()
            .with_flag(keys::DYNAMIC_SWITCH)
            .with_bytes(keys::VIDEO_TO_CMD, &ON);
        let panel = resolve(&VariantId::new("x", 0), &props, &BootParams::default()).unwrap();
        assert!(!panel.config.features.dynamic_switch);

        let props = props.with_bytes(keys::CMD_TO_VIDEO, &OFF);
        let panel = resolve(&VariantId::new("x", 0), &props, &BootParams::default()).unwrap();
        assert!(panel.config.features.dynamic_switch);
    }

    #[test]
    fn test_malformed_reset_sequence_ignored() {
        for cells in [&[1, 20, 0][..], &[][..], &[1; 12][..]] {
            let props = base().with_u32_array(keys::RESET_SEQUENCE, cells);
            let panel = resolve(&VariantId::new("x", 0), &props, &BootParams::default()).unwrap();
            assert!(panel.config.reset_sequence.is_empty());
            assert!(panel.sequences.contains(SequenceKey::On));
        }
    }

    #[test]
    fn test_wide_borders_kept_as_given() {
        let props = base()
            .with_u32(keys::LEFT_BORDER, 40000)
            .with_u32(keys::RIGHT_BORDER, 40000);
        let config = resolve(&VariantId::new("x", 0), &props, &BootParams::default())
            .unwrap()
            .config;
        assert_eq!(config.borders.left, 40000);
        assert_eq!(config.borders.right, 40000);
        assert_eq!(config.borders.top, 0);
    }

    #[test]
    fn test_virtual_channel_out_of_range_rejected() {
        let props = base().with_u32(keys::VIRTUAL_CHANNEL, 256);
        assert!(matches!(
            resolve(&VariantId::new("x", 0), &props, &BootParams::default()),
            Err(ConfigError::InvalidProperty { key: keys::VIRTUAL_CHANNEL, .. })
        ));

        let props = base().with_u32(keys::VIRTUAL_CHANNEL, 2);
        let panel = resolve(&VariantId::new("x", 0), &props, &BootParams::default()).unwrap();
        assert_eq!(panel.config.virtual_channel, 2);
    }

    #[test]
    fn test_optional_blocks() {
        let props = base()
            .with_str(keys::BL_CONTROL_TYPE, "bl_ctrl_pwm")
            .with_u32(keys::BL_PWM_PERIOD, 100)
            .with_flag(keys::DYNAMIC_FPS)
            .with_str(keys::FPS_UPDATE, "dfps_immediate_porch_mode")
            .with_u32_array(keys::HOR_LINE_IDLE, &[0, 540, 256, 540, 1080, 512])
            .with_u32_array(keys::RESET_SEQUENCE, &[1, 20, 0, 1, 1, 20])
            .with_flag(keys::SYNC_WAIT)
            .with_str(keys::SYNC_WAIT_TRIGGER, "left")
            .with_flag(keys::LANE_STATE[0])
            .with_flag(keys::LANE_STATE[1]);
        let config = resolve(&VariantId::new("x", 0), &props, &BootParams::default())
            .unwrap()
            .config;

        assert_eq!(
            config.backlight.mechanism,
            BacklightMechanism::Pwm { period_us: 100 }
        );
        assert_eq!(
            config.dynamic_fps,
            Some(DynamicFps {
                mode: DfpsMode::ImmediatePorch,
                min_fps: MIN_REFRESH_RATE,
                max_fps: 60,
            })
        );
        assert_eq!(config.horizontal_idle.len(), 2);
        assert_eq!(config.reset_sequence.len(), 3);
        assert_eq!(config.sync_wait.map(|s| s.trigger), Some(LinkRole::Left));
        assert_eq!(config.lanes, [true, true, false, false]);
    }

    #[test]
    fn test_pwm_without_period_rejected() {
        let props = base().with_str(keys::BL_CONTROL_TYPE, "bl_ctrl_pwm");
        assert!(matches!(
            resolve(&VariantId::new("x", 0), &props, &BootParams::default()),
            Err(ConfigError::MissingProperty(keys::BL_PWM_PERIOD))
        ));
    }

    #[test]
    fn test_silence_boot_forces_backlight_off() {
        let boot = BootParams::parse("oppo_ftm_mode=ftmsilence");
        let panel = resolve(&VariantId::new("x", 0), &base(), &boot).unwrap();
        assert!(panel.backlight_forced_off());
    }
}
