//! Declarative panel description
//!
//! Panels are described by a property tree (a devicetree node on the
//! original platform). [`PropertySource`] is the read-only view the resolver
//! needs; [`PropertyMap`] is an in-memory implementation.
//!
//! Flags follow devicetree convention: a flag is set when the key is present.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Property keys understood by the resolver
pub mod keys {
    #![allow(missing_docs)]

    pub const PANEL_NAME: &str = "qcom,mdss-dsi-panel-name";
    pub const WIDTH: &str = "qcom,mdss-dsi-panel-width";
    pub const HEIGHT: &str = "qcom,mdss-dsi-panel-height";
    pub const PHYSICAL_WIDTH: &str = "qcom,mdss-pan-physical-width-dimension";
    pub const PHYSICAL_HEIGHT: &str = "qcom,mdss-pan-physical-height-dimension";
    pub const LEFT_BORDER: &str = "qcom,mdss-dsi-h-left-border";
    pub const RIGHT_BORDER: &str = "qcom,mdss-dsi-h-right-border";
    pub const TOP_BORDER: &str = "qcom,mdss-dsi-v-top-border";
    pub const BOTTOM_BORDER: &str = "qcom,mdss-dsi-v-bottom-border";
    pub const BPP: &str = "qcom,mdss-dsi-bpp";
    pub const PANEL_TYPE: &str = "qcom,mdss-dsi-panel-type";
    pub const PIXEL_PACKING: &str = "qcom,mdss-dsi-pixel-packing";
    pub const H_FRONT_PORCH: &str = "qcom,mdss-dsi-h-front-porch";
    pub const H_BACK_PORCH: &str = "qcom,mdss-dsi-h-back-porch";
    pub const H_PULSE_WIDTH: &str = "qcom,mdss-dsi-h-pulse-width";
    pub const H_SYNC_SKEW: &str = "qcom,mdss-dsi-h-sync-skew";
    pub const V_BACK_PORCH: &str = "qcom,mdss-dsi-v-back-porch";
    pub const V_FRONT_PORCH: &str = "qcom,mdss-dsi-v-front-porch";
    pub const V_PULSE_WIDTH: &str = "qcom,mdss-dsi-v-pulse-width";
    pub const BL_CONTROL_TYPE: &str = "qcom,mdss-dsi-bl-pmic-control-type";
    pub const BL_PWM_PERIOD: &str = "qcom,mdss-dsi-bl-pmic-pwm-frequency";
    pub const BL_MIN: &str = "qcom,mdss-dsi-bl-min-level";
    pub const BL_MAX: &str = "qcom,mdss-dsi-bl-max-level";
    pub const BRIGHTNESS_MAX: &str = "qcom,mdss-brightness-max-level";
    pub const TRAFFIC_MODE: &str = "qcom,mdss-dsi-traffic-mode";
    pub const VIRTUAL_CHANNEL: &str = "qcom,mdss-dsi-virtual-channel-id";
    pub const COLOR_ORDER: &str = "qcom,mdss-dsi-color-order";
    pub const LANE_STATE: [&str; 4] = [
        "qcom,mdss-dsi-lane-0-state",
        "qcom,mdss-dsi-lane-1-state",
        "qcom,mdss-dsi-lane-2-state",
        "qcom,mdss-dsi-lane-3-state",
    ];
    pub const FRAME_RATE: &str = "qcom,mdss-dsi-panel-framerate";
    pub const CLOCK_RATE: &str = "qcom,mdss-dsi-panel-clockrate";
    pub const MDP_TRANSFER_TIME: &str = "qcom,mdss-mdp-transfer-time-us";
    pub const PHY_TIMINGS: &str = "qcom,mdss-dsi-panel-timings";
    pub const ROI_ALIGNMENT: &str = "qcom,panel-roi-alignment";
    pub const MDP_TRIGGER: &str = "qcom,mdss-dsi-mdp-trigger";
    pub const DMA_TRIGGER: &str = "qcom,mdss-dsi-dma-trigger";
    pub const LANE_MAP: &str = "qcom,mdss-dsi-lane-map";
    pub const FBC_ENABLE: &str = "qcom,mdss-dsi-fbc-enable";
    pub const FBC_BPP: &str = "qcom,mdss-dsi-fbc-bpp";
    pub const FBC_PACKING: &str = "qcom,mdss-dsi-fbc-packing";
    pub const FBC_BIAS: &str = "qcom,mdss-dsi-fbc-bias";
    pub const TE_CHECK_DISABLE: &str = "qcom,mdss-tear-check-disable";
    pub const TE_SYNC_CFG_HEIGHT: &str = "qcom,mdss-tear-check-sync-cfg-height";
    pub const TE_SYNC_INIT_VAL: &str = "qcom,mdss-tear-check-sync-init-val";
    pub const TE_THRESHOLD_START: &str = "qcom,mdss-tear-check-sync-threshold-start";
    pub const TE_THRESHOLD_CONTINUE: &str = "qcom,mdss-tear-check-sync-threshold-continue";
    pub const TE_START_POS: &str = "qcom,mdss-tear-check-start-pos";
    pub const TE_RD_PTR_IRQ: &str = "qcom,mdss-tear-check-rd-ptr-trigger-intr";
    pub const TE_FRAME_RATE: &str = "qcom,mdss-tear-check-frame-rate";
    pub const RESET_SEQUENCE: &str = "qcom,mdss-dsi-reset-sequence";
    pub const ON_COMMAND: &str = "qcom,mdss-dsi-on-command";
    pub const ON_COMMAND_STATE: &str = "qcom,mdss-dsi-on-command-state";
    pub const ON_COMMAND_CABC_BALANCE: &str = "qcom,mdss-dsi-on-command-cabc";
    pub const ON_COMMAND_CABC_YELLOW: &str = "qcom,mdss-dsi-on-command-cabc-yellow";
    pub const ON_COMMAND_CABC_NORMAL: &str = "qcom,mdss-dsi-on-command-cabc-normal";
    pub const OFF_COMMAND: &str = "qcom,mdss-dsi-off-command";
    pub const OFF_COMMAND_STATE: &str = "qcom,mdss-dsi-off-command-state";
    pub const CABC_OFF_COMMAND: &str = "qcom,mdss-dsi-cabc-off-command";
    pub const CABC_UI_COMMAND: &str = "qcom,mdss-dsi-cabc-ui-command";
    pub const CABC_STILL_COMMAND: &str = "qcom,mdss-dsi-cabc-still-image-command";
    pub const CABC_VIDEO_COMMAND: &str = "qcom,mdss-dsi-cabc-video-command";
    pub const STATUS_COMMAND: &str = "qcom,mdss-dsi-panel-status-command";
    pub const STATUS_COMMAND_STATE: &str = "qcom,mdss-dsi-panel-status-command-state";
    pub const STATUS_VALUE: &str = "qcom,mdss-dsi-panel-status-value";
    pub const STATUS_CHECK_MODE: &str = "qcom,mdss-dsi-panel-status-check-mode";
    pub const CONT_SPLASH: &str = "qcom,cont-splash-enabled";
    pub const PARTIAL_UPDATE: &str = "qcom,partial-update-enabled";
    pub const ROI_MERGE: &str = "qcom,partial-update-roi-merge";
    pub const CMD_BY_LEFT: &str = "qcom,dcs-cmd-by-left";
    pub const ULPS: &str = "qcom,ulps-enabled";
    pub const ESD_CHECK: &str = "qcom,esd-check-enabled";
    pub const ULPS_SUSPEND: &str = "qcom,suspend-ulps-enabled";
    pub const DYNAMIC_SWITCH: &str = "qcom,dynamic-mode-switch-enabled";
    pub const VIDEO_TO_CMD: &str = "qcom,video-to-cmd-mode-switch-commands";
    pub const CMD_TO_VIDEO: &str = "qcom,cmd-to-video-mode-switch-commands";
    pub const PANEL_ACK_DISABLED: &str = "qcom,panel-ack-disabled";
    pub const HOR_LINE_IDLE: &str = "qcom,mdss-dsi-hor-line-idle";
    pub const DYNAMIC_FPS: &str = "qcom,mdss-dsi-pan-enable-dynamic-fps";
    pub const FPS_UPDATE: &str = "qcom,mdss-dsi-pan-fps-update";
    pub const MIN_REFRESH_RATE: &str = "qcom,mdss-dsi-min-refresh-rate";
    pub const MAX_REFRESH_RATE: &str = "qcom,mdss-dsi-max-refresh-rate";
    pub const SYNC_WAIT: &str = "qcom,cmd-sync-wait-broadcast";
    pub const SYNC_WAIT_TRIGGER: &str = "qcom,cmd-sync-wait-trigger";
}

/// Read access to panel properties
pub trait PropertySource {
    /// Single 32-bit cell
    fn u32(&self, key: &str) -> Option<u32>;

    /// Whether the flag `key` is present
    fn flag(&self, key: &str) -> bool;

    /// String value
    fn str(&self, key: &str) -> Option<&str>;

    /// Raw byte string
    fn bytes(&self, key: &str) -> Option<&[u8]>;

    /// Array of 32-bit cells
    fn u32_array(&self, key: &str) -> Option<&[u32]>;

    /// Single cell, or `default` when absent
    fn u32_or(&self, key: &str, default: u32) -> u32 {
        self.u32(key).unwrap_or(default)
    }
}

/// A property value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    /// Present with no value
    Flag,
    /// 32-bit cells
    Cells(Vec<u32>),
    /// String
    Str(String),
    /// Byte string
    Bytes(Vec<u8>),
}

/// In-memory [`PropertySource`]
///
/// ## Example
///
/// ```
/// use dsi_panel::{PropertyMap, PropertySource};
///
/// let props = PropertyMap::new()
///     .with_u32("qcom,mdss-dsi-panel-width", 1080)
///     .with_flag("qcom,partial-update-enabled")
///     .with_str("qcom,mdss-dsi-panel-name", "jdi 1080p cmd");
///
/// assert_eq!(props.u32("qcom,mdss-dsi-panel-width"), Some(1080));
/// assert!(props.flag("qcom,partial-update-enabled"));
/// assert!(!props.flag("qcom,dcs-cmd-by-left"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyMap {
    props: BTreeMap<String, PropertyValue>,
}

impl PropertyMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`
    pub fn insert(&mut self, key: &str, value: PropertyValue) {
        self.props.insert(key.to_string(), value);
    }

    /// Remove `key`
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.props.remove(key)
    }

    /// Add a flag
    pub fn with_flag(mut self, key: &str) -> Self {
        self.insert(key, PropertyValue::Flag);
        self
    }

    /// Add a single cell
    pub fn with_u32(mut self, key: &str, value: u32) -> Self {
        self.insert(key, PropertyValue::Cells(alloc::vec![value]));
        self
    }

    /// Add a cell array
    pub fn with_u32_array(mut self, key: &str, values: &[u32]) -> Self {
        self.insert(key, PropertyValue::Cells(values.to_vec()));
        self
    }

    /// Add a string
    pub fn with_str(mut self, key: &str, value: &str) -> Self {
        self.insert(key, PropertyValue::Str(value.to_string()));
        self
    }

    /// Add a byte string
    pub fn with_bytes(mut self, key: &str, value: &[u8]) -> Self {
        self.insert(key, PropertyValue::Bytes(value.to_vec()));
        self
    }
}

impl PropertySource for PropertyMap {
    fn u32(&self, key: &str) -> Option<u32> {
        match self.props.get(key)? {
            PropertyValue::Cells(cells) => cells.first().copied(),
            _ => None,
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.props.contains_key(key)
    }

    fn str(&self, key: &str) -> Option<&str> {
        match self.props.get(key)? {
            PropertyValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn bytes(&self, key: &str) -> Option<&[u8]> {
        match self.props.get(key)? {
            PropertyValue::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    fn u32_array(&self, key: &str) -> Option<&[u32]> {
        match self.props.get(key)? {
            PropertyValue::Cells(cells) => Some(cells.as_slice()),
            _ => None,
        }
    }
}
