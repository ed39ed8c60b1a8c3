//! Partial-update regions
//!
//! A [`Roi`] is the rectangle of the frame a command-mode panel is about to
//! receive. Before each partial frame the panel's column and page address
//! windows are set to it with DCS `0x2A`/`0x2B`, packed into one frame.
//!
//! On a split panel each link addresses its own half. With ROI merging the
//! two halves are combined into one region addressed through a single link;
//! see [`merge`].
//!
//! ## Example
//!
//! ```
//! use dsi_panel::{roi, Roi};
//!
//! // Right half only: shift into full-panel coordinates
//! let merged = roi::merge(Roi::default(), Roi::new(0, 100, 540, 200), 540);
//! assert_eq!(merged.roi, Roi::new(540, 100, 540, 200));
//! assert!(!merged.covers_left);
//! ```

use crate::command::{
    Command, CommandHeader, DCS_SET_COLUMN_ADDRESS, DCS_SET_PAGE_ADDRESS, DTYPE_DCS_LWRITE,
};

/// Region of interest in panel pixel coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Roi {
    /// Left edge
    pub x: u16,
    /// Top edge
    pub y: u16,
    /// Width in pixels
    pub w: u16,
    /// Height in pixels
    pub h: u16,
}

impl Roi {
    /// Create a region
    #[allow(clippy::many_single_char_names)]
    pub fn new(x: u16, y: u16, w: u16, h: u16) -> Self {
        Self { x, y, w, h }
    }

    /// Full-screen region of `xres` by `yres`
    pub fn full(xres: u16, yres: u16) -> Self {
        Self::new(0, 0, xres, yres)
    }

    /// Whether the region covers no pixels
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Column and page address commands for this region
    ///
    /// The column write is batched with the page write so both land in the
    /// same frame.
    pub fn address_commands(&self) -> [Command; 2] {
        [
            window(DCS_SET_COLUMN_ADDRESS, self.x, self.w, false),
            window(DCS_SET_PAGE_ADDRESS, self.y, self.h, true),
        ]
    }
}

fn window(opcode: u8, start: u16, len: u16, last: bool) -> Command {
    let end = start.wrapping_add(len).wrapping_sub(1);
    let [start_hi, start_lo] = start.to_be_bytes();
    let [end_hi, end_lo] = end.to_be_bytes();
    Command::new(
        CommandHeader {
            dtype: DTYPE_DCS_LWRITE,
            last: u8::from(last),
            wait_ms: 1,
            ..CommandHeader::default()
        },
        alloc::vec![opcode, start_hi, start_lo, end_hi, end_lo],
    )
}

/// Partial-update request from the display pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoiRequest {
    /// Region for a single-link panel
    Single(Roi),
    /// Per-link regions for a split panel, each in its link's coordinates
    Split {
        /// Region on the left link
        left: Roi,
        /// Region on the right link
        right: Roi,
    },
}

/// Result of merging the two halves of a split-panel update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergedRoi {
    /// Combined region in full-panel coordinates
    pub roi: Roi,
    /// Whether the update touches the left half
    pub covers_left: bool,
}

/// Merge per-link regions into one region
///
/// An unset left region (zero width and height) means the update is on the
/// right half only, so the right region is shifted by the left link's
/// horizontal resolution. Otherwise the left region is widened by the
/// right region's width.
pub fn merge(left: Roi, right: Roi, left_xres: u16) -> MergedRoi {
    if left.w == 0 && left.h == 0 {
        MergedRoi {
            roi: Roi {
                x: right.x.saturating_add(left_xres),
                ..right
            },
            covers_left: false,
        }
    } else {
        MergedRoi {
            roi: Roi {
                w: left.w.saturating_add(right.w),
                ..left
            },
            covers_left: true,
        }
    }
}

#[cfg(feature = "graphics")]
impl From<embedded_graphics_core::primitives::Rectangle> for Roi {
    /// Convert a dirty rectangle, clamping it to the non-negative `u16` range
    fn from(rect: embedded_graphics_core::primitives::Rectangle) -> Self {
        let clamp = |v: i32| v.clamp(0, i32::from(u16::MAX)) as u16;
        let x = clamp(rect.top_left.x);
        let y = clamp(rect.top_left.y);
        let w = rect.size.width.min(u32::from(u16::MAX)) as u16;
        let h = rect.size.height.min(u32::from(u16::MAX)) as u16;
        Self { x, y, w, h }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_commands_encode_inclusive_end() {
        let [caset, paset] = Roi::new(0x10, 0x20, 0x100, 0x40).address_commands();
        assert_eq!(caset.payload(), &[0x2A, 0x00, 0x10, 0x01, 0x0F]);
        assert_eq!(paset.payload(), &[0x2B, 0x00, 0x20, 0x00, 0x5F]);
        assert!(!caset.is_last());
        assert!(paset.is_last());
    }

    #[test]
    fn test_merge_left_and_right_widens_left() {
        let merged = merge(Roi::new(100, 10, 440, 50), Roi::new(0, 10, 200, 50), 540);
        assert_eq!(merged.roi, Roi::new(100, 10, 640, 50));
        assert!(merged.covers_left);
    }

    #[test]
    fn test_merge_left_only_keeps_left() {
        let merged = merge(Roi::new(0, 0, 540, 960), Roi::default(), 540);
        assert_eq!(merged.roi, Roi::new(0, 0, 540, 960));
        assert!(merged.covers_left);
    }

    #[test]
    fn test_empty_when_either_dimension_is_zero() {
        assert!(Roi::new(5, 5, 0, 10).is_empty());
        assert!(Roi::new(5, 5, 10, 0).is_empty());
        assert!(!Roi::full(1080, 1920).is_empty());
    }

    #[cfg(feature = "graphics")]
    #[test]
    fn test_from_rectangle_clamps_negative_origin() {
        use embedded_graphics_core::geometry::{Point, Size};
        use embedded_graphics_core::primitives::Rectangle;

        let rect = Rectangle::new(Point::new(-4, 12), Size::new(64, 32));
        assert_eq!(Roi::from(rect), Roi::new(0, 12, 64, 32));
    }
}
