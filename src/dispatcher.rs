//! Command dispatch over one or two DSI links
//!
//! The [`Dispatcher`] owns the physical links of a panel and decides which
//! link sends a sequence, and in what order, from the panel's routing
//! policy:
//!
//! - **command-by-left**: on a split panel only the left link transmits
//! - **sync-wait**: the two links latch together when the trigger link
//!   sends, so the other link is always sent first
//!
//! It also keeps the last partial-update region per link, so an unchanged
//! region is never re-addressed.

use alloc::vec::Vec;

use crate::command::Command;
use crate::error::Error;
use crate::interface::{DsiLink, TxRequest};
use crate::roi::{self, Roi, RoiRequest};
use crate::sequence::{CommandSequence, LinkState};

type DispatchResult<T, E> = core::result::Result<T, Error<E>>;

/// Which physical link a controller drives
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkRole {
    /// The only link of a single-link panel
    #[default]
    Single,
    /// Left half of a split panel
    Left,
    /// Right half of a split panel
    Right,
}

/// Links selected for a send
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Target {
    /// Left link only (the single link of a single-link panel)
    Left,
    /// Right link only
    Right,
    /// Every link the routing policy allows
    #[default]
    Both,
}

/// Synchronized broadcast between the two links of a split panel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncWait {
    /// Link whose send commits both
    pub trigger: LinkRole,
}

impl Default for SyncWait {
    fn default() -> Self {
        Self {
            trigger: LinkRole::Right,
        }
    }
}

/// Physical links of a panel
#[derive(Debug)]
pub enum Links<L> {
    /// Single-link panel
    Single(L),
    /// Dual-link (split) panel
    Split {
        /// Left link
        left: L,
        /// Right link
        right: L,
    },
}

/// Routing policy for a panel's links
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Only the left link of a split panel sends commands
    pub cmd_by_left: bool,
    /// Synchronized broadcast, if enabled
    pub sync_wait: Option<SyncWait>,
    /// Combine the two halves of a partial update into one region
    pub roi_merge: bool,
    /// Horizontal resolution of the left link
    pub left_xres: u16,
}

/// Sends command sequences to the panel's links
#[derive(Debug)]
pub struct Dispatcher<L> {
    links: Links<L>,
    policy: RoutingPolicy,
    /// Last region addressed, indexed by [`slot`]
    roi: [Roi; 2],
}

fn slot(role: LinkRole) -> usize {
    match role {
        LinkRole::Single | LinkRole::Left => 0,
        LinkRole::Right => 1,
    }
}

impl<L: DsiLink> Dispatcher<L> {
    /// Create a dispatcher over `links`
    pub fn new(links: Links<L>, policy: RoutingPolicy) -> Self {
        Self {
            links,
            policy,
            roi: [Roi::default(); 2],
        }
    }

    /// Routing policy in effect
    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Whether the panel has two links
    pub fn is_split(&self) -> bool {
        matches!(self.links, Links::Split { .. })
    }

    /// Borrow the links
    pub fn links(&self) -> &Links<L> {
        &self.links
    }

    /// Mutably borrow the links
    pub fn links_mut(&mut self) -> &mut Links<L> {
        &mut self.links
    }

    /// Release the links
    pub fn release(self) -> Links<L> {
        self.links
    }

    /// Last region addressed on `role`
    pub fn stored_roi(&self, role: LinkRole) -> Roi {
        self.roi[slot(role)]
    }

    /// Forget the stored regions, so the next update is always sent
    pub fn reset_roi(&mut self) {
        self.roi = [Roi::default(); 2];
    }

    /// Links that transmit for `target`, in transmission order
    pub fn route(&self, target: Target) -> Vec<LinkRole> {
        if !self.is_split() {
            return alloc::vec![LinkRole::Single];
        }
        if self.policy.cmd_by_left {
            return alloc::vec![LinkRole::Left];
        }
        match target {
            Target::Left => alloc::vec![LinkRole::Left],
            Target::Right => alloc::vec![LinkRole::Right],
            Target::Both => match self.policy.sync_wait {
                Some(SyncWait {
                    trigger: LinkRole::Left,
                }) => alloc::vec![LinkRole::Right, LinkRole::Left],
                _ => alloc::vec![LinkRole::Left, LinkRole::Right],
            },
        }
    }

    /// Send a parsed sequence
    ///
    /// Empty sequences are skipped without touching the links.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] from the first link that fails; links
    /// after it in the routing order are not sent to.
    pub fn send(
        &mut self,
        sequence: &CommandSequence,
        target: Target,
    ) -> DispatchResult<(), L::Error> {
        if sequence.is_empty() {
            return Ok(());
        }
        self.send_commands(sequence.commands(), sequence.link_state(), target)
    }

    /// Send ad-hoc commands
    pub fn send_commands(
        &mut self,
        commands: &[Command],
        link_state: LinkState,
        target: Target,
    ) -> DispatchResult<(), L::Error> {
        let route = self.route(target);
        let unicast = route.len() == 1 && self.is_split();
        for role in route {
            let mut request = TxRequest::new(link_state);
            if unicast {
                request = request.unicast();
            }
            log::debug!(
                "dispatch: {:?} cmds={} first={:?} {:?}",
                role,
                commands.len(),
                commands.first().and_then(Command::opcode),
                link_state
            );
            self.link_mut(role)
                .transmit(commands, request)
                .map_err(Error::Transport)?;
        }
        Ok(())
    }

    /// Read a register through the command link
    ///
    /// Reads go to the left (or only) link.
    pub fn read(&mut self, command: &Command, buf: &mut [u8]) -> DispatchResult<usize, L::Error> {
        let role = self.primary();
        let request = TxRequest::new(LinkState::LowPower).unicast();
        let n = self
            .link_mut(role)
            .read(command, request, buf)
            .map_err(Error::Transport)?;
        log::debug!("read: {:?} reg={:?} got {} bytes", role, command.opcode(), n);
        Ok(n)
    }

    /// Bus turnaround on every link that sends commands
    pub fn bus_turnaround(&mut self) -> DispatchResult<(), L::Error> {
        for role in self.route(Target::Both) {
            self.link_mut(role)
                .bus_turnaround()
                .map_err(Error::Transport)?;
        }
        Ok(())
    }

    /// Address a partial update
    ///
    /// Returns whether column/page addressing was sent. A region equal to
    /// the stored one sends nothing; an empty region is stored but not sent.
    ///
    /// A [`RoiRequest::Single`] on a split panel is treated as a left-only
    /// update. A [`RoiRequest::Split`] on a single-link panel is merged into
    /// one region.
    pub fn update_roi(&mut self, request: RoiRequest) -> DispatchResult<bool, L::Error> {
        let (left, right) = match request {
            RoiRequest::Single(roi) => (roi, Roi::default()),
            RoiRequest::Split { left, right } => (left, right),
        };

        if !self.is_split() {
            let roi = match request {
                RoiRequest::Single(roi) => roi,
                RoiRequest::Split { .. } => roi::merge(left, right, self.policy.left_xres).roi,
            };
            return self.address(LinkRole::Single, LinkRole::Single, roi);
        }

        if self.policy.roi_merge {
            let merged = roi::merge(left, right, self.policy.left_xres);
            let via = if self.policy.cmd_by_left || merged.covers_left {
                LinkRole::Left
            } else {
                LinkRole::Right
            };
            return self.address(LinkRole::Left, via, merged.roi);
        }

        if self.policy.cmd_by_left {
            return self.address(LinkRole::Left, LinkRole::Left, left);
        }

        let mut sent = false;
        for role in self.route(Target::Both) {
            let roi = if role == LinkRole::Right { right } else { left };
            sent |= self.address(role, role, roi)?;
        }
        Ok(sent)
    }

    /// Compare `roi` against the region stored for `slot_role`, store it,
    /// and address it through `via` when it changed and is not empty
    fn address(
        &mut self,
        slot_role: LinkRole,
        via: LinkRole,
        roi: Roi,
    ) -> DispatchResult<bool, L::Error> {
        let stored = &mut self.roi[slot(slot_role)];
        if *stored == roi {
            return Ok(false);
        }
        *stored = roi;
        if roi.is_empty() {
            log::debug!("roi: {:?} no partial region set", slot_role);
            return Ok(false);
        }

        log::debug!(
            "roi: {:?} x={} y={} w={} h={}",
            via,
            roi.x,
            roi.y,
            roi.w,
            roi.h
        );
        let mut request = TxRequest::new(LinkState::HighSpeed);
        if self.is_split() {
            request = request.unicast();
        }
        self.link_mut(via)
            .transmit(&roi.address_commands(), request)
            .map_err(Error::Transport)?;
        Ok(true)
    }

    fn primary(&self) -> LinkRole {
        if self.is_split() {
            LinkRole::Left
        } else {
            LinkRole::Single
        }
    }

    fn link_mut(&mut self, role: LinkRole) -> &mut L {
        match (&mut self.links, role) {
            (Links::Single(link), _) => link,
            (Links::Split { right, .. }, LinkRole::Right) => right,
            (Links::Split { left, .. }, _) => left,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{DCS_SET_COLUMN_ADDRESS, DCS_SET_DISPLAY_BRIGHTNESS};
    use crate::mock::{Log, MockLink, new_log};

    fn split(policy: RoutingPolicy) -> (Dispatcher<MockLink>, Log) {
        let log = new_log();
        let links = Links::Split {
            left: MockLink::new(LinkRole::Left, &log),
            right: MockLink::new(LinkRole::Right, &log),
        };
        (Dispatcher::new(links, policy), log)
    }

    fn single() -> (Dispatcher<MockLink>, Log) {
        let log = new_log();
        let links = Links::Single(MockLink::new(LinkRole::Single, &log));
        (Dispatcher::new(links, RoutingPolicy::default()), log)
    }

    fn brightness() -> CommandSequence {
        CommandSequence::from_commands(
            alloc::vec![Command::dcs_short_write(DCS_SET_DISPLAY_BRIGHTNESS, 0x40)],
            LinkState::HighSpeed,
        )
    }

    fn links_in_log(log: &Log) -> Vec<LinkRole> {
        log.borrow().iter().map(|s| s.link).collect()
    }

    #[test]
    fn test_cmd_by_left_only_sends_on_left() {
        let (mut d, log) = split(RoutingPolicy {
            cmd_by_left: true,
            sync_wait: Some(SyncWait::default()),
            ..RoutingPolicy::default()
        });
        d.send(&brightness(), Target::Both).unwrap();
        assert_eq!(links_in_log(&log), alloc::vec![LinkRole::Left]);
        assert!(log.borrow()[0].request.unicast);
    }

    #[test]
    fn test_sync_wait_sends_trigger_last() {
        let (mut d, log) = split(RoutingPolicy {
            sync_wait: Some(SyncWait {
                trigger: LinkRole::Left,
            }),
            ..RoutingPolicy::default()
        });
        d.send(&brightness(), Target::Both).unwrap();
        assert_eq!(
            links_in_log(&log),
            alloc::vec![LinkRole::Right, LinkRole::Left]
        );
    }

    #[test]
    fn test_default_trigger_is_right() {
        let (mut d, log) = split(RoutingPolicy {
            sync_wait: Some(SyncWait::default()),
            ..RoutingPolicy::default()
        });
        d.send(&brightness(), Target::Both).unwrap();
        assert_eq!(
            links_in_log(&log),
            alloc::vec![LinkRole::Left, LinkRole::Right]
        );
    }

    #[test]
    fn test_send_stops_at_failing_link() {
        let (mut d, log) = split(RoutingPolicy::default());
        if let Links::Split { left, .. } = d.links_mut() {
            left.fail_transmit = true;
        }
        let result = d.send(&brightness(), Target::Both);
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_empty_sequence_is_not_sent() {
        let (mut d, log) = single();
        d.send(&CommandSequence::default(), Target::Both).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_identical_roi_is_sent_once() {
        let (mut d, log) = single();
        let roi = RoiRequest::Single(Roi::new(0, 0, 100, 100));
        assert!(d.update_roi(roi).unwrap());
        assert!(!d.update_roi(roi).unwrap());
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(
            log.borrow()[0].opcodes(),
            alloc::vec![DCS_SET_COLUMN_ADDRESS, 0x2B]
        );
    }

    #[test]
    fn test_zero_sized_roi_after_nonzero_sends_nothing() {
        let (mut d, log) = single();
        d.update_roi(RoiRequest::Single(Roi::new(0, 0, 100, 100)))
            .unwrap();
        log.borrow_mut().clear();

        assert!(!d.update_roi(RoiRequest::Single(Roi::new(0, 0, 0, 100))).unwrap());
        assert!(!d.update_roi(RoiRequest::Single(Roi::new(0, 0, 100, 0))).unwrap());
        assert!(log.borrow().is_empty());
        assert_eq!(d.stored_roi(LinkRole::Single), Roi::new(0, 0, 100, 0));
    }

    #[test]
    fn test_merged_right_only_roi_goes_to_right_link() {
        let (mut d, log) = split(RoutingPolicy {
            roi_merge: true,
            left_xres: 540,
            ..RoutingPolicy::default()
        });
        let sent = d
            .update_roi(RoiRequest::Split {
                left: Roi::default(),
                right: Roi::new(0, 0, 100, 50),
            })
            .unwrap();

        assert!(sent);
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].link, LinkRole::Right);
        assert_eq!(log[0].commands[0].payload(), &[0x2A, 0x02, 0x1C, 0x02, 0x7F]);
        assert_eq!(d.stored_roi(LinkRole::Left), Roi::new(540, 0, 100, 50));
    }

    #[test]
    fn test_merged_roi_covering_left_goes_to_left_link() {
        let (mut d, log) = split(RoutingPolicy {
            roi_merge: true,
            left_xres: 540,
            ..RoutingPolicy::default()
        });
        d.update_roi(RoiRequest::Split {
            left: Roi::new(500, 0, 40, 50),
            right: Roi::new(0, 0, 60, 50),
        })
        .unwrap();

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].link, LinkRole::Left);
        assert_eq!(d.stored_roi(LinkRole::Left), Roi::new(500, 0, 100, 50));
    }

    #[test]
    fn test_merged_right_only_roi_with_cmd_by_left_goes_to_left() {
        let (mut d, log) = split(RoutingPolicy {
            roi_merge: true,
            cmd_by_left: true,
            left_xres: 540,
            ..RoutingPolicy::default()
        });
        d.update_roi(RoiRequest::Split {
            left: Roi::default(),
            right: Roi::new(0, 0, 100, 50),
        })
        .unwrap();
        assert_eq!(links_in_log(&log), alloc::vec![LinkRole::Left]);
    }

    #[test]
    fn test_unmerged_split_roi_compares_per_link() {
        let (mut d, log) = split(RoutingPolicy::default());
        let request = RoiRequest::Split {
            left: Roi::new(0, 0, 540, 10),
            right: Roi::new(0, 0, 540, 10),
        };
        assert!(d.update_roi(request).unwrap());
        assert_eq!(
            links_in_log(&log),
            alloc::vec![LinkRole::Left, LinkRole::Right]
        );

        log.borrow_mut().clear();
        d.update_roi(RoiRequest::Split {
            left: Roi::new(0, 0, 540, 10),
            right: Roi::new(0, 20, 540, 10),
        })
        .unwrap();
        assert_eq!(links_in_log(&log), alloc::vec![LinkRole::Right]);
    }

    #[test]
    fn test_read_uses_left_link() {
        let (mut d, log) = split(RoutingPolicy::default());
        if let Links::Split { left, .. } = d.links_mut() {
            left.responses.borrow_mut().push_back(alloc::vec![0x9C]);
        }
        let mut buf = [0u8; 1];
        let n = d
            .read(&Command::dcs_read(0x0A, 0x00), &mut buf)
            .unwrap();
        assert_eq!((n, buf[0]), (1, 0x9C));
        assert_eq!(links_in_log(&log), alloc::vec![LinkRole::Left]);
    }
}
