//! Recording link shared by the unit tests

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::command::Command;
use crate::dispatcher::LinkRole;
use crate::interface::{DsiLink, TearSignal, TxRequest};

/// One transmit call as seen by a link
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Sent {
    pub link: LinkRole,
    pub commands: Vec<Command>,
    pub request: TxRequest,
}

impl Sent {
    /// Opcodes of the sent commands, in order
    pub fn opcodes(&self) -> Vec<u8> {
        self.commands.iter().filter_map(Command::opcode).collect()
    }
}

pub(crate) type Log = Rc<RefCell<Vec<Sent>>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MockError;

pub(crate) struct MockLink {
    pub role: LinkRole,
    pub log: Log,
    pub responses: Rc<RefCell<VecDeque<Vec<u8>>>>,
    pub fail_transmit: bool,
    pub fail_bta: bool,
}

impl MockLink {
    pub fn new(role: LinkRole, log: &Log) -> Self {
        Self {
            role,
            log: log.clone(),
            responses: Rc::new(RefCell::new(VecDeque::new())),
            fail_transmit: false,
            fail_bta: false,
        }
    }
}

impl DsiLink for MockLink {
    type Error = MockError;

    fn transmit(&mut self, commands: &[Command], request: TxRequest) -> Result<(), MockError> {
        if self.fail_transmit {
            return Err(MockError);
        }
        self.log.borrow_mut().push(Sent {
            link: self.role,
            commands: commands.to_vec(),
            request,
        });
        Ok(())
    }

    fn read(
        &mut self,
        command: &Command,
        request: TxRequest,
        buf: &mut [u8],
    ) -> Result<usize, MockError> {
        self.log.borrow_mut().push(Sent {
            link: self.role,
            commands: alloc::vec![command.clone()],
            request,
        });
        let response = self.responses.borrow_mut().pop_front().unwrap_or_default();
        let n = response.len().min(buf.len());
        buf[..n].copy_from_slice(&response[..n]);
        Ok(n)
    }

    fn bus_turnaround(&mut self) -> Result<(), MockError> {
        if self.fail_bta { Err(MockError) } else { Ok(()) }
    }
}

pub(crate) fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

/// Tear signal answering from a script, then timing out
pub(crate) struct ScriptedTear(pub VecDeque<bool>);

impl TearSignal for ScriptedTear {
    type Error = MockError;

    fn wait_for_pulse(&mut self, _timeout_ms: u32) -> Result<bool, MockError> {
        Ok(self.0.pop_front().unwrap_or(false))
    }
}
