//! Recording transport for tests.
//!
//! [`MockBus`] opens into a [`MockTransport`] that logs every transaction in
//! order. Failures can be injected at open time or at a given transaction
//! number. The log is shared, so it stays readable after the transport has
//! been moved into a driver.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::transport::{OpenBus, Transport};

/// One transaction as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Byte { address: u8, command: u8, value: u8 },
    Block { address: u8, register: u8, data: Vec<u8> },
}

impl Transaction {
    /// The command byte of a [`Transaction::Byte`].
    pub fn command(&self) -> Option<u8> {
        match self {
            Transaction::Byte { command, .. } => Some(*command),
            Transaction::Block { .. } => None,
        }
    }

    /// The payload of a [`Transaction::Block`].
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Transaction::Block { data, .. } => Some(data),
            Transaction::Byte { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockError {
    #[error("bus {0} refused to open")]
    Open(u8),
    #[error("transaction {0} was not acknowledged")]
    Nack(usize),
}

#[derive(Debug, Default)]
struct Shared {
    log: Vec<Transaction>,
    attempts: usize,
    fail_at: Option<usize>,
}

/// Opener handing out a [`MockTransport`]; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    shared: Rc<RefCell<Shared>>,
    refuse_open: bool,
}

impl MockBus {
    /// A bus that opens and acknowledges every write.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus whose open call fails.
    pub fn unavailable() -> Self {
        Self {
            refuse_open: true,
            ..Self::default()
        }
    }

    /// Fail the `n`th transaction (zero-based) after open; it is not logged.
    pub fn failing_at(n: usize) -> Self {
        let bus = Self::default();
        bus.fail_at(Some(n));
        bus
    }

    /// Re-arm (or disarm) the failure point, counted from the next transaction.
    pub fn fail_at(&self, n: Option<usize>) {
        let mut shared = self.shared.borrow_mut();
        shared.fail_at = n.map(|n| shared.attempts + n);
    }

    /// Acknowledged transactions, oldest first.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.shared.borrow().log.clone()
    }

    /// Every transaction attempted, including the failed one.
    pub fn attempts(&self) -> usize {
        self.shared.borrow().attempts
    }

    pub fn reset(&self) {
        let mut shared = self.shared.borrow_mut();
        shared.log.clear();
        shared.attempts = 0;
        shared.fail_at = None;
    }
}

impl OpenBus for MockBus {
    type Transport = MockTransport;

    async fn open(self, bus: u8) -> Result<MockTransport, MockError> {
        if self.refuse_open {
            return Err(MockError::Open(bus));
        }
        Ok(MockTransport {
            shared: self.shared,
        })
    }
}

#[derive(Debug)]
pub struct MockTransport {
    shared: Rc<RefCell<Shared>>,
}

impl MockTransport {
    fn record(&mut self, transaction: Transaction) -> Result<(), MockError> {
        let mut shared = self.shared.borrow_mut();
        let n = shared.attempts;
        shared.attempts += 1;

        if shared.fail_at == Some(n) {
            return Err(MockError::Nack(n));
        }
        shared.log.push(transaction);
        Ok(())
    }
}

impl Transport for MockTransport {
    type Error = MockError;

    async fn write_byte(&mut self, address: u8, command: u8, value: u8) -> Result<(), MockError> {
        self.record(Transaction::Byte {
            address,
            command,
            value,
        })
    }

    async fn write_block(
        &mut self,
        address: u8,
        register: u8,
        data: &[u8],
    ) -> Result<usize, MockError> {
        self.record(Transaction::Block {
            address,
            register,
            data: data.to_vec(),
        })?;
        Ok(data.len())
    }
}
