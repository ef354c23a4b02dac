//! Simulated radio
//!
//! Like a real transceiver, the radio only remembers the RSSI of the last
//! datagram it received; the simulator sets it right before delivery.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wsn_core::{LinkQualitySource, NodeAddress, SignalSample, TxPowerControl};

/// Radio shared between a node and the simulator
#[derive(Clone, Debug)]
pub struct SimRadio {
    last_rssi: Rc<Cell<i16>>,
    tx_level: Rc<Cell<u8>>,
    history: Rc<RefCell<Vec<u8>>>,
}

impl SimRadio {
    pub fn new(tx_level: u8) -> Self {
        SimRadio {
            last_rssi: Rc::new(Cell::new(0)),
            tx_level: Rc::new(Cell::new(tx_level)),
            history: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Latch the RSSI of the datagram about to be delivered
    pub fn latch_rssi(&self, rssi: i16) {
        self.last_rssi.set(rssi);
    }

    pub fn tx_level(&self) -> u8 {
        self.tx_level.get()
    }

    /// Levels applied by the node, oldest first
    pub fn history(&self) -> Vec<u8> {
        self.history.borrow().clone()
    }
}

impl LinkQualitySource for SimRadio {
    fn sample(&mut self, source: NodeAddress) -> SignalSample {
        SignalSample {
            source,
            rssi: self.last_rssi.get(),
        }
    }
}

impl TxPowerControl for SimRadio {
    fn set_tx_power(&mut self, level: u8) {
        self.tx_level.set(level);
        self.history.borrow_mut().push(level);
    }
}
