//! Socket State Components
//!
//! This module contains the disjoint per-socket state components:
//! 1. Connection Management - state machine, peer identity, keepalive flag
//! 2. Flow Control - connection windows and unacknowledged counters
//! 3. Congestion Control - congested destination links
//! 4. Publications - name bindings owned by the socket
//! 5. Receive Queue - delivered messages and their buffer charge

mod connection_mgmt;
mod flow_control;
mod congestion_control;
mod publications;
mod rx_queue;

pub use connection_mgmt::ConnectionManagementState;
pub use flow_control::{ConnAck, FlowControlState};
pub use congestion_control::CongestionControlState;
pub use publications::{Publication, PublicationsState};
pub use rx_queue::{RxEntry, RxQueue};
