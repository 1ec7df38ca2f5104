//! Rust implementation of the TIPC socket layer
//!
//! Connection-oriented and connectionless sockets over a node/link
//! transport and a cluster name table. The transport and the name table are
//! collaborators behind traits; an in-process fabric and name table are
//! included so several nodes can run inside one process.

pub mod components;
pub mod config;
pub mod diag;
pub mod error;
pub mod loopback;
pub mod name_table;
pub mod net;
pub mod state;
pub mod table;
pub mod tipc_in;
pub mod tipc_out;
pub mod tipc_proto;
pub mod tipc_types;
pub mod transport;
pub mod wait;

mod tipc_api;
mod tipc_io;
mod tipc_sock;
mod timer;

pub use config::SockConfig;
pub use diag::{ConnInfo, DumpCursor, PublCursor, SockDumpEntry, SockStats};
pub use error::{SockError, SockResult};
pub use loopback::Loopback;
pub use name_table::LocalNameTable;
pub use net::TipcNet;
pub use state::SockState;
pub use tipc_sock::TipcSock;
pub use tipc_types::*;
