//! Boundary with the transport layer: decoded protocol types, the inbound
//! command queue, and the session that ties them to the simulation.

pub mod command_buffer;
pub mod protocol;
pub mod session;
