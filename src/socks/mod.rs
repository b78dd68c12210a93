//! SOCKS5 wire-format codecs
//!
//! Pure encode/decode over byte streams and slices: method negotiation,
//! username/password sub-negotiation, request/reply frames, and the UDP
//! encapsulation header. Nothing in this module touches a socket; every
//! decoder fails with a classifiable [`ProtocolError`](crate::error::ProtocolError).

mod addr;
mod command;
mod consts;
mod datagram;
mod negotiation;

pub use addr::TargetAddr;
pub use command::{parse_reply, write_error_reply, write_reply, Command, Request};
pub use consts::*;
pub use datagram::UdpDatagram;
pub use negotiation::{
    write_method_reply, write_userpass_reply, MethodRequest, UserPassRequest,
};
