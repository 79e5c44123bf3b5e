//! Minimal protocol value types and header views used by the default
//! bridging policy.
//!
//! Packets handled by this codebase are borrowed byte slices straight out of
//! a NIC ring (see `brilter-packet`); these types read fields out of such a
//! slice without copying or taking ownership of it.

pub mod eth;
pub mod ipv6;
pub mod tcp;

pub use eth::{EtherType, MacAddress};
pub use ipv6::Ipv6View;
pub use tcp::{TcpFlags, TcpView};
