//! The default BPF expressions (§6), used by entry-point shape `(b)` when no
//! operator-supplied `-I`/`-O` filter is given.
//!
//! The `/112` prefix below is the historical source's literal text; the
//! intent is `/10` (see [`brilter_net::ipv6::is_link_local`], which is what
//! [`crate::native::DefaultPolicyProcessor`] actually tests). Both are kept
//! side by side on purpose rather than "fixed" — see `DESIGN.md`.

const BASE: &str = "(ip6 src net fe80::/112 and ip6 dst net fe80::/112) || (ip6 multicast) || (icmp6)";

/// Default filter for a pipe carrying traffic into the LAN side.
pub fn inbound() -> String {
    format!(
        "({BASE} || ((ip6 proto \\tcp) && (!(tcp[tcpflags] & (tcp-syn | tcp-ack) == tcp-syn) || (tcp dst port 22))))"
    )
}

/// Default filter for a pipe carrying traffic out to the WAN side.
pub fn outbound() -> String {
    format!("({BASE} || (ip6 proto \\tcp))")
}
