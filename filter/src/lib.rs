//! Packet filtering: a compiled-BPF processor and a native rendition of the
//! same default directional policy, per §4.G/§6.

pub mod bpf;
pub mod default;
pub mod native;

pub use bpf::{BpfError, BpfProcessor};
pub use native::{DefaultPolicyProcessor, Direction};
