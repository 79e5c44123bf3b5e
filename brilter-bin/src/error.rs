//! The binary crate's top-level error, aggregating every module's typed
//! error via `#[from]`, matching the fan-in style the other crates use for
//! their own per-module enums.

#[derive(Debug, thiserror::Error)]
pub enum BrilterError {
    #[error(transparent)]
    Netmap(#[from] brilter_netmap::NetmapError),

    #[error(transparent)]
    Bpf(#[from] brilter_filter::BpfError),

    #[error(transparent)]
    Script(#[from] brilter_script::ScriptError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("failed to install SIGINT/SIGTERM handler: {0}")]
    SignalHandler(#[from] ctrlc::Error),
}
