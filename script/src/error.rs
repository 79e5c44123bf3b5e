//! Errors raised while loading or running a script, matching the shape of
//! the other crates' per-module `thiserror` enums.

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("could not read script {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("script error: {0}")]
    Lua(#[from] mlua::Error),
}
