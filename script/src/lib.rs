//! Embeds a Lua interpreter and exposes the pipeline-building primitives —
//! netmap producers/consumers, BPF and predicate processors, `pipe_start` /
//! `pipe_wait` — as the `brilter` global table, matching the original
//! `script.c` entry point.
//!
//! # Concurrency
//!
//! A Lua interpreter is not thread-safe, so exactly one thread ever touches
//! it: the thread running `script_execute`. A scripted pipe still gets its
//! own OS thread the same way a native pipe does (`brilter_pipeline::pipe_start`),
//! but its `PredicateProcessor` never calls into `Lua` directly — it sends
//! the packet bytes and a reference to the stashed predicate function over
//! a channel to the main thread and blocks for the boolean reply (see
//! `handles::PredicateRequest`). The main thread services that channel
//! whenever it would otherwise just be blocking: inside `pipe_wait` (see
//! `api::service_while_running`) and, after the script body itself returns,
//! in the drain loop below, for any pipes the script started but never
//! waited on. An earlier revision shared the interpreter behind
//! `Arc<Mutex<Lua>>` and had pipe threads lock it directly; that design
//! deadlocked as soon as a script called `pipe_wait` on a pipe using a
//! predicate processor, since the waiting thread held the lock the pipe's
//! own predicate calls needed to proceed. Routing every per-packet call
//! through the main thread removes the lock entirely.

mod api;
mod error;
mod handles;
mod packet;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use error::ScriptError;

use api::ScriptShared;

/// Load and run the script at `path` to completion.
///
/// The interpreter's globals are never torn down: running a script is a
/// one-shot, process-lifetime operation (mirroring the netmap handle
/// registry's "opened once, never closed" lifecycle), and the closures
/// registered on the `brilter` table hold a strong reference back to the
/// `Lua` that owns them. That cycle is intentional — it is reclaimed only
/// when the process exits.
pub fn script_execute(path: &Path, shutdown: Arc<AtomicBool>) -> Result<(), ScriptError> {
    let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read { path: path.to_path_buf(), source })?;

    let lua = mlua::Lua::new();
    let (requests_tx, requests_rx) = std::sync::mpsc::channel();
    let requests_rx = Arc::new(Mutex::new(requests_rx));
    let live_unwaited_pipes = Arc::new(AtomicUsize::new(0));

    api::install(
        &lua,
        ScriptShared {
            shutdown,
            requests_tx,
            requests_rx: Arc::clone(&requests_rx),
            live_unwaited_pipes: Arc::clone(&live_unwaited_pipes),
        },
    )?;

    tracing::info!(path = %path.display(), "running script");
    lua.load(&source).set_name(path.display().to_string()).exec()?;

    // Pipes the script started but never `pipe_wait`ed on keep running
    // until process exit (§5's "pipelines run until process exit"); keep
    // servicing their predicate calls rather than returning and abandoning
    // them to a permanently-blocked `requests.send`.
    let requests_rx = requests_rx.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    while live_unwaited_pipes.load(Ordering::Acquire) > 0 {
        match requests_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(request) => {
                let result = handles::evaluate_request(&lua, &request);
                let _ = request.reply.send(result);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}
