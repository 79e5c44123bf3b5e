//! Userdata wrappers handed back to scripts by `brilter.netmap_consumer`,
//! `brilter.netmap_producer`, `brilter.pcap_filter_processor`,
//! `brilter.predicate_processor`, and `brilter.pipe_start`.
//!
//! Each kind gets its own Rust type, so mlua's per-type metatable machinery
//! already gives every handle kind a distinct, named metatable — there is no
//! manual registration step to perform here.
//!
//! A handle can be handed to `pipe_start` exactly once; `take` enforces that
//! the same producer, processor, or consumer userdata cannot be wired into
//! two pipes.

use std::cell::RefCell;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use mlua::{Lua, RegistryKey, UserData};

use brilter_packet::{Consumer, Packet, Processor, process_predicate};
use brilter_pipeline::RunningPipe;

use crate::packet::LuaPacket;

pub struct LuaConsumer(pub RefCell<Option<Box<dyn Consumer + Send>>>);
pub struct LuaProducer(pub RefCell<Option<Box<dyn brilter_packet::Producer + Send>>>);
pub struct LuaProcessor(pub RefCell<Option<Box<dyn Processor + Send>>>);
pub struct LuaPipe(pub RefCell<Option<RunningPipe>>);

impl UserData for LuaConsumer {}
impl UserData for LuaProducer {}
impl UserData for LuaProcessor {}
impl UserData for LuaPipe {}

impl LuaConsumer {
    pub fn take(&self) -> mlua::Result<Box<dyn Consumer + Send>> {
        self.0.borrow_mut().take().ok_or_else(|| mlua::Error::RuntimeError("consumer already used by a pipe".into()))
    }
}

impl LuaProducer {
    pub fn take(&self) -> mlua::Result<Box<dyn brilter_packet::Producer + Send>> {
        self.0.borrow_mut().take().ok_or_else(|| mlua::Error::RuntimeError("producer already used by a pipe".into()))
    }
}

impl LuaProcessor {
    pub fn take(&self) -> mlua::Result<Box<dyn Processor + Send>> {
        self.0.borrow_mut().take().ok_or_else(|| mlua::Error::RuntimeError("processor already used by a pipe".into()))
    }
}

impl LuaPipe {
    pub fn take(&self) -> mlua::Result<RunningPipe> {
        self.0.borrow_mut().take().ok_or_else(|| mlua::Error::RuntimeError("pipe already waited on".into()))
    }
}

/// One per-packet evaluation request sent from a pipe's worker thread to
/// whichever thread is currently driving the interpreter (the script's main
/// thread, inside `pipe_wait` or the post-`exec` drain loop — see
/// `crate::lib`). `bytes` is a copy: the packet's real backing storage is a
/// NIC ring slot or scratch buffer scoped to the worker thread's own batch,
/// and does not outlive the call that sent this request, so it cannot be
/// borrowed across the channel.
pub struct PredicateRequest {
    pub bytes: Vec<u8>,
    pub function: Arc<RegistryKey>,
    pub reply: Sender<Result<bool, String>>,
}

/// Evaluate one stashed predicate function against one packet's bytes. Only
/// ever called from the thread that owns `lua` (see `crate::lib`'s request
/// servicing loop) — never from a pipe's own worker thread.
pub fn evaluate_request(lua: &Lua, request: &PredicateRequest) -> Result<bool, String> {
    let function: mlua::Function = lua.registry_value(&request.function).map_err(|e| e.to_string())?;
    lua.scope(|scope| {
        let packet = scope.create_userdata(LuaPacket(&request.bytes))?;
        match function.call(packet)? {
            mlua::Value::Boolean(b) => Ok(b),
            _ => Err(mlua::Error::RuntimeError("return type of predicate function not boolean".into())),
        }
    })
    .map_err(|e| e.to_string())
}

/// A `Processor` that evaluates a Lua predicate function once per packet.
///
/// The interpreter itself is never shared across threads: it lives
/// exclusively on the script's main thread. A pipe's worker thread calling
/// this `process` does not touch `Lua` directly — it hands the packet bytes
/// and a handle to the stashed predicate function to the main thread over
/// `requests`, then blocks for the boolean reply. This sidesteps the need
/// for any `Mutex<Lua>`: the interpreter is single-threaded in the
/// strictest sense, and the main thread can always make progress servicing
/// requests because `pipe_wait` polls for exactly that (see
/// `crate::api::pipe_wait`) instead of blocking in a plain `JoinHandle::join`.
pub struct PredicateProcessor {
    requests: Sender<PredicateRequest>,
    function: Arc<RegistryKey>,
}

impl PredicateProcessor {
    #[must_use]
    pub fn new(requests: Sender<PredicateRequest>, function: Arc<RegistryKey>) -> Self {
        PredicateProcessor { requests, function }
    }
}

impl Processor for PredicateProcessor {
    /// A script error inside the predicate is fatal to this pipe's worker
    /// thread — `pipe_wait` observes it as a panic and logs it, the way a
    /// native pipeline's fatal ioctl errors propagate to its own thread.
    fn process(&mut self, batch: &mut [Packet<'_>], consumer: &mut dyn Consumer) {
        process_predicate(batch, consumer, |pkt| {
            let (reply_tx, reply_rx) = std::sync::mpsc::channel();
            let request = PredicateRequest { bytes: pkt.bytes().to_vec(), function: Arc::clone(&self.function), reply: reply_tx };
            if self.requests.send(request).is_err() {
                panic!("script interpreter is no longer running to evaluate this predicate");
            }
            match reply_rx.recv() {
                Ok(Ok(pass)) => pass,
                Ok(Err(message)) => panic!("script predicate error: {message}"),
                Err(_) => panic!("script interpreter stopped before replying to predicate call"),
            }
        });
    }
}
