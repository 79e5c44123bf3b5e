//! Builds the `brilter` global table: `netmap_consumer`, `netmap_producer`,
//! `pcap_filter_processor`, `predicate_processor`, `pipe_start`, and
//! `pipe_wait`, matching the method table `brilter.c`'s original registers
//! on the `brilter` userdata's metatable.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mlua::{AnyUserData, Lua};

use brilter_filter::BpfProcessor;
use brilter_pipeline::{PipeSpec, RunningPipe};

use crate::ScriptError;
use crate::handles::{LuaConsumer, LuaPipe, LuaProcessor, LuaProducer, PredicateProcessor, PredicateRequest, evaluate_request};

/// State the `brilter` table's closures share with `script_execute`'s own
/// post-`exec` drain loop: the send half of the predicate-request channel
/// (cloned into every `PredicateProcessor` built from this script), the
/// receive half (locked only by whichever thread is currently servicing
/// requests — always the main thread, never concurrently), and a count of
/// pipes the script has started but not yet `pipe_wait`ed on.
pub struct ScriptShared {
    pub shutdown: Arc<AtomicBool>,
    pub requests_tx: Sender<PredicateRequest>,
    pub requests_rx: Arc<Mutex<std::sync::mpsc::Receiver<PredicateRequest>>>,
    pub live_unwaited_pipes: Arc<AtomicUsize>,
}

/// Service `requests` — evaluating each against `lua`, which only this
/// thread touches — until `pipe`'s worker thread has terminated. This is
/// what lets a scripted `pipe_wait` block "until the pipe is done" without
/// ever deadlocking against that very pipe's own predicate calls: unlike a
/// bare `JoinHandle::join`, this loop keeps the interpreter progressing.
fn service_while_running(lua: &Lua, requests: &Arc<Mutex<std::sync::mpsc::Receiver<PredicateRequest>>>, pipe: &RunningPipe) {
    let requests = requests.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    while !pipe.is_finished() {
        match requests.recv_timeout(Duration::from_millis(20)) {
            Ok(request) => {
                let result = evaluate_request(lua, &request);
                let _ = request.reply.send(result);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            // No predicate processor is currently live to send a request;
            // that does not mean the pipe itself has finished (it may be a
            // BPF or pass-through processor), so keep polling completion.
            Err(RecvTimeoutError::Disconnected) => {
                while !pipe.is_finished() {
                    std::thread::sleep(Duration::from_millis(20));
                }
                break;
            }
        }
    }
}

pub fn install(lua: &Lua, shared: ScriptShared) -> Result<(), ScriptError> {
    let brilter = lua.create_table()?;

    brilter.set(
        "netmap_consumer",
        lua.create_function(move |_, iface: String| {
            let consumer = brilter_netmap::consumer(&iface)
                .map_err(|e| mlua::Error::RuntimeError(format!("could not open netmap consumer {iface:?}: {e}")))?;
            Ok(LuaConsumer(std::cell::RefCell::new(Some(Box::new(consumer)))))
        })?,
    )?;

    let producer_shutdown = Arc::clone(&shared.shutdown);
    brilter.set(
        "netmap_producer",
        lua.create_function(move |_, iface: String| {
            let producer = brilter_netmap::producer(&iface, Arc::clone(&producer_shutdown))
                .map_err(|e| mlua::Error::RuntimeError(format!("could not open netmap producer {iface:?}: {e}")))?;
            Ok(LuaProducer(std::cell::RefCell::new(Some(Box::new(producer)))))
        })?,
    )?;

    brilter.set(
        "pcap_filter_processor",
        lua.create_function(move |_, filter: String| {
            let processor = BpfProcessor::compile(&filter).map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
            Ok(LuaProcessor(std::cell::RefCell::new(Some(Box::new(processor)))))
        })?,
    )?;

    let requests_tx = shared.requests_tx.clone();
    brilter.set(
        "predicate_processor",
        lua.create_function(move |lua_ctx, function: mlua::Function| {
            let key = lua_ctx.create_registry_value(function)?;
            let processor = PredicateProcessor::new(requests_tx.clone(), Arc::new(key));
            Ok(LuaProcessor(std::cell::RefCell::new(Some(Box::new(processor)))))
        })?,
    )?;

    let live_unwaited_pipes = Arc::clone(&shared.live_unwaited_pipes);
    let pipe_shutdown = Arc::clone(&shared.shutdown);
    brilter.set(
        "pipe_start",
        lua.create_function(move |_, (producer_ud, processor_ud, consumer_ud): (AnyUserData, AnyUserData, AnyUserData)| {
            let producer = producer_ud.borrow::<LuaProducer>()?.take()?;
            let processor = processor_ud.borrow::<LuaProcessor>()?.take()?;
            let consumer = consumer_ud.borrow::<LuaConsumer>()?.take()?;
            let spec = PipeSpec::with_shutdown("script-pipe", producer, processor, consumer, Arc::clone(&pipe_shutdown));
            let running =
                brilter_pipeline::pipe_start(spec).map_err(|e| mlua::Error::RuntimeError(format!("could not start pipe: {e}")))?;
            live_unwaited_pipes.fetch_add(1, Ordering::AcqRel);
            Ok(LuaPipe(std::cell::RefCell::new(Some(running))))
        })?,
    )?;

    let requests_rx = Arc::clone(&shared.requests_rx);
    let live_unwaited_pipes = Arc::clone(&shared.live_unwaited_pipes);
    brilter.set(
        "pipe_wait",
        lua.create_function(move |lua_ctx, pipe_ud: AnyUserData| {
            let running = pipe_ud.borrow::<LuaPipe>()?.take()?;
            service_while_running(lua_ctx, &requests_rx, &running);
            live_unwaited_pipes.fetch_sub(1, Ordering::AcqRel);
            brilter_pipeline::pipe_wait(running);
            Ok(())
        })?,
    )?;

    lua.globals().set("brilter", brilter)?;
    Ok(())
}
