//! `brilter`: either bridge two interfaces under a directional filtering
//! policy (`brilter run`), or let a Lua script wire up its own pipes
//! (`brilter script`).

mod cli;
mod error;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use brilter_filter::{BpfProcessor, DefaultPolicyProcessor, Direction};
use brilter_packet::{Consumer, Processor};
use brilter_pipeline::{PipeSpec, pipe_start, pipe_wait};

use cli::{Cli, Command, InterfaceName};
use error::BrilterError;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_thread_names(true)
        .init();
}

fn daemonize() -> std::io::Result<()> {
    let rv = unsafe { libc::daemon(0, 0) };
    if rv == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Build the two directional processors for `brilter run`, per entry-point
/// shape 4.J(1): the built-in native policy when neither `-I`/`-O` is given,
/// otherwise a pcap-expression processor per side (falling back to the
/// default filter strings for whichever side has no override).
fn processors(
    inbound_filter: Option<&str>,
    outbound_filter: Option<&str>,
) -> Result<(Box<dyn Processor + Send>, Box<dyn Processor + Send>), BrilterError> {
    if inbound_filter.is_none() && outbound_filter.is_none() {
        return Ok((
            Box::new(DefaultPolicyProcessor::new(Direction::Inbound)),
            Box::new(DefaultPolicyProcessor::new(Direction::Outbound)),
        ));
    }

    let inbound_expr = inbound_filter.map_or_else(brilter_filter::default::inbound, str::to_string);
    let outbound_expr = outbound_filter.map_or_else(brilter_filter::default::outbound, str::to_string);

    let inbound: Box<dyn Processor + Send> = Box::new(BpfProcessor::compile(&inbound_expr)?);
    let outbound: Box<dyn Processor + Send> = Box::new(BpfProcessor::compile(&outbound_expr)?);
    Ok((inbound, outbound))
}

fn run(lan: &InterfaceName, wan: &InterfaceName, inbound_filter: Option<&str>, outbound_filter: Option<&str>, shutdown: Arc<AtomicBool>) -> Result<(), BrilterError> {
    tracing::info!(lan = %lan, wan = %wan, "opening consumers");
    let lan_consumer: Box<dyn Consumer + Send> = Box::new(brilter_netmap::consumer(lan.as_str())?);
    let wan_consumer: Box<dyn Consumer + Send> = Box::new(brilter_netmap::consumer(wan.as_str())?);

    tracing::info!(lan = %lan, wan = %wan, "opening producers");
    let lan_producer = brilter_netmap::producer(lan.as_str(), Arc::clone(&shutdown))?;
    let wan_producer = brilter_netmap::producer(wan.as_str(), Arc::clone(&shutdown))?;

    let (inbound_processor, outbound_processor) = processors(inbound_filter, outbound_filter)?;

    tracing::info!(lan = %lan, wan = %wan, "starting outbound pipe");
    let outbound = pipe_start(PipeSpec::with_shutdown("outbound", Box::new(lan_producer), outbound_processor, wan_consumer, Arc::clone(&shutdown)))?;

    tracing::info!(lan = %lan, wan = %wan, "starting inbound pipe");
    let inbound = pipe_start(PipeSpec::with_shutdown("inbound", Box::new(wan_producer), inbound_processor, lan_consumer, Arc::clone(&shutdown)))?;

    tracing::info!("pipes started");
    pipe_wait(outbound);
    pipe_wait(inbound);
    tracing::info!("pipes finished");
    Ok(())
}

fn execute(cli: Cli) -> Result<(), BrilterError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = Arc::clone(&shutdown);
    ctrlc::set_handler(move || handler_shutdown.store(true, Ordering::Release))?;

    match cli.command {
        Command::Run { lan, wan, inbound_filter, outbound_filter, daemonize: should_daemonize } => {
            if should_daemonize {
                daemonize()?;
            }
            run(&lan, &wan, inbound_filter.as_deref(), outbound_filter.as_deref(), shutdown)
        }
        Command::Script { path, daemonize: should_daemonize } => {
            if should_daemonize {
                daemonize()?;
            }
            brilter_script::script_execute(&path, shutdown).map_err(BrilterError::from)
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match execute(cli) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            std::process::exit(1);
        }
    }
}
