//! One OS thread per pipe, each running `producer.produce(processor,
//! consumer)` in a loop — the `pipe_start`/`pipe_wait` pair from §4.H,
//! expressed through `brilter-driver`'s [`Start`]/[`Stop`] typestate so a
//! pipe cannot be joined before it is started.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use brilter_driver::{Start, Stop};
use brilter_packet::{Consumer, Processor, Producer};

/// A not-yet-running pipe: a producer, a processor, and a consumer, wired
/// together but not yet given a thread.
pub struct PipeSpec {
    pub name: String,
    pub producer: Box<dyn Producer + Send>,
    pub processor: Box<dyn Processor + Send>,
    pub consumer: Box<dyn Consumer + Send>,
    pub shutdown: Arc<AtomicBool>,
}

impl PipeSpec {
    /// A pipe whose worker loop only stops when its producer panics (or is
    /// otherwise killed) — the shutdown flag is private to this `PipeSpec`
    /// and nothing else ever sets it. This is what the unit tests below use:
    /// their producers terminate the thread by panicking after a fixed
    /// number of calls instead of observing shutdown.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        producer: Box<dyn Producer + Send>,
        processor: Box<dyn Processor + Send>,
        consumer: Box<dyn Consumer + Send>,
    ) -> Self {
        Self::with_shutdown(name, producer, processor, consumer, Arc::new(AtomicBool::new(false)))
    }

    /// A pipe whose worker loop also breaks as soon as `shutdown` is
    /// observed true after a `produce` call returns — the counterpart a
    /// caller wires up when it wants Ctrl-C (or an equivalent signal) to
    /// unwind this pipe's thread instead of running until process exit.
    /// Passing the same `Arc` a netmap `Producer` already polls internally
    /// (see `brilter_netmap::RxEnd::produce`) means the thread actually
    /// terminates once `produce` returns, instead of being called again.
    #[must_use]
    pub fn with_shutdown(
        name: impl Into<String>,
        producer: Box<dyn Producer + Send>,
        processor: Box<dyn Processor + Send>,
        consumer: Box<dyn Consumer + Send>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        PipeSpec { name: name.into(), producer, processor, consumer, shutdown }
    }
}

/// A pipe whose worker thread is running.
pub struct RunningPipe {
    name: String,
    handle: JoinHandle<()>,
}

impl RunningPipe {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker thread has already terminated, either because it
    /// panicked or because `produce` returned with shutdown requested.
    /// Scripted callers poll this to interleave servicing other work while
    /// `pipe_wait`s.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Start for PipeSpec {
    type Started = RunningPipe;
    type Error = std::io::Error;

    /// Spawns the pipe's worker thread. The thread body is `pipe_main`'s
    /// `for (;;) producer->p_produce(...)`, with one addition: after each
    /// `produce` call returns, the loop checks `shutdown` and stops instead
    /// of calling `produce` again. Most producers (netmap's included) never
    /// return from `produce` except when shutdown has been requested, so in
    /// the common case this check only ever fires once, right before the
    /// thread would otherwise exit anyway; without it, a producer that
    /// returns because shutdown was requested gets called again immediately,
    /// spinning the thread instead of letting it terminate.
    fn start(self) -> Result<RunningPipe, std::io::Error> {
        let PipeSpec { name, mut producer, mut processor, mut consumer, shutdown } = self;
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            loop {
                producer.produce(processor.as_mut(), consumer.as_mut());
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
            }
        })?;
        Ok(RunningPipe { name, handle })
    }
}

impl Stop for RunningPipe {
    type Outcome = ();
    type Error = Box<dyn std::any::Any + Send + 'static>;

    /// `pipe_wait`: an unbounded join. Pipes never signal their own
    /// completion, so this only returns once the process is tearing down or
    /// the worker thread has panicked.
    fn stop(self) -> Result<(), Self::Error> {
        self.handle.join()
    }
}

/// Spawn a pipe's worker thread, matching `pipe_start`.
pub fn pipe_start(spec: PipeSpec) -> std::io::Result<RunningPipe> {
    spec.start()
}

/// Join a pipe's worker thread, matching `pipe_wait`.
pub fn pipe_wait(pipe: RunningPipe) {
    if let Err(panic) = pipe.stop() {
        tracing::error!(?panic, "pipe worker thread panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brilter_packet::Packet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A producer that hands the processor one fixed batch per call, then
    /// panics once it has been called `limit` times — standing in for a
    /// shutdown signal so the worker thread actually terminates in a test.
    struct CountingProducer {
        calls: Arc<AtomicUsize>,
        limit: usize,
    }

    impl Producer for CountingProducer {
        fn produce(&mut self, processor: &mut dyn Processor, consumer: &mut dyn Consumer) {
            let seen = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if seen > self.limit {
                panic!("shutdown");
            }
            let frame = [0u8; 4];
            let mut batch = [Packet::new(&frame)];
            processor.process(&mut batch, consumer);
        }
    }

    struct PassthroughProcessor;

    impl Processor for PassthroughProcessor {
        fn process(&mut self, batch: &mut [Packet<'_>], consumer: &mut dyn Consumer) {
            consumer.consume(batch);
        }
    }

    #[derive(Default)]
    struct CountingConsumer {
        delivered: Arc<AtomicUsize>,
    }

    impl Consumer for CountingConsumer {
        fn consume(&mut self, batch: &[Packet<'_>]) {
            self.delivered.fetch_add(batch.len(), Ordering::SeqCst);
        }
    }

    #[test]
    fn pipe_runs_until_producer_stops_and_join_observes_it() {
        let calls = Arc::new(AtomicUsize::new(0));
        let delivered = Arc::new(AtomicUsize::new(0));

        let spec = PipeSpec::new(
            "test-pipe",
            Box::new(CountingProducer { calls: Arc::clone(&calls), limit: 3 }),
            Box::new(PassthroughProcessor),
            Box::new(CountingConsumer { delivered: Arc::clone(&delivered) }),
        );

        let pipe = pipe_start(spec).expect("thread spawn should succeed");
        assert_eq!(pipe.name(), "test-pipe");
        pipe_wait(pipe);

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(delivered.load(Ordering::SeqCst), 3);
    }
}
