use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use devlink_transport::{HexDump, Transport};
use tracing::{debug, error, info, trace, warn};

use super::queue::{Priority, PriorityQueue};
use super::{Message, ResultCallback, TimeoutHandler};
use crate::error::{PeerError, Result};

/// Dispatch engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attempts per request when the transport times out.
    pub max_attempts: u32,
    /// Attempt `n` that times out sleeps `retry_backoff * n` before the next.
    pub retry_backoff: Duration,
    /// How long the worker idles between checks while disconnected or empty.
    pub idle_interval: Duration,
    /// Largest response read per request.
    pub response_max_len: usize,
    /// Receive deadline per attempt.
    pub rx_timeout: Duration,
    /// Bound on waiting for the worker to stop.
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(300),
            idle_interval: Duration::from_millis(100),
            response_max_len: 256,
            rx_timeout: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

/// One message plus how to dispatch it.
pub struct DispatchRequest<M> {
    message: M,
    priority: Priority,
    periodic: bool,
    on_result: Option<ResultCallback<M>>,
}

impl<M: Message> DispatchRequest<M> {
    pub fn new(message: M) -> Self {
        Self {
            message,
            priority: Priority::default(),
            periodic: false,
            on_result: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Mark as polling traffic, logged at reduced verbosity.
    pub fn periodic(mut self, periodic: bool) -> Self {
        self.periodic = periodic;
        self
    }

    pub fn on_result(mut self, callback: impl FnOnce(&M, Bytes) + Send + 'static) -> Self {
        self.on_result = Some(Box::new(callback));
        self
    }
}

struct Job<M> {
    message: M,
    frame: Bytes,
    periodic: bool,
    on_result: Option<ResultCallback<M>>,
}

enum Control<A> {
    Connect {
        address: A,
        timeout: Duration,
        reply: mpsc::Sender<devlink_transport::Result<()>>,
    },
    Disconnect,
    Stop,
}

struct Shared<M> {
    queue: PriorityQueue<Job<M>>,
    connected: AtomicBool,
    running: AtomicBool,
}

impl<M: Message> Shared<M> {
    fn submit(&self, request: DispatchRequest<M>) -> bool {
        let DispatchRequest {
            message,
            priority,
            periodic,
            on_result,
        } = request;

        if !self.running.load(Ordering::Acquire) || !self.connected.load(Ordering::Acquire) {
            debug!(?message, "not connected; request dropped");
            return false;
        }
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(?message, error = %err, "malformed request dropped");
                return false;
            }
        };

        self.queue.push(
            Job {
                message,
                frame,
                periodic,
                on_result,
            },
            priority,
        );
        true
    }
}

/// Cloneable producer side of a [`DispatchEngine`].
pub struct DispatchHandle<M> {
    shared: Arc<Shared<M>>,
}

impl<M> Clone for DispatchHandle<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: Message> DispatchHandle<M> {
    /// See [`DispatchEngine::enqueue`].
    pub fn enqueue(
        &self,
        message: M,
        callback: Option<ResultCallback<M>>,
        priority: Priority,
        periodic: bool,
    ) -> bool {
        self.shared.submit(DispatchRequest {
            message,
            priority,
            periodic,
            on_result: callback,
        })
    }

    pub fn submit(&self, request: DispatchRequest<M>) -> bool {
        self.shared.submit(request)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Number of queued requests.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }
}

/// Configures and starts a [`DispatchEngine`].
pub struct EngineBuilder<T, M> {
    transport: T,
    config: EngineConfig,
    on_timeout: Option<TimeoutHandler<M>>,
}

impl<T, M> EngineBuilder<T, M>
where
    T: Transport + 'static,
    M: Message,
{
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Called once for every request whose attempts all timed out.
    pub fn with_timeout_handler(mut self, handler: impl Fn(&M) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(handler));
        self
    }

    /// Start the worker thread. The engine starts disconnected.
    pub fn spawn(self) -> Result<DispatchEngine<T, M>> {
        let shared = Arc::new(Shared {
            queue: PriorityQueue::new(),
            connected: AtomicBool::new(false),
            running: AtomicBool::new(true),
        });
        let (control, commands) = mpsc::channel();

        let worker = Worker {
            transport: self.transport,
            shared: Arc::clone(&shared),
            commands,
            config: self.config.clone(),
            on_timeout: self.on_timeout,
        };
        let worker = thread::Builder::new()
            .name("devlink-dispatch".into())
            .spawn(move || worker.run())
            .map_err(PeerError::Spawn)?;

        Ok(DispatchEngine {
            shared,
            control,
            worker: Some(worker),
            config: self.config,
        })
    }
}

/// Serves a priority queue of requests over one transport on a dedicated
/// worker thread.
///
/// The worker runs for the engine's whole lifetime, independent of the
/// connection state, and is the only code that ever touches the transport.
/// Connecting and disconnecting are forwarded to it as control commands.
///
/// Per request the worker transmits the encoded frame and reads one response
/// of at most `response_max_len` bytes. A response that fails
/// [`Message::check_response`] is logged and dropped. A transport timeout is
/// retried with linear backoff until `max_attempts`, after which the timeout
/// handler runs once. Any other transport error abandons the request.
pub struct DispatchEngine<T: Transport, M> {
    shared: Arc<Shared<M>>,
    control: mpsc::Sender<Control<T::Address>>,
    worker: Option<JoinHandle<()>>,
    config: EngineConfig,
}

impl<T, M> DispatchEngine<T, M>
where
    T: Transport + 'static,
    M: Message,
{
    pub fn builder(transport: T) -> EngineBuilder<T, M> {
        EngineBuilder {
            transport,
            config: EngineConfig::default(),
            on_timeout: None,
        }
    }

    /// Start an engine with default configuration and no timeout handler.
    pub fn spawn(transport: T) -> Result<Self> {
        Self::builder(transport).spawn()
    }

    /// Connect the worker's transport, blocking until it reports back.
    pub fn connect(&self, address: T::Address, timeout: Duration) -> Result<()> {
        let (reply, outcome) = mpsc::channel();
        self.control
            .send(Control::Connect {
                address,
                timeout,
                reply,
            })
            .map_err(|_| PeerError::WorkerStopped)?;
        self.shared.queue.notify_all();
        outcome.recv().map_err(|_| PeerError::WorkerStopped)??;
        Ok(())
    }

    /// Stop accepting requests and close the transport.
    ///
    /// Takes effect for producers immediately; a request already in flight
    /// finishes its current attempt first. Queued requests stay queued and
    /// are served after the next successful connect.
    pub fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::Release);
        let _ = self.control.send(Control::Disconnect);
        self.shared.queue.notify_all();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Queue `message` for dispatch.
    ///
    /// Silently dropped (returning `false`) when the engine is disconnected or
    /// the message fails to encode.
    pub fn enqueue(
        &self,
        message: M,
        callback: Option<ResultCallback<M>>,
        priority: Priority,
        periodic: bool,
    ) -> bool {
        self.handle().enqueue(message, callback, priority, periodic)
    }

    /// Queue a request built with [`DispatchRequest`].
    pub fn submit(&self, request: DispatchRequest<M>) -> bool {
        self.shared.submit(request)
    }

    /// A producer handle usable from other threads.
    pub fn handle(&self) -> DispatchHandle<M> {
        DispatchHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of queued requests.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop the worker, waiting at most `shutdown_timeout` for it.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }
}

impl<T: Transport, M> DispatchEngine<T, M> {
    fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        self.shared.running.store(false, Ordering::Release);
        self.shared.connected.store(false, Ordering::Release);
        let _ = self.control.send(Control::Stop);
        self.shared.queue.notify_all();

        let deadline = Instant::now() + self.config.shutdown_timeout;
        while !worker.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    timeout = ?self.config.shutdown_timeout,
                    "dispatch worker still busy; detaching"
                );
                return Err(PeerError::ShutdownTimeout(self.config.shutdown_timeout));
            }
            thread::sleep(Duration::from_millis(5));
        }
        worker.join().map_err(|_| PeerError::WorkerStopped)?;

        let dropped = self.shared.queue.clear();
        info!(dropped, "dispatch engine stopped");
        Ok(())
    }
}

impl<T: Transport, M> Drop for DispatchEngine<T, M> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct Worker<T: Transport, M> {
    transport: T,
    shared: Arc<Shared<M>>,
    commands: mpsc::Receiver<Control<T::Address>>,
    config: EngineConfig,
    on_timeout: Option<TimeoutHandler<M>>,
}

impl<T: Transport, M: Message> Worker<T, M> {
    fn run(mut self) {
        debug!(transport = self.transport.transport_name(), "dispatch worker started");

        while self.shared.running.load(Ordering::Acquire) {
            while let Ok(command) = self.commands.try_recv() {
                self.apply(command);
            }

            if !self.transport.connected() || !self.shared.connected.load(Ordering::Acquire) {
                match self.commands.recv_timeout(self.config.idle_interval) {
                    Ok(command) => self.apply(command),
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
                continue;
            }

            if let Some((priority, job)) =
                self.shared.queue.pop_timeout(self.config.idle_interval)
            {
                self.process(priority, job);
            }
        }

        self.transport.disconnect();
        debug!("dispatch worker exited");
    }

    fn apply(&mut self, command: Control<T::Address>) {
        match command {
            Control::Connect {
                address,
                timeout,
                reply,
            } => {
                let result = self.transport.connect(&address, timeout);
                match &result {
                    Ok(()) => info!(?address, "dispatch transport connected"),
                    Err(err) => warn!(?address, error = %err, "dispatch connect failed"),
                }
                let running = self.shared.running.load(Ordering::Acquire);
                self.shared
                    .connected
                    .store(result.is_ok() && running, Ordering::Release);
                let _ = reply.send(result);
            }
            Control::Disconnect => {
                // A connect applied just before this command may have set the flag.
                self.shared.connected.store(false, Ordering::Release);
                self.transport.disconnect();
                info!(pending = self.shared.queue.len(), "dispatch transport disconnected");
            }
            Control::Stop => {
                self.shared.running.store(false, Ordering::Release);
            }
        }
    }

    fn process(&mut self, priority: Priority, job: Job<M>) {
        let Job {
            message,
            frame,
            periodic,
            on_result,
        } = job;
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.exchange(&frame, periodic) {
                Ok(raw) => {
                    match message.check_response(&raw) {
                        Ok(()) => {
                            if let Some(callback) = on_result {
                                callback(&message, raw);
                            }
                        }
                        Err(err) => warn!(?message, error = %err, "response rejected; dropped"),
                    }
                    return;
                }
                Err(err) if err.is_timeout() => {
                    warn!(?message, ?priority, attempt, max_attempts, "request timed out");
                    if attempt == max_attempts {
                        break;
                    }
                    thread::sleep(self.config.retry_backoff * attempt);
                    if !self.shared.connected.load(Ordering::Acquire) {
                        debug!(?message, "disconnected during backoff; request abandoned");
                        return;
                    }
                }
                Err(err) => {
                    error!(?message, ?priority, error = %err, "request abandoned");
                    return;
                }
            }
        }

        error!(?message, max_attempts, "request timed out on every attempt");
        if let Some(handler) = &self.on_timeout {
            handler(&message);
        }
    }

    fn exchange(&mut self, frame: &[u8], periodic: bool) -> devlink_transport::Result<Bytes> {
        log_frame(periodic, "tx", frame);
        self.transport.tx(frame)?;
        let raw = self
            .transport
            .rx(self.config.response_max_len, Some(self.config.rx_timeout))?;
        log_frame(periodic, "rx", &raw);
        Ok(raw)
    }
}

fn log_frame(periodic: bool, direction: &'static str, data: &[u8]) {
    if periodic {
        trace!(direction, len = data.len(), data = %HexDump(data), "dispatch frame");
    } else {
        debug!(direction, len = data.len(), data = %HexDump(data), "dispatch frame");
    }
}
