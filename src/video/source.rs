//! Frame Source
//!
//! Polls one camera endpoint at a target rate on a background tokio task and
//! hands raw payloads (or transport errors) to the owning view.
//!
//! ## Acquisition cycle
//!
//! 1. `start()` spawns the task; the first tick fires one period later
//! 2. Each tick either GETs a still image or reads the next frame from an
//!    open MJPEG stream, awaiting it inline
//! 3. Ticks that come due while a fetch is still running are skipped, never
//!    queued, so at most one request is ever outstanding
//! 4. Results are stamped with the session generation and pushed into a
//!    small bounded queue; the view drains it without blocking
//!
//! `stop()` is synchronous and idempotent. A fetch already in flight runs to
//! completion but its result is discarded, both by the task and again at
//! delivery time.

use crate::config::AcquisitionConfig;
use crate::error::{MicroscopeError, Result};
use crate::video::decoder::Payload;
use crate::video::transport::{FrameStream, Protocol, Transport, TransportError};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Default snapshot URL for a fresh camera
pub const DEFAULT_URL: &str = "http://localhost:9998/jpg/image.jpg";

/// Default poll rate
pub const DEFAULT_FPS: u32 = 5;

/// A camera URL, its transport protocol and target rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub protocol: Protocol,
    pub target_fps: u32,
}

impl Endpoint {
    /// Create a validated endpoint
    pub fn new(url: &str, target_fps: u32) -> Result<Self> {
        validate_url(url)?;
        validate_fps(target_fps)?;
        Ok(Self {
            url: url.trim().to_string(),
            protocol: Protocol::classify(url),
            target_fps,
        })
    }

    /// Poll period, `1000 / fps` milliseconds
    pub fn period(&self) -> Duration {
        Duration::from_millis(1000 / self.target_fps.max(1) as u64)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            protocol: Protocol::SingleShotHttp,
            target_fps: DEFAULT_FPS,
        }
    }
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(MicroscopeError::configuration("camera URL is empty"));
    }
    url::Url::parse(url)
        .map_err(|e| MicroscopeError::configuration(format!("invalid camera URL {:?}: {}", url, e)))?;
    Ok(())
}

fn validate_fps(fps: u32) -> Result<()> {
    if fps == 0 {
        return Err(MicroscopeError::configuration("fps must be at least 1"));
    }
    Ok(())
}

/// Acquisition state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AcquisitionState {
    Idle = 0,
    Acquiring = 1,
    /// The most recent fetch failed; cleared by the next success
    Erroring = 2,
}

impl AcquisitionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AcquisitionState::Acquiring,
            2 => AcquisitionState::Erroring,
            _ => AcquisitionState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, AcquisitionState::Idle)
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionState::Idle => write!(f, "idle"),
            AcquisitionState::Acquiring => write!(f, "acquiring"),
            AcquisitionState::Erroring => write!(f, "erroring"),
        }
    }
}

/// What a source hands to its view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Raw payload ready for decoding
    Payload(Payload),
    /// A fetch failed; the view shows a placeholder naming the URL
    Error(TransportError),
}

/// Acquisition statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Poll periods elapsed, including skipped ones
    pub ticks: u64,
    /// Ticks that issued a fetch or stream read
    pub fetch_attempts: u64,
    /// Ticks dropped because a fetch was still in flight
    pub skipped_ticks: u64,
    /// Payloads handed to the view
    pub frames_delivered: u64,
    /// Events dropped because the view lagged (queue full)
    pub frames_dropped: u64,
    /// Transport failures
    pub errors: u64,
    /// Highest number of concurrently outstanding fetches observed
    pub max_in_flight: u64,
}

/// Inner statistics with atomic counters
#[derive(Default)]
struct StatsInner {
    ticks: AtomicU64,
    fetch_attempts: AtomicU64,
    skipped_ticks: AtomicU64,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
    errors: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

impl StatsInner {
    fn to_stats(&self) -> AcquisitionStats {
        AcquisitionStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            fetch_attempts: self.fetch_attempts.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            max_in_flight: self.max_in_flight.load(Ordering::Relaxed),
        }
    }

    fn begin_fetch(&self) {
        self.fetch_attempts.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn end_fetch(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// State shared between the handle and the acquisition task
struct Shared {
    state: AtomicU8,
    generation: AtomicU64,
    stats: StatsInner,
}

impl Shared {
    fn state(&self) -> AcquisitionState {
        AcquisitionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether results of session `generation` may still be delivered
    fn is_current(&self, generation: u64) -> bool {
        self.state().is_active() && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Move between Acquiring and Erroring; never leaves Idle
    fn transition(&self, generation: u64, to: AcquisitionState) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current == AcquisitionState::Idle as u8 {
                    None
                } else {
                    Some(to as u8)
                }
            });
    }
}

/// Event tagged with the session that produced it
struct Envelope {
    generation: u64,
    event: SourceEvent,
}

/// One start/stop cycle
struct Session {
    generation: u64,
    stop: Arc<Notify>,
    events: mpsc::Receiver<Envelope>,
    task: JoinHandle<()>,
}

/// Rate-limited poller for one camera endpoint
pub struct FrameSource {
    config: AcquisitionConfig,
    transport: Arc<dyn Transport>,
    endpoint_tx: watch::Sender<Endpoint>,
    shared: Arc<Shared>,
    session: Option<Session>,
}

impl FrameSource {
    /// Create an idle source for `endpoint`
    pub fn new(endpoint: Endpoint, transport: Arc<dyn Transport>, config: AcquisitionConfig) -> Self {
        let (endpoint_tx, _) = watch::channel(endpoint);
        Self {
            config,
            transport,
            endpoint_tx,
            shared: Arc::new(Shared {
                state: AtomicU8::new(AcquisitionState::Idle as u8),
                generation: AtomicU64::new(0),
                stats: StatsInner::default(),
            }),
            session: None,
        }
    }

    /// Create an idle source that talks HTTP
    #[cfg(feature = "http")]
    pub fn http(endpoint: Endpoint, config: AcquisitionConfig) -> Result<Self> {
        let transport = crate::video::transport::HttpTransport::new(config.request_timeout())?;
        Ok(Self::new(endpoint, Arc::new(transport), config))
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint_tx.borrow().clone()
    }

    pub fn state(&self) -> AcquisitionState {
        self.shared.state()
    }

    pub fn is_acquiring(&self) -> bool {
        self.state().is_active()
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.shared.stats.to_stats()
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Point the source at a new URL
    ///
    /// The protocol is reclassified from the URL suffix. An invalid URL is
    /// rejected and the previous endpoint is kept.
    pub fn set_endpoint(&mut self, url: &str) -> Result<()> {
        validate_url(url)?;
        let url = url.trim().to_string();
        let protocol = Protocol::classify(&url);
        debug!("Endpoint set to {} ({:?})", url, protocol);
        self.endpoint_tx.send_modify(|endpoint| {
            endpoint.url = url;
            endpoint.protocol = protocol;
        });
        Ok(())
    }

    /// Change the poll rate
    ///
    /// While acquiring, the interval is re-armed without cancelling an
    /// in-flight fetch. Zero is rejected and the previous rate kept.
    pub fn set_rate(&mut self, fps: u32) -> Result<()> {
        validate_fps(fps)?;
        debug!("Poll rate set to {} fps", fps);
        self.endpoint_tx.send_if_modified(|endpoint| {
            let changed = endpoint.target_fps != fps;
            endpoint.target_fps = fps;
            changed
        });
        Ok(())
    }

    /// Begin acquisition
    ///
    /// Must be called from within a tokio runtime. Starting an active source
    /// is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.is_acquiring() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MicroscopeError::other(format!("no tokio runtime to acquire on: {}", e)))?;

        // A stopped session may still be finishing a fetch; its result
        // would be discarded anyway
        if let Some(old) = self.session.take() {
            old.task.abort();
        }

        let endpoint = self.endpoint();
        info!(
            "Starting acquisition: {} @ {}fps ({:?}, queue_size={})",
            endpoint.url, endpoint.target_fps, endpoint.protocol, self.config.queue_size
        );

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .state
            .store(AcquisitionState::Acquiring as u8, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(self.config.queue_size.max(1));
        let stop = Arc::new(Notify::new());

        let task = runtime.spawn(acquisition_task(
            generation,
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            self.config.clone(),
            self.endpoint_tx.subscribe(),
            Arc::clone(&stop),
            tx,
        ));

        self.session = Some(Session {
            generation,
            stop,
            events: rx,
            task,
        });

        Ok(())
    }

    /// Stop acquisition; idempotent
    ///
    /// No event is delivered after this returns.
    pub fn stop(&mut self) {
        let previous = self
            .shared
            .state
            .swap(AcquisitionState::Idle as u8, Ordering::SeqCst);
        if previous == AcquisitionState::Idle as u8 {
            return;
        }

        if let Some(ref session) = self.session {
            session.stop.notify_one();
        }

        let stats = self.stats();
        info!(
            "Stopped acquisition of {}: ticks={}, fetches={}, skipped={}, delivered={}, errors={}",
            self.endpoint_tx.borrow().url,
            stats.ticks,
            stats.fetch_attempts,
            stats.skipped_ticks,
            stats.frames_delivered,
            stats.errors
        );
    }

    /// Take the next pending event without waiting
    pub fn try_next_event(&mut self) -> Option<SourceEvent> {
        let session = self.session.as_mut()?;
        loop {
            let envelope = session.events.try_recv().ok()?;
            if let Some(event) = Self::accept(&self.shared, session.generation, envelope) {
                return Some(event);
            }
        }
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the source is stopped.
    pub async fn next_event(&mut self) -> Option<SourceEvent> {
        let session = self.session.as_mut()?;
        loop {
            if !self.shared.is_current(session.generation) {
                return None;
            }
            let envelope = session.events.recv().await?;
            if let Some(event) = Self::accept(&self.shared, session.generation, envelope) {
                return Some(event);
            }
        }
    }

    /// Delivery-time check against the current state and session
    fn accept(shared: &Shared, generation: u64, envelope: Envelope) -> Option<SourceEvent> {
        if envelope.generation != generation || !shared.is_current(generation) {
            trace!("Discarding event from stale session {}", envelope.generation);
            return None;
        }
        if matches!(envelope.event, SourceEvent::Payload(_)) {
            shared.stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
        }
        Some(envelope.event)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.shared
            .state
            .store(AcquisitionState::Idle as u8, Ordering::SeqCst);
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
    }
}

fn ticker(endpoint: &Endpoint) -> time::Interval {
    let period = endpoint.period();
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Background acquisition loop for one session
async fn acquisition_task(
    generation: u64,
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    config: AcquisitionConfig,
    mut endpoint_rx: watch::Receiver<Endpoint>,
    stop: Arc<Notify>,
    events: mpsc::Sender<Envelope>,
) {
    let mut endpoint = endpoint_rx.borrow_and_update().clone();
    let mut interval = ticker(&endpoint);
    let mut stream: Option<Box<dyn FrameStream>> = None;

    debug!("Acquisition task {} started for {}", generation, endpoint.url);

    loop {
        let scheduled = tokio::select! {
            biased;
            _ = stop.notified() => break,
            changed = endpoint_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = endpoint_rx.borrow_and_update().clone();
                if next.url != endpoint.url {
                    stream = None;
                }
                if next.target_fps != endpoint.target_fps {
                    interval = ticker(&next);
                }
                endpoint = next;
                continue;
            }
            scheduled = interval.tick() => scheduled,
        };

        if !shared.is_current(generation) {
            break;
        }
        shared.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let event = match endpoint.protocol {
            Protocol::SingleShotHttp => fetch_still(&shared, transport.as_ref(), &endpoint, &config).await,
            Protocol::MjpegPoll => {
                read_stream(&shared, transport.as_ref(), &endpoint, &config, &mut stream).await
            }
        };

        // Ticks that came due while the fetch ran were skipped by the interval
        let period = endpoint.period().as_nanos().max(1);
        let missed = (scheduled.elapsed().as_nanos() / period) as u64;
        if missed > 0 {
            shared.stats.ticks.fetch_add(missed, Ordering::Relaxed);
            shared.stats.skipped_ticks.fetch_add(missed, Ordering::Relaxed);
            trace!("Skipped {} ticks while fetch was in flight", missed);
        }

        let Some(event) = event else {
            continue;
        };

        if !shared.is_current(generation) {
            trace!("Discarding result fetched after stop");
            break;
        }

        match &event {
            SourceEvent::Payload(_) => shared.transition(generation, AcquisitionState::Acquiring),
            SourceEvent::Error(_) => shared.transition(generation, AcquisitionState::Erroring),
        }

        match events.try_send(Envelope { generation, event }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                shared.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Frame dropped due to full queue");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }

    debug!("Acquisition task {} stopped", generation);
}

async fn fetch_still(
    shared: &Shared,
    transport: &dyn Transport,
    endpoint: &Endpoint,
    config: &AcquisitionConfig,
) -> Option<SourceEvent> {
    shared.stats.begin_fetch();
    let result = transport.fetch(&endpoint.url, config.request_timeout()).await;
    shared.stats.end_fetch();

    match result {
        Ok(bytes) => {
            trace!("Fetched {} bytes from {}", bytes.len(), endpoint.url);
            Some(SourceEvent::Payload(Payload::Encoded(bytes)))
        }
        Err(e) => {
            shared.stats.errors.fetch_add(1, Ordering::Relaxed);
            warn!("Fetch failed: {}", e);
            Some(SourceEvent::Error(e))
        }
    }
}

async fn read_stream(
    shared: &Shared,
    transport: &dyn Transport,
    endpoint: &Endpoint,
    config: &AcquisitionConfig,
    stream: &mut Option<Box<dyn FrameStream>>,
) -> Option<SourceEvent> {
    shared.stats.begin_fetch();
    let result = read_stream_inner(transport, endpoint, config, stream).await;
    shared.stats.end_fetch();

    if let Some(SourceEvent::Error(ref e)) = result {
        shared.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!("Stream failed: {}", e);
    }
    result
}

async fn read_stream_inner(
    transport: &dyn Transport,
    endpoint: &Endpoint,
    config: &AcquisitionConfig,
    stream: &mut Option<Box<dyn FrameStream>>,
) -> Option<SourceEvent> {
    if stream.is_none() {
        match transport
            .open_stream(&endpoint.url, config.request_timeout())
            .await
        {
            Ok(handle) => {
                info!("Opened MJPEG stream {}", endpoint.url);
                *stream = Some(handle);
            }
            Err(e) => return Some(SourceEvent::Error(e)),
        }
    }
    let handle = stream.as_mut()?;

    match handle.read_frame(config.stream_read_timeout()).await {
        Ok(Some(payload)) => Some(SourceEvent::Payload(payload)),
        Ok(None) => {
            trace!("No frame on {} this tick", endpoint.url);
            None
        }
        Err(e) => {
            // Reopened on the next tick
            debug!("Dropping stream handle: {}", e);
            *stream = None;
            Some(SourceEvent::Error(e))
        }
    }
}
