//! The receive → decode → present loop.
//!
//! # Cycle
//!
//! ```text
//! AwaitingMessage ─► Receiving ─┬─► Decoding ─┬─► Presenting ─► AwaitingMessage
//!                               │             └─► DecodeFailed ─► AwaitingMessage
//!                               └─► TransportFailed ──────────────► AwaitingMessage
//! ```
//!
//! One thread owns the receiver, the decoder and the display sink. Every
//! per-cycle failure is logged and turned into "try again"; a failed decode
//! leaves the previous frame on screen. The loop only ends when the shutdown
//! flag is raised (checked before each cycle) or the surface is closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::imageops::FilterType;
use thiserror::Error;

use crate::codec::{self, DEFAULT_FILTER, DecodeError};
use crate::config::{ConfigError, ViewerConfig};
use crate::display::{DisplayError, DisplaySink};
use crate::net::{MulticastEndpoint, MulticastSocket};
use crate::receiver::{MulticastTransport, Receiver, Transport, TransportError};
use crate::trace::{debug, error, info, warn};

/// Fatal error before the first cycle.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The display surface could not be created.
    #[error("cannot create display: {0}")]
    Display(#[from] DisplayError),
    /// The multicast socket could not be bound or joined.
    #[error("cannot open {endpoint}: {source}")]
    Transport {
        endpoint: MulticastEndpoint,
        #[source]
        source: std::io::Error,
    },
    /// Signal handlers could not be installed.
    #[error("cannot install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

/// Checks that `endpoint` can be bound and joined, then releases it.
///
/// Sockets are opened per cycle, so without this a permanently unusable
/// endpoint would only show up as an endless stream of per-cycle failures.
///
/// # Errors
///
/// Returns [`StartupError::Transport`] if the socket cannot be opened.
pub fn preflight(endpoint: &MulticastEndpoint) -> Result<(), StartupError> {
    let socket = MulticastSocket::join(endpoint).map_err(|source| StartupError::Transport {
        endpoint: *endpoint,
        source,
    })?;
    socket.leave().map_err(|source| StartupError::Transport {
        endpoint: *endpoint,
        source,
    })
}

/// How one cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A new frame of this size is on screen.
    Presented { width: u32, height: u32 },
    /// The bytes were not an image; the previous frame stays.
    DecodeFailed(DecodeError),
    /// The transport failed; nothing reached the decoder.
    TransportFailed(TransportError),
}

/// Per-loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerStats {
    /// Cycles started.
    pub cycles: u64,
    /// Frames handed to the display sink.
    pub presented: u64,
    /// Cycles whose bytes failed to decode.
    pub decode_failures: u64,
    /// Cycles aborted by the transport (idle timeouts included).
    pub transport_failures: u64,
}

/// Owns the receiver and the display sink for the life of the process.
pub struct Viewer<D: DisplaySink, T: Transport = MulticastTransport> {
    receiver: Receiver<T>,
    sink: D,
    target_width: u32,
    filter: FilterType,
    retry_delay: Duration,
    shutdown: Arc<AtomicBool>,
    stats: ViewerStats,
}

impl<D: DisplaySink> Viewer<D> {
    /// Builds a viewer for `config` on top of an already created `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint in `config` is invalid.
    pub fn from_config(config: &ViewerConfig, sink: D) -> Result<Self, ConfigError> {
        let receiver = Receiver::new(config.endpoint()?, config.framing, config.transport());
        Ok(Self::new(receiver, sink)
            .with_target_width(config.target_width)
            .with_filter(config.filter)
            .with_retry_delay(config.retry_delay))
    }
}

impl<D: DisplaySink, T: Transport> Viewer<D, T> {
    /// Creates a viewer that scales to the sink's width.
    pub fn new(receiver: Receiver<T>, sink: D) -> Self {
        let target_width = sink.width();
        Self {
            receiver,
            sink,
            target_width,
            filter: DEFAULT_FILTER,
            retry_delay: Duration::ZERO,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: ViewerStats::default(),
        }
    }

    /// Scales to `width` instead of the sink width when `Some`.
    #[must_use]
    pub fn with_target_width(mut self, width: Option<u32>) -> Self {
        if let Some(width) = width {
            self.target_width = width;
        }
        self
    }

    /// Uses `filter` for scaling.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Sleeps `delay` after each transport failure.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Width frames are scaled to.
    #[must_use]
    pub const fn target_width(&self) -> u32 {
        self.target_width
    }

    /// The display sink.
    #[must_use]
    pub const fn sink(&self) -> &D {
        &self.sink
    }

    /// The receiver.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver<T> {
        &self.receiver
    }

    /// Counters since construction.
    #[must_use]
    pub const fn stats(&self) -> ViewerStats {
        self.stats
    }

    /// Returns a clone of the shutdown flag for external signal handling.
    ///
    /// Setting it stops [`run`](Self::run) before its next cycle.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Runs one receive → decode → present cycle.
    ///
    /// # Errors
    ///
    /// Only display failures are returned; transport and decode failures
    /// are reported through [`CycleOutcome`].
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, DisplayError> {
        self.stats.cycles += 1;

        let encoded = match self.receiver.receive_one() {
            Ok(encoded) => encoded,
            Err(e) => {
                self.stats.transport_failures += 1;
                self.sink.refresh()?;
                return Ok(CycleOutcome::TransportFailed(e));
            }
        };
        debug!(len = encoded.len(), "image bytes received");

        let scaled = codec::decode(encoded.as_bytes())
            .and_then(|frame| codec::scale_to_width(&frame, self.target_width, self.filter));
        drop(encoded);
        let scaled = match scaled {
            Ok(scaled) => scaled,
            Err(e) => {
                self.stats.decode_failures += 1;
                self.sink.refresh()?;
                return Ok(CycleOutcome::DecodeFailed(e));
            }
        };
        let (width, height) = (scaled.width(), scaled.height());
        self.sink.present(scaled)?;
        self.stats.presented += 1;

        Ok(CycleOutcome::Presented { width, height })
    }

    /// Runs cycles until the shutdown flag is set or the surface closes.
    ///
    /// # Errors
    ///
    /// Returns a [`DisplayError`] other than [`DisplayError::Closed`].
    pub fn run(&mut self) -> Result<(), DisplayError> {
        info!(
            endpoint = %self.receiver.endpoint(),
            target_width = self.target_width,
            "waiting to receive image data"
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.run_cycle() {
                Ok(CycleOutcome::Presented { width, height }) => {
                    info!(width, height, "image received successfully");
                }
                Ok(CycleOutcome::DecodeFailed(e)) => {
                    warn!(error = %e, "failed to reconstruct image");
                }
                Ok(CycleOutcome::TransportFailed(e)) if e.is_idle_timeout() => {
                    debug!("no datagrams before read timeout");
                }
                Ok(CycleOutcome::TransportFailed(e)) => {
                    warn!(error = %e, "receive cycle aborted");
                    if !self.retry_delay.is_zero() {
                        std::thread::sleep(self.retry_delay);
                    }
                }
                Err(DisplayError::Closed) => {
                    info!("display closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "display failed");
                    return Err(e);
                }
            }
        }

        info!(
            cycles = self.stats.cycles,
            presented = self.stats.presented,
            "viewer stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;

    use super::*;
    use crate::codec::DecodedFrame;
    use crate::codec::tests::png;
    use crate::display::LastFrameSink;
    use crate::receiver::{DatagramSource, Framing, framing};

    /// Hands out one pre-split message per cycle; `None` fails the read.
    struct Playlist {
        messages: VecDeque<Option<Vec<u8>>>,
        capacity: usize,
    }

    struct Reads(VecDeque<io::Result<Vec<u8>>>);

    impl DatagramSource for Reads {
        fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let datagram = self
                .0
                .pop_front()
                .unwrap_or_else(|| Err(io::ErrorKind::WouldBlock.into()))?;
            buf[..datagram.len()].copy_from_slice(&datagram);
            Ok(datagram.len())
        }
    }

    impl Transport for Playlist {
        type Source = Reads;

        fn open(&mut self, _: &MulticastEndpoint) -> Result<Reads, TransportError> {
            let reads = match self.messages.pop_front().flatten() {
                Some(bytes) => framing::split(&bytes, self.capacity, Framing::ShortDatagram)
                    .unwrap()
                    .into_iter()
                    .map(Ok)
                    .collect(),
                None => VecDeque::from([Err(io::ErrorKind::ConnectionReset.into())]),
            };
            Ok(Reads(reads))
        }
    }

    const CAPACITY: usize = 512;

    fn receiver(messages: Vec<Option<Vec<u8>>>) -> Receiver<Playlist> {
        let group = std::net::Ipv4Addr::new(239, 9, 9, 9);
        let endpoint = MulticastEndpoint::new(group, 4446, CAPACITY).unwrap();
        let transport = Playlist {
            messages: messages.into(),
            capacity: CAPACITY,
        };
        Receiver::new(endpoint, Framing::ShortDatagram, transport)
    }

    fn viewer(messages: Vec<Option<Vec<u8>>>, width: u32) -> Viewer<LastFrameSink, Playlist> {
        Viewer::new(receiver(messages), LastFrameSink::new(width))
    }

    fn shown(viewer: &Viewer<LastFrameSink, Playlist>) -> Option<(u32, u32)> {
        viewer
            .sink()
            .frame()
            .map(|f: &DecodedFrame| (f.width(), f.height()))
    }

    #[test]
    fn presents_scaled_frame() {
        let mut v = viewer(vec![Some(png(40, 30))], 200);
        assert!(matches!(
            v.run_cycle().unwrap(),
            CycleOutcome::Presented {
                width: 200,
                height: 150
            }
        ));
        assert_eq!(shown(&v), Some((200, 150)));
    }

    #[test]
    fn decode_failure_keeps_previous_frame() {
        let mut v = viewer(
            vec![Some(png(10, 10)), Some(b"garbage".to_vec()), Some(Vec::new())],
            50,
        );

        v.run_cycle().unwrap();
        let before = v.sink().frame().cloned();

        assert!(matches!(
            v.run_cycle().unwrap(),
            CycleOutcome::DecodeFailed(DecodeError::UnknownFormat)
        ));
        assert!(matches!(
            v.run_cycle().unwrap(),
            CycleOutcome::DecodeFailed(DecodeError::Empty)
        ));

        assert_eq!(v.sink().frame().cloned(), before);
        assert_eq!(v.sink().presented(), 1);
        assert_eq!(v.stats().decode_failures, 2);
    }

    #[test]
    fn transport_failure_then_recovery() {
        let mut v = viewer(vec![None, Some(png(8, 4))], 16);

        assert!(matches!(
            v.run_cycle().unwrap(),
            CycleOutcome::TransportFailed(TransportError::Receive { .. })
        ));
        assert_eq!(shown(&v), None);

        assert!(matches!(
            v.run_cycle().unwrap(),
            CycleOutcome::Presented { width: 16, height: 8 }
        ));
        assert_eq!(
            v.stats(),
            ViewerStats {
                cycles: 2,
                presented: 1,
                decode_failures: 0,
                transport_failures: 1,
            }
        );
    }

    #[test]
    fn target_width_override() {
        let mut v = viewer(vec![Some(png(20, 10))], 1920).with_target_width(Some(64));
        assert_eq!(v.target_width(), 64);
        v.run_cycle().unwrap();
        assert_eq!(shown(&v), Some((64, 32)));
    }

    #[test]
    fn run_returns_immediately_when_already_stopped() {
        let mut v = viewer(vec![Some(png(4, 4))], 8);
        v.shutdown_flag().store(true, Ordering::Relaxed);
        v.run().unwrap();
        assert_eq!(v.stats().cycles, 0);
    }

    #[test]
    fn oversized_scale_is_a_skipped_cycle() {
        let mut v = viewer(vec![Some(png(6, 6)), Some(png(1, 20_000))], 1920);

        v.run_cycle().unwrap();
        let before = v.sink().frame().cloned();

        assert!(matches!(
            v.run_cycle().unwrap(),
            CycleOutcome::DecodeFailed(DecodeError::TooLarge { width: 1920, .. })
        ));
        assert_eq!(v.sink().frame().cloned(), before);
        assert_eq!(v.stats().decode_failures, 1);
    }

    /// Closes on the first refresh; counts presents.
    #[derive(Default)]
    struct ClosedWhileIdle {
        refreshes: usize,
        presented: usize,
    }

    impl DisplaySink for ClosedWhileIdle {
        fn width(&self) -> u32 {
            16
        }

        fn present(&mut self, _: DecodedFrame) -> Result<(), DisplayError> {
            self.presented += 1;
            Ok(())
        }

        fn refresh(&mut self) -> Result<(), DisplayError> {
            self.refreshes += 1;
            Err(DisplayError::Closed)
        }
    }

    #[test]
    fn idle_cycle_refreshes_sink_and_notices_close() {
        let messages = vec![Some(png(4, 4)), None];
        let mut v = Viewer::new(receiver(messages), ClosedWhileIdle::default());
        v.run().unwrap();

        assert_eq!(v.sink().presented, 1);
        assert_eq!(v.sink().refreshes, 1);
        assert_eq!(v.stats().cycles, 2);
        assert_eq!(v.stats().transport_failures, 1);
    }

    struct ClosingSink;

    impl DisplaySink for ClosingSink {
        fn width(&self) -> u32 {
            32
        }

        fn present(&mut self, _: DecodedFrame) -> Result<(), DisplayError> {
            Err(DisplayError::Closed)
        }
    }

    #[test]
    fn run_stops_when_display_closes() {
        let messages = vec![Some(b"junk".to_vec()), Some(png(4, 4))];
        let mut v = Viewer::new(receiver(messages), ClosingSink);
        v.run().unwrap();
        assert_eq!(v.stats().cycles, 2);
        assert_eq!(v.stats().decode_failures, 1);
        assert_eq!(v.stats().presented, 0);
    }

    #[test]
    fn from_config_uses_configured_width() {
        let mut config = ViewerConfig::default();
        config.apply("width", "640").unwrap();
        let v = Viewer::from_config(&config, LastFrameSink::new(1920)).unwrap();
        assert_eq!(v.target_width(), 640);
        assert_eq!(v.receiver().endpoint(), &config.endpoint().unwrap());
    }
}
