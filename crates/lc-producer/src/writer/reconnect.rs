//! GELF writer that redials on failure

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lc_core::config::WriterConfig;
use lc_core::LogRecord;
use lc_protocol::ProtocolError;
use thiserror::Error;
use tracing::{debug, warn};

use super::dial::{Dial, TcpDialer};

/// Writer errors
#[derive(Error, Debug)]
pub enum WriterError {
    /// Initial connection failed
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Every redial in the budget failed
    #[error("maximum reconnection attempts reached")]
    MaxReconnectReached,

    /// The connection accepted only part of the frame
    #[error("bad write ({written}/{expected})")]
    BadWrite { written: usize, expected: usize },

    /// Record could not be encoded
    #[error("Encoding failed: {0}")]
    Encode(#[from] ProtocolError),
}

/// Synchronous writer of NUL-terminated GELF frames.
///
/// A failed write triggers up to `max_reconnect + 1` redials, each preceded
/// by `reconnect_delay`; the frame is written on the first connection that
/// comes up. A frame cut off part-way is reported as
/// [`WriterError::BadWrite`] and the connection is dropped, so the next
/// frame starts on a clean stream. The connection lives under one mutex,
/// so concurrent callers never interleave frames or redials.
pub struct ReconnectingWriter<D: Dial = TcpDialer> {
    dialer: D,
    max_reconnect: u32,
    reconnect_delay: Duration,
    facility: Option<String>,
    conn: Mutex<Option<D::Conn>>,
}

impl ReconnectingWriter<TcpDialer> {
    /// Connect to `config.address` over TCP
    pub fn open(config: &WriterConfig) -> Result<Self, WriterError> {
        Self::with_dialer(TcpDialer::new(config.address.clone()), config)
    }
}

impl<D: Dial> ReconnectingWriter<D> {
    /// Connect through `dialer`; fails if the first dial fails
    pub fn with_dialer(dialer: D, config: &WriterConfig) -> Result<Self, WriterError> {
        let conn = dialer.dial().map_err(|source| WriterError::Connect {
            address: dialer.address().to_string(),
            source,
        })?;
        debug!("Writer connected to {}", dialer.address());

        Ok(Self {
            dialer,
            max_reconnect: config.max_reconnect,
            reconnect_delay: config.reconnect_delay,
            facility: config.facility.clone().filter(|f| !f.is_empty()),
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Collector address
    pub fn address(&self) -> &str {
        self.dialer.address()
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Send one record. Returns the number of bytes written.
    pub fn write(&self, record: &LogRecord) -> Result<usize, WriterError> {
        let mut gelf = record.to_gelf();
        if let Some(facility) = &self.facility {
            gelf.facility = facility.clone();
        }
        let frame = gelf.to_frame()?;

        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(stream) = conn.as_mut() {
            match write_frame(stream, &frame) {
                FrameWrite::Done => return Ok(frame.len()),
                FrameWrite::Short(written) => {
                    // The stream now holds a torn frame; start over on a new one
                    *conn = None;
                    return Err(WriterError::BadWrite {
                        written,
                        expected: frame.len(),
                    });
                }
                FrameWrite::Failed(e) => debug!("Write to {} failed: {}", self.dialer.address(), e),
            }
        }
        *conn = None;

        for attempt in 1..=self.max_reconnect.saturating_add(1) {
            std::thread::sleep(self.reconnect_delay);

            let mut stream = match self.dialer.dial() {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(
                        "Reconnect {}/{} to {} failed: {}",
                        attempt,
                        self.max_reconnect.saturating_add(1),
                        self.dialer.address(),
                        e
                    );
                    continue;
                }
            };

            match write_frame(&mut stream, &frame) {
                FrameWrite::Done => {
                    *conn = Some(stream);
                    return Ok(frame.len());
                }
                FrameWrite::Short(written) => {
                    return Err(WriterError::BadWrite {
                        written,
                        expected: frame.len(),
                    })
                }
                FrameWrite::Failed(e) => debug!("Write after reconnect failed: {}", e),
            }
        }

        Err(WriterError::MaxReconnectReached)
    }

    /// Drop the connection; the next write redials
    pub fn close(&self) {
        if let Some(mut stream) = self.conn.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = stream.flush();
        }
    }
}

/// Outcome of pushing one frame onto a stream
enum FrameWrite {
    /// Every byte went out
    Done,
    /// Nothing went out; the stream is still clean
    Failed(io::Error),
    /// Part of the frame went out before the stream stopped accepting
    Short(usize),
}

fn write_frame<W: Write>(stream: &mut W, frame: &[u8]) -> FrameWrite {
    let mut written = 0;
    while written < frame.len() {
        match stream.write(&frame[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if written == 0 => return FrameWrite::Failed(e),
            Err(e) => {
                debug!("Write failed after {}/{} bytes: {}", written, frame.len(), e);
                break;
            }
        }
    }

    match written {
        0 => FrameWrite::Failed(io::ErrorKind::WriteZero.into()),
        n if n == frame.len() => FrameWrite::Done,
        n => FrameWrite::Short(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_core::Severity;
    use lc_protocol::GelfMessage;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Connection writing into a shared buffer
    #[derive(Clone, Default)]
    struct Conn {
        data: Arc<Mutex<Vec<u8>>>,
        broken: bool,
        /// Bytes accepted per call
        limit: Option<usize>,
        /// Total bytes accepted before the peer stops reading
        capacity: Option<usize>,
    }

    impl Write for Conn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken"));
            }
            let mut data = self.data.lock().unwrap();
            let room = self.capacity.map_or(usize::MAX, |cap| cap.saturating_sub(data.len()));
            let n = self.limit.unwrap_or(usize::MAX).min(room).min(buf.len());
            data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Dialer replaying a script of outcomes; refuses once the script runs out
    #[derive(Default)]
    struct ScriptedDialer {
        script: Mutex<VecDeque<Option<Conn>>>,
        dials: AtomicUsize,
    }

    impl ScriptedDialer {
        fn new(outcomes: impl IntoIterator<Item = Option<Conn>>) -> Self {
            Self {
                script: Mutex::new(outcomes.into_iter().collect()),
                dials: AtomicUsize::new(0),
            }
        }
    }

    impl Dial for ScriptedDialer {
        type Conn = Conn;

        fn dial(&self) -> io::Result<Conn> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(Some(conn)) => Ok(conn),
                _ => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
            }
        }

        fn address(&self) -> &str {
            "collector:12201"
        }
    }

    fn config() -> WriterConfig {
        WriterConfig {
            reconnect_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn record() -> LogRecord {
        LogRecord::new(Severity::Error, " payment gateway timeout ").with_facility("billing")
    }

    fn broken() -> Conn {
        Conn {
            broken: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_open_fails_when_first_dial_fails() {
        let dialer = ScriptedDialer::new([None]);
        let result = ReconnectingWriter::with_dialer(dialer, &config());
        assert!(matches!(result, Err(WriterError::Connect { .. })));
    }

    #[test]
    fn test_write_frames_gelf_with_nul() {
        let conn = Conn::default();
        let writer = ReconnectingWriter::with_dialer(ScriptedDialer::new([Some(conn.clone())]), &config()).unwrap();

        let written = writer.write(&record()).unwrap();

        let data = conn.data.lock().unwrap().clone();
        assert_eq!(written, data.len());
        assert_eq!(data.last(), Some(&0));
        let gelf = GelfMessage::from_frame(&data).unwrap();
        assert_eq!(gelf.short_message, "payment gateway timeout");
        assert_eq!(gelf.facility, "billing");
        assert_eq!(gelf.level, 3);
    }

    #[test]
    fn test_configured_facility_overrides_record() {
        let conn = Conn::default();
        let config = WriterConfig {
            facility: Some("payments".to_string()),
            ..config()
        };
        let writer = ReconnectingWriter::with_dialer(ScriptedDialer::new([Some(conn.clone())]), &config).unwrap();

        writer.write(&record()).unwrap();

        let gelf = GelfMessage::from_frame(&conn.data.lock().unwrap()).unwrap();
        assert_eq!(gelf.facility, "payments");
    }

    #[test]
    fn test_redial_succeeds_on_last_attempt() {
        // Initial dial, then max_reconnect failures, then success
        let good = Conn::default();
        let mut script = vec![Some(broken())];
        script.extend((0..3).map(|_| None));
        script.push(Some(good.clone()));
        let writer = ReconnectingWriter::with_dialer(ScriptedDialer::new(script), &config()).unwrap();

        let written = writer.write(&record()).unwrap();

        assert_eq!(written, good.data.lock().unwrap().len());
        assert_eq!(writer.dialer.dials.load(Ordering::SeqCst), 5);
        assert!(writer.is_connected());
    }

    #[test]
    fn test_budget_exhausted() {
        let mut script = vec![Some(broken())];
        script.extend((0..10).map(|_| None));
        let writer = ReconnectingWriter::with_dialer(ScriptedDialer::new(script), &config()).unwrap();

        let result = writer.write(&record());

        assert!(matches!(result, Err(WriterError::MaxReconnectReached)));
        assert_eq!(
            result.unwrap_err().to_string(),
            "maximum reconnection attempts reached"
        );
        // 1 initial dial + max_reconnect + 1 redials, nothing more
        assert_eq!(writer.dialer.dials.load(Ordering::SeqCst), 1 + 4);
        assert!(!writer.is_connected());
    }

    #[test]
    fn test_partial_writes_are_completed() {
        let conn = Conn {
            limit: Some(8),
            ..Default::default()
        };
        let writer = ReconnectingWriter::with_dialer(ScriptedDialer::new([Some(conn.clone())]), &config()).unwrap();

        let written = writer.write(&record()).unwrap();

        let data = conn.data.lock().unwrap().clone();
        assert_eq!(written, data.len());
        let gelf = GelfMessage::from_frame(&data).unwrap();
        assert_eq!(gelf.short_message, "payment gateway timeout");
        assert!(writer.is_connected());
    }

    #[test]
    fn test_short_write_drops_connection() {
        let stalled = Conn {
            capacity: Some(8),
            ..Default::default()
        };
        let fresh = Conn::default();
        let writer = ReconnectingWriter::with_dialer(
            ScriptedDialer::new([Some(stalled.clone()), Some(fresh.clone())]),
            &config(),
        )
        .unwrap();

        match writer.write(&record()) {
            Err(WriterError::BadWrite { written, expected }) => {
                assert_eq!(written, 8);
                assert!(expected > 8);
            }
            other => panic!("expected BadWrite, got {:?}", other.map(|_| ())),
        }
        assert!(!writer.is_connected());

        // The next record goes out whole on a new connection
        writer.write(&record()).unwrap();

        assert_eq!(stalled.data.lock().unwrap().len(), 8);
        let data = fresh.data.lock().unwrap().clone();
        let gelf = GelfMessage::from_frame(&data).unwrap();
        assert_eq!(gelf.short_message, "payment gateway timeout");
        assert_eq!(writer.dialer.dials.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_close_then_write_redials() {
        let first = Conn::default();
        let second = Conn::default();
        let writer = ReconnectingWriter::with_dialer(
            ScriptedDialer::new([Some(first.clone()), Some(second.clone())]),
            &config(),
        )
        .unwrap();

        writer.close();
        assert!(!writer.is_connected());
        writer.write(&record()).unwrap();

        assert!(first.data.lock().unwrap().is_empty());
        assert!(!second.data.lock().unwrap().is_empty());
    }
}
