use std::collections::VecDeque;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::record::{IpcRecord, RecordType, RECORD_LEN};
use crate::error::SimError;
use crate::events::{EventSink, SimEvent};
use crate::monitor::SpeedMonitor;

/// Write attempts per record before it is dropped with a log entry.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Connects the core to one external billing collaborator over a pair
/// of unidirectional byte streams. Outgoing records are queued through
/// a channel so no simulation lock is ever held across a write; the
/// inbound side routes payment confirmations back into the monitor.
pub struct IpcBridge {
    tx: mpsc::UnboundedSender<IpcRecord>,
}

impl IpcBridge {
    /// Spawn the writer and reader tasks over the given streams.
    pub fn spawn<W, R>(
        writer: W,
        reader: R,
        monitor: Arc<Mutex<SpeedMonitor>>,
        sink: Arc<dyn EventSink>,
        shutdown: broadcast::Sender<()>,
    ) -> (Self, JoinHandle<()>, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer_handle = tokio::spawn(Self::writer_loop(
            writer,
            rx,
            sink.clone(),
            shutdown.subscribe(),
        ));
        let reader_handle = tokio::spawn(Self::reader_loop(
            reader,
            monitor,
            sink,
            shutdown.subscribe(),
        ));
        (Self { tx }, writer_handle, reader_handle)
    }

    /// Queue a record for transmission. Never blocks; safe to call
    /// with entity locks held.
    pub fn send(&self, record: IpcRecord) {
        if self.tx.send(record).is_err() {
            warn!("[IPC] Bridge closed, record dropped");
        }
    }

    async fn writer_loop<W>(
        mut writer: W,
        mut rx: mpsc::UnboundedReceiver<IpcRecord>,
        sink: Arc<dyn EventSink>,
        mut shutdown: broadcast::Receiver<()>,
    ) where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut retry: VecDeque<(IpcRecord, u32)> = VecDeque::new();

        loop {
            // Retries first so a transient failure clears in order.
            while let Some((record, attempts)) = retry.pop_front() {
                if !Self::write_record(&mut writer, &record, attempts, &mut retry, &sink).await {
                    break;
                }
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    // One final flush so late AVNs reach billing, then
                    // EOF for the collaborator.
                    while let Ok(record) = rx.try_recv() {
                        let _ = writer.write_all(&record.encode()).await;
                    }
                    while let Some((record, _)) = retry.pop_front() {
                        let _ = writer.write_all(&record.encode()).await;
                    }
                    let _ = writer.shutdown().await;
                    info!("[IPC] Writer closed");
                    break;
                }
                received = rx.recv() => {
                    match received {
                        Some(record) => {
                            Self::write_record(&mut writer, &record, 0, &mut retry, &sink).await;
                        }
                        None => {
                            let _ = writer.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Write one record; on failure re-queue with a bounded attempt
    /// count. Returns whether the write went through.
    async fn write_record<W>(
        writer: &mut W,
        record: &IpcRecord,
        attempts: u32,
        retry: &mut VecDeque<(IpcRecord, u32)>,
        sink: &Arc<dyn EventSink>,
    ) -> bool
    where
        W: AsyncWrite + Unpin,
    {
        match writer.write_all(&record.encode()).await {
            Ok(()) => {
                debug!("[IPC] Sent {:?} avn={}", record.record_type, record.avn_id);
                true
            }
            Err(err) => {
                let err = SimError::IpcTransport(err);
                let attempts = attempts + 1;
                if attempts < MAX_WRITE_ATTEMPTS {
                    warn!("[IPC] Write attempt {} failed: {}", attempts, err);
                    retry.push_back((record.clone(), attempts));
                } else {
                    sink.emit(&SimEvent::IpcError {
                        detail: format!(
                            "record for AVN #{} dropped after {} attempts: {}",
                            record.avn_id, attempts, err
                        ),
                    });
                }
                false
            }
        }
    }

    async fn reader_loop<R>(
        mut reader: R,
        monitor: Arc<Mutex<SpeedMonitor>>,
        sink: Arc<dyn EventSink>,
        mut shutdown: broadcast::Receiver<()>,
    ) where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut buf = [0u8; RECORD_LEN];
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("[IPC] Reader closed");
                    break;
                }
                read = reader.read_exact(&mut buf) => {
                    match read {
                        Ok(_) => {
                            match IpcRecord::decode(&buf) {
                                Ok(record) => {
                                    Self::handle_inbound(record, &monitor, &sink).await;
                                }
                                Err(err) => {
                                    sink.emit(&SimEvent::IpcError {
                                        detail: format!("undecodable inbound record: {}", err),
                                    });
                                }
                            }
                        }
                        // Whole-record reads only: EOF mid-record and
                        // clean EOF both end the reader.
                        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                            info!("[IPC] Reader reached EOF");
                            break;
                        }
                        Err(err) => {
                            sink.emit(&SimEvent::IpcError {
                                detail: SimError::IpcTransport(err).to_string(),
                            });
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_inbound(
        record: IpcRecord,
        monitor: &Arc<Mutex<SpeedMonitor>>,
        sink: &Arc<dyn EventSink>,
    ) {
        match record.record_type {
            RecordType::PaymentConfirmation => {
                let known = monitor.lock().await.mark_paid(record.avn_id);
                if known {
                    sink.emit(&SimEvent::PaymentConfirmed {
                        avn_id: record.avn_id,
                    });
                } else {
                    sink.emit(&SimEvent::IpcError {
                        detail: format!("payment confirmation for unknown AVN #{}", record.avn_id),
                    });
                }
            }
            other => {
                debug!("[IPC] Ignoring inbound {:?}", other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::{Aircraft, AircraftKind, Direction};
    use crate::events::CollectingSink;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn violation_record(monitor: &mut SpeedMonitor) -> crate::monitor::ViolationRecord {
        let mut rng = StdRng::seed_from_u64(31);
        let mut aircraft = Aircraft::new(
            "P650".into(),
            "PIA".into(),
            AircraftKind::Commercial,
            Direction::North,
            &mut rng,
        );
        aircraft.set_speed(650.0);
        monitor.monitor(&mut aircraft).unwrap()
    }

    #[tokio::test]
    async fn avn_records_cross_the_stream_whole() {
        let (core_side, collaborator_side) = tokio::io::duplex(4096);
        let (core_read, core_write) = tokio::io::split(core_side);
        let (mut collab_read, _collab_write) = tokio::io::split(collaborator_side);

        let monitor = Arc::new(Mutex::new(SpeedMonitor::new()));
        let sink: Arc<dyn EventSink> = Arc::new(CollectingSink::new());
        let (shutdown, _) = broadcast::channel(1);

        let record = {
            let mut guard = monitor.lock().await;
            IpcRecord::avn_created(&violation_record(&mut guard))
        };

        let (bridge, writer_handle, _reader_handle) = IpcBridge::spawn(
            core_write,
            core_read,
            monitor.clone(),
            sink,
            shutdown.clone(),
        );
        bridge.send(record.clone());

        let mut buf = [0u8; RECORD_LEN];
        collab_read.read_exact(&mut buf).await.unwrap();
        let received = IpcRecord::decode(&buf).unwrap();
        assert_eq!(received, record);

        shutdown.send(()).unwrap();
        writer_handle.await.unwrap();
    }

    #[tokio::test]
    async fn payment_confirmation_marks_avn_paid() {
        let (core_side, collaborator_side) = tokio::io::duplex(4096);
        let (_collab_read, mut collab_write) = tokio::io::split(collaborator_side);
        let (core_read, core_write) = tokio::io::split(core_side);

        let monitor = Arc::new(Mutex::new(SpeedMonitor::new()));
        let avn_id = {
            let mut guard = monitor.lock().await;
            violation_record(&mut guard).avn_id
        };

        let sink = Arc::new(CollectingSink::new());
        let (shutdown, _) = broadcast::channel(1);
        let (_bridge, _writer_handle, reader_handle) = IpcBridge::spawn(
            core_write,
            core_read,
            monitor.clone(),
            sink.clone() as Arc<dyn EventSink>,
            shutdown.clone(),
        );

        let confirmation = IpcRecord::payment_confirmation(avn_id, 575_000.0);
        collab_write.write_all(&confirmation.encode()).await.unwrap();
        collab_write.flush().await.unwrap();

        // Give the reader task a moment to process.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(monitor.lock().await.unpaid().is_empty());
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, SimEvent::PaymentConfirmed { avn_id: id } if *id == avn_id)));

        drop(collab_write);
        shutdown.send(()).unwrap();
        reader_handle.await.unwrap();
    }

    #[tokio::test]
    async fn reader_exits_cleanly_on_eof() {
        let monitor = Arc::new(Mutex::new(SpeedMonitor::new()));
        let sink: Arc<dyn EventSink> = Arc::new(CollectingSink::new());
        let (shutdown, _) = broadcast::channel(1);

        let (_bridge, _writer, reader_handle) = IpcBridge::spawn(
            tokio::io::sink(),
            tokio::io::empty(),
            monitor,
            sink,
            shutdown,
        );

        // empty() yields immediate EOF; the reader must terminate on
        // its own without a shutdown signal.
        tokio::time::timeout(std::time::Duration::from_secs(1), reader_handle)
            .await
            .expect("reader should exit on EOF")
            .unwrap();
    }
}
