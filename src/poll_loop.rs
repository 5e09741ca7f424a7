//! Periodic estimate polling.
//!
//! A ticker thread fires every `interval` and hands each fetch to a short-lived
//! worker thread, so a slow response never delays the next tick. Workers send
//! their result back as `ControlEvent::Estimate` tagged with the session id;
//! the controller decides on arrival whether it still applies.
//!
//! At most `max_in_flight` fetches run at once. A tick that finds the limit
//! reached is skipped, so a backend that stops answering costs a bounded
//! number of blocked threads.

use crate::estimation::EstimationService;
use crate::types::ControlEvent;
use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TryRecvError};
use log::{debug, info, warn};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub interval: Duration,
    /// Call `start_session` on the ticker thread and wait for it to resolve
    /// before the first tick is scheduled.
    pub await_start_ack: bool,
    /// Fetches allowed to be outstanding at once (at least 1)
    pub max_in_flight: usize,
}

/// Ownership token for a running poll loop. Dropping it cancels the loop.
pub struct PollHandle {
    session: u64,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Stop ticking. Once this returns no further fetch is dispatched;
    /// fetches already in flight still report back and must be discarded
    /// by the receiver.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Disconnecting the stop channel wakes the ticker's select
        self.stop_tx.take();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the ticker for `session`.
pub fn spawn(
    service: Arc<dyn EstimationService>,
    events: Sender<ControlEvent>,
    session: u64,
    options: PollOptions,
) -> io::Result<PollHandle> {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let thread = thread::Builder::new()
        .name(format!("poll-{}", session))
        .spawn(move || run_ticker(service, events, session, options, stop_rx))?;
    Ok(PollHandle {
        session,
        stop_tx: Some(stop_tx),
        thread: Some(thread),
    })
}

fn run_ticker(
    service: Arc<dyn EstimationService>,
    events: Sender<ControlEvent>,
    session: u64,
    options: PollOptions,
    stop_rx: Receiver<()>,
) {
    if options.await_start_ack && !await_start(&service, &stop_rx) {
        debug!("Session {} cancelled before start acknowledgement", session);
        return;
    }

    info!(
        "Polling session {} every {} ms",
        session,
        options.interval.as_millis()
    );
    let ticker = tick(options.interval);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = options.max_in_flight.max(1);
    let mut dispatched: u64 = 0;
    let mut skipped: u64 = 0;

    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => {
                // Both may be ready at once; never dispatch after a cancel
                if let Err(TryRecvError::Disconnected) = stop_rx.try_recv() {
                    break;
                }
                let outstanding = in_flight.load(Ordering::Acquire);
                if outstanding >= max_in_flight {
                    skipped += 1;
                    debug!("Tick skipped: {} fetches still outstanding", outstanding);
                    continue;
                }
                if let Err(e) = dispatch_fetch(&service, &events, session, &in_flight) {
                    warn!("Could not spawn estimate fetch: {}", e);
                }
                dispatched += 1;
            }
        }
    }

    debug!(
        "Poll session {} stopped after {} fetches ({} ticks skipped)",
        session, dispatched, skipped
    );
}

/// Run `start_session` on a helper thread and wait for it or for cancellation.
/// Returns false if cancelled first. A failed start still counts as resolved.
fn await_start(service: &Arc<dyn EstimationService>, stop_rx: &Receiver<()>) -> bool {
    let (ack_tx, ack_rx) = bounded(1);
    let svc = service.clone();
    let spawned = thread::Builder::new()
        .name("start-session".into())
        .spawn(move || {
            let _ = ack_tx.send(svc.start_session());
        });
    if let Err(e) = spawned {
        warn!("Could not spawn start notification: {}", e);
        return true;
    }

    select! {
        recv(stop_rx) -> _ => false,
        recv(ack_rx) -> ack => {
            match ack {
                Ok(Ok(())) => debug!("Start acknowledged"),
                Ok(Err(e)) => warn!("Start notification failed: {}", e),
                Err(_) => warn!("Start notification thread exited without a result"),
            }
            true
        }
    }
}

/// Decrements the in-flight count when a fetch ends, panics included.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn acquire(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        InFlight(count.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn dispatch_fetch(
    service: &Arc<dyn EstimationService>,
    events: &Sender<ControlEvent>,
    session: u64,
    in_flight: &Arc<AtomicUsize>,
) -> io::Result<()> {
    let svc = service.clone();
    let tx = events.clone();
    let slot = InFlight::acquire(in_flight);
    // On spawn failure the closure, and the slot with it, is dropped
    thread::Builder::new()
        .name("estimate-fetch".into())
        .spawn(move || {
            let _slot = slot;
            let result = svc.estimate();
            // Controller gone means we are shutting down
            let _ = tx.send(ControlEvent::Estimate { session, result });
        })?;
    Ok(())
}

/// Fire-and-forget `start_session`.
pub fn notify_start(service: &Arc<dyn EstimationService>) {
    notify(service, "start", |s| s.start_session());
}

/// Fire-and-forget `stop_session`.
pub fn notify_stop(service: &Arc<dyn EstimationService>) {
    notify(service, "stop", |s| s.stop_session());
}

fn notify<F>(service: &Arc<dyn EstimationService>, what: &'static str, call: F)
where
    F: FnOnce(&dyn EstimationService) -> crate::error::Result<()> + Send + 'static,
{
    let svc = service.clone();
    let spawned = thread::Builder::new()
        .name(format!("{}-session", what))
        .spawn(move || {
            if let Err(e) = call(svc.as_ref()) {
                debug!("{} notification failed: {}", what, e);
            }
        });
    if let Err(e) = spawned {
        warn!("Could not spawn {} notification: {}", what, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TunerError};
    use crate::estimation::EstimateReading;
    use crossbeam_channel::unbounded;

    #[derive(Default)]
    struct CountingService {
        estimates: AtomicUsize,
    }

    impl EstimationService for CountingService {
        fn start_session(&self) -> Result<()> {
            Ok(())
        }
        fn estimate(&self) -> Result<EstimateReading> {
            let n = self.estimates.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 {
                Ok(EstimateReading::new(110.0, -20.0))
            } else {
                Err(TunerError::MalformedResponse("odd tick".into()))
            }
        }
        fn stop_session(&self) -> Result<()> {
            Ok(())
        }
    }

    fn options(ms: u64) -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(ms),
            await_start_ack: false,
            max_in_flight: 4,
        }
    }

    /// Every estimate blocks until the gate sender is dropped.
    struct HungService {
        started: AtomicUsize,
        gate: Receiver<()>,
    }

    impl EstimationService for HungService {
        fn start_session(&self) -> Result<()> {
            Ok(())
        }
        fn estimate(&self) -> Result<EstimateReading> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.recv();
            Err(TunerError::MalformedResponse("timed out".into()))
        }
        fn stop_session(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_ticks_continue_through_failures() {
        let svc = Arc::new(CountingService::default());
        let (tx, rx) = unbounded();
        let handle = spawn(svc.clone(), tx, 7, options(10)).unwrap();

        let mut ok = 0;
        let mut failed = 0;
        while ok + failed < 6 {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                ControlEvent::Estimate { session, result } => {
                    assert_eq!(session, 7);
                    if result.is_ok() {
                        ok += 1;
                    } else {
                        failed += 1;
                    }
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        handle.cancel();
        assert!(ok >= 1 && failed >= 1);
    }

    #[test]
    fn test_no_dispatch_after_cancel() {
        let svc = Arc::new(CountingService::default());
        let (tx, rx) = unbounded();
        let handle = spawn(svc.clone(), tx, 1, options(5)).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        handle.cancel();

        // Let in-flight workers finish, then the count must stay put
        thread::sleep(Duration::from_millis(50));
        let after_cancel = svc.estimates.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(svc.estimates.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn test_drop_cancels() {
        let svc = Arc::new(CountingService::default());
        let (tx, rx) = unbounded();
        {
            let _handle = spawn(svc.clone(), tx, 1, options(5)).unwrap();
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        thread::sleep(Duration::from_millis(50));
        let n = svc.estimates.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(svc.estimates.load(Ordering::SeqCst), n);
    }

    #[test]
    fn test_hung_backend_bounds_outstanding_fetches() {
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let svc = Arc::new(HungService {
            started: AtomicUsize::new(0),
            gate: gate_rx,
        });
        let (tx, rx) = unbounded();
        let handle = spawn(
            svc.clone(),
            tx,
            3,
            PollOptions {
                max_in_flight: 2,
                ..options(5)
            },
        )
        .unwrap();

        // ~30 ticks elapse, only two fetches may be stuck
        thread::sleep(Duration::from_millis(150));
        assert_eq!(svc.started.load(Ordering::SeqCst), 2);
        assert!(rx.try_recv().is_err());

        // Backend recovers: the stuck fetches report and ticking resumes
        drop(gate_tx);
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(first, ControlEvent::Estimate { session: 3, result: Err(_) }));
        thread::sleep(Duration::from_millis(50));
        assert!(svc.started.load(Ordering::SeqCst) > 2);
        handle.cancel();
    }
}
