//! Batch dispatcher: sends operator message templates through the engine,
//! either once or on a repeating schedule.
//!
//! At most one scheduled run exists at a time.  One-shot sends bypass the
//! guard and may overlap a scheduled run.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use fr_domain::error::{Error, Result};
use fr_domain::trace::TraceEvent;
use fr_protocol::{sanitize, BatchRun, ClientEvent, FixMessage};
use fr_sessions::{EventSink, SessionEngine, WireSessionId};

struct ActiveRun {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PassOutcome {
    sent: u64,
    failed: u64,
}

pub struct BatchDispatcher {
    engine: Arc<dyn SessionEngine>,
    sink: Arc<dyn EventSink>,
    begin_string: String,
    running: AtomicBool,
    /// Guarded together with `running` so `stop` never races a start.
    current: Mutex<Option<ActiveRun>>,
    generation: AtomicU64,
}

impl BatchDispatcher {
    pub fn new(
        engine: Arc<dyn SessionEngine>,
        sink: Arc<dyn EventSink>,
        begin_string: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            sink,
            begin_string: begin_string.into(),
            running: AtomicBool::new(false),
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Schedule `run`: `repeat_count` passes, `interval_ms` apart, the first
    /// one immediately.  Returns `false` without side effects when another
    /// run holds the guard.  Must be called inside a tokio runtime.
    pub fn start_batch(self: &Arc<Self>, run: BatchRun, client_id: Option<String>) -> bool {
        let (generation, cancel) = {
            let mut current = self.current.lock();
            if self
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return false;
            }
            let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
            let cancel = CancellationToken::new();
            *current = Some(ActiveRun {
                generation,
                cancel: cancel.clone(),
            });
            (generation, cancel)
        };

        tracing::info!(
            sender = %run.sender_comp_id,
            repeat_count = run.repeat_count,
            interval_ms = run.interval_ms,
            templates = run.messages.len(),
            client_id = ?client_id,
            "batch started"
        );
        TraceEvent::BatchStarted {
            sender: run.sender_comp_id.clone(),
            repeat_count: run.repeat_count,
            interval_ms: run.interval_ms,
            templates: run.messages.len(),
        }
        .emit();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let (outcome, cancelled) = this.run_schedule(&run, client_id.as_deref(), &cancel).await;
            this.finish(generation);
            tracing::info!(
                sender = %run.sender_comp_id,
                sent = outcome.sent,
                failed = outcome.failed,
                cancelled,
                "batch finished"
            );
            TraceEvent::BatchFinished {
                sender: run.sender_comp_id,
                sent: outcome.sent,
                failed: outcome.failed,
                cancelled,
            }
            .emit();
        });
        true
    }

    /// Cancel future scheduled passes and release the guard.  A pass
    /// already in progress completes.  Returns whether a run was active.
    pub fn stop(&self) -> bool {
        let mut current = self.current.lock();
        match current.take() {
            Some(run) => {
                run.cancel.cancel();
                self.running.store(false, Ordering::Release);
                tracing::info!(generation = run.generation, "batch stopped");
                true
            }
            None => false,
        }
    }

    /// One pass over `run.messages`, stopping at the first failure.
    /// Returns the number of messages sent.
    pub fn send_once(&self, run: &BatchRun, client_id: Option<&str>) -> Result<u32> {
        let mut sent = 0;
        for template in &run.messages {
            let session = self.send_one(template, &run.sender_comp_id)?;
            tracing::debug!(session = %session, "message sent");
            self.progress(client_id, 1);
            sent += 1;
        }
        Ok(sent)
    }

    async fn run_schedule(
        &self,
        run: &BatchRun,
        client_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> (PassOutcome, bool) {
        let mut total = PassOutcome::default();
        let mut ticker = tokio::time::interval(Duration::from_millis(run.interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for iteration in 1..=run.repeat_count {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (total, true),
                _ = ticker.tick() => {}
            }
            let pass = self.run_pass(run, iteration, client_id);
            total.sent += pass.sent;
            total.failed += pass.failed;
        }
        (total, false)
    }

    fn run_pass(&self, run: &BatchRun, iteration: u32, client_id: Option<&str>) -> PassOutcome {
        let mut outcome = PassOutcome::default();
        for template in &run.messages {
            match self.send_one(template, &run.sender_comp_id) {
                Ok(_) => {
                    outcome.sent += 1;
                    self.progress(client_id, iteration);
                }
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        sender = %run.sender_comp_id,
                        iteration,
                        error = %e,
                        "batch message failed, continuing"
                    );
                }
            }
        }
        outcome
    }

    /// Sanitize, parse, and send one template from `sender` to the
    /// template's TargetCompID.
    fn send_one(&self, template: &str, sender: &str) -> Result<WireSessionId> {
        let text = sanitize(template);
        let message = FixMessage::parse(&text).map_err(|e| Error::InvalidMessage(e.to_string()))?;
        let target = message
            .target_comp_id()
            .ok_or_else(|| Error::InvalidMessage("missing TargetCompID (56)".into()))?
            .to_owned();

        let session = WireSessionId::new(self.begin_string.as_str(), sender, target);
        if !self.engine.exists(&session) {
            return Err(Error::SessionNotFound(session.to_string()));
        }
        if !self.engine.send(message, &session)? {
            return Err(Error::LogonRequired(session.to_string()));
        }
        Ok(session)
    }

    fn progress(&self, client_id: Option<&str>, iteration: u32) {
        if let Some(client_id) = client_id {
            self.sink.publish(client_id, ClientEvent::batch_progress(iteration));
        }
    }

    fn finish(&self, generation: u64) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|run| run.generation == generation) {
            *current = None;
            self.running.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LoopbackEngine;
    use fr_protocol::message::{msg_type, tags};
    use fr_sessions::{EngineConfig, EngineEvent, EngineListener};
    use std::path::PathBuf;

    struct Quiet;

    impl EngineListener for Quiet {
        fn on_event(&self, _session: &WireSessionId, _event: EngineEvent<'_>) {}
    }

    #[derive(Default)]
    struct Progress(Mutex<Vec<String>>);

    impl EventSink for Progress {
        fn publish(&self, _client_id: &str, event: ClientEvent) {
            if let ClientEvent::BatchProgress { label } = event {
                self.0.lock().push(label);
            }
        }
    }

    struct Harness {
        engine: Arc<LoopbackEngine>,
        progress: Arc<Progress>,
        dispatcher: Arc<BatchDispatcher>,
    }

    fn session(target: &str) -> WireSessionId {
        WireSessionId::new("FIX.4.4", "S", target)
    }

    fn harness(targets: &[&str]) -> Harness {
        let engine = Arc::new(LoopbackEngine::new());
        for target in targets {
            let config = EngineConfig {
                session: session(target),
                host: "127.0.0.1".into(),
                port: 9000,
                heartbeat_secs: 30,
                reconnect_secs: 5,
                start_time: "00:00:00".into(),
                end_time: "00:00:00".into(),
                use_data_dictionary: false,
                data_dictionary: String::new(),
                validate_user_defined_fields: false,
                file_store_path: PathBuf::new(),
                file_log_path: PathBuf::new(),
                tls: None,
            };
            engine.start(&config, Arc::new(Quiet)).unwrap();
        }
        let progress = Arc::new(Progress::default());
        let dispatcher = Arc::new(BatchDispatcher::new(
            engine.clone(),
            progress.clone(),
            "FIX.4.4",
        ));
        Harness {
            engine,
            progress,
            dispatcher,
        }
    }

    fn run(messages: &[&str], repeat_count: u32, interval_ms: u64) -> BatchRun {
        BatchRun {
            sender_comp_id: "S".into(),
            repeat_count,
            interval_ms,
            messages: messages.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Application messages sent to `target`, excluding the logon.
    fn app_sent(h: &Harness, target: &str) -> usize {
        h.engine
            .sent(&session(target))
            .iter()
            .filter(|m| m.msg_type() != Some(msg_type::LOGON))
            .count()
    }

    async fn wait_idle(dispatcher: &BatchDispatcher) {
        while dispatcher.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_runs_every_pass_then_releases_guard() {
        let h = harness(&["T"]);
        let started = h
            .dispatcher
            .start_batch(run(&["35=D|56=T|11=A|", "35=D|56=T|11=B|"], 3, 1_000), Some("c1".into()));
        assert!(started);
        assert!(h.dispatcher.is_running());

        wait_idle(&h.dispatcher).await;
        assert_eq!(app_sent(&h, "T"), 6);
        assert_eq!(
            *h.progress.0.lock(),
            vec![
                "Sent batch 1",
                "Sent batch 1",
                "Sent batch 2",
                "Sent batch 2",
                "Sent batch 3",
                "Sent batch 3"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_while_running() {
        let h = harness(&["T"]);
        assert!(h.dispatcher.start_batch(run(&["35=D|56=T|"], 5, 1_000), None));
        assert!(!h.dispatcher.start_batch(run(&["35=D|56=T|"], 5, 1_000), None));
        assert!(h.dispatcher.stop());
        assert!(!h.dispatcher.is_running());
        assert!(!h.dispatcher.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_starts_admit_exactly_one() {
        let h = harness(&["T"]);
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let d = h.dispatcher.clone();
            tasks.push(tokio::spawn(async move {
                d.start_batch(run(&["35=D|56=T|"], 2, 1_000), None)
            }));
        }
        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_remaining_passes() {
        let h = harness(&["T"]);
        assert!(h.dispatcher.start_batch(run(&["35=D|56=T|"], 5, 1_000), None));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(h.dispatcher.stop());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(app_sent(&h, "T"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_run_does_not_release_newer_guard() {
        let h = harness(&["T"]);
        assert!(h.dispatcher.start_batch(run(&["35=D|56=T|"], 3, 1_000), None));
        h.dispatcher.stop();
        assert!(h.dispatcher.start_batch(run(&["35=D|56=T|"], 50, 1_000), None));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(h.dispatcher.is_running());
        h.dispatcher.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_failures_are_skipped() {
        let h = harness(&["T"]);
        let templates = ["35=D|56=T|11=A|", "35=D|56=GHOST|", "not a fix message", "35=D|56=T|11=B|"];
        assert!(h.dispatcher.start_batch(run(&templates, 2, 100), Some("c1".into())));
        wait_idle(&h.dispatcher).await;
        assert_eq!(app_sent(&h, "T"), 4);
        assert_eq!(h.progress.0.lock().len(), 4);
    }

    #[tokio::test]
    async fn send_once_stops_at_first_failure() {
        let h = harness(&["T"]);
        let err = h
            .dispatcher
            .send_once(&run(&["35=D|56=T|", "35=D|56=GHOST|", "35=D|56=T|"], 1, 0), Some("c1"))
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
        assert_eq!(app_sent(&h, "T"), 1);
        assert_eq!(*h.progress.0.lock(), vec!["Sent batch 1"]);
    }

    #[tokio::test]
    async fn send_once_requires_logon() {
        let h = harness(&["T"]);
        h.engine
            .inject_admin(&session("T"), &FixMessage::new(msg_type::LOGOUT))
            .unwrap();
        let err = h
            .dispatcher
            .send_once(&run(&["35=D|56=T|"], 1, 0), None)
            .unwrap_err();
        assert!(matches!(err, Error::LogonRequired(_)));
    }

    #[tokio::test]
    async fn send_once_rejects_unroutable_text() {
        let h = harness(&["T"]);
        let err = h
            .dispatcher
            .send_once(&run(&["35=D|11=NO-TARGET|"], 1, 0), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn send_once_ignores_the_batch_guard() {
        let h = harness(&["T", "U"]);
        assert!(h.dispatcher.start_batch(run(&["35=D|56=T|"], 10, 1_000), None));
        let sent = h
            .dispatcher
            .send_once(&run(&["35=D|56=U|", "35=D|56=U|"], 1, 0), None)
            .unwrap();
        assert_eq!(sent, 2);
        assert_eq!(app_sent(&h, "U"), 2);
        h.dispatcher.stop();
    }

    #[tokio::test]
    async fn sent_messages_carry_sender_and_sequence() {
        let h = harness(&["T"]);
        h.dispatcher
            .send_once(&run(&["\"35=D|56=T|11=X|10=999|\""], 1, 0), None)
            .unwrap();
        let sent = h.engine.sent(&session("T"));
        let last = sent.last().unwrap();
        assert_eq!(last.get(tags::SENDER_COMP_ID), Some("S"));
        assert_eq!(last.get(11), Some("X"));
        assert_eq!(last.get(tags::MSG_SEQ_NUM), Some("2"));
    }
}
