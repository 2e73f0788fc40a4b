use crate::burst::{BatchRequest, BurstCapture, DEFAULT_CAPTURE_QUALITY};
use crate::camera::{CameraDevice, MediaLibrary};
use crate::clock::Clock;
use crate::countdown::Countdown;
use crate::error::CaptureError;
use crate::permissions::{PermissionGate, PermissionSnapshot};
use crate::photos::PhotoStore;
use crate::plan::{CapturePlan, Orientation};
use crate::sequencer::{Phase, SessionState, Trigger};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Shutter,
    RequestPermissions,
    /// Leave the capture screen. Cancels any pending countdown or delay.
    Return,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started {
        status: String,
    },
    PermissionRequired(PermissionSnapshot),
    PhaseChanged {
        phase: Phase,
        prompt: Option<String>,
        status: String,
    },
    CountdownTick {
        remaining: u32,
    },
    ShotCaptured {
        orientation: Orientation,
        shot: u32,
        planned: u32,
        uri: PathBuf,
        photo_id: Option<String>,
    },
    CaptureFailed {
        orientation: Orientation,
        shot: u32,
        message: String,
    },
    Ended(SessionSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    PermissionDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub outcome: SessionOutcome,
    pub horizontal_taken: u32,
    pub vertical_taken: u32,
    pub failures: u32,
}

impl SessionSummary {
    fn new() -> Self {
        Self {
            outcome: SessionOutcome::Cancelled,
            horizontal_taken: 0,
            vertical_taken: 0,
            failures: 0,
        }
    }

    pub fn total_taken(&self) -> u32 {
        self.horizontal_taken + self.vertical_taken
    }

    fn add_shots(&mut self, orientation: Orientation, shots: u32) {
        match orientation {
            Orientation::Horizontal => self.horizontal_taken += shots,
            Orientation::Vertical => self.vertical_taken += shots,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub countdown: Countdown,
    pub quality: f32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            countdown: Countdown::default(),
            quality: DEFAULT_CAPTURE_QUALITY,
        }
    }
}

/// Owns one capture session: the camera, the session state and the wiring
/// between permission gate, countdown, burst loop and sequencer.
pub struct CaptureSession {
    camera: Arc<dyn CameraDevice>,
    media_library: Arc<dyn MediaLibrary>,
    permissions: Arc<dyn PermissionGate>,
    photos: PhotoStore,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl CaptureSession {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        media_library: Arc<dyn MediaLibrary>,
        permissions: Arc<dyn PermissionGate>,
        photos: PhotoStore,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            camera,
            media_library,
            permissions,
            photos,
            clock,
            settings,
        }
    }

    /// Run until the user returns. A closed command channel counts as leaving
    /// the screen.
    pub async fn run(
        &self,
        plan: CapturePlan,
        mut command_rx: mpsc::UnboundedReceiver<ControlCommand>,
        event_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
    ) -> Result<SessionSummary> {
        plan.validate().map_err(anyhow::Error::msg)?;

        let mut summary = SessionSummary::new();
        let mut state = SessionState::new(&plan);

        send_event(
            &event_tx,
            SessionEvent::Started {
                status: state.status_line(&plan),
            },
        );
        tracing::info!(
            shot_type = %plan.shot_type,
            horizontal = plan.horizontal_count,
            vertical = plan.vertical_count,
            "capture session started"
        );

        let mut permissions = self.permissions.check().await;
        if !permissions.allows_capture() {
            send_event(&event_tx, SessionEvent::PermissionRequired(permissions));
        }
        while !permissions.allows_capture() {
            match command_rx.recv().await {
                Some(ControlCommand::RequestPermissions) => {
                    permissions = self.permissions.request().await;
                    if !permissions.allows_capture() {
                        send_event(&event_tx, SessionEvent::PermissionRequired(permissions));
                    }
                }
                Some(ControlCommand::Shutter) => {
                    tracing::debug!("shutter ignored until permissions are granted");
                }
                Some(ControlCommand::Return) | None => {
                    summary.outcome = SessionOutcome::PermissionDenied;
                    return Ok(finish(summary, &event_tx));
                }
            }
        }

        send_phase(&state, &plan, &event_tx);

        loop {
            let phase = state.phase;
            match phase {
                Phase::Waiting(_) => match command_rx.recv().await {
                    Some(ControlCommand::Shutter) => {
                        advance(&mut state, Trigger::ShutterPressed, &plan, &event_tx)?;
                    }
                    Some(ControlCommand::RequestPermissions) => {}
                    Some(ControlCommand::Return) | None => {
                        summary.outcome = SessionOutcome::Cancelled;
                        return Ok(finish(summary, &event_tx));
                    }
                },
                Phase::Countdown(_) => {
                    let finished = {
                        let countdown =
                            self.settings
                                .countdown
                                .run(self.clock.as_ref(), |remaining| {
                                    state.countdown_remaining = remaining;
                                    send_event(&event_tx, SessionEvent::CountdownTick { remaining });
                                });
                        tokio::pin!(countdown);
                        loop {
                            tokio::select! {
                                biased;
                                cmd = command_rx.recv() => match cmd {
                                    Some(ControlCommand::Return) | None => break false,
                                    Some(other) => {
                                        tracing::debug!(?other, "command ignored during countdown");
                                    }
                                },
                                _ = &mut countdown => break true,
                            }
                        }
                    };

                    if !finished {
                        summary.outcome = SessionOutcome::Cancelled;
                        return Ok(finish(summary, &event_tx));
                    }
                    advance(&mut state, Trigger::CountdownFinished, &plan, &event_tx)?;
                }
                Phase::Capturing(orientation) => {
                    let planned = plan.count_for(orientation);
                    let media_library = permissions
                        .media
                        .is_granted()
                        .then_some(self.media_library.as_ref());
                    let burst = BurstCapture {
                        camera: self.camera.as_ref(),
                        media_library,
                        photos: &self.photos,
                        clock: self.clock.as_ref(),
                    };
                    let request = BatchRequest {
                        orientation,
                        count: planned,
                        interval: plan.interval,
                        quality: self.settings.quality,
                    };

                    let result = {
                        let batch = burst.run(request, |record| {
                            state.record_shot(&plan);
                            send_event(
                                &event_tx,
                                SessionEvent::ShotCaptured {
                                    orientation,
                                    shot: record.shot,
                                    planned,
                                    uri: record.uri.clone(),
                                    photo_id: record.photo.as_ref().map(|p| p.id.clone()),
                                },
                            );
                        });
                        tokio::pin!(batch);
                        loop {
                            tokio::select! {
                                biased;
                                cmd = command_rx.recv() => match cmd {
                                    Some(ControlCommand::Return) | None => break None,
                                    Some(other) => {
                                        tracing::debug!(?other, "command ignored while capturing");
                                    }
                                },
                                result = &mut batch => break Some(result),
                            }
                        }
                    };

                    summary.add_shots(orientation, state.shots_taken_in_phase);
                    match result {
                        None => {
                            summary.outcome = SessionOutcome::Cancelled;
                            return Ok(finish(summary, &event_tx));
                        }
                        Some(Ok(report)) => {
                            tracing::info!(
                                %orientation,
                                captured = report.captured(),
                                "batch finished"
                            );
                            advance(&mut state, Trigger::BatchFinished, &plan, &event_tx)?;
                        }
                        Some(Err(err)) => {
                            summary.failures += 1;
                            tracing::warn!("{err}");
                            let CaptureError::Camera { shot, message, .. } = err;
                            send_event(
                                &event_tx,
                                SessionEvent::CaptureFailed {
                                    orientation,
                                    shot,
                                    message,
                                },
                            );
                            advance(&mut state, Trigger::BatchInterrupted, &plan, &event_tx)?;
                        }
                    }
                }
                Phase::Complete => match command_rx.recv().await {
                    Some(ControlCommand::Return) | None => {
                        summary.outcome = SessionOutcome::Completed;
                        return Ok(finish(summary, &event_tx));
                    }
                    Some(other) => {
                        tracing::debug!(?other, "session complete; only return is accepted");
                    }
                },
            }
        }
    }
}

fn advance(
    state: &mut SessionState,
    trigger: Trigger,
    plan: &CapturePlan,
    event_tx: &Option<mpsc::UnboundedSender<SessionEvent>>,
) -> Result<()> {
    state.apply(trigger, plan)?;
    send_phase(state, plan, event_tx);
    Ok(())
}

fn send_phase(
    state: &SessionState,
    plan: &CapturePlan,
    event_tx: &Option<mpsc::UnboundedSender<SessionEvent>>,
) {
    send_event(
        event_tx,
        SessionEvent::PhaseChanged {
            phase: state.phase,
            prompt: state.user_prompt.clone(),
            status: state.status_line(plan),
        },
    );
}

fn finish(
    summary: SessionSummary,
    event_tx: &Option<mpsc::UnboundedSender<SessionEvent>>,
) -> SessionSummary {
    tracing::info!(
        outcome = ?summary.outcome,
        horizontal = summary.horizontal_taken,
        vertical = summary.vertical_taken,
        failures = summary.failures,
        "capture session ended"
    );
    send_event(event_tx, SessionEvent::Ended(summary));
    summary
}

fn send_event(event_tx: &Option<mpsc::UnboundedSender<SessionEvent>>, event: SessionEvent) {
    if let Some(tx) = event_tx {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CaptureSession, ControlCommand, SessionEvent, SessionOutcome, SessionSettings,
        SessionSummary,
    };
    use crate::camera::{CameraDevice, DirectoryMediaLibrary, PhotoRef, SimulatedCamera};
    use crate::clock::{Clock, ManualClock, TokioClock};
    use crate::countdown::Countdown;
    use crate::permissions::{PermissionSnapshot, PermissionStatus, StaticPermissionGate};
    use crate::photos::PhotoStore;
    use crate::plan::{CapturePlan, Orientation};
    use crate::sequencer::{Phase, RETRY_PROMPT, ROTATE_PROMPT};
    use crate::store::MemoryKeyValueStore;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};
    use tokio::sync::mpsc;

    struct CountingCamera {
        inner: SimulatedCamera,
        calls: AtomicU32,
        fail_on: Option<u32>,
    }

    impl CountingCamera {
        fn new(dir: &Path, fail_on: Option<u32>) -> Self {
            Self {
                inner: SimulatedCamera::new(dir),
                calls: AtomicU32::new(0),
                fail_on,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CameraDevice for CountingCamera {
        async fn capture(&self, quality: f32) -> Result<PhotoRef> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(call) {
                return Err(anyhow!("lens cap on"));
            }
            self.inner.capture(quality).await
        }
    }

    struct Fixture {
        temp: TempDir,
        camera: Arc<CountingCamera>,
        photos: PhotoStore,
    }

    impl Fixture {
        fn new(fail_on: Option<u32>) -> Self {
            let temp = tempdir().expect("tempdir");
            let camera = Arc::new(CountingCamera::new(&temp.path().join("captures"), fail_on));
            Self {
                temp,
                camera,
                photos: PhotoStore::new(Arc::new(MemoryKeyValueStore::new())),
            }
        }

        fn session(&self, permissions: PermissionSnapshot, clock: Arc<dyn Clock>) -> CaptureSession {
            CaptureSession::new(
                self.camera.clone(),
                Arc::new(DirectoryMediaLibrary::new(self.temp.path().join("library"))),
                Arc::new(StaticPermissionGate::new(permissions)),
                self.photos.clone(),
                clock,
                SessionSettings {
                    countdown: Countdown::new(3),
                    quality: 1.0,
                },
            )
        }
    }

    fn plan(horizontal: u32, vertical: u32, interval_secs: u64) -> CapturePlan {
        CapturePlan {
            horizontal_count: horizontal,
            vertical_count: vertical,
            interval: Duration::from_secs(interval_secs),
            ..CapturePlan::default()
        }
    }

    /// Run a session, answering each event with the commands `script` picks.
    async fn drive<F>(
        session: &CaptureSession,
        plan: CapturePlan,
        mut script: F,
    ) -> (SessionSummary, Vec<SessionEvent>)
    where
        F: FnMut(&SessionEvent) -> Vec<ControlCommand>,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let driver = async move {
            let mut events = Vec::new();
            while let Some(event) = event_rx.recv().await {
                for command in script(&event) {
                    let _ = command_tx.send(command);
                }
                events.push(event);
            }
            events
        };

        let (summary, events) = tokio::join!(session.run(plan, command_rx, Some(event_tx)), driver);
        (summary.expect("session run"), events)
    }

    fn autopilot(event: &SessionEvent) -> Vec<ControlCommand> {
        match event {
            SessionEvent::PhaseChanged {
                phase: Phase::Waiting(_),
                ..
            } => vec![ControlCommand::Shutter],
            SessionEvent::PhaseChanged {
                phase: Phase::Complete,
                ..
            } => vec![ControlCommand::Return],
            _ => Vec::new(),
        }
    }

    fn phases(events: &[SessionEvent]) -> Vec<Phase> {
        events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::PhaseChanged { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect()
    }

    fn shot_orientations(events: &[SessionEvent]) -> Vec<Orientation> {
        events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::ShotCaptured { orientation, .. } => Some(*orientation),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn captures_horizontal_then_vertical_batches() {
        use Orientation::{Horizontal, Vertical};
        let fixture = Fixture::new(None);
        let clock = Arc::new(ManualClock::new());
        let session = fixture.session(PermissionSnapshot::granted(), clock.clone());

        let (summary, events) = drive(&session, plan(2, 1, 2), autopilot).await;

        assert_eq!(
            phases(&events),
            vec![
                Phase::Waiting(Horizontal),
                Phase::Countdown(Horizontal),
                Phase::Capturing(Horizontal),
                Phase::Waiting(Vertical),
                Phase::Countdown(Vertical),
                Phase::Capturing(Vertical),
                Phase::Complete,
            ]
        );
        assert_eq!(shot_orientations(&events), vec![Horizontal, Horizontal, Vertical]);
        assert_eq!(summary.outcome, SessionOutcome::Completed);
        assert_eq!((summary.horizontal_taken, summary.vertical_taken), (2, 1));
        assert_eq!(fixture.photos.list().len(), 3);

        let library_files = std::fs::read_dir(fixture.temp.path().join("library"))
            .expect("media library")
            .count();
        assert_eq!(library_files, 3);

        let second = Duration::from_secs(1);
        assert_eq!(
            clock.sleeps(),
            vec![
                second,
                second,
                second,
                Duration::from_secs(2),
                second,
                second,
                second
            ]
        );

        let rotate_prompt = events.iter().any(|event| {
            matches!(event, SessionEvent::PhaseChanged { prompt: Some(p), .. } if p == ROTATE_PROMPT)
        });
        assert!(rotate_prompt);
    }

    #[tokio::test]
    async fn vertical_only_plan_never_enters_horizontal() {
        let fixture = Fixture::new(None);
        let session = fixture.session(PermissionSnapshot::granted(), Arc::new(ManualClock::new()));

        let (summary, events) = drive(&session, plan(0, 2, 1), autopilot).await;

        assert_eq!(
            phases(&events),
            vec![
                Phase::Waiting(Orientation::Vertical),
                Phase::Countdown(Orientation::Vertical),
                Phase::Capturing(Orientation::Vertical),
                Phase::Complete,
            ]
        );
        assert_eq!(summary.vertical_taken, 2);
        assert_eq!(summary.horizontal_taken, 0);
    }

    #[tokio::test]
    async fn empty_plan_completes_on_first_shutter() {
        let fixture = Fixture::new(None);
        let clock = Arc::new(ManualClock::new());
        let session = fixture.session(PermissionSnapshot::granted(), clock.clone());

        let (summary, events) = drive(&session, plan(0, 0, 3), autopilot).await;

        assert_eq!(
            phases(&events),
            vec![Phase::Waiting(Orientation::Horizontal), Phase::Complete]
        );
        assert_eq!(summary.outcome, SessionOutcome::Completed);
        assert_eq!(summary.total_taken(), 0);
        assert_eq!(fixture.camera.calls(), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn returning_mid_batch_abandons_the_pending_delay() {
        let fixture = Fixture::new(None);
        let session = fixture.session(PermissionSnapshot::granted(), Arc::new(TokioClock));
        let start = tokio::time::Instant::now();

        let (summary, events) = drive(&session, plan(5, 2, 100), |event| match event {
            SessionEvent::PhaseChanged {
                phase: Phase::Waiting(_),
                ..
            } => vec![ControlCommand::Shutter],
            SessionEvent::ShotCaptured { shot: 1, .. } => vec![ControlCommand::Return],
            _ => Vec::new(),
        })
        .await;

        assert_eq!(summary.outcome, SessionOutcome::Cancelled);
        assert_eq!((summary.horizontal_taken, summary.vertical_taken), (1, 0));
        assert_eq!(fixture.camera.calls(), 1);
        assert_eq!(fixture.photos.list().len(), 1);
        assert_eq!(shot_orientations(&events), vec![Orientation::Horizontal]);
        assert_eq!(
            phases(&events).last(),
            Some(&Phase::Capturing(Orientation::Horizontal))
        );
        assert!(start.elapsed() < Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn returning_during_countdown_stops_ticks_and_capture() {
        let fixture = Fixture::new(None);
        let session = fixture.session(PermissionSnapshot::granted(), Arc::new(TokioClock));

        let (summary, events) = drive(&session, plan(3, 3, 1), |event| match event {
            SessionEvent::PhaseChanged {
                phase: Phase::Waiting(_),
                ..
            } => vec![ControlCommand::Shutter],
            SessionEvent::CountdownTick { remaining: 2 } => vec![ControlCommand::Return],
            _ => Vec::new(),
        })
        .await;

        let ticks: Vec<u32> = events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::CountdownTick { remaining } => Some(*remaining),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![3, 2]);
        assert_eq!(summary.outcome, SessionOutcome::Cancelled);
        assert_eq!(fixture.camera.calls(), 0);
        assert!(
            !phases(&events)
                .iter()
                .any(|phase| matches!(phase, Phase::Capturing(_)))
        );
        assert!(matches!(events.last(), Some(SessionEvent::Ended(_))));
    }

    #[tokio::test]
    async fn camera_failure_interrupts_batch_and_rearms() {
        let fixture = Fixture::new(Some(2));
        let session = fixture.session(PermissionSnapshot::granted(), Arc::new(ManualClock::new()));

        let mut presses = 0;
        let (summary, events) = drive(&session, plan(3, 0, 1), |event| match event {
            SessionEvent::PhaseChanged {
                phase: Phase::Waiting(_),
                ..
            } => {
                presses += 1;
                if presses == 1 {
                    vec![ControlCommand::Shutter]
                } else {
                    vec![ControlCommand::Return]
                }
            }
            _ => Vec::new(),
        })
        .await;

        let failure = events.iter().find_map(|event| match event {
            SessionEvent::CaptureFailed { shot, message, .. } => Some((*shot, message.clone())),
            _ => None,
        });
        let (shot, message) = failure.expect("capture failure surfaced");
        assert_eq!(shot, 2);
        assert!(message.contains("lens cap on"));

        assert_eq!(fixture.camera.calls(), 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.horizontal_taken, 1);
        assert_eq!(summary.outcome, SessionOutcome::Cancelled);

        let retry_prompt = events.iter().any(|event| {
            matches!(event, SessionEvent::PhaseChanged { prompt: Some(p), .. } if p == RETRY_PROMPT)
        });
        assert!(retry_prompt);
    }

    #[tokio::test]
    async fn missing_permissions_block_capture() {
        let fixture = Fixture::new(None);
        let denied = PermissionSnapshot {
            camera: PermissionStatus::Granted,
            media: PermissionStatus::Denied,
        };
        let session = fixture.session(denied, Arc::new(ManualClock::new()));

        let mut prompts = 0;
        let (summary, events) = drive(&session, plan(2, 2, 1), |event| match event {
            SessionEvent::PermissionRequired(_) => {
                prompts += 1;
                if prompts == 1 {
                    vec![ControlCommand::RequestPermissions]
                } else {
                    vec![ControlCommand::Return]
                }
            }
            _ => Vec::new(),
        })
        .await;

        assert_eq!(summary.outcome, SessionOutcome::PermissionDenied);
        assert_eq!(prompts, 2);
        assert!(phases(&events).is_empty());
        assert_eq!(fixture.camera.calls(), 0);
    }

    #[tokio::test]
    async fn complete_session_ignores_shutter_until_return() {
        let fixture = Fixture::new(None);
        let session = fixture.session(PermissionSnapshot::granted(), Arc::new(ManualClock::new()));

        let (summary, events) = drive(&session, plan(1, 0, 1), |event| match event {
            SessionEvent::PhaseChanged {
                phase: Phase::Waiting(_),
                ..
            } => vec![ControlCommand::Shutter],
            SessionEvent::PhaseChanged {
                phase: Phase::Complete,
                ..
            } => vec![ControlCommand::Shutter, ControlCommand::Return],
            _ => Vec::new(),
        })
        .await;

        assert_eq!(summary.outcome, SessionOutcome::Completed);
        assert_eq!(fixture.camera.calls(), 1);
        assert_eq!(phases(&events).last(), Some(&Phase::Complete));
    }
}
