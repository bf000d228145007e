//! Async driver for one live session.
//!
//! The runner owns the session on a single task and multiplexes its inputs
//! with `tokio::select!`: timer ticks, position samples, provider results
//! and user commands. Each input is applied to completion before the next
//! is polled, so the session never sees concurrent mutation.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use tokio::{
    sync::mpsc,
    task::{JoinError, JoinHandle},
    time::{interval_at, Instant, Interval},
};

use crate::{
    alerts::{deliver, AlertSink},
    models::RunRecord,
    position::{PositionError, PositionSource, PositionSubscription},
    providers::{DirectionsProvider, PoiProvider, ProviderError},
    recording::{RecordingError, RecordingPipeline},
    session::{LiveSession, TrackingError},
};

const COMMAND_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Pause,
    Resume,
    Finish,
    /// Stops without recording anything.
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Finished(RunRecord),
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("session has already ended")]
pub struct SessionEnded;

/// User controls for a running session.
#[derive(Debug, Clone)]
pub struct SessionControl {
    sender: mpsc::Sender<SessionCommand>,
}

/// Creates the control handle and the command stream consumed by
/// [`SessionRunner::run`]. Dropping every handle cancels the session.
pub fn control() -> (SessionControl, mpsc::Receiver<SessionCommand>) {
    let (sender, receiver) = mpsc::channel(COMMAND_CAPACITY);
    (SessionControl { sender }, receiver)
}

impl SessionControl {
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionEnded> {
        self.sender.send(command).await.map_err(|_| SessionEnded)
    }

    pub async fn pause(&self) -> Result<(), SessionEnded> {
        self.send(SessionCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), SessionEnded> {
        self.send(SessionCommand::Resume).await
    }

    pub async fn finish(&self) -> Result<(), SessionEnded> {
        self.send(SessionCommand::Finish).await
    }

    pub async fn cancel(&self) -> Result<(), SessionEnded> {
        self.send(SessionCommand::Cancel).await
    }

    pub fn is_ended(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Position subscription and elapsed-time ticker, held for exactly as long
/// as a session is live. Both are released on drop.
pub struct ActiveSessionHandle {
    subscription: PositionSubscription,
    ticker: Interval,
}

impl ActiveSessionHandle {
    pub fn acquire(
        source: &mut dyn PositionSource,
        tick_period: Duration,
    ) -> Result<Self, PositionError> {
        let subscription = source.subscribe()?;
        let ticker = interval_at(Instant::now() + tick_period, tick_period);
        Ok(Self {
            subscription,
            ticker,
        })
    }

    fn parts(&mut self) -> (&mut Interval, &mut PositionSubscription) {
        (&mut self.ticker, &mut self.subscription)
    }

    pub fn release(self) {
        tracing::debug!("Released position subscription and session timer");
    }
}

/// Aborts the task when dropped, so pending provider calls never outlive
/// the session that asked for them.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn provider_list<T>(
    what: &str,
    result: Result<Result<Vec<T>, ProviderError>, JoinError>,
) -> Vec<T> {
    match result {
        Ok(Ok(items)) => items,
        Ok(Err(err)) => {
            tracing::warn!("{} unavailable, continuing without: {}", what, err);
            Vec::new()
        }
        Err(err) => {
            tracing::warn!("{} lookup task failed: {}", what, err);
            Vec::new()
        }
    }
}

enum Exit {
    Finish,
    Cancel,
}

pub struct SessionRunner {
    directions: Arc<dyn DirectionsProvider>,
    pois: Arc<dyn PoiProvider>,
    alerts: Arc<dyn AlertSink>,
    pipeline: RecordingPipeline,
}

impl SessionRunner {
    pub fn new(
        directions: Arc<dyn DirectionsProvider>,
        pois: Arc<dyn PoiProvider>,
        alerts: Arc<dyn AlertSink>,
        pipeline: RecordingPipeline,
    ) -> Self {
        Self {
            directions,
            pois,
            alerts,
            pipeline,
        }
    }

    /// Starts `session` and drives it until a finish or cancel command.
    ///
    /// The session stays alive when the position stream ends; the clock
    /// keeps running until the runner is told to stop.
    pub async fn run(
        &self,
        mut session: LiveSession,
        source: &mut dyn PositionSource,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) -> Result<SessionOutcome, RunnerError> {
        let mut handle = ActiveSessionHandle::acquire(source, session.config().tick_period)?;
        session.start()?;

        let waypoints = session.route().path.clone();
        let directions = Arc::clone(&self.directions);
        let mut steps_task =
            AbortOnDrop(tokio::spawn(async move { directions.steps(&waypoints).await }));

        let origin = session.route().path[0];
        let radius_m = session.config().poi_search_radius_m;
        let category = session.config().poi_category.clone();
        let pois = Arc::clone(&self.pois);
        let mut pois_task = AbortOnDrop(tokio::spawn(async move {
            pois.nearby(origin, radius_m, &category).await
        }));

        let mut steps_pending = true;
        let mut pois_pending = true;
        let mut position_open = true;

        let exit = loop {
            let (ticker, subscription) = handle.parts();
            tokio::select! {
                _ = ticker.tick() => {
                    session.on_timer_tick();
                }
                sample = subscription.next(), if position_open => match sample {
                    Some(sample) => {
                        for event in session.on_position_sample(&sample) {
                            deliver(self.alerts.as_ref(), &event);
                        }
                    }
                    None => {
                        tracing::warn!("Position stream ended; session keeps running");
                        position_open = false;
                    }
                },
                result = &mut steps_task, if steps_pending => {
                    steps_pending = false;
                    session.set_navigation_steps(provider_list("Directions", result));
                }
                result = &mut pois_task, if pois_pending => {
                    pois_pending = false;
                    session.set_points_of_interest(provider_list("Points of interest", result));
                }
                command = commands.recv() => match command {
                    Some(SessionCommand::Pause) => {
                        session.pause();
                    }
                    Some(SessionCommand::Resume) => {
                        session.resume();
                    }
                    Some(SessionCommand::Finish) => break Exit::Finish,
                    Some(SessionCommand::Cancel) | None => break Exit::Cancel,
                },
            }
        };

        handle.release();
        drop(steps_task);
        drop(pois_task);

        match exit {
            Exit::Cancel => {
                tracing::info!(
                    "Session on route {} cancelled after {}s",
                    session.route().id,
                    session.elapsed_seconds()
                );
                Ok(SessionOutcome::Cancelled)
            }
            Exit::Finish => {
                let finished = session.finish()?;
                let record = self.pipeline.record(finished).await?;
                Ok(SessionOutcome::Finished(record))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alerts::{Alert, MemoryAlertSink, OFF_ROUTE_VIBRATION_MS},
        config::TrackingConfig,
        models::{Coordinate, NavigationStep, PointOfInterest, PositionSample, Route},
        position::ChannelPositionSource,
        providers::{FixedDirections, FixedPois, FixedText, Offline},
        storage::{MemoryStore, RunStore},
    };
    use chrono::Utc;

    fn straight_route() -> Route {
        let path: Vec<_> = (0..=10)
            .map(|i| Coordinate::new(45.0 + i as f64 * 0.001, 5.0))
            .collect();
        Route {
            id: "river".into(),
            name: "River Path".into(),
            description: String::new(),
            distance_km: 1.11,
            path,
            elevation_gain_m: 0.0,
            difficulty: Default::default(),
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn sample(lat: f64, lon: f64) -> PositionSample {
        PositionSample::new(Coordinate::new(lat, lon), 5.0)
    }

    struct Fixture {
        runner: SessionRunner,
        alerts: Arc<MemoryAlertSink>,
        store: Arc<MemoryStore>,
    }

    fn fixture(directions: Arc<dyn DirectionsProvider>, pois: Arc<dyn PoiProvider>) -> Fixture {
        let alerts = Arc::new(MemoryAlertSink::default());
        let store = Arc::new(MemoryStore::new());
        let pipeline = RecordingPipeline::new(Arc::new(FixedText::new("Well paced.", "")), store.clone());
        Fixture {
            runner: SessionRunner::new(directions, pois, alerts.clone(), pipeline),
            alerts,
            store,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finished_run_is_recorded_with_alerts() {
        let steps = vec![NavigationStep {
            instruction: "Turn left at the bridge".into(),
            location: Coordinate::new(45.002, 5.0),
            distance_m: 200.0,
        }];
        let cafe = PointOfInterest {
            id: "node/1".into(),
            location: Coordinate::new(45.0025, 5.0005),
            label: "Kiosk".into(),
        };
        let Fixture { runner, alerts, store } = fixture(
            Arc::new(FixedDirections::new(steps)),
            Arc::new(FixedPois::new(vec![cafe])),
        );
        let (tx, source) = ChannelPositionSource::channel();
        let (control, commands) = control();
        let session = LiveSession::new(straight_route(), TrackingConfig::default()).unwrap();

        let task = tokio::spawn(async move {
            let mut source = source;
            runner.run(session, &mut source, commands).await
        });

        // let the provider lookups land before moving
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(sample(45.0, 5.0)).await.unwrap();
        tx.send(sample(45.001, 5.0)).await.unwrap();
        tx.send(sample(45.002, 5.0)).await.unwrap();
        tx.send(sample(45.002, 5.002)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        control.finish().await.unwrap();

        let outcome = task.await.unwrap().unwrap();
        let SessionOutcome::Finished(record) = outcome else {
            panic!("expected a finished run");
        };
        assert_eq!(record.duration_seconds, 3);
        assert_eq!(record.recorded_path.len(), 4);
        assert!(record.distance_km > 0.3);
        assert_eq!(record.coaching_tips.as_deref(), Some("Well paced."));
        assert_eq!(store.list_runs().await.unwrap().len(), 1);

        let spoken = alerts.spoken();
        assert!(spoken.contains(&"Turn left at the bridge".to_string()));
        assert!(spoken.iter().any(|s| s.starts_with("Kiosk is")));
        assert!(spoken.contains(&"You are off the planned route.".to_string()));
        assert!(alerts
            .alerts()
            .contains(&Alert::Vibrate(OFF_ROUTE_VIBRATION_MS.to_vec())));
        assert_eq!(alerts.vibrations(), 1);
        assert!(tx.is_closed());
        assert!(control.is_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_clock_and_ignores_samples() {
        let Fixture { runner, store, .. } = fixture(Arc::new(Offline), Arc::new(Offline));
        let (tx, source) = ChannelPositionSource::channel();
        let (control, commands) = control();
        let session = LiveSession::new(straight_route(), TrackingConfig::default()).unwrap();

        let task = tokio::spawn(async move {
            let mut source = source;
            runner.run(session, &mut source, commands).await
        });

        tx.send(sample(45.0, 5.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        control.pause().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(sample(45.005, 5.0)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        control.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        control.finish().await.unwrap();

        let SessionOutcome::Finished(record) = task.await.unwrap().unwrap() else {
            panic!("expected a finished run");
        };
        assert_eq!(record.duration_seconds, 2);
        assert_eq!(record.recorded_path.len(), 1);
        assert_eq!(record.distance_km, 0.0);
        assert_eq!(record.average_pace, None);
        assert_eq!(store.profile().await.unwrap().stats.total_runs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_releases_resources_without_recording() {
        let Fixture { runner, store, .. } = fixture(Arc::new(Offline), Arc::new(Offline));
        let (tx, source) = ChannelPositionSource::channel();
        let (control, commands) = control();
        let session = LiveSession::new(straight_route(), TrackingConfig::default()).unwrap();

        let task = tokio::spawn(async move {
            let mut source = source;
            runner.run(session, &mut source, commands).await
        });
        tx.send(sample(45.0, 5.0)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        control.cancel().await.unwrap();

        assert_eq!(task.await.unwrap().unwrap(), SessionOutcome::Cancelled);
        assert!(tx.is_closed());
        assert!(store.list_runs().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_control_cancels() {
        let Fixture { runner, .. } = fixture(Arc::new(Offline), Arc::new(Offline));
        let (_tx, source) = ChannelPositionSource::channel();
        let (control, commands) = control();
        let session = LiveSession::new(straight_route(), TrackingConfig::default()).unwrap();
        drop(control);

        let mut source = source;
        let outcome = runner.run(session, &mut source, commands).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_keeps_running_after_position_stream_ends() {
        let Fixture { runner, .. } = fixture(Arc::new(Offline), Arc::new(Offline));
        let (tx, source) = ChannelPositionSource::channel();
        let (control, commands) = control();
        let session = LiveSession::new(straight_route(), TrackingConfig::default()).unwrap();

        let task = tokio::spawn(async move {
            let mut source = source;
            runner.run(session, &mut source, commands).await
        });
        tx.send(sample(45.0, 5.0)).await.unwrap();
        drop(tx);
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        control.finish().await.unwrap();

        let SessionOutcome::Finished(record) = task.await.unwrap().unwrap() else {
            panic!("expected a finished run");
        };
        assert_eq!(record.duration_seconds, 4);
    }

    #[tokio::test]
    async fn second_subscription_is_refused() {
        let Fixture { runner, .. } = fixture(Arc::new(Offline), Arc::new(Offline));
        let (_tx, mut source) = ChannelPositionSource::channel();
        let _first = source.subscribe().unwrap();
        let (_control, commands) = control();
        let session = LiveSession::new(straight_route(), TrackingConfig::default()).unwrap();

        let err = runner.run(session, &mut source, commands).await.unwrap_err();
        assert!(matches!(err, RunnerError::Position(PositionError::AlreadySubscribed)));
    }
}
