//! Live tracking state machine.
//!
//! A [`LiveSession`] owns everything that changes during a run: the clock,
//! the accumulated distance, the recorded path, the off-route flag and the
//! navigation cursor. It is driven by three inputs (position samples,
//! timer ticks and user controls) and never performs I/O itself; side
//! effects are returned as [`TrackingEvent`]s for the caller to deliver.
//!
//! ```text
//! Idle --start--> Active --pause--> Paused
//!                   ^                 |
//!                   +-----resume------+
//! Idle | Active | Paused --finish--> Finished
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::{OffRouteMeasure, TrackingConfig},
    geo::{distance_to_path_m, haversine_km, haversine_m, min_vertex_distance_m, path_length_km},
    models::{Coordinate, NavigationStep, Pace, PointOfInterest, PositionSample, Route},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Active,
    Paused,
    Finished,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("planned route {0:?} has no points")]
    EmptyPlannedPath(String),
    #[error("cannot {action} a session that is {phase:?}")]
    InvalidTransition {
        action: &'static str,
        phase: SessionPhase,
    },
}

/// Side effects produced while processing a position sample.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingEvent {
    /// The runner just left the planned path.
    OffRoute { distance_m: f64 },
    /// The runner is back within the off-route threshold.
    BackOnRoute,
    StepReached { index: usize, instruction: String },
    PointOfInterestNearby {
        id: String,
        label: String,
        distance_m: f64,
    },
}

impl TrackingEvent {
    /// Text to speak for this event, if any.
    pub fn announcement(&self) -> Option<String> {
        match self {
            TrackingEvent::OffRoute { .. } => Some("You are off the planned route.".into()),
            TrackingEvent::BackOnRoute => None,
            TrackingEvent::StepReached { instruction, .. } => Some(instruction.clone()),
            TrackingEvent::PointOfInterestNearby {
                label, distance_m, ..
            } => Some(format!("{label} is {} metres away.", distance_m.round())),
        }
    }
}

/// Read-only view of the mutable session fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub elapsed_seconds: u64,
    pub distance_covered_km: f64,
    pub phase: SessionPhase,
    pub is_off_route: bool,
    pub current_step_index: usize,
    pub last_sampled: Option<Coordinate>,
}

impl SessionState {
    pub fn is_paused(&self) -> bool {
        self.phase == SessionPhase::Paused
    }
}

/// Frozen outcome of a session, consumed by the recording pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedSession {
    pub route_id: String,
    pub route_name: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: u64,
    pub distance_km: f64,
    pub recorded_path: Vec<Coordinate>,
}

impl FinishedSession {
    pub fn average_pace(&self) -> Option<Pace> {
        Pace::from_elapsed(self.elapsed_seconds, self.distance_km)
    }
}

#[derive(Debug, Default)]
struct StepCursor {
    index: usize,
    exhausted: bool,
}

pub struct LiveSession {
    route: Route,
    planned_distance_km: f64,
    config: TrackingConfig,
    phase: SessionPhase,
    started_at: Option<DateTime<Utc>>,
    elapsed_seconds: u64,
    distance_covered_km: f64,
    is_off_route: bool,
    last_sampled: Option<Coordinate>,
    recorded_path: Vec<Coordinate>,
    steps: Option<Vec<NavigationStep>>,
    cursor: StepCursor,
    points: Option<Vec<PointOfInterest>>,
    alerted_points: HashSet<String>,
}

impl LiveSession {
    pub fn new(route: Route, config: TrackingConfig) -> Result<Self, TrackingError> {
        if route.path.is_empty() {
            return Err(TrackingError::EmptyPlannedPath(route.id));
        }
        let planned_distance_km = if route.distance_km > 0.0 {
            route.distance_km
        } else {
            path_length_km(&route.path)
        };

        Ok(Self {
            route,
            planned_distance_km,
            config,
            phase: SessionPhase::Idle,
            started_at: None,
            elapsed_seconds: 0,
            distance_covered_km: 0.0,
            is_off_route: false,
            last_sampled: None,
            recorded_path: Vec::new(),
            steps: None,
            cursor: StepCursor::default(),
            points: None,
            alerted_points: HashSet::new(),
        })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            elapsed_seconds: self.elapsed_seconds,
            distance_covered_km: self.distance_covered_km,
            phase: self.phase,
            is_off_route: self.is_off_route,
            current_step_index: self.current_step_index(),
            last_sampled: self.last_sampled,
        }
    }

    pub fn recorded_path(&self) -> &[Coordinate] {
        &self.recorded_path
    }

    pub fn distance_covered_km(&self) -> f64 {
        self.distance_covered_km
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn is_off_route(&self) -> bool {
        self.is_off_route
    }

    /// Index of the next instruction to trigger; stays on the last step
    /// once every step has been announced.
    pub fn current_step_index(&self) -> usize {
        self.cursor.index
    }

    pub fn current_step(&self) -> Option<&NavigationStep> {
        if self.cursor.exhausted {
            return None;
        }
        self.steps.as_ref()?.get(self.cursor.index)
    }

    pub fn step_count(&self) -> usize {
        self.steps.as_ref().map_or(0, Vec::len)
    }

    pub fn progress_percent(&self) -> f64 {
        if self.planned_distance_km <= 0.0 {
            return 0.0;
        }
        (self.distance_covered_km / self.planned_distance_km * 100.0).min(100.0)
    }

    pub fn current_pace(&self) -> Option<Pace> {
        Pace::from_elapsed(self.elapsed_seconds, self.distance_covered_km)
    }

    pub fn start(&mut self) -> Result<(), TrackingError> {
        if self.phase != SessionPhase::Idle {
            return Err(self.invalid("start"));
        }
        self.phase = SessionPhase::Active;
        self.started_at = Some(Utc::now());
        tracing::info!(
            "Session started on route {} ({:.2} km planned)",
            self.route.id,
            self.planned_distance_km
        );
        Ok(())
    }

    /// Returns `true` if the session moved from active to paused.
    pub fn pause(&mut self) -> bool {
        if self.phase != SessionPhase::Active {
            return false;
        }
        self.phase = SessionPhase::Paused;
        tracing::info!("Session paused at {}s", self.elapsed_seconds);
        true
    }

    /// Returns `true` if the session moved from paused to active.
    pub fn resume(&mut self) -> bool {
        if self.phase != SessionPhase::Paused {
            return false;
        }
        self.phase = SessionPhase::Active;
        tracing::info!("Session resumed at {}s", self.elapsed_seconds);
        true
    }

    pub fn on_timer_tick(&mut self) {
        if self.phase == SessionPhase::Active {
            self.elapsed_seconds += 1;
        }
    }

    /// Delivers the directions provider result. Only the first delivery
    /// is kept.
    pub fn set_navigation_steps(&mut self, steps: Vec<NavigationStep>) -> bool {
        if self.phase == SessionPhase::Finished || self.steps.is_some() {
            return false;
        }
        tracing::debug!("Loaded {} navigation steps", steps.len());
        self.cursor = StepCursor {
            index: 0,
            exhausted: steps.is_empty(),
        };
        self.steps = Some(steps);
        true
    }

    /// Delivers the points-of-interest provider result. Only the first
    /// delivery is kept.
    pub fn set_points_of_interest(&mut self, points: Vec<PointOfInterest>) -> bool {
        if self.phase == SessionPhase::Finished || self.points.is_some() {
            return false;
        }
        tracing::debug!("Loaded {} points of interest", points.len());
        self.points = Some(points);
        true
    }

    pub fn on_position_sample(&mut self, sample: &PositionSample) -> Vec<TrackingEvent> {
        if self.phase != SessionPhase::Active {
            tracing::trace!("Ignoring position sample while {:?}", self.phase);
            return Vec::new();
        }
        if !self.usable_accuracy(sample.accuracy_m) {
            tracing::warn!(
                "Dropping position sample with unusable accuracy {} m (max {} m)",
                sample.accuracy_m,
                self.config.max_accuracy_m
            );
            return Vec::new();
        }
        let coord = sample.coordinate;
        if !coord.is_valid() {
            tracing::warn!("Dropping position sample with invalid coordinate {:?}", coord);
            return Vec::new();
        }

        if let Some(previous) = self.last_sampled {
            self.distance_covered_km += haversine_km(previous, coord);
        }
        self.last_sampled = Some(coord);
        self.recorded_path.push(coord);

        let mut events = Vec::new();
        self.check_off_route(coord, &mut events);
        self.advance_navigation(coord, &mut events);
        self.check_points_of_interest(coord, &mut events);

        tracing::debug!(
            "Sample {:?}: {:.3} km covered, off_route={}, {} event(s)",
            coord,
            self.distance_covered_km,
            self.is_off_route,
            events.len()
        );
        events
    }

    pub fn finish(&mut self) -> Result<FinishedSession, TrackingError> {
        if self.phase == SessionPhase::Finished {
            return Err(self.invalid("finish"));
        }
        self.phase = SessionPhase::Finished;
        let started_at = *self.started_at.get_or_insert_with(Utc::now);

        tracing::info!(
            "Session finished: {:.2} km in {}s, {} points recorded",
            self.distance_covered_km,
            self.elapsed_seconds,
            self.recorded_path.len()
        );

        Ok(FinishedSession {
            route_id: self.route.id.clone(),
            route_name: self.route.name.clone(),
            started_at,
            elapsed_seconds: self.elapsed_seconds,
            distance_km: self.distance_covered_km,
            recorded_path: self.recorded_path.clone(),
        })
    }

    fn usable_accuracy(&self, accuracy_m: f64) -> bool {
        accuracy_m.is_finite() && accuracy_m >= 0.0 && accuracy_m <= self.config.max_accuracy_m
    }

    fn check_off_route(&mut self, coord: Coordinate, events: &mut Vec<TrackingEvent>) {
        let distance = match self.config.off_route_measure {
            OffRouteMeasure::Vertices => min_vertex_distance_m(coord, &self.route.path),
            OffRouteMeasure::Segments => distance_to_path_m(coord, &self.route.path),
        };
        let Some(distance_m) = distance else {
            return;
        };

        let off = distance_m > self.config.off_route_threshold_m;
        match (self.is_off_route, off) {
            (false, true) => {
                tracing::info!("Runner left the route ({:.0} m from path)", distance_m);
                events.push(TrackingEvent::OffRoute { distance_m });
            }
            (true, false) => {
                tracing::info!("Runner back on route");
                events.push(TrackingEvent::BackOnRoute);
            }
            _ => {}
        }
        self.is_off_route = off;
    }

    fn advance_navigation(&mut self, coord: Coordinate, events: &mut Vec<TrackingEvent>) {
        if self.cursor.exhausted {
            return;
        }
        let Some(steps) = self.steps.as_ref() else {
            return;
        };
        let Some(step) = steps.get(self.cursor.index) else {
            return;
        };
        if haversine_m(coord, step.location) >= self.config.step_proximity_m {
            return;
        }

        events.push(TrackingEvent::StepReached {
            index: self.cursor.index,
            instruction: step.instruction.clone(),
        });
        if self.cursor.index + 1 < steps.len() {
            self.cursor.index += 1;
        } else {
            self.cursor.exhausted = true;
        }
    }

    fn check_points_of_interest(&mut self, coord: Coordinate, events: &mut Vec<TrackingEvent>) {
        let Some(points) = self.points.as_ref() else {
            return;
        };
        for poi in points {
            if self.alerted_points.contains(&poi.id) {
                continue;
            }
            let distance_m = haversine_m(coord, poi.location);
            if distance_m < self.config.poi_alert_radius_m {
                self.alerted_points.insert(poi.id.clone());
                events.push(TrackingEvent::PointOfInterestNearby {
                    id: poi.id.clone(),
                    label: poi.label.clone(),
                    distance_m,
                });
            }
        }
    }

    fn invalid(&self, action: &'static str) -> TrackingError {
        TrackingError::InvalidTransition {
            action,
            phase: self.phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate { lat, lon }
    }

    fn route(path: Vec<Coordinate>) -> Route {
        Route {
            id: "r1".into(),
            name: "Coastal Sprint".into(),
            description: String::new(),
            distance_km: path_length_km(&path),
            path,
            elevation_gain_m: 0.0,
            difficulty: Default::default(),
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn short_route() -> Route {
        route(vec![c(0.0, 0.0), c(0.0, 0.001)])
    }

    fn active(route: Route) -> LiveSession {
        let mut session = LiveSession::new(route, TrackingConfig::default()).expect("session");
        session.start().expect("start");
        session
    }

    fn sample(lat: f64, lon: f64) -> PositionSample {
        PositionSample::new(c(lat, lon), 5.0)
    }

    fn off_route_events(events: &[TrackingEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, TrackingEvent::OffRoute { .. }))
            .count()
    }

    #[test]
    fn refuses_empty_planned_path() {
        let result = LiveSession::new(route(Vec::new()), TrackingConfig::default());
        assert!(matches!(result, Err(TrackingError::EmptyPlannedPath(id)) if id == "r1"));
    }

    #[test]
    fn first_sample_contributes_no_distance() {
        let mut session = active(short_route());
        session.on_position_sample(&sample(0.0, 0.0));
        assert_eq!(session.distance_covered_km(), 0.0);
        assert_eq!(session.recorded_path().len(), 1);
    }

    #[test]
    fn distance_accumulates_between_samples() {
        let mut session = active(short_route());
        session.on_position_sample(&sample(0.0, 0.0));
        session.on_position_sample(&sample(0.0, 0.0005));
        session.on_position_sample(&sample(0.0, 0.001));
        let expected = haversine_km(c(0.0, 0.0), c(0.0, 0.001));
        assert!((session.distance_covered_km() - expected).abs() < 1e-9);
    }

    #[test]
    fn samples_ignored_before_start_and_while_paused() {
        let mut session = LiveSession::new(short_route(), TrackingConfig::default()).unwrap();
        session.on_position_sample(&sample(0.0, 0.0));
        assert!(session.recorded_path().is_empty());

        session.start().unwrap();
        session.on_position_sample(&sample(0.0, 0.0));
        assert!(session.pause());
        session.on_position_sample(&sample(0.0, 0.5));
        assert_eq!(session.recorded_path().len(), 1);
        assert_eq!(session.distance_covered_km(), 0.0);
        assert_eq!(session.state().last_sampled, Some(c(0.0, 0.0)));
    }

    #[test]
    fn unusable_accuracy_is_dropped() {
        let mut session = active(short_route());
        for accuracy in [f64::NAN, -1.0, 500.0, f64::INFINITY] {
            let events = session.on_position_sample(&PositionSample::new(c(0.0, 0.0), accuracy));
            assert!(events.is_empty());
        }
        assert!(session.recorded_path().is_empty());
    }

    #[test]
    fn invalid_coordinate_is_dropped() {
        let mut session = active(short_route());
        session.on_position_sample(&sample(f64::NAN, 0.0));
        session.on_position_sample(&sample(95.0, 0.0));
        assert!(session.recorded_path().is_empty());
    }

    #[test]
    fn timer_only_counts_while_active() {
        let mut session = LiveSession::new(short_route(), TrackingConfig::default()).unwrap();
        session.on_timer_tick();
        assert_eq!(session.elapsed_seconds(), 0);

        session.start().unwrap();
        session.on_timer_tick();
        session.on_timer_tick();
        session.pause();
        session.on_timer_tick();
        session.resume();
        session.on_timer_tick();
        assert_eq!(session.elapsed_seconds(), 3);
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let mut session = active(short_route());
        assert!(!session.resume());
        assert!(session.pause());
        assert!(!session.pause());
        assert!(session.state().is_paused());
        assert!(session.resume());
        assert!(!session.resume());
        assert_eq!(session.phase(), SessionPhase::Active);
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut session = active(short_route());
        assert!(matches!(
            session.start(),
            Err(TrackingError::InvalidTransition {
                action: "start",
                phase: SessionPhase::Active
            })
        ));
    }

    #[test]
    fn off_route_sample_beyond_path_end() {
        let mut session = active(short_route());
        let events = session.on_position_sample(&sample(0.0, 0.0015));
        assert!(session.is_off_route());
        assert_eq!(off_route_events(&events), 1);
    }

    #[test]
    fn off_route_alert_fires_once_per_transition() {
        let mut session = active(short_route());
        let mut alerts = 0;
        for lon in [0.0015, 0.0016, 0.0017] {
            alerts += off_route_events(&session.on_position_sample(&sample(0.0, lon)));
        }
        assert_eq!(alerts, 1);

        let back = session.on_position_sample(&sample(0.0, 0.001));
        assert!(back.contains(&TrackingEvent::BackOnRoute));
        assert!(!session.is_off_route());

        let again = session.on_position_sample(&sample(0.0, 0.0015));
        assert_eq!(off_route_events(&again), 1);
    }

    #[test]
    fn segment_measure_keeps_runner_on_sparse_route() {
        let sparse = route(vec![c(0.0, 0.0), c(0.0, 0.01)]);
        let config = TrackingConfig {
            off_route_measure: OffRouteMeasure::Segments,
            ..TrackingConfig::default()
        };
        let mut session = LiveSession::new(sparse.clone(), config).unwrap();
        session.start().unwrap();
        session.on_position_sample(&sample(0.0001, 0.005));
        assert!(!session.is_off_route());

        let mut by_vertex = active(sparse);
        by_vertex.on_position_sample(&sample(0.0001, 0.005));
        assert!(by_vertex.is_off_route());
    }

    #[test]
    fn navigation_advances_and_stops_after_last_step() {
        let mut session = active(route(vec![c(0.0, 0.0), c(0.0, 0.002)]));
        session.set_navigation_steps(vec![
            NavigationStep {
                instruction: "Turn left".into(),
                location: c(0.0, 0.001),
                distance_m: 111.0,
            },
            NavigationStep {
                instruction: "Arrive".into(),
                location: c(0.0, 0.002),
                distance_m: 111.0,
            },
        ]);

        // far from the first step
        assert!(session.on_position_sample(&sample(0.0, 0.0)).is_empty());
        assert_eq!(session.current_step_index(), 0);

        let events = session.on_position_sample(&sample(0.0, 0.001));
        assert!(events.contains(&TrackingEvent::StepReached {
            index: 0,
            instruction: "Turn left".into()
        }));
        assert_eq!(session.current_step_index(), 1);

        let events = session.on_position_sample(&sample(0.0, 0.002));
        assert!(events.contains(&TrackingEvent::StepReached {
            index: 1,
            instruction: "Arrive".into()
        }));
        assert_eq!(session.current_step_index(), 1);
        assert!(session.current_step().is_none());

        // standing at the final step announces nothing further
        assert!(session.on_position_sample(&sample(0.0, 0.002)).is_empty());
        assert_eq!(session.current_step_index(), 1);
    }

    #[test]
    fn steps_are_only_delivered_once() {
        let mut session = active(short_route());
        assert!(session.set_navigation_steps(Vec::new()));
        assert!(!session.set_navigation_steps(vec![NavigationStep {
            instruction: "late".into(),
            location: c(0.0, 0.0),
            distance_m: 0.0,
        }]));
        assert_eq!(session.step_count(), 0);
        assert!(session.on_position_sample(&sample(0.0, 0.0)).is_empty());
    }

    #[test]
    fn point_of_interest_alerts_once() {
        let mut session = active(short_route());
        session.set_points_of_interest(vec![PointOfInterest {
            id: "node/1".into(),
            location: c(0.0, 0.0005),
            label: "Harbor Coffee".into(),
        }]);

        let mut alerts = 0;
        for lon in [0.0, 0.0004, 0.0005, 0.0006, 0.0] {
            alerts += session
                .on_position_sample(&sample(0.0, lon))
                .iter()
                .filter(|e| matches!(e, TrackingEvent::PointOfInterestNearby { .. }))
                .count();
        }
        assert_eq!(alerts, 1);
    }

    #[test]
    fn progress_is_clamped() {
        let mut session = active(short_route());
        session.on_position_sample(&sample(0.0, 0.0));
        session.on_position_sample(&sample(0.0, 0.0005));
        let half = session.progress_percent();
        assert!((half - 50.0).abs() < 0.1, "got {half}");

        session.on_position_sample(&sample(0.0, 0.01));
        assert_eq!(session.progress_percent(), 100.0);
    }

    #[test]
    fn finish_without_samples_has_no_pace() {
        let mut session = active(short_route());
        for _ in 0..125 {
            session.on_timer_tick();
        }
        let finished = session.finish().expect("finish");
        assert_eq!(finished.elapsed_seconds, 125);
        assert_eq!(finished.distance_km, 0.0);
        assert_eq!(finished.average_pace(), None);
        assert_eq!(session.current_pace(), None);
    }

    #[test]
    fn finished_session_is_frozen() {
        let mut session = active(short_route());
        session.on_position_sample(&sample(0.0, 0.0));
        session.finish().unwrap();

        session.on_timer_tick();
        session.on_position_sample(&sample(0.0, 0.001));
        assert!(!session.pause());
        assert!(!session.resume());
        assert!(!session.set_points_of_interest(Vec::new()));
        assert!(session.finish().is_err());
        assert!(session.start().is_err());

        let state = session.state();
        assert_eq!(state.elapsed_seconds, 0);
        assert_eq!(state.distance_covered_km, 0.0);
        assert_eq!(session.recorded_path().len(), 1);
    }

    #[test]
    fn announcements() {
        let poi = TrackingEvent::PointOfInterestNearby {
            id: "1".into(),
            label: "Harbor Coffee".into(),
            distance_m: 42.4,
        };
        assert_eq!(
            poi.announcement().as_deref(),
            Some("Harbor Coffee is 42 metres away.")
        );
        assert_eq!(TrackingEvent::BackOnRoute.announcement(), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Input {
            Sample(f64, f64),
            Tick,
            Pause,
            Resume,
        }

        fn input() -> impl Strategy<Value = Input> {
            prop_oneof![
                4 => (-0.002..0.004, -0.002..0.004).prop_map(|(lat, lon)| Input::Sample(lat, lon)),
                2 => Just(Input::Tick),
                1 => Just(Input::Pause),
                1 => Just(Input::Resume),
            ]
        }

        fn steps() -> Vec<NavigationStep> {
            [0.0, 0.001, 0.002, 0.003]
                .iter()
                .enumerate()
                .map(|(i, lon)| NavigationStep {
                    instruction: format!("step {i}"),
                    location: c(0.0, *lon),
                    distance_m: 111.0,
                })
                .collect()
        }

        fn points() -> Vec<PointOfInterest> {
            vec![
                PointOfInterest {
                    id: "a".into(),
                    location: c(0.0, 0.001),
                    label: "A".into(),
                },
                PointOfInterest {
                    id: "b".into(),
                    location: c(0.001, 0.003),
                    label: "B".into(),
                },
            ]
        }

        proptest! {
            #[test]
            fn prop_session_invariants(inputs in prop::collection::vec(input(), 0..60)) {
                let planned = route(vec![c(0.0, 0.0), c(0.0, 0.001), c(0.0, 0.002), c(0.0, 0.003)]);
                let mut session = active(planned);
                session.set_navigation_steps(steps());
                session.set_points_of_interest(points());

                let mut expected_km = 0.0;
                let mut previous: Option<Coordinate> = None;
                let mut last_index = 0;
                let mut poi_alerts: Vec<String> = Vec::new();
                let mut was_off = false;

                for input in inputs {
                    match input {
                        Input::Sample(lat, lon) => {
                            let paused = session.state().is_paused();
                            let before_km = session.distance_covered_km();
                            let events = session.on_position_sample(&sample(lat, lon));
                            if paused {
                                prop_assert!(events.is_empty());
                                prop_assert_eq!(session.distance_covered_km(), before_km);
                            } else {
                                let here = c(lat, lon);
                                if let Some(prev) = previous {
                                    expected_km += haversine_km(prev, here);
                                }
                                previous = Some(here);

                                let off_alerts = events
                                    .iter()
                                    .filter(|e| matches!(e, TrackingEvent::OffRoute { .. }))
                                    .count();
                                let now_off = session.is_off_route();
                                prop_assert_eq!(off_alerts, usize::from(!was_off && now_off));
                                was_off = now_off;

                                for event in events {
                                    if let TrackingEvent::PointOfInterestNearby { id, .. } = event {
                                        prop_assert!(!poi_alerts.contains(&id));
                                        poi_alerts.push(id);
                                    }
                                }
                            }
                            prop_assert!(session.distance_covered_km() >= before_km);
                        }
                        Input::Tick => session.on_timer_tick(),
                        Input::Pause => {
                            session.pause();
                        }
                        Input::Resume => {
                            session.resume();
                        }
                    }

                    let index = session.current_step_index();
                    prop_assert!(index >= last_index);
                    prop_assert!(index < session.step_count());
                    last_index = index;

                    let progress = session.progress_percent();
                    prop_assert!((0.0..=100.0).contains(&progress));
                }

                prop_assert!((session.distance_covered_km() - expected_km).abs() < 1e-9);
            }
        }
    }
}
