use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::models::{Coordinate, PositionSample};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum PositionError {
    #[error("position source already has a subscriber")]
    AlreadySubscribed,
    #[error("replay track has no points")]
    EmptyTrack,
}

/// Supplier of position samples, such as a GNSS receiver or a recorded track.
pub trait PositionSource: Send {
    fn subscribe(&mut self) -> Result<PositionSubscription, PositionError>;
}

/// Live subscription to a position source. Dropping it unsubscribes.
pub struct PositionSubscription {
    receiver: mpsc::Receiver<PositionSample>,
    feeder: Option<JoinHandle<()>>,
}

impl PositionSubscription {
    pub fn new(receiver: mpsc::Receiver<PositionSample>) -> Self {
        Self {
            receiver,
            feeder: None,
        }
    }

    /// Subscription whose samples are produced by `feeder`; the task is
    /// aborted when the subscription ends.
    pub fn with_feeder(receiver: mpsc::Receiver<PositionSample>, feeder: JoinHandle<()>) -> Self {
        Self {
            receiver,
            feeder: Some(feeder),
        }
    }

    /// Next sample, or `None` once the source stops delivering.
    pub async fn next(&mut self) -> Option<PositionSample> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for PositionSubscription {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

/// Source fed by whoever holds the paired sender, e.g. a device driver.
pub struct ChannelPositionSource {
    receiver: Option<mpsc::Receiver<PositionSample>>,
}

impl ChannelPositionSource {
    pub fn channel() -> (mpsc::Sender<PositionSample>, Self) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (tx, Self { receiver: Some(rx) })
    }
}

impl PositionSource for ChannelPositionSource {
    fn subscribe(&mut self) -> Result<PositionSubscription, PositionError> {
        self.receiver
            .take()
            .map(PositionSubscription::new)
            .ok_or(PositionError::AlreadySubscribed)
    }
}

/// Replays a recorded track at a fixed cadence.
pub struct ReplaySource {
    track: Vec<Coordinate>,
    cadence: Duration,
    accuracy_m: f64,
    subscribed: bool,
}

impl ReplaySource {
    pub fn new(track: Vec<Coordinate>, cadence: Duration) -> Self {
        Self {
            track,
            cadence,
            accuracy_m: 5.0,
            subscribed: false,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = accuracy_m;
        self
    }

    /// Time needed to deliver the whole track.
    pub fn duration(&self) -> Duration {
        self.cadence * self.track.len() as u32
    }
}

impl PositionSource for ReplaySource {
    fn subscribe(&mut self) -> Result<PositionSubscription, PositionError> {
        if self.subscribed {
            return Err(PositionError::AlreadySubscribed);
        }
        if self.track.is_empty() {
            return Err(PositionError::EmptyTrack);
        }
        self.subscribed = true;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let track = self.track.clone();
        let cadence = self.cadence;
        let accuracy_m = self.accuracy_m;

        let feeder = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            for coordinate in track {
                ticker.tick().await;
                if tx.send(PositionSample::new(coordinate, accuracy_m)).await.is_err() {
                    break;
                }
            }
            tracing::debug!("Replay track exhausted");
        });

        Ok(PositionSubscription::with_feeder(rx, feeder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_source_allows_one_subscriber() {
        let (tx, mut source) = ChannelPositionSource::channel();
        let mut subscription = source.subscribe().expect("first subscriber");
        assert!(matches!(
            source.subscribe(),
            Err(PositionError::AlreadySubscribed)
        ));

        let sample = PositionSample::new(Coordinate::new(45.0, 5.0), 3.0);
        tx.send(sample).await.unwrap();
        assert_eq!(subscription.next().await, Some(sample));
    }

    #[tokio::test]
    async fn dropping_subscription_closes_the_feed() {
        let (tx, mut source) = ChannelPositionSource::channel();
        let subscription = source.subscribe().unwrap();
        subscription.unsubscribe();
        assert!(tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn replay_delivers_track_in_order() {
        let track = vec![
            Coordinate::new(45.0, 5.0),
            Coordinate::new(45.001, 5.0),
            Coordinate::new(45.002, 5.0),
        ];
        let mut source = ReplaySource::new(track.clone(), Duration::from_secs(1));
        assert_eq!(source.duration(), Duration::from_secs(3));

        let mut subscription = source.subscribe().unwrap();
        let mut received = Vec::new();
        while let Some(sample) = subscription.next().await {
            received.push(sample.coordinate);
        }
        assert_eq!(received, track);
    }
}
