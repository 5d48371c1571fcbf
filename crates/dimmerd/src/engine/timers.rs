//! One-shot timers that report back to the event loop.
//!
//! Each slot holds at most one pending task. Rescheduling or canceling bumps
//! the slot's generation so a task that already sent its message before being
//! aborted is recognized as stale when the loop receives it.

use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use strum::Display;
use tokio::task::JoinHandle;
use tracing::trace;

use super::message::Message;
use super::message::MessageSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimerKind {
    /// Turns the light off when it expires
    Countdown,
    /// Re-checks the triggers while the light is on
    Periodic,
    /// Ends a pump flash
    Pump,
}

#[derive(Debug)]
pub struct TimerSlot {
    device_id: String,
    kind: TimerKind,
    tx: MessageSender,
    generation: u64,
    handle: Option<JoinHandle<()>>,
    at: Option<DateTime<Utc>>,
}

impl TimerSlot {
    pub fn new(device_id: &str, kind: TimerKind, tx: MessageSender) -> Self {
        Self {
            device_id: device_id.to_string(),
            kind,
            tx,
            generation: 0,
            handle: None,
            at: None,
        }
    }

    /// When the pending task fires, if any.
    pub fn pending_at(&self) -> Option<DateTime<Utc>> {
        self.at
    }

    /// Fire at `at`, replacing any pending task. Must be called from within a
    /// tokio runtime.
    pub fn schedule(&mut self, now: DateTime<Utc>, at: DateTime<Utc>) {
        self.cancel();

        let delay = (at - now).to_std().unwrap_or(Duration::ZERO);
        let tx = self.tx.clone();
        let message = Message::TimerFired {
            device_id: self.device_id.clone(),
            kind: self.kind,
            generation: self.generation,
        };

        trace!(
            "Scheduling {} timer for {} in {:?}",
            self.kind,
            self.device_id,
            delay
        );
        self.at = Some(at);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The loop is gone when this fails; nothing left to notify.
            let _ = tx.send(message);
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.at = None;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Accept a fired message. Returns false if it belongs to a task that was
    /// canceled or replaced since.
    pub fn fire(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.at.is_none() {
            trace!("Dropping stale {} timer for {}", self.kind, self.device_id);
            return false;
        }
        self.handle = None;
        self.at = None;
        self.generation = self.generation.wrapping_add(1);
        true
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use tokio::sync::mpsc;

    use super::*;

    fn fired(message: Message) -> (String, TimerKind, u64) {
        match message {
            Message::TimerFired {
                device_id,
                kind,
                generation,
            } => (device_id, kind, generation),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new("hallway", TimerKind::Countdown, tx);
        let now = Utc::now();

        slot.schedule(now, now + TimeDelta::seconds(60));
        assert_eq!(slot.pending_at(), Some(now + TimeDelta::seconds(60)));

        let (device_id, kind, generation) = fired(rx.recv().await.unwrap());
        assert_eq!(device_id, "hallway");
        assert_eq!(kind, TimerKind::Countdown);

        assert!(slot.fire(generation));
        assert_eq!(slot.pending_at(), None);
        assert!(!slot.fire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_drops_stale_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new("hallway", TimerKind::Periodic, tx);
        let now = Utc::now();

        slot.schedule(now, now);
        let (_, _, stale) = fired(rx.recv().await.unwrap());

        // Replaced after the first task already reported.
        slot.schedule(now, now + TimeDelta::seconds(5));
        assert!(!slot.fire(stale));

        let (_, _, current) = fired(rx.recv().await.unwrap());
        assert!(slot.fire(current));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new("hallway", TimerKind::Pump, tx);
        let now = Utc::now();

        slot.schedule(now, now + TimeDelta::seconds(1));
        slot.cancel();
        assert_eq!(slot.pending_at(), None);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
