use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Notify};

use super::state::DeckShared;
use crate::config;
use crate::types::DeckSnapshot;

/// Display-refresh-rate driver: samples deck cursors at ~60 Hz on a
/// non-audio thread and pushes snapshots at ~30 Hz. While no deck is
/// playing the task parks on the play signal and position callbacks stop
/// entirely; the first play transition re-arms it.
pub(crate) struct PositionMonitor {
    decks: [Arc<DeckShared>; 2],
    senders: [Arc<watch::Sender<DeckSnapshot>>; 2],
    play_signal: Arc<Notify>,
}

impl PositionMonitor {
    pub(crate) fn new(
        decks: [Arc<DeckShared>; 2],
        senders: [Arc<watch::Sender<DeckSnapshot>>; 2],
        play_signal: Arc<Notify>,
    ) -> Self {
        PositionMonitor {
            decks,
            senders,
            play_signal,
        }
    }

    fn any_playing(&self) -> bool {
        self.decks.iter().any(|d| d.is_playing())
    }

    fn push_positions(&self) {
        for (shared, sender) in self.decks.iter().zip(self.senders.iter()) {
            let current = shared.current_seconds();
            let playing = shared.is_playing();
            let tempo = shared.tempo();
            let reached_end = shared.reached_end.load(Ordering::Acquire);
            sender.send_modify(|snap| {
                snap.current_seconds = current;
                snap.is_playing = playing;
                snap.tempo = tempo;
                snap.bpm_effective = snap.bpm_original.map(|bpm| bpm * tempo);
                snap.reached_end = reached_end;
            });
        }
    }

    pub(crate) async fn run(self) {
        let mut ticker = tokio::time::interval(config::MONITOR_SAMPLE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_push = Instant::now() - config::MONITOR_PUSH_INTERVAL;

        loop {
            if !self.any_playing() {
                // Final push so views settle on the paused position, then
                // sleep until the next play transition.
                self.push_positions();
                log::debug!("Position monitor: all decks idle, parking");
                self.play_signal.notified().await;
                log::debug!("Position monitor: play transition, resuming");
                ticker.reset();
            }
            ticker.tick().await;
            if last_push.elapsed() >= config::MONITOR_PUSH_INTERVAL {
                self.push_positions();
                last_push = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot_channel() -> (Arc<watch::Sender<DeckSnapshot>>, watch::Receiver<DeckSnapshot>) {
        let (tx, rx) = watch::channel(DeckSnapshot::default());
        (Arc::new(tx), rx)
    }

    #[tokio::test]
    async fn monitor_pushes_positions_while_playing() {
        let deck_a = Arc::new(DeckShared::new());
        let deck_b = Arc::new(DeckShared::new());
        deck_a.sample_rate.store(48_000, Ordering::Release);
        deck_a.frames.store(48_000 * 60, Ordering::Release);
        deck_a.cursor.store(48_000.0, Ordering::Release);
        deck_a.is_playing.store(true, Ordering::Release);

        let (tx_a, mut rx_a) = snapshot_channel();
        let (tx_b, _rx_b) = snapshot_channel();
        let signal = Arc::new(Notify::new());
        let monitor = PositionMonitor::new([deck_a.clone(), deck_b], [tx_a, tx_b], signal);
        let handle = tokio::spawn(monitor.run());

        tokio::time::timeout(Duration::from_millis(500), rx_a.changed())
            .await
            .expect("no snapshot within 500ms")
            .unwrap();
        let snap = rx_a.borrow().clone();
        assert!(snap.is_playing);
        assert!((snap.current_seconds - 1.0).abs() < 1e-9);
        handle.abort();
    }

    #[tokio::test]
    async fn parked_monitor_wakes_on_play_signal() {
        let deck_a = Arc::new(DeckShared::new());
        let deck_b = Arc::new(DeckShared::new());
        let (tx_a, mut rx_a) = snapshot_channel();
        let (tx_b, _rx_b) = snapshot_channel();
        let signal = Arc::new(Notify::new());
        let monitor =
            PositionMonitor::new([deck_a.clone(), deck_b], [tx_a, tx_b], signal.clone());
        let handle = tokio::spawn(monitor.run());

        // Let it park, mark the deck playing, then signal.
        tokio::time::sleep(Duration::from_millis(50)).await;
        rx_a.borrow_and_update();
        deck_a.sample_rate.store(44_100, Ordering::Release);
        deck_a.frames.store(44_100 * 10, Ordering::Release);
        deck_a.cursor.store(4_410.0, Ordering::Release);
        deck_a.is_playing.store(true, Ordering::Release);
        signal.notify_one();

        tokio::time::timeout(Duration::from_millis(500), rx_a.changed())
            .await
            .expect("monitor did not wake on play signal")
            .unwrap();
        assert!(rx_a.borrow().is_playing);
        handle.abort();
    }
}
