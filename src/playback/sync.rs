use std::time::Duration;

use super::deck::Deck;
use crate::config;

/// Matches a follower deck's effective BPM to a leader's and aligns beat
/// phase. The phase seek targets where the leader will be one seek
/// latency from now; without that lookahead every sync lands late by one
/// callback-plus-schedule interval.
pub struct SyncController {
    seek_latency: Duration,
}

impl Default for SyncController {
    fn default() -> Self {
        SyncController {
            seek_latency: config::SEEK_LATENCY,
        }
    }
}

/// Normalise a raw phase difference to (-0.5, 0.5], choosing the shorter
/// rotation.
fn wrap_phase_difference(delta: f64) -> f64 {
    let mut d = delta;
    if d > 0.5 {
        d -= 1.0;
    } else if d <= -0.5 {
        d += 1.0;
    }
    d
}

impl SyncController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a host-measured seek latency instead of the built-in estimate.
    pub fn with_seek_latency(seek_latency: Duration) -> Self {
        SyncController { seek_latency }
    }

    /// Match `follower`'s tempo to `leader` and, when the follower is
    /// playing, align its beat phase. Never errors: missing BPMs log and
    /// no-op.
    pub fn sync(&self, follower: &mut Deck, leader: &Deck) {
        let Some(leader_bpm) = leader.bpm_effective() else {
            log::warn!(
                "Sync: leader deck {} missing BPM, skipping",
                leader.id()
            );
            return;
        };
        let Some(follower_orig_bpm) = follower.bpm_original() else {
            log::warn!(
                "Sync: follower deck {} missing BPM, skipping",
                follower.id()
            );
            return;
        };
        if leader_bpm <= 0.0 || follower_orig_bpm <= 0.0 {
            log::warn!(
                "Sync: degenerate BPMs (leader {:.1}, follower {:.1}), skipping",
                leader_bpm,
                follower_orig_bpm
            );
            return;
        }

        let tempo = (leader_bpm / follower_orig_bpm)
            .clamp(config::TEMPO_MIN, config::TEMPO_MAX);
        follower.set_tempo(tempo);
        log::info!(
            "Sync: deck {} tempo {:.4} to match {:.1} BPM on deck {}",
            follower.id(),
            tempo,
            leader_bpm,
            leader.id()
        );

        if !follower.is_playing() {
            return;
        }

        let follower_bpm = (follower_orig_bpm * tempo) as f64;
        let leader_bpm = leader_bpm as f64;

        let leader_phase = (leader.current_seconds() * leader_bpm / 60.0).fract();
        // Where the leader will be once the follower's seek is audible.
        let tau = self.seek_latency.as_secs_f64();
        let predicted_leader_phase = (leader_phase + tau * leader_bpm / 60.0).fract();

        let follower_phase = (follower.current_seconds() * follower_bpm / 60.0).fract();
        let delta = wrap_phase_difference(predicted_leader_phase - follower_phase);

        let adjustment_seconds = delta * 60.0 / follower_bpm;
        let target = follower.current_seconds() + adjustment_seconds;
        if target < 0.0 {
            log::warn!(
                "Sync: phase seek to {:.3}s would land before track start, skipping",
                target
            );
            return;
        }
        log::info!(
            "Sync: deck {} phase {:.3} -> {:.3} (adjust {:+.3}s)",
            follower.id(),
            follower_phase,
            predicted_leader_phase,
            adjustment_seconds
        );
        follower.seek(target);
    }
}
