//! Countdown shown while a request is in flight.
//!
//! The timer is a pure state machine: the host feeds it timestamps (seconds
//! from any monotonic origin) once on start and then once per second, and
//! renders whatever [`CountdownDisplay`] comes back. Scheduling the ticks is
//! the host's job; [`CountdownTimer::is_ticking`] says when to stop.

use serde::Serialize;

pub const CAPTION_EARLY: &str = "Syncing with Gemini DJ...";
pub const CAPTION_MID: &str = "Finessing the playlist magic...";
pub const CAPTION_LATE: &str = "Polishing transitions...";
pub const CAPTION_OVERTIME: &str = "Harmonising the final chorus...";
pub const CAPTION_READY: &str = "Playlist ready! Dropping beats...";

/// Ceiling used when reduced motion is preferred: 70% of the nominal value,
/// but never below 8 seconds.
pub fn effective_ceiling(ceiling_seconds: u32, reduced_motion: bool) -> u32 {
    if reduced_motion {
        let reduced = (ceiling_seconds as f64 * 0.7).floor() as u32;
        reduced.max(8)
    } else {
        ceiling_seconds.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownPhase {
    #[default]
    Idle,
    Running,
    Overtime,
    Done,
}

/// Everything the countdown widget needs for one repaint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountdownDisplay {
    pub phase: CountdownPhase,
    pub visible: bool,
    pub remaining: u32,
    /// Progress ring angle in degrees, 0..=360.
    pub angle_deg: f32,
    /// Progress bar width in percent, 0..=100.
    pub progress_pct: f32,
    pub caption: &'static str,
}

impl CountdownDisplay {
    fn hidden() -> Self {
        Self {
            phase: CountdownPhase::Idle,
            visible: false,
            remaining: 0,
            angle_deg: 0.0,
            progress_pct: 0.0,
            caption: CAPTION_EARLY,
        }
    }

    /// Remaining seconds zero-padded to two digits.
    pub fn digits(&self) -> String {
        format!("{:02}", self.remaining)
    }
}

#[derive(Debug)]
pub struct CountdownTimer {
    ceiling: u32,
    start: f64,
    last_elapsed: u32,
    phase: CountdownPhase,
    display: CountdownDisplay,
}

impl CountdownTimer {
    pub fn new() -> Self {
        Self {
            ceiling: 1,
            start: 0.0,
            last_elapsed: 0,
            phase: CountdownPhase::Idle,
            display: CountdownDisplay::hidden(),
        }
    }

    pub fn phase(&self) -> CountdownPhase {
        self.phase
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Last emitted display.
    pub fn display(&self) -> &CountdownDisplay {
        &self.display
    }

    /// True while the host should keep scheduling one-second ticks.
    pub fn is_ticking(&self) -> bool {
        self.phase == CountdownPhase::Running
    }

    /// Start a fresh run. Any run in progress is stopped first.
    pub fn start(&mut self, ceiling_seconds: u32, reduced_motion: bool, now: f64) -> CountdownDisplay {
        self.stop();

        self.ceiling = effective_ceiling(ceiling_seconds, reduced_motion);
        self.start = now;
        self.last_elapsed = 0;
        self.phase = CountdownPhase::Running;
        log::debug!("Countdown started with a {}s ceiling", self.ceiling);

        self.update(now)
    }

    /// Recompute the display for `now`. Returns `None` once ticking has
    /// stopped (overtime, done or idle).
    pub fn tick(&mut self, now: f64) -> Option<CountdownDisplay> {
        if !self.is_ticking() {
            return None;
        }
        Some(self.update(now))
    }

    /// Force the completed state. Halts ticking regardless of phase.
    pub fn mark_done(&mut self) -> CountdownDisplay {
        self.phase = CountdownPhase::Done;
        self.display = CountdownDisplay {
            phase: CountdownPhase::Done,
            visible: true,
            remaining: 0,
            angle_deg: 360.0,
            progress_pct: 100.0,
            caption: CAPTION_READY,
        };
        self.display.clone()
    }

    /// Hide the countdown without the completion flash.
    pub fn stop(&mut self) -> CountdownDisplay {
        self.phase = CountdownPhase::Idle;
        self.last_elapsed = 0;
        self.display = CountdownDisplay::hidden();
        self.display.clone()
    }

    fn update(&mut self, now: f64) -> CountdownDisplay {
        // Whole seconds only; a clock that steps backwards never rewinds the widget.
        let elapsed = ((now - self.start).max(0.0).floor() as u32).max(self.last_elapsed);
        self.last_elapsed = elapsed;

        let total = self.ceiling;
        let remaining = total.saturating_sub(elapsed);
        let fraction = (total - remaining) as f32 / total as f32;

        let caption = if remaining == 0 {
            self.phase = CountdownPhase::Overtime;
            CAPTION_OVERTIME
        } else if fraction >= 0.66 {
            CAPTION_LATE
        } else if fraction >= 0.33 {
            CAPTION_MID
        } else {
            CAPTION_EARLY
        };

        self.display = CountdownDisplay {
            phase: self.phase,
            visible: true,
            remaining,
            angle_deg: (fraction * 360.0).min(360.0),
            progress_pct: (fraction * 100.0).min(100.0),
            caption,
        };
        self.display.clone()
    }
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduced_motion_ceiling() {
        assert_eq!(effective_ceiling(18, true), 12);
        assert_eq!(effective_ceiling(18, false), 18);
        // Floor of 8 seconds
        assert_eq!(effective_ceiling(10, true), 8);
    }

    #[test]
    fn test_start_emits_immediately() {
        let mut timer = CountdownTimer::new();
        let display = timer.start(18, false, 100.0);
        assert_eq!(display.remaining, 18);
        assert_eq!(display.digits(), "18");
        assert_eq!(display.progress_pct, 0.0);
        assert_eq!(display.caption, CAPTION_EARLY);
        assert!(display.visible);
        assert!(timer.is_ticking());
    }

    #[test]
    fn test_captions_follow_elapsed_fraction() {
        let mut timer = CountdownTimer::new();
        timer.start(18, false, 0.0);
        // 6/18 = 0.333
        assert_eq!(timer.tick(6.2).unwrap().caption, CAPTION_MID);
        // 12/18 = 0.666
        assert_eq!(timer.tick(12.0).unwrap().caption, CAPTION_LATE);
        assert_eq!(timer.tick(13.0).unwrap().digits(), "05");
    }

    #[test]
    fn test_overtime_freezes_at_zero() {
        let mut timer = CountdownTimer::new();
        timer.start(8, false, 0.0);
        let display = timer.tick(9.5).unwrap();
        assert_eq!(display.remaining, 0);
        assert_eq!(display.phase, CountdownPhase::Overtime);
        assert_eq!(display.caption, CAPTION_OVERTIME);
        assert_eq!(display.angle_deg, 360.0);
        assert!(!timer.is_ticking());
        assert!(timer.tick(20.0).is_none());
    }

    #[test]
    fn test_monotonic_and_clamped() {
        let mut timer = CountdownTimer::new();
        timer.start(10, false, 50.0);
        let mut last_remaining = u32::MAX;
        let mut last_progress = -1.0;
        // Includes a backwards step at 53.0
        for now in [50.0, 51.0, 54.0, 53.0, 56.5, 58.0, 62.0, 75.0] {
            if let Some(d) = timer.tick(now) {
                assert!(d.remaining <= last_remaining);
                assert!(d.progress_pct >= last_progress);
                assert!(d.progress_pct <= 100.0);
                last_remaining = d.remaining;
                last_progress = d.progress_pct;
            }
        }
        assert_eq!(last_remaining, 0);
    }

    #[test]
    fn test_mark_done_and_stop() {
        let mut timer = CountdownTimer::new();
        timer.start(18, false, 0.0);
        let done = timer.mark_done();
        assert_eq!(done.phase, CountdownPhase::Done);
        assert_eq!(done.progress_pct, 100.0);
        assert_eq!(done.caption, CAPTION_READY);
        assert!(!timer.is_ticking());

        let stopped = timer.stop();
        assert!(!stopped.visible);
        assert_eq!(stopped.angle_deg, 0.0);
        assert_eq!(stopped.progress_pct, 0.0);
        assert_eq!(timer.phase(), CountdownPhase::Idle);
    }

    #[test]
    fn test_restart_replaces_running_timer() {
        let mut timer = CountdownTimer::new();
        timer.start(18, false, 0.0);
        timer.tick(10.0);
        let display = timer.start(18, true, 10.0);
        assert_eq!(timer.ceiling(), 12);
        assert_eq!(display.remaining, 12);
    }
}
