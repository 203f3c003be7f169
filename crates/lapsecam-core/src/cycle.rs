//! Wake-cycle phase machine.
//!
//! Pure decision logic driven by injected `now_ms` ticks; the firmware
//! performs the I/O each action names and reports the capture back. One
//! capture per cycle, serving windows by wake cause, deep sleep at the end.

use log::info;

/// Why this boot happened, read once from the wake-reason registers.
///
/// Anything that is not a timer resume from deep sleep is treated as a first
/// boot, including brown-outs and manual resets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeCause {
    FirstBoot,
    TimerWake,
    Other,
}

/// Serving window after the first-boot capture.
pub const SERVE_FIRST_BOOT_MS: u64 = 600_000;
/// Serving window before the timer-wake capture.
pub const SERVE_TIMER_WAKE_MS: u64 = 30_000;
/// Final serving grace before sleep, both branches.
pub const FINAL_GRACE_MS: u64 = 5_000;
/// Deep-sleep duration armed before every suspend.
pub const SLEEP_INTERVAL_SECS: u64 = 600;

/// What the controller should do on this tick.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CycleAction {
    /// Poll the listener once, with a short bounded wait.
    Serve,
    /// Run the capture pipeline, then report via [`WakeCycle::note_capture`].
    Capture,
    /// Tear down and enter deep sleep. Terminal.
    Sleep,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    PreCaptureServe { until_ms: u64 },
    CapturePending,
    PostCaptureServe { until_ms: u64 },
    FinalGrace { until_ms: u64 },
    SleepPending,
}

/// One wake cycle's phase state.
#[derive(Debug)]
pub struct WakeCycle {
    cause: WakeCause,
    phase: Phase,
    captured: bool,
}

impl WakeCycle {
    pub fn new(cause: WakeCause, now_ms: u64) -> Self {
        let phase = match cause {
            // Periodic wake: give operators a short window first, so a
            // device that captures slowly stays reachable every cycle.
            WakeCause::TimerWake => Phase::PreCaptureServe {
                until_ms: now_ms + SERVE_TIMER_WAKE_MS,
            },
            // Fresh boot: capture immediately, then stay up long enough to
            // browse and reconfigure.
            WakeCause::FirstBoot | WakeCause::Other => Phase::CapturePending,
        };
        info!("cycle: woke with cause {cause:?}");
        Self {
            cause,
            phase,
            captured: false,
        }
    }

    pub const fn cause(&self) -> WakeCause {
        self.cause
    }

    pub const fn captured(&self) -> bool {
        self.captured
    }

    /// Decide the action for `now_ms`. Serving phases return [`CycleAction::Serve`]
    /// until their deadline passes; transitions happen inside this call.
    pub fn step(&mut self, now_ms: u64) -> CycleAction {
        match self.phase {
            Phase::PreCaptureServe { until_ms } => {
                if now_ms < until_ms {
                    CycleAction::Serve
                } else {
                    self.phase = Phase::CapturePending;
                    CycleAction::Capture
                }
            }
            Phase::CapturePending => CycleAction::Capture,
            Phase::PostCaptureServe { until_ms } => {
                if now_ms < until_ms {
                    CycleAction::Serve
                } else {
                    self.phase = Phase::FinalGrace {
                        until_ms: now_ms + FINAL_GRACE_MS,
                    };
                    CycleAction::Serve
                }
            }
            Phase::FinalGrace { until_ms } => {
                if now_ms < until_ms {
                    CycleAction::Serve
                } else {
                    self.phase = Phase::SleepPending;
                    CycleAction::Sleep
                }
            }
            Phase::SleepPending => CycleAction::Sleep,
        }
    }

    /// Record that the single capture of this cycle ran (stored or failed;
    /// both proceed). Moves to the post-capture window of the wake cause.
    pub fn note_capture(&mut self, now_ms: u64) {
        debug_assert!(!self.captured, "one capture per wake cycle");
        self.captured = true;
        self.phase = match self.cause {
            WakeCause::TimerWake => Phase::FinalGrace {
                until_ms: now_ms + FINAL_GRACE_MS,
            },
            WakeCause::FirstBoot | WakeCause::Other => Phase::PostCaptureServe {
                until_ms: now_ms + SERVE_FIRST_BOOT_MS,
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_to_sleep(cycle: &mut WakeCycle, mut now_ms: u64) -> (u64, u32) {
        let mut captures = 0u32;
        loop {
            match cycle.step(now_ms) {
                CycleAction::Serve => now_ms += 100,
                CycleAction::Capture => {
                    captures += 1;
                    cycle.note_capture(now_ms);
                }
                CycleAction::Sleep => return (now_ms, captures),
            }
        }
    }

    #[test]
    fn first_boot_captures_before_its_long_window() {
        let mut cycle = WakeCycle::new(WakeCause::FirstBoot, 0);
        assert_eq!(cycle.step(0), CycleAction::Capture);
        cycle.note_capture(1_000);

        assert_eq!(cycle.step(1_000), CycleAction::Serve);
        assert_eq!(cycle.step(1_000 + SERVE_FIRST_BOOT_MS - 1), CycleAction::Serve);
        // Window closed: one more serve tick rolls into the grace period.
        assert_eq!(cycle.step(1_000 + SERVE_FIRST_BOOT_MS), CycleAction::Serve);
        let grace_end = 1_000 + SERVE_FIRST_BOOT_MS + FINAL_GRACE_MS;
        assert_eq!(cycle.step(grace_end - 1), CycleAction::Serve);
        assert_eq!(cycle.step(grace_end), CycleAction::Sleep);
        assert_eq!(cycle.step(grace_end + 60_000), CycleAction::Sleep);
    }

    #[test]
    fn timer_wake_serves_before_capturing() {
        let mut cycle = WakeCycle::new(WakeCause::TimerWake, 10_000);
        assert_eq!(cycle.step(10_000), CycleAction::Serve);
        assert_eq!(cycle.step(10_000 + SERVE_TIMER_WAKE_MS - 1), CycleAction::Serve);
        assert_eq!(cycle.step(10_000 + SERVE_TIMER_WAKE_MS), CycleAction::Capture);

        cycle.note_capture(45_000);
        assert_eq!(cycle.step(45_000), CycleAction::Serve);
        assert_eq!(cycle.step(45_000 + FINAL_GRACE_MS - 1), CycleAction::Serve);
        assert_eq!(cycle.step(45_000 + FINAL_GRACE_MS), CycleAction::Sleep);
    }

    #[test]
    fn unknown_cause_is_treated_as_first_boot() {
        let mut cycle = WakeCycle::new(WakeCause::Other, 0);
        assert_eq!(cycle.step(0), CycleAction::Capture);
        cycle.note_capture(0);
        assert_eq!(cycle.step(0), CycleAction::Serve);
    }

    #[test]
    fn both_branches_capture_exactly_once() {
        let (_, first_boot_captures) =
            drain_to_sleep(&mut WakeCycle::new(WakeCause::FirstBoot, 0), 0);
        assert_eq!(first_boot_captures, 1);

        let (_, timer_captures) = drain_to_sleep(&mut WakeCycle::new(WakeCause::TimerWake, 0), 0);
        assert_eq!(timer_captures, 1);
    }

    #[test]
    fn sleep_strictly_follows_the_grace_period() {
        let mut cycle = WakeCycle::new(WakeCause::TimerWake, 0);
        let (slept_at, _) = drain_to_sleep(&mut cycle, 0);
        assert!(slept_at >= SERVE_TIMER_WAKE_MS + FINAL_GRACE_MS);
        assert!(cycle.captured());
    }
}
