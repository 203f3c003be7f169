//! Resource acquisition chain.
//!
//! Ordered, bounded bring-up of the cycle's hardware: camera, storage,
//! network, clock. The chain is a pure decision machine; the firmware runs
//! the actual init for the step the chain names and reports the result back.

use log::{info, warn};

/// Acquisition steps, in chain order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitStep {
    Camera,
    Storage,
    Network,
    Clock,
}

const CHAIN_ORDER: [InitStep; 4] = [
    InitStep::Camera,
    InitStep::Storage,
    InitStep::Network,
    InitStep::Clock,
];

/// Where the cycle goes when a step's budget is exhausted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureRoute {
    /// Operator-recoverable: bring up the credential portal.
    ConfigMode,
    /// Conserve power and try again next wake.
    Sleep,
}

/// Chain reaction to a reported step result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainEvent {
    /// Move on; `None` means every resource is acquired.
    Advance(Option<InitStep>),
    /// Run the same step again (storage mount retry).
    Retry(InitStep),
    /// Budget exhausted; route the cycle.
    Failed {
        step: InitStep,
        route: FailureRoute,
    },
}

/// Attempt budget per step: storage retries its mount once, nothing else
/// retries at all. No step ever runs more than twice.
const fn step_budget(step: InitStep) -> u8 {
    match step {
        InitStep::Storage => 2,
        InitStep::Camera | InitStep::Network | InitStep::Clock => 1,
    }
}

/// Failure destination per step. Network failures are credential problems
/// until proven otherwise, so they route to the portal instead of sleep.
pub const fn failure_route(step: InitStep) -> FailureRoute {
    match step {
        InitStep::Network => FailureRoute::ConfigMode,
        InitStep::Camera | InitStep::Storage | InitStep::Clock => FailureRoute::Sleep,
    }
}

/// Ordered acquisition driver.
#[derive(Debug)]
pub struct AcquisitionChain {
    position: usize,
    attempts_used: u8,
}

impl AcquisitionChain {
    pub const fn new() -> Self {
        Self {
            position: 0,
            attempts_used: 0,
        }
    }

    /// Step to run next, `None` once the chain is complete.
    pub fn current(&self) -> Option<InitStep> {
        CHAIN_ORDER.get(self.position).copied()
    }

    /// 1-based attempt number for the current step.
    pub const fn attempt(&self) -> u8 {
        self.attempts_used + 1
    }

    /// Report the outcome of running the current step.
    pub fn report(&mut self, ok: bool) -> ChainEvent {
        let Some(step) = self.current() else {
            return ChainEvent::Advance(None);
        };
        self.attempts_used += 1;

        if ok {
            info!("init: {step:?} ready (attempt {})", self.attempts_used);
            self.position += 1;
            self.attempts_used = 0;
            return ChainEvent::Advance(self.current());
        }

        if self.attempts_used < step_budget(step) {
            warn!("init: {step:?} failed, retrying");
            return ChainEvent::Retry(step);
        }

        let route = failure_route(step);
        warn!(
            "init: {step:?} failed after {} attempt(s), routing to {route:?}",
            self.attempts_used
        );
        ChainEvent::Failed { step, route }
    }
}

impl Default for AcquisitionChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_chain(
        chain: &mut AcquisitionChain,
        mut step_ok: impl FnMut(InitStep, u8) -> bool,
    ) -> ChainEvent {
        let mut runs = 0u8;
        loop {
            let Some(step) = chain.current() else {
                return ChainEvent::Advance(None);
            };
            runs += 1;
            assert!(runs <= 8, "chain must terminate");
            let attempt = chain.attempt();
            match chain.report(step_ok(step, attempt)) {
                ChainEvent::Advance(None) => return ChainEvent::Advance(None),
                ChainEvent::Advance(Some(_)) | ChainEvent::Retry(_) => continue,
                failed @ ChainEvent::Failed { .. } => return failed,
            }
        }
    }

    #[test]
    fn chain_runs_in_fixed_order() {
        let mut seen = Vec::new();
        let mut chain = AcquisitionChain::new();
        let outcome = run_chain(&mut chain, |step, _| {
            seen.push(step);
            true
        });
        assert_eq!(outcome, ChainEvent::Advance(None));
        assert_eq!(
            seen,
            [
                InitStep::Camera,
                InitStep::Storage,
                InitStep::Network,
                InitStep::Clock
            ]
        );
    }

    #[test]
    fn storage_mount_retries_once_then_succeeds() {
        let mut storage_attempts = Vec::new();
        let mut chain = AcquisitionChain::new();
        let outcome = run_chain(&mut chain, |step, attempt| {
            if step == InitStep::Storage {
                storage_attempts.push(attempt);
                attempt == 2
            } else {
                true
            }
        });
        assert_eq!(outcome, ChainEvent::Advance(None));
        assert_eq!(storage_attempts, [1, 2]);
    }

    #[test]
    fn storage_exhaustion_routes_to_sleep() {
        let mut chain = AcquisitionChain::new();
        let outcome = run_chain(&mut chain, |step, _| step != InitStep::Storage);
        assert_eq!(
            outcome,
            ChainEvent::Failed {
                step: InitStep::Storage,
                route: FailureRoute::Sleep,
            }
        );
    }

    #[test]
    fn network_failure_routes_to_config_mode_without_retry() {
        let mut network_runs = 0u8;
        let mut chain = AcquisitionChain::new();
        let outcome = run_chain(&mut chain, |step, _| {
            if step == InitStep::Network {
                network_runs += 1;
                false
            } else {
                true
            }
        });
        assert_eq!(network_runs, 1);
        assert_eq!(
            outcome,
            ChainEvent::Failed {
                step: InitStep::Network,
                route: FailureRoute::ConfigMode,
            }
        );
    }

    #[test]
    fn camera_and_clock_failures_sleep_immediately() {
        for failing in [InitStep::Camera, InitStep::Clock] {
            let mut chain = AcquisitionChain::new();
            let outcome = run_chain(&mut chain, |step, _| step != failing);
            assert_eq!(
                outcome,
                ChainEvent::Failed {
                    step: failing,
                    route: FailureRoute::Sleep,
                }
            );
        }
    }

    #[test]
    fn no_step_ever_runs_more_than_twice() {
        let mut counts = [0u8; 4];
        let mut chain = AcquisitionChain::new();
        let _ = run_chain(&mut chain, |step, _| {
            counts[step as usize] += 1;
            step != InitStep::Storage
        });
        // Camera once, storage twice, chain stops before network and clock.
        assert_eq!(counts, [1, 2, 0, 0]);
    }
}
