//! Shared bounded-retry combinator.
//!
//! Directory creation, file writes, and storage mount all retry with the same
//! shape: a fixed attempt budget and a report of how many attempts were spent.

/// Fixed attempt budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Bounded {
    attempts: u8,
}

/// Result of running an operation under a [`Bounded`] budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Attempted<T, E> {
    /// Attempts actually spent, in `1..=budget`.
    pub attempts: u8,
    /// The first success, or the error of the final attempt.
    pub result: Result<T, E>,
}

impl Bounded {
    /// `attempts` is clamped to at least one.
    pub const fn new(attempts: u8) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
        }
    }

    pub const fn budget(&self) -> u8 {
        self.attempts
    }

    /// Run `op` until it succeeds or the budget is exhausted.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, E>(self, mut op: impl FnMut(u8) -> Result<T, E>) -> Attempted<T, E> {
        let mut attempt = 1u8;
        loop {
            match op(attempt) {
                Ok(value) => {
                    return Attempted {
                        attempts: attempt,
                        result: Ok(value),
                    };
                }
                Err(err) if attempt >= self.attempts => {
                    return Attempted {
                        attempts: attempt,
                        result: Err(err),
                    };
                }
                Err(_) => attempt += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_success_spends_one_attempt() {
        let out = Bounded::new(3).run(|_| Ok::<_, ()>(7));
        assert_eq!(out.attempts, 1);
        assert_eq!(out.result, Ok(7));
    }

    #[test]
    fn success_on_final_attempt_is_reported() {
        let out = Bounded::new(3).run(|attempt| if attempt == 3 { Ok(()) } else { Err(attempt) });
        assert_eq!(out.attempts, 3);
        assert_eq!(out.result, Ok(()));
    }

    #[test]
    fn exhaustion_keeps_last_error_and_never_exceeds_budget() {
        let mut calls = 0u8;
        let out = Bounded::new(3).run(|attempt| {
            calls += 1;
            Err::<(), u8>(attempt)
        });
        assert_eq!(calls, 3);
        assert_eq!(out.attempts, 3);
        assert_eq!(out.result, Err(3));
    }

    #[test]
    fn zero_budget_still_runs_once() {
        let mut calls = 0u8;
        let _ = Bounded::new(0).run(|_| {
            calls += 1;
            Err::<(), ()>(())
        });
        assert_eq!(calls, 1);
    }
}
