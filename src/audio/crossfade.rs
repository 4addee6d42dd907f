use crate::ir::bank::BankId;
use crate::ir::convolver::Sample;
use crate::ir::convolver::vector;

/// Where a channel's output comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Input passed through unchanged.
    Dry,
    Bank(BankId),
}

/// What to render for the current quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Steady(Route),
    /// `previous` is still audible while `selected` fills its history.
    Priming { previous: Route, selected: Route },
    /// Last transition quantum: ramp from `previous` to `selected`.
    Blend { previous: Route, selected: Route },
}

impl Phase {
    pub fn renders(&self, route: Route) -> bool {
        match *self {
            Self::Steady(r) => r == route,
            Self::Priming { previous, selected } | Self::Blend { previous, selected } => {
                previous == route || selected == route
            }
        }
    }
}

/// Transition state machine shared by every channel.
///
/// `progress == 0` means steady on `selected`. Otherwise `previous` stays
/// audible until `selected` has seen more input than its span, then a single
/// ramp quantum hands over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossfadeState {
    previous: Route,
    selected: Route,
    progress: usize,
}

impl CrossfadeState {
    pub const fn steady(route: Route) -> Self {
        Self {
            previous: route,
            selected: route,
            progress: 0,
        }
    }

    pub const fn selected(&self) -> Route {
        self.selected
    }

    /// The route currently heard (before any ramp).
    pub const fn audible(&self) -> Route {
        if self.progress == 0 {
            self.selected
        } else {
            self.previous
        }
    }

    pub const fn is_transitioning(&self) -> bool {
        self.progress > 0
    }

    /// Whether `route` is being heard or primed.
    pub fn involves(&self, route: Route) -> bool {
        self.selected == route || (self.is_transitioning() && self.previous == route)
    }

    /// Starts (or redirects) a transition towards `target`. `primed` is how
    /// many samples of the live input `target` has already processed; once
    /// that exceeds its span the hand-over needs no priming at all. Returns
    /// `false` when nothing changed.
    pub fn retarget(&mut self, target: Route, quantum: usize, primed: usize) -> bool {
        if target == self.selected {
            return false;
        }

        if self.progress == 0 {
            self.previous = self.selected;
        } else if target == self.previous {
            // Still fully audible, no fade needed
            *self = Self::steady(target);
            return true;
        }

        self.selected = target;
        self.progress = primed.saturating_add(quantum);
        true
    }

    /// Decides this quantum's phase and moves the state forward.
    pub fn advance(&mut self, selected_span: usize, quantum: usize) -> Phase {
        if self.progress == 0 {
            return Phase::Steady(self.selected);
        }

        let (previous, selected) = (self.previous, self.selected);
        if self.progress > selected_span {
            *self = Self::steady(selected);
            Phase::Blend { previous, selected }
        } else {
            self.progress += quantum;
            Phase::Priming { previous, selected }
        }
    }
}

/// Linear fade curves for one quantum: `up[n] = (n + 1) / Q`, `down = 1 - up`.
pub struct Ramps<T> {
    up: Vec<T>,
    down: Vec<T>,
}

impl<T: Sample> Ramps<T> {
    pub fn new(quantum: usize) -> Self {
        let up: Vec<T> = (0..quantum)
            .map(|n| T::lit((n + 1) as f64 / quantum as f64))
            .collect();
        let down = up.iter().map(|&u| T::one() - u).collect();
        Self { up, down }
    }

    /// `dst = down * prev + up * next`
    pub fn blend(&self, dst: &mut [T], prev: &[T], next: &[T]) {
        vector::crossfade(dst, prev, next, &self.down, &self.up);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(i: usize) -> Route {
        Route::Bank(BankId::new(i, 4).unwrap())
    }

    #[test]
    fn test_steady_stays_steady() {
        let mut state = CrossfadeState::steady(bank(0));
        assert_eq!(state.advance(1000, 64), Phase::Steady(bank(0)));
        assert!(!state.retarget(bank(0), 64, 0));
        assert!(!state.is_transitioning());
    }

    #[test]
    fn test_primes_until_span_then_blends() {
        let mut state = CrossfadeState::steady(bank(0));
        assert!(state.retarget(bank(1), 64, 0));

        let priming = Phase::Priming {
            previous: bank(0),
            selected: bank(1),
        };
        // progress 64, 128: not past a 128 span yet
        assert_eq!(state.advance(128, 64), priming);
        assert_eq!(state.advance(128, 64), priming);
        assert_eq!(
            state.advance(128, 64),
            Phase::Blend {
                previous: bank(0),
                selected: bank(1)
            }
        );
        assert_eq!(state.advance(128, 64), Phase::Steady(bank(1)));
    }

    #[test]
    fn test_dry_blends_immediately() {
        let mut state = CrossfadeState::steady(bank(2));
        state.retarget(Route::Dry, 32, 0);

        assert!(matches!(state.advance(0, 32), Phase::Blend { .. }));
        assert_eq!(state.selected(), Route::Dry);
        assert!(!state.is_transitioning());
    }

    #[test]
    fn test_retarget_keeps_audible_route() {
        let mut state = CrossfadeState::steady(bank(0));
        state.retarget(bank(1), 64, 0);
        state.advance(1000, 64);

        state.retarget(bank(2), 64, 0);
        assert_eq!(state.audible(), bank(0));
        assert!(state.involves(bank(2)));
        assert!(!state.involves(bank(1)));

        // Back to what is still audible: no fade
        assert!(state.retarget(bank(0), 64, 0));
        assert_eq!(state, CrossfadeState::steady(bank(0)));
    }

    #[test]
    fn test_primed_route_blends_at_once() {
        let mut state = CrossfadeState::steady(Route::Dry);
        assert!(state.retarget(bank(1), 64, 4096));

        assert_eq!(
            state.advance(2048, 64),
            Phase::Blend {
                previous: Route::Dry,
                selected: bank(1)
            }
        );
        assert_eq!(state.advance(2048, 64), Phase::Steady(bank(1)));

        // Not yet fed past its span: primes first
        state.retarget(Route::Dry, 64, 0);
        state.advance(0, 64);
        state.retarget(bank(1), 64, 1024);
        assert!(matches!(state.advance(2048, 64), Phase::Priming { .. }));
    }

    #[test]
    fn test_ramps_sum_to_one() {
        let ramps = Ramps::<f64>::new(16);
        assert_eq!(ramps.up[15], 1.0);
        for (u, d) in ramps.up.iter().zip(&ramps.down) {
            assert!((u + d - 1.0).abs() < 1e-15);
        }

        let mut dst = [0.0; 16];
        ramps.blend(&mut dst, &[2.0; 16], &[2.0; 16]);
        assert!(dst.iter().all(|&v| (v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_phase_renders() {
        let phase = Phase::Priming {
            previous: Route::Dry,
            selected: bank(3),
        };
        assert!(phase.renders(bank(3)));
        assert!(phase.renders(Route::Dry));
        assert!(!phase.renders(bank(0)));
    }
}
