use std::sync::Arc;

use crate::audio::crossfade::{Phase, Ramps, Route};
use crate::ir::bank::{Bank, BankId, BankState};
use crate::ir::convolver::Sample;
use crate::ir::convolver::vector::scale;

/// Read-only inputs every channel needs for one quantum.
pub struct QuantumContext<'a, T: Sample> {
    pub banks: &'a [Option<Arc<Bank<T>>>],
    pub ramps: &'a Ramps<T>,
    pub phase: Phase,
    /// Selected bank, kept running even while bypassed.
    pub armed: BankId,
    pub dry_gain: T,
    pub wet_gain: T,
}

/// Per-channel engine state: one bank state per slot plus scratch blocks.
pub struct ChannelState<T: Sample> {
    index: usize,
    banks: Vec<Option<BankState<T>>>,
    scratch_prev: Vec<T>,
    scratch_next: Vec<T>,
    discard: Vec<T>,
}

impl<T: Sample> ChannelState<T> {
    pub fn new(index: usize, bank_count: usize, quantum: usize) -> Self {
        Self {
            index,
            banks: (0..bank_count).map(|_| None).collect(),
            scratch_prev: vec![T::zero(); quantum],
            scratch_next: vec![T::zero(); quantum],
            discard: vec![T::zero(); quantum],
        }
    }

    /// Swaps in fresh state for `id`, returning the old one.
    pub fn install(&mut self, id: BankId, state: BankState<T>) -> Option<BankState<T>> {
        self.banks[id.index()].replace(state)
    }

    pub fn reset(&mut self) {
        for state in self.banks.iter_mut().flatten() {
            state.reset();
        }
    }

    /// Renders one quantum of `input` into `output` according to the phase.
    pub fn process(&mut self, ctx: &QuantumContext<'_, T>, input: &[T], output: &mut [T]) {
        let ch = self.index;
        let banks = &mut self.banks;

        match ctx.phase {
            Phase::Steady(route) => {
                render(banks, ch, ctx, route, input, output);
            }
            Phase::Priming { previous, selected } => {
                render(banks, ch, ctx, previous, input, output);
                render(banks, ch, ctx, selected, input, &mut self.scratch_next);
            }
            Phase::Blend { previous, selected } => {
                render(banks, ch, ctx, previous, input, &mut self.scratch_prev);
                render(banks, ch, ctx, selected, input, &mut self.scratch_next);
                ctx.ramps.blend(output, &self.scratch_prev, &self.scratch_next);
            }
        }

        let armed = Route::Bank(ctx.armed);
        if !ctx.phase.renders(armed) {
            render(banks, ch, ctx, armed, input, &mut self.discard);
        }
    }
}

fn render<T: Sample>(
    states: &mut [Option<BankState<T>>],
    channel: usize,
    ctx: &QuantumContext<'_, T>,
    route: Route,
    input: &[T],
    dst: &mut [T],
) {
    let id = match route {
        Route::Dry => {
            dst.copy_from_slice(input);
            return;
        }
        Route::Bank(id) => id,
    };

    match (&ctx.banks[id.index()], &mut states[id.index()]) {
        (Some(bank), Some(state)) => {
            state.process(bank, channel, input, ctx.dry_gain, dst);
            scale(dst, ctx.wet_gain);
        }
        // Empty slot
        _ => dst.fill(T::zero()),
    }
}
