use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering, fence};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::audio::block::AudioBlock;
use crate::audio::channel::{ChannelState, QuantumContext};
use crate::audio::crossfade::{CrossfadeState, Ramps, Route};
use crate::error::{Error, Result};
use crate::ir::bank::{Bank, BankId, PreparedBank};
use crate::ir::convolver::Sample;
use crate::ir::model::ImpulseResponse;
use crate::settings::{EngineConfig, LoadStrategy};

const COMMAND_CAPACITY: usize = 16;
const NO_BANK: usize = usize::MAX;

pub enum EngineMessage<T: Sample> {
    InstallBank(Box<PreparedBank<T>>),
    SelectBank(BankId),
    SetBypass(bool),
}

/// Snapshot of the engine published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub selected_bank: usize,
    pub bypassed: bool,
    pub transitioning: bool,
    /// Bank still audible while a transition away from it runs.
    pub fading_bank: Option<usize>,
    pub loaded_banks: Vec<bool>,
}

/// Status shared with handles. The engine is the only writer and never
/// allocates to publish; readers retry while `sequence` is odd or moves
/// under them.
struct StatusCell {
    sequence: AtomicUsize,
    selected_bank: AtomicUsize,
    fading_bank: AtomicUsize,
    bypassed: AtomicBool,
    transitioning: AtomicBool,
    loaded_banks: Vec<AtomicBool>,
}

impl StatusCell {
    fn new(bank_count: usize) -> Self {
        Self {
            sequence: AtomicUsize::new(0),
            selected_bank: AtomicUsize::new(0),
            fading_bank: AtomicUsize::new(NO_BANK),
            bypassed: AtomicBool::new(false),
            transitioning: AtomicBool::new(false),
            loaded_banks: (0..bank_count).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    fn write(&self, update: impl FnOnce(&Self)) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        update(self);
        self.sequence.store(sequence.wrapping_add(2), Ordering::Release);
    }

    fn read(&self) -> EngineStatus {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let fading = self.fading_bank.load(Ordering::Relaxed);
            let status = EngineStatus {
                selected_bank: self.selected_bank.load(Ordering::Relaxed),
                bypassed: self.bypassed.load(Ordering::Relaxed),
                transitioning: self.transitioning.load(Ordering::Relaxed),
                fading_bank: (fading != NO_BANK).then_some(fading),
                loaded_banks: self
                    .loaded_banks
                    .iter()
                    .map(|loaded| loaded.load(Ordering::Relaxed))
                    .collect(),
            };

            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                return status;
            }
        }
    }
}

pub struct Engine<T: Sample> {
    config: EngineConfig,
    quantum: usize,
    dry_gain: T,
    wet_gain: T,
    /// Shared bank kernels, one slot per bank.
    banks: Vec<Option<Arc<Bank<T>>>>,
    channels: Vec<ChannelState<T>>,
    ramps: Ramps<T>,
    crossfade: CrossfadeState,
    /// Selected bank; keeps running while bypassed.
    armed: BankId,
    /// Samples the armed bank has processed since it was armed or installed.
    armed_run: usize,
    bypassed: bool,
    /// Channel fan-out pool; `None` runs on the caller thread.
    pool: Option<rayon::ThreadPool>,
    rx_updates: Receiver<EngineMessage<T>>,
    /// Replaced banks go back to the handle to be dropped off this thread.
    tx_retired: Sender<Box<PreparedBank<T>>>,
    status: Arc<StatusCell>,
    status_dirty: bool,
}

impl<T: Sample> Engine<T> {
    pub fn new(config: EngineConfig) -> Result<(Self, EngineHandle<T>)> {
        config.validate()?;

        let quantum = config.quantum();
        let armed = BankId::new(config.selected_bank, config.bank_count)?;

        let pool = if config.workers > 0 && config.channels > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .thread_name(|i| format!("partconv-worker-{i}"))
                .build()
                .map_err(|e| Error::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        let (tx_updates, rx_updates) = bounded::<EngineMessage<T>>(COMMAND_CAPACITY);
        let (tx_retired, rx_retired) = bounded::<Box<PreparedBank<T>>>(COMMAND_CAPACITY);

        let mut engine = Self {
            quantum,
            dry_gain: T::lit(config.dry_gain),
            wet_gain: T::lit(config.wet_gain),
            banks: (0..config.bank_count).map(|_| None).collect(),
            channels: (0..config.channels)
                .map(|ch| ChannelState::new(ch, config.bank_count, quantum))
                .collect(),
            ramps: Ramps::new(quantum),
            crossfade: CrossfadeState::steady(Route::Bank(armed)),
            armed,
            armed_run: 0,
            bypassed: false,
            pool,
            rx_updates,
            tx_retired,
            status: Arc::new(StatusCell::new(config.bank_count)),
            status_dirty: false,
            config,
        };
        engine.publish_status();

        info!(
            "Engine ready: {} channel(s), quantum {}, {} bank slot(s), {} worker(s)",
            engine.config.channels,
            quantum,
            engine.config.bank_count,
            engine.config.workers
        );

        let handle = EngineHandle {
            config: engine.config.clone(),
            tx_updates,
            rx_retired,
            status: Arc::clone(&engine.status),
            slots: Arc::new(Mutex::new(
                (0..engine.config.bank_count).map(|_| Slot::Empty).collect(),
            )),
        };

        Ok((engine, handle))
    }

    pub const fn quantum(&self) -> usize {
        self.quantum
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds a bank on the calling thread and installs it immediately.
    pub fn load_bank(&mut self, index: usize, ir: &ImpulseResponse<T>) -> Result<()> {
        let id = BankId::new(index, self.config.bank_count)?;
        let bank = Bank::build(id, ir, &self.config)?;
        let mut prepared = PreparedBank::new(Arc::new(bank), self.config.channels);
        self.install(&mut prepared)?;
        self.publish_status();
        Ok(())
    }

    /// Selects `index` at the next quantum boundary.
    pub fn select_bank(&mut self, index: usize) -> Result<()> {
        let id = BankId::new(index, self.config.bank_count)?;
        if self.banks[id.index()].is_none() {
            return Err(Error::BankNotLoaded(index));
        }
        self.apply_selection(id);
        self.publish_status();
        Ok(())
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.apply_bypass(bypass);
        self.publish_status();
    }

    /// Clears every channel's history and ends any transition.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.armed_run = 0;
        self.crossfade = CrossfadeState::steady(self.target_route());
        self.publish_status();
    }

    /// Processes exactly one quantum.
    pub fn process(&mut self, input: &AudioBlock<T>, output: &mut AudioBlock<T>) -> Result<()> {
        self.check_block(input)?;
        self.check_block(output)?;

        self.handle_messages();

        let was_transitioning = self.crossfade.is_transitioning();
        let span = self.route_span(self.crossfade.selected());
        let phase = self.crossfade.advance(span, self.quantum);

        let ctx = QuantumContext {
            banks: &self.banks,
            ramps: &self.ramps,
            phase,
            armed: self.armed,
            dry_gain: self.dry_gain,
            wet_gain: self.wet_gain,
        };

        match &self.pool {
            Some(pool) => {
                let per_job = self.channels.len().div_ceil(pool.current_num_threads());
                let inputs = input.channels();
                pool.install(|| {
                    self.channels
                        .par_chunks_mut(per_job)
                        .zip(output.channels_mut().par_chunks_mut(per_job))
                        .enumerate()
                        .for_each(|(job, (states, outs))| {
                            let first = job * per_job;
                            let ins = &inputs[first..first + states.len()];
                            for ((state, inp), out) in states.iter_mut().zip(ins).zip(outs) {
                                state.process(&ctx, inp, out);
                            }
                        });
                });
            }
            None => {
                for ((state, inp), out) in self
                    .channels
                    .iter_mut()
                    .zip(input.channels())
                    .zip(output.channels_mut())
                {
                    state.process(&ctx, inp, out);
                }
            }
        }

        if self.banks[self.armed.index()].is_some() {
            self.armed_run = self.armed_run.saturating_add(self.quantum);
        }

        if was_transitioning && !self.crossfade.is_transitioning() {
            debug!("Transition finished on {:?}", self.crossfade.selected());
            self.status_dirty = true;
        }
        if self.status_dirty {
            self.publish_status();
        }

        Ok(())
    }

    pub fn handle_messages(&mut self) {
        while let Ok(message) = self.rx_updates.try_recv() {
            match message {
                EngineMessage::InstallBank(mut prepared) => {
                    if let Err(e) = self.install(&mut prepared) {
                        error!("Failed to install bank {}: {e}", prepared.id());
                    }
                    self.retire(prepared);
                }
                EngineMessage::SelectBank(id) => {
                    if self.banks[id.index()].is_none() {
                        warn!("Ignoring selection of empty bank {id}");
                        continue;
                    }
                    self.apply_selection(id);
                }
                EngineMessage::SetBypass(bypass) => {
                    self.apply_bypass(bypass);
                }
            }
            self.status_dirty = true;
        }
    }

    /// Swaps `prepared` into its slot. On success `prepared` holds whatever
    /// the slot held before.
    fn install(&mut self, prepared: &mut PreparedBank<T>) -> Result<()> {
        let id = prepared.id();
        let slot = id.index();

        if slot >= self.banks.len() {
            return Err(Error::BankIndexOutOfRange {
                index: slot,
                count: self.banks.len(),
            });
        }
        if prepared.channel_states.len() != self.channels.len() {
            return Err(Error::ChannelMismatch {
                expected: self.channels.len(),
                got: prepared.channel_states.len(),
            });
        }
        let Some(bank) = prepared.bank.as_ref() else {
            return Err(Error::BankNotLoaded(slot));
        };
        if bank.plan().quantum() != self.quantum {
            return Err(Error::BlockSizeMismatch {
                expected: self.quantum,
                got: bank.plan().quantum(),
            });
        }
        if self.banks[slot].is_some()
            && (id == self.armed || self.crossfade.involves(Route::Bank(id)))
        {
            return Err(Error::BankBusy(slot));
        }

        for (channel, state) in self
            .channels
            .iter_mut()
            .zip(prepared.channel_states.iter_mut())
        {
            if let Some(fresh) = state.take() {
                *state = channel.install(id, fresh);
            }
        }
        std::mem::swap(&mut self.banks[slot], &mut prepared.bank);
        if id == self.armed {
            self.armed_run = 0;
        }

        info!("Installed bank {id}");
        self.status_dirty = true;
        Ok(())
    }

    /// Hands a replaced or rejected bank back to the control side.
    fn retire(&self, prepared: Box<PreparedBank<T>>) {
        if let Err(e) = self.tx_retired.try_send(prepared) {
            warn!(
                "No room to return bank {}, releasing it on the processing thread",
                e.into_inner().id()
            );
        }
    }

    fn apply_selection(&mut self, id: BankId) {
        if id == self.armed {
            return;
        }
        self.armed = id;
        self.armed_run = 0;
        if !self.bypassed && self.crossfade.retarget(Route::Bank(id), self.quantum, 0) {
            info!("Switching to bank {id}");
        }
        self.status_dirty = true;
    }

    fn apply_bypass(&mut self, bypass: bool) {
        if bypass == self.bypassed {
            return;
        }
        self.bypassed = bypass;
        // The armed bank kept running while bypassed
        let primed = if bypass { 0 } else { self.armed_run };
        if self
            .crossfade
            .retarget(self.target_route(), self.quantum, primed)
        {
            info!("Bypass {}", if bypass { "on" } else { "off" });
        }
        self.status_dirty = true;
    }

    const fn target_route(&self) -> Route {
        if self.bypassed {
            Route::Dry
        } else {
            Route::Bank(self.armed)
        }
    }

    fn route_span(&self, route: Route) -> usize {
        match route {
            Route::Dry => 0,
            Route::Bank(id) => self.banks[id.index()].as_ref().map_or(0, |b| b.span()),
        }
    }

    fn check_block(&self, block: &AudioBlock<T>) -> Result<()> {
        if block.channel_count() != self.channels.len() {
            return Err(Error::ChannelMismatch {
                expected: self.channels.len(),
                got: block.channel_count(),
            });
        }
        if block.frames() != self.quantum {
            return Err(Error::BlockSizeMismatch {
                expected: self.quantum,
                got: block.frames(),
            });
        }
        Ok(())
    }

    fn publish_status(&mut self) {
        let transitioning = self.crossfade.is_transitioning();
        let fading = match self.crossfade.audible() {
            Route::Bank(id) if transitioning => id.index(),
            _ => NO_BANK,
        };
        let (armed, bypassed, banks) = (self.armed, self.bypassed, &self.banks);

        self.status.write(|cell| {
            cell.selected_bank.store(armed.index(), Ordering::Relaxed);
            cell.fading_bank.store(fading, Ordering::Relaxed);
            cell.bypassed.store(bypassed, Ordering::Relaxed);
            cell.transitioning.store(transitioning, Ordering::Relaxed);
            for (loaded, bank) in cell.loaded_banks.iter().zip(banks) {
                loaded.store(bank.is_some(), Ordering::Relaxed);
            }
        });
        self.status_dirty = false;
    }
}

/// What the handle has delivered for a bank slot.
enum Slot<T> {
    Empty,
    /// Raw response waiting for its first selection.
    Pending(ImpulseResponse<T>),
    Sent,
}

/// Control side of an [`Engine`]. Builds banks on the calling thread and
/// hands them to the engine, which installs them at the next quantum.
pub struct EngineHandle<T: Sample> {
    config: EngineConfig,
    tx_updates: Sender<EngineMessage<T>>,
    rx_retired: Receiver<Box<PreparedBank<T>>>,
    status: Arc<StatusCell>,
    slots: Arc<Mutex<Vec<Slot<T>>>>,
}

impl<T: Sample> Clone for EngineHandle<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            tx_updates: self.tx_updates.clone(),
            rx_retired: self.rx_retired.clone(),
            status: Arc::clone(&self.status),
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T: Sample> EngineHandle<T> {
    /// Delivers an impulse response for bank `index`.
    ///
    /// With [`LoadStrategy::Eager`] the bank is built now and sent to the
    /// engine; with [`LoadStrategy::OnDemand`] the response is checked and
    /// stored, and the FFT kernels are built on first selection. Errors are
    /// returned here and leave the engine untouched. A loaded bank that is
    /// selected or still fading out is rejected with [`Error::BankBusy`].
    pub fn load_bank(&self, index: usize, ir: ImpulseResponse<T>) -> Result<()> {
        self.collect_retired();
        let id = BankId::new(index, self.config.bank_count)?;
        self.check_replaceable(index)?;

        match self.config.load_strategy {
            LoadStrategy::Eager => {
                self.build_and_send(id, &ir)?;
                self.lock_slots()[index] = Slot::Sent;
            }
            LoadStrategy::OnDemand => {
                Bank::check_response(&ir, &self.config)?;
                self.lock_slots()[index] = Slot::Pending(ir);
                debug!("Stored impulse response for bank {id} until selected");
            }
        }
        Ok(())
    }

    pub fn select_bank(&self, index: usize) -> Result<()> {
        self.collect_retired();
        let id = BankId::new(index, self.config.bank_count)?;

        let slot = std::mem::replace(&mut self.lock_slots()[index], Slot::Empty);
        match slot {
            Slot::Pending(ir) => {
                let built = self
                    .check_replaceable(index)
                    .and_then(|()| self.build_and_send(id, &ir));
                if let Err(e) = built {
                    self.lock_slots()[index] = Slot::Pending(ir);
                    return Err(e);
                }
            }
            Slot::Empty if !self.status().loaded_banks[index] => {
                return Err(Error::BankNotLoaded(index));
            }
            Slot::Empty | Slot::Sent => {}
        }
        self.lock_slots()[index] = Slot::Sent;

        self.send(EngineMessage::SelectBank(id))
    }

    pub fn set_bypass(&self, bypass: bool) -> Result<()> {
        self.collect_retired();
        self.send(EngineMessage::SetBypass(bypass))
    }

    pub fn status(&self) -> EngineStatus {
        self.status.read()
    }

    /// Rejects a delivery the engine would refuse to install.
    fn check_replaceable(&self, index: usize) -> Result<()> {
        let status = self.status();
        let busy = status.loaded_banks[index]
            && (status.selected_bank == index || status.fading_bank == Some(index));
        if busy {
            Err(Error::BankBusy(index))
        } else {
            Ok(())
        }
    }

    /// Drops banks the engine has swapped out.
    fn collect_retired(&self) {
        for retired in self.rx_retired.try_iter() {
            debug!("Released replaced state of bank {}", retired.id());
        }
    }

    fn build_and_send(&self, id: BankId, ir: &ImpulseResponse<T>) -> Result<()> {
        let bank = Bank::build(id, ir, &self.config)?;
        let prepared = PreparedBank::new(Arc::new(bank), self.config.channels);
        self.send(EngineMessage::InstallBank(Box::new(prepared)))
    }

    fn send(&self, message: EngineMessage<T>) -> Result<()> {
        match self.tx_updates.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                warn!("Engine command queue full, waiting");
                self.tx_updates
                    .send(message)
                    .map_err(|_| Error::Disconnected)
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::Disconnected),
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, Vec<Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
