use core::cell::{Ref, RefCell};

use atomic::{Atomic, Ordering};
use critical_section::{CriticalSection, Mutex};
use heapless::Deque;

use crate::Phase;

pub(crate) const PHASE_HISTORY_SIZE: usize = 8;

/// Snapshot of the recent phase transitions, oldest first.
#[cfg(feature = "dump")]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseDump {
    pub history: [Phase; PHASE_HISTORY_SIZE],
    pub current: Phase,
}

/// Current protocol phase, readable lock-free from the foreground, with a
/// bounded history of transitions for post-mortem inspection.
pub(crate) struct PhaseHolder {
    history: Mutex<RefCell<Deque<Phase, PHASE_HISTORY_SIZE>>>,
    phase: Atomic<Phase>,
}

impl PhaseHolder {
    pub const fn new() -> Self {
        Self {
            history: Mutex::new(RefCell::new(Deque::new())),
            phase: Atomic::new(Phase::Idle),
        }
    }

    pub fn set(&self, phase: Phase) {
        self.record(phase);
        self.phase.store(phase, Ordering::SeqCst);
    }

    pub fn get(&self) -> Phase {
        self.phase.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn get_history<'cs>(
        &'cs self,
        cs: CriticalSection<'cs>,
    ) -> Ref<'cs, Deque<Phase, PHASE_HISTORY_SIZE>> {
        self.history.borrow_ref(cs)
    }

    #[cfg(feature = "dump")]
    pub fn dump(&self) -> PhaseDump {
        let mut history = [Phase::Idle; PHASE_HISTORY_SIZE];

        critical_section::with(|cs| {
            let h = self.history.borrow_ref(cs);
            let n = h.len();
            let (a, b) = h.as_slices();
            let s = PHASE_HISTORY_SIZE - n;

            history[s..s + a.len()].copy_from_slice(a);
            history[s + a.len()..].copy_from_slice(b);
        });

        PhaseDump {
            history,
            current: self.get(),
        }
    }

    fn record(&self, phase: Phase) {
        critical_section::with(|cs| {
            let mut h = self.history.borrow_ref_mut(cs);
            if h.is_full() {
                h.pop_front();
            }
            h.push_back(phase).ok();
        });
    }
}
