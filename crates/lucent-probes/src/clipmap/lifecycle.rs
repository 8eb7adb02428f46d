use super::UpdateRequest;

use lucent_core::static_assertions::const_assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};

/// Where a probe slot is in its update cycle: `Empty → Queued → InFlight → Valid → Stale → Queued …`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum ProbeLifecycleState {
    /// Needs a trace; highest update priority.
    Empty = 0,
    /// Selected by the scheduler and waiting for a worker.
    Queued = 1,
    /// Claimed by a worker that is tracing it.
    InFlight = 2,
    Valid = 3,
    /// Has data, but it is old enough to be retraced.
    Stale = 4,
}

impl ProbeLifecycleState {
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::Queued,
            2 => Self::InFlight,
            3 => Self::Valid,
            4 => Self::Stale,
            _ => Self::Empty,
        }
    }
}

const STATE_BITS: u32 = 8;
const STATE_MASK: u32 = (1 << STATE_BITS) - 1;
/// Tickets wrap within the bits left over after the state.
pub const TICKET_MASK: u32 = u32::MAX >> STATE_BITS;

const_assert_eq!(STATE_BITS + TICKET_MASK.count_ones(), 32);

/// The packed contents of one slot: lifecycle state in the low byte and the ticket of the selection that last touched the
/// slot in the upper 24 bits.
///
/// Every transition is a compare-and-swap on the whole word, so a worker holding a request from an older selection of the
/// same slot can never move the slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SlotWord {
    pub state: ProbeLifecycleState,
    pub ticket: u32,
}

impl SlotWord {
    pub fn new(state: ProbeLifecycleState, ticket: u32) -> Self {
        Self {
            state,
            ticket: ticket & TICKET_MASK,
        }
    }

    fn pack(self) -> u32 {
        (self.ticket << STATE_BITS) | self.state as u32
    }

    fn unpack(bits: u32) -> Self {
        Self {
            state: ProbeLifecycleState::from_bits((bits & STATE_MASK) as u8),
            ticket: bits >> STATE_BITS,
        }
    }
}

/// Lifecycle states for every storage slot of every level, as flat arrays of atomics.
///
/// This is the only scheduler state shared with worker threads. The scheduler owns it through an `Arc` and does all
/// transitions except `Queued → InFlight`, which workers perform through [`ProbeLifecycleTable::try_claim`].
pub struct ProbeLifecycleTable {
    levels: Vec<Box<[AtomicU32]>>,
}

impl ProbeLifecycleTable {
    pub fn new(level_count: usize, slots_per_level: usize) -> Self {
        let empty = SlotWord::new(ProbeLifecycleState::Empty, 0).pack();
        Self {
            levels: (0..level_count)
                .map(|_| (0..slots_per_level).map(|_| AtomicU32::new(empty)).collect())
                .collect(),
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn slots_per_level(&self) -> usize {
        self.levels.first().map_or(0, |l| l.len())
    }

    #[inline]
    pub fn word(&self, level: u32, linear_index: u32) -> SlotWord {
        SlotWord::unpack(self.slot(level, linear_index).load(Ordering::Acquire))
    }

    #[inline]
    pub fn state(&self, level: u32, linear_index: u32) -> ProbeLifecycleState {
        self.word(level, linear_index).state
    }

    /// `Queued → InFlight` for exactly the selection that produced `request`. At most one caller can succeed.
    pub fn try_claim(&self, request: &UpdateRequest) -> bool {
        self.transition(
            request.level,
            request.storage_linear_index,
            SlotWord::new(ProbeLifecycleState::Queued, request.ticket),
            SlotWord::new(ProbeLifecycleState::InFlight, request.ticket),
        )
    }

    /// Moves the slot from `from` to `to` if and only if it currently holds `from`.
    #[inline]
    pub fn transition(&self, level: u32, linear_index: u32, from: SlotWord, to: SlotWord) -> bool {
        self.slot(level, linear_index)
            .compare_exchange(from.pack(), to.pack(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Unconditionally overwrites the slot.
    #[inline]
    pub fn store(&self, level: u32, linear_index: u32, word: SlotWord) {
        self.slot(level, linear_index)
            .store(word.pack(), Ordering::Release);
    }

    /// States of all slots of `level`, indexed by storage linear index.
    pub fn snapshot(&self, level: u32) -> Vec<ProbeLifecycleState> {
        self.levels[level as usize]
            .iter()
            .map(|s| SlotWord::unpack(s.load(Ordering::Acquire)).state)
            .collect()
    }

    #[inline]
    fn slot(&self, level: u32, linear_index: u32) -> &AtomicU32 {
        &self.levels[level as usize][linear_index as usize]
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;
    use crate::glam::IVec3;

    use std::sync::atomic::AtomicUsize;

    fn request(ticket: u32) -> UpdateRequest {
        UpdateRequest {
            level: 0,
            local_index: IVec3::ZERO,
            storage_index: IVec3::ZERO,
            storage_linear_index: 3,
            ticket,
        }
    }

    #[test]
    fn word_packing_keeps_state_and_ticket() {
        for state in [
            ProbeLifecycleState::Empty,
            ProbeLifecycleState::Queued,
            ProbeLifecycleState::InFlight,
            ProbeLifecycleState::Valid,
            ProbeLifecycleState::Stale,
        ] {
            let word = SlotWord::new(state, TICKET_MASK);
            assert_eq!(SlotWord::unpack(word.pack()), word);
        }
        // Tickets wrap instead of spilling into the state bits.
        assert_eq!(SlotWord::new(ProbeLifecycleState::Valid, TICKET_MASK + 2).ticket, 1);
    }

    #[test]
    fn claim_requires_matching_ticket() {
        let table = ProbeLifecycleTable::new(1, 8);
        table.store(0, 3, SlotWord::new(ProbeLifecycleState::Queued, 7));

        assert!(!table.try_claim(&request(6)));
        assert!(table.try_claim(&request(7)));
        assert_eq!(table.state(0, 3), ProbeLifecycleState::InFlight);
        // Already claimed.
        assert!(!table.try_claim(&request(7)));
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let table = ProbeLifecycleTable::new(1, 8);
        table.store(0, 3, SlotWord::new(ProbeLifecycleState::Queued, 1));

        let winners = AtomicUsize::new(0);
        let table_ref = &table;
        let winners_ref = &winners;
        crossbeam::scope(move |scope| {
            for _ in 0..16 {
                scope.spawn(move |_| {
                    if table_ref.try_claim(&request(1)) {
                        winners_ref.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        })
        .unwrap();

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(table.state(0, 3), ProbeLifecycleState::InFlight);
    }
}
