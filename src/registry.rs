//! Registry - Single-slot owners for engine handles
//!
//! A slot moves through four states. The mutex is held only for the state
//! transition itself, never across the engine call, so a slow `open` or
//! `close` does not block other commands.
//!
//! ```text
//!            reserve()                commit(h)
//!   Vacant ───────────▶ Acquiring ───────────────▶ Occupied(h)
//!     ▲                     │ drop                  │      ▲
//!     │◀────────────────────┘                       │      │ drop
//!     │                                  release()  ▼      │
//!     └──────────────────────────────────────── Releasing(h)
//!                         finish()
//! ```
//!
//! Check-and-set happens under the lock, so two concurrent `reserve` calls can
//! never both succeed, and a failed release puts the handle back.

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState<H> {
    Vacant,
    Acquiring,
    Occupied(H),
    Releasing(H),
}

/// Why a slot transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotConflict {
    /// Nothing stored.
    Vacant,
    /// A handle is stored.
    Occupied,
    /// Another command is mid-acquire or mid-release.
    Busy,
}

/// Shareable single-slot handle registry.
#[derive(Debug)]
pub struct HandleSlot<H> {
    state: Arc<Mutex<SlotState<H>>>,
}

impl<H> Clone for HandleSlot<H> {
    fn clone(&self) -> Self { Self { state: self.state.clone() } }
}

impl<H: Copy + Send + 'static> Default for HandleSlot<H> {
    fn default() -> Self { Self::new() }
}

impl<H: Copy + Send + 'static> HandleSlot<H> {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(SlotState::Vacant)) }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<H>> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Live handle, if one is stored and not being released.
    pub fn current(&self) -> Option<H> {
        match *self.lock() {
            SlotState::Occupied(h) => Some(h),
            _ => None,
        }
    }

    pub fn is_vacant(&self) -> bool {
        matches!(*self.lock(), SlotState::Vacant)
    }

    /// Claim the empty slot. The returned reservation must be committed with
    /// a handle; dropping it empties the slot again.
    pub fn reserve(&self) -> Result<Reservation<H>, SlotConflict> {
        let mut state = self.lock();
        match *state {
            SlotState::Vacant => {
                *state = SlotState::Acquiring;
                Ok(Reservation { slot: self.clone(), committed: false })
            }
            SlotState::Occupied(_) => Err(SlotConflict::Occupied),
            SlotState::Acquiring | SlotState::Releasing(_) => Err(SlotConflict::Busy),
        }
    }

    /// Take the stored handle out for release. Finishing the release empties
    /// the slot; dropping it restores the handle.
    pub fn release(&self) -> Result<Release<H>, SlotConflict> {
        let mut state = self.lock();
        match *state {
            SlotState::Occupied(h) => {
                *state = SlotState::Releasing(h);
                Ok(Release { slot: self.clone(), handle: h, finished: false })
            }
            SlotState::Vacant => Err(SlotConflict::Vacant),
            SlotState::Acquiring | SlotState::Releasing(_) => Err(SlotConflict::Busy),
        }
    }
}

/// Pending claim on a vacant slot.
#[must_use = "dropping a reservation empties the slot"]
pub struct Reservation<H: Copy + Send + 'static> {
    slot: HandleSlot<H>,
    committed: bool,
}

impl<H: Copy + Send + 'static> Reservation<H> {
    pub fn commit(mut self, handle: H) {
        *self.slot.lock() = SlotState::Occupied(handle);
        self.committed = true;
    }
}

impl<H: Copy + Send + 'static> Drop for Reservation<H> {
    fn drop(&mut self) {
        if !self.committed {
            *self.slot.lock() = SlotState::Vacant;
        }
    }
}

/// Handle checked out for release.
#[must_use = "dropping a release restores the handle"]
pub struct Release<H: Copy + Send + 'static> {
    slot: HandleSlot<H>,
    handle: H,
    finished: bool,
}

impl<H: Copy + Send + 'static> Release<H> {
    pub fn handle(&self) -> H { self.handle }

    pub fn finish(mut self) {
        *self.slot.lock() = SlotState::Vacant;
        self.finished = true;
    }
}

impl<H: Copy + Send + 'static> Drop for Release<H> {
    fn drop(&mut self) {
        if !self.finished {
            *self.slot.lock() = SlotState::Occupied(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_commit_release() {
        let slot: HandleSlot<u64> = HandleSlot::new();
        assert!(slot.is_vacant());

        let reservation = slot.reserve().unwrap();
        assert_eq!(slot.current(), None);
        reservation.commit(7);
        assert_eq!(slot.current(), Some(7));

        let release = slot.release().unwrap();
        assert_eq!(release.handle(), 7);
        release.finish();
        assert!(slot.is_vacant());
    }

    #[test]
    fn second_reserve_is_refused() {
        let slot: HandleSlot<u64> = HandleSlot::new();
        let first = slot.reserve().unwrap();
        assert_eq!(slot.reserve().err(), Some(SlotConflict::Busy));
        first.commit(1);
        assert_eq!(slot.reserve().err(), Some(SlotConflict::Occupied));
    }

    #[test]
    fn dropped_reservation_empties_slot() {
        let slot: HandleSlot<u64> = HandleSlot::new();
        drop(slot.reserve().unwrap());
        assert!(slot.is_vacant());
    }

    #[test]
    fn dropped_release_restores_handle() {
        let slot: HandleSlot<u64> = HandleSlot::new();
        slot.reserve().unwrap().commit(3);
        {
            let release = slot.release().unwrap();
            assert_eq!(slot.current(), None);
            assert_eq!(slot.release().err(), Some(SlotConflict::Busy));
            let _ = release.handle();
        }
        assert_eq!(slot.current(), Some(3));
    }

    #[test]
    fn release_on_vacant() {
        let slot: HandleSlot<u64> = HandleSlot::new();
        assert_eq!(slot.release().err(), Some(SlotConflict::Vacant));
    }

    #[test]
    fn concurrent_reserve_single_winner() {
        let slot: HandleSlot<u64> = HandleSlot::new();
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let slot = slot.clone();
                std::thread::spawn(move || match slot.reserve() {
                    Ok(r) => { r.commit(i); true }
                    Err(_) => false,
                })
            })
            .collect();
        let winners = threads.into_iter().filter_map(|t| t.join().ok()).filter(|won| *won).count();
        assert_eq!(winners, 1);
        assert!(slot.current().is_some());
    }
}
