//! Identifier uniqueness registry
//!
//! Account numbers and transaction reference numbers are globally unique
//! for the lifetime of the store, never reused, even after deletion. The
//! persisted side of that guarantee is the index column family (entries
//! are written on commit and never removed); this module closes the gap
//! between "checked" and "committed": a reservation parks the identifier
//! in an in-flight set so two concurrent requests cannot both pass the
//! index check and then both commit.
//!
//! A [`Reservation`] releases its in-flight entry on drop. Callers that
//! commit must do so before dropping the reservation; afterwards the index
//! entry answers lookups.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// In-flight identifier set shared by all reservations of one namespace
type InFlight = Arc<Mutex<HashSet<String>>>;

/// Uniqueness registry for one identifier namespace
#[derive(Clone, Default)]
pub struct NumberRegistry {
    in_flight: InFlight,
}

/// A parked identifier; released when dropped
pub struct Reservation {
    set: InFlight,
    value: String,
}

impl NumberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an identifier for the duration of a creation attempt.
    ///
    /// Returns `None` when another in-flight request already holds it;
    /// the caller reports that as a conflict. The persisted index must be
    /// checked separately (while the reservation is held) for identifiers
    /// used by past commits.
    pub fn reserve(&self, value: &str) -> Option<Reservation> {
        let mut set = self.in_flight.lock();
        if !set.insert(value.to_string()) {
            return None;
        }
        Some(Reservation {
            set: self.in_flight.clone(),
            value: value.to_string(),
        })
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.set.lock().remove(&self.value);
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation").field("value", &self.value).finish()
    }
}
