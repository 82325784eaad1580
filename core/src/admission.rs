//! Capacity-bound admission decisions.
//!
//! A pure function over the session's admission mode, its live occupancy and
//! its limits. Callers must read the occupancy and write the outcome inside the
//! same locked transaction; see [`crate::store`].

use crate::error::{EngineError, Result};
use crate::types::{CapacityLimits, Participation, ParticipationStatus};
use serde::{Deserialize, Serialize};

/// How a join attempt that passed the access gate is admitted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// Seat if available, otherwise waitlist, otherwise reject
    Capacity,
    /// Always `pending`; capacity is checked when an admin approves
    Approval,
}

/// Live occupancy of a session, derived from its participation rows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    /// Participations holding a seat
    pub joined: u32,
    /// Participations in the waitlist
    pub waitlisted: u32,
    /// Participations awaiting approval
    pub pending: u32,
}

impl Occupancy {
    /// Counts the statuses of a session's participations.
    #[must_use]
    pub fn count<'a>(participations: impl IntoIterator<Item = &'a Participation>) -> Self {
        participations
            .into_iter()
            .fold(Self::default(), |mut occupancy, p| {
                match p.status {
                    ParticipationStatus::Joined => occupancy.joined += 1,
                    ParticipationStatus::Waitlisted => occupancy.waitlisted += 1,
                    ParticipationStatus::Pending => occupancy.pending += 1,
                    ParticipationStatus::Cancelled => {}
                }
                occupancy
            })
    }

    /// Seats still free under `limits` (zero when over-committed).
    #[must_use]
    pub const fn seats_left(&self, limits: CapacityLimits) -> u32 {
        limits.max_capacity.saturating_sub(self.joined)
    }

    /// Waitlist places still free under `limits`.
    #[must_use]
    pub const fn waitlist_left(&self, limits: CapacityLimits) -> u32 {
        limits.max_waitlist.saturating_sub(self.waitlisted)
    }
}

/// Resulting status of an admitted join attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// Seat granted
    Joined,
    /// Placed in the waitlist
    Waitlisted,
    /// Awaiting approval
    Pending,
}

impl Admission {
    /// Participation status this admission produces
    #[must_use]
    pub const fn status(self) -> ParticipationStatus {
        match self {
            Self::Joined => ParticipationStatus::Joined,
            Self::Waitlisted => ParticipationStatus::Waitlisted,
            Self::Pending => ParticipationStatus::Pending,
        }
    }
}

/// Decides the outcome of a join attempt or an approval.
///
/// Approving a `pending` record uses [`AdmissionMode::Capacity`], so an
/// approval can land on the waitlist when seats filled up in the meantime.
///
/// # Errors
///
/// Returns [`EngineError::SessionFull`] when neither a seat nor a waitlist
/// place is available.
pub fn decide(mode: AdmissionMode, occupancy: Occupancy, limits: CapacityLimits) -> Result<Admission> {
    match mode {
        AdmissionMode::Approval => Ok(Admission::Pending),
        AdmissionMode::Capacity if occupancy.joined < limits.max_capacity => Ok(Admission::Joined),
        AdmissionMode::Capacity if occupancy.waitlisted < limits.max_waitlist => {
            Ok(Admission::Waitlisted)
        }
        AdmissionMode::Capacity => Err(EngineError::SessionFull),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LIMITS: CapacityLimits = CapacityLimits {
        max_capacity: 2,
        max_waitlist: 1,
    };

    fn occupancy(joined: u32, waitlisted: u32) -> Occupancy {
        Occupancy {
            joined,
            waitlisted,
            pending: 0,
        }
    }

    #[test]
    fn test_seat_available() {
        assert_eq!(decide(AdmissionMode::Capacity, occupancy(1, 0), LIMITS), Ok(Admission::Joined));
    }

    #[test]
    fn test_full_goes_to_waitlist() {
        assert_eq!(
            decide(AdmissionMode::Capacity, occupancy(2, 0), LIMITS),
            Ok(Admission::Waitlisted)
        );
    }

    #[test]
    fn test_full_and_waitlist_full_rejects() {
        assert_eq!(
            decide(AdmissionMode::Capacity, occupancy(2, 1), LIMITS),
            Err(EngineError::SessionFull)
        );
    }

    #[test]
    fn test_zero_waitlist_rejects_when_full() {
        let limits = CapacityLimits {
            max_capacity: 1,
            max_waitlist: 0,
        };
        assert_eq!(
            decide(AdmissionMode::Capacity, occupancy(1, 0), limits),
            Err(EngineError::SessionFull)
        );
    }

    #[test]
    fn test_approval_mode_ignores_capacity() {
        assert_eq!(
            decide(AdmissionMode::Approval, occupancy(2, 1), LIMITS),
            Ok(Admission::Pending)
        );
    }

    #[test]
    fn test_over_committed_after_capacity_reduction() {
        let limits = CapacityLimits {
            max_capacity: 1,
            max_waitlist: 0,
        };
        let over = occupancy(3, 0);
        assert_eq!(over.seats_left(limits), 0);
        assert_eq!(decide(AdmissionMode::Capacity, over, limits), Err(EngineError::SessionFull));
    }

    proptest! {
        /// Admitting one more participant never breaks either bound.
        #[test]
        fn prop_admission_respects_limits(
            max_capacity in 1u32..20,
            max_waitlist in 0u32..20,
            joined in 0u32..25,
            waitlisted in 0u32..25,
        ) {
            let limits = CapacityLimits { max_capacity, max_waitlist };
            let joined = joined.min(max_capacity);
            let waitlisted = waitlisted.min(max_waitlist);
            match decide(AdmissionMode::Capacity, occupancy(joined, waitlisted), limits) {
                Ok(Admission::Joined) => prop_assert!(joined + 1 <= max_capacity),
                Ok(Admission::Waitlisted) => {
                    prop_assert_eq!(joined, max_capacity);
                    prop_assert!(waitlisted + 1 <= max_waitlist);
                }
                Ok(Admission::Pending) => prop_assert!(false, "capacity mode never yields pending"),
                Err(e) => {
                    prop_assert_eq!(e, EngineError::SessionFull);
                    prop_assert_eq!(joined, max_capacity);
                    prop_assert_eq!(waitlisted, max_waitlist);
                }
            }
        }
    }
}
