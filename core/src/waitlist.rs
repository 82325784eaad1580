//! Waitlist promotion.
//!
//! Runs in the same transaction as the write that freed a seat. Promotion is
//! purely event-triggered; nothing polls the waitlist.

use crate::admission::Occupancy;
use crate::types::{CapacityLimits, Participation, ParticipationId, ParticipationStatus};
use chrono::{DateTime, Utc};

/// Promotes up to `freed` waitlisted participations to `joined`, earliest
/// `joined_at` first, without pushing the joined count past `max_capacity`.
///
/// Ties on `joined_at` are broken by participation id so the choice is
/// deterministic. Returns the promoted ids in promotion order.
pub fn promote(
    participations: &mut [Participation],
    limits: CapacityLimits,
    freed: u32,
    now: DateTime<Utc>,
) -> Vec<ParticipationId> {
    let budget = freed.min(Occupancy::count(participations.iter()).seats_left(limits));
    if budget == 0 {
        return Vec::new();
    }

    let mut queue: Vec<usize> = participations
        .iter()
        .enumerate()
        .filter(|(_, p)| p.status == ParticipationStatus::Waitlisted)
        .map(|(index, _)| index)
        .collect();
    queue.sort_by_key(|&index| (participations[index].joined_at, participations[index].id));

    queue
        .into_iter()
        .take(budget as usize)
        .map(|index| {
            let participation = &mut participations[index];
            participation.status = ParticipationStatus::Joined;
            participation.updated_at = now;
            participation.id
        })
        .collect()
}
