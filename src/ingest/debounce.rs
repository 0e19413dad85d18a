use crate::analytics::Detection;
use crate::config::IntrusionPolicy;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// A qualifying detection whose centroid fell inside a zone
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneHit {
    pub zone_index: usize,
    pub detection: Detection,
}

/// Turns per-frame zone hits into intrusion events.
///
/// With `EveryFrame` every hit is an event. With `PerPresence` a zone emits
/// once when it becomes occupied, again after `realert_after` of continuous
/// occupancy, and re-arms on the first analysed frame where it is empty.
/// A zone only counts as alerted once [`confirm`](Self::confirm) is called
/// for it, so a hit whose event could not be stored is offered again on the
/// next analysed frame. State lives for one capture session.
pub struct IntrusionDebouncer {
    policy: IntrusionPolicy,
    realert_after: Option<Duration>,
    // zone index -> time of the last stored event, None while occupied but unalerted
    occupied: HashMap<usize, Option<Instant>>,
}

impl IntrusionDebouncer {
    pub fn new(policy: IntrusionPolicy, realert_after: Option<Duration>) -> Self {
        Self {
            policy,
            realert_after: realert_after.filter(|d| !d.is_zero()),
            occupied: HashMap::new(),
        }
    }

    /// Hits from one analysed frame that are due to become events
    pub fn admit(&mut self, hits: Vec<ZoneHit>, now: Instant) -> Vec<ZoneHit> {
        match self.policy {
            IntrusionPolicy::EveryFrame => hits,
            IntrusionPolicy::PerPresence => self.admit_per_presence(hits, now),
        }
    }

    fn admit_per_presence(&mut self, hits: Vec<ZoneHit>, now: Instant) -> Vec<ZoneHit> {
        // Strongest detection per zone, zones kept in ascending order
        let mut strongest: Vec<ZoneHit> = Vec::new();
        for hit in hits {
            match strongest.iter_mut().find(|h| h.zone_index == hit.zone_index) {
                Some(current) if current.detection.confidence < hit.detection.confidence => {
                    *current = hit
                }
                Some(_) => {}
                None => strongest.push(hit),
            }
        }
        strongest.sort_by_key(|h| h.zone_index);

        self.occupied
            .retain(|zone, _| strongest.iter().any(|h| h.zone_index == *zone));

        let mut admitted = Vec::new();
        for hit in strongest {
            let last = self.occupied.entry(hit.zone_index).or_insert(None);
            let due = match last {
                None => true,
                Some(last) => self
                    .realert_after
                    .map_or(false, |after| now.duration_since(*last) >= after),
            };

            if due {
                admitted.push(hit);
            }
        }
        admitted
    }

    /// Record that the event for an admitted hit was stored
    pub fn confirm(&mut self, zone_index: usize, now: Instant) {
        if self.policy == IntrusionPolicy::PerPresence {
            self.occupied.insert(zone_index, Some(now));
        }
    }
}
