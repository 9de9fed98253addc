//! Per-particle contact history ledger
//!
//! Each particle keeps one record per wall element it currently overlaps.
//! A record carries a fixed number of history values (for example the
//! accumulated tangential displacement of a friction model) that persist
//! while the contact lasts.
//!
//! Records are updated in sweeps:
//!
//! 1. [`ContactLedger::begin_sweep`] marks every record as unclaimed
//! 2. [`ContactLedger::handle_contacts`] with the overlap set of each particle,
//!    or [`ContactLedger::handle_contact`] / [`ContactLedger::handle_no_contact`]
//!    for single particle-element pairs
//! 3. [`ContactLedger::compact`] drops every record not claimed in the sweep
//!
//! When a particle slides from one element onto a neighbour in the same plane
//! its history moves with it, so a flat wall made of many triangles behaves
//! like one face.

use crate::error::{Result, WallMeshError};
use crate::mesh::surface::TopologyProvider;
use crate::mesh::types::ElementId;
use crate::parallel::Communicator;

const INITIAL_SLOT_BOUND: usize = 4;

/// Contact of one particle with one element
#[derive(Debug, Clone, PartialEq)]
pub struct ContactRecord {
    pub element: ElementId,
    pub history: Vec<f64>,
    pub pending_delete: bool,
    claimed: bool,
}

impl ContactRecord {
    fn new(element: ElementId, width: usize) -> Self {
        Self {
            element,
            history: vec![0.0; width],
            pending_delete: false,
            claimed: true,
        }
    }

    fn claim(&mut self) {
        self.claimed = true;
        self.pending_delete = false;
    }
}

/// Contact records of all local particles
#[derive(Debug, Clone)]
pub struct ContactLedger {
    slots: Vec<Vec<ContactRecord>>,
    history_values: usize,
    slot_bound: usize,
}

impl ContactLedger {
    pub fn new(n_particles: usize, history_values: usize) -> Self {
        Self {
            slots: vec![Vec::new(); n_particles],
            history_values,
            slot_bound: INITIAL_SLOT_BOUND,
        }
    }

    pub fn n_particles(&self) -> usize {
        self.slots.len()
    }

    pub fn history_values(&self) -> usize {
        self.history_values
    }

    /// Current per-particle slot bound
    pub fn slot_bound(&self) -> usize {
        self.slot_bound
    }

    /// Follow the host particle count; new particles start without contacts
    pub fn resize_particles(&mut self, n_particles: usize) {
        self.slots.resize_with(n_particles, Vec::new);
    }

    /// Drop particle `p`; the last particle takes its index
    pub fn remove_particle(&mut self, p: usize) {
        if p < self.slots.len() {
            self.slots.swap_remove(p);
        }
    }

    pub fn records(&self, p: usize) -> &[ContactRecord] {
        &self.slots[p]
    }

    pub fn contact_count(&self, p: usize) -> usize {
        self.slots[p].len()
    }

    pub fn has_contact(&self, p: usize, element: ElementId) -> bool {
        self.slots[p].iter().any(|r| r.element == element)
    }

    /// History values of the contact between `p` and `element`
    pub fn history(&self, p: usize, element: ElementId) -> Result<&[f64]> {
        self.slots[p]
            .iter()
            .find(|r| r.element == element)
            .map(|r| r.history.as_slice())
            .ok_or(WallMeshError::ContactSlotCorrupt {
                particle: p,
                element,
            })
    }

    pub fn history_mut(&mut self, p: usize, element: ElementId) -> Result<&mut [f64]> {
        self.slots[p]
            .iter_mut()
            .find(|r| r.element == element)
            .map(|r| r.history.as_mut_slice())
            .ok_or(WallMeshError::ContactSlotCorrupt {
                particle: p,
                element,
            })
    }

    pub fn begin_sweep(&mut self) {
        for record in self.slots.iter_mut().flatten() {
            record.claimed = false;
        }
    }

    /// Record an overlap of particle `p` with `element`
    ///
    /// An existing record for the element is kept. Otherwise the history of
    /// a record not yet claimed in this sweep whose element shares a plane
    /// with `element` is taken over, and failing that a zeroed record is
    /// added. Returns the history values of the contact.
    ///
    /// A record is only safe from takeover once claimed, so prefer
    /// [`handle_contacts`](Self::handle_contacts) when a particle touches
    /// several elements.
    pub fn handle_contact(
        &mut self,
        p: usize,
        element: ElementId,
        topology: &dyn TopologyProvider,
    ) -> Result<&mut [f64]> {
        let k = match self.claim_existing(p, element) {
            Some(k) => k,
            None => self.take_over_or_insert(p, element, topology)?,
        };
        Ok(self.slots[p][k].history.as_mut_slice())
    }

    /// Record the complete overlap set of particle `p` for this sweep
    ///
    /// Records of all elements in `overlaps` are claimed before any new
    /// overlap looks for a history to take over, so a continuing contact
    /// always keeps its own history.
    pub fn handle_contacts(
        &mut self,
        p: usize,
        overlaps: &[ElementId],
        topology: &dyn TopologyProvider,
    ) -> Result<()> {
        let mut fresh = Vec::new();
        for &element in overlaps {
            if self.claim_existing(p, element).is_none() {
                fresh.push(element);
            }
        }
        for element in fresh {
            self.take_over_or_insert(p, element, topology)?;
        }
        Ok(())
    }

    fn claim_existing(&mut self, p: usize, element: ElementId) -> Option<usize> {
        let k = self.slots[p].iter().position(|r| r.element == element)?;
        self.slots[p][k].claim();
        Some(k)
    }

    fn take_over_or_insert(
        &mut self,
        p: usize,
        element: ElementId,
        topology: &dyn TopologyProvider,
    ) -> Result<usize> {
        let slot = &mut self.slots[p];

        let mut transfer = None;
        for (k, record) in slot.iter().enumerate() {
            if !record.claimed && topology.share_plane(record.element, element)? {
                transfer = Some(k);
                break;
            }
        }

        if let Some(k) = transfer {
            log::trace!(
                "Particle {}: contact history moves from element {} to {}",
                p,
                slot[k].element,
                element
            );
            slot[k].element = element;
            slot[k].claim();
            return Ok(k);
        }

        if slot.len() == self.slot_bound {
            self.slot_bound *= 2;
            log::debug!("Contact slot bound grown to {}", self.slot_bound);
        }
        slot.reserve(self.slot_bound - slot.len());
        slot.push(ContactRecord::new(element, self.history_values));
        Ok(slot.len() - 1)
    }

    /// Record that particle `p` no longer overlaps `element`
    ///
    /// The record stays until [`compact`](Self::compact) so that a coplanar
    /// element visited later in the same sweep can still take it over.
    pub fn handle_no_contact(&mut self, p: usize, element: ElementId) {
        if let Some(record) = self.slots[p]
            .iter_mut()
            .find(|r| r.element == element && !r.claimed)
        {
            record.pending_delete = true;
        }
    }

    /// Drop every record not claimed since [`begin_sweep`](Self::begin_sweep)
    pub fn compact(&mut self) {
        let mut removed = 0;
        for slot in &mut self.slots {
            let before = slot.len();
            slot.retain(|r| r.claimed);
            removed += before - slot.len();
        }
        if removed > 0 {
            log::trace!("Removed {} contact records", removed);
        }
    }

    /// Number of contacts over all processes
    pub fn n_contacts(&self, comm: &dyn Communicator) -> usize {
        self.n_contacts_where(comm, |_| true)
    }

    /// Number of contacts over all processes of particles selected by `include`
    pub fn n_contacts_where(
        &self,
        comm: &dyn Communicator,
        include: impl Fn(usize) -> bool,
    ) -> usize {
        let local: usize = self
            .slots
            .iter()
            .enumerate()
            .filter(|(p, _)| include(*p))
            .map(|(_, slot)| slot.len())
            .sum();
        comm.sum_i64(local as i64).max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;
    use std::collections::HashSet;

    /// Elements below 100 lie in one plane, everything else is tilted
    struct Planes;

    impl TopologyProvider for Planes {
        fn element_index(&self, id: ElementId) -> Result<usize> {
            Ok(id.0 as usize)
        }

        fn are_coplanar(&self, a: ElementId, b: ElementId) -> Result<bool> {
            Ok(a.0 < 100 && b.0 < 100)
        }

        fn share_plane(&self, a: ElementId, b: ElementId) -> Result<bool> {
            self.are_coplanar(a, b)
        }
    }

    fn sweep(ledger: &mut ContactLedger, p: usize, contacts: &[u64], misses: &[u64]) {
        ledger.begin_sweep();
        for id in misses {
            ledger.handle_no_contact(p, ElementId(*id));
        }
        for id in contacts {
            ledger.handle_contact(p, ElementId(*id), &Planes).unwrap()[0] += 1.0;
        }
        ledger.compact();
    }

    #[test]
    fn test_history_persists_across_sweeps() {
        let mut ledger = ContactLedger::new(1, 2);
        for _ in 0..10 {
            sweep(&mut ledger, 0, &[3], &[]);
        }
        assert_eq!(ledger.history(0, ElementId(3)).unwrap(), &[10.0, 0.0]);
    }

    #[test]
    fn test_lost_contact_is_removed() {
        let mut ledger = ContactLedger::new(1, 1);
        sweep(&mut ledger, 0, &[200], &[]);
        assert!(ledger.has_contact(0, ElementId(200)));

        sweep(&mut ledger, 0, &[], &[200]);
        assert_eq!(ledger.contact_count(0), 0);
        assert!(matches!(
            ledger.history(0, ElementId(200)),
            Err(WallMeshError::ContactSlotCorrupt { particle: 0, .. })
        ));
    }

    #[test]
    fn test_unvisited_record_is_removed() {
        let mut ledger = ContactLedger::new(1, 1);
        sweep(&mut ledger, 0, &[200], &[]);
        sweep(&mut ledger, 0, &[], &[]);
        assert_eq!(ledger.contact_count(0), 0);
    }

    #[test]
    fn test_history_transfers_to_coplanar_element() {
        let mut ledger = ContactLedger::new(1, 1);
        sweep(&mut ledger, 0, &[1], &[]);
        sweep(&mut ledger, 0, &[1], &[]);

        // slides from 1 onto 2, element 1 is visited first
        sweep(&mut ledger, 0, &[2], &[1]);

        assert_eq!(ledger.contact_count(0), 1);
        assert!(!ledger.has_contact(0, ElementId(1)));
        assert_eq!(ledger.history(0, ElementId(2)).unwrap(), &[3.0]);
    }

    #[test]
    fn test_no_transfer_across_planes() {
        let mut ledger = ContactLedger::new(1, 1);
        sweep(&mut ledger, 0, &[1], &[]);
        sweep(&mut ledger, 0, &[200], &[1]);

        assert_eq!(ledger.history(0, ElementId(200)).unwrap(), &[1.0]);
        assert!(!ledger.has_contact(0, ElementId(1)));
    }

    #[test]
    fn test_claimed_record_is_not_transferred() {
        let mut ledger = ContactLedger::new(1, 1);
        sweep(&mut ledger, 0, &[1], &[]);
        sweep(&mut ledger, 0, &[1, 2], &[]);

        assert_eq!(ledger.history(0, ElementId(1)).unwrap(), &[2.0]);
        assert_eq!(ledger.history(0, ElementId(2)).unwrap(), &[1.0]);
    }

    #[test]
    fn test_continuing_contact_keeps_history_in_batch() {
        let mut ledger = ContactLedger::new(1, 1);
        for _ in 0..3 {
            sweep(&mut ledger, 0, &[5], &[]);
        }

        // element 4 is new and listed first, element 5 still overlaps
        ledger.begin_sweep();
        ledger
            .handle_contacts(0, &[ElementId(4), ElementId(5)], &Planes)
            .unwrap();
        ledger.compact();

        assert_eq!(ledger.history(0, ElementId(5)).unwrap(), &[3.0]);
        assert_eq!(ledger.history(0, ElementId(4)).unwrap(), &[0.0]);
    }

    #[test]
    fn test_batch_transfers_from_left_element() {
        let mut ledger = ContactLedger::new(1, 1);
        sweep(&mut ledger, 0, &[5, 200], &[]);
        sweep(&mut ledger, 0, &[5, 200], &[]);

        ledger.begin_sweep();
        ledger
            .handle_contacts(0, &[ElementId(6), ElementId(200)], &Planes)
            .unwrap();
        ledger.compact();

        assert_eq!(ledger.contact_count(0), 2);
        assert!(!ledger.has_contact(0, ElementId(5)));
        assert_eq!(ledger.history(0, ElementId(6)).unwrap(), &[2.0]);
        assert_eq!(ledger.history(0, ElementId(200)).unwrap(), &[2.0]);
    }

    #[test]
    fn test_slot_bound_grows() {
        let mut ledger = ContactLedger::new(1, 1);
        let many: Vec<u64> = (200..210).collect();
        sweep(&mut ledger, 0, &many, &[]);

        assert_eq!(ledger.contact_count(0), 10);
        assert_eq!(ledger.slot_bound(), 16);

        let ids: HashSet<ElementId> = ledger.records(0).iter().map(|r| r.element).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn test_particle_bookkeeping_and_counts() {
        let mut ledger = ContactLedger::new(3, 1);
        ledger.begin_sweep();
        ledger.handle_contact(0, ElementId(200), &Planes).unwrap();
        ledger.handle_contact(2, ElementId(201), &Planes).unwrap();
        ledger.handle_contact(2, ElementId(202), &Planes).unwrap();
        ledger.compact();

        assert_eq!(ledger.n_contacts(&SerialComm), 3);
        assert_eq!(ledger.n_contacts_where(&SerialComm, |p| p == 2), 2);

        ledger.remove_particle(0);
        assert_eq!(ledger.n_particles(), 2);
        assert_eq!(ledger.contact_count(0), 2);

        ledger.resize_particles(4);
        assert_eq!(ledger.contact_count(3), 0);
        assert_eq!(ledger.n_contacts(&SerialComm), 2);
    }
}
