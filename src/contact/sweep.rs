//! Per-step particle-wall contact search

use crate::contact::candidates::ElementIndex;
use crate::contact::history::ContactLedger;
use crate::contact::resolver::ContactResolver;
use crate::contact::types::WallContact;
use crate::error::{Result, WallMeshError};
use crate::mesh::surface::TriMesh;
use crate::mesh::types::Point;

/// Contacts of all local particles with one wall mesh
///
/// Each [`run`](Self::run) resolves every candidate element of a particle
/// before the history ledger sees any of its overlaps.
pub struct ContactSweep {
    ledger: ContactLedger,
    contacts: Vec<Vec<WallContact>>,
    skin: f64,
}

impl ContactSweep {
    pub fn new(n_particles: usize, history_values: usize, skin: f64) -> Self {
        Self {
            ledger: ContactLedger::new(n_particles, history_values),
            contacts: vec![Vec::new(); n_particles],
            skin,
        }
    }

    pub fn skin(&self) -> f64 {
        self.skin
    }

    pub fn ledger(&self) -> &ContactLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut ContactLedger {
        &mut self.ledger
    }

    /// Overlapping contacts of particle `p` found by the last run
    pub fn contacts_of(&self, p: usize) -> &[WallContact] {
        &self.contacts[p]
    }

    /// Search contacts of the spheres `positions` / `radii` with `mesh`
    ///
    /// Returns the number of local overlaps.
    pub fn run(
        &mut self,
        mesh: &TriMesh,
        index: &ElementIndex,
        positions: &[Point],
        radii: &[f64],
    ) -> Result<usize> {
        if positions.len() != radii.len() {
            return Err(WallMeshError::PropertyError(format!(
                "{} particle positions but {} radii",
                positions.len(),
                radii.len()
            )));
        }

        let n = positions.len();
        self.ledger.resize_particles(n);
        self.contacts.resize_with(n, Vec::new);
        self.ledger.begin_sweep();

        let mut n_overlaps = 0;
        let mut overlapping = Vec::new();
        let mut missed = Vec::new();
        for (p, (center, &radius)) in positions.iter().zip(radii).enumerate() {
            self.contacts[p].clear();
            overlapping.clear();
            missed.clear();

            for i in index.candidates(center, radius, self.skin) {
                let id = mesh.id(i);
                if !mesh.prefilter(i, radius, center, self.skin) {
                    missed.push(id);
                    continue;
                }

                match mesh.resolve(id, radius, center)? {
                    Some(contact) if contact.is_overlapping() => {
                        overlapping.push(id);
                        self.contacts[p].push(WallContact {
                            element: id,
                            gap: contact.gap,
                            contact_point: contact.contact_point,
                            delta: contact.delta,
                            feature: contact.feature,
                        });
                    }
                    _ => missed.push(id),
                }
            }

            self.ledger.handle_contacts(p, &overlapping, mesh)?;
            for &id in &missed {
                self.ledger.handle_no_contact(p, id);
            }
            n_overlaps += overlapping.len();
        }

        self.ledger.compact();

        log::debug!("Contact sweep: {} overlaps for {} particles", n_overlaps, n);
        Ok(n_overlaps)
    }
}
