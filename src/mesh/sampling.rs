//! Area-weighted random points and Monte-Carlo subdomain area

use crate::error::{Result, WallMeshError};
use crate::mesh::geometry::triangle_area;
use crate::mesh::surface::SurfaceMesh;
use crate::mesh::types::{Point, Subdomain};
use crate::parallel::Communicator;
use crate::random::UniformSource;

/// Uniform point in the triangle `a b c` by rejection of barycentric pairs
fn random_point_in_triangle(
    a: &Point,
    b: &Point,
    c: &Point,
    rng: &mut dyn UniformSource,
) -> Point {
    loop {
        let u = rng.uniform();
        let v = rng.uniform();
        if u + v <= 1.0 {
            return a + (b - a) * u + (c - a) * v;
        }
    }
}

impl<const N: usize> SurfaceMesh<N> {
    /// Uniform random point on element `i`
    ///
    /// Elements with more than three nodes are fanned into triangles from
    /// node 0, one of which is picked by area.
    pub fn random_point_in_element(&self, i: usize, rng: &mut dyn UniformSource) -> Point {
        let nodes = self.nodes(i);
        if N == 3 {
            return random_point_in_triangle(&nodes[0], &nodes[1], &nodes[2], rng);
        }

        let fan: Vec<f64> = (1..N - 1)
            .map(|k| triangle_area(&nodes[0], &nodes[k], &nodes[k + 1]))
            .collect();
        let total: f64 = fan.iter().sum();
        let mut r = rng.uniform() * total;
        let mut k = fan.len();
        for (t, a) in fan.iter().enumerate() {
            if r < *a {
                k = t + 1;
                break;
            }
            r -= a;
        }
        let k = k.min(N - 2);
        random_point_in_triangle(&nodes[0], &nodes[k], &nodes[k + 1], rng)
    }

    /// Area-weighted random point on the owned and ghost surface
    ///
    /// Returns the element index and the point, or `None` for a mesh without
    /// local area. Fails when elements were added or deleted since the last
    /// refresh.
    pub fn random_point_owned_ghost(
        &self,
        rng: &mut dyn UniformSource,
    ) -> Result<Option<(usize, Point)>> {
        let acc = self.area_acc();
        if acc.len() != self.len() {
            return Err(WallMeshError::InvalidMeshTopology(
                "area prefix is stale, refresh the mesh after adding or deleting elements"
                    .to_string(),
            ));
        }

        let total = match acc.last() {
            Some(total) if *total > 0.0 => *total,
            _ => return Ok(None),
        };

        let r = rng.uniform() * total;
        let i = acc.partition_point(|a| *a <= r).min(acc.len() - 1);
        Ok(Some((i, self.random_point_in_element(i, rng))))
    }

    /// Random surface point inside `subdomain`, giving up after `max_tries` draws
    pub fn random_point_in_subdomain(
        &self,
        rng: &mut dyn UniformSource,
        subdomain: &dyn Subdomain,
        max_tries: usize,
    ) -> Result<Option<(usize, Point)>> {
        for _ in 0..max_tries {
            match self.random_point_owned_ghost(rng)? {
                Some((i, p)) if subdomain.contains(&p) => return Ok(Some((i, p))),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Estimate the part of the surface inside `subdomain`
    ///
    /// Samples are accumulated over rounds until the sum of the estimates of
    /// all processes matches the global area within the configured relative
    /// tolerance. The accepted estimate is rescaled so that the sum is exact.
    /// Collective: every process runs the same number of rounds.
    pub(super) fn estimate_subdomain_area(
        &self,
        comm: &dyn Communicator,
        subdomain: &dyn Subdomain,
        rng: &mut dyn UniformSource,
    ) -> Result<f64> {
        let global = self.areas.global;
        let local_area = self.areas.owned + self.areas.ghost;
        let samples = self.config().mc_samples_per_round;
        let rounds = self.config().mc_max_rounds;
        let tolerance = self.config().mc_relative_tolerance;

        rng.reset(self.config().random_seed.wrapping_add(comm.rank() as u64));

        let mut n_inside = 0usize;
        let mut n_total = 0usize;
        let mut sum = 0.0;

        for round in 1..=rounds {
            if local_area > 0.0 {
                for _ in 0..samples {
                    if let Some((_, p)) = self.random_point_owned_ghost(rng)? {
                        n_total += 1;
                        if subdomain.contains(&p) {
                            n_inside += 1;
                        }
                    }
                }
            }

            let estimate = if n_total > 0 {
                local_area * n_inside as f64 / n_total as f64
            } else {
                0.0
            };
            sum = comm.sum_f64(estimate);

            log::debug!(
                "Area estimate round {}: local {:.6e}, sum {:.6e}, global {:.6e}",
                round,
                estimate,
                sum,
                global
            );

            if sum > 0.0 && (sum - global).abs() <= tolerance * global {
                return Ok(estimate * global / sum);
            }
        }

        Err(WallMeshError::AreaEstimateDiverged {
            rounds,
            estimate: sum,
            global,
        })
    }
}
