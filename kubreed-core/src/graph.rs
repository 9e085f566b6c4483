//! Randomized construction of the traffic graph.
//!
//! Every workload picks `branching` distinct downstream workloads, never
//! itself. The random source is passed in explicitly, so a seeded
//! [`SmallRng`](rand::rngs::SmallRng) yields the same graph every time.

use std::collections::BTreeSet;

use rand::Rng;
use thiserror::Error;

use crate::topology::WorkloadEdge;
use crate::workload_name;

/// Errors raised while building the traffic graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// There are not enough workloads to pick `branching` distinct peers.
    #[error("{workloads} workloads cannot satisfy a branching factor of {branching}")]
    InsufficientNodes {
        /// Number of workloads in the namespace.
        workloads: usize,
        /// Requested number of downstream peers per workload.
        branching: usize,
    },
}

/// Checks that `branching` distinct non-self peers can be drawn from `workloads` ids.
///
/// The bound is strict: a graph where every workload targets all of its peers is rejected.
pub fn ensure_feasible(workloads: usize, branching: usize) -> Result<(), GraphError> {
    if branching + 1 >= workloads {
        return Err(GraphError::InsufficientNodes {
            workloads,
            branching,
        });
    }
    Ok(())
}

/// Samples `branching` distinct ids in `[0, workloads)`, excluding `exclude`.
///
/// The ids are returned in the order they were drawn.
pub fn generate<R>(
    workloads: usize,
    branching: usize,
    exclude: usize,
    rng: &mut R,
) -> Result<Vec<usize>, GraphError>
where
    R: Rng + ?Sized,
{
    ensure_feasible(workloads, branching)?;

    let mut seen = BTreeSet::new();
    let mut picked = Vec::with_capacity(branching);
    while picked.len() < branching {
        let candidate = rng.random_range(0..workloads);
        if candidate != exclude && seen.insert(candidate) {
            picked.push(candidate);
        }
    }

    Ok(picked)
}

/// Builds the edges of every workload `0..workloads` from scratch.
pub fn generate_topology<R>(
    workloads: usize,
    branching: usize,
    rng: &mut R,
) -> Result<Vec<WorkloadEdge>, GraphError>
where
    R: Rng + ?Sized,
{
    (0..workloads)
        .map(|source| {
            let destination = generate(workloads, branching, source, &mut *rng)?
                .into_iter()
                .map(workload_name)
                .collect();
            Ok(WorkloadEdge {
                source: workload_name(source),
                destination,
            })
        })
        .collect()
}
