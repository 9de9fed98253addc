//! Collective communication contract
//!
//! The mesh never talks to a transport directly. It consumes the reductions and
//! gathers below, and every process must issue them in the same order or the
//! run deadlocks. [`SerialComm`] covers the single-process case and
//! [`ThreadComm`] runs several ranks inside one process, one thread each.

use std::any::Any;
use std::ops::Add;
use std::sync::{Arc, Barrier, Mutex};

/// Reduction operator for all-reduce calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

/// Collective operations consumed from the host's message-passing layer
pub trait Communicator {
    /// Rank of this process
    fn rank(&self) -> usize;

    /// Number of processes in the group
    fn size(&self) -> usize;

    /// Element-wise all-reduce over floating-point values, in place
    fn all_reduce_f64(&self, values: &mut [f64], op: ReduceOp);

    /// Element-wise all-reduce over integer values, in place
    fn all_reduce_i64(&self, values: &mut [i64], op: ReduceOp);

    /// Gather variable-length vectors from every rank, indexed by rank
    fn all_gather_f64(&self, local: &[f64]) -> Vec<Vec<f64>>;

    fn sum_f64(&self, value: f64) -> f64 {
        let mut buf = [value];
        self.all_reduce_f64(&mut buf, ReduceOp::Sum);
        buf[0]
    }

    fn min_f64(&self, value: f64) -> f64 {
        let mut buf = [value];
        self.all_reduce_f64(&mut buf, ReduceOp::Min);
        buf[0]
    }

    fn max_f64(&self, value: f64) -> f64 {
        let mut buf = [value];
        self.all_reduce_f64(&mut buf, ReduceOp::Max);
        buf[0]
    }

    fn sum_i64(&self, value: i64) -> i64 {
        let mut buf = [value];
        self.all_reduce_i64(&mut buf, ReduceOp::Sum);
        buf[0]
    }

    fn max_i64(&self, value: i64) -> i64 {
        let mut buf = [value];
        self.all_reduce_i64(&mut buf, ReduceOp::Max);
        buf[0]
    }
}

/// Single-process communicator: every reduction is the identity
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_f64(&self, _values: &mut [f64], _op: ReduceOp) {}

    fn all_reduce_i64(&self, _values: &mut [i64], _op: ReduceOp) {}

    fn all_gather_f64(&self, local: &[f64]) -> Vec<Vec<f64>> {
        vec![local.to_vec()]
    }
}

struct Shared {
    slots: Mutex<Vec<Option<Box<dyn Any + Send>>>>,
    barrier: Barrier,
}

/// In-process rank of a thread group
///
/// Each handle must live on its own thread. Collectives block on a barrier
/// until all ranks of the group have entered the same call.
pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Create the handles of a group with `size` ranks
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            slots: Mutex::new((0..size).map(|_| None).collect()),
            barrier: Barrier::new(size),
        });

        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn exchange<T: Clone + Send + 'static>(&self, local: Vec<T>) -> Vec<Vec<T>> {
        {
            let mut slots = self
                .shared
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slots[self.rank] = Some(Box::new(local));
        }

        self.shared.barrier.wait();

        let gathered = {
            let slots = self
                .shared
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slots
                .iter()
                .map(|slot| {
                    slot.as_ref()
                        .and_then(|boxed| boxed.downcast_ref::<Vec<T>>())
                        .cloned()
                        .unwrap_or_default()
                })
                .collect()
        };

        // nobody may overwrite a slot before every rank has read it
        self.shared.barrier.wait();

        gathered
    }
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

fn reduce_into<T>(values: &mut [T], gathered: &[Vec<T>], op: ReduceOp)
where
    T: Copy + PartialOrd + Add<Output = T>,
{
    for (k, value) in values.iter_mut().enumerate() {
        let mut column = gathered.iter().filter_map(|row| row.get(k).copied());
        if let Some(first) = column.next() {
            *value = column.fold(first, |acc, x| match op {
                ReduceOp::Sum => acc + x,
                ReduceOp::Min => {
                    if x < acc {
                        x
                    } else {
                        acc
                    }
                }
                ReduceOp::Max => {
                    if x > acc {
                        x
                    } else {
                        acc
                    }
                }
            });
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_f64(&self, values: &mut [f64], op: ReduceOp) {
        let gathered = self.exchange(values.to_vec());
        reduce_into(values, &gathered, op);
    }

    fn all_reduce_i64(&self, values: &mut [i64], op: ReduceOp) {
        let gathered = self.exchange(values.to_vec());
        reduce_into(values, &gathered, op);
    }

    fn all_gather_f64(&self, local: &[f64]) -> Vec<Vec<f64>> {
        self.exchange(local.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_serial_comm_is_identity() {
        let comm = SerialComm;
        assert_eq!(comm.sum_f64(2.5), 2.5);
        assert_eq!(comm.max_i64(-3), -3);
        assert_eq!(comm.all_gather_f64(&[1.0, 2.0]), vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn test_thread_comm_reductions() {
        let handles: Vec<_> = ThreadComm::group(3)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let r = comm.rank() as f64;
                    let sum = comm.sum_f64(r + 1.0);
                    let max = comm.max_i64(comm.rank() as i64 * 10);
                    let min = comm.min_f64(r - 5.0);
                    let mut vec = [r, 2.0 * r];
                    comm.all_reduce_f64(&mut vec, ReduceOp::Sum);
                    let gathered = comm.all_gather_f64(&vec![r; comm.rank() + 1]);
                    (sum, max, min, vec, gathered)
                })
            })
            .collect();

        for handle in handles {
            let (sum, max, min, vec, gathered) = handle.join().unwrap();
            assert_eq!(sum, 6.0);
            assert_eq!(max, 20);
            assert_eq!(min, -5.0);
            assert_eq!(vec, [3.0, 6.0]);
            assert_eq!(gathered.len(), 3);
            assert_eq!(gathered[2], vec![2.0, 2.0, 2.0]);
        }
    }
}
