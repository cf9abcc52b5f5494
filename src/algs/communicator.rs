//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable**; collectives are built on top of
//! point-to-point messages unless a backend provides native ones.
//!
//! Every worker of a group must call each collective in the same order.
//! The control loop relies on this lockstep: a reduction followed by a
//! barrier is the only way workers agree on a decision before diverging.

use crate::loop_error::LoopError;
use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tag reserved for gather-to-root reductions.
pub const TAG_REDUCE: u16 = 0xF001;
/// Tag reserved for root-to-all broadcasts.
pub const TAG_BCAST: u16 = 0xF002;

/// Communication interface shared by all backends.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this worker within the group.
    fn rank(&self) -> usize;
    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// True only for the serial no-op backend.
    fn is_no_comm(&self) -> bool {
        false
    }

    /// Broadcast `buf` from `root` to every worker, in place.
    fn broadcast(&self, root: usize, buf: &mut [u8]) -> Result<(), LoopError> {
        if self.size() == 1 {
            return Ok(());
        }
        if self.rank() == root {
            for peer in (0..self.size()).filter(|&p| p != root) {
                let _ = self.isend(peer, TAG_BCAST, buf).wait();
            }
        } else {
            let len = buf.len();
            let got = self
                .irecv(root, TAG_BCAST, buf)
                .wait()
                .ok_or_else(|| LoopError::Communication("broadcast: nothing received".into()))?;
            if got.len() != len {
                return Err(LoopError::Communication(format!(
                    "broadcast: expected {len} bytes, got {}",
                    got.len()
                )));
            }
            buf.copy_from_slice(&got);
        }
        Ok(())
    }

    /// Global minimum of one `f64` per worker.
    fn allreduce_min_f64(&self, local: f64) -> Result<f64, LoopError> {
        let root = 0;
        let mut global = local;
        if self.size() > 1 {
            if self.rank() == root {
                for peer in 1..self.size() {
                    let mut buf = [0u8; 8];
                    let got = self
                        .irecv(peer, TAG_REDUCE, &mut buf)
                        .wait()
                        .ok_or_else(|| LoopError::Communication(format!("min: no value from {peer}")))?;
                    global = global.min(decode_f64(&got)?);
                }
            } else {
                let _ = self.isend(root, TAG_REDUCE, &local.to_le_bytes()).wait();
            }
        }
        let mut out = global.to_le_bytes();
        self.broadcast(root, &mut out)?;
        Ok(f64::from_le_bytes(out))
    }

    /// Element-wise global sum, in place.
    fn allreduce_sum_u64(&self, vals: &mut [u64]) -> Result<(), LoopError> {
        let root = 0;
        if self.size() > 1 {
            if self.rank() == root {
                for peer in 1..self.size() {
                    let mut buf = vec![0u8; vals.len() * 8];
                    let got = self
                        .irecv(peer, TAG_REDUCE, &mut buf)
                        .wait()
                        .ok_or_else(|| LoopError::Communication(format!("sum: no value from {peer}")))?;
                    if got.len() != buf.len() {
                        return Err(LoopError::Communication(format!(
                            "sum: expected {} bytes from {peer}, got {}",
                            buf.len(),
                            got.len()
                        )));
                    }
                    // received buffers carry no alignment guarantee
                    let theirs = got.chunks_exact(8).map(bytemuck::pod_read_unaligned::<u64>);
                    for (v, t) in vals.iter_mut().zip(theirs) {
                        *v += t;
                    }
                }
            } else {
                let _ = self.isend(root, TAG_REDUCE, bytemuck::cast_slice(vals)).wait();
            }
        }
        let mut out: Vec<u8> = bytemuck::cast_slice(vals).to_vec();
        self.broadcast(root, &mut out)?;
        for (v, chunk) in vals.iter_mut().zip(out.chunks_exact(8)) {
            *v = bytemuck::pod_read_unaligned(chunk);
        }
        Ok(())
    }

    /// Block until every worker has reached this point.
    fn barrier(&self) -> Result<(), LoopError> {
        let mut token = [0u64];
        self.allreduce_sum_u64(&mut token)
    }

    /// Terminate every worker of the group.
    fn abort(&self, _code: i32) -> ! {
        std::process::abort()
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

fn decode_f64(bytes: &[u8]) -> Result<f64, LoopError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LoopError::Communication(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(f64::from_le_bytes(raw))
}

/// Compile-time no-op comm for a single serial worker.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- ThreadComm: one worker per thread inside a single process ---
type Key = (u64, usize, usize, u16); // (group, src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, VecDeque<Bytes>>> = Lazy::new(DashMap::new);
static NEXT_GROUP: AtomicU64 = AtomicU64::new(1);

/// Receive handle polling the shared mailbox on `wait`.
pub struct MailboxHandle {
    key: Key,
    len: usize,
}

impl Wait for MailboxHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            let popped = MAILBOX
                .get_mut(&self.key)
                .and_then(|mut queue| queue.pop_front());
            if let Some(bytes) = popped {
                let n = self.len.min(bytes.len());
                return Some(bytes[..n].to_vec());
            }
            std::thread::yield_now();
        }
    }
}

/// In-process worker group; messages are FIFO per `(src, dst, tag)`.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    group: u64,
    rank: usize,
    size: usize,
}

impl ThreadComm {
    /// Create the `size` endpoints of a fresh group, indexed by rank.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let group = NEXT_GROUP.fetch_add(1, Ordering::Relaxed);
        (0..size)
            .map(|rank| ThreadComm { group, rank, size })
            .collect()
    }

    /// Run `f` once per rank on its own thread and collect results by rank.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ThreadComm) -> R + Sync,
    {
        let comms = Self::group(size);
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    scope.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = MailboxHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.group, self.rank, peer, tag);
        MAILBOX
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        MailboxHandle {
            key: (self.group, peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::sync::Arc;

    /// World communicator; MPI is finalized when the last clone drops.
    #[derive(Clone)]
    pub struct MpiComm {
        universe: Arc<Universe>,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, LoopError> {
            let universe = mpi::initialize()
                .ok_or_else(|| LoopError::Communication("MPI already initialized".into()))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                universe: Arc::new(universe),
                rank,
                size,
            })
        }

        fn world(&self) -> SimpleCommunicator {
            self.universe.world()
        }
    }

    pub struct MpiRecvHandle {
        universe: Arc<Universe>,
        peer: i32,
        tag: i32,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let world = self.universe.world();
            let (mut data, _status) = world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            data.truncate(self.len);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world()
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                universe: self.universe.clone(),
                peer: peer as i32,
                tag: tag as i32,
                len: buf.len(),
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn broadcast(&self, root: usize, buf: &mut [u8]) -> Result<(), LoopError> {
            self.world().process_at_rank(root as i32).broadcast_into(buf);
            Ok(())
        }

        fn allreduce_min_f64(&self, local: f64) -> Result<f64, LoopError> {
            let mut global = local;
            self.world()
                .all_reduce_into(&local, &mut global, SystemOperation::min());
            Ok(global)
        }

        fn allreduce_sum_u64(&self, vals: &mut [u64]) -> Result<(), LoopError> {
            let local = vals.to_vec();
            self.world()
                .all_reduce_into(&local[..], vals, SystemOperation::sum());
            Ok(())
        }

        fn barrier(&self) -> Result<(), LoopError> {
            self.world().barrier();
            Ok(())
        }

        fn abort(&self, code: i32) -> ! {
            self.world().abort(code)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_roundtrip_two_ranks() {
        let comms = ThreadComm::group(2);
        let mut recv_buf = [0u8; 4];
        let recv_handle = comms[1].irecv(0, 7, &mut recv_buf);
        comms[0].isend(1, 7, &[1, 2, 3, 4]).wait();
        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn groups_do_not_share_mailboxes() {
        let a = ThreadComm::group(2);
        let b = ThreadComm::group(2);
        a[0].isend(1, 3, &[1]);
        b[0].isend(1, 3, &[2]);
        let mut buf = [0u8; 1];
        assert_eq!(b[1].irecv(0, 3, &mut buf).wait(), Some(vec![2]));
        assert_eq!(a[1].irecv(0, 3, &mut buf).wait(), Some(vec![1]));
    }

    #[test]
    fn no_comm_collectives_are_identity() {
        let comm = NoComm;
        assert_eq!(comm.allreduce_min_f64(0.25).unwrap(), 0.25);
        let mut v = [3u64, 4];
        comm.allreduce_sum_u64(&mut v).unwrap();
        assert_eq!(v, [3, 4]);
        comm.barrier().unwrap();
    }

    #[test]
    fn thread_group_min_and_sum() {
        let results = ThreadComm::run(4, |comm| {
            let min = comm.allreduce_min_f64(1.0 + comm.rank() as f64).unwrap();
            let mut counts = [comm.rank() as u64, 1];
            comm.allreduce_sum_u64(&mut counts).unwrap();
            comm.barrier().unwrap();
            (min, counts)
        });
        for (min, counts) in results {
            assert_eq!(min, 1.0);
            assert_eq!(counts, [6, 4]);
        }
    }

    #[test]
    fn sum_of_wide_counters_reaches_every_worker() {
        let results = ThreadComm::run(3, |comm| {
            let r = comm.rank() as u64;
            let mut counts = [r, 10 * r, u32::MAX as u64 + r, 1, 0];
            comm.allreduce_sum_u64(&mut counts).unwrap();
            counts
        });
        let expected = [3, 30, 3 * (u32::MAX as u64) + 3, 3, 0];
        assert!(results.iter().all(|c| c == &expected));
    }

    #[test]
    fn broadcast_from_nonzero_root() {
        let results = ThreadComm::run(3, |comm| {
            let mut buf = if comm.rank() == 2 { [9u8, 8] } else { [0u8, 0] };
            comm.broadcast(2, &mut buf).unwrap();
            buf
        });
        assert!(results.iter().all(|b| b == &[9, 8]));
    }
}
