//! Message-passing runtime for the outer execution pool.
//!
//! A [`World`] runs a fixed number of ranks on their own threads. Ranks share
//! nothing mutable: they only exchange owned messages through per-rank
//! mailboxes, using the point-to-point and collective operations of
//! [`Communicator`].
//!
//! Collective operations (`split`, `broadcast`, `gather`, `barrier`) must be
//! called by every member of the communicator, in the same order. A live
//! member that skips one leaves its peers blocked; this is a precondition of
//! the API, not a recoverable error.
//!
//! A rank that exits, whether it returned, failed or panicked, tells every
//! peer. Receives that only an exited rank could still satisfy fail with
//! [`CommError::PeerExited`] or [`CommError::AllPeersExited`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use log::{debug, trace};
use thiserror::Error;

pub type Rank = usize;
pub type Tag = u64;

/// Largest tag available to [`Communicator::send`]; tags above it are used by collectives.
pub const MAX_USER_TAG: Tag = u64::MAX - 16;

const SPLIT_TAG: Tag = u64::MAX;
const BROADCAST_TAG: Tag = u64::MAX - 1;
const GATHER_TAG: Tag = u64::MAX - 2;
const BARRIER_ARRIVE_TAG: Tag = u64::MAX - 3;
const BARRIER_RELEASE_TAG: Tag = u64::MAX - 4;
const EXIT_TAG: Tag = u64::MAX - 5;

/// A value that travels inside the engine message type `M`.
///
/// Feature crates define their payload types and the conversions into and
/// out of the aggregate message enum; the engine only sees `M`.
pub trait Payload<M>: Into<M> + TryFrom<M> {}

impl<M, T> Payload<M> for T where T: Into<M> + TryFrom<M> {}

#[derive(Debug, Error)]
pub enum CommError {
    #[error("rank {rank} is outside a communicator of size {size}")]
    RankOutOfRange { rank: usize, size: usize },
    #[error("tag {tag} is reserved for collective operations")]
    ReservedTag { tag: Tag },
    #[error("rank {rank} has exited and can no longer receive")]
    Disconnected { rank: Rank },
    #[error("rank {rank} exited before sending the awaited message")]
    PeerExited { rank: Rank },
    #[error("every peer exited before sending the awaited message")]
    AllPeersExited,
    #[error("mailbox of rank {rank} is closed")]
    MailboxClosed { rank: Rank },
    #[error("unexpected payload with tag {tag} from rank {from_rank}")]
    UnexpectedPayload { tag: Tag, from_rank: usize },
    #[error("broadcast root {root} supplied no value")]
    MissingRootValue { root: usize },
}

impl CommError {
    /// Whether the failure only reflects a peer that is already gone.
    pub fn is_peer_gone(&self) -> bool {
        matches!(
            self,
            CommError::Disconnected { .. } | CommError::PeerExited { .. } | CommError::AllPeersExited
        )
    }
}

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("a world needs at least one rank")]
    Empty,
    #[error("failed to spawn rank {rank}")]
    Spawn {
        rank: Rank,
        #[source]
        source: std::io::Error,
    },
    #[error("rank {rank} panicked")]
    RankPanicked { rank: Rank },
}

/// Identifies a communicator; derived from the parent on every split so that
/// messages of different communicators never match each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ContextId(Arc<[u32]>);

impl ContextId {
    fn world() -> Self {
        Self(Arc::from(Vec::new()))
    }

    fn child(&self, split_sequence: u32, color: u32) -> Self {
        let mut path = self.0.to_vec();
        path.extend([split_sequence, color]);
        Self(path.into())
    }
}

enum Body<M> {
    User(M),
    Split { color: u32, key: usize },
    Signal,
    Exit,
}

struct Envelope<M> {
    context: ContextId,
    from: Rank,
    tag: Tag,
    body: Body<M>,
}

/// Per-rank mailbox plus the outboxes of every rank in the world.
pub struct Endpoint<M> {
    rank: Rank,
    peers: Arc<[Sender<Envelope<M>>]>,
    inbox: Receiver<Envelope<M>>,
    // Messages that arrived before anyone asked for them.
    stash: RefCell<VecDeque<Envelope<M>>>,
    exited: RefCell<Vec<bool>>,
}

impl<M> Endpoint<M> {
    fn new(rank: Rank, peers: Arc<[Sender<Envelope<M>>]>, inbox: Receiver<Envelope<M>>) -> Self {
        let exited = RefCell::new(vec![false; peers.len()]);
        Self {
            rank,
            peers,
            inbox,
            stash: RefCell::new(VecDeque::new()),
            exited,
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The communicator spanning every rank of the world.
    pub fn world(&self) -> Communicator<'_, M> {
        Communicator {
            endpoint: self,
            context: ContextId::world(),
            members: (0..self.peers.len()).collect(),
            local_rank: self.rank,
            split_sequence: Cell::new(0),
        }
    }

    fn post(&self, to: Rank, envelope: Envelope<M>) -> Result<(), CommError> {
        self.peers[to]
            .send(envelope)
            .map_err(|_| CommError::Disconnected { rank: to })
    }

    /// Blocks until a message for `context` with `tag` (and `from`, if given)
    /// is available. Non-matching arrivals are stashed in arrival order.
    ///
    /// `members` are the ranks that may send on `context`. The wait fails once
    /// the mailbox is drained and every possible sender has exited.
    fn take(
        &self,
        context: &ContextId,
        from: Option<Rank>,
        members: &[Rank],
        tag: Tag,
    ) -> Result<Envelope<M>, CommError> {
        let matches = |envelope: &Envelope<M>| {
            envelope.tag == tag
                && &envelope.context == context
                && from.is_none_or(|rank| envelope.from == rank)
        };

        let mut stash = self.stash.borrow_mut();
        if let Some(position) = stash.iter().position(&matches) {
            if let Some(envelope) = stash.remove(position) {
                return Ok(envelope);
            }
        }
        loop {
            let envelope = match self.inbox.try_recv() {
                Ok(envelope) => envelope,
                Err(TryRecvError::Empty) => {
                    self.check_senders(from, members)?;
                    self.inbox
                        .recv()
                        .map_err(|_| CommError::MailboxClosed { rank: self.rank })?
                }
                Err(TryRecvError::Disconnected) => {
                    return Err(CommError::MailboxClosed { rank: self.rank });
                }
            };
            if let Body::Exit = envelope.body {
                trace!("rank {} saw rank {} exit", self.rank, envelope.from);
                self.exited.borrow_mut()[envelope.from] = true;
                continue;
            }
            if matches(&envelope) {
                return Ok(envelope);
            }
            stash.push_back(envelope);
        }
    }

    // Channels are FIFO per sender, so anything an exited rank sent is
    // already queued ahead of its exit notice.
    fn check_senders(&self, from: Option<Rank>, members: &[Rank]) -> Result<(), CommError> {
        let exited = self.exited.borrow();
        match from {
            Some(rank) if exited[rank] => Err(CommError::PeerExited { rank }),
            Some(_) => Ok(()),
            None => {
                let mut others = members.iter().filter(|&&rank| rank != self.rank);
                if others.all(|&rank| exited[rank]) {
                    Err(CommError::AllPeersExited)
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl<M> Drop for Endpoint<M> {
    fn drop(&mut self) {
        let context = ContextId::world();
        for (rank, peer) in self.peers.iter().enumerate() {
            if rank == self.rank {
                continue;
            }
            // Peers that are gone already have nothing left to wait for.
            let _ = peer.send(Envelope {
                context: context.clone(),
                from: self.rank,
                tag: EXIT_TAG,
                body: Body::Exit,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Any,
    Rank(usize),
}

/// A group of ranks with its own message context. Ranks are local to the
/// communicator (`0..size`).
pub struct Communicator<'e, M> {
    endpoint: &'e Endpoint<M>,
    context: ContextId,
    members: Arc<[Rank]>,
    local_rank: usize,
    split_sequence: Cell<u32>,
}

impl<'e, M> Communicator<'e, M> {
    pub fn rank(&self) -> usize {
        self.local_rank
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn global_rank(&self) -> Rank {
        self.endpoint.rank
    }

    /// World ranks of the members, indexed by local rank.
    pub fn members(&self) -> &[Rank] {
        &self.members
    }

    pub fn send<T: Payload<M>>(&self, to: usize, tag: Tag, value: T) -> Result<(), CommError> {
        if tag > MAX_USER_TAG {
            return Err(CommError::ReservedTag { tag });
        }
        self.post(to, tag, Body::User(value.into()))
    }

    /// Receives the next message with `tag`, returning the sender's local rank.
    pub fn recv<T: Payload<M>>(&self, source: Source, tag: Tag) -> Result<(usize, T), CommError> {
        let from = match source {
            Source::Any => None,
            Source::Rank(rank) => Some(rank),
        };
        let (from, body) = self.take(from, tag)?;
        Ok((from, unpack(body, tag, from)?))
    }

    /// Every member receives the root's value.
    pub fn broadcast<T>(&self, root: usize, value: Option<T>) -> Result<T, CommError>
    where
        T: Payload<M> + Clone,
    {
        self.check_rank(root)?;
        if self.local_rank != root {
            let (from, body) = self.take(Some(root), BROADCAST_TAG)?;
            return unpack(body, BROADCAST_TAG, from);
        }
        let value = value.ok_or(CommError::MissingRootValue { root })?;
        for to in (0..self.size()).filter(|&to| to != root) {
            self.post(to, BROADCAST_TAG, Body::User(value.clone().into()))?;
        }
        Ok(value)
    }

    /// Moves every member's value to `root`, which gets them in local rank order.
    pub fn gather<T: Payload<M>>(&self, root: usize, value: T) -> Result<Option<Vec<T>>, CommError> {
        self.check_rank(root)?;
        if self.local_rank != root {
            self.post(root, GATHER_TAG, Body::User(value.into()))?;
            return Ok(None);
        }
        let mut own = Some(value);
        let mut contributions = Vec::with_capacity(self.size());
        for from in 0..self.size() {
            if from == root {
                contributions.extend(own.take());
                continue;
            }
            let (from, body) = self.take(Some(from), GATHER_TAG)?;
            contributions.push(unpack(body, GATHER_TAG, from)?);
        }
        Ok(Some(contributions))
    }

    /// Returns once every member has entered the barrier.
    pub fn barrier(&self) -> Result<(), CommError> {
        if self.local_rank != 0 {
            self.post(0, BARRIER_ARRIVE_TAG, Body::Signal)?;
            self.take(Some(0), BARRIER_RELEASE_TAG)?;
            return Ok(());
        }
        for from in 1..self.size() {
            self.take(Some(from), BARRIER_ARRIVE_TAG)?;
        }
        for to in 1..self.size() {
            self.post(to, BARRIER_RELEASE_TAG, Body::Signal)?;
        }
        Ok(())
    }

    /// Partitions the members by `color`; each new communicator orders its
    /// members by `(key, world rank)`.
    pub fn split(&self, color: u32, key: usize) -> Result<Communicator<'e, M>, CommError> {
        let sequence = self.split_sequence.get();
        self.split_sequence.set(sequence + 1);

        for to in (0..self.size()).filter(|&to| to != self.local_rank) {
            self.post(to, SPLIT_TAG, Body::Split { color, key })?;
        }
        let mut announced = Vec::with_capacity(self.size());
        for from in 0..self.size() {
            if from == self.local_rank {
                announced.push((color, key, self.global_rank()));
                continue;
            }
            match self.take(Some(from), SPLIT_TAG)? {
                (from, Body::Split { color, key }) => announced.push((color, key, self.members[from])),
                (from, _) => {
                    return Err(CommError::UnexpectedPayload {
                        tag: SPLIT_TAG,
                        from_rank: from,
                    });
                }
            }
        }

        let mut group: Vec<(usize, Rank)> = announced
            .into_iter()
            .filter(|&(member_color, _, _)| member_color == color)
            .map(|(_, key, rank)| (key, rank))
            .collect();
        group.sort_unstable();
        let members: Arc<[Rank]> = group.into_iter().map(|(_, rank)| rank).collect();
        let local_rank = members
            .iter()
            .position(|&rank| rank == self.global_rank())
            .ok_or(CommError::RankOutOfRange {
                rank: self.global_rank(),
                size: members.len(),
            })?;
        debug!(
            "rank {} split color={} -> local rank {} of {:?}",
            self.global_rank(),
            color,
            local_rank,
            members
        );

        Ok(Communicator {
            endpoint: self.endpoint,
            context: self.context.child(sequence, color),
            members,
            local_rank,
            split_sequence: Cell::new(0),
        })
    }

    fn check_rank(&self, rank: usize) -> Result<(), CommError> {
        if rank >= self.size() {
            return Err(CommError::RankOutOfRange {
                rank,
                size: self.size(),
            });
        }
        Ok(())
    }

    fn post(&self, to: usize, tag: Tag, body: Body<M>) -> Result<(), CommError> {
        self.check_rank(to)?;
        trace!("rank {} -> local {} tag {}", self.global_rank(), to, tag);
        self.endpoint.post(
            self.members[to],
            Envelope {
                context: self.context.clone(),
                from: self.global_rank(),
                tag,
                body,
            },
        )
    }

    fn take(&self, from: Option<usize>, tag: Tag) -> Result<(usize, Body<M>), CommError> {
        let from = match from {
            Some(local) => {
                self.check_rank(local)?;
                Some(self.members[local])
            }
            None => None,
        };
        let envelope = self.endpoint.take(&self.context, from, &self.members, tag)?;
        let local = self
            .members
            .iter()
            .position(|&rank| rank == envelope.from)
            .ok_or(CommError::RankOutOfRange {
                rank: envelope.from,
                size: self.size(),
            })?;
        Ok((local, envelope.body))
    }
}

fn unpack<M, T: Payload<M>>(body: Body<M>, tag: Tag, from: usize) -> Result<T, CommError> {
    match body {
        Body::User(message) => T::try_from(message).map_err(|_| CommError::UnexpectedPayload {
            tag,
            from_rank: from,
        }),
        Body::Split { .. } | Body::Signal | Body::Exit => Err(CommError::UnexpectedPayload {
            tag,
            from_rank: from,
        }),
    }
}

/// A fixed-size pool of isolated ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct World {
    size: usize,
}

impl World {
    pub fn new(size: usize) -> Result<Self, WorldError> {
        if size == 0 {
            return Err(WorldError::Empty);
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `body` once per rank, each on its own thread, and returns the
    /// results in rank order.
    pub fn launch<M, R, F>(&self, body: F) -> Result<Vec<R>, WorldError>
    where
        M: Send,
        R: Send,
        F: Fn(Communicator<'_, M>) -> R + Sync,
    {
        let (senders, inboxes): (Vec<_>, Vec<_>) = (0..self.size).map(|_| unbounded()).unzip();
        let peers: Arc<[Sender<Envelope<M>>]> = senders.into();
        let body = &body;

        thread::scope(|scope| -> Result<Vec<R>, WorldError> {
            let mut handles = Vec::with_capacity(self.size);
            for (rank, inbox) in inboxes.into_iter().enumerate() {
                let endpoint = Endpoint::new(rank, Arc::clone(&peers), inbox);
                let handle = thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(scope, move || body(endpoint.world()))
                    .map_err(|source| WorldError::Spawn { rank, source })?;
                handles.push(handle);
            }
            debug!("launched {} ranks", handles.len());

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .map_err(|_| WorldError::RankPanicked { rank })
                })
                .collect()
        })
    }
}
