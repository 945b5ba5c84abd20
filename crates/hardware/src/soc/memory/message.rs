//! Messages exchanged between memory modules.

use crate::common::addr::Cycle;
use crate::common::constants::{CONTROL_MESSAGE_BYTES, data_message_bytes};
use crate::common::data::ModuleId;

use super::frame::FrameId;
use super::protocol::ReqOp;

/// Direction of a request relative to main memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From an upper level toward main memory; waits for busy frames.
    UpDown,
    /// From a lower level toward the requesters; nacks on busy frames.
    DownUp,
}

/// Answer to a request or eviction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// False for a nack; the requester must fail and retry.
    pub ok: bool,
    /// Whether the receiver held the block.
    pub present: bool,
    /// Block data, when the reply carries it.
    pub data: Option<Vec<u64>>,
    /// Whether `data` is newer than the level below.
    pub dirty: bool,
    /// Whether exclusive rights were granted.
    pub exclusive: bool,
}

impl Reply {
    /// Negative acknowledgement.
    pub const fn nack() -> Self {
        Self {
            ok: false,
            present: false,
            data: None,
            dirty: false,
            exclusive: false,
        }
    }

    /// Positive acknowledgement without data.
    pub const fn ack(present: bool) -> Self {
        Self {
            ok: true,
            present,
            data: None,
            dirty: false,
            exclusive: false,
        }
    }
}

/// Payload of a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Coherence request for a block.
    Request {
        /// Read or write.
        op: ReqOp,
        /// Up-down or down-up.
        dir: Direction,
        /// Block-aligned address.
        block: u64,
        /// Transaction waiting for the reply.
        parent: FrameId,
        /// The requester already holds valid data (upgrade).
        has_valid: bool,
    },
    /// Eviction (or flush) of a block by an upper level.
    Evict {
        /// Block-aligned address.
        block: u64,
        /// Transaction waiting for the acknowledgement.
        parent: FrameId,
        /// Written-back data, if the copy was dirty.
        data: Option<Vec<u64>>,
        /// The dirty data was produced without ownership.
        non_coherent: bool,
        /// The sender keeps a clean copy.
        keep: bool,
        /// The sender keeps exclusive rights (flush from M).
        retain_owner: bool,
    },
    /// Answer to a request or eviction.
    Reply {
        /// Transaction the reply is for.
        frame: FrameId,
        /// Contents.
        reply: Reply,
    },
}

impl Message {
    /// Size of the message on the wire.
    pub fn size(&self, block_size: u64) -> u64 {
        let carries_data = match self {
            Self::Request { .. } => false,
            Self::Evict { data, .. } => data.is_some(),
            Self::Reply { reply, .. } => reply.data.is_some(),
        };
        if carries_data {
            data_message_bytes(block_size)
        } else {
            CONTROL_MESSAGE_BYTES
        }
    }
}

/// A message in flight between two modules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Sending module.
    pub src: ModuleId,
    /// Receiving module.
    pub dst: ModuleId,
    /// Size in bytes.
    pub size: u64,
    /// Cycle the packet was sent.
    pub sent: Cycle,
    /// Payload.
    pub msg: Message,
}
