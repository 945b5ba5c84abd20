//! System-wide constants.

/// Width of one data word held in a cache block, in bytes.
pub const WORD_BYTES: u64 = 8;

/// Size of a coherence message header (request, acknowledgement, nack), in bytes.
pub const CONTROL_MESSAGE_BYTES: u64 = 8;

/// Smallest block size a module may be configured with.
pub const MIN_BLOCK_BYTES: u64 = WORD_BYTES;

/// Returns the size in bytes of a message that carries one block of data.
#[inline]
pub const fn data_message_bytes(block_size: u64) -> u64 {
    CONTROL_MESSAGE_BYTES + block_size
}
