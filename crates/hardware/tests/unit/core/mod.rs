/// Replacement policy victim selection.
pub mod policies;
