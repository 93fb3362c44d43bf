//! Pure scheduling math: interval relations and recurrence expansion.
//!
//! Nothing in this module touches the store.

pub mod interval;
pub mod recurrence;
