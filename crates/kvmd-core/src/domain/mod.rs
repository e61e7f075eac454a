//! Pure domain helpers with no I/O.

pub mod mouse;
