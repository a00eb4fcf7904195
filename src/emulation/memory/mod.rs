//! Guest memory helpers.
//!
//! Raw guest memory belongs to the host engine; this module only provides the encoding layer
//! used to lay out guest-visible structures before they are written through
//! [`HostEngine::write_guest_memory`](crate::emulation::HostEngine::write_guest_memory).

mod io;

pub use io::{pad_to, read_le_at, read_ptr_at, write_le_at, write_ptr_at, GuestIO};
