//! Opaque handle namespace.
//!
//! Guests name kernel objects through small integer handles. This module provides the
//! [`HandleTable`] that maps allocated ids to [`KernelObject`]s, and the decoding layer
//! ([`HandleSentinels`], [`HandleValue`]) that separates real entries from the conventional
//! pseudo-handle values a guest may pass instead.
//!
//! Handles are never closed by this subsystem; a handle may outlive the logical validity of
//! its target (for example a thread that has terminated) and still resolves to the same
//! object.

mod table;
mod value;

pub use table::{Handle, HandleTable};
pub use value::{HandleId, HandleSentinels, HandleValue, KernelObject, ProcessId, PseudoHandle};
