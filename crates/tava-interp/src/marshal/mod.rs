//! The marshaling engine — generic thunks driven by signature shapes
//!
//! One callable signature shape yields one prepared thunk per direction,
//! constructed at table-build time from the shape descriptor alone. There
//! is no per-signature code: the call interface is assembled dynamically
//! (libffi) and the argument/return recipe is interpreted from the shape's
//! kind list on each call.
//!
//! # Slot protocols
//!
//! *Outbound* ([`NativeCallThunk`]) reads arguments from the frame's locals
//! using the layout the interpreter stores them in:
//!
//! - scalars: widened into one slot;
//! - aggregates up to the pack threshold: raw bytes in `ceil(size/8)`
//!   consecutive slots starting at the argument's slot index;
//! - larger aggregates: the slot holds a pointer to the bytes.
//!
//! *Inbound* ([`InterpretedCallThunk`]) builds a transient argument array
//! with exactly one slot per argument:
//!
//! - scalars: widened into the slot;
//! - aggregates of at most one slot: copied in by value;
//! - larger aggregates: the slot holds the address of the native argument,
//!   which stays resident in the caller's frame for the whole call.
//!
//! Return values round-trip through a two-slot return area; aggregate
//! results past the pack threshold go through a pointer pre-stored in
//! slot 0 of that area (the side that owns the destination buffer plants
//! the pointer before the call).
//!
//! Every native prototype carries the method descriptor as a trailing
//! pointer parameter, invisible to the shape key.

mod cif;
mod interp_call;
mod native_call;

pub use interp_call::InterpretedCallThunk;
pub use native_call::NativeCallThunk;
