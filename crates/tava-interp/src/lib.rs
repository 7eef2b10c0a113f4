//! Tava interop engine
//!
//! This crate is the bridge between the interpreter's calling convention
//! (fixed-width stack slots addressed through a frame base) and the native
//! C calling convention, in both directions:
//!
//! - **Outbound** ([`NativeCallThunk`]): the interpreter calls a method
//!   whose body is native. Arguments are read out of frame slots by index,
//!   the real C call is made through a call interface prepared from the
//!   method's signature shape, and the result lands back in the return slot.
//! - **Inbound** ([`InterpretedCallThunk`]): native code holds what it
//!   believes is a plain C function pointer (a vtable entry, a callback).
//!   The pointer actually targets a runtime-created entry point that packs
//!   the native arguments into a slot array and drives the interpreter's
//!   execution entry point. An *adjustor* variant additionally offsets the
//!   receiver pointer past the boxed-object header for value-type instance
//!   methods.
//!
//! Thunks are prepared once per signature shape and registered in
//! [`ThunkTables`], built at load time from the set of shapes the program
//! requires and immutable afterwards. Method binding resolves a shape key
//! to its thunks exactly once; the per-call path never searches.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod entry;
pub mod frame;
pub mod loader;
pub mod marshal;
pub mod method;
pub mod object;
pub mod registry;

// Re-export ABI types (canonical definitions live in tava-abi)
pub use tava_abi::{
    AbiError, RetKind, SignatureShape, StackSlot, ValueKind, AGGREGATE_PACK_MAX, SLOT_SIZE,
};

pub use entry::{InterpEntryFn, RET_SLOTS};
pub use frame::SlotFrame;
pub use loader::{Library, LoadError};
pub use marshal::{InterpretedCallThunk, NativeCallThunk};
pub use method::MethodInfo;
pub use object::{BoxHeader, BOX_HEADER_SIZE};
pub use registry::{global, install, BoundMethod, ThunkTables};

/// Interop layer errors
#[derive(Debug, thiserror::Error)]
pub enum InteropError {
    /// A shape key has no entry in the queried thunk table.
    ///
    /// This is a hard configuration error: the shape set the tables were
    /// built from did not cover a shape the program needs. Binding must
    /// fail fast here — dispatching through a wrong-shape thunk corrupts
    /// the native stack.
    #[error("no thunk registered for signature shape '{0}'")]
    UnknownShape(String),

    /// A frame allocation exceeded the slot storage capacity
    #[error("frame overflow: requested {requested} slots, capacity {capacity}")]
    FrameOverflow {
        /// Slots requested by the failed allocation
        requested: usize,
        /// Total slot capacity of the frame storage
        capacity: usize,
    },

    /// The process-wide thunk tables were installed twice
    #[error("thunk tables already installed")]
    AlreadyInstalled,

    /// A shape key failed to decode
    #[error(transparent)]
    Shape(#[from] AbiError),
}
