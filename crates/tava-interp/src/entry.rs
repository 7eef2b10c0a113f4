//! Interpreter execution entry point — the C-ABI seam inbound thunks drive
//!
//! Defines the contract between the thunk layer and the bytecode execution
//! core. Inbound thunks call back into the interpreter through a single
//! function pointer of this signature; they never see frames, dispatch, or
//! exception state.

use tava_abi::StackSlot;

use crate::method::MethodInfo;

/// Number of slots in the return area handed to the execution entry point.
///
/// Two slots cover every packed return (scalars and aggregates up to the
/// pack threshold). For larger aggregate returns, slot 0 of the area holds
/// a pointer to a destination buffer owned by the calling thunk, and the
/// interpreted body writes the result through it.
pub const RET_SLOTS: usize = 2;

/// Execution entry point for interpreted method bodies.
///
/// Inbound thunks invoke this with the method descriptor, a packed argument
/// slot array (one slot per argument), and a pointer to a [`RET_SLOTS`]-slot
/// return area. The call is synchronous: the interpreter runs the body to
/// completion on the calling thread before this returns.
///
/// Argument slot protocol: scalars are widened into their slot; aggregates
/// of at most one slot are copied in by value; larger aggregates are
/// represented by the address of the native argument, which remains valid
/// for the duration of the call.
pub type InterpEntryFn =
    unsafe extern "C" fn(method: *const MethodInfo, args: *mut StackSlot, ret: *mut StackSlot);
