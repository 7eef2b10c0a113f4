//! Inbound thunks: native C call → interpreter execution entry
//!
//! Each prepared thunk owns a runtime-created closure whose code pointer is
//! a real C entry point with the shape's exact native prototype (plus the
//! trailing method-descriptor parameter). Native code stores that pointer
//! in vtable slots or passes it as a callback; invoking it marshals the
//! native arguments into a slot array and drives the interpreter.

use std::ffi::c_void;
use std::ptr::NonNull;

use libffi::low::ffi_cif;
use libffi::middle::Closure;

use tava_abi::{RetKind, SignatureShape, StackSlot, ValueKind, SLOT_SIZE};

use crate::entry::{InterpEntryFn, RET_SLOTS};
use crate::marshal::cif::shape_cif;
use crate::method::MethodInfo;
use crate::object::BOX_HEADER_SIZE;

/// Prepared inbound thunk for one signature shape.
///
/// The adjustor variant serves value-type instance methods invoked through
/// a boxed-object pointer: the receiver is advanced past the box header
/// before the interpreter sees it. Plain and adjustor thunks for the same
/// shape are distinct entry points into the same execution path.
pub struct InterpretedCallThunk {
    // Declaration order is the drop order: the closure references `data`
    // and must go first.
    closure: Closure<'static>,
    data: Box<ThunkData>,
}

struct ThunkData {
    shape: SignatureShape,
    entry: InterpEntryFn,
    /// Byte offset added to the incoming receiver pointer (0 = plain thunk)
    this_adjust: usize,
}

// The closure's code and userdata are immutable after `prepare`; calls are
// plain synchronous C calls on the caller's thread.
unsafe impl Send for InterpretedCallThunk {}
unsafe impl Sync for InterpretedCallThunk {}

impl InterpretedCallThunk {
    pub(crate) fn prepare(shape: SignatureShape, entry: InterpEntryFn, adjustor: bool) -> Self {
        let cif = shape_cif(&shape);
        let data = Box::new(ThunkData {
            shape,
            entry,
            this_adjust: if adjustor { BOX_HEADER_SIZE } else { 0 },
        });
        // The box gives the payload a stable heap address; the closure
        // holds it for exactly as long as `data` lives in this struct.
        let data_ref: &'static ThunkData = unsafe { &*(data.as_ref() as *const ThunkData) };
        let closure = Closure::new(cif, dispatch, data_ref);
        Self { closure, data }
    }

    /// The shape this thunk was prepared for.
    pub fn shape(&self) -> &SignatureShape {
        &self.data.shape
    }

    /// Whether this is the adjustor variant.
    pub fn is_adjustor(&self) -> bool {
        self.data.this_adjust != 0
    }

    /// The native entry point of this thunk.
    ///
    /// Callable with the C calling convention as
    /// `ReturnType(Arg0, .., ArgN, *const MethodInfo)`; the pointer stays
    /// valid for as long as the thunk (in practice: the owning table) is
    /// alive.
    pub fn entry_point(&self) -> NonNull<c_void> {
        let f: unsafe extern "C" fn() = *self.closure.code_ptr();
        // Closure code pointers are never null
        unsafe { NonNull::new_unchecked(f as usize as *mut c_void) }
    }
}

/// Closure body shared by every inbound thunk.
///
/// `args[i]` points at the i-th native argument value; `args[arity]` at the
/// trailing descriptor pointer, forwarded to the execution entry untouched.
unsafe extern "C" fn dispatch(
    _cif: &ffi_cif,
    result: &mut c_void,
    args: *const *const c_void,
    data: &ThunkData,
) {
    let arity = data.shape.arity();

    let mut arg_slots = vec![StackSlot::zeroed(); arity.max(1)];
    for (i, &kind) in data.shape.args().iter().enumerate() {
        let p = *args.add(i);
        let slot = &mut arg_slots[i];
        match kind {
            ValueKind::I8 => slot.write_i8(*(p as *const i8)),
            ValueKind::I16 => slot.write_i16(*(p as *const i16)),
            ValueKind::I32 => slot.write_i32(*(p as *const i32)),
            ValueKind::I64 => slot.write_i64(*(p as *const i64)),
            ValueKind::F32 => slot.write_f32(*(p as *const f32)),
            ValueKind::F64 => slot.write_f64(*(p as *const f64)),
            agg @ (ValueKind::Blob { .. } | ValueKind::AlignedBlob { .. }) => {
                let size = agg.size();
                if size <= SLOT_SIZE {
                    std::ptr::copy_nonoverlapping(
                        p as *const u8,
                        slot as *mut StackSlot as *mut u8,
                        size,
                    );
                } else {
                    // The native argument stays resident in the caller's
                    // frame for the whole call; pass its address through.
                    slot.write_ptr(p as *mut c_void);
                }
            }
        }
        if i == 0 && data.this_adjust != 0 {
            let receiver = slot.read_i64() as u64;
            slot.write_i64(receiver.wrapping_add(data.this_adjust as u64) as i64);
        }
    }

    let method = *(*args.add(arity) as *const *const MethodInfo);

    let mut ret_area = [StackSlot::zeroed(); RET_SLOTS];
    let mut ret_buf: Vec<u8> = Vec::new();
    if let RetKind::Value(kind) = data.shape.ret() {
        if kind.is_by_ref() {
            ret_buf = vec![0u8; kind.size()];
            ret_area[0].write_ptr(ret_buf.as_mut_ptr() as *mut c_void);
        }
    }

    (data.entry)(method, arg_slots.as_mut_ptr(), ret_area.as_mut_ptr());

    match data.shape.ret() {
        RetKind::Void => {}
        RetKind::Value(kind) => {
            let out = result as *mut c_void as *mut u64;
            match kind {
                // Integral results narrower than a machine word are
                // widened to the full word, as the closure return
                // convention requires.
                ValueKind::I8 => *out = ret_area[0].read_i8() as i64 as u64,
                ValueKind::I16 => *out = ret_area[0].read_i16() as i64 as u64,
                ValueKind::I32 => *out = ret_area[0].read_i32() as i64 as u64,
                ValueKind::I64 => *out = ret_area[0].read_i64() as u64,
                ValueKind::F32 => *(out as *mut f32) = ret_area[0].read_f32(),
                ValueKind::F64 => *(out as *mut f64) = ret_area[0].read_f64(),
                agg @ (ValueKind::Blob { .. } | ValueKind::AlignedBlob { .. }) => {
                    let size = agg.size();
                    let src: *const u8 = if agg.is_by_ref() {
                        ret_buf.as_ptr()
                    } else {
                        ret_area.as_ptr() as *const u8
                    };
                    std::ptr::copy_nonoverlapping(src, out as *mut u8, size);
                }
            }
        }
    }
}
