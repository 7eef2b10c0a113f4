//! Outbound thunks: interpreter frame → native C call

use std::ffi::c_void;

use libffi::middle::{Arg, Cif, CodePtr};
use libffi::raw;

use tava_abi::{RetKind, SignatureShape, StackSlot, ValueKind};

use crate::marshal::cif::shape_cif;
use crate::method::MethodInfo;

/// Prepared outbound thunk for one signature shape.
///
/// Reads arguments out of frame slots, performs the real C call through the
/// shape's call interface with the method descriptor appended as the
/// trailing parameter, and stores the result into the return slot. One
/// thunk serves every method classified into its shape.
pub struct NativeCallThunk {
    shape: SignatureShape,
    cif: Cif,
}

// Immutable after `prepare`; the call interface is only read during calls,
// which may happen concurrently from any number of threads.
unsafe impl Send for NativeCallThunk {}
unsafe impl Sync for NativeCallThunk {}

impl std::fmt::Debug for NativeCallThunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCallThunk")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Per-call argument storage. Addresses of these temporaries are what the
/// call interface receives, so the vector is fully populated before any
/// pointer is taken.
enum ArgTemp {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Pointer passed by value (the trailing method descriptor)
    Ptr(*mut c_void),
    /// Aggregate passed by value; the bytes live at this address
    Agg(*mut c_void),
}

impl NativeCallThunk {
    pub(crate) fn prepare(shape: SignatureShape) -> Self {
        let cif = shape_cif(&shape);
        Self { shape, cif }
    }

    /// The shape this thunk was prepared for.
    pub fn shape(&self) -> &SignatureShape {
        &self.shape
    }

    /// Perform the native call for `method`.
    ///
    /// `arg_slots[i]` is the slot index of argument `i` relative to
    /// `locals`; `ret` is the destination slot area (ignored for void
    /// returns; for aggregate returns past the pack threshold it must
    /// already hold a pointer to a destination buffer of the return size).
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `method` resolves to a native entry
    /// point whose true prototype matches this thunk's shape (plus the
    /// trailing descriptor parameter), that every `arg_slots` index lies
    /// within the live frame at `locals` with the argument stored under the
    /// outbound slot protocol, and that `ret` points to writable slot
    /// storage. Arity or prototype disagreement corrupts the native stack;
    /// it is not detectable here.
    pub unsafe fn call(
        &self,
        method: &MethodInfo,
        arg_slots: &[u32],
        locals: *mut StackSlot,
        ret: *mut StackSlot,
    ) {
        debug_assert_eq!(arg_slots.len(), self.shape.arity());

        let entry = method
            .native_entry()
            .expect("native-call thunk invoked on method without resolved entry point");
        let code = CodePtr(entry.as_ptr());

        let mut storage: Vec<ArgTemp> = Vec::with_capacity(self.shape.arity() + 1);
        for (i, &kind) in self.shape.args().iter().enumerate() {
            let slot = locals.add(arg_slots[i] as usize);
            storage.push(match kind {
                ValueKind::I8 => ArgTemp::I8((*slot).read_i8()),
                ValueKind::I16 => ArgTemp::I16((*slot).read_i16()),
                ValueKind::I32 => ArgTemp::I32((*slot).read_i32()),
                ValueKind::I64 => ArgTemp::I64((*slot).read_i64()),
                ValueKind::F32 => ArgTemp::F32((*slot).read_f32()),
                ValueKind::F64 => ArgTemp::F64((*slot).read_f64()),
                agg @ (ValueKind::Blob { .. } | ValueKind::AlignedBlob { .. }) => {
                    if agg.is_by_ref() {
                        ArgTemp::Agg((*slot).read_ptr())
                    } else {
                        ArgTemp::Agg(slot as *mut c_void)
                    }
                }
            });
        }
        storage.push(ArgTemp::Ptr(method as *const MethodInfo as *mut c_void));

        // Argument views for the call interface. `raw_args` mirrors
        // `ffi_args` for the raw-call path used by aggregate returns.
        let mut ffi_args: Vec<Arg> = Vec::with_capacity(storage.len());
        let mut raw_args: Vec<*mut c_void> = Vec::with_capacity(storage.len());
        for temp in &storage {
            let (arg, addr) = match temp {
                ArgTemp::I8(v) => (Arg::new(v), v as *const i8 as *mut c_void),
                ArgTemp::I16(v) => (Arg::new(v), v as *const i16 as *mut c_void),
                ArgTemp::I32(v) => (Arg::new(v), v as *const i32 as *mut c_void),
                ArgTemp::I64(v) => (Arg::new(v), v as *const i64 as *mut c_void),
                ArgTemp::F32(v) => (Arg::new(v), v as *const f32 as *mut c_void),
                ArgTemp::F64(v) => (Arg::new(v), v as *const f64 as *mut c_void),
                ArgTemp::Ptr(p) => (Arg::new(p), p as *const *mut c_void as *mut c_void),
                ArgTemp::Agg(p) => (Arg::new(&*(*p as *const u8)), *p),
            };
            ffi_args.push(arg);
            raw_args.push(addr);
        }

        match self.shape.ret() {
            RetKind::Void => {
                self.cif.call::<()>(code, &ffi_args);
            }
            RetKind::Value(kind) => match kind {
                ValueKind::I8 => {
                    let v: i8 = self.cif.call(code, &ffi_args);
                    (*ret).write_i8(v);
                }
                ValueKind::I16 => {
                    let v: i16 = self.cif.call(code, &ffi_args);
                    (*ret).write_i16(v);
                }
                ValueKind::I32 => {
                    let v: i32 = self.cif.call(code, &ffi_args);
                    (*ret).write_i32(v);
                }
                ValueKind::I64 => {
                    let v: i64 = self.cif.call(code, &ffi_args);
                    (*ret).write_i64(v);
                }
                ValueKind::F32 => {
                    let v: f32 = self.cif.call(code, &ffi_args);
                    (*ret).write_f32(v);
                }
                ValueKind::F64 => {
                    let v: f64 = self.cif.call(code, &ffi_args);
                    (*ret).write_f64(v);
                }
                agg @ (ValueKind::Blob { .. } | ValueKind::AlignedBlob { .. }) => {
                    // Packed results land in the return slots; larger ones
                    // go through the destination pointer stored there.
                    let dest: *mut c_void = if agg.is_by_ref() {
                        (*ret).read_ptr()
                    } else {
                        ret as *mut c_void
                    };
                    raw::ffi_call(
                        self.cif.as_raw_ptr(),
                        Some(*code.as_safe_fun()),
                        dest,
                        raw_args.as_mut_ptr(),
                    );
                }
            },
        }
    }
}
