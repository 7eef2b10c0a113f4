//! Marshaling fidelity: scalars and aggregates through both thunk directions
//!
//! Every supported scalar kind round-trips bit-exactly, and aggregates at
//! sizes on both sides of the pack threshold keep their exact byte content
//! whether they travel packed in slots or by reference.

use std::ffi::c_void;
use std::ptr::NonNull;

use tava_interp::{
    MethodInfo, SignatureShape, SlotFrame, StackSlot, ThunkTables, AGGREGATE_PACK_MAX, RET_SLOTS,
    SLOT_SIZE,
};

fn fn_ptr(f: usize) -> NonNull<c_void> {
    NonNull::new(f as *mut c_void).unwrap()
}

fn build_tables<S: AsRef<str>>(keys: &[S]) -> ThunkTables {
    let _ = env_logger::builder().is_test(true).try_init();
    ThunkTables::build_from_keys(keys, echo_exec).unwrap()
}

// ============================================================================
// Echo executor: copies argument 0 to the return value, reading the shape
// from the descriptor it was handed
// ============================================================================

unsafe extern "C" fn echo_exec(
    method: *const MethodInfo,
    args: *mut StackSlot,
    ret: *mut StackSlot,
) {
    let shape = SignatureShape::parse((*method).shape_key()).unwrap();
    let Some(ret_kind) = shape.ret().kind() else {
        return;
    };
    let arg0 = shape.args()[0];

    let src: *const u8 = if arg0.is_scalar() || arg0.size() <= SLOT_SIZE {
        args as *const u8
    } else {
        (*args).read_ptr() as *const u8
    };
    let dst: *mut u8 = if ret_kind.is_by_ref() {
        (*ret).read_ptr() as *mut u8
    } else {
        ret as *mut u8
    };
    std::ptr::copy_nonoverlapping(src, dst, ret_kind.size());
}

// ============================================================================
// Scalar fidelity
// ============================================================================

unsafe extern "C" fn echo_i8(v: i8, _m: *const MethodInfo) -> i8 {
    v
}
unsafe extern "C" fn echo_i16(v: i16, _m: *const MethodInfo) -> i16 {
    v
}
unsafe extern "C" fn echo_i32(v: i32, _m: *const MethodInfo) -> i32 {
    v
}
unsafe extern "C" fn echo_i64(v: i64, _m: *const MethodInfo) -> i64 {
    v
}
unsafe extern "C" fn echo_f32(v: f32, _m: *const MethodInfo) -> f32 {
    v
}
unsafe extern "C" fn echo_f64(v: f64, _m: *const MethodInfo) -> f64 {
    v
}

const SCALAR_KEYS: [&str; 6] = ["i1i1", "i2i2", "i4i4", "i8i8", "r4r4", "r8r8"];

fn scalar_tables() -> ThunkTables {
    build_tables(&SCALAR_KEYS)
}

/// Drive one scalar value through the outbound thunk and read it back.
macro_rules! native_echo {
    ($tables:expr, $key:literal, $double:expr, $write:ident, $read:ident, $v:expr) => {{
        let method = MethodInfo::with_native_entry($key, 0, fn_ptr($double as usize));
        let thunk = $tables.native_call($key).unwrap();
        let mut frame = SlotFrame::new();
        let base = frame.alloc(1).unwrap();
        frame.get_mut(base).unwrap().$write($v);
        let mut ret = [StackSlot::zeroed(); RET_SLOTS];
        let locals = frame.base_ptr(base);
        unsafe { thunk.call(&method, &[0], locals, ret.as_mut_ptr()) };
        ret[0].$read()
    }};
}

#[test]
fn test_scalar_fidelity_outbound() {
    let tables = scalar_tables();

    for v in [0i8, -1, i8::MIN, i8::MAX, 42] {
        assert_eq!(native_echo!(tables, "i1i1", echo_i8, write_i8, read_i8, v), v);
    }
    for v in [0i16, -1, i16::MIN, i16::MAX, -1234] {
        assert_eq!(
            native_echo!(tables, "i2i2", echo_i16, write_i16, read_i16, v),
            v
        );
    }
    for v in [0i32, -1, i32::MIN, i32::MAX, 0x5ee1_f00d] {
        assert_eq!(
            native_echo!(tables, "i4i4", echo_i32, write_i32, read_i32, v),
            v
        );
    }
    for v in [0i64, -1, i64::MIN, i64::MAX, 0x0102_0304_0506_0708] {
        assert_eq!(
            native_echo!(tables, "i8i8", echo_i64, write_i64, read_i64, v),
            v
        );
    }
    for v in [0.0f32, -1.5, f32::MIN, f32::MAX, f32::INFINITY] {
        let got = native_echo!(tables, "r4r4", echo_f32, write_f32, read_f32, v);
        assert_eq!(got.to_bits(), v.to_bits());
    }
    for v in [0.0f64, -1.5, f64::MIN, f64::MAX, f64::NEG_INFINITY] {
        let got = native_echo!(tables, "r8r8", echo_f64, write_f64, read_f64, v);
        assert_eq!(got.to_bits(), v.to_bits());
    }
}

/// Drive one scalar value through the inbound entry point and back.
macro_rules! interp_echo {
    ($tables:expr, $key:literal, $ty:ty, $v:expr) => {{
        let method = MethodInfo::new($key, 0);
        let thunk = $tables.interp_call($key).unwrap();
        let f: unsafe extern "C" fn($ty, *const MethodInfo) -> $ty =
            unsafe { std::mem::transmute(thunk.entry_point().as_ptr()) };
        unsafe { f($v, &method) }
    }};
}

#[test]
fn test_scalar_fidelity_inbound() {
    let tables = scalar_tables();

    for v in [0i8, -1, i8::MIN, i8::MAX, 42] {
        assert_eq!(interp_echo!(tables, "i1i1", i8, v), v);
    }
    for v in [0i16, -1, i16::MIN, i16::MAX, -1234] {
        assert_eq!(interp_echo!(tables, "i2i2", i16, v), v);
    }
    for v in [0i32, -1, i32::MIN, i32::MAX, 0x5ee1_f00d] {
        assert_eq!(interp_echo!(tables, "i4i4", i32, v), v);
    }
    for v in [0i64, -1, i64::MIN, i64::MAX, 0x0102_0304_0506_0708] {
        assert_eq!(interp_echo!(tables, "i8i8", i64, v), v);
    }
    for v in [0.0f32, -1.5, f32::MIN, f32::MAX, f32::INFINITY] {
        assert_eq!(interp_echo!(tables, "r4r4", f32, v).to_bits(), v.to_bits());
    }
    for v in [0.0f64, -1.5, f64::MIN, f64::MAX, f64::NEG_INFINITY] {
        assert_eq!(interp_echo!(tables, "r8r8", f64, v).to_bits(), v.to_bits());
    }
}

// ============================================================================
// Aggregate pack-vs-reference behavior
// ============================================================================

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Debug)]
struct Blob<const N: usize> {
    bytes: [u8; N],
}

unsafe extern "C" fn echo_blob<const N: usize>(v: Blob<N>, _m: *const MethodInfo) -> Blob<N> {
    v
}

const BLOB_SIZES: [usize; 12] = [1, 4, 8, 9, 12, 16, 17, 24, 32, 64, 65, 108];

fn blob_tables() -> ThunkTables {
    let keys: Vec<String> = BLOB_SIZES.iter().map(|n| format!("s{}s{}", n, n)).collect();
    build_tables(&keys)
}

fn blob_pattern<const N: usize>(seed: u8) -> [u8; N] {
    std::array::from_fn(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
}

fn roundtrip_native_blob<const N: usize>(tables: &ThunkTables) {
    let key = format!("s{}s{}", N, N);
    let method =
        MethodInfo::with_native_entry(key.as_str(), N as u32, fn_ptr(echo_blob::<N> as usize));
    let thunk = tables.native_call(&key).unwrap();

    let src = blob_pattern::<N>(7);
    let mut frame = SlotFrame::new();
    let base = frame.alloc(4).unwrap();
    let mut ret = [StackSlot::zeroed(); RET_SLOTS];
    let mut dst = vec![0u8; N];

    unsafe {
        let locals = frame.base_ptr(base);
        if N <= AGGREGATE_PACK_MAX {
            // Packed: bytes live in consecutive slots of the frame
            std::ptr::copy_nonoverlapping(src.as_ptr(), locals as *mut u8, N);
        } else {
            // By reference: the slot holds the address of the bytes, and
            // the return slot holds the destination buffer address
            (*locals).write_ptr(src.as_ptr() as *mut c_void);
            ret[0].write_ptr(dst.as_mut_ptr() as *mut c_void);
        }

        thunk.call(&method, &[0], locals, ret.as_mut_ptr());

        if N <= AGGREGATE_PACK_MAX {
            let got = std::slice::from_raw_parts(ret.as_ptr() as *const u8, N);
            assert_eq!(got, &src[..], "outbound packed blob of {} bytes", N);
        } else {
            assert_eq!(&dst[..], &src[..], "outbound by-ref blob of {} bytes", N);
        }
    }
}

fn roundtrip_interp_blob<const N: usize>(tables: &ThunkTables) {
    let key = format!("s{}s{}", N, N);
    let method = MethodInfo::new(key.as_str(), N as u32);
    let thunk = tables.interp_call(&key).unwrap();
    let f: unsafe extern "C" fn(Blob<N>, *const MethodInfo) -> Blob<N> =
        unsafe { std::mem::transmute(thunk.entry_point().as_ptr()) };

    let src = Blob {
        bytes: blob_pattern::<N>(13),
    };
    let got = unsafe { f(src, &method) };
    assert_eq!(got.bytes, src.bytes, "inbound blob of {} bytes", N);
}

#[test]
fn test_aggregate_roundtrip_outbound() {
    let tables = blob_tables();
    roundtrip_native_blob::<1>(&tables);
    roundtrip_native_blob::<4>(&tables);
    roundtrip_native_blob::<8>(&tables);
    roundtrip_native_blob::<9>(&tables);
    roundtrip_native_blob::<12>(&tables);
    roundtrip_native_blob::<16>(&tables);
    roundtrip_native_blob::<17>(&tables);
    roundtrip_native_blob::<24>(&tables);
    roundtrip_native_blob::<32>(&tables);
    roundtrip_native_blob::<64>(&tables);
    roundtrip_native_blob::<65>(&tables);
    roundtrip_native_blob::<108>(&tables);
}

#[test]
fn test_aggregate_roundtrip_inbound() {
    let tables = blob_tables();
    roundtrip_interp_blob::<1>(&tables);
    roundtrip_interp_blob::<4>(&tables);
    roundtrip_interp_blob::<8>(&tables);
    roundtrip_interp_blob::<9>(&tables);
    roundtrip_interp_blob::<12>(&tables);
    roundtrip_interp_blob::<16>(&tables);
    roundtrip_interp_blob::<17>(&tables);
    roundtrip_interp_blob::<24>(&tables);
    roundtrip_interp_blob::<32>(&tables);
    roundtrip_interp_blob::<64>(&tables);
    roundtrip_interp_blob::<65>(&tables);
    roundtrip_interp_blob::<108>(&tables);
}

// ============================================================================
// 8-byte-aligned aggregates (word-multiple sizes, passed as u64 words)
// ============================================================================

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Debug)]
struct Words<const W: usize> {
    words: [u64; W],
}

unsafe extern "C" fn echo_words<const W: usize>(v: Words<W>, _m: *const MethodInfo) -> Words<W> {
    v
}

fn roundtrip_aligned<const W: usize>(tables: &ThunkTables) {
    let size = W * 8;
    let key = format!("S{}S{}", size, size);
    let method =
        MethodInfo::with_native_entry(key.as_str(), size as u32, fn_ptr(echo_words::<W> as usize));
    let thunk = tables.native_call(&key).unwrap();

    let src = Words {
        words: std::array::from_fn(|i| (i as u64).wrapping_mul(0x0101_0101_0101_0101) ^ 0xF0F0),
    };
    let mut frame = SlotFrame::new();
    let base = frame.alloc(2).unwrap();
    let mut ret = [StackSlot::zeroed(); RET_SLOTS];
    let mut dst = Words { words: [0u64; W] };

    unsafe {
        let locals = frame.base_ptr(base);
        if size <= AGGREGATE_PACK_MAX {
            std::ptr::copy_nonoverlapping(src.words.as_ptr() as *const u8, locals as *mut u8, size);
        } else {
            (*locals).write_ptr(src.words.as_ptr() as *mut c_void);
            ret[0].write_ptr(dst.words.as_mut_ptr() as *mut c_void);
        }

        thunk.call(&method, &[0], locals, ret.as_mut_ptr());

        if size <= AGGREGATE_PACK_MAX {
            let got = std::slice::from_raw_parts(ret.as_ptr() as *const u8, size);
            assert_eq!(got, std::slice::from_raw_parts(src.words.as_ptr() as *const u8, size));
        } else {
            assert_eq!(dst, src);
        }
    }
}

#[test]
fn test_aligned_aggregate_roundtrip() {
    let keys: Vec<String> = [8usize, 16, 24, 64]
        .iter()
        .map(|n| format!("S{}S{}", n, n))
        .collect();
    let tables = build_tables(&keys);
    roundtrip_aligned::<1>(&tables);
    roundtrip_aligned::<2>(&tables);
    roundtrip_aligned::<3>(&tables);
    roundtrip_aligned::<8>(&tables);
}
