//! Shape → libffi call-interface lowering

use libffi::middle::{Cif, Type};

use tava_abi::{RetKind, SignatureShape, ValueKind};

/// Lower one value kind to its libffi type.
///
/// Aggregates become structure types so libffi applies the platform's real
/// aggregate-passing classification: a byte-packed blob is a structure of
/// `u8` elements, an 8-byte-aligned blob a structure of `u64` words (plus a
/// byte tail when the size is not word-multiple), which keeps the forced
/// alignment visible to the ABI classifier.
pub(crate) fn value_type(kind: ValueKind) -> Type {
    match kind {
        ValueKind::I8 => Type::i8(),
        ValueKind::I16 => Type::i16(),
        ValueKind::I32 => Type::i32(),
        ValueKind::I64 => Type::i64(),
        ValueKind::F32 => Type::f32(),
        ValueKind::F64 => Type::f64(),
        ValueKind::Blob { size } => Type::structure((0..size).map(|_| Type::u8())),
        ValueKind::AlignedBlob { size } => {
            let words = size as usize / 8;
            let tail = size as usize % 8;
            let fields: Vec<Type> = (0..words)
                .map(|_| Type::u64())
                .chain((0..tail).map(|_| Type::u8()))
                .collect();
            Type::structure(fields)
        }
    }
}

fn ret_type(ret: RetKind) -> Type {
    match ret {
        RetKind::Void => Type::void(),
        RetKind::Value(kind) => value_type(kind),
    }
}

/// Build the call interface for a shape's full native prototype: the
/// shape's arguments followed by the trailing method-descriptor pointer.
pub(crate) fn shape_cif(shape: &SignatureShape) -> Cif {
    let args: Vec<Type> = shape
        .args()
        .iter()
        .map(|&kind| value_type(kind))
        .chain(std::iter::once(Type::pointer()))
        .collect();
    Cif::new(args, ret_type(shape.ret()))
}
