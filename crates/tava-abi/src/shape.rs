//! Signature shapes and their canonical string keys
//!
//! A shape is the ABI-level abstraction of one callable signature: the
//! return kind followed by the ordered argument kinds. Shapes are the
//! identity under which thunks are generated and registered — two methods
//! with the same shape always share one thunk.
//!
//! # Key encoding
//!
//! The canonical key reads left to right as return type, then each
//! argument type:
//!
//! ```text
//! v        void (return position only)
//! i1 i2 i4 i8   signed integers of 1/2/4/8 bytes
//! r4 r8         float / double
//! s<N>          byte-packed aggregate of N bytes       (e.g. s12)
//! S<N>          8-byte-aligned aggregate of N bytes    (e.g. S16)
//! ```
//!
//! `"i4i4i4"` is `int32 (int32, int32)`; `"vi8"` is `void (int64)`.

use std::fmt::Write as _;

use crate::error::AbiError;
use crate::kind::{RetKind, ValueKind};

/// Immutable descriptor for one callable signature shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureShape {
    ret: RetKind,
    args: Vec<ValueKind>,
}

impl SignatureShape {
    /// Create a shape from a return kind and argument kinds.
    pub fn new(ret: RetKind, args: Vec<ValueKind>) -> Self {
        Self { ret, args }
    }

    /// The return kind.
    pub fn ret(&self) -> RetKind {
        self.ret
    }

    /// The argument kinds, in call order.
    pub fn args(&self) -> &[ValueKind] {
        &self.args
    }

    /// Number of arguments.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Render the canonical string key for this shape.
    pub fn key(&self) -> String {
        let mut out = String::with_capacity(2 + self.args.len() * 2);
        match self.ret {
            RetKind::Void => out.push('v'),
            RetKind::Value(k) => push_kind(&mut out, k),
        }
        for &arg in &self.args {
            push_kind(&mut out, arg);
        }
        out
    }

    /// Decode a canonical shape key.
    ///
    /// The first token is the return type (`v` allowed), the rest are
    /// arguments (`v` rejected). Zero-sized aggregates and unknown tokens
    /// are rejected.
    pub fn parse(key: &str) -> Result<Self, AbiError> {
        let bytes = key.as_bytes();
        if bytes.is_empty() {
            return Err(AbiError::EmptyKey);
        }

        let mut pos = 0;
        let ret = if bytes[pos] == b'v' {
            pos += 1;
            RetKind::Void
        } else {
            RetKind::Value(parse_kind(bytes, &mut pos)?)
        };

        let mut args = Vec::new();
        while pos < bytes.len() {
            if bytes[pos] == b'v' {
                return Err(AbiError::VoidArgument);
            }
            args.push(parse_kind(bytes, &mut pos)?);
        }

        Ok(Self { ret, args })
    }
}

fn push_kind(out: &mut String, kind: ValueKind) {
    match kind {
        ValueKind::I8 => out.push_str("i1"),
        ValueKind::I16 => out.push_str("i2"),
        ValueKind::I32 => out.push_str("i4"),
        ValueKind::I64 => out.push_str("i8"),
        ValueKind::F32 => out.push_str("r4"),
        ValueKind::F64 => out.push_str("r8"),
        ValueKind::Blob { size } => {
            let _ = write!(out, "s{}", size);
        }
        ValueKind::AlignedBlob { size } => {
            let _ = write!(out, "S{}", size);
        }
    }
}

fn parse_kind(bytes: &[u8], pos: &mut usize) -> Result<ValueKind, AbiError> {
    let start = *pos;
    match bytes[start] {
        b'i' | b'r' => {
            let width = *bytes.get(start + 1).ok_or(AbiError::UnknownToken(start))?;
            *pos = start + 2;
            match (bytes[start], width) {
                (b'i', b'1') => Ok(ValueKind::I8),
                (b'i', b'2') => Ok(ValueKind::I16),
                (b'i', b'4') => Ok(ValueKind::I32),
                (b'i', b'8') => Ok(ValueKind::I64),
                (b'r', b'4') => Ok(ValueKind::F32),
                (b'r', b'8') => Ok(ValueKind::F64),
                _ => Err(AbiError::UnknownToken(start)),
            }
        }
        tag @ (b's' | b'S') => {
            let mut end = start + 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end == start + 1 {
                return Err(AbiError::BadAggregateSize(start));
            }
            let digits = std::str::from_utf8(&bytes[start + 1..end])
                .expect("digits are ASCII");
            let size: u32 = digits
                .parse()
                .map_err(|_| AbiError::BadAggregateSize(start))?;
            if size == 0 {
                return Err(AbiError::ZeroSizedAggregate(start));
            }
            *pos = end;
            if tag == b's' {
                Ok(ValueKind::Blob { size })
            } else {
                Ok(ValueKind::AlignedBlob { size })
            }
        }
        _ => Err(AbiError::UnknownToken(start)),
    }
}
