//! Thunk tables — the signature-shape registry
//!
//! Three tables map a canonical shape key to its prepared thunk: outbound
//! (native-call), inbound (interpreted-call), and the inbound adjustor
//! variant. Tables are built once at load time from the set of shapes the
//! program requires, kept sorted by key, and are immutable afterwards —
//! concurrent lookups need no locking.
//!
//! Binding resolves all families for a method's key in one pass and hands
//! back direct references, so the lookup cost is paid once per method, not
//! once per call. A key with no entry is a hard configuration error: the
//! shape set the tables were built from must cover everything the program
//! dispatches, and substituting a wrong-arity thunk would corrupt the
//! native stack.

use std::ffi::c_void;
use std::ptr::NonNull;

use once_cell::sync::OnceCell;
use rustc_hash::FxHashSet;

use tava_abi::{SignatureShape, ValueKind};

use crate::entry::InterpEntryFn;
use crate::marshal::{InterpretedCallThunk, NativeCallThunk};
use crate::method::MethodInfo;
use crate::InteropError;

/// The three shape-keyed thunk tables.
pub struct ThunkTables {
    native: Vec<(Box<str>, NativeCallThunk)>,
    interp: Vec<(Box<str>, InterpretedCallThunk)>,
    adjustor: Vec<(Box<str>, InterpretedCallThunk)>,
}

impl ThunkTables {
    /// Build tables covering `shapes`, with inbound thunks driving `entry`.
    ///
    /// Duplicate shapes collapse to a single thunk. The adjustor family is
    /// built only for shapes whose first argument is pointer-width (a
    /// value-type receiver always arrives as a pointer).
    pub fn build(shapes: &[SignatureShape], entry: InterpEntryFn) -> Self {
        let mut seen: FxHashSet<Box<str>> = FxHashSet::default();
        let mut native = Vec::with_capacity(shapes.len());
        let mut interp = Vec::with_capacity(shapes.len());
        let mut adjustor = Vec::new();

        for shape in shapes {
            let key: Box<str> = shape.key().into();
            if !seen.insert(key.clone()) {
                continue;
            }
            native.push((key.clone(), NativeCallThunk::prepare(shape.clone())));
            interp.push((
                key.clone(),
                InterpretedCallThunk::prepare(shape.clone(), entry, false),
            ));
            if takes_receiver(shape) {
                adjustor.push((
                    key,
                    InterpretedCallThunk::prepare(shape.clone(), entry, true),
                ));
            }
        }

        native.sort_by(|a, b| a.0.cmp(&b.0));
        interp.sort_by(|a, b| a.0.cmp(&b.0));
        adjustor.sort_by(|a, b| a.0.cmp(&b.0));

        log::debug!(
            "built thunk tables: {} native-call, {} interpreted-call, {} adjustor",
            native.len(),
            interp.len(),
            adjustor.len()
        );

        Self {
            native,
            interp,
            adjustor,
        }
    }

    /// Build tables from canonical shape keys.
    pub fn build_from_keys<S: AsRef<str>>(
        keys: &[S],
        entry: InterpEntryFn,
    ) -> Result<Self, InteropError> {
        let shapes = keys
            .iter()
            .map(|k| SignatureShape::parse(k.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::build(&shapes, entry))
    }

    fn find<'a, T>(table: &'a [(Box<str>, T)], key: &str) -> Option<&'a T> {
        table
            .binary_search_by(|(k, _)| k.as_ref().cmp(key))
            .ok()
            .map(|i| &table[i].1)
    }

    /// Look up the outbound thunk for a shape key.
    pub fn native_call(&self, key: &str) -> Result<&NativeCallThunk, InteropError> {
        Self::find(&self.native, key).ok_or_else(|| InteropError::UnknownShape(key.to_string()))
    }

    /// Look up the inbound thunk for a shape key.
    pub fn interp_call(&self, key: &str) -> Result<&InterpretedCallThunk, InteropError> {
        Self::find(&self.interp, key).ok_or_else(|| InteropError::UnknownShape(key.to_string()))
    }

    /// Look up the inbound adjustor thunk for a shape key.
    pub fn adjustor_call(&self, key: &str) -> Result<&InterpretedCallThunk, InteropError> {
        Self::find(&self.adjustor, key).ok_or_else(|| InteropError::UnknownShape(key.to_string()))
    }

    /// Whether a shape key is covered at all.
    pub fn contains(&self, key: &str) -> bool {
        Self::find(&self.native, key).is_some()
    }

    /// Number of distinct shapes covered.
    pub fn shape_count(&self) -> usize {
        self.native.len()
    }

    /// Resolve every thunk family for `method`'s shape key at once.
    ///
    /// The returned binding holds direct references; store it in the
    /// method's dispatch slot and never search again.
    pub fn bind(&self, method: &MethodInfo) -> Result<BoundMethod<'_>, InteropError> {
        let key = method.shape_key();
        let native_call = self.native_call(key)?;
        let interp_call = self.interp_call(key)?;
        let adjustor = Self::find(&self.adjustor, key);
        log::trace!("bound method token={} shape='{}'", method.token(), key);
        Ok(BoundMethod {
            native_call,
            interp_call,
            adjustor,
        })
    }
}

impl std::fmt::Debug for ThunkTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThunkTables")
            .field("native", &self.native.len())
            .field("interp", &self.interp.len())
            .field("adjustor", &self.adjustor.len())
            .finish()
    }
}

/// A shape can host instance methods when its first argument is
/// pointer-width.
fn takes_receiver(shape: &SignatureShape) -> bool {
    shape.args().first() == Some(&ValueKind::I64)
}

/// One method's resolved thunks, produced by [`ThunkTables::bind`].
pub struct BoundMethod<'t> {
    native_call: &'t NativeCallThunk,
    interp_call: &'t InterpretedCallThunk,
    adjustor: Option<&'t InterpretedCallThunk>,
}

impl<'t> BoundMethod<'t> {
    /// The outbound thunk (for native-body methods).
    pub fn native_call(&self) -> &'t NativeCallThunk {
        self.native_call
    }

    /// The plain inbound entry point, for native dispatch slots.
    pub fn interp_entry(&self) -> NonNull<c_void> {
        self.interp_call.entry_point()
    }

    /// The adjustor inbound entry point, if this shape hosts instance
    /// methods.
    pub fn adjustor_entry(&self) -> Option<NonNull<c_void>> {
        self.adjustor.map(|t| t.entry_point())
    }
}

// ============================================================================
// Process-wide install point
// ============================================================================

static TABLES: OnceCell<ThunkTables> = OnceCell::new();

/// Install the process-wide thunk tables.
///
/// Called once at image load, before any thread dispatches through them.
/// A second install is an error.
pub fn install(tables: ThunkTables) -> Result<(), InteropError> {
    TABLES
        .set(tables)
        .map_err(|_| InteropError::AlreadyInstalled)
}

/// The process-wide thunk tables, if installed.
pub fn global() -> Option<&'static ThunkTables> {
    TABLES.get()
}
