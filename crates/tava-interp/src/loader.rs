//! Dynamic library loading for native method resolution
//!
//! Native-body methods name a symbol in a shared library (or in the main
//! image); this module resolves that symbol to the raw entry point an
//! outbound thunk will call. Cross-platform: `.so`, `.dylib`, `.dll`.

use std::ffi::{CStr, CString};
use std::ffi::c_void;
use std::path::Path;
use std::ptr::NonNull;

use thiserror::Error;

use crate::method::MethodInfo;

/// Errors that can occur while resolving native entry points
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file not found or could not be loaded
    #[error("library not found: {path}")]
    NotFound {
        /// Path that was attempted
        path: String,
    },

    /// Symbol not found in library
    #[error("symbol not found: {symbol} in {library}")]
    SymbolNotFound {
        /// Symbol name that was not found
        symbol: String,
        /// Library path
        library: String,
    },

    /// Platform-specific error
    #[error("platform error: {0}")]
    PlatformError(String),

    /// Invalid path encoding
    #[error("invalid UTF-8 in path: {0}")]
    InvalidPath(String),
}

/// Cross-platform dynamic library handle
pub struct Library {
    handle: LibraryHandle,
    path: String,
}

impl Library {
    /// Load a dynamic library from the given path.
    ///
    /// On Unix this uses `dlopen(RTLD_NOW | RTLD_LOCAL)`; on Windows
    /// `LoadLibraryW`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path_ref = path.as_ref();
        let path_str = path_ref
            .to_str()
            .ok_or_else(|| LoadError::InvalidPath(format!("{:?}", path_ref)))?;

        let handle = LibraryHandle::load(path_str)?;
        log::debug!("loaded native library {}", path_str);

        Ok(Library {
            handle,
            path: path_str.to_string(),
        })
    }

    /// Open a handle to the main program image (Unix only).
    ///
    /// Symbols exported by the executable and its already-loaded
    /// dependencies resolve through this handle.
    #[cfg(unix)]
    pub fn open_self() -> Result<Self, LoadError> {
        let handle = unsafe { libc::dlopen(std::ptr::null(), libc::RTLD_NOW) };
        if handle.is_null() {
            return Err(LoadError::PlatformError(
                "dlopen(self) failed".to_string(),
            ));
        }
        Ok(Library {
            handle: LibraryHandle { handle },
            path: "<self>".to_string(),
        })
    }

    /// Get a raw symbol address by name.
    pub fn symbol(&self, name: &str) -> Result<NonNull<c_void>, LoadError> {
        let addr = unsafe { self.handle.symbol::<*mut c_void>(name, &self.path)? };
        NonNull::new(addr).ok_or_else(|| LoadError::SymbolNotFound {
            symbol: name.to_string(),
            library: self.path.clone(),
        })
    }

    /// Get a typed function pointer by name.
    ///
    /// # Safety
    ///
    /// The caller must ensure the symbol's true type matches `T` and that
    /// the library remains loaded while the pointer is used.
    pub unsafe fn get<T>(&self, symbol: &str) -> Result<T, LoadError> {
        self.handle.symbol(symbol, &self.path)
    }

    /// Resolve a native-body method: look up `symbol` and build a
    /// descriptor carrying the entry point.
    ///
    /// The entry point's true prototype must match the shape named by
    /// `shape_key` plus the trailing descriptor parameter; that contract is
    /// established by the build that produced the library, not checked
    /// here.
    pub fn resolve_method(
        &self,
        symbol: &str,
        shape_key: &str,
        token: u32,
    ) -> Result<MethodInfo, LoadError> {
        let entry = self.symbol(symbol)?;
        log::trace!(
            "resolved method token={} symbol={} shape='{}'",
            token,
            symbol,
            shape_key
        );
        Ok(MethodInfo::with_native_entry(shape_key, token, entry))
    }

    /// Get the path this library was loaded from
    pub fn path(&self) -> &str {
        &self.path
    }
}

// Platform-specific implementations

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: *mut c_void,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(path: &str) -> Result<Self, LoadError> {
        let c_path = CString::new(path)
            .map_err(|e| LoadError::PlatformError(format!("invalid path: {}", e)))?;

        let handle = unsafe {
            // RTLD_NOW: resolve all symbols immediately
            // RTLD_LOCAL: symbols not visible to subsequently loaded libraries
            libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL)
        };

        if handle.is_null() {
            let error = unsafe {
                let err_ptr = libc::dlerror();
                if err_ptr.is_null() {
                    "unknown error".to_string()
                } else {
                    CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
                }
            };

            return Err(LoadError::NotFound {
                path: format!("{}: {}", path, error),
            });
        }

        Ok(UnixLibrary { handle })
    }

    unsafe fn symbol<T>(&self, name: &str, lib_path: &str) -> Result<T, LoadError> {
        let c_name = CString::new(name)
            .map_err(|e| LoadError::PlatformError(format!("invalid symbol name: {}", e)))?;

        // Clear any previous error state
        libc::dlerror();

        let symbol = libc::dlsym(self.handle, c_name.as_ptr());

        let err_ptr = libc::dlerror();
        if !err_ptr.is_null() {
            let error = CStr::from_ptr(err_ptr).to_string_lossy().into_owned();
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: format!("{}: {}", lib_path, error),
            });
        }

        if symbol.is_null() {
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: lib_path.to_string(),
            });
        }

        Ok(std::mem::transmute_copy(&symbol))
    }
}

#[cfg(unix)]
impl Drop for UnixLibrary {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

#[cfg(unix)]
unsafe impl Send for UnixLibrary {}
#[cfg(unix)]
unsafe impl Sync for UnixLibrary {}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: *mut c_void,
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(path: &str) -> Result<Self, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        let wide: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };

        if handle.is_null() {
            let error = unsafe { GetLastError() };
            return Err(LoadError::NotFound {
                path: format!("{} (error code: {})", path, error),
            });
        }

        Ok(WindowsLibrary { handle })
    }

    unsafe fn symbol<T>(&self, name: &str, lib_path: &str) -> Result<T, LoadError> {
        let c_name = CString::new(name)
            .map_err(|e| LoadError::PlatformError(format!("invalid symbol name: {}", e)))?;

        let symbol = GetProcAddress(self.handle, c_name.as_ptr());

        if symbol.is_null() {
            let error = GetLastError();
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: format!("{} (error code: {})", lib_path, error),
            });
        }

        Ok(std::mem::transmute_copy(&symbol))
    }
}

#[cfg(windows)]
impl Drop for WindowsLibrary {
    fn drop(&mut self) {
        unsafe {
            FreeLibrary(self.handle);
        }
    }
}

#[cfg(windows)]
unsafe impl Send for WindowsLibrary {}
#[cfg(windows)]
unsafe impl Sync for WindowsLibrary {}

// Windows FFI declarations
#[cfg(windows)]
extern "system" {
    fn LoadLibraryW(filename: *const u16) -> *mut c_void;
    fn GetProcAddress(module: *mut c_void, procname: *const i8) -> *mut c_void;
    fn FreeLibrary(module: *mut c_void) -> i32;
    fn GetLastError() -> u32;
}
