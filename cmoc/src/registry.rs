//! The `DataRegistry` contract: an external, host-owned store of named,
//! windowed data arrays that the core addresses only through opaque
//! [`Handle`]s.
//!
//! CMOC never stores physics data itself. Every `Action`, `InterpolateAction`
//! and convergence check resolves a `"window.attribute"` pair to a `Handle`
//! once (usually at `init`) and then operates purely in terms of handles.

use ahash::AHashMap;

/// Opaque handle into the host's data registry. Handles `<= 0` are the
/// "absent" convention: a dataitem that was never registered, or whose
/// window hasn't reached `init_done` yet.
pub type Handle = i64;

/// The reserved value meaning "no such dataitem".
pub const ABSENT: Handle = 0;

/// `true` for any handle a caller may dereference.
pub fn is_present(handle: Handle) -> bool {
    handle > 0
}

/// Where a dataitem's data lives: attributes can be scoped to the whole
/// window, a pane, individual nodes, or individual elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Location {
    Window,
    Pane,
    Node,
    Element,
}

/// The scalar representation backing a dataitem's components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ScalarType {
    Integer,
    Float,
    Double,
}

/// The shape/type signature of a dataitem, used by `new_dataitem` to detect
/// incompatible redefinition: a second `New` registration for the same
/// `window.attr` with a different signature is a `ConfigurationError`, not
/// silently accepted or silently overwritten. Serializable so a diagnostic
/// dump can include the registry's schema alongside a scheduler trace.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DataItemSignature {
    pub location: Location,
    pub scalar: ScalarType,
    pub ncomp: u32,
    pub unit: Option<String>,
}

/// The contract an Agent/Action uses to resolve and manage dataitems. The
/// host supplies the implementation (a real COM-like registry in production,
/// [`MockRegistry`] in tests).
pub trait DataRegistry {
    /// Resolve a `"window.attr"` pair for read-only access. Returns
    /// [`ABSENT`] if unresolved.
    fn resolve_const(&self, window_attr: &str) -> Handle;

    /// Resolve a `"window.attr"` pair for mutable access. Returns
    /// [`ABSENT`] if unresolved.
    fn resolve_mut(&mut self, window_attr: &str) -> Handle;

    /// Whether a window of this name has been created at all.
    fn window_exists(&self, window: &str) -> bool;

    /// Register a brand-new dataitem. If `window_attr` is already registered
    /// with a compatible signature this is a no-op; if registered with an
    /// incompatible one, returns `Err`.
    fn new_dataitem(
        &mut self,
        window_attr: &str,
        signature: DataItemSignature,
    ) -> Result<(), (String, String)>;

    /// Register `window_attr` as a deep copy of `parent_window_attr`'s
    /// current signature and data.
    fn clone_dataitem(&mut self, window_attr: &str, parent_window_attr: &str);

    /// Register `window_attr` as an alias (shared storage) of
    /// `parent_window_attr`.
    fn use_dataitem(&mut self, window_attr: &str, parent_window_attr: &str);

    /// The signature previously registered for `window_attr`, if any.
    fn dataitem_signature(&self, window_attr: &str) -> Option<DataItemSignature>;

    /// Seal a window: after this call, resolution may be cached by callers,
    /// and further `new_dataitem`/`clone_dataitem`/`use_dataitem` calls on it
    /// are host-defined (CMOC does not forbid them, it just no longer
    /// depends on them).
    fn window_init_done(&mut self, window: &str);

    /// Delete a window and everything registered under it. Called by
    /// `Agent::finalize` unless the coupling is restarting.
    fn delete_window(&mut self, window: &str);

    /// Read-only access to the raw component array behind a handle, used by
    /// the [`crate::numeric::NumericLib`] contract.
    fn array(&self, handle: Handle) -> Option<&[f64]>;

    /// Mutable access to the raw component array behind a handle.
    fn array_mut(&mut self, handle: Handle) -> Option<&mut [f64]>;
}

struct Entry {
    handle: Handle,
    signature: DataItemSignature,
    data: Vec<f64>,
}

/// An in-memory [`DataRegistry`] used by CMOC's own tests and by the demo
/// crate. Not meant for production use: a real host backs this contract with
/// its own distributed mesh store.
#[derive(Default)]
pub struct MockRegistry {
    entries: AHashMap<String, Entry>,
    windows: AHashMap<String, bool>,
    next_handle: Handle,
}

impl MockRegistry {
    pub fn new() -> Self {
        MockRegistry {
            entries: AHashMap::new(),
            windows: AHashMap::new(),
            next_handle: 1,
        }
    }

    fn alloc_handle(&mut self) -> Handle {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    fn window_of(window_attr: &str) -> &str {
        window_attr.split('.').next().unwrap_or(window_attr)
    }

    /// Test/demo convenience: set the raw backing array for a dataitem
    /// directly, after it has been registered.
    pub fn set_array(&mut self, window_attr: &str, data: Vec<f64>) {
        if let Some(e) = self.entries.get_mut(window_attr) {
            e.data = data;
        }
    }
}

impl DataRegistry for MockRegistry {
    fn resolve_const(&self, window_attr: &str) -> Handle {
        self.entries
            .get(window_attr)
            .map(|e| e.handle)
            .unwrap_or(ABSENT)
    }

    fn resolve_mut(&mut self, window_attr: &str) -> Handle {
        self.entries
            .get(window_attr)
            .map(|e| e.handle)
            .unwrap_or(ABSENT)
    }

    fn window_exists(&self, window: &str) -> bool {
        self.windows.contains_key(window)
    }

    fn new_dataitem(
        &mut self,
        window_attr: &str,
        signature: DataItemSignature,
    ) -> Result<(), (String, String)> {
        self.windows
            .entry(Self::window_of(window_attr).to_string())
            .or_insert(false);
        if let Some(existing) = self.entries.get(window_attr) {
            if existing.signature != signature {
                let window = Self::window_of(window_attr).to_string();
                let attr = window_attr
                    .rsplit('.')
                    .next()
                    .unwrap_or(window_attr)
                    .to_string();
                return Err((window, attr));
            }
            return Ok(());
        }
        let ncomp = signature.ncomp as usize;
        let handle = self.alloc_handle();
        self.entries.insert(
            window_attr.to_string(),
            Entry {
                handle,
                signature,
                data: vec![0.0; ncomp.max(1)],
            },
        );
        Ok(())
    }

    fn clone_dataitem(&mut self, window_attr: &str, parent_window_attr: &str) {
        self.windows
            .entry(Self::window_of(window_attr).to_string())
            .or_insert(false);
        let Some(parent) = self.entries.get(parent_window_attr) else {
            return;
        };
        let signature = parent.signature.clone();
        let data = parent.data.clone();
        let handle = self.alloc_handle();
        self.entries
            .insert(window_attr.to_string(), Entry { handle, signature, data });
    }

    fn use_dataitem(&mut self, window_attr: &str, parent_window_attr: &str) {
        self.windows
            .entry(Self::window_of(window_attr).to_string())
            .or_insert(false);
        let Some(parent) = self.entries.get(parent_window_attr) else {
            return;
        };
        let handle = parent.handle;
        let signature = parent.signature.clone();
        let data = parent.data.clone();
        self.entries
            .insert(window_attr.to_string(), Entry { handle, signature, data });
    }

    fn dataitem_signature(&self, window_attr: &str) -> Option<DataItemSignature> {
        self.entries.get(window_attr).map(|e| e.signature.clone())
    }

    fn window_init_done(&mut self, window: &str) {
        self.windows.insert(window.to_string(), true);
    }

    fn delete_window(&mut self, window: &str) {
        self.entries
            .retain(|k, _| Self::window_of(k) != window);
        self.windows.remove(window);
    }

    fn array(&self, handle: Handle) -> Option<&[f64]> {
        self.entries
            .values()
            .find(|e| e.handle == handle)
            .map(|e| e.data.as_slice())
    }

    fn array_mut(&mut self, handle: Handle) -> Option<&mut [f64]> {
        self.entries
            .values_mut()
            .find(|e| e.handle == handle)
            .map(|e| e.data.as_mut_slice())
    }
}
