//! Pre-allocated identifier resolution.
//!
//! Range-based RunAsUser strategies ask the `Allocator` for the uid a
//! namespace has been assigned. The allocator lives for exactly one
//! admission request: it remembers every answer (success or failure) it
//! handed out, so Generate and Validate within that request cannot
//! disagree, and nothing it learned is visible to the next request.

use podsec_core::NamespaceStore;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{PolicyError, PolicyResult};

/// Backing store answering `(namespace, key) -> id`.
pub trait AllocationBackend: Send + Sync {
    fn allocated_id(&self, namespace: &str, key: &str) -> PolicyResult<i64>;
}

// ---------------------------------------------------------------------------
// NamespaceAnnotationBackend — ids recorded as namespace annotations
// ---------------------------------------------------------------------------

/// Reads the id from the namespace annotation named by `key`.
///
/// The annotation holds either a single uid (`"1000"`) or a block
/// `"<start>/<size>"`, in which case the first uid of the block is used.
pub struct NamespaceAnnotationBackend<'a> {
    namespaces: &'a dyn NamespaceStore,
}

impl<'a> NamespaceAnnotationBackend<'a> {
    pub fn new(namespaces: &'a dyn NamespaceStore) -> Self {
        Self { namespaces }
    }
}

impl AllocationBackend for NamespaceAnnotationBackend<'_> {
    fn allocated_id(&self, namespace: &str, key: &str) -> PolicyResult<i64> {
        let allocation_error = |reason: String| PolicyError::Allocation {
            namespace: namespace.to_string(),
            key: key.to_string(),
            reason,
        };

        let ns = self
            .namespaces
            .get_namespace(namespace)
            .map_err(|e| allocation_error(e.to_string()))?;
        let value = ns
            .annotations
            .get(key)
            .ok_or_else(|| allocation_error("annotation not set on namespace".to_string()))?;
        parse_allocated_id(value).map_err(allocation_error)
    }
}

/// Parses `"<uid>"` or `"<start>/<size>"` into the uid to allocate.
pub fn parse_allocated_id(value: &str) -> Result<i64, String> {
    let value = value.trim();
    let (start, size) = match value.split_once('/') {
        Some((start, size)) => (start, Some(size)),
        None => (value, None),
    };

    let start: i64 = start
        .trim()
        .parse()
        .map_err(|_| format!("malformed uid \"{}\"", value))?;
    if start < 0 {
        return Err(format!("uid must be non-negative, got {}", start));
    }
    if let Some(size) = size {
        let size: i64 = size
            .trim()
            .parse()
            .map_err(|_| format!("malformed uid block \"{}\"", value))?;
        if size <= 0 {
            return Err(format!("uid block \"{}\" is empty", value));
        }
    }
    Ok(start)
}

// ---------------------------------------------------------------------------
// Allocator — request-scoped, memoizing front end
// ---------------------------------------------------------------------------

pub struct Allocator<'a> {
    backend: &'a dyn AllocationBackend,
    resolved: Mutex<HashMap<(String, String), PolicyResult<i64>>>,
}

impl<'a> Allocator<'a> {
    pub fn new(backend: &'a dyn AllocationBackend) -> Self {
        Self {
            backend,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the id for `(namespace, key)`. Every failure is reported as
    /// `PolicyError::Allocation`.
    pub fn get(&self, namespace: &str, key: &str) -> PolicyResult<i64> {
        let mut resolved = self.resolved.lock().map_err(|_| PolicyError::Allocation {
            namespace: namespace.to_string(),
            key: key.to_string(),
            reason: "allocator lock poisoned".to_string(),
        })?;

        let cache_key = (namespace.to_string(), key.to_string());
        if let Some(cached) = resolved.get(&cache_key) {
            return cached.clone();
        }

        let result = self
            .backend
            .allocated_id(namespace, key)
            .map_err(|e| match e {
                PolicyError::Allocation { .. } => e,
                other => PolicyError::Allocation {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    reason: other.to_string(),
                },
            });
        tracing::debug!(
            namespace,
            key,
            ok = result.is_ok(),
            "resolved allocated id"
        );
        resolved.insert(cache_key, result.clone());
        result
    }
}
