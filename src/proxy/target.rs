//! Fallback targets and URL rewriting.
//!
//! The primary target keeps the original request path. Every fallback
//! target gets its path rebuilt as `/{prefix}/{last segment}`.

use std::slice::Iter;

use url::Url;

/// A backend in the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    base: Url,
    path_prefix: String,
    key: String,
}

impl TargetDescriptor {
    /// Creates a target from its origin URL and path prefix.
    ///
    /// Only the scheme, host and port of `base` are used.
    pub fn new(base: Url, path_prefix: impl Into<String>) -> Self {
        let path_prefix = path_prefix.into();
        let key = format!("{}{}", base, path_prefix);
        Self {
            base,
            path_prefix,
            key,
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Stable identifier used for circuit tracking.
    ///
    /// Origin plus prefix, so fallbacks sharing a host stay distinct.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Ordered, immutable list of targets. The first entry is the primary.
#[derive(Debug, Clone)]
pub struct FallbackChain {
    targets: Vec<TargetDescriptor>,
}

impl FallbackChain {
    /// Creates a chain from a primary and its fallbacks, in order.
    pub fn new(primary: TargetDescriptor, fallbacks: Vec<TargetDescriptor>) -> Self {
        let mut targets = Vec::with_capacity(fallbacks.len() + 1);
        targets.push(primary);
        targets.extend(fallbacks);
        Self { targets }
    }

    pub fn primary(&self) -> &TargetDescriptor {
        &self.targets[0]
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, TargetDescriptor> {
        self.targets.iter()
    }
}

impl<'a> IntoIterator for &'a FallbackChain {
    type Item = &'a TargetDescriptor;
    type IntoIter = Iter<'a, TargetDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Builds the URL for the primary target: origin swapped, path and query kept.
pub fn primary_url(original: &Url, target: &TargetDescriptor) -> Url {
    let mut url = target.base.clone();
    url.set_path(original.path());
    url.set_query(original.query());
    url
}

/// Builds the URL for a fallback target.
///
/// The path becomes `/{prefix}/{segment}` where `segment` is everything
/// after the last `/` of the original path. A root path yields an empty
/// segment, so `/` maps to `/{prefix}/`.
pub fn rewrite_url(original: &Url, target: &TargetDescriptor) -> Url {
    let segment = final_segment(original.path());
    let mut url = target.base.clone();
    url.set_path(&format!("/{}/{}", target.path_prefix, segment));
    url.set_query(original.query());
    url
}

/// Returns the substring after the last `/`.
fn final_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}
