//! Backends available to a driver, selected at enumeration time.

use std::fmt;
use std::sync::Arc;

use crate::traits::Backend;

/// Ordered set of backends. Enumeration visits them in registration order,
/// so cameras of the first backend get the lowest array indices.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend; a backend with the same name replaces the earlier one.
    #[must_use]
    pub fn with<B: Backend + 'static>(mut self, backend: B) -> Self {
        self.register(Arc::new(backend));
        self
    }

    /// Add a shared backend; a backend with the same name replaces the earlier one.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        if let Some(existing) = self
            .backends
            .iter_mut()
            .find(|existing| existing.name() == backend.name())
        {
            *existing = backend;
        } else {
            self.backends.push(backend);
        }
    }

    /// Look a backend up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.iter().find(|backend| backend.name() == name)
    }

    /// Registered backends in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.backends.iter()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|backend| backend.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCameraSpec, MockRig};

    #[test]
    fn test_register_keeps_order_and_replaces_by_name() {
        let first = MockRig::named("alpha", vec![MockCameraSpec::default()]);
        let second = MockRig::named("beta", vec![MockCameraSpec::default()]);
        let replacement = MockRig::named("alpha", vec![MockCameraSpec::default(); 3]);

        let registry = BackendRegistry::new()
            .with(first)
            .with(second)
            .with(replacement);

        let names: Vec<&str> = registry.iter().map(|backend| backend.name()).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(registry.len(), 2);

        let alpha = registry.get("alpha").expect("alpha registered");
        assert_eq!(alpha.enumerate().expect("enumerate").len(), 3);
        assert!(registry.get("gamma").is_none());
    }
}
