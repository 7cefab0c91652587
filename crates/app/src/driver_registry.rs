//! Driver registry — explicit protocol tag → factory mapping built at startup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use homehub_domain::error::HubError;
use homehub_domain::protocol::ProtocolTag;

use crate::ports::DriverFactory;

/// Set of driver factories the daemon can pair with.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: BTreeMap<ProtocolTag, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its own tag, replacing any previous one.
    pub fn register(&mut self, factory: Arc<dyn DriverFactory>) {
        let protocol = factory.protocol();
        if self.factories.insert(protocol.clone(), factory).is_some() {
            tracing::warn!(%protocol, "driver factory replaced");
        } else {
            tracing::debug!(%protocol, "driver factory registered");
        }
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, factory: Arc<dyn DriverFactory>) -> Self {
        self.register(factory);
        self
    }

    /// Find the factory for a raw protocol name.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnsupportedProtocol`] when no factory serves
    /// `protocol`.
    pub fn resolve(&self, protocol: &str) -> Result<(ProtocolTag, Arc<dyn DriverFactory>), HubError> {
        let unsupported = || HubError::UnsupportedProtocol(protocol.to_string());
        let tag = ProtocolTag::new(protocol).map_err(|_| unsupported())?;
        let factory = self.factories.get(&tag).cloned().ok_or_else(unsupported)?;
        Ok((tag, factory))
    }

    #[must_use]
    pub fn supports(&self, protocol: &str) -> bool {
        self.resolve(protocol).is_ok()
    }

    /// Registered tags in lexical order.
    pub fn protocols(&self) -> impl Iterator<Item = &ProtocolTag> {
        self.factories.keys()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{DriverContext, ProtocolDriver};
    use homehub_domain::error::DriverError;

    struct NamedFactory(&'static str);

    impl DriverFactory for NamedFactory {
        fn protocol(&self) -> ProtocolTag {
            ProtocolTag::new(self.0).unwrap()
        }

        fn create(&self, _context: DriverContext) -> Result<Arc<dyn ProtocolDriver>, DriverError> {
            Err(DriverError::Connection("not used".into()))
        }
    }

    fn registry() -> DriverRegistry {
        DriverRegistry::new()
            .with(Arc::new(NamedFactory("esphome")))
            .with(Arc::new(NamedFactory("matter")))
    }

    #[test]
    fn should_resolve_registered_protocol_case_insensitively() {
        let (tag, _) = registry().resolve("ESPHome").unwrap();
        assert_eq!(tag, "esphome");
    }

    #[test]
    fn should_fail_with_unsupported_protocol_when_unknown() {
        let result = registry().resolve("zwave-legacy");
        assert!(matches!(
            result,
            Err(HubError::UnsupportedProtocol(ref p)) if p == "zwave-legacy"
        ));
    }

    #[test]
    fn should_fail_with_unsupported_protocol_when_blank() {
        assert!(matches!(
            registry().resolve("  "),
            Err(HubError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn should_list_protocols_in_order() {
        let registry = registry();
        let tags: Vec<&str> = registry.protocols().map(ProtocolTag::as_str).collect();
        assert_eq!(tags, vec!["esphome", "matter"]);
    }
}
