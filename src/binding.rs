//! Typed wrappers around a [`Proxy`] bound to a fixed service.
//!
//! A binding supplies the well-known service name and the interface
//! descriptors; the caller supplies the object path, or nothing at all for
//! objects living at a constant path. Paths are handed to the proxy as given.

use crate::bus::SharedBus;
use crate::descriptor::{DefinitionError, InterfaceDescriptor};
use crate::proxy::Proxy;
use crate::value::ObjectPath;
use std::sync::Arc;

/// A remote object type served by one well-known bus name.
pub trait BoundObject: Sized {
    /// Bus name the object is served under.
    const SERVICE: &'static str;

    /// Interfaces the object implements, in lookup order.
    fn interfaces() -> Result<Vec<Arc<InterfaceDescriptor>>, DefinitionError>;

    fn from_proxy(proxy: Proxy) -> Self;

    fn proxy(&self) -> &Proxy;

    /// Bind to the object at `path` on `bus`. No bus I/O happens here.
    fn bind(bus: SharedBus, path: impl Into<ObjectPath>) -> Result<Self, DefinitionError> {
        let proxy = Proxy::with_interfaces(bus, Self::SERVICE, path, Self::interfaces()?);
        Ok(Self::from_proxy(proxy))
    }

    /// Bind another object of this type on the same bus.
    fn sibling<T: BoundObject>(&self, path: impl Into<ObjectPath>) -> Result<T, DefinitionError> {
        T::bind(self.proxy().bus().clone(), path)
    }

    fn path(&self) -> &ObjectPath {
        self.proxy().path()
    }
}

/// A [`BoundObject`] that always lives at the same path.
pub trait WellKnownObject: BoundObject {
    const PATH: &'static str;

    fn bind_default(bus: SharedBus) -> Result<Self, DefinitionError> {
        Self::bind(bus, Self::PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::descriptor::Access;

    struct Thermostat(Proxy);

    impl BoundObject for Thermostat {
        const SERVICE: &'static str = "org.example.Heating";

        fn interfaces() -> Result<Vec<Arc<InterfaceDescriptor>>, DefinitionError> {
            let iface = InterfaceDescriptor::builder("org.example.Thermostat")?
                .property("Target", "d", Access::ReadWrite)?
                .build();
            Ok(vec![Arc::new(iface)])
        }

        fn from_proxy(proxy: Proxy) -> Self {
            Thermostat(proxy)
        }

        fn proxy(&self) -> &Proxy {
            &self.0
        }
    }

    impl WellKnownObject for Thermostat {
        const PATH: &'static str = "/org/example/Thermostat";
    }

    #[tokio::test]
    async fn test_bind_default_uses_constant_address() {
        let bus = MemoryBus::new();
        let t = Thermostat::bind_default(Arc::new(bus.clone())).unwrap();
        assert_eq!(t.proxy().destination(), "org.example.Heating");
        assert_eq!(t.path().as_str(), "/org/example/Thermostat");
        assert_eq!(bus.call_count().await, 0);
    }

    #[test]
    fn test_bind_passes_path_through() {
        let t = Thermostat::bind(Arc::new(MemoryBus::new()), "not a path").unwrap();
        assert_eq!(t.path().as_str(), "not a path");

        let other: Thermostat = t.sibling("/org/example/Other").unwrap();
        assert_eq!(other.path().as_str(), "/org/example/Other");
    }
}
