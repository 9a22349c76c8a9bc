//! Descriptors of the five Secret Service interfaces.

use crate::descriptor::{Access, DefinitionError, InterfaceDescriptor};
use std::sync::{Arc, LazyLock};

pub const SERVICE_INTERFACE: &str = "org.freedesktop.Secret.Service";
pub const COLLECTION_INTERFACE: &str = "org.freedesktop.Secret.Collection";
pub const ITEM_INTERFACE: &str = "org.freedesktop.Secret.Item";
pub const SESSION_INTERFACE: &str = "org.freedesktop.Secret.Session";
pub const PROMPT_INTERFACE: &str = "org.freedesktop.Secret.Prompt";

type Shared = Result<Arc<InterfaceDescriptor>, DefinitionError>;

static SERVICE: LazyLock<Shared> = LazyLock::new(|| {
    let iface = InterfaceDescriptor::builder(SERVICE_INTERFACE)?
        .method("OpenSession", "sv", "vo")?
        .method("CreateCollection", "a{sv}s", "oo")?
        .method("SearchItems", "a{ss}", "aoao")?
        .method("Unlock", "ao", "aoo")?
        .method("Lock", "ao", "aoo")?
        .method("GetSecrets", "aoo", "a{o(oayays)}")?
        .method("ReadAlias", "s", "o")?
        .method("SetAlias", "so", "")?
        .property("Collections", "ao", Access::Read)?
        .signal("CollectionCreated", "o")?
        .signal("CollectionDeleted", "o")?
        .signal("CollectionChanged", "o")?
        .build();
    Ok(Arc::new(iface))
});

static COLLECTION: LazyLock<Shared> = LazyLock::new(|| {
    let iface = InterfaceDescriptor::builder(COLLECTION_INTERFACE)?
        .method("Delete", "", "o")?
        .method("SearchItems", "a{ss}", "ao")?
        .method("CreateItem", "a{sv}(oayays)b", "oo")?
        .property("Items", "ao", Access::Read)?
        .property("Label", "s", Access::ReadWrite)?
        .property("Locked", "b", Access::Read)?
        .property("Created", "t", Access::Read)?
        .property("Modified", "t", Access::Read)?
        .signal("ItemCreated", "o")?
        .signal("ItemDeleted", "o")?
        .signal("ItemChanged", "o")?
        .build();
    Ok(Arc::new(iface))
});

static ITEM: LazyLock<Shared> = LazyLock::new(|| {
    let iface = InterfaceDescriptor::builder(ITEM_INTERFACE)?
        .method("Delete", "", "o")?
        .method("GetSecret", "o", "(oayays)")?
        .method("SetSecret", "(oayays)", "")?
        .property("Locked", "b", Access::Read)?
        .property("Attributes", "a{ss}", Access::ReadWrite)?
        .property("Label", "s", Access::ReadWrite)?
        .property("Created", "t", Access::Read)?
        .property("Modified", "t", Access::Read)?
        .build();
    Ok(Arc::new(iface))
});

static SESSION: LazyLock<Shared> = LazyLock::new(|| {
    let iface = InterfaceDescriptor::builder(SESSION_INTERFACE)?
        .method("Close", "", "")?
        .build();
    Ok(Arc::new(iface))
});

static PROMPT: LazyLock<Shared> = LazyLock::new(|| {
    let iface = InterfaceDescriptor::builder(PROMPT_INTERFACE)?
        .method("Prompt", "s", "")?
        .method("Dismiss", "", "")?
        .signal("Completed", "bv")?
        .build();
    Ok(Arc::new(iface))
});

pub fn service() -> Shared {
    SERVICE.clone()
}

pub fn collection() -> Shared {
    COLLECTION.clone()
}

pub fn item() -> Shared {
    ITEM.clone()
}

pub fn session() -> Shared {
    SESSION.clone()
}

pub fn prompt() -> Shared {
    PROMPT.clone()
}

/// Every Secret Service interface, in the order above.
pub fn all() -> Result<Vec<Arc<InterfaceDescriptor>>, DefinitionError> {
    Ok(vec![service()?, collection()?, item()?, session()?, prompt()?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_descriptors_build() {
        let all = all().unwrap();
        let names: Vec<_> = all.iter().map(|i| i.name()).collect();
        assert_eq!(
            names,
            [
                SERVICE_INTERFACE,
                COLLECTION_INTERFACE,
                ITEM_INTERFACE,
                SESSION_INTERFACE,
                PROMPT_INTERFACE
            ]
        );
    }

    #[test]
    fn test_service_signatures() {
        let service = service().unwrap();
        let get_secrets = service.method("GetSecrets").unwrap();
        assert_eq!(get_secrets.input.to_string(), "aoo");
        assert_eq!(get_secrets.output.to_string(), "a{o(oayays)}");
        assert!(service.method("SetAlias").unwrap().output.is_empty());
        assert!(!service.property("Collections").unwrap().access.is_writable());
        assert_eq!(service.signals().len(), 3);
    }

    #[test]
    fn test_item_access_modes() {
        let item = item().unwrap();
        assert!(item.property("Label").unwrap().access.is_writable());
        assert!(item.property("Attributes").unwrap().access.is_writable());
        assert!(!item.property("Locked").unwrap().access.is_writable());
        assert_eq!(item.method("GetSecret").unwrap().output.len(), 1);
    }

    #[test]
    fn test_descriptors_are_shared() {
        assert!(Arc::ptr_eq(&prompt().unwrap(), &prompt().unwrap()));
    }
}
