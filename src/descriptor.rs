//! Interface descriptors.
//!
//! An [`InterfaceDescriptor`] lists what a remote interface offers: methods
//! with their argument and reply signatures, properties with their type and
//! access mode, and signals with their payload signature. Descriptors are
//! plain data, validated once when built and then shared by every proxy that
//! targets the interface.
//!
//! ```
//! use secretbus::descriptor::{Access, InterfaceDescriptor};
//!
//! let prompt = InterfaceDescriptor::builder("org.freedesktop.Secret.Prompt")?
//!     .method("Prompt", "s", "")?
//!     .method("Dismiss", "", "")?
//!     .signal("Completed", "bv")?
//!     .build();
//! assert!(prompt.method("Dismiss").is_some());
//! # Ok::<(), secretbus::DefinitionError>(())
//! ```

use crate::signature::{Signature, SignatureError, Type};
use std::collections::HashSet;
use thiserror::Error;

const MAX_NAME_LEN: usize = 255;

/// Descriptor misuse, detected while the descriptor is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("invalid interface name '{0}'")]
    InvalidInterfaceName(String),

    #[error("invalid member name '{0}'")]
    InvalidMemberName(String),

    #[error("'{member}' is already defined on {interface}")]
    DuplicateMember { interface: String, member: String },

    #[error("invalid signature for {interface}.{member}: {source}")]
    InvalidSignature {
        interface: String,
        member: String,
        #[source]
        source: SignatureError,
    },
}

/// Whether a property can be written through `org.freedesktop.DBus.Properties.Set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    ReadWrite,
}

impl Access {
    pub fn is_writable(self) -> bool {
        matches!(self, Access::ReadWrite)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: String,
    pub input: Signature,
    pub output: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: String,
    pub ty: Type,
    pub access: Access,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSpec {
    pub name: String,
    pub payload: Signature,
}

/// The immutable description of one D-Bus interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    name: String,
    methods: Vec<MethodSpec>,
    properties: Vec<PropertySpec>,
    signals: Vec<SignalSpec>,
}

impl InterfaceDescriptor {
    /// Start describing the interface `name`.
    pub fn builder(name: &str) -> Result<InterfaceBuilder, DefinitionError> {
        if !is_valid_interface_name(name) {
            return Err(DefinitionError::InvalidInterfaceName(name.to_string()));
        }
        Ok(InterfaceBuilder {
            descriptor: InterfaceDescriptor {
                name: name.to_string(),
                methods: Vec::new(),
                properties: Vec::new(),
                signals: Vec::new(),
            },
            names: HashSet::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn signal(&self, name: &str) -> Option<&SignalSpec> {
        self.signals.iter().find(|s| s.name == name)
    }

    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }

    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    pub fn signals(&self) -> &[SignalSpec] {
        &self.signals
    }
}

/// Registers members one at a time, failing on the first invalid one.
#[derive(Debug)]
pub struct InterfaceBuilder {
    descriptor: InterfaceDescriptor,
    names: HashSet<String>,
}

impl InterfaceBuilder {
    /// Register a method. Either signature may be empty.
    pub fn method(mut self, name: &str, input: &str, output: &str) -> Result<Self, DefinitionError> {
        self.claim(name)?;
        let input = self.signature(name, input)?;
        let output = self.signature(name, output)?;
        self.descriptor.methods.push(MethodSpec {
            name: name.to_string(),
            input,
            output,
        });
        Ok(self)
    }

    /// Register a property of exactly one complete type.
    pub fn property(mut self, name: &str, ty: &str, access: Access) -> Result<Self, DefinitionError> {
        self.claim(name)?;
        let ty = Type::parse(ty).map_err(|source| self.invalid(name, source))?;
        self.descriptor.properties.push(PropertySpec {
            name: name.to_string(),
            ty,
            access,
        });
        Ok(self)
    }

    pub fn signal(mut self, name: &str, payload: &str) -> Result<Self, DefinitionError> {
        self.claim(name)?;
        let payload = self.signature(name, payload)?;
        self.descriptor.signals.push(SignalSpec {
            name: name.to_string(),
            payload,
        });
        Ok(self)
    }

    pub fn build(self) -> InterfaceDescriptor {
        self.descriptor
    }

    fn claim(&mut self, name: &str) -> Result<(), DefinitionError> {
        if !is_valid_member_name(name) {
            return Err(DefinitionError::InvalidMemberName(name.to_string()));
        }
        if !self.names.insert(name.to_string()) {
            return Err(DefinitionError::DuplicateMember {
                interface: self.descriptor.name.clone(),
                member: name.to_string(),
            });
        }
        Ok(())
    }

    fn signature(&self, member: &str, s: &str) -> Result<Signature, DefinitionError> {
        Signature::parse(s).map_err(|source| self.invalid(member, source))
    }

    fn invalid(&self, member: &str, source: SignatureError) -> DefinitionError {
        DefinitionError::InvalidSignature {
            interface: self.descriptor.name.clone(),
            member: member.to_string(),
            source,
        }
    }
}

fn is_name_element(element: &str) -> bool {
    let mut chars = element.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Reverse-DNS interface name: two or more elements, none starting with a digit.
pub fn is_valid_interface_name(name: &str) -> bool {
    if name.len() > MAX_NAME_LEN {
        return false;
    }
    let elements: Vec<&str> = name.split('.').collect();
    elements.len() >= 2 && elements.iter().all(|e| is_name_element(e))
}

pub fn is_valid_member_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LEN && is_name_element(name)
}
