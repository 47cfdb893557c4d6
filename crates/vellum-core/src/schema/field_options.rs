use super::descriptor::{Descriptor, Mutability};
use crate::{
    value::{TypeTag, Value},
    Error, Result,
};

/// Compiled per-attribute options: what the field runtime consults on every
/// access.
///
/// Produced from a [`Descriptor`] by [`FieldOptions::compile`]; the declaring
/// position (key component vs. data field) tightens the descriptor's rules.
#[derive(Debug)]
pub struct FieldOptions {
    name: String,
    tag: TypeTag,
    is_key: bool,
    optional: bool,
    immutable: bool,
    default: Option<Value>,
    descriptor: Descriptor,
}

impl FieldOptions {
    /// Compiles a descriptor declared under `name`.
    ///
    /// Key components must be required, immutable, and default-free; a
    /// descriptor that says otherwise is a declaration bug, rejected here.
    /// A default that fails its own descriptor is rejected the same way.
    pub fn compile(name: &str, descriptor: &Descriptor, is_key: bool) -> Result<FieldOptions> {
        if is_key {
            if descriptor.is_optional() {
                return Err(Error::invalid_field(name, "key components must be required"));
            }
            if descriptor.mutability() == Mutability::Mutable {
                return Err(Error::invalid_field(name, "key components must be immutable"));
            }
            if descriptor.default().is_some() {
                return Err(Error::invalid_field(
                    name,
                    "key components may not declare a default",
                ));
            }
        }

        if let Some(default) = descriptor.default() {
            descriptor.check(name, Some(default)).map_err(|err| {
                err.context(Error::invalid_field(name, "default value fails validation"))
            })?;
        }

        let immutable = is_key || descriptor.mutability() == Mutability::Immutable;

        Ok(FieldOptions {
            name: name.to_string(),
            tag: descriptor.tag(),
            is_key,
            optional: descriptor.is_optional(),
            immutable,
            default: descriptor.default().cloned(),
            descriptor: descriptor.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Validates a value (`None` meaning absent) against the field's schema.
    pub fn validate(&self, value: Option<&Value>) -> Result<()> {
        self.descriptor.check(&self.name, value)
    }
}
