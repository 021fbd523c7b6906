use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::model::unit::{TestUnit, UnitHandle};

/// Stable key of a test unit: its Rust type.
///
/// Two identities are equal when they describe the same type. The identity
/// also carries the constructor used to create the unit's instance, so a
/// node created only because another unit depends on it can still be
/// instantiated.
#[derive(Clone, Copy)]
pub struct Identity {
    type_id: TypeId,
    type_name: &'static str,
    create: fn() -> UnitHandle,
}

impl Identity {
    /// Identity of the unit type `T`.
    pub fn of<T: TestUnit + Default>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            create: create_unit::<T>,
        }
    }

    /// Display name derived from the type name.
    pub fn name(&self) -> &'static str {
        display_name(self.type_name)
    }

    /// Fully qualified type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Property key used when this unit is injected without an explicit key.
    pub fn property_key(&self) -> String {
        property_key_for(self.name())
    }

    pub(crate) fn instantiate(&self) -> UnitHandle {
        (self.create)()
    }
}

fn create_unit<T: TestUnit + Default>() -> UnitHandle {
    UnitHandle::new(T::default())
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.type_name).finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Last path segment of a type name, generic arguments stripped.
///
/// `my_crate::suites::LoginTest<u8>` becomes `LoginTest`.
pub fn display_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

/// Derive an injection key from a unit name.
///
/// The first character is lower-cased unless the name opens with an acronym
/// of three or more capitals, which is kept verbatim. Lower-casing is
/// locale-free.
pub fn property_key_for(name: &str) -> String {
    let leading_caps = name.chars().take(3).filter(|c| c.is_uppercase()).count();
    if leading_caps == 3 {
        return name.to_owned();
    }

    let mut chars = name.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
    }
}
