// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed identifiers.
//!
//! An [`Id<T>`] is a [`Uuid`] tagged at compile time with the type of record it identifies, so a
//! segment id cannot be handed to something expecting a port id.
//!
//! ```compile_fail
//! # use portbind_model::{Id, Port, Segment};
//! fn confused(mut port: Id<Port>, segment: Id<Segment>) {
//!     port = segment;
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use uuid::Uuid;

/// A [`Uuid`] tagged with the type it identifies.
#[repr(transparent)]
pub struct Id<T: ?Sized>(Uuid, PhantomData<T>);

impl<T: ?Sized> Id<T> {
    /// Namespace of the ids produced by [`Id::new_static`].
    pub const NAMESPACE_UUID: Uuid = Uuid::from_u128(0x5c0e_2b7a_91d4_4f3e_b1a6_0d8f_27c4_e913);

    /// A fresh random (v4) id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4(), PhantomData)
    }

    /// A [UUID version 5] id derived from `namespace` and `tag`.
    ///
    /// [UUID version 5]: https://datatracker.ietf.org/doc/html/rfc9562#section-5.5
    #[must_use]
    pub fn new_v5(namespace: Uuid, tag: impl AsRef<[u8]>) -> Self {
        Self(Uuid::new_v5(&namespace, tag.as_ref()), PhantomData)
    }

    /// A stable id for a well-known name.
    ///
    /// The same `tag` always yields the same id, which makes names in scenario files and tests
    /// usable as ids.
    #[must_use]
    pub fn new_static(tag: impl AsRef<str>) -> Self {
        Self::new_v5(Self::NAMESPACE_UUID, tag.as_ref().as_bytes())
    }

    /// Tag a [`Uuid`] received from a context where its type is known.
    #[must_use]
    pub const fn from_raw(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    #[must_use]
    pub const fn as_raw(&self) -> &Uuid {
        &self.0
    }
}

impl<T: ?Sized> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Copy for Id<T> {}

impl<T: ?Sized> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: ?Sized> Eq for Id<T> {}

impl<T: ?Sized> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: ?Sized> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T: ?Sized> Display for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<T: ?Sized> Debug for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl<T: ?Sized> From<Id<T>> for Uuid {
    fn from(value: Id<T>) -> Self {
        value.0
    }
}

impl<T: ?Sized> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T: ?Sized> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Self::from_raw)
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::Id;
    use bolero::{Driver, TypeGenerator};

    impl<T: ?Sized + 'static> TypeGenerator for Id<T> {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let bytes: [u8; 16] = driver.produce()?;
            Some(Id::from_raw(uuid::Builder::from_random_bytes(bytes).into_uuid()))
        }
    }
}
