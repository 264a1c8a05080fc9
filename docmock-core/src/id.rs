//! Identifier factories for documents inserted without an `_id`.

use bson::{Bson, Uuid, oid::ObjectId};

/// Produces unique identifiers for new documents.
pub trait IdFactory: Send + Sync + std::fmt::Debug {
    /// Returns a fresh identifier. Two calls never return equal values.
    fn next_id(&self) -> Bson;
}

/// Generates 12-byte, time-ordered [`ObjectId`]s, the way a MongoDB driver does.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectIdFactory;

impl IdFactory for ObjectIdFactory {
    fn next_id(&self) -> Bson {
        Bson::ObjectId(ObjectId::new())
    }
}

/// Generates random v4 UUIDs stored as BSON binary subtype 4.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidFactory;

impl IdFactory for UuidFactory {
    fn next_id(&self) -> Bson {
        Bson::from(Uuid::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_unique_and_ordered() {
        let factory = ObjectIdFactory;
        let (first, second) = (factory.next_id(), factory.next_id());

        assert_ne!(first, second);
        match (first, second) {
            (Bson::ObjectId(a), Bson::ObjectId(b)) => assert!(a.timestamp() <= b.timestamp()),
            other => panic!("expected object ids, got {other:?}"),
        }
    }

    #[test]
    fn uuids_are_binary() {
        assert!(matches!(UuidFactory.next_id(), Bson::Binary(_)));
    }
}
