//! Mapper contract.
//!
//! Each sync direction supplies a pair of transforms, `to_dest`/`to_source`.
//! This module makes that pair a trait so the engine can hold
//! `Arc<dyn Mapper>` per direction the way it holds `Arc<dyn Adapter>` per
//! side.
//!
//! The engine does not verify that `to_dest`/`to_source` are inverses of
//! each other; that is a mapper-authoring concern.

use crate::error::MapperResult;
use crate::model::Record;

/// Transforms a record between a source side's shape and a destination
/// side's shape.
pub trait Mapper: Send + Sync {
    /// Map a record observed on the source side into the destination
    /// side's shape. Failure is a per-record, non-fatal error:
    /// the record is skipped, not the whole cycle.
    fn to_dest(&self, record: &Record) -> MapperResult<Record>;

    /// Map a record observed on the destination side back into the
    /// source side's shape (used for the reverse direction pass).
    fn to_source(&self, record: &Record) -> MapperResult<Record>;
}

/// A no-op mapper for sides that already share a schema. Useful for
/// same-shape integrations and as test scaffolding.
pub struct IdentityMapper;

impl Mapper for IdentityMapper {
    fn to_dest(&self, record: &Record) -> MapperResult<Record> {
        Ok(record.clone())
    }

    fn to_source(&self, record: &Record) -> MapperResult<Record> {
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mapper_passes_through() {
        let mapper = IdentityMapper;
        let record = Record::new("a1").with_field("updatedAt", 100);
        let mapped = mapper.to_dest(&record).unwrap();
        assert_eq!(mapped, record);
    }
}
