// Dense human-readable id allocation for records appended by a merge.

use crate::error::MergeError;
use crate::types::ArtifactKind;

/// Hands out contiguous `human_readable_id` values after the largest existing one.
#[derive(Debug, Clone)]
pub struct IdentityAllocator {
    next: i64,
}

impl IdentityAllocator {
    /// Start an allocator at `max(existing) + 1`, or 0 for an empty table.
    ///
    /// Every existing record must carry a non-negative id: a committed record
    /// without one means the main index is corrupt, and guessing a value would
    /// hand out duplicates.
    pub fn continuing<'a, I>(kind: ArtifactKind, existing: I) -> Result<Self, MergeError>
    where
        I: IntoIterator<Item = (&'a str, Option<i64>)>,
    {
        let mut max: Option<i64> = None;
        for (record, id) in existing {
            let Some(id) = id else {
                return Err(MergeError::missing(kind, record, "human_readable_id"));
            };
            if id < 0 {
                return Err(MergeError::CorruptField {
                    kind,
                    record: record.to_string(),
                    field: "human_readable_id",
                    problem: format!("is negative ({id})"),
                });
            }
            max = Some(max.map_or(id, |m| m.max(id)));
        }
        Ok(Self {
            next: max.map_or(0, |m| m + 1),
        })
    }

    pub fn allocate(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_starts_at_zero() {
        let mut alloc = IdentityAllocator::continuing(ArtifactKind::Entity, []).unwrap();
        assert_eq!(alloc.allocate(), 0);
        assert_eq!(alloc.allocate(), 1);
    }

    #[test]
    fn continues_after_max_not_len() {
        let existing = [("a", Some(0)), ("b", Some(7)), ("c", Some(3))];
        let mut alloc = IdentityAllocator::continuing(ArtifactKind::TextUnit, existing).unwrap();
        assert_eq!(alloc.allocate(), 8);
    }

    #[test]
    fn missing_id_is_corrupt_data() {
        let existing = [("a", Some(0)), ("b", None)];
        let err = IdentityAllocator::continuing(ArtifactKind::Relationship, existing).unwrap_err();
        assert_eq!(
            err,
            MergeError::missing(ArtifactKind::Relationship, "b", "human_readable_id")
        );
    }

    #[test]
    fn negative_id_is_corrupt_data() {
        let err =
            IdentityAllocator::continuing(ArtifactKind::Claim, [("x", Some(-3))]).unwrap_err();
        assert!(matches!(err, MergeError::CorruptField { field: "human_readable_id", .. }));
    }
}
