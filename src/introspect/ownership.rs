//! Owned-sequence detection
//!
//! A serial-style column is a single-column primary key whose default is
//! `nextval(...)` on a sequence the catalog records as `OWNED BY` that very
//! column. Such a sequence is folded into the column instead of being listed.
//! Multi-column primary keys never qualify.

use crate::schema::TableId;

/// A column whose default advances the sequence under consideration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceReference {
    pub table: TableId,
    /// Column ordinal
    pub column: usize,
    /// The column is the only column of its table's primary key
    pub sole_primary_key: bool,
    /// The catalog records the sequence as owned by this column
    pub declared_owner: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOwnership {
    /// Fold the sequence into this column
    Owned { table: TableId, column: usize },
    /// List the sequence; referencing columns keep their default text
    Unowned,
    /// Several columns advance the sequence; list it
    Ambiguous { references: usize },
}

pub fn resolve_ownership(references: &[SequenceReference]) -> SequenceOwnership {
    match references {
        [] => SequenceOwnership::Unowned,
        [only] if only.sole_primary_key && only.declared_owner => SequenceOwnership::Owned {
            table: only.table,
            column: only.column,
        },
        [_] => SequenceOwnership::Unowned,
        many => SequenceOwnership::Ambiguous {
            references: many.len(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(column: usize, sole_primary_key: bool, declared_owner: bool) -> SequenceReference {
        SequenceReference {
            table: TableId(0),
            column,
            sole_primary_key,
            declared_owner,
        }
    }

    #[test]
    fn test_serial_primary_key_is_owned() {
        assert_eq!(
            resolve_ownership(&[reference(0, true, true)]),
            SequenceOwnership::Owned {
                table: TableId(0),
                column: 0
            }
        );
    }

    #[test]
    fn test_unreferenced_sequence_is_unowned() {
        assert_eq!(resolve_ownership(&[]), SequenceOwnership::Unowned);
    }

    #[test]
    fn test_shared_sequence_on_primary_key_is_unowned() {
        // DEFAULT nextval('some_sequence') without OWNED BY
        assert_eq!(
            resolve_ownership(&[reference(0, true, false)]),
            SequenceOwnership::Unowned
        );
    }

    #[test]
    fn test_non_key_or_composite_key_column_is_unowned() {
        assert_eq!(
            resolve_ownership(&[reference(2, false, true)]),
            SequenceOwnership::Unowned
        );
    }

    #[test]
    fn test_multiple_references_are_ambiguous() {
        assert_eq!(
            resolve_ownership(&[reference(0, true, true), reference(1, false, false)]),
            SequenceOwnership::Ambiguous { references: 2 }
        );
    }
}
