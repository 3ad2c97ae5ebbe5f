//! Schema model
//!
//! These types are the output of introspection and the input of whatever
//! renders DDL or entity mappings. Tables live in a flat arena on
//! [`SchemaModel`]; cross references are stored as [`TableId`] handles and
//! column ordinals rather than pointers.

use std::fmt;

/// Stable handle of a table inside a [`SchemaModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub(crate) usize);

impl TableId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A complete introspected database schema
#[derive(Debug, Clone)]
pub struct SchemaModel {
    /// First schema on the connection's search path
    pub default_schema: String,
    pub tables: Vec<Table>,
    pub sequences: Vec<Sequence>,
    pub enums: Vec<EnumType>,
    pub extensions: Vec<Extension>,
}

impl SchemaModel {
    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0]
    }

    pub fn find_table(&self, schema: &str, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.schema == schema && t.name == name)
    }

    pub fn find_sequence(&self, schema: &str, name: &str) -> Option<&Sequence> {
        self.sequences
            .iter()
            .find(|s| s.schema == schema && s.name == name)
    }

    /// The table a column belongs to
    pub fn column_table(&self, column: &Column) -> &Table {
        self.table(column.table)
    }

    /// The referenced (principal) table of a foreign key
    pub fn principal(&self, fk: &ForeignKey) -> &Table {
        self.table(fk.principal_table)
    }

    /// Child/principal column pairs of a foreign key, in constraint order
    pub fn foreign_key_columns(&self, fk: &ForeignKey) -> Vec<(&Column, &Column)> {
        let child = self.table(fk.table);
        let principal = self.table(fk.principal_table);
        fk.columns
            .iter()
            .zip(&fk.principal_columns)
            .map(|(&c, &p)| (&child.columns[c], &principal.columns[p]))
            .collect()
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.tables.iter().flat_map(|t| t.foreign_keys.iter())
    }

    pub fn indexes(&self) -> impl Iterator<Item = &Index> {
        self.tables.iter().flat_map(|t| t.indexes.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Table,
    View,
    MaterializedView,
    ForeignTable,
    PartitionedTable,
}

impl TableKind {
    /// Map a `pg_class.relkind` code
    pub fn from_relkind(relkind: &str) -> Option<Self> {
        match relkind {
            "r" => Some(TableKind::Table),
            "v" => Some(TableKind::View),
            "m" => Some(TableKind::MaterializedView),
            "f" => Some(TableKind::ForeignTable),
            "p" => Some(TableKind::PartitionedTable),
            _ => None,
        }
    }
}

/// Database table (or view)
#[derive(Debug, Clone)]
pub struct Table {
    pub id: TableId,
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    pub comment: Option<String>,
    /// Columns in catalog order; `columns[i].ordinal == i`
    pub columns: Vec<Column>,
    pub primary_key: Option<PrimaryKey>,
    pub unique_constraints: Vec<UniqueConstraint>,
    pub indexes: Vec<Index>,
    /// Outgoing foreign keys
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key columns in declared key order
    pub fn primary_key_columns(&self) -> Vec<&Column> {
        match &self.primary_key {
            Some(pk) => pk.columns.iter().map(|&i| &self.columns[i]).collect(),
            None => Vec::new(),
        }
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A table column
#[derive(Debug, Clone)]
pub struct Column {
    /// Owning table
    pub table: TableId,
    pub name: String,
    /// 0-based position among the table's live columns
    pub ordinal: usize,
    /// Canonical store type, e.g. `numeric(5, 2)`
    pub store_type: String,
    pub is_nullable: bool,
    /// Raw default expression; cleared for serial-style columns
    pub default_value_sql: Option<String>,
    /// Expression of a stored generated column
    pub computed_column_sql: Option<String>,
    /// 1-based position within the primary key
    pub primary_key_ordinal: Option<usize>,
    /// Value comes from an owned sequence (serial or identity)
    pub generated_on_add: bool,
    pub identity: Option<Identity>,
    /// Collation, when it differs from the type's default
    pub collation: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityGeneration {
    Always,
    ByDefault,
}

/// Identity column definition (`GENERATED ... AS IDENTITY`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub generation: IdentityGeneration,
    pub bounds: SequenceBounds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub name: String,
    /// Column ordinals in key order
    pub columns: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<usize>,
}

/// Database index (primary key indexes are not listed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub table: TableId,
    pub name: String,
    pub is_unique: bool,
    /// Access method, e.g. `btree`
    pub method: String,
    /// Predicate of a partial index
    pub filter: Option<String>,
    /// Column ordinals in key order
    pub columns: Vec<usize>,
}

impl Index {
    pub fn columns<'t>(&self, table: &'t Table) -> Vec<&'t Column> {
        self.columns.iter().map(|&i| &table.columns[i]).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// Map a `pg_constraint.confdeltype` / `confupdtype` code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "a" => Some(ReferentialAction::NoAction),
            "r" => Some(ReferentialAction::Restrict),
            "c" => Some(ReferentialAction::Cascade),
            "n" => Some(ReferentialAction::SetNull),
            "d" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    /// Referencing (child) table
    pub table: TableId,
    pub principal_table: TableId,
    /// Child column ordinals, aligned with `principal_columns`
    pub columns: Vec<usize>,
    pub principal_columns: Vec<usize>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// Sequence parameters with type defaults normalized away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceBounds {
    pub start_value: Option<i64>,
    pub increment_by: i64,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub is_cyclic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub schema: String,
    pub name: String,
    pub store_type: String,
    pub bounds: SequenceBounds,
}

/// A custom enum type defined in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub schema: String,
    pub name: String,
    pub labels: Vec<String>,
}

/// An installed PostgreSQL extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: String,
    pub schema: String,
    pub version: String,
}
