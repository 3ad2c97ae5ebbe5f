//! Schema model builder
//!
//! One [`build_model`] call is one pass over the catalog: the default schema,
//! candidate tables, then per-table metadata scoped to the selected table
//! oids, then sequences, enums and extensions. Rows are linked by oid through
//! lookup maps that only live for the pass.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, error, info, trace, warn};

use super::catalog::{self, CatalogQuery};
use super::executor::{Executor, Param, Row};
use super::filter::SelectionFilter;
use super::normalize::{
    normalize_default, normalize_sequence_bounds, normalize_store_type, parse_nextval_target,
    NextvalTarget, TypeModifiers,
};
use super::ownership::{resolve_ownership, SequenceOwnership, SequenceReference};
use super::Introspector;
use crate::error::ReflectError;
use crate::schema::{
    Column, EnumType, Extension, ForeignKey, Identity, IdentityGeneration, Index, PrimaryKey,
    ReferentialAction, SchemaModel, Sequence, SequenceBounds, Table, TableId, TableKind,
    UniqueConstraint,
};

/// Used when the connection has no schema on its search path
const FALLBACK_SCHEMA: &str = "public";

/// Introspects the database behind an [`Executor`]
///
/// The builder borrows the executor for as long as it lives; each
/// [`Introspector::introspect`] call is an independent pass.
pub struct ModelBuilder<'a, E: Executor + ?Sized> {
    executor: &'a mut E,
}

impl<'a, E: Executor + ?Sized> ModelBuilder<'a, E> {
    pub fn new(executor: &'a mut E) -> Self {
        Self { executor }
    }
}

impl<E: Executor + ?Sized> Introspector for ModelBuilder<'_, E> {
    fn introspect(&mut self, filter: &SelectionFilter) -> Result<SchemaModel, ReflectError> {
        build_model(&mut *self.executor, filter)
    }
}

/// Read the schema model selected by `filter`.
///
/// Fails with [`ReflectError::Connection`] when a query cannot run and with
/// [`ReflectError::UnsupportedCatalogState`] when a row references an entity
/// the pass has not loaded. No partial model is returned.
pub fn build_model<E: Executor + ?Sized>(
    executor: &mut E,
    filter: &SelectionFilter,
) -> Result<SchemaModel, ReflectError> {
    info!(
        schemas = ?filter.schemas,
        tables = ?filter.tables,
        exclude = ?filter.exclude,
        "Starting schema introspection"
    );

    for schema in filter.schemas.iter().filter(|s| catalog::is_system_schema(s)) {
        warn!(schema = ?schema, "System schemas are never introspected");
    }

    let mut pass = Pass {
        executor,
        filter,
        default_schema: String::new(),
        tables: Vec::new(),
        oids: Vec::new(),
        kept: HashMap::new(),
        excluded: HashSet::new(),
        attnums: Vec::new(),
    };

    pass.load_default_schema()?;
    pass.load_tables()?;
    debug!(
        kept = ?pass.tables.len(),
        excluded = ?pass.excluded.len(),
        "Tables after filtering"
    );

    let ids = pass.oids.clone();
    pass.load_columns(&ids)?;
    pass.load_primary_keys(&ids)?;
    pass.load_unique_constraints(&ids)?;
    pass.load_indexes(&ids)?;
    pass.load_foreign_keys(&ids)?;
    let sequences = pass.load_sequences()?;
    let enums = pass.load_enums()?;
    let extensions = pass.load_extensions()?;

    let model = SchemaModel {
        default_schema: pass.default_schema,
        tables: pass.tables,
        sequences,
        enums,
        extensions,
    };

    info!(
        default_schema = ?model.default_schema,
        tables = ?model.tables.len(),
        sequences = ?model.sequences.len(),
        enums = ?model.enums.len(),
        "Schema introspection complete"
    );

    Ok(model)
}

/// Rows of one constraint or index, keyed by (table oid, name) and sorted by
/// key ordinal
type KeyGroups<'r> = BTreeMap<(i64, String), Vec<&'r Row>>;

fn group_keys<'r>(rows: &'r [Row], name_column: &str) -> Result<KeyGroups<'r>, ReflectError> {
    let mut ordered: BTreeMap<(i64, String), Vec<(i64, &'r Row)>> = BTreeMap::new();
    for row in rows {
        let key = (
            row.get_i64("table_id")?,
            row.get_str(name_column)?.to_string(),
        );
        ordered
            .entry(key)
            .or_default()
            .push((row.get_i64("key_ordinal")?, row));
    }

    Ok(ordered
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by_key(|(ordinal, _)| *ordinal);
            (key, members.into_iter().map(|(_, row)| row).collect())
        })
        .collect())
}

struct Pass<'a, E: Executor + ?Sized> {
    executor: &'a mut E,
    filter: &'a SelectionFilter,
    default_schema: String,
    tables: Vec<Table>,
    /// Catalog oid of each kept table, indexed by `TableId`
    oids: Vec<i64>,
    kept: HashMap<i64, TableId>,
    /// Candidates dropped by the table filter
    excluded: HashSet<i64>,
    /// attnum -> column ordinal, indexed by `TableId`
    attnums: Vec<HashMap<i64, usize>>,
}

impl<E: Executor + ?Sized> Pass<'_, E> {
    fn query(&mut self, query: CatalogQuery, params: &[Param]) -> Result<Vec<Row>, ReflectError> {
        trace!(query = query.name, "Running catalog query");
        let rows = self.executor.query(query.sql, params).map_err(|e| {
            error!(query = query.name, error = ?e, "Catalog query failed");
            e
        })?;
        trace!(query = query.name, rows = ?rows.len(), "Catalog query returned");
        Ok(rows)
    }

    /// Kept table of an oid, `None` for a table the filter dropped
    fn table_for(&self, query: CatalogQuery, oid: i64) -> Result<Option<TableId>, ReflectError> {
        if let Some(&id) = self.kept.get(&oid) {
            return Ok(Some(id));
        }
        if self.excluded.contains(&oid) {
            trace!(query = query.name, oid = ?oid, "Pruning row of excluded table");
            return Ok(None);
        }
        Err(ReflectError::catalog_state(
            query.name,
            format!("row references unknown table oid {oid}"),
        ))
    }

    fn column_for(&self, query: CatalogQuery, table: TableId, attnum: i64) -> Result<usize, ReflectError> {
        self.attnums[table.0].get(&attnum).copied().ok_or_else(|| {
            ReflectError::catalog_state(
                query.name,
                format!("table {} has no column with attnum {attnum}", self.tables[table.0]),
            )
        })
    }

    fn key_columns(
        &self,
        query: CatalogQuery,
        table: TableId,
        members: &[&Row],
        attnum_column: &str,
    ) -> Result<Vec<usize>, ReflectError> {
        members
            .iter()
            .map(|row| self.column_for(query, table, row.get_i64(attnum_column)?))
            .collect()
    }

    fn load_default_schema(&mut self) -> Result<(), ReflectError> {
        let rows = self.query(catalog::DEFAULT_SCHEMA, &[])?;
        let schema = match rows.first() {
            Some(row) => row.get_opt_str("schema_name")?.map(str::to_string),
            None => None,
        };
        self.default_schema = schema.unwrap_or_else(|| {
            warn!(fallback = FALLBACK_SCHEMA, "Search path has no schema, using fallback");
            FALLBACK_SCHEMA.to_string()
        });
        debug!(schema = ?self.default_schema, "Resolved default schema");
        Ok(())
    }

    fn load_tables(&mut self) -> Result<(), ReflectError> {
        let filter = self.filter;
        let rows = self.query(catalog::TABLES, &catalog::schema_params(&filter.schemas))?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let oid = row.get_i64("table_id")?;
            let schema = row.get_str("schema_name")?;
            let name = row.get_str("table_name")?;
            if !filter.scans_schema(schema) || catalog::is_system_schema(schema) {
                self.excluded.insert(oid);
                continue;
            }
            candidates.push((schema, name));

            if !filter.matches(schema, name) {
                debug!(schema = ?schema, table = ?name, "Table excluded by filter");
                self.excluded.insert(oid);
                continue;
            }

            let relkind = row.get_str("kind")?;
            let kind = TableKind::from_relkind(relkind).ok_or_else(|| {
                ReflectError::catalog_state(
                    catalog::TABLES.name,
                    format!("unsupported relkind '{relkind}' for {schema}.{name}"),
                )
            })?;

            let id = TableId(self.tables.len());
            debug!(schema = ?schema, table = ?name, kind = ?kind, "Introspecting table");
            self.kept.insert(oid, id);
            self.oids.push(oid);
            self.attnums.push(HashMap::new());
            self.tables.push(Table {
                id,
                schema: schema.to_string(),
                name: name.to_string(),
                kind,
                comment: row.get_opt_str("comment")?.map(str::to_string),
                columns: Vec::new(),
                primary_key: None,
                unique_constraints: Vec::new(),
                indexes: Vec::new(),
                foreign_keys: Vec::new(),
            });
        }

        for pattern in filter.unmatched_tables(candidates.iter().copied()) {
            warn!(pattern = ?pattern, "Table pattern matched no table");
        }
        Ok(())
    }

    fn load_columns(&mut self, ids: &[i64]) -> Result<(), ReflectError> {
        let rows = self.query(catalog::COLUMNS, &catalog::table_params(ids))?;

        let mut members = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(table) = self.table_for(catalog::COLUMNS, row.get_i64("table_id")?)? {
                members.push((table, row.get_i64("attnum")?, row));
            }
        }
        members.sort_by_key(|(table, attnum, _)| (*table, *attnum));

        for (table, attnum, row) in members {
            let ordinal = self.tables[table.0].columns.len();
            let column = self.column_from_row(table, ordinal, row)?;
            trace!(
                table = ?self.tables[table.0].name,
                column = ?column.name,
                store_type = ?column.store_type,
                is_nullable = ?column.is_nullable,
                default = ?column.default_value_sql,
                "Parsed column"
            );
            if self.attnums[table.0].insert(attnum, ordinal).is_some() {
                return Err(ReflectError::catalog_state(
                    catalog::COLUMNS.name,
                    format!("duplicate attnum {attnum} in {}", self.tables[table.0]),
                ));
            }
            self.tables[table.0].columns.push(column);
        }
        Ok(())
    }

    fn column_from_row(&self, table: TableId, ordinal: usize, row: &Row) -> Result<Column, ReflectError> {
        let type_name = row.get_str("type_name")?;
        let type_schema = row.get_str("type_schema")?;
        let modifiers = TypeModifiers::from_typmod(type_name, row.get_i64("type_modifier")?);
        let mut store_type = normalize_store_type(type_name, &modifiers);
        if type_schema != "pg_catalog" && type_schema != self.default_schema {
            store_type = format!("{type_schema}.{store_type}");
        }

        let default = row.get_opt_str("default_value")?;
        let computed = row.get_opt_str("generated")? == Some("s");
        let (default_value_sql, computed_column_sql) = match default {
            Some(expr) if computed => (None, Some(expr.to_string())),
            Some(expr) => (Some(normalize_default(expr)), None),
            None => (None, None),
        };

        let generation = match row.get_opt_str("identity")? {
            Some("a") => Some(IdentityGeneration::Always),
            Some("d") => Some(IdentityGeneration::ByDefault),
            _ => None,
        };
        // Bounds are filled in from the identity sequence later in the pass
        let identity = generation.map(|generation| Identity {
            generation,
            bounds: SequenceBounds {
                start_value: None,
                increment_by: 1,
                min_value: None,
                max_value: None,
                is_cyclic: false,
            },
        });

        Ok(Column {
            table,
            name: row.get_str("column_name")?.to_string(),
            ordinal,
            store_type,
            is_nullable: row.get_bool("is_nullable")?,
            default_value_sql,
            computed_column_sql,
            primary_key_ordinal: None,
            generated_on_add: identity.is_some(),
            identity,
            collation: row.get_opt_str("collation")?.map(str::to_string),
            comment: row.get_opt_str("comment")?.map(str::to_string),
        })
    }

    fn load_primary_keys(&mut self, ids: &[i64]) -> Result<(), ReflectError> {
        let query = catalog::PRIMARY_KEYS;
        let rows = self.query(query, &catalog::table_params(ids))?;

        for ((oid, name), members) in group_keys(&rows, "constraint_name")? {
            let Some(table) = self.table_for(query, oid)? else {
                continue;
            };
            let columns = self.key_columns(query, table, &members, "attnum")?;

            let entry = &mut self.tables[table.0];
            if let Some(existing) = &entry.primary_key {
                return Err(ReflectError::catalog_state(
                    query.name,
                    format!("{entry} has primary keys {} and {name}", existing.name),
                ));
            }
            for (position, &column) in columns.iter().enumerate() {
                entry.columns[column].primary_key_ordinal = Some(position + 1);
            }
            trace!(table = ?entry.name, primary_key = ?name, columns = ?columns, "Found primary key");
            entry.primary_key = Some(PrimaryKey { name, columns });
        }
        Ok(())
    }

    fn load_unique_constraints(&mut self, ids: &[i64]) -> Result<(), ReflectError> {
        let query = catalog::UNIQUE_CONSTRAINTS;
        let rows = self.query(query, &catalog::table_params(ids))?;

        for ((oid, name), members) in group_keys(&rows, "constraint_name")? {
            let Some(table) = self.table_for(query, oid)? else {
                continue;
            };
            let columns = self.key_columns(query, table, &members, "attnum")?;
            trace!(table = ?self.tables[table.0].name, constraint = ?name, "Found unique constraint");
            self.tables[table.0]
                .unique_constraints
                .push(UniqueConstraint { name, columns });
        }
        Ok(())
    }

    fn load_indexes(&mut self, ids: &[i64]) -> Result<(), ReflectError> {
        let query = catalog::INDEXES;
        let rows = self.query(query, &catalog::table_params(ids))?;

        for ((oid, name), members) in group_keys(&rows, "index_name")? {
            let Some(table) = self.table_for(query, oid)? else {
                continue;
            };

            let mut has_expression = false;
            for row in &members {
                has_expression |= row.get_i64("attnum")? == 0;
            }
            if has_expression {
                debug!(table = ?self.tables[table.0].name, index = ?name, "Skipping expression index");
                continue;
            }

            let first = members[0];
            let index = Index {
                table,
                is_unique: first.get_bool("is_unique")?,
                method: first.get_str("method")?.to_string(),
                filter: first.get_opt_str("filter")?.map(str::to_string),
                columns: self.key_columns(query, table, &members, "attnum")?,
                name,
            };
            trace!(table = ?self.tables[table.0].name, index = ?index.name, unique = ?index.is_unique, "Found index");
            self.tables[table.0].indexes.push(index);
        }
        Ok(())
    }

    fn load_foreign_keys(&mut self, ids: &[i64]) -> Result<(), ReflectError> {
        let query = catalog::FOREIGN_KEYS;
        let rows = self.query(query, &catalog::table_params(ids))?;

        for ((oid, name), members) in group_keys(&rows, "constraint_name")? {
            let Some(table) = self.table_for(query, oid)? else {
                continue;
            };

            let first = members[0];
            let principal_oid = first.get_i64("principal_table_id")?;
            let Some(&principal_table) = self.kept.get(&principal_oid) else {
                debug!(
                    table = ?self.tables[table.0].name,
                    foreign_key = ?name,
                    principal_oid = ?principal_oid,
                    "Dropping foreign key to unselected table"
                );
                continue;
            };

            let action = |column: &str| -> Result<ReferentialAction, ReflectError> {
                let code = first.get_str(column)?;
                ReferentialAction::from_code(code).ok_or_else(|| {
                    ReflectError::catalog_state(query.name, format!("unknown {column} action '{code}' on {name}"))
                })
            };
            let on_delete = action("on_delete")?;
            let on_update = action("on_update")?;

            let foreign_key = ForeignKey {
                table,
                principal_table,
                columns: self.key_columns(query, table, &members, "attnum")?,
                principal_columns: self.key_columns(query, principal_table, &members, "principal_attnum")?,
                on_delete,
                on_update,
                name,
            };
            trace!(
                table = ?self.tables[table.0].name,
                principal = ?self.tables[principal_table.0].name,
                foreign_key = ?foreign_key.name,
                "Found foreign key"
            );
            self.tables[table.0].foreign_keys.push(foreign_key);
        }
        Ok(())
    }

    /// Kept column a sequence row names as its owner
    fn sequence_owner(&self, row: &Row) -> Result<Option<(TableId, usize)>, ReflectError> {
        let (Some(oid), Some(attnum)) = (row.get_opt_i64("owner_table_id")?, row.get_opt_i64("owner_attnum")?) else {
            return Ok(None);
        };
        match self.kept.get(&oid) {
            Some(&table) => Ok(Some((table, self.column_for(catalog::SEQUENCES, table, attnum)?))),
            None => Ok(None),
        }
    }

    fn load_sequences(&mut self) -> Result<Vec<Sequence>, ReflectError> {
        let rows = self.query(catalog::SEQUENCES, &[])?;

        let nextval_columns: Vec<(TableId, usize, NextvalTarget)> = self
            .tables
            .iter()
            .flat_map(|t| {
                t.columns.iter().filter_map(move |c| {
                    let target = parse_nextval_target(c.default_value_sql.as_deref()?)?;
                    Some((t.id, c.ordinal, target))
                })
            })
            .collect();

        let mut sequences = Vec::new();
        for row in &rows {
            let schema = row.get_str("schema_name")?;
            let name = row.get_str("sequence_name")?;
            let type_name = row.get_str("type_name")?;
            let bounds = normalize_sequence_bounds(
                type_name,
                row.get_i64("start_value")?,
                row.get_i64("increment_by")?,
                row.get_i64("min_value")?,
                row.get_i64("max_value")?,
                row.get_bool("is_cyclic")?,
            );
            let owner_kind = row.get_opt_str("owner_kind")?;
            let owner = self.sequence_owner(row)?;

            if owner_kind == Some("i") {
                if let Some((table, column)) = owner {
                    let column = &mut self.tables[table.0].columns[column];
                    match column.identity.as_mut() {
                        Some(identity) => identity.bounds = bounds,
                        None => {
                            return Err(ReflectError::catalog_state(
                                catalog::SEQUENCES.name,
                                format!("identity sequence {schema}.{name} owned by non-identity column {}", column.name),
                            ))
                        }
                    }
                }
                continue;
            }

            let references: Vec<SequenceReference> = nextval_columns
                .iter()
                .filter(|(_, _, target)| target.refers_to(schema, name, &self.default_schema))
                .map(|&(table, column, _)| SequenceReference {
                    table,
                    column,
                    sole_primary_key: self.tables[table.0]
                        .primary_key
                        .as_ref()
                        .is_some_and(|pk| pk.columns == [column]),
                    declared_owner: owner_kind == Some("a") && owner == Some((table, column)),
                })
                .collect();

            // A kept column still advancing it keeps the sequence listed
            if let Some(oid) = row.get_opt_i64("owner_table_id")? {
                if self.excluded.contains(&oid) && references.is_empty() {
                    debug!(schema = ?schema, sequence = ?name, "Dropping sequence owned by excluded table");
                    continue;
                }
            }

            match resolve_ownership(&references) {
                SequenceOwnership::Owned { table, column } => {
                    let column = &mut self.tables[table.0].columns[column];
                    debug!(sequence = ?name, column = ?column.name, "Folding owned sequence into column");
                    column.generated_on_add = true;
                    column.default_value_sql = None;
                    continue;
                }
                SequenceOwnership::Ambiguous { references } => {
                    warn!(
                        schema = ?schema,
                        sequence = ?name,
                        references = ?references,
                        "Sequence is used by several columns, listing it explicitly"
                    );
                }
                SequenceOwnership::Unowned => {}
            }

            let in_scope = if self.filter.schemas.is_empty() {
                schema == self.default_schema
            } else {
                self.filter.scans_schema(schema)
            };
            if !in_scope {
                trace!(schema = ?schema, sequence = ?name, "Sequence outside schema scope");
                continue;
            }

            trace!(schema = ?schema, sequence = ?name, bounds = ?bounds, "Found sequence");
            sequences.push(Sequence {
                schema: schema.to_string(),
                name: name.to_string(),
                store_type: normalize_store_type(type_name, &TypeModifiers::default()),
                bounds,
            });
        }
        Ok(sequences)
    }

    fn load_enums(&mut self) -> Result<Vec<EnumType>, ReflectError> {
        let filter = self.filter;
        let rows = self.query(catalog::ENUMS, &catalog::schema_params(&filter.schemas))?;

        let mut enums: Vec<EnumType> = Vec::new();
        for row in &rows {
            let schema = row.get_str("schema_name")?;
            if !filter.scans_schema(schema) {
                continue;
            }
            let name = row.get_str("enum_name")?;
            let label = row.get_str("enum_label")?.to_string();

            if let Some(existing) = enums.iter_mut().find(|e| e.schema == schema && e.name == name) {
                existing.labels.push(label);
            } else {
                trace!(schema = ?schema, enum_name = ?name, "Found enum type");
                enums.push(EnumType {
                    schema: schema.to_string(),
                    name: name.to_string(),
                    labels: vec![label],
                });
            }
        }
        Ok(enums)
    }

    fn load_extensions(&mut self) -> Result<Vec<Extension>, ReflectError> {
        let rows = self.query(catalog::EXTENSIONS, &[])?;
        rows.iter()
            .map(|row| {
                Ok(Extension {
                    name: row.get_str("extension_name")?.to_string(),
                    schema: row.get_str("schema_name")?.to_string(),
                    version: row.get_str("version")?.to_string(),
                })
            })
            .collect()
    }
}
