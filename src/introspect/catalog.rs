//! Catalog queries
//!
//! Each query reads PostgreSQL system catalogs, never user data. Queries are
//! scoped by table oid (passed as `int8[]`) or schema name (`text[]`), and
//! emit flat rows ordered so that rows of one entity are adjacent. Key
//! columns are unnested with their 1-based ordinality so no array values
//! cross the executor boundary.

use super::executor::Param;

/// A named catalog query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogQuery {
    pub name: &'static str,
    pub sql: &'static str,
}

pub const DEFAULT_SCHEMA: CatalogQuery = CatalogQuery {
    name: "default schema",
    sql: "SELECT current_schema()::text AS schema_name",
};

/// `$1`: schemas to scan (empty = every non-system schema)
pub const TABLES: CatalogQuery = CatalogQuery {
    name: "tables",
    sql: r#"
        SELECT
            c.oid::int8 AS table_id,
            n.nspname::text AS schema_name,
            c.relname::text AS table_name,
            c.relkind::text AS kind,
            obj_description(c.oid, 'pg_class') AS comment
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'v', 'm', 'f', 'p')
            AND NOT c.relispartition
            AND n.nspname NOT IN ('pg_catalog', 'information_schema')
            AND n.nspname NOT LIKE 'pg_toast%'
            AND n.nspname NOT LIKE 'pg_temp%'
            AND (cardinality($1::text[]) = 0 OR n.nspname = ANY($1::text[]))
            AND NOT EXISTS (
                SELECT 1 FROM pg_depend d
                WHERE d.classid = 'pg_class'::regclass
                    AND d.objid = c.oid
                    AND d.deptype = 'e'
            )
        ORDER BY n.nspname, c.relname
    "#,
};

/// `$1`: table oids
pub const COLUMNS: CatalogQuery = CatalogQuery {
    name: "columns",
    sql: r#"
        SELECT
            a.attrelid::int8 AS table_id,
            a.attnum::int8 AS attnum,
            a.attname::text AS column_name,
            t.typname::text AS type_name,
            tn.nspname::text AS type_schema,
            a.atttypmod::int8 AS type_modifier,
            NOT a.attnotnull AS is_nullable,
            pg_get_expr(d.adbin, d.adrelid) AS default_value,
            a.attidentity::text AS identity,
            a.attgenerated::text AS generated,
            CASE WHEN a.attcollation <> t.typcollation THEN co.collname::text END AS collation,
            col_description(a.attrelid, a.attnum) AS comment
        FROM pg_attribute a
        JOIN pg_type t ON t.oid = a.atttypid
        JOIN pg_namespace tn ON tn.oid = t.typnamespace
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        LEFT JOIN pg_collation co ON co.oid = a.attcollation
        WHERE a.attrelid::int8 = ANY($1::int8[])
            AND a.attnum > 0
            AND NOT a.attisdropped
        ORDER BY a.attrelid, a.attnum
    "#,
};

/// `$1`: table oids
pub const PRIMARY_KEYS: CatalogQuery = CatalogQuery {
    name: "primary keys",
    sql: r#"
        SELECT
            con.conrelid::int8 AS table_id,
            con.conname::text AS constraint_name,
            k.ord::int8 AS key_ordinal,
            k.attnum::int8 AS attnum
        FROM pg_constraint con
        CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
        WHERE con.contype = 'p'
            AND con.conrelid::int8 = ANY($1::int8[])
        ORDER BY con.conrelid, con.conname, k.ord
    "#,
};

/// `$1`: table oids
pub const UNIQUE_CONSTRAINTS: CatalogQuery = CatalogQuery {
    name: "unique constraints",
    sql: r#"
        SELECT
            con.conrelid::int8 AS table_id,
            con.conname::text AS constraint_name,
            k.ord::int8 AS key_ordinal,
            k.attnum::int8 AS attnum
        FROM pg_constraint con
        CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
        WHERE con.contype = 'u'
            AND con.conrelid::int8 = ANY($1::int8[])
        ORDER BY con.conrelid, con.conname, k.ord
    "#,
};

/// `$1`: table oids. Included (non-key) columns are left out; expression
/// keys come back with `attnum = 0`.
pub const INDEXES: CatalogQuery = CatalogQuery {
    name: "indexes",
    sql: r#"
        SELECT
            ix.indrelid::int8 AS table_id,
            i.relname::text AS index_name,
            ix.indisunique AS is_unique,
            am.amname::text AS method,
            pg_get_expr(ix.indpred, ix.indrelid) AS filter,
            k.ord::int8 AS key_ordinal,
            k.attnum::int8 AS attnum
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_am am ON am.oid = i.relam
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        WHERE ix.indrelid::int8 = ANY($1::int8[])
            AND NOT ix.indisprimary
            AND k.ord <= ix.indnkeyatts
        ORDER BY ix.indrelid, i.relname, k.ord
    "#,
};

/// `$1`: referencing table oids
pub const FOREIGN_KEYS: CatalogQuery = CatalogQuery {
    name: "foreign keys",
    sql: r#"
        SELECT
            con.conrelid::int8 AS table_id,
            con.conname::text AS constraint_name,
            con.confrelid::int8 AS principal_table_id,
            con.confdeltype::text AS on_delete,
            con.confupdtype::text AS on_update,
            k.ord::int8 AS key_ordinal,
            k.attnum::int8 AS attnum,
            k.principal_attnum::int8 AS principal_attnum
        FROM pg_constraint con
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
            WITH ORDINALITY AS k(attnum, principal_attnum, ord)
        WHERE con.contype = 'f'
            AND con.conrelid::int8 = ANY($1::int8[])
        ORDER BY con.conrelid, con.conname, k.ord
    "#,
};

/// Every user sequence, with the column that owns it (if any).
/// `owner_kind` is `a` for `OWNED BY` (serial) and `i` for identity columns.
pub const SEQUENCES: CatalogQuery = CatalogQuery {
    name: "sequences",
    sql: r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS sequence_name,
            t.typname::text AS type_name,
            s.seqstart AS start_value,
            s.seqincrement AS increment_by,
            s.seqmin AS min_value,
            s.seqmax AS max_value,
            s.seqcycle AS is_cyclic,
            dep.refobjid::int8 AS owner_table_id,
            dep.refobjsubid::int8 AS owner_attnum,
            dep.deptype::text AS owner_kind
        FROM pg_sequence s
        JOIN pg_class c ON c.oid = s.seqrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_type t ON t.oid = s.seqtypid
        LEFT JOIN pg_depend dep
            ON dep.classid = 'pg_class'::regclass
            AND dep.objid = c.oid
            AND dep.refclassid = 'pg_class'::regclass
            AND dep.refobjsubid > 0
            AND dep.deptype IN ('a', 'i')
        WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
            AND NOT EXISTS (
                SELECT 1 FROM pg_depend e
                WHERE e.classid = 'pg_class'::regclass
                    AND e.objid = c.oid
                    AND e.deptype = 'e'
            )
        ORDER BY n.nspname, c.relname
    "#,
};

/// `$1`: schemas to scan (empty = every non-system schema)
pub const ENUMS: CatalogQuery = CatalogQuery {
    name: "enums",
    sql: r#"
        SELECT
            n.nspname::text AS schema_name,
            t.typname::text AS enum_name,
            e.enumlabel::text AS enum_label
        FROM pg_type t
        JOIN pg_enum e ON e.enumtypid = t.oid
        JOIN pg_namespace n ON n.oid = t.typnamespace
        WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
            AND (cardinality($1::text[]) = 0 OR n.nspname = ANY($1::text[]))
        ORDER BY n.nspname, t.typname, e.enumsortorder
    "#,
};

pub const EXTENSIONS: CatalogQuery = CatalogQuery {
    name: "extensions",
    sql: r#"
        SELECT
            x.extname::text AS extension_name,
            n.nspname::text AS schema_name,
            x.extversion::text AS version
        FROM pg_extension x
        JOIN pg_namespace n ON n.oid = x.extnamespace
        WHERE x.extname <> 'plpgsql'
        ORDER BY x.extname
    "#,
};

/// Every query the builder issues, in issue order
pub const ALL: [CatalogQuery; 10] = [
    DEFAULT_SCHEMA,
    TABLES,
    COLUMNS,
    PRIMARY_KEYS,
    UNIQUE_CONSTRAINTS,
    INDEXES,
    FOREIGN_KEYS,
    SEQUENCES,
    ENUMS,
    EXTENSIONS,
];

/// Bind a schema list for [`TABLES`] / [`ENUMS`]
pub fn schema_params(schemas: &[String]) -> Vec<Param> {
    vec![Param::TextArray(schemas.to_vec())]
}

/// Bind a table oid list for the per-table queries
pub fn table_params(table_ids: &[i64]) -> Vec<Param> {
    vec![Param::IdArray(table_ids.to_vec())]
}

/// Whether a schema name belongs to PostgreSQL itself
pub fn is_system_schema(schema: &str) -> bool {
    schema == "pg_catalog"
        || schema == "information_schema"
        || schema.starts_with("pg_toast")
        || schema.starts_with("pg_temp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_names_are_unique() {
        for (i, a) in ALL.iter().enumerate() {
            for b in &ALL[i + 1..] {
                assert_ne!(a.name, b.name);
                assert_ne!(a.sql, b.sql);
            }
        }
    }

    #[test]
    fn test_scoped_queries_take_one_array_parameter() {
        for query in [COLUMNS, PRIMARY_KEYS, UNIQUE_CONSTRAINTS, INDEXES, FOREIGN_KEYS] {
            assert!(query.sql.contains("ANY($1::int8[])"), "{}", query.name);
            assert!(!query.sql.contains("$2"), "{}", query.name);
        }
        for query in [TABLES, ENUMS] {
            assert!(query.sql.contains("$1::text[]"), "{}", query.name);
        }
    }

    #[test]
    fn test_key_queries_preserve_declared_order() {
        for query in [PRIMARY_KEYS, UNIQUE_CONSTRAINTS, INDEXES, FOREIGN_KEYS] {
            assert!(query.sql.contains("WITH ORDINALITY"), "{}", query.name);
        }
    }

    #[test]
    fn test_system_schemas() {
        assert!(is_system_schema("pg_catalog"));
        assert!(is_system_schema("pg_toast_temp_1"));
        assert!(!is_system_schema("public"));
        assert!(!is_system_schema("pgsodium_masks"));
    }

    #[test]
    fn test_params() {
        assert_eq!(
            table_params(&[1, 2]),
            vec![Param::IdArray(vec![1, 2])]
        );
        assert_eq!(schema_params(&[]), vec![Param::TextArray(vec![])]);
    }
}
