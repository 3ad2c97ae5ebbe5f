//! Table selection
//!
//! Patterns are exact, case-sensitive identifiers: `table` matches that
//! table name in every scanned schema, `schema.table` matches one table.
//! Identifiers containing dots can be double-quoted: `"my.schema"."t"`.

/// Split a possibly qualified identifier on unquoted dots.
///
/// Each part comes back with a flag telling whether it was double-quoted
/// (quotes removed, `""` unescaped). Returns `None` for empty parts or
/// unbalanced quotes.
pub(crate) fn split_qualified(input: &str) -> Option<Vec<(String, bool)>> {
    let mut parts = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        let mut part = String::new();
        let quoted = chars.peek() == Some(&'"');
        if quoted {
            chars.next();
            loop {
                match chars.next()? {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        part.push('"');
                    }
                    '"' => break,
                    c => part.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                part.push(c);
                chars.next();
            }
        }
        if part.is_empty() {
            return None;
        }
        parts.push((part, quoted));

        match chars.next() {
            None => return Some(parts),
            Some('.') => continue,
            Some(_) => return None,
        }
    }
}

/// A parsed table pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePattern {
    pub schema: Option<String>,
    pub table: String,
}

impl TablePattern {
    /// Parse `table` or `schema.table`. Anything that does not split into
    /// one or two identifiers is taken as a bare table name verbatim.
    pub fn parse(pattern: &str) -> Self {
        let parts = split_qualified(pattern).unwrap_or_default();
        let mut names = parts.into_iter().map(|(part, _)| part);
        match (names.next(), names.next(), names.next()) {
            (Some(table), None, None) => TablePattern {
                schema: None,
                table,
            },
            (Some(schema), Some(table), None) => TablePattern {
                schema: Some(schema),
                table,
            },
            _ => TablePattern {
                schema: None,
                table: pattern.to_string(),
            },
        }
    }

    pub fn matches(&self, schema: &str, table: &str) -> bool {
        self.table == table && self.schema.as_deref().map_or(true, |s| s == schema)
    }
}

/// Filters to apply during introspection
#[derive(Debug, Default, Clone)]
pub struct SelectionFilter {
    /// Only scan these schemas (empty = every non-system schema)
    pub schemas: Vec<String>,
    /// Only include tables matching one of these patterns (empty = all)
    pub tables: Vec<String>,
    /// Drop tables matching one of these patterns
    pub exclude: Vec<String>,
}

impl SelectionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    /// Check if a table should be included
    pub fn matches(&self, schema: &str, table: &str) -> bool {
        let included = self.tables.is_empty()
            || self
                .tables
                .iter()
                .any(|p| TablePattern::parse(p).matches(schema, table));

        included
            && !self
                .exclude
                .iter()
                .any(|p| TablePattern::parse(p).matches(schema, table))
    }

    /// Check if a schema is scanned at all
    pub fn scans_schema(&self, schema: &str) -> bool {
        self.schemas.is_empty() || self.schemas.iter().any(|s| s == schema)
    }

    /// Table patterns that match none of the given (schema, table) pairs
    pub fn unmatched_tables<'a, 'b>(
        &'a self,
        candidates: impl IntoIterator<Item = (&'b str, &'b str)> + Clone,
    ) -> Vec<&'a str> {
        self.tables
            .iter()
            .filter(|p| {
                let pattern = TablePattern::parse(p);
                !candidates
                    .clone()
                    .into_iter()
                    .any(|(schema, table)| pattern.matches(schema, table))
            })
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = SelectionFilter::new();
        assert!(filter.matches("public", "users"));
        assert!(filter.matches("db2", "k2"));
        assert!(filter.scans_schema("anything"));
    }

    #[test]
    fn test_bare_pattern_matches_any_schema() {
        let filter = SelectionFilter::new().with_tables(["k2"]);
        assert!(filter.matches("public", "k2"));
        assert!(filter.matches("db2", "k2"));
        assert!(!filter.matches("public", "kilimanjaro"));
    }

    #[test]
    fn test_qualified_pattern_matches_one_schema() {
        let filter = SelectionFilter::new().with_tables(["db2.k2"]);
        assert!(filter.matches("db2", "k2"));
        assert!(!filter.matches("public", "k2"));
    }

    #[test]
    fn test_matching_is_case_sensitive_and_exact() {
        let filter = SelectionFilter::new().with_tables(["Users"]);
        assert!(filter.matches("public", "Users"));
        assert!(!filter.matches("public", "users"));
        assert!(!filter.matches("public", "Users2"));

        let glob = SelectionFilter::new().with_tables(["user%"]);
        assert!(!glob.matches("public", "users"));
    }

    #[test]
    fn test_quoted_identifiers() {
        let filter = SelectionFilter::new().with_tables([r#""my.schema"."Odd""Name""#]);
        assert!(filter.matches("my.schema", "Odd\"Name"));
        assert!(!filter.matches("my", "schema"));
    }

    #[test]
    fn test_exclude_applies_after_include() {
        let filter = SelectionFilter::new()
            .with_tables(["users", "orders"])
            .with_exclude(["audit.users"]);
        assert!(filter.matches("public", "users"));
        assert!(!filter.matches("audit", "users"));
        assert!(filter.matches("public", "orders"));
        assert!(!filter.matches("public", "items"));
    }

    #[test]
    fn test_schema_scan() {
        let filter = SelectionFilter::new().with_schemas(["db2"]);
        assert!(filter.scans_schema("db2"));
        assert!(!filter.scans_schema("public"));
    }

    #[test]
    fn test_unmatched_tables() {
        let filter = SelectionFilter::new().with_tables(["k2", "db2.missing", "public.k2"]);
        let candidates = [("db2", "k2"), ("db2", "kilimanjaro")];
        assert_eq!(
            filter.unmatched_tables(candidates.iter().copied()),
            vec!["db2.missing", "public.k2"]
        );
    }

    #[test]
    fn test_pattern_parse() {
        assert_eq!(
            TablePattern::parse("a.b"),
            TablePattern {
                schema: Some("a".to_string()),
                table: "b".to_string()
            }
        );
        assert_eq!(TablePattern::parse("a.b.c").table, "a.b.c");
        assert_eq!(TablePattern::parse("\"open").table, "\"open");
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(
            split_qualified("s.\"T\""),
            Some(vec![("s".to_string(), false), ("T".to_string(), true)])
        );
        assert_eq!(split_qualified("a..b"), None);
        assert_eq!(split_qualified("\"a\"b"), None);
        assert_eq!(split_qualified(""), None);
    }
}
