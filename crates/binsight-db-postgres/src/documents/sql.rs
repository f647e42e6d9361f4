//! Compiles [`DocumentFilter`]s and sort keys to SQL over a `data jsonb` column.
//!
//! Every value is bound as a parameter; only `$n` placeholders are spliced
//! into the SQL text. The generated predicates follow the same semantics as
//! [`DocumentFilter::matches`]:
//!
//! - a missing path is SQL `NULL` and equals JSON `null`;
//! - equality on an array field also matches any element;
//! - ordering operators only compare numbers with numbers and strings with
//!   strings (byte order, `COLLATE "C"`);
//! - every predicate is total (never `NULL`), so `NOT` is plain negation.

use serde_json::Value;
use sqlx_core::query_scalar::QueryScalar;
use sqlx_postgres::{PgArguments, Postgres};

use binsight_storage::{DocumentFilter, FieldOp, SortKey};

/// A bound parameter of a compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Json(Value),
    Path(Vec<String>),
    Text(String),
    Int(i64),
}

#[derive(Clone, Copy)]
enum Bound {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Bound {
    fn operator(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// Accumulates parameters while SQL fragments are generated.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    params: Vec<SqlParam>,
}

impl SqlBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter and returns its placeholder.
    pub fn push(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    /// Returns the collected parameters in placeholder order.
    #[must_use]
    pub fn into_params(self) -> Vec<SqlParam> {
        self.params
    }

    /// Compiles a filter to a boolean SQL expression.
    pub fn filter(&mut self, filter: &DocumentFilter) -> String {
        match filter {
            DocumentFilter::And(clauses) => self.join(clauses, " AND ", "TRUE"),
            DocumentFilter::Or(clauses) => self.join(clauses, " OR ", "FALSE"),
            DocumentFilter::Nor(clauses) => {
                format!("NOT {}", self.join(clauses, " OR ", "FALSE"))
            }
            DocumentFilter::Field { path, op } => {
                let target = self.path(path);
                self.field(&target, op)
            }
        }
    }

    /// Compiles sort keys to an `ORDER BY` list, ending with the `_id` tie-break.
    pub fn order_by(&mut self, keys: &[SortKey]) -> String {
        let mut terms = Vec::with_capacity(keys.len() * 4 + 1);
        for key in keys {
            let x = self.path(&key.path);
            let direction = if key.is_descending() { "DESC" } else { "ASC" };
            terms.push(format!(
                "CASE WHEN {x} IS NULL THEN 0 \
                 WHEN jsonb_typeof({x}) = 'null' THEN 1 \
                 WHEN jsonb_typeof({x}) = 'number' THEN 2 \
                 WHEN jsonb_typeof({x}) = 'string' THEN 3 \
                 WHEN jsonb_typeof({x}) = 'boolean' THEN 4 \
                 WHEN jsonb_typeof({x}) = 'array' THEN 5 \
                 ELSE 6 END {direction}"
            ));
            terms.push(format!(
                "CASE WHEN jsonb_typeof({x}) = 'number' THEN ({x})::numeric END {direction}"
            ));
            terms.push(format!(
                "CASE WHEN jsonb_typeof({x}) = 'string' THEN ({x} #>> '{{}}') COLLATE \"C\" END {direction}"
            ));
            terms.push(format!("{x} {direction}"));
        }
        terms.push("id COLLATE \"C\" ASC".to_string());
        terms.join(", ")
    }

    fn join(&mut self, clauses: &[DocumentFilter], separator: &str, empty: &str) -> String {
        if clauses.is_empty() {
            return empty.to_string();
        }
        let parts: Vec<String> = clauses.iter().map(|c| self.filter(c)).collect();
        format!("({})", parts.join(separator))
    }

    fn path(&mut self, path: &str) -> String {
        let segments = path.split('.').map(str::to_string).collect();
        let placeholder = self.push(SqlParam::Path(segments));
        format!("(data #> {placeholder})")
    }

    fn field(&mut self, x: &str, op: &FieldOp) -> String {
        match op {
            FieldOp::Eq(value) => self.equals(x, value),
            FieldOp::Ne(value) => format!("NOT {}", self.equals(x, value)),
            FieldOp::In(options) => self.any_equals(x, options),
            FieldOp::Nin(options) => format!("NOT {}", self.any_equals(x, options)),
            FieldOp::Exists(true) => format!("({x} IS NOT NULL)"),
            FieldOp::Exists(false) => format!("({x} IS NULL)"),
            FieldOp::Gt(bound) => self.ordered(x, bound, Bound::Gt),
            FieldOp::Gte(bound) => self.ordered(x, bound, Bound::Gte),
            FieldOp::Lt(bound) => self.ordered(x, bound, Bound::Lt),
            FieldOp::Lte(bound) => self.ordered(x, bound, Bound::Lte),
        }
    }

    fn equals(&mut self, x: &str, value: &Value) -> String {
        let v = self.push(SqlParam::Json(value.clone()));
        let mut sql = format!(
            "(COALESCE({x} = {v}, FALSE) OR CASE WHEN jsonb_typeof({x}) = 'array' \
             THEN EXISTS (SELECT 1 FROM jsonb_array_elements({x}) AS e(v) WHERE e.v = {v}) \
             ELSE FALSE END"
        );
        if value.is_null() {
            sql.push_str(&format!(" OR {x} IS NULL"));
        }
        sql.push(')');
        sql
    }

    fn any_equals(&mut self, x: &str, options: &[Value]) -> String {
        if options.is_empty() {
            return "FALSE".to_string();
        }
        let parts: Vec<String> = options.iter().map(|o| self.equals(x, o)).collect();
        format!("({})", parts.join(" OR "))
    }

    fn ordered(&mut self, x: &str, bound: &Value, cmp: Bound) -> String {
        let operator = cmp.operator();
        let scalar = |this: &mut Self, e: &str| -> Option<String> {
            match bound {
                Value::Number(_) => {
                    let v = this.push(SqlParam::Json(bound.clone()));
                    Some(format!(
                        "CASE WHEN jsonb_typeof({e}) = 'number' THEN {e} {operator} {v} ELSE FALSE END"
                    ))
                }
                Value::String(s) => {
                    let v = this.push(SqlParam::Text(s.clone()));
                    Some(format!(
                        "CASE WHEN jsonb_typeof({e}) = 'string' \
                         THEN ({e} #>> '{{}}') COLLATE \"C\" {operator} ({v}::text) COLLATE \"C\" \
                         ELSE FALSE END"
                    ))
                }
                _ => None,
            }
        };
        let Some(direct) = scalar(self, x) else {
            return "FALSE".to_string();
        };
        let element = scalar(self, "e.v").unwrap_or_else(|| "FALSE".to_string());
        format!(
            "COALESCE(({direct}) OR CASE WHEN jsonb_typeof({x}) = 'array' \
             THEN EXISTS (SELECT 1 FROM jsonb_array_elements({x}) AS e(v) WHERE {element}) \
             ELSE FALSE END, FALSE)"
        )
    }
}

/// Binds compiled parameters to a scalar query.
pub fn bind_scalar<'q, O>(
    mut query: QueryScalar<'q, Postgres, O, PgArguments>,
    params: Vec<SqlParam>,
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Json(value) => query.bind(value),
            SqlParam::Path(path) => query.bind(path),
            SqlParam::Text(text) => query.bind(text),
            SqlParam::Int(n) => query.bind(n),
        };
    }
    query
}
