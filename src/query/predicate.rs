//! A small boolean expression tree rendered to SQL with positional
//! parameters.
//!
//! Column names and sub-select text come from the query builder, never from
//! callers. Every user-supplied value travels as a bound parameter.

use rusqlite::types::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `LIKE` with `\` as the escape character.
    Like,
}

impl CompareOp {
    fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Always,
    Never,
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    IsNotNull(String),
    In {
        column: String,
        values: Vec<Value>,
    },
    /// `EXISTS (SELECT 1 FROM <from> WHERE <correlation> AND <filter>)`.
    Exists {
        from: String,
        correlation: String,
        filter: Box<Predicate>,
    },
    /// `<column> IN (<select>)`, with `params` bound for the `?` in `select`.
    InSelect {
        column: String,
        select: String,
        params: Vec<Value>,
    },
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

/// Escapes `%`, `_` and `\` for use in a `LIKE` pattern.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl Predicate {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn like(column: impl Into<String>, pattern: String) -> Self {
        Self::compare(column, CompareOp::Like, pattern)
    }

    pub fn exists(
        from: impl Into<String>,
        correlation: impl Into<String>,
        filter: Predicate,
    ) -> Self {
        Predicate::Exists {
            from: from.into(),
            correlation: correlation.into(),
            filter: Box::new(filter),
        }
    }

    pub fn in_select(column: impl Into<String>, select: impl Into<String>, params: Vec<Value>) -> Self {
        Predicate::InSelect {
            column: column.into(),
            select: select.into(),
            params,
        }
    }

    /// Conjunction that drops `Always` and flattens nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Always, p) | (p, Predicate::Always) => p,
            (Predicate::Never, _) | (_, Predicate::Never) => Predicate::Never,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (p, Predicate::And(mut right)) => {
                right.insert(0, p);
                Predicate::And(right)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    /// Disjunction that drops `Never` and flattens nested `Or`s.
    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Never, p) | (p, Predicate::Never) => p,
            (Predicate::Always, _) | (_, Predicate::Always) => Predicate::Always,
            (Predicate::Or(mut left), Predicate::Or(right)) => {
                left.extend(right);
                Predicate::Or(left)
            }
            (Predicate::Or(mut left), p) => {
                left.push(p);
                Predicate::Or(left)
            }
            (p, Predicate::Or(mut right)) => {
                right.insert(0, p);
                Predicate::Or(right)
            }
            (left, right) => Predicate::Or(vec![left, right]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Predicate::Always => Predicate::Never,
            Predicate::Never => Predicate::Always,
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        predicates.into_iter().fold(Predicate::Always, Predicate::and)
    }

    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        predicates.into_iter().fold(Predicate::Never, Predicate::or)
    }

    pub fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Predicate::Always => sql.push_str("1 = 1"),
            Predicate::Never => sql.push_str("1 = 0"),
            Predicate::Compare { column, op, value } => {
                sql.push_str(column);
                sql.push(' ');
                sql.push_str(op.sql());
                sql.push_str(" ?");
                if *op == CompareOp::Like {
                    sql.push_str(" ESCAPE '\\'");
                }
                params.push(value.clone());
            }
            Predicate::IsNull(column) => {
                sql.push_str(column);
                sql.push_str(" IS NULL");
            }
            Predicate::IsNotNull(column) => {
                sql.push_str(column);
                sql.push_str(" IS NOT NULL");
            }
            Predicate::In { column, values } => {
                if values.is_empty() {
                    sql.push_str("1 = 0");
                    return;
                }
                sql.push_str(column);
                sql.push_str(" IN (");
                sql.push_str(&vec!["?"; values.len()].join(", "));
                sql.push(')');
                params.extend(values.iter().cloned());
            }
            Predicate::Exists {
                from,
                correlation,
                filter,
            } => {
                sql.push_str("EXISTS (SELECT 1 FROM ");
                sql.push_str(from);
                sql.push_str(" WHERE ");
                sql.push_str(correlation);
                if **filter != Predicate::Always {
                    sql.push_str(" AND (");
                    filter.render(sql, params);
                    sql.push(')');
                }
                sql.push(')');
            }
            Predicate::InSelect {
                column,
                select,
                params: select_params,
            } => {
                sql.push_str(column);
                sql.push_str(" IN (");
                sql.push_str(select);
                sql.push(')');
                params.extend(select_params.iter().cloned());
            }
            Predicate::Not(inner) => {
                sql.push_str("NOT (");
                inner.render(sql, params);
                sql.push(')');
            }
            Predicate::And(parts) => render_joined(parts, " AND ", "1 = 1", sql, params),
            Predicate::Or(parts) => render_joined(parts, " OR ", "1 = 0", sql, params),
        }
    }

    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        self.render(&mut sql, &mut params);
        (sql, params)
    }
}

fn render_joined(
    parts: &[Predicate],
    separator: &str,
    empty: &str,
    sql: &mut String,
    params: &mut Vec<Value>,
) {
    if parts.is_empty() {
        sql.push_str(empty);
        return;
    }
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sql.push_str(separator);
        }
        sql.push('(');
        part.render(sql, params);
        sql.push(')');
    }
}
