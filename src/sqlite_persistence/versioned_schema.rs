use anyhow::{bail, Result};
use rusqlite::{params, types::Type, Connection};

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

/// Offset applied to `PRAGMA user_version` so that a database created by
/// something else is never mistaken for one of ours.
pub const BASE_DB_VERSION: usize = 99999;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Only mutated when optional field assignments are passed
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn sql_name(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }
}

#[allow(unused)]
pub enum ForeignKeyOnChange {
    NoAction,
    Restrict,
    SetNull,
    SetDefault,
    Cascade,
}

impl ForeignKeyOnChange {
    fn sql_name(&self) -> &'static str {
        match self {
            ForeignKeyOnChange::NoAction => "NO ACTION",
            ForeignKeyOnChange::Restrict => "RESTRICT",
            ForeignKeyOnChange::SetNull => "SET NULL",
            ForeignKeyOnChange::SetDefault => "SET DEFAULT",
            ForeignKeyOnChange::Cascade => "CASCADE",
        }
    }
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: ForeignKeyOnChange,
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<S>,
    pub foreign_key: Option<&'a ForeignKey>,
}

impl<S: AsRef<str>> Column<'_, S> {
    /// Column definition as it appears in CREATE TABLE and ALTER TABLE ADD COLUMN.
    pub fn definition(&self) -> String {
        let mut sql = format!("{} {}", self.name.as_ref(), self.sql_type.sql_name());
        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.non_null {
            sql.push_str(" NOT NULL");
        }
        if self.is_unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default_value) = &self.default_value {
            sql.push_str(&format!(" DEFAULT {}", default_value.as_ref()));
        }
        if let Some(foreign_key) = self.foreign_key {
            sql.push_str(&format!(
                " REFERENCES {}({}) ON DELETE {}",
                foreign_key.foreign_table,
                foreign_key.foreign_column,
                foreign_key.on_delete.sql_name()
            ));
        }
        sql
    }
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut create_sql = format!("CREATE TABLE {} (", self.name);
        let definitions: Vec<String> = self.columns.iter().map(|c| c.definition()).collect();
        create_sql.push_str(&definitions.join(", "));
        for unique_constraint in self.unique_constraints {
            create_sql.push_str(&format!(", UNIQUE ({})", unique_constraint.join(", ")));
        }
        create_sql.push_str(");");
        conn.execute(&create_sql, params![])?;
        self.create_indices(conn)
    }

    /// Creates the table only if it is not there yet. Migration steps use this
    /// so that re-running a step on an already upgraded database is a no-op.
    pub fn create_if_missing(&self, conn: &Connection) -> Result<bool> {
        if table_exists(conn, self.name)? {
            return Ok(false);
        }
        self.create(conn)?;
        Ok(true)
    }

    pub fn create_indices(&self, conn: &Connection) -> Result<()> {
        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }

    /// Adds the named column to an existing table using the same definition
    /// the table would be created with. Does nothing if the column exists.
    pub fn add_column_if_missing(&self, conn: &Connection, column_name: &str) -> Result<bool> {
        let Some(column) = self.columns.iter().find(|c| c.name == column_name) else {
            bail!("Table {} has no column named {}", self.name, column_name);
        };
        if column_exists(conn, self.name, column_name)? {
            return Ok(false);
        }
        conn.execute(
            &format!("ALTER TABLE {} ADD COLUMN {}", self.name, column.definition()),
            params![],
        )?;
        Ok(true)
    }

    pub fn column(&self, name: &str) -> Option<&Column<'static, &'static str>> {
        self.columns.iter().find(|c| c.name == name)
    }
}

pub fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        params![table_name],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

pub fn column_exists(conn: &Connection, table_name: &str, column_name: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table_name))?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;
    Ok(names.iter().any(|n| n == column_name))
}

/// Reads the schema version stored in `PRAGMA user_version`, with the base
/// offset removed. Returns `None` for a database that was never stamped.
pub fn read_schema_version(conn: &Connection) -> Result<Option<usize>> {
    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if raw_version == 0 {
        return Ok(None);
    }
    let version = raw_version - BASE_DB_VERSION as i64;
    if version < 0 {
        bail!("Database user_version {} is not a library schema version", raw_version);
    }
    Ok(Some(version as usize))
}

pub fn write_schema_version(conn: &Connection, version: usize) -> Result<()> {
    conn.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + version),
        [],
    )?;
    Ok(())
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
    /// Set on versions whose upgrade changes the meaning of tag-derived data,
    /// so that existing rows need a full tag rescan even if no table changed.
    pub tag_rescan: bool,
}

fn strip_leading_and_trailing_parentheses<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    if s.starts_with('(') && s.ends_with(')') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

struct ActualFk {
    from_column: String,
    to_table: String,
    to_column: String,
    on_delete: String,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for table in self.tables {
            table.create(conn)?;
        }
        write_schema_version(conn, self.version)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            Self::validate_columns(conn, table)?;
            Self::validate_indices(conn, table)?;
            Self::validate_unique_constraints(conn, table)?;
            Self::validate_foreign_keys(conn, table)?;
        }
        Ok(())
    }

    fn validate_columns(conn: &Connection, table: &Table) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table.name))?;
        let actual_columns: Vec<Column<'_, String>> = stmt
            .query_map(params![], |row| {
                let name = row.get::<usize, String>(1)?;
                let sql_type = match row.get::<_, String>(2)?.as_str() {
                    "TEXT" => &SqlType::Text,
                    "INTEGER" => &SqlType::Integer,
                    "REAL" => &SqlType::Real,
                    "BLOB" => &SqlType::Blob,
                    _ => {
                        return Err(rusqlite::Error::InvalidColumnType(
                            2,
                            "".to_string(),
                            Type::Text,
                        ))
                    }
                };

                Ok(Column {
                    name,
                    sql_type,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get::<_, Option<String>>(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                    is_unique: false,
                    foreign_key: None,
                })
            })?
            .collect::<Result<_, _>>()?;

        if actual_columns.len() != table.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found column names: {}, expected: {}",
                table.name,
                actual_columns.len(),
                table.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.clone())
                    .collect::<Vec<String>>()
                    .join(", "),
                table
                    .columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual_column, expected_column) in actual_columns.iter().zip(table.columns.iter()) {
            if actual_column.name != expected_column.name {
                bail!(
                    "Table {} Column name mismatch: expected {}, got {}",
                    table.name,
                    expected_column.name,
                    actual_column.name
                );
            }
            if actual_column.sql_type != expected_column.sql_type {
                bail!(
                    "Table {} Column {} type mismatch: expected {:?}, got {:?}",
                    table.name,
                    expected_column.name,
                    expected_column.sql_type,
                    actual_column.sql_type
                );
            }
            if actual_column.non_null != expected_column.non_null {
                bail!(
                    "Table {} Column {} non-null mismatch: expected {}, got {}",
                    table.name,
                    expected_column.name,
                    expected_column.non_null,
                    actual_column.non_null
                );
            }

            // Default values might be wrapped in parentheses
            if actual_column
                .default_value
                .as_ref()
                .map(strip_leading_and_trailing_parentheses)
                != expected_column
                    .default_value
                    .map(strip_leading_and_trailing_parentheses)
            {
                bail!(
                    "Table {} Column {} default value mismatch: expected {:?}, got {:?}",
                    table.name,
                    expected_column.name,
                    expected_column.default_value,
                    actual_column.default_value
                );
            }
            if actual_column.is_primary_key != expected_column.is_primary_key {
                bail!(
                    "Table {} Column {} primary key mismatch: expected {}, got {}",
                    table.name,
                    expected_column.name,
                    expected_column.is_primary_key,
                    actual_column.is_primary_key
                );
            }
        }
        Ok(())
    }

    fn validate_indices(conn: &Connection, table: &Table) -> Result<()> {
        for (index_name, _columns) in table.indices {
            let index_exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, table.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);

            if !index_exists {
                bail!("Table {} is missing index '{}'", table.name, index_name);
            }
        }
        Ok(())
    }

    // SQLite stores unique constraints as indices with unique=1 in PRAGMA index_list
    fn validate_unique_constraints(conn: &Connection, table: &Table) -> Result<()> {
        if table.unique_constraints.is_empty() {
            return Ok(());
        }
        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", table.name))?;
        let unique_indices: Vec<String> = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let is_unique: i32 = row.get(2)?;
                Ok((name, is_unique))
            })?
            .filter_map(|r| r.ok())
            .filter(|(_, is_unique)| *is_unique == 1)
            .map(|(name, _)| name)
            .collect();

        let mut unique_index_columns: Vec<Vec<String>> = Vec::new();
        for index_name in &unique_indices {
            let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
            let mut cols: Vec<String> = idx_stmt
                .query_map([], |row| row.get::<_, String>(2))?
                .filter_map(|r| r.ok())
                .collect();
            cols.sort();
            unique_index_columns.push(cols);
        }

        for expected_columns in table.unique_constraints {
            let mut expected_sorted: Vec<&str> = expected_columns.to_vec();
            expected_sorted.sort();

            let found = unique_index_columns.iter().any(|actual_cols| {
                actual_cols.iter().map(|s| s.as_str()).collect::<Vec<_>>() == expected_sorted
            });

            if !found {
                bail!(
                    "Table {} is missing unique constraint on columns ({})",
                    table.name,
                    expected_columns.join(", ")
                );
            }
        }
        Ok(())
    }

    // PRAGMA foreign_key_list returns: id, seq, table, from, to, on_update, on_delete, match
    fn validate_foreign_keys(conn: &Connection, table: &Table) -> Result<()> {
        let mut fk_stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", table.name))?;
        let actual_fks: Vec<ActualFk> = fk_stmt
            .query_map([], |row| {
                Ok(ActualFk {
                    from_column: row.get(3)?,
                    to_table: row.get(2)?,
                    to_column: row.get(4)?,
                    on_delete: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        for column in table.columns {
            let Some(expected_fk) = column.foreign_key else {
                continue;
            };
            let expected_on_delete = expected_fk.on_delete.sql_name();
            let found = actual_fks.iter().any(|actual| {
                actual.from_column == column.name
                    && actual.to_table == expected_fk.foreign_table
                    && actual.to_column == expected_fk.foreign_column
                    && actual.on_delete == expected_on_delete
            });
            if found {
                continue;
            }
            match actual_fks.iter().find(|a| a.from_column == column.name) {
                Some(actual) => bail!(
                    "Table {} column {} has foreign key mismatch: expected REFERENCES {}({}) ON DELETE {}, got REFERENCES {}({}) ON DELETE {}",
                    table.name,
                    column.name,
                    expected_fk.foreign_table,
                    expected_fk.foreign_column,
                    expected_on_delete,
                    actual.to_table,
                    actual.to_column,
                    actual.on_delete
                ),
                None => bail!(
                    "Table {} column {} is missing foreign key: expected REFERENCES {}({}) ON DELETE {}",
                    table.name,
                    column.name,
                    expected_fk.foreign_table,
                    expected_fk.foreign_column,
                    expected_on_delete
                ),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENRE_TABLE: Table = Table {
        name: "genre",
        columns: &[
            sqlite_column!("genre_id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("name", &SqlType::Text, non_null = true),
        ],
        indices: &[("idx_genre_name", "name")],
        unique_constraints: &[&["name"]],
    };

    const GENRE_FK: ForeignKey = ForeignKey {
        foreign_table: "genre",
        foreign_column: "genre_id",
        on_delete: ForeignKeyOnChange::Cascade,
    };

    const SONG_GENRE_TABLE: Table = Table {
        name: "song_genre",
        columns: &[
            sqlite_column!("song_id", &SqlType::Integer, non_null = true),
            sqlite_column!(
                "genre_id",
                &SqlType::Integer,
                non_null = true,
                foreign_key = Some(&GENRE_FK)
            ),
            sqlite_column!(
                "ordinal",
                &SqlType::Integer,
                non_null = true,
                default_value = Some("0")
            ),
        ],
        indices: &[],
        unique_constraints: &[&["song_id", "genre_id"]],
    };

    fn schema(tables: &'static [Table]) -> VersionedSchema {
        VersionedSchema {
            version: 1,
            tables,
            migration: None,
            tag_rescan: false,
        }
    }

    #[test]
    fn test_create_then_validate() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = schema(&[GENRE_TABLE, SONG_GENRE_TABLE]);
        schema.create(&conn).unwrap();
        schema.validate(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(1));
    }

    #[test]
    fn test_unstamped_database_has_no_version() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }

    #[test]
    fn test_validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE genre (genre_id INTEGER PRIMARY KEY, name TEXT NOT NULL, UNIQUE (name))",
            [],
        )
        .unwrap();

        let err_msg = schema(&[GENRE_TABLE])
            .validate(&conn)
            .unwrap_err()
            .to_string();
        assert!(err_msg.contains("missing index"));
        assert!(err_msg.contains("idx_genre_name"));
    }

    #[test]
    fn test_validate_detects_missing_unique_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE genre (genre_id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_genre_name ON genre(name)", [])
            .unwrap();

        let err_msg = schema(&[GENRE_TABLE])
            .validate(&conn)
            .unwrap_err()
            .to_string();
        assert!(err_msg.contains("missing unique constraint"));
    }

    #[test]
    fn test_validate_detects_wrong_on_delete_action() {
        let conn = Connection::open_in_memory().unwrap();
        GENRE_TABLE.create(&conn).unwrap();
        conn.execute(
            "CREATE TABLE song_genre (
                song_id INTEGER NOT NULL,
                genre_id INTEGER NOT NULL REFERENCES genre(genre_id) ON DELETE SET NULL,
                ordinal INTEGER NOT NULL DEFAULT 0,
                UNIQUE (song_id, genre_id)
            )",
            [],
        )
        .unwrap();

        let err_msg = schema(&[GENRE_TABLE, SONG_GENRE_TABLE])
            .validate(&conn)
            .unwrap_err()
            .to_string();
        assert!(err_msg.contains("foreign key mismatch"));
        assert!(err_msg.contains("CASCADE"));
        assert!(err_msg.contains("SET NULL"));
    }

    #[test]
    fn test_validate_detects_default_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        GENRE_TABLE.create(&conn).unwrap();
        conn.execute(
            "CREATE TABLE song_genre (
                song_id INTEGER NOT NULL,
                genre_id INTEGER NOT NULL REFERENCES genre(genre_id) ON DELETE CASCADE,
                ordinal INTEGER NOT NULL DEFAULT 1,
                UNIQUE (song_id, genre_id)
            )",
            [],
        )
        .unwrap();

        let err_msg = schema(&[GENRE_TABLE, SONG_GENRE_TABLE])
            .validate(&conn)
            .unwrap_err()
            .to_string();
        assert!(err_msg.contains("default value mismatch"));
    }

    #[test]
    fn test_add_column_if_missing_matches_table_definition() {
        let conn = Connection::open_in_memory().unwrap();
        GENRE_TABLE.create(&conn).unwrap();
        conn.execute(
            "CREATE TABLE song_genre (
                song_id INTEGER NOT NULL,
                genre_id INTEGER NOT NULL REFERENCES genre(genre_id) ON DELETE CASCADE,
                UNIQUE (song_id, genre_id)
            )",
            [],
        )
        .unwrap();

        assert!(SONG_GENRE_TABLE
            .add_column_if_missing(&conn, "ordinal")
            .unwrap());
        assert!(!SONG_GENRE_TABLE
            .add_column_if_missing(&conn, "ordinal")
            .unwrap());
        schema(&[GENRE_TABLE, SONG_GENRE_TABLE])
            .validate(&conn)
            .unwrap();
    }

    #[test]
    fn test_create_if_missing_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(GENRE_TABLE.create_if_missing(&conn).unwrap());
        assert!(!GENRE_TABLE.create_if_missing(&conn).unwrap());
        assert!(table_exists(&conn, "genre").unwrap());
        assert!(column_exists(&conn, "genre", "name").unwrap());
        assert!(!column_exists(&conn, "genre", "missing").unwrap());
    }
}
