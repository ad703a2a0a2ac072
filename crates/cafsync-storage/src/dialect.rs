//! SQL rendering for the statements whose syntax differs between backends.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    MySql,
}

/// An insert that updates an existing row on a unique-key conflict.
///
/// `update` columns take the incoming value, `touch` columns are set to the current
/// timestamp. Every other column of an existing row is left alone.
#[derive(Debug, Clone, Copy)]
pub struct Upsert<'a> {
    pub table: &'a str,
    pub columns: &'a [&'a str],
    pub conflict: &'a [&'a str],
    pub update: &'a [&'a str],
    pub touch: &'a [&'a str],
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
        }
    }

    pub fn now(self) -> &'static str {
        match self {
            Dialect::Sqlite => "CURRENT_TIMESTAMP",
            Dialect::MySql => "NOW()",
        }
    }

    pub fn upsert(self, upsert: &Upsert<'_>) -> String {
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            upsert.table,
            upsert.columns.join(", "),
            placeholders(upsert.columns.len())
        );

        let excluded: fn(&str) -> String = match self {
            Dialect::Sqlite => |c: &str| format!("{c} = excluded.{c}"),
            Dialect::MySql => |c: &str| format!("{c} = VALUES({c})"),
        };
        let assignments: Vec<String> = upsert
            .update
            .iter()
            .map(|c| excluded(c))
            .chain(upsert.touch.iter().map(|c| format!("{c} = {}", self.now())))
            .collect();

        match self {
            Dialect::Sqlite if assignments.is_empty() => format!(
                "{insert} ON CONFLICT ({}) DO NOTHING",
                upsert.conflict.join(", ")
            ),
            Dialect::Sqlite => format!(
                "{insert} ON CONFLICT ({}) DO UPDATE SET {}",
                upsert.conflict.join(", "),
                assignments.join(", ")
            ),
            Dialect::MySql if assignments.is_empty() => {
                let key = upsert.conflict.first().copied().unwrap_or("id");
                format!("{insert} ON DUPLICATE KEY UPDATE {key} = {key}")
            }
            Dialect::MySql => {
                format!("{insert} ON DUPLICATE KEY UPDATE {}", assignments.join(", "))
            }
        }
    }

    /// Insert that silently does nothing when the row already exists.
    pub fn insert_ignore(self, table: &str, columns: &[&str]) -> String {
        let verb = match self {
            Dialect::Sqlite => "INSERT OR IGNORE",
            Dialect::MySql => "INSERT IGNORE",
        };
        format!(
            "{verb} INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders(columns.len())
        )
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BREVET: Upsert<'static> = Upsert {
        table: "formation_referentiel_brevet",
        columns: &["code_brevet", "intitule"],
        conflict: &["code_brevet"],
        update: &["intitule"],
        touch: &["updated_at"],
    };

    #[test]
    fn mysql_upsert_uses_duplicate_key_clause() {
        assert_eq!(
            Dialect::MySql.upsert(&BREVET),
            "INSERT INTO formation_referentiel_brevet (code_brevet, intitule) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE intitule = VALUES(intitule), updated_at = NOW()"
        );
    }

    #[test]
    fn sqlite_upsert_keeps_an_explicit_update_list() {
        let sql = Dialect::Sqlite.upsert(&BREVET);
        assert_eq!(
            sql,
            "INSERT INTO formation_referentiel_brevet (code_brevet, intitule) VALUES (?, ?) \
             ON CONFLICT (code_brevet) DO UPDATE SET intitule = excluded.intitule, \
             updated_at = CURRENT_TIMESTAMP"
        );
        assert!(!sql.contains("REPLACE"));
    }

    #[test]
    fn upsert_without_updates_degrades_to_a_no_op_on_conflict() {
        let upsert = Upsert {
            update: &[],
            touch: &[],
            ..BREVET
        };
        assert!(Dialect::Sqlite.upsert(&upsert).ends_with("DO NOTHING"));
        assert!(Dialect::MySql
            .upsert(&upsert)
            .ends_with("ON DUPLICATE KEY UPDATE code_brevet = code_brevet"));
    }

    #[test]
    fn insert_ignore_per_backend() {
        let columns = ["brevet_id", "commission_id"];
        assert_eq!(
            Dialect::MySql.insert_ignore("formation_commission_brevet", &columns),
            "INSERT IGNORE INTO formation_commission_brevet (brevet_id, commission_id) VALUES (?, ?)"
        );
        assert_eq!(
            Dialect::Sqlite.insert_ignore("formation_commission_brevet", &columns),
            "INSERT OR IGNORE INTO formation_commission_brevet (brevet_id, commission_id) VALUES (?, ?)"
        );
    }
}
