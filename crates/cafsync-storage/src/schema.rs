//! Local development schema. Production MySQL tables are created by separate migrations;
//! these definitions mirror them closely enough for the importers.

/// A table the SQLite store creates on connect.
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub create: &'static str,
    /// Columns whose absence marks a table as created by an older layout.
    pub required: &'static [&'static str],
    /// Tables holding foreign keys to this one; dropped before it.
    pub children: &'static [&'static str],
}

/// Creation order: parents before children.
pub const TABLES: &[TableDef] = &[
    TableDef {
        name: "caf_user",
        create: "CREATE TABLE IF NOT EXISTS caf_user (
            id_user INTEGER PRIMARY KEY AUTOINCREMENT,
            cafnum_user TEXT UNIQUE
        )",
        required: &["id_user", "cafnum_user"],
        children: &[
            "formation_validation_formation",
            "formation_validation_brevet",
            "formation_validation_niveau_pratique",
            "formation_validation_groupe_competence",
        ],
    },
    TableDef {
        name: "formation_referentiel_formation",
        create: "CREATE TABLE IF NOT EXISTS formation_referentiel_formation (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code_formation TEXT NOT NULL UNIQUE,
            intitule TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        required: &["id", "code_formation", "intitule"],
        children: &["formation_commission_formation"],
    },
    TableDef {
        name: "formation_referentiel_brevet",
        create: "CREATE TABLE IF NOT EXISTS formation_referentiel_brevet (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code_brevet TEXT NOT NULL UNIQUE,
            intitule TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        required: &["id", "code_brevet", "intitule"],
        children: &["formation_validation_brevet", "formation_commission_brevet"],
    },
    TableDef {
        name: "formation_referentiel_niveau_pratique",
        create: "CREATE TABLE IF NOT EXISTS formation_referentiel_niveau_pratique (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cursus_niveau_id INTEGER NOT NULL UNIQUE,
            code_activite TEXT NOT NULL,
            activite TEXT NOT NULL,
            niveau TEXT NOT NULL,
            libelle TEXT NOT NULL,
            niveau_court TEXT,
            discipline TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        required: &["id", "cursus_niveau_id", "niveau_court", "discipline"],
        children: &[
            "formation_validation_niveau_pratique",
            "formation_commission_niveau_pratique",
        ],
    },
    TableDef {
        name: "formation_referentiel_groupe_competence",
        create: "CREATE TABLE IF NOT EXISTS formation_referentiel_groupe_competence (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            intitule TEXT NOT NULL,
            code_activite TEXT NOT NULL DEFAULT '',
            activite TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (intitule, code_activite)
        )",
        required: &["id", "intitule", "code_activite"],
        children: &[
            "formation_validation_groupe_competence",
            "formation_commission_groupe_competence",
        ],
    },
    TableDef {
        name: "formation_validation_formation",
        create: "CREATE TABLE IF NOT EXISTS formation_validation_formation (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            code_formation TEXT NOT NULL,
            valide INTEGER NOT NULL DEFAULT 1,
            date_validation DATE,
            numero_formation TEXT,
            formateur TEXT,
            lieu TEXT,
            date_debut DATE,
            date_fin DATE,
            id_interne TEXT NOT NULL DEFAULT '',
            intitule_formation TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (user_id, code_formation, id_interne),
            FOREIGN KEY (user_id) REFERENCES caf_user(id_user) ON DELETE CASCADE
        )",
        required: &["user_id", "code_formation", "id_interne", "lieu", "date_debut"],
        children: &[],
    },
    TableDef {
        name: "formation_validation_brevet",
        create: "CREATE TABLE IF NOT EXISTS formation_validation_brevet (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            brevet_id INTEGER NOT NULL,
            date_obtention DATE,
            date_recyclage DATE,
            date_edition DATE,
            date_formation_continue DATE,
            date_migration DATE,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (user_id, brevet_id),
            FOREIGN KEY (user_id) REFERENCES caf_user(id_user) ON DELETE CASCADE,
            FOREIGN KEY (brevet_id) REFERENCES formation_referentiel_brevet(id) ON DELETE CASCADE
        )",
        required: &["user_id", "brevet_id", "date_migration"],
        children: &[],
    },
    TableDef {
        name: "formation_validation_niveau_pratique",
        create: "CREATE TABLE IF NOT EXISTS formation_validation_niveau_pratique (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            niveau_id INTEGER NOT NULL,
            date_validation DATE,
            valide_par TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (user_id, niveau_id),
            FOREIGN KEY (user_id) REFERENCES caf_user(id_user) ON DELETE CASCADE,
            FOREIGN KEY (niveau_id) REFERENCES formation_referentiel_niveau_pratique(id) ON DELETE CASCADE
        )",
        required: &["user_id", "niveau_id", "valide_par"],
        children: &[],
    },
    TableDef {
        name: "formation_validation_groupe_competence",
        create: "CREATE TABLE IF NOT EXISTS formation_validation_groupe_competence (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            competence_id INTEGER NOT NULL,
            niveau_associe TEXT,
            date_validation DATE,
            est_valide INTEGER NOT NULL DEFAULT 0,
            valide_par TEXT,
            commentaire TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (user_id, competence_id),
            FOREIGN KEY (user_id) REFERENCES caf_user(id_user) ON DELETE CASCADE,
            FOREIGN KEY (competence_id) REFERENCES formation_referentiel_groupe_competence(id) ON DELETE CASCADE
        )",
        required: &["user_id", "competence_id", "est_valide"],
        children: &[],
    },
    TableDef {
        name: "formation_commission_formation",
        create: "CREATE TABLE IF NOT EXISTS formation_commission_formation (
            formation_id INTEGER NOT NULL,
            commission_id INTEGER NOT NULL,
            PRIMARY KEY (formation_id, commission_id),
            FOREIGN KEY (formation_id) REFERENCES formation_referentiel_formation(id) ON DELETE CASCADE
        )",
        required: &["formation_id", "commission_id"],
        children: &[],
    },
    TableDef {
        name: "formation_commission_brevet",
        create: "CREATE TABLE IF NOT EXISTS formation_commission_brevet (
            brevet_id INTEGER NOT NULL,
            commission_id INTEGER NOT NULL,
            PRIMARY KEY (brevet_id, commission_id),
            FOREIGN KEY (brevet_id) REFERENCES formation_referentiel_brevet(id) ON DELETE CASCADE
        )",
        required: &["brevet_id", "commission_id"],
        children: &[],
    },
    TableDef {
        name: "formation_commission_niveau_pratique",
        create: "CREATE TABLE IF NOT EXISTS formation_commission_niveau_pratique (
            niveau_id INTEGER NOT NULL,
            commission_id INTEGER NOT NULL,
            PRIMARY KEY (niveau_id, commission_id),
            FOREIGN KEY (niveau_id) REFERENCES formation_referentiel_niveau_pratique(id) ON DELETE CASCADE
        )",
        required: &["niveau_id", "commission_id"],
        children: &[],
    },
    TableDef {
        name: "formation_commission_groupe_competence",
        create: "CREATE TABLE IF NOT EXISTS formation_commission_groupe_competence (
            groupe_competence_id INTEGER NOT NULL,
            commission_id INTEGER NOT NULL,
            PRIMARY KEY (groupe_competence_id, commission_id),
            FOREIGN KEY (groupe_competence_id) REFERENCES formation_referentiel_groupe_competence(id) ON DELETE CASCADE
        )",
        required: &["groupe_competence_id", "commission_id"],
        children: &[],
    },
    TableDef {
        name: "formation_brevet_pattern_commission_mapping",
        create: "CREATE TABLE IF NOT EXISTS formation_brevet_pattern_commission_mapping (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            famille TEXT NOT NULL,
            code_pattern TEXT NOT NULL,
            exclude_pattern TEXT,
            commission_id INTEGER NOT NULL,
            priorite INTEGER NOT NULL DEFAULT 0,
            actif INTEGER NOT NULL DEFAULT 1,
            ruleset_version INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (famille, code_pattern, commission_id)
        )",
        required: &["famille", "code_pattern", "exclude_pattern", "ruleset_version"],
        children: &[],
    },
    TableDef {
        name: "formation_last_sync",
        create: "CREATE TABLE IF NOT EXISTS formation_last_sync (
            type TEXT PRIMARY KEY,
            last_sync DATETIME DEFAULT CURRENT_TIMESTAMP,
            records_count INTEGER DEFAULT 0
        )",
        required: &["type", "last_sync", "records_count"],
        children: &[],
    },
];

/// Tables holding data this tool does not own. An outdated layout is reported, never
/// dropped.
pub const PRESERVED: &[&str] = &["caf_user"];

pub fn is_preserved(name: &str) -> bool {
    PRESERVED.contains(&name)
}

pub fn table(name: &str) -> Option<&'static TableDef> {
    TABLES.iter().find(|t| t.name == name)
}

/// `root` followed by every table that transitively depends on it, children before
/// parents, each listed once.
pub fn drop_order(root: &str) -> Vec<&'static str> {
    fn visit(name: &str, out: &mut Vec<&'static str>) {
        let Some(def) = table(name) else {
            return;
        };
        for child in def.children {
            visit(child, out);
        }
        if !out.contains(&def.name) {
            out.push(def.name);
        }
    }

    let mut out = Vec::new();
    visit(root, &mut out);
    out
}
