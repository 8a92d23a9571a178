//! Database schema definitions

/// SQL to create the variables table
pub const CREATE_VARIABLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS variables (
    name TEXT PRIMARY KEY,
    id INTEGER NOT NULL
)
"#;

/// SQL to create the objects table
/// At most one of the *_val columns is populated; nested objects leave all of them null
pub const CREATE_OBJECTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS objects (
    id INTEGER PRIMARY KEY,
    type TEXT NOT NULL,
    bool_val INTEGER,
    int_val INTEGER,
    real_val REAL,
    txt_val TEXT
)
"#;

/// SQL to create the items table (parent -> child edges)
pub const CREATE_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id INTEGER NOT NULL,
    key TEXT,
    ind INTEGER,
    child_id INTEGER NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_items_ind ON items(id, ind)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_items_key ON items(id, key)",
    "CREATE INDEX IF NOT EXISTS idx_items_child ON items(child_id)",
    "CREATE INDEX IF NOT EXISTS idx_variables_id ON variables(id)",
    "CREATE INDEX IF NOT EXISTS idx_objects_int ON objects(type, int_val)",
    "CREATE INDEX IF NOT EXISTS idx_objects_txt ON objects(type, txt_val)",
];

/// Tables a relstore database must contain
pub const TABLES: &[&str] = &["variables", "objects", "items"];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_VARIABLES_TABLE,
        CREATE_OBJECTS_TABLE,
        CREATE_ITEMS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
