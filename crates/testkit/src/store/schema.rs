//! Logical schema of the simulated data store.
//!
//! The schema is static: tables and their foreign keys never change for the
//! lifetime of a store.

/// Rows are loosely typed JSON objects.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A declared reference from `column` to `references_table.references_column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references_table: &'static str,
    pub references_column: &'static str,
}

/// Columns and foreign keys of one logical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
}

impl TableSchema {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }
}

const CAMPAIGN_FK: &[ForeignKey] = &[ForeignKey {
    column: "campaign_id",
    references_table: "campaigns",
    references_column: "id",
}];

const SESSION_FK: &[ForeignKey] = &[ForeignKey {
    column: "session_id",
    references_table: "sessions",
    references_column: "id",
}];

/// Parents come before children.
const TABLES: &[TableSchema] = &[
    TableSchema {
        name: "campaigns",
        columns: &[
            "id",
            "name",
            "description",
            "setting",
            "status",
            "created_at",
            "updated_at",
        ],
        foreign_keys: &[],
    },
    TableSchema {
        name: "characters",
        columns: &[
            "id",
            "campaign_id",
            "name",
            "race",
            "class",
            "level",
            "backstory",
            "stats",
            "created_at",
        ],
        foreign_keys: CAMPAIGN_FK,
    },
    TableSchema {
        name: "sessions",
        columns: &[
            "id",
            "campaign_id",
            "name",
            "session_number",
            "status",
            "notes",
            "scheduled_at",
            "created_at",
        ],
        foreign_keys: CAMPAIGN_FK,
    },
    TableSchema {
        name: "events",
        columns: &[
            "id",
            "session_id",
            "title",
            "description",
            "event_type",
            "choices",
            "created_at",
        ],
        foreign_keys: SESSION_FK,
    },
    TableSchema {
        name: "quests",
        columns: &[
            "id",
            "campaign_id",
            "title",
            "description",
            "status",
            "reward",
            "created_at",
        ],
        foreign_keys: CAMPAIGN_FK,
    },
    TableSchema {
        name: "locations",
        columns: &[
            "id",
            "campaign_id",
            "name",
            "description",
            "location_type",
            "created_at",
        ],
        foreign_keys: CAMPAIGN_FK,
    },
    TableSchema {
        name: "ai_requests",
        columns: &[
            "id",
            "provider",
            "model",
            "prompt",
            "response",
            "tokens_used",
            "created_at",
        ],
        foreign_keys: &[],
    },
];

/// The full logical schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaDescriptor {
    tables: &'static [TableSchema],
}

impl SchemaDescriptor {
    /// The campaign schema used by the application.
    pub fn campaign() -> Self {
        Self { tables: TABLES }
    }

    pub fn tables(&self) -> &'static [TableSchema] {
        self.tables
    }

    pub fn table(&self, name: &str) -> Option<&'static TableSchema> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Foreign keys in other tables that point at `table`.
    pub fn referencing(&self, table: &str) -> Vec<(&'static TableSchema, ForeignKey)> {
        self.tables
            .iter()
            .flat_map(|child| child.foreign_keys.iter().map(move |fk| (child, *fk)))
            .filter(|(_, fk)| fk.references_table == table)
            .collect()
    }
}

impl Default for SchemaDescriptor {
    fn default() -> Self {
        Self::campaign()
    }
}
