//! SQL schema for the document store.

pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- body holds the whole document as JSON. created_at is duplicated out of the
-- body so integrity scans can filter by age without parsing it.
CREATE TABLE IF NOT EXISTS documents (
    document_id TEXT PRIMARY KEY,
    student_id  TEXT NOT NULL,
    body        TEXT NOT NULL,
    created_at  TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS documents_created_idx ON documents(created_at);

PRAGMA user_version = 1;
";
