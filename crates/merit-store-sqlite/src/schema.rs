//! SQL schema for the reference store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS lecturers (
    lecturer_id TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS students (
    student_id  TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL UNIQUE,
    advisor_id  TEXT REFERENCES lecturers(lecturer_id)
);

-- One row per achievement. Rows are never removed; deletion sets deleted_at.
CREATE TABLE IF NOT EXISTS achievement_references (
    reference_id    TEXT PRIMARY KEY,
    student_id      TEXT NOT NULL,
    content_id      TEXT NOT NULL UNIQUE,
    status          TEXT NOT NULL
                    CHECK (status IN ('draft', 'submitted', 'verified', 'rejected')),
    submitted_at    TEXT,
    verified_at     TEXT,
    verified_by     TEXT,
    rejection_note  TEXT,
    created_at      TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    updated_at      TEXT NOT NULL,
    deleted_at      TEXT
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS status_changes (
    change_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    reference_id  TEXT NOT NULL REFERENCES achievement_references(reference_id),
    from_status   TEXT,
    to_status     TEXT NOT NULL,
    actor         TEXT NOT NULL,
    note          TEXT,
    changed_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS references_student_idx ON achievement_references(student_id);
CREATE INDEX IF NOT EXISTS references_status_idx  ON achievement_references(status);
CREATE INDEX IF NOT EXISTS changes_reference_idx  ON status_changes(reference_id);

PRAGMA user_version = 1;
";
