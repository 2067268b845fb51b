//! Full-text search index over published rules.
//!
//! Produces a SQLite database with an FTS5 index that the static search
//! front end queries directly:
//!
//! ```text
//! source_files  (id, filename, name, url)
//! rules_content (id, rule, source_file_id, line_number)
//! rules         FTS5 over rules_content.rule (external content)
//! ```
//!
//! The database is rebuilt from scratch on every run into a temporary
//! file and renamed over the previous one, so readers only ever see a
//! complete index.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{IndexConfig, Snapshot};
use crate::services::validator::rule_lines;

/// One indexed rule line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub rule: String,
    pub filename: String,
    /// 1-based position in the file as written
    pub line_number: usize,
}

/// Every rule line of every file in `snapshot`, in filename order.
pub fn index_entries(snapshot: &Snapshot) -> Vec<IndexEntry> {
    snapshot
        .iter()
        .flat_map(|(filename, file)| {
            rule_lines(file.syntax, &file.content).map(move |(line_number, rule)| IndexEntry {
                rule: rule.to_string(),
                filename: filename.clone(),
                line_number,
            })
        })
        .collect()
}

/// Counts for a built index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files: usize,
    pub rules: usize,
}

/// A search result resolved back to its file and line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub filename: String,
    pub line_number: usize,
    pub rule: String,
    /// bm25 rank; lower is more relevant
    pub rank: f64,
}

/// Builder for the search database.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    page_size: u32,
    fts_page_size: u32,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(&IndexConfig::default())
    }
}

impl IndexBuilder {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            page_size: config.page_size,
            fts_page_size: config.fts_page_size,
        }
    }

    /// Build the index for `snapshot` at `path`, replacing any existing one.
    pub fn build(&self, snapshot: &Snapshot, path: &Path) -> Result<IndexStats> {
        let tmp = temp_path(path);
        remove_if_exists(&tmp)?;

        let stats = self.write(snapshot, &tmp).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            AppError::index(format!("building {}: {}", path.display(), e))
        })?;

        std::fs::rename(&tmp, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            AppError::index(format!("replacing {}: {}", path.display(), e))
        })?;

        log::info!(
            "Search index: {} rules from {} files written to {}",
            stats.rules,
            stats.files,
            path.display()
        );
        Ok(stats)
    }

    fn write(&self, snapshot: &Snapshot, path: &Path) -> rusqlite::Result<IndexStats> {
        let mut db = Connection::open(path)?;
        db.execute_batch(&format!(
            "PRAGMA page_size = {};
             PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = DELETE;
             CREATE TABLE source_files (
                 id INTEGER PRIMARY KEY,
                 filename TEXT UNIQUE NOT NULL,
                 name TEXT NOT NULL,
                 url TEXT NOT NULL
             );
             CREATE TABLE rules_content (
                 id INTEGER PRIMARY KEY,
                 rule TEXT NOT NULL,
                 source_file_id INTEGER NOT NULL,
                 line_number INTEGER NOT NULL,
                 FOREIGN KEY (source_file_id) REFERENCES source_files(id)
             );",
            self.page_size
        ))?;

        let mut stats = IndexStats::default();
        let tx = db.transaction()?;
        {
            let mut insert_file =
                tx.prepare("INSERT INTO source_files (filename, name, url) VALUES (?1, ?2, ?3)")?;
            let mut insert_rule = tx.prepare(
                "INSERT INTO rules_content (rule, source_file_id, line_number) VALUES (?1, ?2, ?3)",
            )?;

            for (filename, file) in snapshot.iter() {
                insert_file.execute(params![filename, file.source, file.url])?;
                let file_id = tx.last_insert_rowid();
                for (line_number, rule) in rule_lines(file.syntax, &file.content) {
                    insert_rule.execute(params![rule, file_id, line_number as i64])?;
                    stats.rules += 1;
                }
                stats.files += 1;
            }
        }
        tx.commit()?;

        db.execute_batch(&format!(
            "CREATE VIRTUAL TABLE rules USING fts5(
                 rule,
                 content='rules_content',
                 content_rowid='id',
                 tokenize=\"unicode61 separators '-._#$,'\"
             );
             INSERT INTO rules(rules, rank) VALUES('pgsz', {});
             INSERT INTO rules(rowid, rule) SELECT id, rule FROM rules_content;
             INSERT INTO rules(rules) VALUES('optimize');
             VACUUM;",
            self.fts_page_size
        ))?;
        db.close().map_err(|(_, e)| e)?;

        Ok(stats)
    }
}

/// Turn free text into a safe FTS5 query: every term quoted, implicit AND.
///
/// Returns `None` when the query has no searchable terms.
pub fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| term.replace('"', ""))
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{term}\""))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

/// Run the front end's ranked query against an index file.
pub fn search(path: &Path, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let Some(fts) = fts_query(query) else {
        return Ok(Vec::new());
    };
    if !path.is_file() {
        return Err(AppError::index(format!("no index at {}", path.display())));
    }

    let db = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = db.prepare(
        "SELECT sf.filename, rc.line_number, rc.rule, bm25(rules) AS score
         FROM rules
         JOIN rules_content rc ON rc.id = rules.rowid
         JOIN source_files sf ON sf.id = rc.source_file_id
         WHERE rules MATCH ?1
         ORDER BY score
         LIMIT ?2",
    )?;

    let hits = stmt
        .query_map(params![fts, limit as i64], |row| {
            Ok(SearchHit {
                filename: row.get(0)?,
                line_number: row.get::<_, i64>(1)? as usize,
                rule: row.get(2)?,
                rank: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(hits)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::index(format!("removing {}: {}", path.display(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SnapshotFile, SourceSpec, SyntaxKind};
    use tempfile::TempDir;

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        let files = [
            (
                "easylist.txt",
                SyntaxKind::Adblock,
                "[Adblock Plus 2.0]\n! Title: EasyList\n||ads.example.com^\n\n##.banner-ad\n",
            ),
            (
                "hosts.txt",
                SyntaxKind::Hosts,
                "# hosts\n0.0.0.0 tracker.example.net\n0.0.0.0 ads.example.org\n",
            ),
        ];
        for (filename, syntax, content) in files {
            let spec = SourceSpec::new(
                filename.trim_end_matches(".txt"),
                format!("https://example.com/{filename}"),
                filename,
                syntax,
            );
            let count = rule_lines(syntax, content).count();
            snapshot.insert(filename, SnapshotFile::new(&spec, content.to_string(), count));
        }
        snapshot
    }

    #[test]
    fn test_index_entries_match_line_positions() {
        let entries = index_entries(&snapshot());
        let easylist: Vec<_> = entries
            .iter()
            .filter(|e| e.filename == "easylist.txt")
            .map(|e| (e.line_number, e.rule.as_str()))
            .collect();
        assert_eq!(easylist, vec![(3, "||ads.example.com^"), (5, "##.banner-ad")]);
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_build_and_search() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.db");

        let stats = IndexBuilder::default().build(&snapshot(), &path).unwrap();
        assert_eq!(stats, IndexStats { files: 2, rules: 4 });
        assert!(!tmp.path().join(".rules.db.tmp").exists());

        let hits = search(&path, "ads", 50).unwrap();
        let mut found: Vec<_> = hits
            .iter()
            .map(|h| (h.filename.as_str(), h.line_number))
            .collect();
        found.sort();
        assert_eq!(found, vec![("easylist.txt", 3), ("hosts.txt", 3)]);

        let hits = search(&path, "banner", 50).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rule, "##.banner-ad");
    }

    #[test]
    fn test_every_entry_is_indexed_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.db");
        let snapshot = snapshot();
        IndexBuilder::default().build(&snapshot, &path).unwrap();

        let db = Connection::open(&path).unwrap();
        let mut stmt = db
            .prepare(
                "SELECT rc.rule, sf.filename, rc.line_number FROM rules_content rc
                 JOIN source_files sf ON sf.id = rc.source_file_id
                 ORDER BY sf.filename, rc.line_number",
            )
            .unwrap();
        let rows: Vec<IndexEntry> = stmt
            .query_map([], |row| {
                Ok(IndexEntry {
                    rule: row.get(0)?,
                    filename: row.get(1)?,
                    line_number: row.get::<_, i64>(2)? as usize,
                })
            })
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(rows, index_entries(&snapshot));
    }

    #[test]
    fn test_rebuild_replaces_previous_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.db");
        let builder = IndexBuilder::default();

        builder.build(&snapshot(), &path).unwrap();
        let mut smaller = snapshot();
        smaller.remove("hosts.txt");
        let stats = builder.build(&smaller, &path).unwrap();

        assert_eq!(stats.files, 1);
        assert!(search(&path, "tracker", 10).unwrap().is_empty());
    }

    #[test]
    fn test_fts_query_sanitizes() {
        assert_eq!(fts_query("ads tracker").as_deref(), Some("\"ads\" \"tracker\""));
        assert_eq!(fts_query("a\"b OR").as_deref(), Some("\"ab\" \"OR\""));
        assert_eq!(fts_query("   "), None);
        assert_eq!(fts_query("\"\""), None);
    }

    #[test]
    fn test_search_empty_query_and_missing_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.db");
        assert!(search(&path, "  ", 10).unwrap().is_empty());
        assert!(matches!(search(&path, "ads", 10), Err(AppError::Index(_))));
    }
}
