mod index;
mod queue;
mod schema;

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::error::{HostError, HostResult};
use crate::hierarchy::{
    is_valid_feature_name, FeatureHierarchy, HistorySource, HostNavigator, NameEdit,
};
use crate::history::derive_deleted_features;
use crate::metrics::{compute_project_metrics, AnnotationRecord, MetricsProvider};
use crate::models::*;

use index::ModelIndex;
use queue::{EditJob, EditQueue};

/// Name given to the model root of a fresh database.
pub const DEFAULT_ROOT_NAME: &str = "Root";

/// SQLite-backed feature model.
///
/// Clones share one connection and one edit queue. Every call locks the
/// connection, so edits and metrics passes never interleave.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    edits: EditQueue,
}

impl Database {
    pub fn open(path: PathBuf) -> HostResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    pub fn open_default() -> HostResult<Self> {
        let path = default_db_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine data directory",
            )
        })?;
        Self::open(path)
    }

    pub fn open_memory() -> HostResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> HostResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let conn = Arc::new(Mutex::new(conn));
        let edits = EditQueue::start(conn.clone())?;
        Ok(Self { conn, edits })
    }

    /// Bring the schema up to date and make sure a model root exists.
    pub fn migrate(&self) -> HostResult<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)?;
        conn.execute(
            "INSERT INTO features (parent_id, name, position, created_at)
             SELECT NULL, ?, 0, ?
             WHERE NOT EXISTS (SELECT 1 FROM features WHERE parent_id IS NULL)",
            (DEFAULT_ROOT_NAME, Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    pub fn root(&self) -> HostResult<FeatureHandle> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let index = ModelIndex::load(&conn)?;
        index.handle(index.root_id())
    }

    /// Wait until every queued drop has been applied.
    pub fn flush_edits(&self) -> HostResult<()> {
        self.edits.flush()
    }

    // ============================================================
    // Seeding
    // ============================================================

    /// Replace the whole model (features, blocks and history) with `model`.
    pub fn import_model(&self, model: &ModelImport) -> HostResult<()> {
        validate_import(&model.root, &model.features)?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute("DELETE FROM features", [])?;
        tx.execute("DELETE FROM commits", [])?;
        tx.execute(
            "INSERT INTO features (parent_id, name, position, created_at) VALUES (NULL, ?, 0, ?)",
            (&model.root, &now),
        )?;
        let root_id = tx.last_insert_rowid();

        for (position, feature) in model.features.iter().enumerate() {
            insert_feature(&tx, root_id, position as i64, feature, &now)?;
        }
        for commit in &model.commits {
            insert_commit(&tx, commit)?;
        }

        tx.commit()?;
        tracing::info!(
            "Imported model '{}' with {} top-level features and {} commits",
            model.root,
            model.features.len(),
            model.commits.len()
        );
        Ok(())
    }

    /// Attach one annotation block to a feature. Returns false when the LPQ
    /// does not resolve.
    pub fn annotate(&self, lpq: &str, block: &BlockImport) -> HostResult<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let index = ModelIndex::load(&conn)?;
        let Some(id) = index.resolve(lpq) else {
            return Ok(false);
        };
        insert_block(&conn, id, block)?;
        Ok(true)
    }

    pub fn record_commit(&self, input: &RecordCommitInput) -> HostResult<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.unchecked_transaction()?;
        insert_commit(&tx, input)?;
        tx.commit()?;
        Ok(())
    }

    /// Blocks owned by exactly this feature, ordered by file and line.
    pub fn blocks(&self, lpq: &str) -> HostResult<Vec<(String, Block)>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let index = ModelIndex::load(&conn)?;
        let Some(id) = index.resolve(lpq) else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(
            "SELECT file_path, annotation_type, start_line, end_line
             FROM annotation_blocks WHERE feature_id = ? ORDER BY file_path, start_line",
        )?;
        let rows = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u32>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(path, kind, start, end)| Ok((path, parse_block(&kind, start, end)?)))
            .collect()
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            edits: self.edits.clone(),
        }
    }
}

pub fn default_db_path() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "feature-lens")?;
    Some(dirs.data_dir().join("feature-lens.db"))
}

// ============================================================
// Feature model
// ============================================================

/// The model as seen by a caller holding the connection lock inside an open
/// transaction.
struct LockedModel<'a> {
    conn: &'a Connection,
    edits: &'a EditQueue,
}

impl Database {
    fn locked<R>(&self, f: impl FnOnce(&LockedModel<'_>) -> HostResult<R>) -> HostResult<R> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.unchecked_transaction()?;
        let result = f(&LockedModel {
            conn: &tx,
            edits: &self.edits,
        })?;
        tx.commit()?;
        Ok(result)
    }
}

impl FeatureHierarchy for Database {
    fn resolve(&self, lpq: &str) -> HostResult<Option<FeatureHandle>> {
        self.locked(|model| model.resolve(lpq))
    }

    fn parent(&self, feature: &FeatureHandle) -> HostResult<Option<FeatureHandle>> {
        self.locked(|model| model.parent(feature))
    }

    fn children(&self, feature: &FeatureHandle) -> HostResult<Vec<FeatureHandle>> {
        self.locked(|model| model.children(feature))
    }

    fn snapshot(&self) -> HostResult<Vec<Feature>> {
        self.locked(|model| model.snapshot())
    }

    fn add_child(&self, parent: &FeatureHandle, name: &str) -> HostResult<NameEdit> {
        self.locked(|model| model.add_child(parent, name))
    }

    fn rename(&self, feature: &FeatureHandle, name: &str) -> HostResult<NameEdit> {
        self.locked(|model| model.rename(feature, name))
    }

    fn delete_annotations(&self, feature: &FeatureHandle) -> HostResult<()> {
        self.locked(|model| model.delete_annotations(feature))
    }

    fn schedule_delete_with_code(&self, feature: &FeatureHandle) -> HostResult<()> {
        self.locked(|model| model.schedule_delete_with_code(feature))
    }

    fn move_feature(&self, child: &FeatureHandle, new_parent: &FeatureHandle) -> HostResult<()> {
        self.locked(|model| model.move_feature(child, new_parent))
    }

    /// Holds the connection lock and one transaction for the whole edit. A
    /// failed edit rolls back everything it wrote.
    fn with_edit_lock<R>(
        &self,
        edit: impl FnOnce(&dyn FeatureHierarchy) -> HostResult<R>,
    ) -> HostResult<R>
    where
        Self: Sized,
    {
        self.locked(|model| edit(model))
    }
}

impl FeatureHierarchy for LockedModel<'_> {
    fn resolve(&self, lpq: &str) -> HostResult<Option<FeatureHandle>> {
        let index = ModelIndex::load(self.conn)?;
        index.resolve(lpq).map(|id| index.handle(id)).transpose()
    }

    fn parent(&self, feature: &FeatureHandle) -> HostResult<Option<FeatureHandle>> {
        let index = ModelIndex::load(self.conn)?;
        ensure_live(&index, feature)?;
        index
            .parent_of(feature.id)
            .map(|id| index.handle(id))
            .transpose()
    }

    fn children(&self, feature: &FeatureHandle) -> HostResult<Vec<FeatureHandle>> {
        let index = ModelIndex::load(self.conn)?;
        ensure_live(&index, feature)?;
        index
            .children_of(feature.id)
            .iter()
            .map(|&id| index.handle(id))
            .collect()
    }

    fn snapshot(&self) -> HostResult<Vec<Feature>> {
        ModelIndex::load(self.conn)?.snapshot()
    }

    fn add_child(&self, parent: &FeatureHandle, name: &str) -> HostResult<NameEdit> {
        if !is_valid_feature_name(name) {
            return Ok(NameEdit::InvalidName);
        }

        let index = ModelIndex::load(self.conn)?;
        ensure_live(&index, parent)?;
        if sibling_named(&index, parent.id, name, None)? {
            return Ok(NameEdit::DuplicateName);
        }

        self.conn.execute(
            "INSERT INTO features (parent_id, name, position, created_at) VALUES (?, ?, ?, ?)",
            (
                parent.id,
                name,
                next_position(self.conn, parent.id)?,
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(NameEdit::Applied)
    }

    fn rename(&self, feature: &FeatureHandle, name: &str) -> HostResult<NameEdit> {
        if !is_valid_feature_name(name) {
            return Ok(NameEdit::InvalidName);
        }

        let index = ModelIndex::load(self.conn)?;
        ensure_live(&index, feature)?;
        if let Some(parent) = index.parent_of(feature.id) {
            if sibling_named(&index, parent, name, Some(feature.id))? {
                return Ok(NameEdit::DuplicateName);
            }
        }

        self.conn.execute(
            "UPDATE features SET name = ? WHERE id = ?",
            (name, feature.id),
        )?;
        Ok(NameEdit::Applied)
    }

    fn delete_annotations(&self, feature: &FeatureHandle) -> HostResult<()> {
        let index = ModelIndex::load(self.conn)?;
        ensure_live(&index, feature)?;
        delete_features(self.conn, &index, feature.id)
    }

    fn schedule_delete_with_code(&self, feature: &FeatureHandle) -> HostResult<()> {
        self.edits.submit(EditJob::DeleteWithCode {
            feature_id: feature.id,
            lpq: feature.lpq.clone(),
        })
    }

    fn move_feature(&self, child: &FeatureHandle, new_parent: &FeatureHandle) -> HostResult<()> {
        let index = ModelIndex::load(self.conn)?;
        ensure_live(&index, child)?;
        ensure_live(&index, new_parent)?;
        if index.is_root(child.id) || index.subtree_ids(child.id).contains(&new_parent.id) {
            return Err(HostError::Corrupt(format!(
                "moving {} below {} would detach it from the root",
                child.lpq, new_parent.lpq
            )));
        }

        self.conn.execute(
            "UPDATE features SET parent_id = ?, position = ? WHERE id = ?",
            (
                new_parent.id,
                next_position(self.conn, new_parent.id)?,
                child.id,
            ),
        )?;
        Ok(())
    }
}

impl MetricsProvider for Database {
    fn compute_metrics(&self) -> HostResult<ProjectMetrics> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let lpqs = ModelIndex::load(&conn)?.lpqs()?;

        let mut stmt = conn.prepare(
            "SELECT feature_id, file_path, annotation_type, start_line, end_line
             FROM annotation_blocks ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, u32>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (feature_id, path, kind, start, end) in rows {
            let Some(lpq) = lpqs.get(&feature_id) else {
                continue;
            };
            records.push(AnnotationRecord {
                lpq: lpq.clone(),
                path,
                block: parse_block(&kind, start, end)?,
            });
        }

        Ok(compute_project_metrics(&records))
    }
}

impl HistorySource for Database {
    fn history(&self) -> HostResult<HistoryInput> {
        let conn = self.conn.lock().expect("database lock poisoned");

        let mut stmt = conn.prepare(
            "SELECT hash, committed_at, message, author FROM commits ORDER BY committed_at, hash",
        )?;
        let commits = stmt
            .query_map([], |row| {
                Ok(CommitRef {
                    hash: row.get(0)?,
                    committed_at: parse_datetime(row.get::<_, String>(1)?),
                    message: row.get(2)?,
                    author: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt =
            conn.prepare("SELECT DISTINCT feature_name FROM history_events ORDER BY feature_name")?;
        let features = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT feature_name, commit_hash, kind, entity_name FROM history_events ORDER BY id",
        )?;
        let events = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let commit_index: HashMap<&str, usize> = commits
            .iter()
            .enumerate()
            .map(|(i, c)| (c.hash.as_str(), i))
            .collect();

        let mut points = Vec::with_capacity(events.len());
        for (feature_name, hash, kind, entity_name) in events {
            let (Ok(feature_index), Some(&ci)) = (
                features.binary_search(&feature_name),
                commit_index.get(hash.as_str()),
            ) else {
                continue;
            };
            let commit = &commits[ci];
            points.push(RawHistoryPoint {
                feature_index,
                commit_index: ci,
                commit_hash: hash,
                kind,
                message: Some(commit.message.clone()),
                author: Some(commit.author.clone()),
                timestamp: Some(commit.label()),
                entity_name,
            });
        }

        // Event names are LPQs, so a nested feature never keeps a
        // top-level name of the same leaf alive.
        let live: BTreeSet<String> = ModelIndex::load(&conn)?.lpqs()?.into_values().collect();
        let deleted = derive_deleted_features(&features, &commits, &points, &live);

        Ok(HistoryInput {
            features,
            commits,
            points,
            deleted,
        })
    }
}

impl HostNavigator for Database {
    fn highlight_feature(&self, lpq: &str) -> HostResult<()> {
        tracing::info!("Highlight requested for {}", lpq);
        Ok(())
    }

    fn open_path(&self, path: &str, position: Option<(u32, u32)>) -> HostResult<()> {
        match position {
            Some((line, column)) => {
                tracing::info!("Open requested for {}:{}:{}", path, line, column)
            }
            None => tracing::info!("Open requested for {}", path),
        }
        Ok(())
    }
}

// ============================================================
// Helpers
// ============================================================

fn ensure_live(index: &ModelIndex, feature: &FeatureHandle) -> HostResult<()> {
    if index.contains(feature.id) {
        Ok(())
    } else {
        Err(HostError::Corrupt(format!(
            "feature {} disappeared during the request",
            feature.lpq
        )))
    }
}

fn sibling_named(
    index: &ModelIndex,
    parent: i64,
    name: &str,
    except: Option<i64>,
) -> HostResult<bool> {
    for &id in index.children_of(parent) {
        if Some(id) != except && index.name(id)? == name {
            return Ok(true);
        }
    }
    Ok(false)
}

fn next_position(conn: &Connection, parent: i64) -> HostResult<i64> {
    let position: Option<i64> = conn
        .query_row(
            "SELECT MAX(position) FROM features WHERE parent_id = ?",
            [parent],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    Ok(position.map_or(0, |p| p + 1))
}

/// Delete a feature, its subtree and their blocks. The root row survives:
/// only its children and its own blocks go.
fn delete_features(conn: &Connection, index: &ModelIndex, id: i64) -> HostResult<()> {
    let ids = index.subtree_ids(id);
    for &feature_id in &ids {
        conn.execute(
            "DELETE FROM annotation_blocks WHERE feature_id = ?",
            [feature_id],
        )?;
    }
    for &feature_id in ids.iter().rev() {
        if !index.is_root(feature_id) {
            conn.execute("DELETE FROM features WHERE id = ?", [feature_id])?;
        }
    }
    Ok(())
}

/// Drop a feature together with the code it annotates.
///
/// Blocks of other features that sit entirely inside a dropped block of the
/// same file go with it. Returns false when the feature no longer exists.
pub(crate) fn delete_with_code(conn: &Connection, feature_id: i64) -> HostResult<bool> {
    let index = ModelIndex::load(conn)?;
    if !index.contains(feature_id) {
        return Ok(false);
    }
    let subtree = index.subtree_ids(feature_id);

    let tx = conn.unchecked_transaction()?;
    let mut stmt = tx.prepare(
        "SELECT file_path, start_line, end_line FROM annotation_blocks WHERE feature_id = ?",
    )?;
    let mut dropped = Vec::new();
    for &id in &subtree {
        let rows = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        dropped.extend(rows);
    }
    drop(stmt);

    for (path, start, end) in &dropped {
        let nested = tx.execute(
            "DELETE FROM annotation_blocks
             WHERE file_path = ? AND start_line >= ? AND end_line <= ?",
            (path, start, end),
        )?;
        tracing::debug!("Removed {} blocks inside {}:{}-{}", nested, path, start, end);
    }

    delete_features(&tx, &index, feature_id)?;
    tx.commit()?;
    Ok(true)
}

fn insert_feature(
    conn: &Connection,
    parent_id: i64,
    position: i64,
    feature: &FeatureImport,
    now: &str,
) -> HostResult<()> {
    conn.execute(
        "INSERT INTO features (parent_id, name, position, created_at) VALUES (?, ?, ?, ?)",
        (parent_id, &feature.name, position, now),
    )?;
    let id = conn.last_insert_rowid();

    for block in &feature.blocks {
        insert_block(conn, id, block)?;
    }
    for (position, child) in feature.children.iter().enumerate() {
        insert_feature(conn, id, position as i64, child, now)?;
    }
    Ok(())
}

fn insert_block(conn: &Connection, feature_id: i64, block: &BlockImport) -> HostResult<()> {
    conn.execute(
        "INSERT INTO annotation_blocks (feature_id, file_path, annotation_type, start_line, end_line)
         VALUES (?, ?, ?, ?, ?)",
        (
            feature_id,
            &block.path,
            block.annotation_type.as_str(),
            block.start,
            block.end,
        ),
    )?;
    Ok(())
}

fn insert_commit(conn: &Connection, input: &RecordCommitInput) -> HostResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO commits (hash, committed_at, message, author) VALUES (?, ?, ?, ?)",
        (
            &input.hash,
            input.committed_at.to_rfc3339(),
            &input.message,
            &input.author,
        ),
    )?;
    conn.execute(
        "DELETE FROM history_events WHERE commit_hash = ?",
        [&input.hash],
    )?;
    for event in &input.events {
        conn.execute(
            "INSERT INTO history_events (feature_name, commit_hash, kind, entity_name)
             VALUES (?, ?, ?, ?)",
            (&event.feature_name, &input.hash, &event.kind, &event.entity_name),
        )?;
    }
    Ok(())
}

fn validate_import(root: &str, features: &[FeatureImport]) -> HostResult<()> {
    if root.is_empty() {
        return Err(HostError::InvalidModel("root name is empty".into()));
    }
    let mut seen = BTreeSet::new();
    for feature in features {
        if !is_valid_feature_name(&feature.name) {
            return Err(HostError::InvalidModel(format!(
                "invalid feature name '{}'",
                feature.name
            )));
        }
        if !seen.insert(feature.name.as_str()) {
            return Err(HostError::InvalidModel(format!(
                "duplicate feature '{}' under '{}'",
                feature.name, root
            )));
        }
        validate_import(&feature.name, &feature.children)?;
    }
    Ok(())
}

fn parse_block(kind: &str, start: u32, end: u32) -> HostResult<Block> {
    let annotation_type = AnnotationType::from_str(kind)
        .ok_or_else(|| HostError::Corrupt(format!("unknown annotation type '{}'", kind)))?;
    Ok(Block {
        start,
        end,
        annotation_type,
    })
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
