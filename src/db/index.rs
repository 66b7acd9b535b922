//! In-memory view of the `features` table, rebuilt per call.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::error::{HostError, HostResult};
use crate::hierarchy::{child_lpq, lpq_segments};
use crate::models::{Feature, FeatureHandle};

struct FeatureRow {
    parent_id: Option<i64>,
    name: String,
}

pub(crate) struct ModelIndex {
    rows: HashMap<i64, FeatureRow>,
    children: HashMap<i64, Vec<i64>>,
    root: i64,
}

impl ModelIndex {
    pub(crate) fn load(conn: &Connection) -> HostResult<Self> {
        let mut stmt =
            conn.prepare("SELECT id, parent_id, name FROM features ORDER BY position, id")?;
        let loaded = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    FeatureRow {
                        parent_id: row.get(1)?,
                        name: row.get(2)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = HashMap::new();
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut root = None;
        for (id, row) in loaded {
            match row.parent_id {
                Some(parent) => children.entry(parent).or_default().push(id),
                None => {
                    root.get_or_insert(id);
                }
            }
            rows.insert(id, row);
        }

        let root = root.ok_or_else(|| HostError::Corrupt("feature model has no root".into()))?;
        Ok(Self {
            rows,
            children,
            root,
        })
    }

    pub(crate) fn root_id(&self) -> i64 {
        self.root
    }

    pub(crate) fn is_root(&self, id: i64) -> bool {
        id == self.root
    }

    pub(crate) fn contains(&self, id: i64) -> bool {
        self.rows.contains_key(&id)
    }

    pub(crate) fn children_of(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn parent_of(&self, id: i64) -> Option<i64> {
        self.rows.get(&id).and_then(|row| row.parent_id)
    }

    pub(crate) fn name(&self, id: i64) -> HostResult<&str> {
        self.rows
            .get(&id)
            .map(|row| row.name.as_str())
            .ok_or_else(|| HostError::Corrupt(format!("dangling feature id {}", id)))
    }

    /// LPQ of a feature: names below the root joined by the separator.
    /// The root itself is addressed by its name.
    pub(crate) fn lpq(&self, id: i64) -> HostResult<String> {
        if self.is_root(id) {
            return self.name(id).map(str::to_string);
        }

        let mut names: Vec<&str> = Vec::new();
        let mut current = id;
        for _ in 0..=self.rows.len() {
            if self.is_root(current) {
                let mut lpq: Option<String> = None;
                for name in names.iter().rev() {
                    lpq = Some(child_lpq(lpq.as_deref(), name));
                }
                return Ok(lpq.unwrap_or_default());
            }
            names.push(self.name(current)?);
            current = self.parent_of(current).ok_or_else(|| {
                HostError::Corrupt(format!("feature {} is detached from the root", id))
            })?;
        }
        Err(HostError::Corrupt(format!(
            "cycle above feature id {}",
            id
        )))
    }

    pub(crate) fn handle(&self, id: i64) -> HostResult<FeatureHandle> {
        Ok(FeatureHandle {
            id,
            lpq: self.lpq(id)?,
            name: self.name(id)?.to_string(),
        })
    }

    /// Walk the LPQ segments down from the root. Falls back to the root's own
    /// name so the root stays addressable.
    pub(crate) fn resolve(&self, lpq: &str) -> Option<i64> {
        let mut current = self.root;
        let mut matched = true;
        for segment in lpq_segments(lpq) {
            let next = self
                .children_of(current)
                .iter()
                .copied()
                .find(|&child| self.rows.get(&child).is_some_and(|r| r.name == segment));
            match next {
                Some(child) => current = child,
                None => {
                    matched = false;
                    break;
                }
            }
        }

        if matched && !self.is_root(current) {
            return Some(current);
        }
        self.rows
            .get(&self.root)
            .filter(|root| root.name == lpq)
            .map(|_| self.root)
    }

    /// Top-level features with their subtrees, in model order.
    pub(crate) fn snapshot(&self) -> HostResult<Vec<Feature>> {
        self.children_of(self.root)
            .iter()
            .map(|&id| self.feature(id, None))
            .collect()
    }

    fn feature(&self, id: i64, parent_lpq: Option<&str>) -> HostResult<Feature> {
        let name = self.name(id)?.to_string();
        let lpq = child_lpq(parent_lpq, &name);
        let children = self
            .children_of(id)
            .iter()
            .map(|&child| self.feature(child, Some(&lpq)))
            .collect::<HostResult<Vec<_>>>()?;
        Ok(Feature {
            lpq,
            name,
            children,
        })
    }

    /// LPQ of every feature reachable from the root, root included.
    pub(crate) fn lpqs(&self) -> HostResult<HashMap<i64, String>> {
        let mut out = HashMap::new();
        out.insert(self.root, self.name(self.root)?.to_string());
        let mut stack: Vec<(i64, Option<String>)> = self
            .children_of(self.root)
            .iter()
            .map(|&id| (id, None))
            .collect();
        while let Some((id, parent_lpq)) = stack.pop() {
            let lpq = child_lpq(parent_lpq.as_deref(), self.name(id)?);
            for &child in self.children_of(id) {
                stack.push((child, Some(lpq.clone())));
            }
            out.insert(id, lpq);
        }
        Ok(out)
    }

    /// `id` and all its descendants, pre-order.
    pub(crate) fn subtree_ids(&self, id: i64) -> Vec<i64> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children_of(current).iter().rev().copied());
        }
        out
    }
}
