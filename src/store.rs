//! Persistent snapshot of an [`AnnotationIndex`].
//!
//! Uses LMDB (via heed) with one named database per index map. Keys are
//! class or annotation names; values are JSON arrays of names. A save
//! replaces the whole snapshot in a single write transaction.

use anyhow::{Context, Result};
use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::index::{AnnotationIndex, IndexMap};

pub const ANNOTATIONS_DB: &str = "annotations";
pub const CLASSES_DB: &str = "classes";
pub const IMPLEMENTS_DB: &str = "implements";

const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 8;

type StrDb = Database<Str, Str>;

#[derive(Debug)]
pub struct IndexStore {
    env: Env,
    db_path: PathBuf,
    annotations: StrDb,
    classes: StrDb,
    implements: StrDb,
}

#[derive(Debug, serde::Serialize)]
pub struct StoreStats {
    pub db_path: String,
    pub classes: u64,
    pub annotations: u64,
    pub implementing_classes: u64,
}

impl IndexStore {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create index directory: {}", parent.display())
            })?;
        }

        let env = open_env(&db_path)?;

        let mut wtxn = env.write_txn()?;
        let annotations = env.create_database::<Str, Str>(&mut wtxn, Some(ANNOTATIONS_DB))?;
        let classes = env.create_database::<Str, Str>(&mut wtxn, Some(CLASSES_DB))?;
        let implements = env.create_database::<Str, Str>(&mut wtxn, Some(IMPLEMENTS_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db_path,
            annotations,
            classes,
            implements,
        })
    }

    pub fn save(&self, index: &AnnotationIndex) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        write_map(&self.annotations, &mut wtxn, index.annotation_index())?;
        write_map(&self.classes, &mut wtxn, index.class_index())?;
        write_map(&self.implements, &mut wtxn, index.implements_index())?;
        wtxn.commit()
            .with_context(|| format!("Failed to commit index: {}", self.db_path.display()))?;
        Ok(())
    }

    pub fn load(&self) -> Result<AnnotationIndex> {
        let rtxn = self.env.read_txn()?;
        Ok(AnnotationIndex {
            annotations: read_map(&self.annotations, &rtxn)?,
            classes: read_map(&self.classes, &rtxn)?,
            implements: read_map(&self.implements, &rtxn)?,
        })
    }

    pub fn classes_annotated_with(&self, annotation: &str) -> Result<Option<BTreeSet<String>>> {
        self.get(&self.annotations, annotation)
    }

    pub fn annotations_of(&self, class: &str) -> Result<Option<BTreeSet<String>>> {
        self.get(&self.classes, class)
    }

    pub fn interfaces_of(&self, class: &str) -> Result<Option<BTreeSet<String>>> {
        self.get(&self.implements, class)
    }

    fn get(&self, db: &StrDb, key: &str) -> Result<Option<BTreeSet<String>>> {
        let rtxn = self.env.read_txn()?;
        let Some(raw) = db.get(&rtxn, key)? else {
            return Ok(None);
        };
        let names = serde_json::from_str(raw)
            .with_context(|| format!("Failed to parse stored entry for: {key}"))?;
        Ok(Some(names))
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let rtxn = self.env.read_txn()?;
        Ok(StoreStats {
            db_path: self.db_path.to_string_lossy().to_string(),
            classes: self.classes.len(&rtxn)?,
            annotations: self.annotations.len(&rtxn)?,
            implementing_classes: self.implements.len(&rtxn)?,
        })
    }
}

fn open_env(db_path: &Path) -> Result<Env> {
    let mut options = EnvOpenOptions::new();
    options.map_size(DEFAULT_MAP_SIZE);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: We do not use NO_LOCK and keep default LMDB locking guarantees.
    // NO_SUB_DIR keeps the index a single file at the --db path.
    unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        options
            .open(db_path)
            .with_context(|| format!("Failed to create/open index env: {}", db_path.display()))
    }
}

fn write_map(db: &StrDb, wtxn: &mut RwTxn<'_>, map: &IndexMap) -> Result<()> {
    db.clear(wtxn)?;
    for (key, values) in map {
        let json = serde_json::to_string(values)?;
        db.put(wtxn, key.as_str(), json.as_str())?;
    }
    Ok(())
}

fn read_map(db: &StrDb, rtxn: &RoTxn<'_>) -> Result<IndexMap> {
    let mut map = IndexMap::new();
    for item in db.iter(rtxn)? {
        let (key, raw) = item?;
        let values: BTreeSet<String> = serde_json::from_str(raw)
            .with_context(|| format!("Failed to parse stored entry for: {key}"))?;
        map.insert(key.to_string(), values);
    }
    Ok(map)
}
