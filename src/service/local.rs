use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use log::{error, info};

use crate::data::model::{Batch, Event, Order, Row, User, WriteReport};
use crate::generator::ids::IdBases;

use super::Gateway;

/// Keeps each table as a newline-delimited JSON file in one directory.
pub struct LocalService {
    dir: PathBuf,
}

struct Staged {
    tmp: PathBuf,
    target: PathBuf,
    /// Contents of `target` before the write, `None` if it did not exist.
    previous: Option<String>,
    inserted: u64,
}

impl Staged {
    /// Puts back what `target` held before it was replaced.
    fn restore(&self) {
        let result = match &self.previous {
            Some(contents) => fs::write(&self.target, contents),
            None => fs::remove_file(&self.target),
        };
        if let Err(e) = result {
            error!("LocalService: could not restore {}: {}", self.target.display(), e);
        }
    }
}

impl LocalService {
    pub fn init(dir: impl Into<PathBuf>) -> Result<Self, anyhow::Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Error creating output directory {}", dir.display()))?;
        info!("LocalService: writing tables to {}", dir.display());
        Ok(Self { dir })
    }

    fn path<T: Row>(&self) -> PathBuf {
        self.dir.join(format!("{}.ndjson", T::TABLE))
    }

    fn read_table<T: Row>(path: &Path) -> Result<(String, Vec<T>), anyhow::Error> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((String::new(), Vec::new())),
            Err(e) => return Err(anyhow::Error::new(e).context(format!("Error reading {}", path.display()))),
        };
        let mut rows = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: T = serde_json::from_str(line)
                .with_context(|| format!("Error parsing {} line {}", path.display(), i + 1))?;
            rows.push(row);
        }
        Ok((contents, rows))
    }

    fn max_key<T: Row>(&self) -> Result<i64, anyhow::Error> {
        let (_, rows) = Self::read_table::<T>(&self.path::<T>())?;
        Ok(rows.iter().map(Row::key).max().unwrap_or(0))
    }

    /// Writes existing rows plus the non-conflicting new ones to a sibling temp file.
    fn stage<T: Row>(&self, new_rows: &[T]) -> Result<Staged, anyhow::Error> {
        let target = self.path::<T>();
        let tmp = target.with_extension("ndjson.tmp");
        let existed = target.exists();
        let (previous, existing) = Self::read_table::<T>(&target)?;
        let mut contents = previous.clone();
        let mut keys: HashSet<i64> = existing.iter().map(Row::key).collect();

        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        let mut inserted = 0;
        for row in new_rows {
            if !keys.insert(row.key()) {
                continue;
            }
            contents.push_str(&serde_json::to_string(row)?);
            contents.push('\n');
            inserted += 1;
        }
        fs::write(&tmp, contents).with_context(|| format!("Error writing {}", tmp.display()))?;
        Ok(Staged {
            tmp,
            target,
            previous: existed.then_some(previous),
            inserted,
        })
    }

    fn stage_all(&self, batch: &Batch, staged: &mut Vec<Staged>) -> Result<(), anyhow::Error> {
        staged.push(self.stage::<User>(&batch.users)?);
        staged.push(self.stage::<Event>(&batch.events)?);
        staged.push(self.stage::<Order>(&batch.orders)?);
        Ok(())
    }

    /// Moves every staged file over its table. If one rename fails, tables
    /// already replaced get their previous contents back and the remaining
    /// temp files are removed.
    fn commit(staged: &[Staged]) -> Result<(), anyhow::Error> {
        for (i, s) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(&s.tmp, &s.target) {
                error!(
                    "LocalService: replacing {} failed, restoring {} table(s)",
                    s.target.display(),
                    i
                );
                for done in &staged[..i] {
                    done.restore();
                }
                for pending in &staged[i..] {
                    let _ = fs::remove_file(&pending.tmp);
                }
                return Err(anyhow::Error::new(e)
                    .context(format!("Error replacing {}", s.target.display())));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for LocalService {
    async fn next_ids(&self) -> Result<IdBases, anyhow::Error> {
        Ok(IdBases::from_maxima(
            self.max_key::<User>()?,
            self.max_key::<Event>()?,
            self.max_key::<Order>()?,
        ))
    }

    async fn write(&self, batch: &Batch) -> Result<WriteReport, anyhow::Error> {
        let mut staged = Vec::with_capacity(3);
        if let Err(e) = self.stage_all(batch, &mut staged) {
            error!("LocalService: write failed, discarding staged files: {:#}", e);
            for s in &staged {
                let _ = fs::remove_file(&s.tmp);
            }
            return Err(e);
        }
        Self::commit(&staged)?;
        Ok(WriteReport {
            users: staged[0].inserted,
            events: staged[1].inserted,
            orders: staged[2].inserted,
        })
    }

    async fn close(&self) {}
}
