use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::data::model::{Batch, WriteReport};
use crate::generator::ids::IdBases;

pub mod local;

/// Store that receives a generated batch.
///
/// `write` is all-or-nothing: rows whose primary key already exists are
/// skipped, and on any failure nothing from the batch is kept.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn next_ids(&self) -> Result<IdBases, anyhow::Error>;
    async fn write(&self, batch: &Batch) -> Result<WriteReport, anyhow::Error>;
    async fn close(&self);
}
