use super::{delete_all_tags, insert_tags, load_tags, touch};
use crate::error::MetadataResult;
use crate::repos::TagRepo;
use crate::session::Session;
use async_trait::async_trait;
use r2index_core::normalize_tags;
use std::collections::BTreeSet;

#[async_trait]
impl<'a> TagRepo for Session<'a> {
    async fn set_tags(&self, file_id: &str, tags: &[String]) -> MetadataResult<BTreeSet<String>> {
        let tags = normalize_tags(tags)?;

        let mut tx = self.begin_write().await?;
        touch(&mut tx, file_id).await?;
        delete_all_tags(&mut tx, file_id).await?;
        insert_tags(&mut tx, file_id, &tags).await?;
        let seq = self.commit_write(tx).await?;

        tracing::info!(file_id, tags = tags.len(), seq, "Tags replaced");
        Ok(tags)
    }

    async fn add_tags(&self, file_id: &str, tags: &[String]) -> MetadataResult<BTreeSet<String>> {
        let tags = normalize_tags(tags)?;

        let mut tx = self.begin_write().await?;
        touch(&mut tx, file_id).await?;
        insert_tags(&mut tx, file_id, &tags).await?;
        let current = load_tags(&mut tx, file_id).await?;
        let seq = self.commit_write(tx).await?;

        tracing::info!(file_id, added = tags.len(), seq, "Tags added");
        Ok(current)
    }

    async fn remove_tags(
        &self,
        file_id: &str,
        tags: &[String],
    ) -> MetadataResult<BTreeSet<String>> {
        let tags = normalize_tags(tags)?;

        let mut tx = self.begin_write().await?;
        touch(&mut tx, file_id).await?;
        for tag in &tags {
            sqlx::query("DELETE FROM file_tags WHERE file_id = ? AND tag = ?")
                .bind(file_id)
                .bind(tag)
                .execute(&mut *tx)
                .await?;
        }
        let current = load_tags(&mut tx, file_id).await?;
        let seq = self.commit_write(tx).await?;

        tracing::info!(file_id, removed = tags.len(), seq, "Tags removed");
        Ok(current)
    }

    async fn get_tags(&self, file_id: &str) -> MetadataResult<BTreeSet<String>> {
        let mut tx = self.begin_read().await?;
        let tags = load_tags(&mut tx, file_id).await?;
        tx.commit().await?;
        Ok(tags)
    }
}
