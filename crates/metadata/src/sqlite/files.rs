use super::{
    delete_all_tags, fetch_row_by_id, fetch_row_by_tuple, insert_tags, load_record,
    map_tuple_conflict, now_millis,
};
use crate::error::{MetadataError, MetadataResult};
use crate::repos::FileRepo;
use crate::session::Session;
use async_trait::async_trait;
use r2index_core::{FileCreate, FileRecord, FileUpdate, RemoteTuple};
use sqlx::types::Json;
use sqlx::{Encode, QueryBuilder, Sqlite, Type};
use std::collections::BTreeSet;
use uuid::Uuid;

fn to_db_size(size: Option<u64>) -> MetadataResult<Option<i64>> {
    size.map(i64::try_from)
        .transpose()
        .map_err(|_| MetadataError::Invalid("size is out of range".to_string()))
}

/// Append `, column = ?` when the field was supplied.
fn push_set<'args, T>(qb: &mut QueryBuilder<'args, Sqlite>, column: &'static str, value: Option<T>)
where
    T: 'args + Encode<'args, Sqlite> + Type<Sqlite> + Send,
{
    if let Some(value) = value {
        qb.push(", ").push(column).push(" = ").push_bind(value);
    }
}

#[async_trait]
impl<'a> FileRepo for Session<'a> {
    async fn create_file(&self, input: &FileCreate) -> MetadataResult<FileRecord> {
        let input = input.validate()?;
        let tuple = input.remote_tuple();
        let tags: BTreeSet<String> = input.tags.iter().cloned().collect();
        let id = Uuid::new_v4().to_string();
        let now = now_millis();

        let mut tx = self.begin_write().await?;
        sqlx::query(
            r#"
            INSERT INTO files (
                id, name, category, entity, extension, media_type,
                remote_path, remote_filename, remote_version, metadata_path,
                size, md5, sha1, sha256, sha512, extra,
                deprecated, deprecation_reason, created, updated
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.category)
        .bind(&input.entity)
        .bind(&input.extension)
        .bind(&input.media_type)
        .bind(&input.remote_path)
        .bind(&input.remote_filename)
        .bind(&input.remote_version)
        .bind(&input.metadata_path)
        .bind(to_db_size(input.size)?)
        .bind(&input.md5)
        .bind(&input.sha1)
        .bind(&input.sha256)
        .bind(&input.sha512)
        .bind(Json(&input.extra))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_tuple_conflict(e, &tuple))?;

        insert_tags(&mut tx, &id, &tags).await?;

        let row = fetch_row_by_id(&mut tx, &id)
            .await?
            .ok_or_else(|| MetadataError::Internal(format!("file {id} vanished after insert")))?;
        let seq = self.commit_write(tx).await?;

        tracing::info!(file_id = %id, tuple = %tuple, tags = tags.len(), seq, "File record created");
        Ok(row.into_record(tags))
    }

    async fn get_file(&self, id: &str) -> MetadataResult<FileRecord> {
        let mut tx = self.begin_read().await?;
        let row = fetch_row_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("file {id}")))?;
        let record = load_record(&mut tx, row).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn get_file_by_tuple(&self, tuple: &RemoteTuple) -> MetadataResult<FileRecord> {
        let mut tx = self.begin_read().await?;
        let row = fetch_row_by_tuple(&mut tx, tuple)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("file {tuple}")))?;
        let record = load_record(&mut tx, row).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn update_file(&self, id: &str, update: &FileUpdate) -> MetadataResult<FileRecord> {
        let update = update.validate()?;

        let mut tx = self.begin_write().await?;
        let current = fetch_row_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("file {id}")))?;

        let tuple = RemoteTuple::new(
            update.remote_path.clone().unwrap_or(current.remote_path),
            update.remote_filename.clone().unwrap_or(current.remote_filename),
            update.remote_version.clone().unwrap_or(current.remote_version),
        );

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE files SET updated = MAX(");
        qb.push_bind(now_millis()).push(", updated + 1)");
        push_set(&mut qb, "name", update.name.clone());
        push_set(&mut qb, "category", update.category.clone());
        push_set(&mut qb, "entity", update.entity.clone());
        push_set(&mut qb, "extension", update.extension.clone());
        push_set(&mut qb, "media_type", update.media_type.clone());
        push_set(&mut qb, "remote_path", update.remote_path.clone());
        push_set(&mut qb, "remote_filename", update.remote_filename.clone());
        push_set(&mut qb, "remote_version", update.remote_version.clone());
        push_set(&mut qb, "metadata_path", update.metadata_path.clone());
        push_set(&mut qb, "size", to_db_size(update.size)?);
        push_set(&mut qb, "md5", update.md5.clone());
        push_set(&mut qb, "sha1", update.sha1.clone());
        push_set(&mut qb, "sha256", update.sha256.clone());
        push_set(&mut qb, "sha512", update.sha512.clone());
        push_set(&mut qb, "extra", update.extra.clone().map(Json));
        push_set(&mut qb, "deprecated", update.deprecated);
        push_set(&mut qb, "deprecation_reason", update.deprecation_reason.clone());
        qb.push(" WHERE id = ").push_bind(id.to_string());

        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(|e| map_tuple_conflict(e, &tuple))?;

        if let Some(tags) = &update.tags {
            let tags: BTreeSet<String> = tags.iter().cloned().collect();
            delete_all_tags(&mut tx, id).await?;
            insert_tags(&mut tx, id, &tags).await?;
        }

        let row = fetch_row_by_id(&mut tx, id)
            .await?
            .ok_or_else(|| MetadataError::Internal(format!("file {id} vanished during update")))?;
        let record = load_record(&mut tx, row).await?;
        let seq = self.commit_write(tx).await?;

        tracing::info!(
            file_id = %id,
            tuple_changed = update.touches_remote_tuple(),
            tags_replaced = update.tags.is_some(),
            seq,
            "File record updated"
        );
        Ok(record)
    }

    async fn delete_file(&self, id: &str) -> MetadataResult<()> {
        let mut tx = self.begin_write().await?;
        // file_tags rows go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("file {id}")));
        }
        let seq = self.commit_write(tx).await?;

        tracing::info!(file_id = %id, seq, "File record deleted");
        Ok(())
    }

    async fn delete_file_by_tuple(&self, tuple: &RemoteTuple) -> MetadataResult<()> {
        let mut tx = self.begin_write().await?;
        let id: Option<String> = sqlx::query_scalar(
            "DELETE FROM files WHERE remote_path = ? AND remote_filename = ? AND remote_version = ? RETURNING id",
        )
        .bind(&tuple.remote_path)
        .bind(&tuple.remote_filename)
        .bind(&tuple.remote_version)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(id) = id else {
            return Err(MetadataError::NotFound(format!("file {tuple}")));
        };
        let seq = self.commit_write(tx).await?;

        tracing::info!(file_id = %id, tuple = %tuple, seq, "File record deleted");
        Ok(())
    }
}
