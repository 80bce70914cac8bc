use super::attach_tags;
use crate::error::MetadataResult;
use crate::models::FileRow;
use crate::repos::SearchRepo;
use crate::session::Session;
use async_trait::async_trait;
use r2index_core::{
    FileFilter, FileIndex, GroupCount, GroupField, GroupedResult, Pagination, SearchPage,
};
use sqlx::{QueryBuilder, Sqlite};

/// SQL expression producing the group value for a column.
///
/// Only these fixed expressions ever reach the query text; user input is
/// mapped onto `GroupField` before this point.
fn group_expr(field: GroupField) -> &'static str {
    match field {
        GroupField::Category => "f.category",
        GroupField::Entity => "f.entity",
        GroupField::Extension => "f.extension",
        GroupField::MediaType => "f.media_type",
        GroupField::Deprecated => "CASE WHEN f.deprecated THEN 'true' ELSE 'false' END",
    }
}

/// Append the `WHERE` clause for `filter`. Every filter is conjunctive.
fn push_filter<'args>(qb: &mut QueryBuilder<'args, Sqlite>, filter: &FileFilter) {
    qb.push(" WHERE 1 = 1");

    let columns = [
        ("f.category", &filter.category),
        ("f.entity", &filter.entity),
        ("f.extension", &filter.extension),
        ("f.media_type", &filter.media_type),
    ];
    for (column, value) in columns {
        if let Some(value) = value {
            qb.push(" AND ").push(column).push(" = ").push_bind(value.clone());
        }
    }

    if let Some(deprecated) = filter.deprecated {
        qb.push(" AND f.deprecated = ").push_bind(deprecated);
    }

    // Records carrying every requested tag.
    if !filter.tags.is_empty() {
        qb.push(" AND f.id IN (SELECT file_id FROM file_tags WHERE tag IN (");
        let mut tags = qb.separated(", ");
        for tag in &filter.tags {
            tags.push_bind(tag.clone());
        }
        tags.push_unseparated(") GROUP BY file_id HAVING COUNT(DISTINCT tag) = ");
        qb.push_bind(filter.tags.len() as i64).push(")");
    }
}

#[async_trait]
impl<'a> SearchRepo for Session<'a> {
    async fn search(&self, filter: &FileFilter, page: Pagination) -> MetadataResult<SearchPage> {
        let mut tx = self.begin_read().await?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM files f");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT f.* FROM files f");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY f.updated DESC, f.id ASC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset).unwrap_or(i64::MAX));
        let rows = qb.build_query_as::<FileRow>().fetch_all(&mut *tx).await?;

        let records = attach_tags(&mut tx, rows).await?;
        tx.commit().await?;

        tracing::debug!(
            total,
            returned = records.len(),
            limit = page.limit,
            offset = page.offset,
            "Search completed"
        );
        Ok(SearchPage {
            records,
            total: total.max(0) as u64,
        })
    }

    async fn search_grouped(
        &self,
        filter: &FileFilter,
        group_by: GroupField,
    ) -> MetadataResult<GroupedResult> {
        let mut tx = self.begin_read().await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(group_expr(group_by))
            .push(" AS group_value, COUNT(*) AS group_count FROM files f");
        push_filter(&mut qb, filter);
        qb.push(" GROUP BY group_value ORDER BY group_count DESC, group_value ASC");

        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(&mut *tx).await?;
        tx.commit().await?;
        let groups: Vec<GroupCount> = rows
            .into_iter()
            .map(|(value, count)| GroupCount {
                value,
                count: count.max(0) as u64,
            })
            .collect();
        let total = groups.iter().map(|g| g.count).sum();

        tracing::debug!(group_by = %group_by, groups = groups.len(), total, "Grouped search completed");
        Ok(GroupedResult {
            group_by,
            groups,
            total,
        })
    }

    async fn index(&self, filter: &FileFilter) -> MetadataResult<FileIndex> {
        let mut tx = self.begin_read().await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT f.* FROM files f");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY f.category, f.entity, f.updated DESC, f.id ASC");
        let rows = qb.build_query_as::<FileRow>().fetch_all(&mut *tx).await?;

        let records = attach_tags(&mut tx, rows).await?;
        tx.commit().await?;

        let index = FileIndex::from_records(records);
        tracing::debug!(
            total = index.total,
            categories = index.categories.len(),
            "Index built"
        );
        Ok(index)
    }
}
