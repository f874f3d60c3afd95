//! Expands delta ranges into spooled row lists.
//!
//! The finder works on ranges; the transfer layer works on rows. This step
//! pages row metadata out of each system for every range and sorts each row
//! into the create, update or delete spool.

use crate::core::{IdRange, MigrationType, RowMetadata, RowMetadataSource};
use crate::error::{MigrateError, Result};
use crate::spool::RowMetadataWriter;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::io::Write;
use tracing::debug;

use super::DeltaRanges;

/// Rows scheduled per operation for one type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaCounts {
    pub create: u64,
    pub update: u64,
    pub delete: u64,
}

impl DeltaCounts {
    pub fn total(&self) -> u64 {
        self.create + self.update + self.delete
    }
}

/// Keyset-paged cursor over the rows of one id range.
pub struct RangeCursor<'a, R: ?Sized> {
    rows: &'a R,
    migration_type: &'a MigrationType,
    next_min: i64,
    max_id: i64,
    page_size: usize,
    buffer: VecDeque<RowMetadata>,
    exhausted: bool,
}

impl<'a, R: RowMetadataSource + ?Sized> RangeCursor<'a, R> {
    pub fn new(
        rows: &'a R,
        migration_type: &'a MigrationType,
        range: IdRange,
        page_size: usize,
    ) -> Self {
        Self {
            rows,
            migration_type,
            next_min: range.min_id,
            max_id: range.max_id,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next row in ascending id order, fetching a page when the buffer runs dry.
    pub async fn next(&mut self) -> Result<Option<RowMetadata>> {
        if let Some(row) = self.buffer.pop_front() {
            return Ok(Some(row));
        }
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .rows
            .row_metadata_page(self.migration_type, self.next_min, self.max_id, self.page_size)
            .await?;
        self.check_page(&page)?;

        match page.last() {
            Some(last) if page.len() == self.page_size && last.id < self.max_id => {
                self.next_min = last.id + 1;
            }
            _ => self.exhausted = true,
        }
        self.buffer.extend(page);
        Ok(self.buffer.pop_front())
    }

    fn check_page(&self, page: &[RowMetadata]) -> Result<()> {
        let mut previous: Option<i64> = None;
        for row in page {
            if row.id < self.next_min || row.id > self.max_id {
                return Err(MigrateError::oracle(
                    "row metadata source",
                    format!(
                        "{}: id {} outside requested range [{}, {}]",
                        self.migration_type, row.id, self.next_min, self.max_id
                    ),
                ));
            }
            if previous.is_some_and(|p| row.id <= p) {
                return Err(MigrateError::oracle(
                    "row metadata source",
                    format!(
                        "{}: page rows out of order at id {}",
                        self.migration_type, row.id
                    ),
                ));
            }
            previous = Some(row.id);
        }
        Ok(())
    }
}

/// The three spools a type's rows are sorted into.
pub struct DeltaWriters<W: Write> {
    pub create: RowMetadataWriter<W>,
    pub update: RowMetadataWriter<W>,
    pub delete: RowMetadataWriter<W>,
}

impl<W: Write> DeltaWriters<W> {
    pub fn flush(&mut self) -> Result<()> {
        self.create.flush()?;
        self.update.flush()?;
        self.delete.flush()
    }
}

/// Sorts the rows behind a [`DeltaRanges`] into create/update/delete spools.
///
/// Row metadata carries no content version, so every id present on both
/// sides of an update range goes to the update spool. Unchanged rows that
/// share a range with a changed one are re-sent.
pub struct DeltaBuilder<'a, S: ?Sized, D: ?Sized> {
    migration_type: &'a MigrationType,
    source: &'a S,
    destination: &'a D,
    page_size: usize,
}

impl<'a, S, D> DeltaBuilder<'a, S, D>
where
    S: RowMetadataSource + ?Sized,
    D: RowMetadataSource + ?Sized,
{
    pub fn new(
        migration_type: &'a MigrationType,
        source: &'a S,
        destination: &'a D,
        page_size: usize,
    ) -> Self {
        Self {
            migration_type,
            source,
            destination,
            page_size,
        }
    }

    pub async fn build<W: Write>(
        &self,
        ranges: &DeltaRanges,
        out: &mut DeltaWriters<W>,
    ) -> Result<DeltaCounts> {
        let mut counts = DeltaCounts::default();

        for range in &ranges.insert_ranges {
            let mut cursor = self.cursor(self.source, *range);
            while let Some(row) = cursor.next().await? {
                out.create.write(&row)?;
                counts.create += 1;
            }
        }

        for range in &ranges.delete_ranges {
            let mut cursor = self.cursor(self.destination, *range);
            while let Some(row) = cursor.next().await? {
                out.delete.write(&row)?;
                counts.delete += 1;
            }
        }

        for range in &ranges.update_ranges {
            self.merge_range(*range, out, &mut counts).await?;
        }

        out.flush()?;
        debug!(
            "{}: expanded to {} create, {} update, {} delete rows",
            self.migration_type, counts.create, counts.update, counts.delete
        );
        Ok(counts)
    }

    fn cursor<'c, R: RowMetadataSource + ?Sized>(
        &'c self,
        rows: &'c R,
        range: IdRange,
    ) -> RangeCursor<'c, R> {
        RangeCursor::new(rows, self.migration_type, range, self.page_size)
    }

    /// Merge-join both sides of a mismatched range by id: source-only ids are
    /// creates, destination-only ids deletes, and shared ids updates whether
    /// or not the row itself changed.
    async fn merge_range<W: Write>(
        &self,
        range: IdRange,
        out: &mut DeltaWriters<W>,
        counts: &mut DeltaCounts,
    ) -> Result<()> {
        let mut src = self.cursor(self.source, range);
        let mut dest = self.cursor(self.destination, range);
        let mut src_row = src.next().await?;
        let mut dest_row = dest.next().await?;

        loop {
            match (src_row, dest_row) {
                (None, None) => break,
                (Some(s), None) => {
                    out.create.write(&s)?;
                    counts.create += 1;
                    src_row = src.next().await?;
                }
                (None, Some(d)) => {
                    out.delete.write(&d)?;
                    counts.delete += 1;
                    dest_row = dest.next().await?;
                }
                (Some(s), Some(d)) => match s.id.cmp(&d.id) {
                    Ordering::Less => {
                        out.create.write(&s)?;
                        counts.create += 1;
                        src_row = src.next().await?;
                    }
                    Ordering::Greater => {
                        out.delete.write(&d)?;
                        counts.delete += 1;
                        dest_row = dest.next().await?;
                    }
                    Ordering::Equal => {
                        out.update.write(&s)?;
                        counts.update += 1;
                        src_row = src.next().await?;
                        dest_row = dest.next().await?;
                    }
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spool::RowMetadataReader;
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct VecRows {
        rows: Vec<RowMetadata>,
        pages: AtomicUsize,
    }

    impl VecRows {
        fn new(mut rows: Vec<RowMetadata>) -> Self {
            rows.sort_by_key(|r| r.id);
            Self {
                rows,
                pages: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RowMetadataSource for VecRows {
        async fn row_metadata_page(
            &self,
            _migration_type: &MigrationType,
            min_id: i64,
            max_id: i64,
            limit: usize,
        ) -> Result<Vec<RowMetadata>> {
            self.pages.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self
                .rows
                .iter()
                .filter(|r| r.id >= min_id && r.id <= max_id)
                .take(limit)
                .copied()
                .collect())
        }
    }

    fn writers() -> DeltaWriters<Vec<u8>> {
        DeltaWriters {
            create: RowMetadataWriter::new(Vec::new()),
            update: RowMetadataWriter::new(Vec::new()),
            delete: RowMetadataWriter::new(Vec::new()),
        }
    }

    fn rows_of(writer: RowMetadataWriter<Vec<u8>>) -> Vec<RowMetadata> {
        let bytes = writer.into_inner().unwrap();
        RowMetadataReader::new(Cursor::new(bytes))
            .collect::<Result<_>>()
            .unwrap()
    }

    #[tokio::test]
    async fn test_cursor_pages_through_range() {
        let ty = MigrationType::new("NODE");
        let rows = VecRows::new((1..=25).map(RowMetadata::root).collect());
        let mut cursor = RangeCursor::new(&rows, &ty, IdRange::new(3, 22), 7);
        let mut seen = Vec::new();
        while let Some(row) = cursor.next().await.unwrap() {
            seen.push(row.id);
        }
        assert_eq!(seen, (3..=22).collect::<Vec<_>>());
        // 20 rows at 7 per page: 7 + 7 + 6
        assert_eq!(rows.pages.load(AtomicOrdering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cursor_rejects_rows_outside_range() {
        struct Sloppy;
        #[async_trait]
        impl RowMetadataSource for Sloppy {
            async fn row_metadata_page(
                &self,
                _migration_type: &MigrationType,
                _min_id: i64,
                _max_id: i64,
                _limit: usize,
            ) -> Result<Vec<RowMetadata>> {
                Ok(vec![RowMetadata::root(500)])
            }
        }
        let ty = MigrationType::new("NODE");
        let mut cursor = RangeCursor::new(&Sloppy, &ty, IdRange::new(1, 10), 5);
        assert!(matches!(
            cursor.next().await,
            Err(MigrateError::Oracle { .. })
        ));
    }

    #[tokio::test]
    async fn test_build_sorts_rows_into_spools() {
        let ty = MigrationType::new("NODE");
        let source = VecRows::new(vec![
            RowMetadata::root(1),
            RowMetadata::child(2, 1),
            RowMetadata::child(4, 1),
            RowMetadata::child(5, 4),
            RowMetadata::child(9, 1),
        ]);
        let destination = VecRows::new(vec![
            RowMetadata::root(1),
            RowMetadata::child(3, 1),
            RowMetadata::child(4, 1),
            RowMetadata::child(12, 1),
        ]);
        let ranges = DeltaRanges {
            migration_type: ty.clone(),
            insert_ranges: vec![IdRange::new(9, 9)],
            update_ranges: vec![IdRange::new(1, 5)],
            delete_ranges: vec![IdRange::new(10, 12)],
        };

        let mut out = writers();
        let counts = DeltaBuilder::new(&ty, &source, &destination, 2)
            .build(&ranges, &mut out)
            .await
            .unwrap();

        assert_eq!(
            counts,
            DeltaCounts {
                create: 3,
                update: 2,
                delete: 2
            }
        );
        assert_eq!(
            rows_of(out.create),
            vec![
                RowMetadata::child(9, 1),
                RowMetadata::child(2, 1),
                RowMetadata::child(5, 4)
            ]
        );
        assert_eq!(
            rows_of(out.update),
            vec![RowMetadata::root(1), RowMetadata::child(4, 1)]
        );
        assert_eq!(
            rows_of(out.delete),
            vec![RowMetadata::child(12, 1), RowMetadata::child(3, 1)]
        );
    }

    #[tokio::test]
    async fn test_unchanged_rows_in_update_range_are_resent() {
        let ty = MigrationType::new("NODE");
        let same: Vec<RowMetadata> = (1..=4).map(RowMetadata::root).collect();
        let source = VecRows::new(same.clone());
        let destination = VecRows::new(same.clone());
        let ranges = DeltaRanges {
            update_ranges: vec![IdRange::new(1, 4)],
            ..DeltaRanges::empty(ty.clone())
        };

        let mut out = writers();
        let counts = DeltaBuilder::new(&ty, &source, &destination, 10)
            .build(&ranges, &mut out)
            .await
            .unwrap();

        assert_eq!(counts.update, 4);
        assert_eq!(counts.create + counts.delete, 0);
        assert_eq!(rows_of(out.update), same);
    }
}
