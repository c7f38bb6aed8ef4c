//! Lazy prefix cursor
//!
//! A forward-only sequence of key/value pairs bounded by a prefix. The
//! cursor pulls entries from its source in fixed-size batches, so walking a
//! few rows of a large object never materializes the whole object.

use std::collections::VecDeque;
use std::ops::Bound;

use tessera_core::{Result, SnapshotView};

/// Something that can hand out ordered batches of a prefix range
///
/// Implemented for any [`SnapshotView`] and by the transaction context,
/// which merges its own pending writes into the batches it returns.
pub trait BatchSource {
    /// Up to `limit` entries under `prefix`, starting at `from`
    fn next_batch(
        &mut self,
        prefix: &[u8],
        from: Bound<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

impl<T: SnapshotView + ?Sized> BatchSource for &T {
    fn next_batch(
        &mut self,
        prefix: &[u8],
        from: Bound<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .scan_batch(prefix, from, limit)?
            .into_iter()
            .map(|(key, vv)| (key, vv.value))
            .collect())
    }
}

impl<T: BatchSource + ?Sized> BatchSource for &mut T {
    fn next_batch(
        &mut self,
        prefix: &[u8],
        from: Bound<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        (**self).next_batch(prefix, from, limit)
    }
}

/// Where a cursor starts and how much it yields
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// First key to consider (inclusive); `None` starts at the prefix
    pub start: Option<Vec<u8>>,
    /// Entries to skip before yielding
    pub offset: u64,
    /// Maximum entries to yield; 0 means no cap
    pub limit: u64,
    /// Entries fetched from the source per refill
    pub batch_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            start: None,
            offset: 0,
            limit: 0,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Refill size used when none is configured
pub const DEFAULT_BATCH_SIZE: usize = 1280;

impl ScanOptions {
    /// Options with only a limit
    pub fn limit(limit: u64) -> Self {
        ScanOptions {
            limit,
            ..Default::default()
        }
    }

    /// Builder: start key
    pub fn with_start(mut self, start: Vec<u8>) -> Self {
        self.start = Some(start);
        self
    }

    /// Builder: skip offset
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Builder: refill size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Forward-only cursor over a prefix range
pub struct ScanCursor<S: BatchSource> {
    source: S,
    prefix: Vec<u8>,
    start: Option<Vec<u8>>,
    last_key: Option<Vec<u8>>,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    batch_size: usize,
    skip: u64,
    remaining: Option<u64>,
    exhausted: bool,
}

impl<S: BatchSource> ScanCursor<S> {
    /// Open a cursor over `prefix`
    pub fn new(source: S, prefix: Vec<u8>, options: ScanOptions) -> Self {
        ScanCursor {
            source,
            prefix,
            start: options.start,
            last_key: None,
            buffer: VecDeque::new(),
            batch_size: options.batch_size.max(1),
            skip: options.offset,
            remaining: if options.limit == 0 {
                None
            } else {
                Some(options.limit)
            },
            exhausted: false,
        }
    }

    /// Release the source; later calls to `next` yield nothing
    pub fn close(&mut self) {
        self.exhausted = true;
        self.buffer.clear();
    }

    /// Collect only the keys
    pub fn keys(self) -> Result<Vec<Vec<u8>>> {
        self.map(|entry| entry.map(|(key, _)| key)).collect()
    }

    /// Collect only the values
    pub fn values(self) -> Result<Vec<Vec<u8>>> {
        self.map(|entry| entry.map(|(_, value)| value)).collect()
    }

    /// Consume and count the entries, ignoring values
    pub fn count_entries(self) -> Result<u64> {
        let mut count = 0;
        for entry in self {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn refill(&mut self) -> Result<()> {
        let from = match (&self.last_key, &self.start) {
            (Some(last), _) => Bound::Excluded(last.as_slice()),
            (None, Some(start)) => Bound::Included(start.as_slice()),
            (None, None) => Bound::Unbounded,
        };
        let batch = self.source.next_batch(&self.prefix, from, self.batch_size)?;
        if batch.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some((key, _)) = batch.last() {
            self.last_key = Some(key.clone());
        }
        self.buffer.extend(batch);
        Ok(())
    }

    fn next_raw(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                if !entry.0.starts_with(&self.prefix) {
                    self.close();
                    return Ok(None);
                }
                return Ok(Some(entry));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.refill()?;
        }
    }
}

impl<S: BatchSource> Iterator for ScanCursor<S> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            match self.next_raw() {
                Ok(Some(entry)) => {
                    if self.skip > 0 {
                        self.skip -= 1;
                        continue;
                    }
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    return Some(Ok(entry));
                }
                Ok(None) => return None,
                Err(e) => {
                    self.close();
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UnifiedStore;
    use std::sync::Arc;
    use tessera_core::Storage;

    fn store_with(keys: &[&[u8]]) -> Arc<UnifiedStore> {
        let store = Arc::new(UnifiedStore::new());
        let writes = keys.iter().map(|k| (k.to_vec(), k.to_vec())).collect();
        store.apply_batch(writes, vec![], 1).unwrap();
        store
    }

    #[test]
    fn test_cursor_walks_prefix_across_batches() {
        let keys: Vec<Vec<u8>> = (0..10u8).map(|i| vec![b'p', i]).collect();
        let mut refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        refs.push(b"q0");
        let store = store_with(&refs);
        let snap = store.snapshot();

        let cursor = ScanCursor::new(
            &snap,
            b"p".to_vec(),
            ScanOptions::default().with_batch_size(3),
        );
        assert_eq!(cursor.keys().unwrap(), keys);
    }

    #[test]
    fn test_cursor_offset_and_limit() {
        let store = store_with(&[b"a1", b"a2", b"a3", b"a4", b"a5"]);
        let snap = store.snapshot();
        let cursor = ScanCursor::new(
            &snap,
            b"a".to_vec(),
            ScanOptions::limit(2).with_offset(1).with_batch_size(2),
        );
        assert_eq!(cursor.keys().unwrap(), vec![b"a2".to_vec(), b"a3".to_vec()]);
    }

    #[test]
    fn test_cursor_start_is_inclusive() {
        let store = store_with(&[b"a1", b"a2", b"a3"]);
        let snap = store.snapshot();
        let cursor = ScanCursor::new(
            &snap,
            b"a".to_vec(),
            ScanOptions::default().with_start(b"a2".to_vec()),
        );
        assert_eq!(cursor.keys().unwrap(), vec![b"a2".to_vec(), b"a3".to_vec()]);
    }

    #[test]
    fn test_cursor_close_stops_iteration() {
        let store = store_with(&[b"a1", b"a2"]);
        let snap = store.snapshot();
        let mut cursor = ScanCursor::new(&snap, b"a".to_vec(), ScanOptions::default());
        assert!(cursor.next().is_some());
        cursor.close();
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_cursor_empty_prefix_range() {
        let store = store_with(&[b"a1"]);
        let snap = store.snapshot();
        let cursor = ScanCursor::new(&snap, b"z".to_vec(), ScanOptions::default());
        assert_eq!(cursor.count_entries().unwrap(), 0);
    }
}
