//! Fixed-size batching of an ordered id list

use crate::error::{Error, Result};

/// Split `ids` into consecutive chunks of at most `max_size` items.
///
/// Order is preserved within and across chunks, no chunk is empty, and an
/// empty input yields no chunks at all.
pub fn partition<T: Clone>(ids: &[T], max_size: usize) -> Result<Vec<Vec<T>>> {
    if max_size == 0 {
        return Err(Error::InvalidBatchSize);
    }
    Ok(ids.chunks(max_size).map(<[T]>::to_vec).collect())
}
