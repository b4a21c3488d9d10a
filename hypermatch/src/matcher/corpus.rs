use std::sync::Arc;

/// An ordered set of byte blocks scanned as one logical stream.
///
/// Blocks are packed once into a single contiguous buffer when the corpus is
/// built, so the scan sees them back to back: `^` anchors at the start of the
/// first block, `$` at the end of the last one, and a match may straddle a
/// block boundary. The bytes live behind an `Arc`, so a corpus crosses over to
/// a worker thread, and is cloned for a retry, without copying them again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectoredCorpus {
    data: Arc<[u8]>,
    ends: Arc<[usize]>,
}

impl VectoredCorpus {
    pub fn from_blocks<B: AsRef<[u8]>>(blocks: &[B]) -> Self {
        if let [block] = blocks {
            return Self::from(Arc::<[u8]>::from(block.as_ref()));
        }

        let total = blocks.iter().map(|b| b.as_ref().len()).sum();
        let mut data = Vec::with_capacity(total);
        let mut ends = Vec::with_capacity(blocks.len());
        for block in blocks {
            data.extend_from_slice(block.as_ref());
            ends.push(data.len());
        }
        Self {
            data: data.into(),
            ends: ends.into(),
        }
    }

    /// The packed stream
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn block_count(&self) -> usize {
        self.ends.len()
    }

    /// Iterates the original blocks in order
    pub fn blocks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let starts = std::iter::once(0).chain(self.ends.iter().copied());
        starts
            .zip(self.ends.iter().copied())
            .map(move |(start, end)| &self.data[start..end])
    }
}

/// A single block already held in a shared buffer; no bytes are copied
impl From<Arc<[u8]>> for VectoredCorpus {
    fn from(data: Arc<[u8]>) -> Self {
        let ends = Arc::from([data.len()]);
        Self { data, ends }
    }
}
