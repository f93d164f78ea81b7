//! Auto-split bookkeeping.
//!
//! A request for more items than a source's threshold is issued as a series
//! of chunk requests under one operation id. [`AutoSplit`] rewrites each
//! chunk-local `remaining` into the remaining count of the whole request and
//! says when the next chunk is due.

/// Paging of one chunk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub skip: u32,
    pub count: u32,
}

#[derive(Debug)]
pub(crate) struct AutoSplit {
    /// Items still owed to the caller.
    remaining: u32,
    threshold: u32,
    skip: u32,
    chunk_requested: u32,
    chunk_first: bool,
}

impl AutoSplit {
    /// Split state for `count` items starting at `skip`, when `count` exceeds
    /// `threshold`.
    pub fn new(skip: u32, count: u32, threshold: u32) -> Option<Self> {
        if threshold == 0 || count <= threshold {
            return None;
        }
        Some(Self {
            remaining: count,
            threshold,
            skip,
            chunk_requested: threshold,
            chunk_first: true,
        })
    }

    pub fn current_chunk(&self) -> Chunk {
        Chunk {
            skip: self.skip,
            count: self.chunk_requested,
        }
    }

    /// Map the provider's chunk-local `remaining` to the request-wide value.
    ///
    /// On the first item of a chunk, a provider reporting fewer items than
    /// the chunk asked for is taken to have run out: the request shrinks to
    /// what that chunk can still produce.
    pub fn translate(&mut self, provider_remaining: u32) -> u32 {
        if self.chunk_first {
            if provider_remaining < self.chunk_requested.saturating_sub(1) {
                self.remaining = provider_remaining + 1;
            }
            self.chunk_first = false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    /// Advance to the next chunk once the provider closed the current one
    /// while items are still owed.
    pub fn next_chunk(&mut self, provider_remaining: u32) -> Option<Chunk> {
        if provider_remaining != 0 || self.remaining == 0 {
            return None;
        }
        self.skip += self.chunk_requested;
        self.chunk_first = true;
        if self.remaining < self.threshold {
            self.chunk_requested = self.remaining;
        }
        Some(self.current_chunk())
    }
}
