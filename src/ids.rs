/// Hands out increasing ids for one engine instance.
///
/// Each owner keeps its own allocator; numbering starts over whenever the
/// owner is rebuilt (profile swap, daemon restart), so ids are only unique
/// within one lifetime of their owner.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Id the next call to `next_id` will return
    pub fn peek(&self) -> u64 {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}
