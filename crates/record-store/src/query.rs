/// Builder for constructing launch listing queries.
///
/// Results are ordered by creation block, then transaction hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchQuery {
    /// Filter by liquidity flag.
    pub liquidity_added: Option<bool>,

    /// Filter by launch owner.
    pub owner_address: Option<String>,

    /// Filter to launches created at or after this block.
    pub from_block: Option<u64>,

    /// Maximum number of launches to return.
    pub limit: Option<usize>,

    /// Number of launches to skip.
    pub offset: Option<usize>,
}

impl LaunchQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by whether liquidity has been added.
    pub fn liquidity_added(mut self, added: bool) -> Self {
        self.liquidity_added = Some(added);
        self
    }

    /// Filters by launch owner.
    pub fn owner_address(mut self, owner: impl Into<String>) -> Self {
        self.owner_address = Some(owner.into());
        self
    }

    /// Filters to launches created at or after this block.
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    /// Limits the number of launches returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many launches before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}
