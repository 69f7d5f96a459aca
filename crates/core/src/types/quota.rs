//! Per-user product quota.
//!
//! The limit is cooperative: callers count the owner's rows in the current
//! snapshot before offering the add flow. Nothing stops a direct insert.

use serde::Serialize;

/// Default number of products a single user may list.
pub const MAX_PRODUCTS_PER_USER: usize = 5;

/// How much of the quota an owner has used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quota {
    pub used: usize,
    pub limit: usize,
}

impl Quota {
    #[must_use]
    pub const fn new(used: usize, limit: usize) -> Self {
        Self { used, limit }
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used)
    }

    #[must_use]
    pub const fn is_reached(&self) -> bool {
        self.used >= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_boundaries() {
        assert!(!Quota::new(4, MAX_PRODUCTS_PER_USER).is_reached());
        assert!(Quota::new(5, MAX_PRODUCTS_PER_USER).is_reached());
        assert_eq!(Quota::new(7, 5).remaining(), 0);
        assert_eq!(Quota::new(2, 5).remaining(), 3);
    }
}
