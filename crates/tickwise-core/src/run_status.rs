use serde::{Deserialize, Serialize};

/// Overall outcome of a screening or monitoring run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Some items were excluded or failed; the rest completed.
    Partial,
    /// Nothing could be produced because the provider was unavailable for every item.
    Failed,
}

impl RunStatus {
    /// Fold per-item results into a run status.
    ///
    /// `failures` counts excluded or failed items, `unavailable` how many of
    /// those failed for lack of a provider.
    pub fn from_counts(total: usize, failures: usize, unavailable: usize) -> Self {
        if total > 0 && unavailable == total {
            Self::Failed
        } else if failures > 0 {
            Self::Partial
        } else {
            Self::Success
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_unavailable_is_failed_but_mixed_is_partial() {
        assert_eq!(RunStatus::from_counts(3, 3, 3), RunStatus::Failed);
        assert_eq!(RunStatus::from_counts(3, 3, 2), RunStatus::Partial);
        assert_eq!(RunStatus::from_counts(3, 0, 0), RunStatus::Success);
        assert_eq!(RunStatus::from_counts(0, 0, 0), RunStatus::Success);
    }
}
