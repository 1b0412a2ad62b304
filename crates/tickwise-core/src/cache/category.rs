use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ValidationError};

/// Data-type tag that partitions the cache and selects a TTL policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CompanyInfo,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    Dividends,
    PriceData,
}

impl Category {
    pub const ALL: [Self; 6] = [
        Self::CompanyInfo,
        Self::IncomeStatement,
        Self::BalanceSheet,
        Self::CashFlow,
        Self::Dividends,
        Self::PriceData,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CompanyInfo => "company_info",
            Self::IncomeStatement => "income_statement",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
            Self::Dividends => "dividends",
            Self::PriceData => "price_data",
        }
    }

    /// Statement categories are keyed by reporting frequency as well as ticker.
    pub const fn uses_frequency(self) -> bool {
        matches!(
            self,
            Self::IncomeStatement | Self::BalanceSheet | Self::CashFlow
        )
    }

    /// Default lifetime of a record. Prices go stale within the trading day,
    /// filed statements only change when a new period is reported.
    pub const fn default_ttl_hours(self) -> u32 {
        match self {
            Self::CompanyInfo | Self::IncomeStatement | Self::BalanceSheet | Self::CashFlow => 168,
            Self::Dividends => 24,
            Self::PriceData => 1,
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "company_info" | "info" => Ok(Self::CompanyInfo),
            "income_statement" | "income" => Ok(Self::IncomeStatement),
            "balance_sheet" | "balance" => Ok(Self::BalanceSheet),
            "cash_flow" | "cashflow" => Ok(Self::CashFlow),
            "dividends" | "dividend" => Ok(Self::Dividends),
            "price_data" | "price" => Ok(Self::PriceData),
            _ => Err(ValidationError::UnknownCategory {
                value: input.to_owned(),
            }),
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// TTL and enable flag for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPolicy {
    pub ttl_hours: u32,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl CategoryPolicy {
    pub const fn new(ttl_hours: u32, enabled: bool) -> Self {
        Self { ttl_hours, enabled }
    }

    pub const fn disabled() -> Self {
        Self::new(0, false)
    }
}

/// Per-category cache policy, fixed for the lifetime of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    policies: BTreeMap<Category, CategoryPolicy>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            policies: Category::ALL
                .into_iter()
                .map(|category| {
                    (
                        category,
                        CategoryPolicy::new(category.default_ttl_hours(), true),
                    )
                })
                .collect(),
        }
    }
}

impl CachePolicy {
    /// Build a policy from configured overrides; categories not mentioned keep their defaults.
    ///
    /// An enabled category with a zero TTL is rejected.
    pub fn from_overrides(
        overrides: &BTreeMap<Category, CategoryPolicy>,
    ) -> Result<Self, ConfigError> {
        let mut policy = Self::default();
        for (category, entry) in overrides {
            if entry.enabled && entry.ttl_hours == 0 {
                return Err(ConfigError::InvalidTtl {
                    category: category.as_str(),
                });
            }
            policy.policies.insert(*category, *entry);
        }
        Ok(policy)
    }

    /// A policy with every category disabled.
    pub fn all_disabled() -> Self {
        Self {
            policies: Category::ALL
                .into_iter()
                .map(|category| (category, CategoryPolicy::disabled()))
                .collect(),
        }
    }

    pub fn with(mut self, category: Category, entry: CategoryPolicy) -> Self {
        self.policies.insert(category, entry);
        self
    }

    pub fn for_category(&self, category: Category) -> CategoryPolicy {
        self.policies
            .get(&category)
            .copied()
            .unwrap_or_else(|| CategoryPolicy::new(category.default_ttl_hours(), true))
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        let entry = self.for_category(category);
        entry.enabled && entry.ttl_hours > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_on_enabled_category_is_rejected() {
        let overrides =
            BTreeMap::from([(Category::PriceData, CategoryPolicy::new(0, true))]);
        let err = CachePolicy::from_overrides(&overrides).expect_err("must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidTtl {
                category: "price_data"
            }
        ));
    }

    #[test]
    fn overrides_leave_other_categories_at_defaults() {
        let overrides =
            BTreeMap::from([(Category::Dividends, CategoryPolicy::new(0, false))]);
        let policy = CachePolicy::from_overrides(&overrides).expect("valid overrides");
        assert!(!policy.is_enabled(Category::Dividends));
        assert_eq!(policy.for_category(Category::PriceData).ttl_hours, 1);
        assert!(policy.is_enabled(Category::CompanyInfo));
    }

    #[test]
    fn category_aliases_parse() {
        assert_eq!(Category::parse("cash-flow"), Ok(Category::CashFlow));
        assert_eq!(Category::parse("price"), Ok(Category::PriceData));
        assert!(Category::parse("options").is_err());
    }
}
