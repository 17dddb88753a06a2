//! Catalog listing queries: ordered sort keys plus skip/limit paging.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use pricefeed_core::DomainError;

use crate::product::Product;

/// Page size used when a caller asks for `0`.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Sortable product attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    Name,
    Price,
    UpdatedAt,
    PriceUpdateCount,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Name => "name",
            SortField::Price => "price",
            SortField::UpdatedAt => "updated_at",
            SortField::PriceUpdateCount => "price_update_count",
        }
    }

    fn compare(&self, a: &Product, b: &Product) -> Ordering {
        match self {
            SortField::Id => a.id_typed().cmp(&b.id_typed()),
            SortField::Name => a.name().cmp(b.name()),
            SortField::Price => a.price().total_cmp(&b.price()),
            SortField::UpdatedAt => a.updated_at().cmp(&b.updated_at()),
            SortField::PriceUpdateCount => a.price_update_count().cmp(&b.price_update_count()),
        }
    }
}

impl FromStr for SortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(SortField::Id),
            "name" => Ok(SortField::Name),
            "price" => Ok(SortField::Price),
            "updated_at" | "updatedat" | "updated" => Ok(SortField::UpdatedAt),
            "price_update_count" | "priceupdatecount" | "price_updates" => {
                Ok(SortField::PriceUpdateCount)
            }
            other => Err(DomainError::validation(format!("unknown sort field '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = DomainError;

    /// Accepts `asc`/`desc` (and long forms) as well as `1`/`-1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Ok(SortDirection::Ascending),
            "desc" | "descending" | "-1" => Ok(SortDirection::Descending),
            other => Err(DomainError::validation(format!("unknown sort direction '{other}'"))),
        }
    }
}

/// One `(field, direction)` sort criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }
}

impl FromStr for SortKey {
    type Err = DomainError;

    /// `field` or `field:direction`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.split_once(':') {
            Some((f, d)) => (f.parse()?, d.parse()?),
            None => (s.parse()?, SortDirection::Ascending),
        };
        Ok(Self { field, direction })
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        };
        write!(f, "{}:{}", self.field.as_str(), dir)
    }
}

/// A page of the catalog.
///
/// Sort keys apply in order; ties left after the last key are broken by
/// ascending product id so that paging is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub order_by: Vec<SortKey>,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub page_number: u32,
}

impl ListQuery {
    pub fn new(order_by: Vec<SortKey>, page_size: u32, page_number: u32) -> Self {
        Self {
            order_by,
            page_size,
            page_number,
        }
    }

    /// Parse a comma-separated `order_by` string such as `price:desc,name`.
    pub fn parse_order_by(raw: &str) -> Result<Vec<SortKey>, DomainError> {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }

    /// Rows to return (page size, `0` meaning the default).
    pub fn limit(&self) -> u32 {
        if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        }
    }

    /// Rows to skip: `page_size * page_number`.
    ///
    /// Uses the requested page size, so `page_size = 0` always skips nothing.
    pub fn skip(&self) -> u64 {
        u64::from(self.page_size) * u64::from(self.page_number)
    }

    /// Total order over products implied by this query.
    pub fn compare(&self, a: &Product, b: &Product) -> Ordering {
        self.order_by
            .iter()
            .map(|key| {
                let ord = key.field.compare(a, b);
                match key.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| a.id_typed().cmp(&b.id_typed()))
    }
}
