//! Query filter criteria and result pages

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::AggregatedRecord;

/// Page size used when the caller does not pick one
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Field to rank tokens by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Volume,
    PriceChange,
    MarketCap,
    Liquidity,
    /// Unrecognized key, every comparison is equal
    #[serde(other)]
    Unranked,
}

impl SortKey {
    pub fn name(&self) -> &'static str {
        match self {
            SortKey::Volume => "volume",
            SortKey::PriceChange => "price_change",
            SortKey::MarketCap => "market_cap",
            SortKey::Liquidity => "liquidity",
            SortKey::Unranked => "unranked",
        }
    }
}

impl FromStr for SortKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "volume" => SortKey::Volume,
            "price_change" => SortKey::PriceChange,
            "market_cap" => SortKey::MarketCap,
            "liquidity" => SortKey::Liquidity,
            _ => SortKey::Unranked,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        })
    }
}

/// Window whose price change `SortKey::PriceChange` ranks by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
}

impl Timeframe {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1h" => Some(Timeframe::OneHour),
            "24h" => Some(Timeframe::OneDay),
            "7d" => Some(Timeframe::SevenDays),
            _ => None,
        }
    }

    /// Change percentage for this window, missing values rank as zero
    pub fn change_of(&self, record: &AggregatedRecord) -> f64 {
        let change = match self {
            Timeframe::OneHour => record.token.price_1h_change,
            Timeframe::OneDay => record.token.price_24h_change,
            Timeframe::SevenDays => record.token.price_7d_change,
        };
        change.unwrap_or(0.0)
    }
}

/// Filter, sort and pagination options for a token listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub min_volume: Option<f64>,
    pub min_liquidity: Option<f64>,
    pub sort_by: Option<SortKey>,
    pub sort_order: Option<SortOrder>,
    pub timeframe: Option<Timeframe>,
    pub limit: Option<usize>,
    /// Decimal offset returned as `next_cursor` by the previous page
    pub cursor: Option<String>,
}

impl FilterSpec {
    /// Build from raw query parameters as an HTTP router receives them
    ///
    /// Unparseable numbers are treated as absent.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let number = |key: &str| params.get(key).and_then(|v| v.trim().parse::<f64>().ok());

        Self {
            min_volume: number("minVolume"),
            min_liquidity: number("minLiquidity"),
            sort_by: params.get("sortBy").map(|v| v.parse().unwrap_or_default()),
            sort_order: params.get("sortOrder").map(|v| v.parse().unwrap_or_default()),
            timeframe: params.get("timeframe").and_then(|v| Timeframe::parse(v)),
            limit: params.get("limit").and_then(|v| v.trim().parse().ok()),
            cursor: params.get("cursor").cloned(),
        }
    }

    pub fn with_min_volume(mut self, min: f64) -> Self {
        self.min_volume = Some(min);
        self
    }

    pub fn with_min_liquidity(mut self, min: f64) -> Self {
        self.min_liquidity = Some(min);
        self
    }

    pub fn sorted(mut self, key: SortKey, order: SortOrder) -> Self {
        self.sort_by = Some(key);
        self.sort_order = Some(order);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn matches(&self, record: &AggregatedRecord) -> bool {
        self.min_volume.map_or(true, |min| record.token.volume_sol >= min)
            && self
                .min_liquidity
                .map_or(true, |min| record.token.liquidity_sol >= min)
    }

    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(limit) if limit > 0 => limit,
            _ => DEFAULT_PAGE_LIMIT,
        }
    }

    /// Offset encoded in the cursor, unparseable cursors start from zero
    pub fn offset(&self) -> usize {
        self.cursor
            .as_deref()
            .and_then(|c| c.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// One page of a filtered, sorted listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub data: Vec<AggregatedRecord>,
    pub next_cursor: Option<String>,
    /// Matching records before slicing
    pub total: usize,
}
