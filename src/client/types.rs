//! Quote service data types
//!
//! Request parameters and result records shared by every client
//! implementation. All records serialize with serde so they can be turned
//! into [`Table`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exchange a security is listed on, with its wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Shenzhen,
    Shanghai,
}

impl Market {
    pub fn code(self) -> u8 {
        match self {
            Market::Shenzhen => 0,
            Market::Shanghai => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Market::Shenzhen),
            1 => Some(Market::Shanghai),
            _ => None,
        }
    }
}

/// K-line bar period, with its wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarCategory {
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    OneMinute,
    Quarterly,
    Yearly,
}

impl BarCategory {
    pub fn code(self) -> u16 {
        match self {
            BarCategory::FiveMinutes => 0,
            BarCategory::FifteenMinutes => 1,
            BarCategory::ThirtyMinutes => 2,
            BarCategory::Hourly => 3,
            BarCategory::Daily => 4,
            BarCategory::Weekly => 5,
            BarCategory::Monthly => 6,
            BarCategory::OneMinute => 8,
            BarCategory::Quarterly => 10,
            BarCategory::Yearly => 11,
        }
    }
}

/// A security identified by market and code (e.g. `600300`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityId {
    pub market: Market,
    pub code: String,
}

impl SecurityId {
    pub fn new(market: Market, code: impl Into<String>) -> Self {
        Self {
            market,
            code: code.into(),
        }
    }
}

/// Entry of the security list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub code: String,
    pub name: String,
    pub volunit: u32,
    pub decimal_point: u8,
    pub pre_close: f64,
}

/// One K-line bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// `YYYY-MM-DD HH:MM`
    pub datetime: String,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub amount: f64,
}

/// Realtime quote snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub market: Market,
    pub code: String,
    pub price: f64,
    pub last_close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: u64,
    pub amount: f64,
    pub bid1: f64,
    pub ask1: f64,
    pub servertime: String,
}

/// Price and volume for one minute of trading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteTick {
    pub price: f64,
    pub volume: u64,
}

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
    Neutral,
}

/// One tick-by-tick transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// `HH:MM`
    pub time: String,
    pub price: f64,
    pub volume: u64,
    pub side: TradeSide,
}

/// Table-of-contents entry of an F10 company information file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInfoCategory {
    pub name: String,
    pub filename: String,
    pub start: u32,
    pub length: u32,
}

/// Ex-dividend / ex-rights event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XdxrRecord {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub category: u8,
    pub name: String,
    /// Cash dividend per 10 shares
    pub cash_dividend: Option<f64>,
    /// Bonus shares per 10 shares
    pub bonus_shares: Option<f64>,
    /// Rights shares per 10 shares
    pub rights_shares: Option<f64>,
    pub rights_price: Option<f64>,
}

/// Financial summary of a listed company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceInfo {
    pub market: Market,
    pub code: String,
    pub updated_date: u32,
    pub float_shares: f64,
    pub total_shares: f64,
    pub total_assets: f64,
    pub net_assets: f64,
    pub revenue: f64,
    pub net_profit: f64,
}

/// Column-oriented view over a list of records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table from JSON records.
    ///
    /// Columns appear in first-seen order; records missing a column get
    /// `null`. Records that are not objects land in a single `value` column.
    pub fn from_records(records: &[Value]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            match record {
                Value::Object(fields) => {
                    for key in fields.keys() {
                        if !columns.iter().any(|c| c == key) {
                            columns.push(key.clone());
                        }
                    }
                }
                _ => {
                    if !columns.iter().any(|c| c == "value") {
                        columns.push("value".to_string());
                    }
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| match record {
                        Value::Object(fields) => {
                            fields.get(column).cloned().unwrap_or(Value::Null)
                        }
                        other if column == "value" => other.clone(),
                        _ => Value::Null,
                    })
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column, `None` if the column does not exist
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }
}

/// Serialize typed results into records accepted by `to_table`
pub fn records<T: Serialize>(items: &[T]) -> Result<Vec<Value>, serde_json::Error> {
    items.iter().map(serde_json::to_value).collect()
}
