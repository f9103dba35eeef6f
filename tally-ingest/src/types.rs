use serde::Deserialize;

/// One CSV row before normalization. Unknown columns are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerRow {
    pub id: String,
    pub user_id: String,
    /// Raw amount text: "1250.00", "$1,250.00", "-45.10", "(45.10)"
    pub amount: String,
    /// RFC 3339 timestamp or plain YYYY-MM-DD
    pub date: String,
    #[serde(default)]
    pub category: String,
}
