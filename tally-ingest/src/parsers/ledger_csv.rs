//! Generic ledger CSV parser.
//!
//! Expected header (any order, extra columns ignored):
//!   id,user_id,amount,date,category
//!
//! Rows that cannot be understood are skipped with a warning, the way the
//! statement parsers skip unparseable lines.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use tally_core::Transaction;

use crate::types::LedgerRow;

const REQUIRED_COLUMNS: [&str; 4] = ["id", "user_id", "amount", "date"];

/// Largest accepted magnitude. Keeps every per-day sum far from the
/// `Decimal` overflow point.
const MAX_ABS_AMOUNT: i64 = 1_000_000_000_000_000;

pub fn parse_ledger_csv(path: impl AsRef<Path>) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_ledger_reader(file).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_ledger_reader(reader: impl Read) -> Result<Vec<Transaction>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("reading CSV header")?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .collect();
    if !missing.is_empty() {
        bail!("missing column(s): {}", missing.join(", "));
    }

    let amount_re = amount_regex()?;
    let mut out = Vec::new();

    for (line, result) in rdr.deserialize::<LedgerRow>().enumerate() {
        // +2: one for the header, one for 1-based numbering
        let line = line + 2;
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                log::warn!("line {line}: skipping malformed row: {e}");
                continue;
            }
        };

        let Some(amount) = parse_amount(&row.amount, &amount_re) else {
            log::warn!("line {line}: skipping row {}: bad amount {:?}", row.id, row.amount);
            continue;
        };
        let Some(date) = parse_date(&row.date) else {
            log::warn!("line {line}: skipping row {}: bad date {:?}", row.id, row.date);
            continue;
        };
        if row.id.is_empty() || row.user_id.is_empty() {
            log::warn!("line {line}: skipping row without id or user_id");
            continue;
        }

        out.push(Transaction::new(row.id, row.user_id, amount, date, row.category));
    }

    Ok(out)
}

fn amount_regex() -> Result<Regex> {
    Ok(Regex::new(concat!(
        r"^(?P<sign>[-+])?\s*\$?\s*",
        r"(?P<int>\d{1,3}(?:,\d{3})+|\d+)",
        r"(?P<frac>\.\d+)?$"
    ))?)
}

/// "$1,250.00" -> 1250.00, "(45.10)" -> -45.10, "-3" -> -3
fn parse_amount(raw: &str, re: &Regex) -> Option<Decimal> {
    let raw = raw.trim();
    let (negated, body) = match raw.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner.trim()),
        None => (false, raw),
    };

    let caps = re.captures(body)?;
    let int = caps["int"].replace(',', "");
    let frac = caps.name("frac").map(|m| m.as_str()).unwrap_or("");
    let mut amount = Decimal::from_str(&format!("{int}{frac}")).ok()?;
    if amount > Decimal::from(MAX_ABS_AMOUNT) {
        return None;
    }

    let minus = caps.name("sign").is_some_and(|m| m.as_str() == "-");
    if minus != negated {
        amount = -amount;
    } else if minus && negated {
        // "(-5)" is still a debit
        amount = -amount.abs();
    }
    Some(amount)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parses_basic_rows() {
        let csv = "\
id,user_id,amount,date,category,note
t1,u1,100,2024-03-01,Salary,march pay
t2,u1,-45.10,2024-03-02T18:30:00-05:00,Food,
t3,u2,\"$1,250.00\",2024-03-03 08:00:00,Freelance,
t4,u1,(12.5),2024-03-04,,
";
        let txns = parse_ledger_reader(csv.as_bytes()).unwrap();
        assert_eq!(txns.len(), 4);

        assert_eq!(txns[0].amount, dec!(100));
        assert_eq!(txns[0].date, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(txns[0].category, "Salary");

        assert_eq!(txns[1].amount, dec!(-45.10));
        assert_eq!(txns[1].date, Utc.with_ymd_and_hms(2024, 3, 2, 23, 30, 0).unwrap());

        assert_eq!(txns[2].amount, dec!(1250.00));
        assert_eq!(txns[2].user_id, "u2");

        assert_eq!(txns[3].amount, dec!(-12.5));
        assert_eq!(txns[3].category, "");
    }

    #[test]
    fn test_skips_unparseable_rows() {
        let csv = "\
id,user_id,amount,date,category
ok,u1,10,2024-01-01,A
bad-amount,u1,ten,2024-01-01,A
bad-date,u1,10,01/02/2024,A
,u1,10,2024-01-01,A
";
        let txns = parse_ledger_reader(csv.as_bytes()).unwrap();
        let ids: Vec<&str> = txns.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
    }

    #[test]
    fn test_missing_columns_is_an_error() {
        let err = parse_ledger_reader("id,amount\n1,2\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("user_id"));
        assert!(err.to_string().contains("date"));
    }

    #[test]
    fn test_amount_formats() {
        let re = amount_regex().unwrap();
        assert_eq!(parse_amount("0", &re), Some(Decimal::ZERO));
        assert_eq!(parse_amount("+7.25", &re), Some(dec!(7.25)));
        assert_eq!(parse_amount("- $14.05", &re), Some(dec!(-14.05)));
        assert_eq!(parse_amount("(-5)", &re), Some(dec!(-5)));
        assert_eq!(parse_amount("1,25", &re), None);
        assert_eq!(parse_amount("", &re), None);
    }

    #[test]
    fn test_rejects_out_of_range_amounts() {
        let re = amount_regex().unwrap();
        assert_eq!(parse_amount("1000000000000000", &re), Some(dec!(1000000000000000)));
        assert_eq!(parse_amount("-1000000000000000.01", &re), None);
        assert_eq!(parse_amount("50000000000000000000000000000", &re), None);

        let csv = "\
id,user_id,amount,date,category
big1,u1,50000000000000000000000000000,2024-01-01,A
big2,u1,50000000000000000000000000000,2024-01-01,A
ok,u1,10,2024-01-01,A
";
        let txns = parse_ledger_reader(csv.as_bytes()).unwrap();
        let ids: Vec<&str> = txns.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
    }
}
