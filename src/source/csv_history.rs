use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::io::Read;

use crate::types::{PriceRecord, TimeSeriesFrame, DATE_COLUMN};

const MISSING_MARKERS: [&str; 4] = ["", "null", "nan", "na"];

/// Parses a daily-history CSV (`Date,<numeric columns...>`) into a frame.
///
/// Missing markers and non-finite numbers become `None`; cleaning decides
/// what to do with them. Rows may arrive in any order, duplicate dates are
/// rejected.
pub fn parse_history_csv<R: Read>(reader: R) -> Result<TimeSeriesFrame> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("history CSV has no header row")?.clone();
    let date_idx = headers
        .iter()
        .position(|h| h == DATE_COLUMN)
        .ok_or_else(|| anyhow!("history CSV has no '{}' column", DATE_COLUMN))?;

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_idx)
        .map(|(_, h)| h.to_string())
        .collect();

    if columns.is_empty() {
        return Err(anyhow!("history CSV has no value columns"));
    }

    let mut records = Vec::new();
    let mut seen = HashSet::new();

    for (line, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("malformed CSV row {}", line + 2))?;
        let raw_date = row
            .get(date_idx)
            .ok_or_else(|| anyhow!("row {} has no date", line + 2))?;
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .with_context(|| format!("row {}: bad date '{}'", line + 2, raw_date))?;

        if !seen.insert(date) {
            return Err(anyhow!("duplicate date {} in history", date));
        }

        let values = row
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_idx)
            .map(|(_, cell)| parse_cell(cell))
            .collect::<Vec<_>>();

        if values.len() != columns.len() {
            return Err(anyhow!(
                "row {} has {} values, expected {}",
                line + 2,
                values.len(),
                columns.len()
            ));
        }

        records.push(PriceRecord::new(date, values));
    }

    Ok(TimeSeriesFrame::from_unsorted(columns, records)?)
}

fn parse_cell(cell: &str) -> Option<f64> {
    if MISSING_MARKERS.iter().any(|m| cell.eq_ignore_ascii_case(m)) {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Date,Open,High,Low,Close,Adj Close,Volume
2021-01-05,4.10,4.30,4.00,4.25,4.25,120000
2021-01-04,4.00,4.20,3.90,4.05,4.05,100000
2021-01-06,null,null,null,null,null,null
";

    #[test]
    fn test_parse_sorts_and_keeps_missing() {
        let frame = parse_history_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            frame.columns(),
            &["Open", "High", "Low", "Close", "Adj Close", "Volume"]
        );
        assert_eq!(frame.len(), 3);
        assert_eq!(
            frame.records()[0].date,
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap()
        );
        assert_eq!(frame.records()[0].values[3], Some(4.05));
        assert_eq!(frame.missing_count(), 1);
    }

    #[test]
    fn test_rejects_duplicate_dates() {
        let csv = "Date,Close\n2021-01-04,1.0\n2021-01-04,2.0\n";
        assert!(parse_history_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_requires_date_column() {
        let csv = "Day,Close\n2021-01-04,1.0\n";
        assert!(parse_history_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_garbage_number_is_missing() {
        assert_eq!(parse_cell("abc"), None);
        assert_eq!(parse_cell("NaN"), None);
        assert_eq!(parse_cell("inf"), None);
        assert_eq!(parse_cell("3.5"), Some(3.5));
    }
}
