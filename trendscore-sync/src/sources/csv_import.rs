//! Directly supplied scores in CSV form
//!
//! The header names a `Day` or `Date` column and one column per region,
//! by code (`l`) or display name (`London`). Every numeric cell becomes a
//! score for (region, day).

use chrono::NaiveDate;
use trendscore_common::regions::resolve_region;
use trendscore_common::time::parse_day;
use trendscore_common::{Error, Result};

/// One score cell read from the file
#[derive(Debug, Clone, PartialEq)]
pub struct CsvScore {
    pub region: &'static str,
    pub day: NaiveDate,
    pub value: f64,
}

/// Split CSV text into records, honouring double-quoted fields
///
/// Quoted fields may hold commas, doubled quotes and line breaks. Blank
/// lines produce no record.
fn read_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    let mut finish = |record: &mut Vec<String>, field: &mut String| {
        record.push(std::mem::take(field));
        let blank = record.len() == 1 && record[0].trim().is_empty();
        let done = std::mem::take(record);
        if !blank {
            records.push(done);
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => record.push(std::mem::take(&mut field)),
            '\r' if !quoted && chars.peek() == Some(&'\n') => {}
            '\n' if !quoted => finish(&mut record, &mut field),
            _ => field.push(c),
        }
    }
    if !record.is_empty() || !field.is_empty() {
        finish(&mut record, &mut field);
    }
    records
}

fn day_column(headers: &[String]) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == "Day" || h.trim() == "Date")
        .ok_or_else(|| Error::Config("No Day or Date header in CSV file".to_string()))
}

fn region_columns(headers: &[String]) -> Result<Vec<(&'static str, usize)>> {
    let mut columns: Vec<(&'static str, usize)> = Vec::new();
    for (index, header) in headers.iter().enumerate() {
        if let Some(code) = resolve_region(header) {
            if !columns.iter().any(|(c, _)| *c == code) {
                columns.push((code, index));
            }
        }
    }
    if columns.is_empty() {
        return Err(Error::Config("No region headers found in CSV file".to_string()));
    }
    Ok(columns)
}

/// Read scores in `start..=end` from CSV text
///
/// A missing day column or missing region columns is a configuration error.
/// Rows outside the range are skipped, as are cells that are not numbers.
pub fn parse_scores(text: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<CsvScore>> {
    let mut records = read_records(text).into_iter();
    let headers = records
        .next()
        .ok_or_else(|| Error::Config("CSV file is empty".to_string()))?;

    let day_index = day_column(&headers)?;
    let regions = region_columns(&headers)?;
    tracing::debug!(
        regions = %regions.iter().map(|(c, _)| *c).collect::<Vec<_>>().join(", "),
        "Found CSV region columns"
    );

    let mut scores = Vec::new();
    for (row_index, row) in records.enumerate() {
        let Some(day) = row.get(day_index).and_then(|cell| parse_day(cell).ok()) else {
            tracing::warn!(row = row_index + 1, "Skipping CSV row without a valid day");
            continue;
        };
        if day < start || day > end {
            continue;
        }

        for &(region, column) in &regions {
            match row.get(column).and_then(|cell| cell.trim().parse::<f64>().ok()) {
                Some(value) => scores.push(CsvScore {
                    region,
                    day,
                    value,
                }),
                None => tracing::debug!(
                    row = row_index + 1,
                    column,
                    "Skipping CSV cell, not a float"
                ),
            }
        }
    }

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    #[test]
    fn test_read_records_with_quotes() {
        assert_eq!(read_records("a,b,c"), vec![vec!["a", "b", "c"]]);
        assert_eq!(
            read_records(r#""North England","x,y",3"#),
            vec![vec!["North England", "x,y", "3"]]
        );
        assert_eq!(read_records(r#""say ""hi""",1"#), vec![vec![r#"say "hi""#, "1"]]);
        assert_eq!(read_records("a,,"), vec![vec!["a", "", ""]]);
    }

    #[test]
    fn test_read_records_line_endings_and_blank_lines() {
        assert_eq!(
            read_records("a,b\r\n\r\n  \nc,d\n"),
            vec![vec!["a", "b"], vec!["c", "d"]]
        );
        assert!(read_records("").is_empty());
    }

    #[test]
    fn test_quoted_line_break_stays_in_one_row() {
        let text = "Day,l,Notes\n2020-01-01,1.5,\"first line\nsecond line\"\n2020-01-02,2.5,ok\n";
        let records = read_records(text);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1][2], "first line\nsecond line");

        let scores = parse_scores(text, d("2020-01-01"), d("2020-01-31")).unwrap();
        let values: Vec<f64> = scores.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.5, 2.5]);
    }

    #[test]
    fn test_parse_scores_by_code_and_name() {
        let text = "Date,London,m,Notes\n2020-01-01,1.5,2.5,x\n2020-01-02,3,,y\n";
        let scores = parse_scores(text, d("2020-01-01"), d("2020-01-31")).unwrap();

        assert_eq!(
            scores,
            vec![
                CsvScore { region: "l", day: d("2020-01-01"), value: 1.5 },
                CsvScore { region: "m", day: d("2020-01-01"), value: 2.5 },
                CsvScore { region: "l", day: d("2020-01-02"), value: 3.0 },
            ]
        );
    }

    #[test]
    fn test_rows_outside_range_skipped() {
        let text = "Day,e\n2019-12-31,1\n2020-01-01,2\n2020-01-03,3\n";
        let scores = parse_scores(text, d("2020-01-01"), d("2020-01-02")).unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].value, 2.0);
    }

    #[test]
    fn test_missing_day_header_is_config_error() {
        let err = parse_scores("When,e\n2020-01-01,1\n", d("2020-01-01"), d("2020-01-02")).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("Day or Date")));
    }

    #[test]
    fn test_missing_region_headers_is_config_error() {
        let err = parse_scores("Day,Wales\n2020-01-01,1\n", d("2020-01-01"), d("2020-01-02")).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("region")));
    }

    #[test]
    fn test_empty_text_is_config_error() {
        assert!(matches!(parse_scores("", d("2020-01-01"), d("2020-01-02")), Err(Error::Config(_))));
    }
}
