use std::io::Write;
use std::path::Path;

use entryscout_common::{HarvestError, Record};
use tracing::{info, warn};

/// Write records as CSV with a header row. Nothing is written when there are
/// no records.
pub fn write_csv(path: impl AsRef<Path>, records: &[Record]) -> Result<usize, HarvestError> {
    let path = path.as_ref();
    if records.is_empty() {
        warn!(path = %path.display(), "No records harvested, skipping CSV output");
        return Ok(0);
    }
    let file = std::fs::File::create(path)?;
    let written = write_csv_to(file, records)?;
    info!(path = %path.display(), records = written, "Wrote CSV");
    Ok(written)
}

pub fn write_csv_to<W: Write>(writer: W, records: &[Record]) -> Result<usize, HarvestError> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(record)
            .map_err(|e| HarvestError::Output(e.to_string()))?;
    }
    csv.flush()?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn record(id: &str, published: Option<&str>) -> Record {
        let ts = |s: &str| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc);
        Record {
            subject_id: "TTKOM".into(),
            subject_name: "Türk Telekom".into(),
            search_term: "türk telekom".into(),
            page_url: "https://forum.test/turk-telekom--1?p=2".into(),
            item_id: id.into(),
            content: "hat yine, \"koptu\"".into(),
            author: "yazar".into(),
            date_text: "09.05.2024 12:00".into(),
            published_at: published.map(ts),
            fetched_at: ts("2024-05-10T07:00:00Z"),
            page: 2,
        }
    }

    #[test]
    fn header_and_rows() {
        let mut buf = Vec::new();
        let n = write_csv_to(&mut buf, &[record("1", Some("2024-05-09T09:00:00Z")), record("2", None)])
            .unwrap();
        assert_eq!(n, 2);

        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "company_ticker,company_official_name,search_term_used,topic_url,entry_id,\
             entry_content,entry_author,entry_date_str,entry_datetime_utc,\
             fetch_timestamp_utc,page_number"
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with("TTKOM,Türk Telekom,türk telekom,"));
        assert!(first.contains(r#""hat yine, ""koptu""""#));
        assert!(first.contains("2024-05-09T09:00:00Z"));
        assert!(first.ends_with(",2"));
        let second = lines.next().unwrap();
        assert!(second.contains("09.05.2024 12:00,,2024-05-10T07:00:00Z,2"));
    }

    #[test]
    fn empty_input_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        assert_eq!(write_csv(&path, &[]).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        assert_eq!(write_csv(&path, &[record("7", None)]).unwrap(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
