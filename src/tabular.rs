use std::collections::BTreeMap;

use anyhow::Context;

/// One data row keyed by trimmed header name.
pub type RawRow = BTreeMap<String, String>;

const SAMPLE_BYTES: usize = 2048;
const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b'\t', b';'];

/// Picks the delimiter that occurs most often in the first 2 KiB.
/// Ties and samples without any candidate fall back to comma.
pub fn detect_delimiter(content: &[u8]) -> u8 {
    let sample = &content[..content.len().min(SAMPLE_BYTES)];
    let mut best = b',';
    let mut max = 0usize;

    for delimiter in CANDIDATE_DELIMITERS {
        let count = sample.iter().filter(|byte| **byte == delimiter).count();
        if count > max {
            max = count;
            best = delimiter;
        }
    }

    best
}

pub fn parse_rows(content: &[u8]) -> anyhow::Result<Vec<RawRow>> {
    let delimiter = detect_delimiter(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content);

    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for result in reader.byte_records() {
        let record = result.context("failed to read CSV record")?;
        let fields: Vec<String> = record
            .iter()
            .map(|field| String::from_utf8_lossy(field).trim().to_string())
            .collect();

        if fields.iter().all(|field| field.is_empty()) && fields.len() <= 1 {
            continue;
        }

        let Some(columns) = header.as_ref() else {
            header = Some(
                fields
                    .into_iter()
                    .map(|name| name.trim_start_matches('\u{feff}').trim().to_string())
                    .collect(),
            );
            continue;
        };

        let mut row = RawRow::new();
        for (index, column) in columns.iter().enumerate() {
            let value = fields.get(index).cloned().unwrap_or_default();
            row.insert(column.clone(), value);
        }
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_clear_majority() {
        assert_eq!(detect_delimiter(b"a,b,c\n1,2,3\n"), b',');
        assert_eq!(detect_delimiter(b"a\tb\tc\n1\t2\t3\n"), b'\t');
        assert_eq!(detect_delimiter(b"a;b;c\n1;2;3,5\n"), b';');
    }

    #[test]
    fn falls_back_to_comma() {
        assert_eq!(detect_delimiter(b"single column\nvalue\n"), b',');
        assert_eq!(detect_delimiter(b"a;b\tc,d"), b',');
    }

    #[test]
    fn only_samples_the_prefix() {
        let mut content = vec![b','; 10];
        content.extend(std::iter::repeat(b'x').take(SAMPLE_BYTES));
        content.extend(std::iter::repeat(b';').take(100));
        assert_eq!(detect_delimiter(&content), b',');
    }

    #[test]
    fn maps_rows_by_header() {
        let content = b"\xef\xbb\xbfName of Scholarship ;Deadline;Location\n\
            Test Award ; June 1 ;\"Dallas; TX\"\n\
            \n\
            Short Row\n";
        let rows = parse_rows(content).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Name of Scholarship"], "Test Award");
        assert_eq!(rows[0]["Deadline"], "June 1");
        assert_eq!(rows[0]["Location"], "Dallas; TX");
        assert_eq!(rows[1]["Name of Scholarship"], "Short Row");
        assert_eq!(rows[1]["Deadline"], "");
    }

    #[test]
    fn header_only_yields_no_rows() {
        let rows = parse_rows(b"Name of Scholarship,Deadline\n").unwrap();
        assert!(rows.is_empty());
    }
}
