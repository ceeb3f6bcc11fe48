use std::path::Path;

use crate::data::formats::{FormatError, RawTable, TabularFormat};

/// CSV/TSV format backed by the `csv` crate. The read side sniffs the
/// delimiter from the header line; the save side always writes commas.
pub struct CsvFormat;

/// Pick the delimiter with the most occurrences in the header line.
fn sniff_delimiter(header_line: &str) -> u8 {
    let candidates = [b',', b';', b'\t'];
    candidates
        .into_iter()
        .max_by_key(|&d| header_line.bytes().filter(|&b| b == d).count())
        .unwrap_or(b',')
}

impl TabularFormat for CsvFormat {
    fn extensions(&self) -> &'static [&'static str] {
        &["csv", "tsv"]
    }

    fn read(&self, path: &Path) -> Result<RawTable, FormatError> {
        let content = std::fs::read(path)?;
        // Accept latin1 content by mapping bytes straight to code points.
        let text = String::from_utf8(content.clone())
            .unwrap_or_else(|_| content.iter().map(|&b| b as char).collect());

        let first_line = text.lines().next().unwrap_or_default();
        let delimiter = sniff_delimiter(first_line);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut records = reader.records();
        let headers: Vec<String> = match records.next() {
            Some(Ok(record)) => record.iter().map(|s| s.trim().to_string()).collect(),
            Some(Err(e)) => return Err(FormatError::Bad(e.to_string())),
            None => return Err(FormatError::Bad("empty file".to_string())),
        };
        if headers.is_empty() {
            return Err(FormatError::Bad("no columns in header".to_string()));
        }

        let mut columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for result in records {
            let record = result.map_err(|e| FormatError::Bad(e.to_string()))?;
            for (col, slot) in columns.iter_mut().enumerate() {
                // Short rows pad with empty cells; long rows drop the excess.
                slot.push(record.get(col).unwrap_or_default().to_string());
            }
        }

        Ok(RawTable { headers, columns })
    }

    fn save(&self, table: &RawTable, path: &Path) -> Result<(), FormatError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b',')
            .from_path(path)
            .map_err(io_of_csv)?;

        writer.write_record(&table.headers).map_err(io_of_csv)?;
        for row in 0..table.row_count() {
            let record: Vec<&str> = table
                .columns
                .iter()
                .map(|col| col.get(row).map(String::as_str).unwrap_or_default())
                .collect();
            writer.write_record(&record).map_err(io_of_csv)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn io_of_csv(e: csv::Error) -> FormatError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => FormatError::Io(io),
        other => FormatError::Bad(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tslabel-csv-{}-{name}", std::process::id()))
    }

    #[test]
    fn sniffs_semicolon_and_tab_delimiters() {
        assert_eq!(sniff_delimiter("a;b;c"), b';');
        assert_eq!(sniff_delimiter("a\tb\tc"), b'\t');
        assert_eq!(sniff_delimiter("a,b,c"), b',');
    }

    #[test]
    fn reads_column_major_with_short_rows_padded() {
        let path = temp_path("pad.csv");
        std::fs::write(&path, "x,y\n1,2\n3\n").unwrap();
        let table = CsvFormat.read(&path).unwrap();
        assert_eq!(table.headers, vec!["x", "y"]);
        assert_eq!(table.columns[0], vec!["1", "3"]);
        assert_eq!(table.columns[1], vec!["2", ""]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn save_then_read_round_trips() {
        let path = temp_path("roundtrip.csv");
        let table = RawTable {
            headers: vec!["a".to_string(), "b".to_string()],
            columns: vec![
                vec!["1".to_string(), "2".to_string()],
                vec!["0.5".to_string(), "".to_string()],
            ],
        };
        CsvFormat.save(&table, &path).unwrap();
        let back = CsvFormat.read(&path).unwrap();
        assert_eq!(back.headers, table.headers);
        assert_eq!(back.columns, table.columns);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_file_is_bad() {
        let path = temp_path("empty.csv");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(CsvFormat.read(&path), Err(FormatError::Bad(_))));
        std::fs::remove_file(&path).ok();
    }
}
