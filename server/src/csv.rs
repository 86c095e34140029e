//! Minimal RFC 4180 reading and writing for the warehouse export and the dated output files.

/// One parsed record and the 1-based line it starts on.
pub type Record = (usize, Vec<String>);

/// Split a document into records. Quoted fields may contain commas, doubled
/// quotes and line breaks. An unterminated quote fails with the line its record
/// starts on.
pub fn read_records(input: &str) -> Result<Vec<Record>, usize> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = input.chars().peekable();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_start = 1;

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            ('\r', false) if chars.peek() == Some(&'\n') => {}
            ('\n', false) => {
                fields.push(std::mem::take(&mut field));
                records.push((record_start, std::mem::take(&mut fields)));
                line += 1;
                record_start = line;
            }
            (c, _) => {
                if c == '\n' {
                    line += 1;
                }
                field.push(c);
            }
        }
    }

    if in_quotes {
        return Err(record_start);
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push((record_start, fields));
    }
    Ok(records)
}

/// `true` for a record produced by an empty or whitespace-only line.
pub fn is_blank(fields: &[String]) -> bool {
    matches!(fields, [only] if only.trim().is_empty())
}

pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn join_record<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(records: &[Record]) -> Vec<Vec<&str>> {
        records
            .iter()
            .map(|(_, fields)| fields.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn splits_quoted_fields() {
        let records = read_records("0xabc,1,\"a, \"\"quoted\"\" note\"\r\na,,b\n").unwrap();
        assert_eq!(
            fields(&records),
            vec![vec!["0xabc", "1", r#"a, "quoted" note"#], vec!["a", "", "b"]]
        );
        assert_eq!(read_records("x\na,\"open\n"), Err(2));
    }

    #[test]
    fn quoted_line_breaks_stay_in_one_record() {
        let written = format!("{}\n{}\n", join_record(&["0xaaa", "line one\nline two"]), join_record(&["0xbbb", "ok"]));
        let records = read_records(&written).unwrap();

        assert_eq!(
            fields(&records),
            vec![vec!["0xaaa", "line one\nline two"], vec!["0xbbb", "ok"]]
        );
        assert_eq!(records[1].0, 3);
    }

    #[test]
    fn blank_lines_are_detected() {
        let records = read_records("a\n\n  \nb").unwrap();
        let blank: Vec<bool> = records.iter().map(|(_, f)| is_blank(f)).collect();
        assert_eq!(blank, vec![false, true, true, false]);
    }

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(join_record(&["0xabc", "a,b", "say \"hi\""]), r#"0xabc,"a,b","say ""hi""""#);
    }
}
