//! Field-level CSV row parsing (C3's parser), per §4.3: split on `,`, respecting `"`-quoted
//! fields with doubled-quote escaping, exactly RFC 4180, which the `csv` crate already
//! implements, so we lean on its single-record reader rather than hand-rolling a splitter.

use csv::{ByteRecord, ReaderBuilder};
use smallvec::SmallVec;

/// Most rows have a handful of columns; inline storage avoids a heap allocation per row for
/// the common case.
const INLINE_FIELDS: usize = 16;

/// Splits one CSV line into its fields, honoring quoting. Used for lightweight single-row
/// access (axis-only sampling, header parsing) where allocating a full reader per call is
/// cheap relative to the I/O it follows.
pub fn split_row(line: &str) -> impl Iterator<Item = String> + '_ {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes());
    let mut record = ByteRecord::new();
    let fields: SmallVec<[String; INLINE_FIELDS]> =
        if reader.read_byte_record(&mut record).unwrap_or(false) {
            record
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect()
        } else {
            SmallVec::new()
        };
    fields.into_iter()
}

/// Parses the header line into sanitized column names.
#[must_use]
pub fn parse_header(line: &str) -> Vec<String> {
    split_row(line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_fields() {
        let fields: Vec<_> = split_row("a,b,c").collect();
        assert_eq!(fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn respects_quoted_fields_with_commas() {
        let fields: Vec<_> = split_row(r#"a,"b,c",d"#).collect();
        assert_eq!(fields, vec!["a", "b,c", "d"]);
    }

    #[test]
    fn unescapes_doubled_quotes() {
        let fields: Vec<_> = split_row(r#""say ""hi""",2"#).collect();
        assert_eq!(fields, vec![r#"say "hi""#, "2"]);
    }
}
