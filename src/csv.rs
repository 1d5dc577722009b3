//! CSV rendering for the `/export/csv` endpoints.

use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

/// A record that can be written as one CSV row.
pub trait CsvRecord {
    fn headers() -> &'static [&'static str];
    fn row(&self) -> Vec<String>;
}

/// Quotes a field when it contains a comma, quote, CR or LF; quotes are doubled.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_line(out: &mut String, fields: impl IntoIterator<Item = String>) {
    let line = fields
        .into_iter()
        .map(|f| escape_field(&f))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push_str("\r\n");
}

pub fn render<T: CsvRecord>(records: &[T]) -> String {
    let mut out = String::new();
    push_line(&mut out, T::headers().iter().map(|h| h.to_string()));
    for record in records {
        push_line(&mut out, record.row());
    }
    out
}

/// Renders `records` as a downloadable `<entity>-<YYYY-MM-DD>.csv` attachment.
pub fn attachment<T: CsvRecord>(entity: &str, records: &[T]) -> Response {
    let filename = format!("{entity}-{}.csv", Utc::now().format("%Y-%m-%d"));
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        render(records),
    )
        .into_response()
}

pub fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row(&'static str, &'static str);

    impl CsvRecord for Row {
        fn headers() -> &'static [&'static str] {
            &["name", "note"]
        }

        fn row(&self) -> Vec<String> {
            vec![self.0.to_string(), self.1.to_string()]
        }
    }

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn renders_header_and_crlf_rows() {
        let out = render(&[Row("Ada", "first, programmer"), Row("Grace", "")]);
        assert_eq!(out, "name,note\r\nAda,\"first, programmer\"\r\nGrace,\r\n");
    }
}
