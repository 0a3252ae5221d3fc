use chrono::{NaiveDate, NaiveDateTime};
use serde::Serializer;

/// Timestamp format used by MetaTrader report exports
const FORMAT: &str = "%Y.%m.%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn parse_date_time(raw: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), FORMAT)
}

// serialize function for xs:date fields
pub(crate) fn serialize_date<S: Serializer>(date: &NaiveDate, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&date.format(DATE_FORMAT).to_string())
}
