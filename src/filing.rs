use linkme::distributed_slice;

use crate::{base::ConversionError, config::ConversionInfo, lots::{GroupLots, PriceBasis}};

/// Renders the document of one year from the lots of its groups.
pub(crate) type RenderFn = fn(&ConversionInfo, i32, &[GroupLots]) -> Result<String, ConversionError>;

/// A regulatory document family, producing one file per closing year.
pub(crate) struct FilingSchema {
    /// Prefix of the output file names
    pub tag: &'static str,
    pub label: &'static str,
    /// Price basis for long positions unless configured otherwise
    pub long_prices: PriceBasis,
    pub render: RenderFn,
}

#[distributed_slice]
pub(crate) static FILING_SCHEMAS: [FilingSchema];

/// The registered schemas, ordered by tag.
pub(crate) fn schemas() -> Vec<&'static FilingSchema> {
    let mut schemas: Vec<&FilingSchema> = FILING_SCHEMAS.iter().collect();
    schemas.sort_by_key(|s| s.tag);
    schemas
}

pub(crate) fn output_file_name(tag: &str, target_base_name: &str, year: i32) -> String {
    format!("{}-{}-{}.xml", tag, target_base_name, year)
}
