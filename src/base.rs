use std::{fmt, io, path::PathBuf};

use chrono::{Datelike, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serializer;
use strum::{AsRefStr, EnumString};
use thiserror::Error;

/// Number of fractional digits kept for every parsed or derived amount.
pub(crate) const DECIMALS: u32 = 4;

#[derive(Debug, Error)]
pub(crate) enum ConversionError {
    #[error("Invalid spreadsheet structure: {0}")]
    Structure(String),

    #[error("Invalid value in row {row}, column {column} ('{value}'): {reason}")]
    Format {
        row: usize,
        column: usize,
        value: String,
        reason: String,
    },

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to render {schema} document for {year}: {message}")]
    Serialize {
        schema: &'static str,
        year: i32,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ConversionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ConversionError::Io { path: path.into(), source }
    }
}

/// Trade direction as reported by the broker. A `Buy` position is long,
/// a `Sell` position is short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub(crate) fn is_short(self) -> bool {
        self == Direction::Sell
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// One closed position from the trade history.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Transaction {
    pub direction: Direction,
    pub instrument: String,
    pub quantity: Decimal,
    pub open_time: NaiveDateTime,
    pub close_time: NaiveDateTime,
    pub open_price: Decimal,
    pub close_price: Decimal,
    /// Realized profit reported by the broker, which the filings must reproduce
    pub profit: Decimal,
    /// Index of the source row within the spreadsheet table
    pub row: usize,
}

impl Transaction {
    pub(crate) fn close_year(&self) -> i32 {
        self.close_time.year()
    }

    pub(crate) fn key(&self) -> GroupKey {
        GroupKey {
            instrument: self.instrument.clone(),
            direction: self.direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GroupKey {
    pub instrument: String,
    pub direction: Direction,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.instrument, self.direction)
    }
}

/// Rounds to four decimals (midpoint away from zero) and fixes the scale, so
/// that `12.3` is stored and printed as `12.3000`.
pub(crate) fn quantize(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(DECIMALS);
    rounded
}

pub(crate) fn serialize_decimal<S: Serializer>(value: &Decimal, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&value.to_string())
}
