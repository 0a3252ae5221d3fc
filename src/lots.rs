use std::path::Path;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    base::{quantize, serialize_decimal, ConversionError, Direction, GroupKey, Transaction},
    grouping::TransactionGroup,
    metatrader::{CLOSE_PRICE_COLUMN, OPEN_PRICE_COLUMN, PROFIT_COLUMN},
};

/// Which prices a filing reports for long positions. Short positions always
/// use adjusted prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PriceBasis {
    /// The execution prices from the broker report
    Raw,
    /// Execution prices scaled by the price ratio
    Adjusted,
}

/// The factor that scales the raw price difference so that it multiplies
/// back to the reported profit: `|profit / (open - close)| / quantity`.
///
/// Without any price movement there is nothing to reconcile and the ratio is
/// `1 / quantity`. Fails when the ratio does not fit a decimal.
pub(crate) fn price_ratio(tx: &Transaction) -> Result<Decimal, ConversionError> {
    let overflow = || out_of_range(tx, PROFIT_COLUMN, tx.profit);
    let price_diff = tx.open_price.checked_sub(tx.close_price).ok_or_else(overflow)?;
    let ratio = if price_diff.is_zero() {
        Decimal::ONE
    } else {
        tx.profit.checked_div(price_diff).ok_or_else(overflow)?.abs()
    };
    ratio.checked_div(tx.quantity).ok_or_else(overflow)
}

fn out_of_range(tx: &Transaction, column: usize, value: Decimal) -> ConversionError {
    ConversionError::Format {
        row: tx.row,
        column,
        value: value.to_string(),
        reason: "price ratio adjustment is out of range".to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Leg {
    /// Sequential within the group
    pub id: u32,
    pub time: NaiveDateTime,
    pub price: Decimal,
}

/// The opening and closing leg of one transaction, as reported in a filing.
#[derive(Debug, Clone)]
pub(crate) struct LotPair<'a> {
    pub transaction: &'a Transaction,
    pub ratio: Decimal,
    pub opening: Leg,
    pub closing: Leg,
}

impl LotPair<'_> {
    pub(crate) fn direction(&self) -> Direction {
        self.transaction.direction
    }

    pub(crate) fn quantity(&self) -> Decimal {
        self.transaction.quantity
    }

    /// Marks positions where the broker profit exceeds the raw price movement,
    /// i.e. traded with leverage.
    pub(crate) fn is_leveraged(&self) -> bool {
        self.ratio > Decimal::ONE
    }

    /// The gain a tax authority derives from the reported prices.
    pub(crate) fn derived_gain(&self) -> Decimal {
        let per_unit = match self.direction() {
            Direction::Buy => self.closing.price.saturating_sub(self.opening.price),
            Direction::Sell => self.opening.price.saturating_sub(self.closing.price),
        };
        per_unit.saturating_mul(self.quantity())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GroupLots<'a> {
    pub key: GroupKey,
    pub pairs: Vec<LotPair<'a>>,
}

impl GroupLots<'_> {
    pub(crate) fn reported_profit(&self) -> Decimal {
        self.pairs.iter().fold(Decimal::ZERO, |total, p| total.saturating_add(p.transaction.profit))
    }

    pub(crate) fn derived_gain(&self) -> Decimal {
        self.pairs.iter().fold(Decimal::ZERO, |total, p| total.saturating_add(p.derived_gain()))
    }

    pub(crate) fn leg_count(&self) -> usize {
        self.pairs.len() * 2
    }
}

fn leg_price(tx: &Transaction, column: usize, price: Decimal, ratio: Decimal, basis: PriceBasis) -> Result<Decimal, ConversionError> {
    match basis {
        PriceBasis::Raw => Ok(price),
        PriceBasis::Adjusted => price.checked_mul(ratio)
            .map(quantize)
            .ok_or_else(|| out_of_range(tx, column, price)),
    }
}

/// Builds the lot pairs of a group. Leg IDs are assigned in emission order,
/// the opening leg of each transaction before its closing leg.
pub(crate) fn build_lots<'a>(group: &TransactionGroup<'a>, long_prices: PriceBasis) -> Result<GroupLots<'a>, ConversionError> {
    let mut next_id = 0;
    let mut take_id = || {
        let id = next_id;
        next_id += 1;
        id
    };

    let basis = if group.key.direction.is_short() { PriceBasis::Adjusted } else { long_prices };

    let pairs = group.transactions.iter().map(|&tx| {
        let ratio = price_ratio(tx)?;
        let opening = Leg {
            id: take_id(),
            time: tx.open_time,
            price: leg_price(tx, OPEN_PRICE_COLUMN, tx.open_price, ratio, basis)?,
        };
        let closing = Leg {
            id: take_id(),
            time: tx.close_time,
            price: leg_price(tx, CLOSE_PRICE_COLUMN, tx.close_price, ratio, basis)?,
        };
        Ok(LotPair { transaction: tx, ratio, opening, closing })
    }).collect::<Result<Vec<_>, ConversionError>>()?;

    Ok(GroupLots { key: group.key.clone(), pairs })
}

/// Lots built for one filing schema and year.
pub(crate) struct YearLots<'a> {
    pub schema: &'static str,
    pub year: i32,
    pub groups: Vec<GroupLots<'a>>,
}

pub(crate) fn save_lots_to_csv(lots: &[YearLots], output_path: &Path) -> Result<(), ConversionError> {
    let to_error = |e: csv::Error| ConversionError::io(output_path, e.into());
    let mut wtr = csv::Writer::from_path(output_path).map_err(to_error)?;

    #[derive(Serialize)]
    struct CsvLot<'a> {
        #[serde(rename = "Schema")]
        schema: &'a str,
        #[serde(rename = "Year")]
        year: i32,
        #[serde(rename = "Instrument")]
        instrument: &'a str,
        #[serde(rename = "Direction")]
        direction: &'a str,
        #[serde(rename = "Row")]
        row: usize,
        #[serde(rename = "Quantity", serialize_with = "serialize_decimal")]
        quantity: Decimal,
        #[serde(rename = "Ratio", serialize_with = "serialize_decimal")]
        ratio: Decimal,
        #[serde(rename = "Open Price", serialize_with = "serialize_decimal")]
        open_price: Decimal,
        #[serde(rename = "Close Price", serialize_with = "serialize_decimal")]
        close_price: Decimal,
        #[serde(rename = "Filed Open Price", serialize_with = "serialize_decimal")]
        filed_open_price: Decimal,
        #[serde(rename = "Filed Close Price", serialize_with = "serialize_decimal")]
        filed_close_price: Decimal,
        #[serde(rename = "Derived Gain", serialize_with = "serialize_decimal")]
        derived_gain: Decimal,
        #[serde(rename = "Reported Profit", serialize_with = "serialize_decimal")]
        reported_profit: Decimal,
    }

    for year_lots in lots {
        for group in &year_lots.groups {
            for pair in &group.pairs {
                let tx = pair.transaction;
                wtr.serialize(CsvLot {
                    schema: year_lots.schema,
                    year: year_lots.year,
                    instrument: &tx.instrument,
                    direction: tx.direction.as_ref(),
                    row: tx.row,
                    quantity: tx.quantity,
                    ratio: pair.ratio.round_dp(8),
                    open_price: tx.open_price,
                    close_price: tx.close_price,
                    filed_open_price: pair.opening.price,
                    filed_close_price: pair.closing.price,
                    derived_gain: quantize(pair.derived_gain()),
                    reported_profit: tx.profit,
                }).map_err(to_error)?;
            }
        }
    }

    wtr.flush().map_err(|e| ConversionError::io(output_path, e))?;

    Ok(())
}
