//! Loader for MetaTrader 4 "Report History" exports saved as XML Spreadsheet
//! 2003 files.
//!
//! The positions table starts after a header row whose first cell reads
//! `Time` and ends at the row that opens the `Orders` section. Every row in
//! between is a closed position with a fixed column layout.

use std::{path::Path, str::FromStr};

use chrono::NaiveDateTime;
use roxmltree::{Document, Node};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::{
    base::{quantize, ConversionError, Direction, Transaction},
    time::parse_date_time,
};

const SPREADSHEET_NS: &str = "urn:schemas-microsoft-com:office:spreadsheet";

const DATA_START_MARKER: &str = "Time";
const DATA_END_MARKER: &str = "Orders";

const OPEN_TIME_COLUMN: usize = 0;
const INSTRUMENT_COLUMN: usize = 2;
const DIRECTION_COLUMN: usize = 3;
const QUANTITY_COLUMN: usize = 4;
pub(crate) const OPEN_PRICE_COLUMN: usize = 5;
const CLOSE_TIME_COLUMN: usize = 8;
pub(crate) const CLOSE_PRICE_COLUMN: usize = 9;
pub(crate) const PROFIT_COLUMN: usize = 12;

/// What to do when the positions header never shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum MissingDataPolicy {
    /// Log a warning and continue with no transactions
    #[default]
    Warn,
    /// Fail with a structure error
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanState {
    BeforeData,
    InData,
    Done,
}

impl ScanState {
    fn next(self, first_cell: Option<&str>) -> ScanState {
        match (self, first_cell) {
            (ScanState::BeforeData, Some(DATA_START_MARKER)) => ScanState::InData,
            (ScanState::InData, Some(DATA_END_MARKER)) => ScanState::Done,
            (state, _) => state,
        }
    }
}

/// One spreadsheet row with its cell texts in document order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SheetRow {
    /// Position of the row among the table's rows
    pub index: usize,
    pub cells: Vec<String>,
}

impl SheetRow {
    fn first_cell(&self) -> Option<&str> {
        self.cells.first().map(|cell| cell.trim())
    }

    fn cell(&self, column: usize) -> Result<&str, ConversionError> {
        self.cells.get(column).map(String::as_str).ok_or_else(|| ConversionError::Format {
            row: self.index,
            column,
            value: String::new(),
            reason: format!("row has only {} cells", self.cells.len()),
        })
    }

    fn format_error(&self, column: usize, reason: impl Into<String>) -> ConversionError {
        ConversionError::Format {
            row: self.index,
            column,
            value: self.cells.get(column).cloned().unwrap_or_default(),
            reason: reason.into(),
        }
    }
}

/// Rows of the positions section, together with the state the scan ended in.
#[derive(Debug)]
pub(crate) struct DataRegion {
    pub rows: Vec<SheetRow>,
    pub state: ScanState,
}

impl DataRegion {
    pub(crate) fn found_data(&self) -> bool {
        self.state != ScanState::BeforeData
    }
}

fn is_spreadsheet_element(node: &Node, name: &str) -> bool {
    node.is_element() && node.has_tag_name((SPREADSHEET_NS, name))
}

// indentation between the Cell and Data elements is not part of the value
fn cell_text(cell: Node) -> String {
    cell.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .filter(|text| !text.trim().is_empty())
        .collect()
}

/// Finds the spreadsheet table and returns the rows between the positions
/// header and the start of the orders section.
pub(crate) fn extract_rows(doc: &Document) -> Result<DataRegion, ConversionError> {
    let table = doc
        .descendants()
        .find(|n| is_spreadsheet_element(n, "Table"))
        .ok_or_else(|| ConversionError::Structure("no spreadsheet Table element found".to_owned()))?;

    let mut state = ScanState::BeforeData;
    let mut rows = Vec::new();

    for (index, row) in table.children().filter(|n| is_spreadsheet_element(n, "Row")).enumerate() {
        let cells: Vec<String> = row.children().filter(|n| is_spreadsheet_element(n, "Cell")).map(cell_text).collect();
        let row = SheetRow { index, cells };

        let next_state = state.next(row.first_cell());
        // repeated header rows inside the positions section are skipped
        let is_header = row.first_cell() == Some(DATA_START_MARKER);
        if state == ScanState::InData && next_state == ScanState::InData && !is_header {
            rows.push(row);
        }
        state = next_state;

        if state == ScanState::Done {
            break;
        }
    }

    Ok(DataRegion { rows, state })
}

fn parse_number(row: &SheetRow, column: usize) -> Result<Decimal, ConversionError> {
    let raw = row.cell(column)?.trim();

    // Strip thousands separators, since Decimal::from_str doesn't like those
    let value = Decimal::from_str(&raw.replace(',', ""))
        .map_err(|e| row.format_error(column, format!("not a number: {}", e)))?;

    Ok(quantize(value))
}

fn parse_time(row: &SheetRow, column: usize) -> Result<NaiveDateTime, ConversionError> {
    parse_date_time(row.cell(column)?)
        .map_err(|e| row.format_error(column, format!("expected 'yyyy.MM.dd HH:mm:ss': {}", e)))
}

/// Converts one data row into a transaction.
pub(crate) fn parse_transaction(row: &SheetRow) -> Result<Transaction, ConversionError> {
    let direction_label = row.cell(DIRECTION_COLUMN)?.trim();
    let direction = Direction::from_str(direction_label)
        .map_err(|_| row.format_error(DIRECTION_COLUMN, "expected 'buy' or 'sell'"))?;

    let quantity = parse_number(row, QUANTITY_COLUMN)?;
    if quantity <= Decimal::ZERO {
        return Err(row.format_error(QUANTITY_COLUMN, "quantity must be positive"));
    }

    Ok(Transaction {
        direction,
        instrument: row.cell(INSTRUMENT_COLUMN)?.trim().to_owned(),
        quantity,
        open_time: parse_time(row, OPEN_TIME_COLUMN)?,
        close_time: parse_time(row, CLOSE_TIME_COLUMN)?,
        open_price: parse_number(row, OPEN_PRICE_COLUMN)?,
        close_price: parse_number(row, CLOSE_PRICE_COLUMN)?,
        profit: parse_number(row, PROFIT_COLUMN)?,
        row: row.index,
    })
}

// parses a MetaTrader report history document into a list of transactions
pub(crate) fn parse_report(xml: &str, policy: MissingDataPolicy) -> Result<Vec<Transaction>, ConversionError> {
    let doc = Document::parse(xml).map_err(|e| ConversionError::Structure(format!("not a valid XML document: {}", e)))?;
    let region = extract_rows(&doc)?;

    if !region.found_data() {
        match policy {
            MissingDataPolicy::Warn => {
                warn!("no row starting with '{}' found, the report contains no positions", DATA_START_MARKER);
            }
            MissingDataPolicy::Fail => {
                return Err(ConversionError::Structure(format!(
                    "no row starting with '{}' found",
                    DATA_START_MARKER
                )));
            }
        }
    }

    debug!("found {} position rows", region.rows.len());
    region.rows.iter().map(parse_transaction).collect()
}

// loads a MetaTrader report history XML file into a list of transactions
pub(crate) fn load_report_xml(input_path: &Path, policy: MissingDataPolicy) -> Result<Vec<Transaction>, ConversionError> {
    let xml = std::fs::read_to_string(input_path).map_err(|e| ConversionError::io(input_path, e))?;
    parse_report(&xml, policy)
}
