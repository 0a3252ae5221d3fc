use std::{
    io::Write,
    path::{Path, PathBuf},
};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{
    base::{ConversionError, Transaction},
    config::ConversionInfo,
    filing::{output_file_name, schemas},
    grouping::{closing_years, partition_by_year},
    lots::{build_lots, save_lots_to_csv, GroupLots, PriceBasis, YearLots},
    metatrader::{load_report_xml, MissingDataPolicy},
};

/// Tolerated difference between derived filing gain and broker profit, per lot
const RECONCILIATION_TOLERANCE: Decimal = dec!(0.01);

pub(crate) const DEFAULT_TARGET_BASE_NAME: &str = "edavki";

#[derive(Debug, Clone)]
pub(crate) struct ConversionOptions {
    /// Middle part of the output file names
    pub target_base_name: String,
    pub output_dir: PathBuf,
    pub missing_data: MissingDataPolicy,
    /// Only convert these instruments, all when empty
    pub instruments: Vec<String>,
    /// Also export the built lots to this CSV file
    pub lots_csv: Option<PathBuf>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            target_base_name: DEFAULT_TARGET_BASE_NAME.to_owned(),
            output_dir: PathBuf::from("."),
            missing_data: MissingDataPolicy::default(),
            instruments: Vec::new(),
            lots_csv: None,
        }
    }
}

/// Converts a MetaTrader report file, returning the paths of the written
/// filings.
pub(crate) fn convert_file(input_path: &Path, info: &ConversionInfo, options: &ConversionOptions) -> Result<Vec<PathBuf>, ConversionError> {
    let transactions = load_report_xml(input_path, options.missing_data)?;
    info!("Loaded {} transactions from {}", transactions.len(), input_path.display());

    convert(&transactions, info, options)
}

/// Renders one filing per schema and closing year and writes them to the
/// output directory. All years of a schema are rendered before any of its
/// files is written.
pub(crate) fn convert(transactions: &[Transaction], info: &ConversionInfo, options: &ConversionOptions) -> Result<Vec<PathBuf>, ConversionError> {
    let selected: Vec<Transaction> = transactions.iter()
        .filter(|tx| options.instruments.is_empty() || options.instruments.contains(&tx.instrument))
        .cloned()
        .collect();

    if selected.len() != transactions.len() {
        info!("Selected {} of {} transactions by instrument", selected.len(), transactions.len());
    }
    if selected.is_empty() {
        warn!("No transactions to convert, no filings written");
    } else {
        info!("Closing years: {:?}", closing_years(&selected));
    }

    let partitions = partition_by_year(&selected);

    std::fs::create_dir_all(&options.output_dir).map_err(|e| ConversionError::io(&options.output_dir, e))?;

    let mut written = Vec::new();
    let mut exported_lots = Vec::new();

    for schema in schemas() {
        let long_prices = info.long_prices_for(schema.tag, schema.long_prices);
        debug!("{}: long positions use {:?} prices", schema.label, long_prices);

        let mut rendered = Vec::new();
        for partition in &partitions {
            let groups = partition.groups.iter()
                .map(|group| build_lots(group, long_prices))
                .collect::<Result<Vec<GroupLots>, ConversionError>>()?;
            debug!(
                "{} {}: {} transactions in {} groups, {} lot entries",
                schema.tag,
                partition.year,
                partition.transaction_count(),
                groups.len(),
                groups.iter().map(GroupLots::leg_count).sum::<usize>()
            );
            for lots in &groups {
                log_reconciliation(schema.tag, partition.year, lots, long_prices);
            }

            let xml = (schema.render)(info, partition.year, &groups)?;
            let file_name = output_file_name(schema.tag, &options.target_base_name, partition.year);
            rendered.push((options.output_dir.join(file_name), xml));

            exported_lots.push(YearLots { schema: schema.tag, year: partition.year, groups });
        }

        for (path, xml) in rendered {
            write_atomically(&path, &xml)?;
            info!("Saved {} to {}", schema.tag, path.display());
            written.push(path);
        }
    }

    if let Some(lots_csv) = &options.lots_csv {
        save_lots_to_csv(&exported_lots, lots_csv)?;
        info!("Saved lots to {}", lots_csv.display());
    }

    Ok(written)
}

fn log_reconciliation(tag: &str, year: i32, lots: &GroupLots, long_prices: PriceBasis) {
    let derived = lots.derived_gain();
    let reported = lots.reported_profit();
    debug!("{} {} {}: derived gain {}, reported profit {}", tag, year, lots.key, derived, reported);

    let adjusted = lots.key.direction.is_short() || long_prices == PriceBasis::Adjusted;
    let tolerance = RECONCILIATION_TOLERANCE.saturating_mul(Decimal::from(lots.pairs.len()));
    if adjusted && derived.saturating_sub(reported).abs() > tolerance {
        warn!(
            "{} {} {}: derived gain {} does not match reported profit {}",
            tag, year, lots.key, derived.round_dp(4), reported
        );
    }
}

fn write_atomically(path: &Path, content: &str) -> Result<(), ConversionError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(|e| ConversionError::io(dir, e))?;
    file.write_all(content.as_bytes()).map_err(|e| ConversionError::io(file.path(), e))?;
    file.persist(path).map_err(|e| ConversionError::io(path, e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::tests::conversion_info,
        metatrader::tests::{position, spreadsheet, HEADER},
    };

    fn trade_history() -> String {
        let x1 = position("2021.01.04 10:00:00", "X", "buy", "5", "100", "2021.01.05 10:00:00", "90", "-50");
        let x2 = position("2021.02.04 10:00:00", "X", "buy", "0.1", "1.1000", "2021.06.01 10:00:00", "1.1050", "50");
        let y1 = position("2021.12.20 10:00:00", "Y", "sell", "2", "1.2000", "2022.01.03 10:00:00", "1.1900", "2000");
        spreadsheet(&[
            &["Trade History Report"],
            HEADER,
            &x1,
            &x2,
            &y1,
            &["Orders"],
            &["Open Time", "Order"],
        ])
    }

    fn options_for(dir: &Path) -> ConversionOptions {
        ConversionOptions { output_dir: dir.to_owned(), ..Default::default() }
    }

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect()
    }

    fn convert_history(xml: &str, options: &ConversionOptions) -> Result<Vec<PathBuf>, ConversionError> {
        let input = options.output_dir.join("history.xml");
        std::fs::create_dir_all(&options.output_dir).unwrap();
        std::fs::write(&input, xml).unwrap();
        convert_file(&input, &conversion_info(), options)
    }

    #[test]
    fn one_filing_per_schema_and_closing_year() {
        let dir = tempfile::tempdir().unwrap();
        let written = convert_history(&trade_history(), &options_for(dir.path())).unwrap();

        assert_eq!(file_names(&written), vec![
            "DIFI-edavki-2021.xml",
            "DIFI-edavki-2022.xml",
            "KDVP-edavki-2021.xml",
            "KDVP-edavki-2022.xml",
        ]);

        let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();

        let kdvp_2021 = read("KDVP-edavki-2021.xml");
        assert_eq!(kdvp_2021.matches("<KDVPItem>").count(), 1);
        assert_eq!(kdvp_2021.matches("<Row>").count(), 4);
        assert!(kdvp_2021.contains("<Name>X</Name>"));

        let kdvp_2022 = read("KDVP-edavki-2022.xml");
        assert_eq!(kdvp_2022.matches("<KDVPItem>").count(), 1);
        assert_eq!(kdvp_2022.matches("<Row>").count(), 2);
        assert!(kdvp_2022.contains("<InventoryListType>PLVPSHORT</InventoryListType>"));

        let difi_2021 = read("DIFI-edavki-2021.xml");
        assert_eq!(difi_2021.matches("<TItem>").count(), 1);
        assert_eq!(difi_2021.matches("<TSubItem>").count(), 4);

        let difi_2022 = read("DIFI-edavki-2022.xml");
        assert_eq!(difi_2022.matches("<TItem>").count(), 1);
        assert_eq!(difi_2022.matches("<TShortSubItem>").count(), 2);
    }

    #[test]
    fn conversion_is_deterministic() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let a = convert_history(&trade_history(), &options_for(first.path())).unwrap();
        let b = convert_history(&trade_history(), &options_for(second.path())).unwrap();

        assert_eq!(file_names(&a), file_names(&b));
        for (a, b) in a.iter().zip(&b) {
            assert_eq!(std::fs::read_to_string(a).unwrap(), std::fs::read_to_string(b).unwrap());
        }
    }

    #[test]
    fn target_base_name_and_instrument_filter() {
        let dir = tempfile::tempdir().unwrap();
        let options = ConversionOptions {
            target_base_name: "janez".to_owned(),
            instruments: vec!["Y".to_owned()],
            ..options_for(dir.path())
        };
        let written = convert_history(&trade_history(), &options).unwrap();

        assert_eq!(file_names(&written), vec!["DIFI-janez-2022.xml", "KDVP-janez-2022.xml"]);
    }

    #[test]
    fn report_without_positions_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let xml = spreadsheet(&[&["Trade History Report"], &["Orders"]]);

        let written = convert_history(&xml, &options_for(dir.path())).unwrap();
        assert!(written.is_empty());

        let options = ConversionOptions { missing_data: MissingDataPolicy::Fail, ..options_for(dir.path()) };
        assert!(matches!(convert_history(&xml, &options), Err(ConversionError::Structure(_))));
    }

    #[test]
    fn invalid_row_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let good = position("2021.01.04 10:00:00", "X", "buy", "1", "10", "2021.01.05 10:00:00", "11", "1");
        let bad = position("2021.01.04 10:00:00", "X", "buy", "1", "ten", "2021.01.05 10:00:00", "11", "1");
        let xml = spreadsheet(&[HEADER, &good, &bad, &["Orders"]]);

        match convert_history(&xml, &options_for(dir.path())) {
            Err(ConversionError::Format { row: 2, column: 5, value, .. }) => assert_eq!(value, "ten"),
            other => panic!("expected format error, got {:?}", other),
        }

        let outputs: Vec<_> = std::fs::read_dir(dir.path()).unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "xml"))
            .filter(|entry| entry.file_name() != "history.xml")
            .collect();
        assert!(outputs.is_empty());
    }

    #[test]
    fn lots_are_exported_per_schema() {
        let dir = tempfile::tempdir().unwrap();
        let lots_csv = dir.path().join("lots.csv");
        let options = ConversionOptions { lots_csv: Some(lots_csv.clone()), ..options_for(dir.path()) };
        convert_history(&trade_history(), &options).unwrap();

        let csv = std::fs::read_to_string(&lots_csv).unwrap();
        let records: Vec<&str> = csv.lines().skip(1).collect();
        // three transactions, once for each schema
        assert_eq!(records.len(), 6);
        assert!(records[0].starts_with("DIFI,2021,X,buy,"));
        assert!(records[5].starts_with("KDVP,2022,Y,sell,"));
    }

    #[test]
    fn oversized_adjustment_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let extreme = position("2021.01.04 10:00:00", "X", "buy", "0.0001", "100.0001", "2021.01.05 10:00:00", "100", "100000000000000000000");
        let xml = spreadsheet(&[HEADER, &extreme, &["Orders"]]);

        match convert_history(&xml, &options_for(dir.path())) {
            Err(ConversionError::Format { row: 1, .. }) => {}
            other => panic!("expected format error, got {:?}", other),
        }
        assert!(!dir.path().join("DIFI-edavki-2021.xml").exists());
    }

    #[test]
    fn existing_outputs_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("KDVP-edavki-2021.xml");
        std::fs::write(&stale, "stale").unwrap();

        convert_history(&trade_history(), &options_for(dir.path())).unwrap();
        assert!(std::fs::read_to_string(&stale).unwrap().contains("<Doh_KDVP>"));
    }
}
