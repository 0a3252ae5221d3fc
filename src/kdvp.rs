//! Doh_KDVP: annual return on capital gains from disposal of securities.
//!
//! Long positions are reported as a `Securities` inventory (PLVP), short
//! positions as a `SecuritiesShort` inventory (PLVPSHORT). Every position
//! becomes a purchase and a sale row, numbered within its inventory.

use chrono::NaiveDate;
use linkme::distributed_slice;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    base::{serialize_decimal, ConversionError, Direction},
    config::ConversionInfo,
    edp::{self, Empty, Header, Taxpayer, EDP_NS},
    filing::{FilingSchema, FILING_SCHEMAS},
    lots::{GroupLots, LotPair, PriceBasis},
    time::serialize_date,
};

pub(crate) const TAG: &str = "KDVP";

const KDVP_NS: &str = "http://edavki.durs.si/Documents/Schemas/Doh_KDVP_9.xsd";

/// Acquisition by purchase
const GAIN_TYPE_PURCHASE: &str = "A";

#[derive(Debug, Serialize)]
#[serde(rename = "Envelope")]
pub(crate) struct KdvpEnvelope {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "@xmlns:edp")]
    xmlns_edp: &'static str,
    #[serde(rename = "edp:Header")]
    pub header: Header,
    #[serde(rename = "edp:AttachmentList")]
    attachment_list: Empty,
    #[serde(rename = "edp:Signatures")]
    signatures: Empty,
    pub body: KdvpBody,
}

#[derive(Debug, Serialize)]
pub(crate) struct KdvpBody {
    #[serde(rename = "edp:bodyContent")]
    body_content: Empty,
    #[serde(rename = "Doh_KDVP")]
    pub doh_kdvp: DohKdvp,
}

#[derive(Debug, Serialize)]
pub(crate) struct DohKdvp {
    #[serde(rename = "KDVP")]
    pub kdvp: KdvpSection,
    #[serde(rename = "KDVPItem")]
    pub items: Vec<KdvpItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct KdvpSection {
    #[serde(rename = "DocumentWorkflowID")]
    pub document_workflow_id: String,
    pub year: i32,
    #[serde(serialize_with = "serialize_date")]
    pub period_start: NaiveDate,
    #[serde(serialize_with = "serialize_date")]
    pub period_end: NaiveDate,
    pub is_resident: bool,
    pub telephone_number: String,
    /// Number of distinct (instrument, direction) inventories
    pub security_count: usize,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct KdvpItem {
    #[serde(rename = "ItemID")]
    pub item_id: usize,
    pub inventory_list_type: &'static str,
    pub name: String,
    pub has_foreign_tax: bool,
    pub has_loss_transfer: bool,
    pub foreign_transfer: bool,
    pub tax_decrease_conformance: bool,
    #[serde(rename = "$value")]
    pub inventory: Inventory,
}

#[derive(Debug, Serialize)]
pub(crate) enum Inventory {
    Securities(Securities),
    SecuritiesShort(SecuritiesShort),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Securities {
    pub name: String,
    pub is_fond: bool,
    pub row: Vec<SecuritiesRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SecuritiesShort {
    pub name: String,
    pub is_fond: bool,
    pub row: Vec<SecuritiesShortRow>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SecuritiesRow {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "$value")]
    pub entry: RowEntry,
    /// Quantity held after this row
    #[serde(rename = "F8", serialize_with = "serialize_decimal")]
    pub f8: Decimal,
}

#[derive(Debug, Serialize)]
pub(crate) struct SecuritiesShortRow {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "$value")]
    pub entry: ShortRowEntry,
}

#[derive(Debug, Serialize)]
pub(crate) enum RowEntry {
    Purchase(Purchase),
    Sale(Sale),
}

#[derive(Debug, Serialize)]
pub(crate) enum ShortRowEntry {
    Sale(ShortSale),
    Purchase(Purchase),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) struct Purchase {
    /// Acquisition date
    #[serde(serialize_with = "serialize_date")]
    pub f1: NaiveDate,
    /// Way of acquisition
    pub f2: &'static str,
    /// Quantity
    #[serde(serialize_with = "serialize_decimal")]
    pub f3: Decimal,
    /// Unit price
    #[serde(serialize_with = "serialize_decimal")]
    pub f4: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) struct Sale {
    /// Disposal date
    #[serde(serialize_with = "serialize_date")]
    pub f6: NaiveDate,
    /// Quantity
    #[serde(serialize_with = "serialize_decimal")]
    pub f7: Decimal,
    /// Unit price
    #[serde(serialize_with = "serialize_decimal")]
    pub f9: Decimal,
    /// Traded on a regulated market
    pub f10: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) struct ShortSale {
    #[serde(serialize_with = "serialize_date")]
    pub f6: NaiveDate,
    #[serde(serialize_with = "serialize_decimal")]
    pub f7: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub f9: Decimal,
}

fn long_rows(pair: &LotPair) -> [SecuritiesRow; 2] {
    let quantity = pair.quantity();
    [
        SecuritiesRow {
            id: pair.opening.id,
            entry: RowEntry::Purchase(Purchase {
                f1: pair.opening.time.date(),
                f2: GAIN_TYPE_PURCHASE,
                f3: quantity,
                f4: pair.opening.price,
            }),
            f8: quantity,
        },
        SecuritiesRow {
            id: pair.closing.id,
            entry: RowEntry::Sale(Sale {
                f6: pair.closing.time.date(),
                f7: quantity,
                f9: pair.closing.price,
                f10: true,
            }),
            f8: Decimal::ZERO,
        },
    ]
}

// The short sale is dated at the position close and the covering purchase at
// the position open, matching the filings submitted so far.
fn short_rows(pair: &LotPair) -> [SecuritiesShortRow; 2] {
    let quantity = pair.quantity();
    [
        SecuritiesShortRow {
            id: pair.opening.id,
            entry: ShortRowEntry::Sale(ShortSale {
                f6: pair.closing.time.date(),
                f7: quantity,
                f9: pair.opening.price,
            }),
        },
        SecuritiesShortRow {
            id: pair.closing.id,
            entry: ShortRowEntry::Purchase(Purchase {
                f1: pair.opening.time.date(),
                f2: GAIN_TYPE_PURCHASE,
                f3: quantity,
                f4: pair.closing.price,
            }),
        },
    ]
}

fn kdvp_item(index: usize, lots: &GroupLots) -> KdvpItem {
    let name = lots.key.instrument.clone();
    let (inventory_list_type, inventory) = match lots.key.direction {
        Direction::Buy => ("PLVP", Inventory::Securities(Securities {
            name: name.clone(),
            is_fond: false,
            row: lots.pairs.iter().flat_map(long_rows).collect(),
        })),
        Direction::Sell => ("PLVPSHORT", Inventory::SecuritiesShort(SecuritiesShort {
            name: name.clone(),
            is_fond: false,
            row: lots.pairs.iter().flat_map(short_rows).collect(),
        })),
    };

    KdvpItem {
        item_id: index + 1,
        inventory_list_type,
        name,
        has_foreign_tax: false,
        has_loss_transfer: false,
        foreign_transfer: false,
        tax_decrease_conformance: false,
        inventory,
    }
}

pub(crate) fn build_document(info: &ConversionInfo, year: i32, groups: &[GroupLots]) -> Result<KdvpEnvelope, ConversionError> {
    let (period_start, period_end) = edp::period(year)?;
    let person = &info.person_info;

    Ok(KdvpEnvelope {
        xmlns: KDVP_NS,
        xmlns_edp: EDP_NS,
        header: Header {
            taxpayer: Taxpayer::natural_person(person),
            workflow: None,
        },
        attachment_list: Empty::default(),
        signatures: Empty::default(),
        body: KdvpBody {
            body_content: Empty::default(),
            doh_kdvp: DohKdvp {
                kdvp: KdvpSection {
                    document_workflow_id: info.document_info.document_type.clone(),
                    year,
                    period_start,
                    period_end,
                    is_resident: true,
                    telephone_number: person.telephone.clone(),
                    security_count: groups.len(),
                    email: person.email.clone(),
                },
                items: groups.iter().enumerate().map(|(index, lots)| kdvp_item(index, lots)).collect(),
            },
        },
    })
}

fn render(info: &ConversionInfo, year: i32, groups: &[GroupLots]) -> Result<String, ConversionError> {
    edp::to_xml(&build_document(info, year, groups)?, TAG, year)
}

#[distributed_slice(FILING_SCHEMAS)]
static KDVP_SCHEMA: FilingSchema = FilingSchema {
    tag: TAG,
    label: "Doh-KDVP (capital gains on securities)",
    long_prices: PriceBasis::Raw,
    render,
};
