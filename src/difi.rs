//! D-IFI: annual return on gains from derivative financial instruments.
//!
//! Each (instrument, direction) group becomes a `TItem` of contracts for
//! difference. Long positions are written as `TSubItem` purchase/sale pairs,
//! short positions as `TShortSubItem` sale/purchase pairs with a negative
//! open quantity.

use chrono::NaiveDate;
use linkme::distributed_slice;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    base::{serialize_decimal, ConversionError, Direction},
    config::ConversionInfo,
    edp::{self, Empty, Header, Taxpayer, Workflow, EDP_NS},
    filing::{FilingSchema, FILING_SCHEMAS},
    lots::{GroupLots, LotPair, PriceBasis},
    time::serialize_date,
};

pub(crate) const TAG: &str = "DIFI";

const DIFI_NS: &str = "http://edavki.durs.si/Documents/Schemas/D_IFI_4.xsd";

const GAIN_TYPE_PURCHASE: &str = "A";
const CFD_TYPE: &str = "02";
const CFD_TYPE_NAME: &str = "finančne pogodbe na razliko";

#[derive(Debug, Serialize)]
#[serde(rename = "Envelope")]
pub(crate) struct DifiEnvelope {
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
    pub body: DifiBody,
}

#[derive(Debug, Serialize)]
pub(crate) struct DifiBody {
    #[serde(rename = "edp:bodyContent")]
    body_content: Empty,
    #[serde(rename = "D_IFI")]
    pub d_ifi: DIfi,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DIfi {
    #[serde(serialize_with = "serialize_date")]
    pub period_start: NaiveDate,
    #[serde(serialize_with = "serialize_date")]
    pub period_end: NaiveDate,
    pub telephone_number: String,
    pub email: String,
    #[serde(rename = "TItem")]
    pub items: Vec<TItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TItem {
    pub type_id: &'static str,
    #[serde(rename = "Type")]
    pub type_code: &'static str,
    pub type_name: &'static str,
    pub name: String,
    pub has_foreign_tax: bool,
    #[serde(rename = "$value")]
    pub entries: Vec<TItemEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) enum TItemEntry {
    TSubItem(TSubItem),
    TShortSubItem(TShortSubItem),
}

#[derive(Debug, Serialize)]
pub(crate) struct TSubItem {
    #[serde(rename = "$value")]
    pub entry: SubItemEntry,
    /// Quantity held after this entry
    #[serde(rename = "F8", serialize_with = "serialize_decimal")]
    pub f8: Decimal,
}

#[derive(Debug, Serialize)]
pub(crate) struct TShortSubItem {
    #[serde(rename = "$value")]
    pub entry: ShortSubItemEntry,
    /// Quantity held after this entry, negative while the short is open
    #[serde(rename = "F8", serialize_with = "serialize_decimal")]
    pub f8: Decimal,
}

#[derive(Debug, Serialize)]
pub(crate) enum SubItemEntry {
    Purchase(Purchase),
    Sale(Sale),
}

#[derive(Debug, Serialize)]
pub(crate) enum ShortSubItemEntry {
    Sale(ShortSale),
    Purchase(ShortPurchase),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) struct Purchase {
    #[serde(serialize_with = "serialize_date")]
    pub f1: NaiveDate,
    pub f2: &'static str,
    #[serde(serialize_with = "serialize_decimal")]
    pub f3: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub f4: Decimal,
    /// Leveraged trade
    pub f9: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) struct Sale {
    #[serde(serialize_with = "serialize_date")]
    pub f5: NaiveDate,
    #[serde(serialize_with = "serialize_decimal")]
    pub f6: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub f7: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) struct ShortSale {
    #[serde(serialize_with = "serialize_date")]
    pub f1: NaiveDate,
    #[serde(serialize_with = "serialize_decimal")]
    pub f2: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub f3: Decimal,
    /// Leveraged trade
    pub f9: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) struct ShortPurchase {
    #[serde(serialize_with = "serialize_date")]
    pub f4: NaiveDate,
    pub f5: &'static str,
    #[serde(serialize_with = "serialize_decimal")]
    pub f6: Decimal,
    #[serde(serialize_with = "serialize_decimal")]
    pub f7: Decimal,
}

fn long_entries(pair: &LotPair) -> [TItemEntry; 2] {
    let quantity = pair.quantity();
    [
        TItemEntry::TSubItem(TSubItem {
            entry: SubItemEntry::Purchase(Purchase {
                f1: pair.opening.time.date(),
                f2: GAIN_TYPE_PURCHASE,
                f3: quantity,
                f4: pair.opening.price,
                f9: pair.is_leveraged(),
            }),
            f8: quantity,
        }),
        TItemEntry::TSubItem(TSubItem {
            entry: SubItemEntry::Sale(Sale {
                f5: pair.closing.time.date(),
                f6: quantity,
                f7: pair.closing.price,
            }),
            f8: Decimal::ZERO,
        }),
    ]
}

fn short_entries(pair: &LotPair) -> [TItemEntry; 2] {
    let quantity = pair.quantity();
    [
        TItemEntry::TShortSubItem(TShortSubItem {
            entry: ShortSubItemEntry::Sale(ShortSale {
                f1: pair.opening.time.date(),
                f2: quantity,
                f3: pair.opening.price,
                f9: pair.is_leveraged(),
            }),
            f8: -quantity,
        }),
        TItemEntry::TShortSubItem(TShortSubItem {
            entry: ShortSubItemEntry::Purchase(ShortPurchase {
                f4: pair.closing.time.date(),
                f5: GAIN_TYPE_PURCHASE,
                f6: quantity,
                f7: pair.closing.price,
            }),
            f8: Decimal::ZERO,
        }),
    ]
}

fn t_item(lots: &GroupLots) -> TItem {
    let (type_id, entries) = match lots.key.direction {
        Direction::Buy => ("PLIFI", lots.pairs.iter().flat_map(long_entries).collect()),
        Direction::Sell => ("PLIFIShort", lots.pairs.iter().flat_map(short_entries).collect()),
    };

    TItem {
        type_id,
        type_code: CFD_TYPE,
        type_name: CFD_TYPE_NAME,
        name: lots.key.instrument.clone(),
        has_foreign_tax: false,
        entries,
    }
}

pub(crate) fn build_document(info: &ConversionInfo, year: i32, groups: &[GroupLots]) -> Result<DifiEnvelope, ConversionError> {
    let (period_start, period_end) = edp::period(year)?;
    let person = &info.person_info;

    Ok(DifiEnvelope {
        xmlns: DIFI_NS,
        xmlns_edp: EDP_NS,
        header: Header {
            taxpayer: Taxpayer::natural_person(person),
            workflow: Some(Workflow {
                document_workflow_id: info.document_info.document_type.clone(),
            }),
        },
        attachment_list: Empty::default(),
        signatures: Empty::default(),
        body: DifiBody {
            body_content: Empty::default(),
            d_ifi: DIfi {
                period_start,
                period_end,
                telephone_number: person.telephone.clone(),
                email: person.email.clone(),
                items: groups.iter().map(t_item).collect(),
            },
        },
    })
}

fn render(info: &ConversionInfo, year: i32, groups: &[GroupLots]) -> Result<String, ConversionError> {
    edp::to_xml(&build_document(info, year, groups)?, TAG, year)
}

#[distributed_slice(FILING_SCHEMAS)]
static DIFI_SCHEMA: FilingSchema = FilingSchema {
    tag: TAG,
    label: "D-IFI (gains on derivatives)",
    long_prices: PriceBasis::Adjusted,
    render,
};
