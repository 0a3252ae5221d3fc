//! Parts of the eDavki envelope shared by every FURS document type.

use chrono::NaiveDate;
use serde::Serialize;

use crate::{base::ConversionError, config::PersonInfo, time::serialize_date};

pub(crate) const EDP_NS: &str = "http://edavki.durs.si/Documents/Schemas/EDP-Common-1.xsd";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Natural person ("fizična oseba")
const NATURAL_PERSON: &str = "FO";

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Taxpayer {
    #[serde(rename = "edp:taxNumber")]
    pub tax_number: String,
    #[serde(rename = "edp:taxpayerType")]
    pub taxpayer_type: &'static str,
    #[serde(rename = "edp:name")]
    pub name: String,
    #[serde(rename = "edp:address1")]
    pub address1: String,
    #[serde(rename = "edp:city")]
    pub city: String,
    #[serde(rename = "edp:postNumber")]
    pub post_number: String,
    #[serde(rename = "edp:birthDate", serialize_with = "serialize_date")]
    pub birth_date: NaiveDate,
}

impl Taxpayer {
    pub(crate) fn natural_person(person: &PersonInfo) -> Self {
        Self {
            tax_number: person.tax_number.clone(),
            taxpayer_type: NATURAL_PERSON,
            name: person.name_surname.clone(),
            address1: person.address1.clone(),
            city: person.city.clone(),
            post_number: person.post_number.clone(),
            birth_date: person.birthdate,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Workflow {
    #[serde(rename = "edp:DocumentWorkflowID")]
    pub document_workflow_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Header {
    #[serde(rename = "edp:taxpayer")]
    pub taxpayer: Taxpayer,
    #[serde(rename = "edp:Workflow", skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Workflow>,
}

/// An element without content, like `<edp:Signatures/>`.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct Empty {}

/// Serializes a document envelope, including the XML declaration.
pub(crate) fn to_xml<T: Serialize>(document: &T, schema: &'static str, year: i32) -> Result<String, ConversionError> {
    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut body);
    serializer.indent(' ', 2);
    document.serialize(serializer).map_err(|e| ConversionError::Serialize {
        schema,
        year,
        message: e.to_string(),
    })?;

    Ok(format!("{}\n{}\n", XML_DECLARATION, body))
}

/// First and last day of the filing period.
pub(crate) fn period(year: i32) -> Result<(NaiveDate, NaiveDate), ConversionError> {
    let day = |month, day_of_month| NaiveDate::from_ymd_opt(year, month, day_of_month);
    match (day(1, 1), day(12, 31)) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(ConversionError::Structure(format!("year {} is out of range", year))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::conversion_info;

    #[derive(Serialize)]
    #[serde(rename = "Envelope")]
    struct TestEnvelope {
        #[serde(rename = "@xmlns:edp")]
        xmlns_edp: &'static str,
        #[serde(rename = "edp:Header")]
        header: Header,
        #[serde(rename = "edp:Signatures")]
        signatures: Empty,
    }

    #[test]
    fn header_lists_taxpayer_identity() {
        let info = conversion_info();
        let envelope = TestEnvelope {
            xmlns_edp: EDP_NS,
            header: Header {
                taxpayer: Taxpayer::natural_person(&info.person_info),
                workflow: Some(Workflow { document_workflow_id: "O".to_owned() }),
            },
            signatures: Empty::default(),
        };
        let xml = to_xml(&envelope, "TEST", 2021).unwrap();

        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.contains(r#"<Envelope xmlns:edp="http://edavki.durs.si/Documents/Schemas/EDP-Common-1.xsd">"#));
        assert!(xml.contains("<edp:taxNumber>12345678</edp:taxNumber>"));
        assert!(xml.contains("<edp:taxpayerType>FO</edp:taxpayerType>"));
        assert!(xml.contains("<edp:name>Janez Novak</edp:name>"));
        assert!(xml.contains("<edp:birthDate>1980-01-31</edp:birthDate>"));
        assert!(xml.contains("<edp:DocumentWorkflowID>O</edp:DocumentWorkflowID>"));
        assert!(xml.contains("<edp:Signatures/>"));
        assert!(xml.find("<edp:taxNumber>").unwrap() < xml.find("<edp:name>").unwrap());
    }

    #[test]
    fn header_without_workflow_omits_it() {
        let info = conversion_info();
        let envelope = TestEnvelope {
            xmlns_edp: EDP_NS,
            header: Header { taxpayer: Taxpayer::natural_person(&info.person_info), workflow: None },
            signatures: Empty::default(),
        };
        let xml = to_xml(&envelope, "TEST", 2021).unwrap();
        assert!(!xml.contains("Workflow"));
    }

    #[test]
    fn period_spans_the_calendar_year() {
        let (start, end) = period(2021).unwrap();
        assert_eq!(start.to_string(), "2021-01-01");
        assert_eq!(end.to_string(), "2021-12-31");
    }
}
