//! Taxpayer and document settings shared by all filings.
//!
//! Settings are read from a JSON file, optionally overlaid by a second file
//! holding the private parts (tax number, contact details), for example:
//!
//! ```json
//! {
//!   "ConversionInfo": {
//!     "PersonInfo": {
//!       "NameSurname": "Janez Novak",
//!       "Address1": "Slovenska cesta 1",
//!       "City": "Ljubljana",
//!       "PostNumber": "1000",
//!       "TaxNumber": "12345678",
//!       "Telephone": "041000000",
//!       "Email": "janez@example.com",
//!       "Birthdate": "1980-01-31"
//!     },
//!     "DocumentInfo": {
//!       "DocumentType": "O",
//!       "LongPositionPrices": { "KDVP": "raw", "DIFI": "adjusted" }
//!     }
//!   }
//! }
//! ```

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{base::ConversionError, lots::PriceBasis};

const SECTION: &str = "ConversionInfo";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PersonInfo {
    pub name_surname: String,
    pub address1: String,
    pub city: String,
    pub post_number: String,
    pub tax_number: String,
    #[serde(default)]
    pub telephone: String,
    #[serde(default)]
    pub email: String,
    pub birthdate: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DocumentInfo {
    /// Workflow code of the filing, e.g. `O` for an original, `P` for a correction
    pub document_type: String,
    /// Per schema tag override of the long position price basis
    #[serde(default)]
    pub long_position_prices: BTreeMap<String, PriceBasis>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ConversionInfo {
    pub person_info: PersonInfo,
    pub document_info: DocumentInfo,
}

impl ConversionInfo {
    /// Loads the settings file, merging in `secret_path` when that file exists.
    pub(crate) fn load(path: &Path, secret_path: Option<&Path>) -> Result<Self> {
        let mut value = read_section(path)?;

        if let Some(secret_path) = secret_path.filter(|p| p.exists()) {
            debug!("merging settings from {}", secret_path.display());
            merge(&mut value, read_section(secret_path)?);
        }

        let info: ConversionInfo = serde_json::from_value(value).with_context(|| {
            format!(
                "Failed to parse settings from {}. Check for missing PersonInfo or DocumentInfo fields.",
                path.display()
            )
        })?;
        info.validate()?;

        Ok(info)
    }

    pub(crate) fn validate(&self) -> Result<(), ConversionError> {
        let person = &self.person_info;
        if person.name_surname.trim().is_empty() {
            return Err(ConversionError::Config("NameSurname must not be empty".to_owned()));
        }
        if person.tax_number.len() != 8 || !person.tax_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConversionError::Config(format!(
                "TaxNumber must consist of 8 digits, got '{}'",
                person.tax_number
            )));
        }
        if self.document_info.document_type.trim().is_empty() {
            return Err(ConversionError::Config("DocumentType must not be empty".to_owned()));
        }
        Ok(())
    }

    /// The long position price basis for a schema, falling back to the
    /// schema's own default.
    pub(crate) fn long_prices_for(&self, schema_tag: &str, default: PriceBasis) -> PriceBasis {
        self.document_info.long_position_prices.get(schema_tag).copied().unwrap_or(default)
    }
}

fn read_section(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    let mut value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in settings file: {}", path.display()))?;

    if let Value::Object(map) = &mut value {
        if let Some(section) = map.remove(SECTION) {
            return Ok(section);
        }
    }
    Ok(value)
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn conversion_info() -> ConversionInfo {
        ConversionInfo {
            person_info: PersonInfo {
                name_surname: "Janez Novak".to_owned(),
                address1: "Slovenska cesta 1".to_owned(),
                city: "Ljubljana".to_owned(),
                post_number: "1000".to_owned(),
                tax_number: "12345678".to_owned(),
                telephone: "041000000".to_owned(),
                email: "janez@example.com".to_owned(),
                birthdate: NaiveDate::from_ymd_opt(1980, 1, 31).unwrap(),
            },
            document_info: DocumentInfo {
                document_type: "O".to_owned(),
                long_position_prices: BTreeMap::new(),
            },
        }
    }

    const PUBLIC: &str = r#"{
        "ConversionInfo": {
            "PersonInfo": {
                "NameSurname": "Janez Novak",
                "Address1": "Slovenska cesta 1",
                "City": "Ljubljana",
                "PostNumber": "1000",
                "TaxNumber": "00000000",
                "Birthdate": "1980-01-31"
            },
            "DocumentInfo": { "DocumentType": "O" }
        }
    }"#;

    #[test]
    fn secret_file_overrides_public_settings() {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("conversion.json");
        let secret = dir.path().join("conversion.secret.json");
        std::fs::write(&public, PUBLIC).unwrap();
        std::fs::write(&secret, r#"{
            "ConversionInfo": {
                "PersonInfo": { "TaxNumber": "12345678", "Email": "janez@example.com" },
                "DocumentInfo": { "LongPositionPrices": { "KDVP": "adjusted" } }
            }
        }"#).unwrap();

        let info = ConversionInfo::load(&public, Some(&secret)).unwrap();
        assert_eq!(info.person_info.tax_number, "12345678");
        assert_eq!(info.person_info.email, "janez@example.com");
        assert_eq!(info.person_info.city, "Ljubljana");
        assert_eq!(info.person_info.telephone, "");
        assert_eq!(info.document_info.document_type, "O");
        assert_eq!(info.long_prices_for("KDVP", PriceBasis::Raw), PriceBasis::Adjusted);
        assert_eq!(info.long_prices_for("DIFI", PriceBasis::Adjusted), PriceBasis::Adjusted);
    }

    #[test]
    fn missing_secret_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("conversion.json");
        std::fs::write(&public, PUBLIC.replace("00000000", "87654321")).unwrap();

        let info = ConversionInfo::load(&public, Some(&dir.path().join("missing.json"))).unwrap();
        assert_eq!(info.person_info.tax_number, "87654321");
        assert_eq!(info.person_info.birthdate, NaiveDate::from_ymd_opt(1980, 1, 31).unwrap());
    }

    #[test]
    fn settings_without_section_wrapper_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("conversion.json");
        let json: Value = serde_json::from_str(PUBLIC).unwrap();
        let mut section = json[SECTION].clone();
        section["PersonInfo"]["TaxNumber"] = Value::from("11112222");
        std::fs::write(&public, section.to_string()).unwrap();

        let info = ConversionInfo::load(&public, None).unwrap();
        assert_eq!(info.person_info.tax_number, "11112222");
    }

    #[test]
    fn invalid_tax_number_is_rejected() {
        let mut info = conversion_info();
        info.person_info.tax_number = "1234".to_owned();
        assert!(matches!(info.validate(), Err(ConversionError::Config(_))));

        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("conversion.json");
        std::fs::write(&public, PUBLIC.replace("00000000", "ABCDEFGH")).unwrap();
        let error = ConversionInfo::load(&public, None).unwrap_err();
        assert!(error.to_string().contains("TaxNumber"));
    }

    #[test]
    fn missing_settings_file_reports_its_path() {
        let error = ConversionInfo::load(Path::new("does-not-exist.json"), None).unwrap_err();
        assert!(error.to_string().contains("does-not-exist.json"));
    }
}
