//! Per-document metadata: the fixed-shape [`MetadataRecord`] and the read-only
//! [`MetadataIndex`] built once per batch.
//!
//! The spreadsheet hands us loose `column name -> cell text` maps. They are
//! turned into named fields here, and only turned back into a generic mapping
//! when serialised for the repository (`properties` JSON) or the report sheet.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

/// Column names expected in the metadata sheet.
pub mod columns {
    pub const DOC_TYPE: &str = "doc_type";
    pub const CONTRACT_NO: &str = "cch_contract_no";
    pub const SFID: &str = "cch_sfid";
    pub const SOURCE: &str = "cch_source";
    pub const CUSTOMER_NAME: &str = "cch_customer_name";
    pub const CUSTOMER_ID: &str = "cch_customer_id";
    pub const CUSTOMER_ACCOUNT: &str = "cch_customer_account";
    pub const BOX_NO: &str = "cch_box_no";
    pub const MOBILE_NO: &str = "cch_mobile_no";
    pub const DEPARTMENT_CODE: &str = "cch_department_code";
    pub const DELETE_FLAG: &str = "deleteflag";
    pub const STATUS: &str = "cch_status";
    pub const SUB_DEPARTMENT_CODE: &str = "cch_sub_department_code";
    pub const SIM_NO: &str = "cch_sim_no";
    pub const COMMENTS: &str = "cch_comments";
}

/// Header row of the upload reports, in the order fields are written.
pub const REPORT_HEADERS: [&str; 16] = [
    "object_name",
    "r_object_type",
    "cch_contract_no",
    "cch_sfid",
    "cch_source",
    "cch_customer_name",
    "cch_customer_id",
    "cch_customer_account",
    "cch_box_no",
    "cch_mobile_no",
    "cch_department_code",
    "deleteflag",
    "cch_status",
    "cch_sub_department_code",
    "cch_sim_no",
    "cch_comments",
];

/// Descriptive fields for one document.
///
/// Every field is present; a value missing from the sheet is an empty string or
/// an empty list, never `null`. `customer_account` stays a decimal string so no
/// digits are lost to floating point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataRecord {
    #[serde(rename = "object_name")]
    pub document_id: String,
    #[serde(rename = "r_object_type")]
    pub document_type: String,
    #[serde(rename = "cch_contract_no")]
    pub contract_no: String,
    #[serde(rename = "cch_sfid")]
    pub sfid: String,
    #[serde(rename = "cch_source")]
    pub source: String,
    #[serde(rename = "cch_customer_name")]
    pub customer_name: String,
    #[serde(rename = "cch_customer_id")]
    pub customer_id: String,
    #[serde(rename = "cch_customer_account")]
    pub customer_account: String,
    #[serde(rename = "cch_box_no")]
    pub box_no: String,
    #[serde(rename = "cch_mobile_no")]
    pub mobile_numbers: Vec<String>,
    #[serde(rename = "cch_department_code")]
    pub department_code: String,
    #[serde(rename = "deleteflag")]
    pub delete_flag: String,
    #[serde(rename = "cch_status")]
    pub status: String,
    #[serde(rename = "cch_sub_department_code")]
    pub sub_department_code: String,
    #[serde(rename = "cch_sim_no")]
    pub sim_numbers: Vec<String>,
    #[serde(rename = "cch_comments")]
    pub comments: String,
}

impl MetadataRecord {
    /// Build a record from one sheet row. Unknown columns are ignored, missing
    /// ones become empty values.
    pub fn from_fields(document_id: &str, fields: &HashMap<String, String>) -> Self {
        let text = |column: &str| {
            fields
                .get(column)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        let list = |column: &str| {
            let value = text(column);
            if value.is_empty() {
                Vec::new()
            } else {
                vec![value]
            }
        };

        Self {
            document_id: document_id.trim().to_string(),
            document_type: text(columns::DOC_TYPE),
            contract_no: clean_contract_no(&text(columns::CONTRACT_NO)),
            sfid: text(columns::SFID),
            source: text(columns::SOURCE),
            customer_name: text(columns::CUSTOMER_NAME),
            customer_id: text(columns::CUSTOMER_ID),
            customer_account: text(columns::CUSTOMER_ACCOUNT),
            box_no: text(columns::BOX_NO),
            mobile_numbers: list(columns::MOBILE_NO),
            department_code: text(columns::DEPARTMENT_CODE),
            delete_flag: text(columns::DELETE_FLAG),
            status: text(columns::STATUS),
            sub_department_code: text(columns::SUB_DEPARTMENT_CODE),
            sim_numbers: list(columns::SIM_NO),
            comments: text(columns::COMMENTS),
        }
    }

    /// The `{"properties": {...}}` document sent alongside the file content.
    pub fn to_properties_json(&self) -> serde_json::Value {
        serde_json::json!({ "properties": self })
    }

    /// One report row, aligned with [`REPORT_HEADERS`]. List fields are joined
    /// with commas.
    pub fn report_row(&self) -> [String; 16] {
        [
            self.document_id.clone(),
            self.document_type.clone(),
            self.contract_no.clone(),
            self.sfid.clone(),
            self.source.clone(),
            self.customer_name.clone(),
            self.customer_id.clone(),
            self.customer_account.clone(),
            self.box_no.clone(),
            self.mobile_numbers.join(","),
            self.department_code.clone(),
            self.delete_flag.clone(),
            self.status.clone(),
            self.sub_department_code.clone(),
            self.sim_numbers.join(","),
            self.comments.clone(),
        ]
    }

    /// Label used for the audit trail's "affected customer" column.
    pub fn affected_customer(&self) -> String {
        format!("{} - {}", self.document_id, self.mobile_numbers.join(","))
    }
}

/// Spreadsheets store whole numbers as floats, so contract numbers often come
/// back as `12345.0`.
pub fn clean_contract_no(raw: &str) -> String {
    raw.strip_suffix(".0").unwrap_or(raw).to_string()
}

/// Lookup from document identifier to its record, for one batch.
///
/// Built once and never mutated; concurrent readers need no locking.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    records: HashMap<String, MetadataRecord>,
}

impl MetadataIndex {
    pub fn build<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, HashMap<String, String>)>,
    {
        let mut records = HashMap::new();
        for (identifier, fields) in rows {
            let identifier = identifier.trim().to_string();
            if identifier.is_empty() {
                continue;
            }
            let record = MetadataRecord::from_fields(&identifier, &fields);
            if records.insert(identifier.clone(), record).is_some() {
                debug!(document = %identifier, "Duplicate metadata row, keeping the last one");
            }
        }
        Self { records }
    }

    /// `None` means "skip this document", not an error.
    pub fn lookup(&self, identifier: &str) -> Option<&MetadataRecord> {
        self.records.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_columns_become_empty_values() {
        let record = MetadataRecord::from_fields("DOC-1", &HashMap::new());
        assert_eq!(record.document_id, "DOC-1");
        assert_eq!(record.document_type, "");
        assert_eq!(record.customer_account, "");
        assert!(record.mobile_numbers.is_empty());
        assert!(record.sim_numbers.is_empty());
    }

    #[test]
    fn contract_number_loses_trailing_float_suffix() {
        let record = MetadataRecord::from_fields("d", &fields(&[("cch_contract_no", "778899.0")]));
        assert_eq!(record.contract_no, "778899");
        assert_eq!(clean_contract_no("12.05"), "12.05");
        assert_eq!(clean_contract_no("1.0.0"), "1.0");
    }

    #[test]
    fn list_fields_wrap_single_values() {
        let record = MetadataRecord::from_fields(
            "d",
            &fields(&[("cch_mobile_no", " 0100200300 "), ("cch_sim_no", "")]),
        );
        assert_eq!(record.mobile_numbers, vec!["0100200300".to_string()]);
        assert!(record.sim_numbers.is_empty());
    }

    #[test]
    fn properties_json_keeps_lists_and_empty_strings() {
        let record = MetadataRecord::from_fields(
            "INV-7",
            &fields(&[
                ("doc_type", "contract"),
                ("cch_customer_account", "1.34086595"),
                ("cch_sim_no", "8920"),
            ]),
        );
        let json = record.to_properties_json();
        let props = &json["properties"];
        assert_eq!(props["object_name"], "INV-7");
        assert_eq!(props["r_object_type"], "contract");
        assert_eq!(props["cch_customer_account"], "1.34086595");
        assert_eq!(props["cch_sim_no"], serde_json::json!(["8920"]));
        assert_eq!(props["cch_mobile_no"], serde_json::json!([]));
        assert_eq!(props["cch_comments"], "");
        assert_eq!(props.as_object().map(|o| o.len()), Some(REPORT_HEADERS.len()));
    }

    #[test]
    fn report_row_matches_header_order() {
        let record = MetadataRecord::from_fields(
            "A1",
            &fields(&[("doc_type", "form"), ("cch_comments", "late")]),
        );
        let row = record.report_row();
        assert_eq!(row[0], "A1");
        assert_eq!(row[1], "form");
        assert_eq!(row[15], "late");
    }

    #[test]
    fn index_lookup_is_exact_and_skips_blank_ids() {
        let index = MetadataIndex::build(vec![
            (" Doc-A ".to_string(), fields(&[("doc_type", "x")])),
            ("".to_string(), fields(&[("doc_type", "ignored")])),
        ]);
        assert_eq!(index.len(), 1);
        assert!(index.lookup("Doc-A").is_some());
        assert!(index.lookup("doc-a").is_none());
        assert!(index.lookup("missing").is_none());
    }
}
