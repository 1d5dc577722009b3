use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use utoipa::ToSchema;
use validator::Validate;

use crate::csv::CsvRecord;
use crate::ident::{Identifiers, SequenceKind, Sequenced};
use crate::utils::utc_now;

text_enum! {
    pub enum ApplicantType {
        Individual = "individual",
        Organization = "organization",
    }
}

text_enum! {
    pub enum MannerOfAccess {
        Inspection = "inspection",
        Copy = "copy",
        ViewingListen = "viewing_listen",
        WrittenTranscript = "written_transcript",
    }
}

text_enum! {
    pub enum FormOfAccess {
        HardCopy = "hard_copy",
        ElectronicCopy = "electronic_copy",
    }
}

text_enum! {
    pub enum RequestStatus {
        Pending = "pending",
        InReview = "inreview",
        Completed = "completed",
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::Pending
    }
}

/// An information-access request filed by a citizen.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct InfoRequest {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    #[serde(rename = "sampleID")]
    pub sample_id: String,
    pub name_of_applicant: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub telephone_number: String,
    pub email: String,
    pub type_of_applicant: ApplicantType,
    pub description_of_information: String,
    pub manner_of_access: MannerOfAccess,
    pub is_life_liberty: bool,
    pub life_liberty_details: Option<String>,
    pub form_of_access: FormOfAccess,
    pub date_of_submission: NaiveDate,
    pub witness_signature: Option<String>,
    pub witness_statement: Option<String>,
    pub institution_stamp: Option<String>,
    pub receipt_officer_name: Option<String>,
    pub date_of_receipt: Option<NaiveDate>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for InfoRequest {
    fn entity_type() -> &'static str {
        "request"
    }

    fn subject_id(&self) -> String {
        self.uuid.clone()
    }
}

impl CsvRecord for InfoRequest {
    fn headers() -> &'static [&'static str] {
        &[
            "Sample ID",
            "Name of Applicant",
            "Email",
            "Telephone",
            "Address",
            "Type of Applicant",
            "Description",
            "Manner of Access",
            "Form of Access",
            "Life or Liberty",
            "Date of Submission",
            "Status",
            "Created At",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.sample_id.clone(),
            self.name_of_applicant.clone(),
            self.email.clone(),
            self.telephone_number.clone(),
            self.address.clone(),
            self.type_of_applicant.to_string(),
            self.description_of_information.clone(),
            self.manner_of_access.to_string(),
            self.form_of_access.to_string(),
            if self.is_life_liberty { "yes" } else { "no" }.to_string(),
            self.date_of_submission.to_string(),
            self.status.to_string(),
            self.created_at.to_rfc3339(),
        ]
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct InfoRequestPayload {
    #[schema(example = "Ama Mensah")]
    #[validate(length(min = 1, message = "Name of applicant is required"))]
    pub name_of_applicant: String,
    #[schema(example = "1990-04-12")]
    pub date_of_birth: NaiveDate,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "Telephone number is required"))]
    pub telephone_number: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    pub type_of_applicant: ApplicantType,
    #[validate(length(min = 1, message = "Description of information is required"))]
    pub description_of_information: String,
    pub manner_of_access: MannerOfAccess,
    #[serde(default)]
    pub is_life_liberty: bool,
    pub life_liberty_details: Option<String>,
    pub form_of_access: FormOfAccess,
    pub date_of_submission: NaiveDate,
    pub witness_signature: Option<String>,
    pub witness_statement: Option<String>,
    pub institution_stamp: Option<String>,
    pub receipt_officer_name: Option<String>,
    pub date_of_receipt: Option<NaiveDate>,
    pub status: Option<RequestStatus>,
}

#[async_trait]
impl Sequenced for InfoRequestPayload {
    const KIND: SequenceKind = SequenceKind::Request;

    async fn insert(&self, conn: &mut SqliteConnection, ids: &Identifiers) -> Result<i64, sqlx::Error> {
        let now = utc_now();
        let result = sqlx::query(
            r#"
            INSERT INTO requests (
                uuid, sample_id, name_of_applicant, date_of_birth, address, telephone_number, email,
                type_of_applicant, description_of_information, manner_of_access, is_life_liberty,
                life_liberty_details, form_of_access, date_of_submission, witness_signature,
                witness_statement, institution_stamp, receipt_officer_name, date_of_receipt, status,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ids.uuid)
        .bind(&ids.sample_id)
        .bind(self.name_of_applicant.trim())
        .bind(self.date_of_birth)
        .bind(self.address.trim())
        .bind(self.telephone_number.trim())
        .bind(crate::utils::normalize_email(&self.email))
        .bind(self.type_of_applicant)
        .bind(self.description_of_information.trim())
        .bind(self.manner_of_access)
        .bind(self.is_life_liberty)
        .bind(&self.life_liberty_details)
        .bind(self.form_of_access)
        .bind(self.date_of_submission)
        .bind(&self.witness_signature)
        .bind(&self.witness_statement)
        .bind(&self.institution_stamp)
        .bind(&self.receipt_officer_name)
        .bind(self.date_of_receipt)
        .bind(self.status.unwrap_or_default())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[derive(Debug, Default, Clone, Deserialize, Validate, ToSchema)]
pub struct InfoRequestUpdate {
    #[validate(length(min = 1, message = "Name of applicant cannot be empty"))]
    pub name_of_applicant: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub telephone_number: Option<String>,
    #[validate(email(message = "A valid email is required"))]
    pub email: Option<String>,
    pub type_of_applicant: Option<ApplicantType>,
    pub description_of_information: Option<String>,
    pub manner_of_access: Option<MannerOfAccess>,
    pub is_life_liberty: Option<bool>,
    pub life_liberty_details: Option<String>,
    pub form_of_access: Option<FormOfAccess>,
    pub date_of_submission: Option<NaiveDate>,
    pub witness_signature: Option<String>,
    pub witness_statement: Option<String>,
    pub institution_stamp: Option<String>,
    pub receipt_officer_name: Option<String>,
    pub date_of_receipt: Option<NaiveDate>,
    pub status: Option<RequestStatus>,
}

impl InfoRequestUpdate {
    pub fn apply(self, row: &mut InfoRequest) {
        if let Some(v) = self.name_of_applicant {
            row.name_of_applicant = v.trim().to_string();
        }
        if let Some(v) = self.date_of_birth {
            row.date_of_birth = v;
        }
        if let Some(v) = self.address {
            row.address = v;
        }
        if let Some(v) = self.telephone_number {
            row.telephone_number = v;
        }
        if let Some(v) = self.email {
            row.email = crate::utils::normalize_email(&v);
        }
        if let Some(v) = self.type_of_applicant {
            row.type_of_applicant = v;
        }
        if let Some(v) = self.description_of_information {
            row.description_of_information = v;
        }
        if let Some(v) = self.manner_of_access {
            row.manner_of_access = v;
        }
        if let Some(v) = self.is_life_liberty {
            row.is_life_liberty = v;
        }
        if self.life_liberty_details.is_some() {
            row.life_liberty_details = self.life_liberty_details;
        }
        if let Some(v) = self.form_of_access {
            row.form_of_access = v;
        }
        if let Some(v) = self.date_of_submission {
            row.date_of_submission = v;
        }
        if self.witness_signature.is_some() {
            row.witness_signature = self.witness_signature;
        }
        if self.witness_statement.is_some() {
            row.witness_statement = self.witness_statement;
        }
        if self.institution_stamp.is_some() {
            row.institution_stamp = self.institution_stamp;
        }
        if self.receipt_officer_name.is_some() {
            row.receipt_officer_name = self.receipt_officer_name;
        }
        if self.date_of_receipt.is_some() {
            row.date_of_receipt = self.date_of_receipt;
        }
        if let Some(v) = self.status {
            row.status = v;
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusUpdate {
    #[schema(example = "inreview")]
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_normalises_review_spellings() {
        for raw in ["inreview", "in_review", "In Review", "IN-REVIEW"] {
            assert_eq!(RequestStatus::from_filter(raw), Some(RequestStatus::InReview), "{raw}");
        }
        assert_eq!(RequestStatus::from_filter("archived"), None);
    }

    #[test]
    fn payload_defaults_life_liberty_to_false() {
        let payload: InfoRequestPayload = serde_json::from_value(serde_json::json!({
            "name_of_applicant": "Ama Mensah",
            "date_of_birth": "1990-04-12",
            "address": "12 High Street",
            "telephone_number": "0200000000",
            "email": "ama@example.com",
            "type_of_applicant": "individual",
            "description_of_information": "Budget 2024",
            "manner_of_access": "copy",
            "form_of_access": "electronic_copy",
            "date_of_submission": "2025-02-01"
        }))
        .expect("payload");
        assert!(!payload.is_life_liberty);
        assert!(payload.status.is_none());
        assert!(payload.validate().is_ok());
    }
}
