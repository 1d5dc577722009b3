use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use utoipa::ToSchema;
use validator::Validate;

use crate::csv::{opt, CsvRecord};
use crate::ident::{Identifiers, SequenceKind, Sequenced};
use crate::utils::{non_empty, normalize_email, utc_now};

text_enum! {
    pub enum ComplaintType {
        RefusalToDomainInformation = "Refusal to Domain Information",
        ExcessiveDelayInReport = "Excessive Delay in Report",
        UnreasonableFeesCharged = "Unreasonable Fees Charged",
        PartialInformationProvided = "Partial Information Provided",
    }
}

text_enum! {
    pub enum ComplaintPriority {
        High = "High",
        Medium = "Medium",
        Low = "Low",
    }
}

impl Default for ComplaintPriority {
    fn default() -> Self {
        ComplaintPriority::Low
    }
}

text_enum! {
    pub enum ComplaintStatus {
        Open = "Open",
        Investigating = "Investigating",
        Resolved = "Resolved",
    }
}

impl Default for ComplaintStatus {
    fn default() -> Self {
        ComplaintStatus::Open
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Complaint {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    #[serde(rename = "sampleID")]
    pub sample_id: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: ComplaintType,
    pub date_of_incident: NaiveDate,
    pub description: String,
    pub remedy_sought: Option<String>,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub national_id: Option<String>,
    pub passport_number: Option<String>,
    pub priority: ComplaintPriority,
    pub status: ComplaintStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Complaint {
    fn entity_type() -> &'static str {
        "complaint"
    }

    fn subject_id(&self) -> String {
        self.uuid.clone()
    }
}

impl CsvRecord for Complaint {
    fn headers() -> &'static [&'static str] {
        &[
            "Sample ID",
            "Type",
            "Full Name",
            "Email",
            "Phone",
            "Address",
            "National ID",
            "Passport Number",
            "Date of Incident",
            "Description",
            "Remedy Sought",
            "Priority",
            "Status",
            "Created At",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.sample_id.clone(),
            self.kind.to_string(),
            self.full_name.clone(),
            self.email.clone(),
            opt(&self.phone),
            opt(&self.address),
            opt(&self.national_id),
            opt(&self.passport_number),
            self.date_of_incident.to_string(),
            self.description.clone(),
            opt(&self.remedy_sought),
            self.priority.to_string(),
            self.status.to_string(),
            self.created_at.to_rfc3339(),
        ]
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ComplaintPayload {
    #[serde(rename = "type")]
    #[schema(example = "Excessive Delay in Report")]
    pub kind: ComplaintType,
    #[schema(example = "2025-01-15")]
    pub date_of_incident: NaiveDate,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub remedy_sought: Option<String>,
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub national_id: Option<String>,
    pub passport_number: Option<String>,
    pub priority: Option<ComplaintPriority>,
    pub status: Option<ComplaintStatus>,
}

#[async_trait]
impl Sequenced for ComplaintPayload {
    const KIND: SequenceKind = SequenceKind::Complaint;

    async fn insert(&self, conn: &mut SqliteConnection, ids: &Identifiers) -> Result<i64, sqlx::Error> {
        let now = utc_now();
        let email = self.email.as_deref().map(normalize_email).unwrap_or_default();

        let result = sqlx::query(
            r#"
            INSERT INTO complaints (
                uuid, sample_id, type, date_of_incident, description, remedy_sought, full_name, email,
                phone, address, national_id, passport_number, priority, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ids.uuid)
        .bind(&ids.sample_id)
        .bind(self.kind)
        .bind(self.date_of_incident)
        .bind(self.description.trim())
        .bind(non_empty(self.remedy_sought.clone()))
        .bind(self.full_name.trim())
        .bind(email)
        .bind(non_empty(self.phone.clone()))
        .bind(non_empty(self.address.clone()))
        .bind(non_empty(self.national_id.clone()))
        .bind(non_empty(self.passport_number.clone()))
        .bind(self.priority.unwrap_or_default())
        .bind(self.status.unwrap_or_default())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[derive(Debug, Default, Clone, Deserialize, Validate, ToSchema)]
pub struct ComplaintUpdate {
    #[serde(rename = "type")]
    pub kind: Option<ComplaintType>,
    pub date_of_incident: Option<NaiveDate>,
    #[validate(length(min = 1, message = "Description cannot be empty"))]
    pub description: Option<String>,
    pub remedy_sought: Option<String>,
    #[validate(length(min = 1, message = "Full name cannot be empty"))]
    pub full_name: Option<String>,
    #[validate(email(message = "A valid email is required"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub national_id: Option<String>,
    pub passport_number: Option<String>,
    pub priority: Option<ComplaintPriority>,
    pub status: Option<ComplaintStatus>,
}

impl ComplaintUpdate {
    pub fn apply(self, row: &mut Complaint) {
        if let Some(v) = self.kind {
            row.kind = v;
        }
        if let Some(v) = self.date_of_incident {
            row.date_of_incident = v;
        }
        if let Some(v) = self.description {
            row.description = v.trim().to_string();
        }
        if self.remedy_sought.is_some() {
            row.remedy_sought = non_empty(self.remedy_sought);
        }
        if let Some(v) = self.full_name {
            row.full_name = v.trim().to_string();
        }
        if let Some(v) = self.email {
            row.email = normalize_email(&v);
        }
        if self.phone.is_some() {
            row.phone = non_empty(self.phone);
        }
        if self.address.is_some() {
            row.address = non_empty(self.address);
        }
        if self.national_id.is_some() {
            row.national_id = non_empty(self.national_id);
        }
        if self.passport_number.is_some() {
            row.passport_number = non_empty(self.passport_number);
        }
        if let Some(v) = self.priority {
            row.priority = v;
        }
        if let Some(v) = self.status {
            row.status = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_priority_and_status_use_defaults() {
        let payload: ComplaintPayload = serde_json::from_value(serde_json::json!({
            "type": "Unreasonable Fees Charged",
            "date_of_incident": "2025-01-15",
            "description": "Charged twice",
            "full_name": "Kofi Boateng"
        }))
        .expect("payload");
        assert_eq!(payload.priority.unwrap_or_default(), ComplaintPriority::Low);
        assert_eq!(payload.status.unwrap_or_default(), ComplaintStatus::Open);
    }

    #[test]
    fn type_serialises_under_type_key() {
        let value = serde_json::to_value(ComplaintType::ExcessiveDelayInReport).expect("json");
        assert_eq!(value, "Excessive Delay in Report");
        assert_eq!(
            ComplaintType::from_filter("excessive delay in report"),
            Some(ComplaintType::ExcessiveDelayInReport)
        );
    }
}
