//! Minimal record fixture for exercising the command core.

#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use steward_core::record::{BuildError, ProvisionedRecord, RecordBuilder, RecordId};

/// A small provisioned-record fixture.
///
/// Carries just enough structure to exercise every dispatcher path: an
/// identity, two comparable data fields, the requestor stamp applied by the
/// Generate flow, and the baseline attached by the Update flow.
#[derive(Clone, Debug, PartialEq)]
pub struct TestRecord {
    /// Record identity.
    pub id: String,
    /// Owning team, a mutable data field.
    pub owner: String,
    /// Deployment environment, a second mutable data field.
    pub environment: String,
    /// Principal stamped by the Generate flow.
    pub requested_by: Option<String>,
    /// Baseline attached by the Update flow before publication.
    pub baseline: Option<Box<TestRecord>>,
}

impl TestRecord {
    /// A record with the given identity and owner.
    #[must_use]
    pub fn new(id: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            environment: "production".to_string(),
            requested_by: None,
            baseline: None,
        }
    }

    /// Same record with a different owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }
}

impl ProvisionedRecord for TestRecord {
    fn record_id(&self) -> RecordId {
        RecordId::new(self.id.clone())
    }

    fn stamp_requestor(&mut self, principal: &str) {
        self.requested_by = Some(principal.to_string());
    }

    fn attach_baseline(&mut self, baseline: Self) {
        self.baseline = Some(Box::new(baseline));
    }
}

/// Builder converting `{"recordId", "owner", "environment"}` fragments.
#[derive(Clone, Debug, Default)]
pub struct TestRecordBuilder;

impl TestRecordBuilder {
    fn string_field(
        fragment: &serde_json::Value,
        field: &str,
    ) -> Result<Option<String>, BuildError> {
        match fragment.get(field) {
            None => Ok(None),
            Some(serde_json::Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(BuildError::new(
                "TestRecord",
                format!("field {field} must be a string"),
            )),
        }
    }
}

impl RecordBuilder<TestRecord> for TestRecordBuilder {
    fn build(&self, fragment: &serde_json::Value) -> Result<TestRecord, BuildError> {
        if !fragment.is_object() {
            return Err(BuildError::new("TestRecord", "fragment must be an object"));
        }
        let id = Self::string_field(fragment, "recordId")?
            .ok_or_else(|| BuildError::new("TestRecord", "missing recordId"))?;
        let owner = Self::string_field(fragment, "owner")?.unwrap_or_default();
        let environment =
            Self::string_field(fragment, "environment")?.unwrap_or_else(|| "production".to_string());
        Ok(TestRecord {
            id,
            owner,
            environment,
            requested_by: Self::string_field(fragment, "requestedBy")?,
            baseline: None,
        })
    }

    fn to_wire(&self, record: &TestRecord) -> serde_json::Value {
        let mut wire = serde_json::json!({
            "recordId": record.id,
            "owner": record.owner,
            "environment": record.environment,
        });
        if let Some(requested_by) = &record.requested_by {
            wire["requestedBy"] = serde_json::Value::String(requested_by.clone());
        }
        if let Some(baseline) = &record.baseline {
            wire["baseline"] = self.to_wire(baseline);
        }
        wire
    }
}

/// The wire form of a record, as [`TestRecordBuilder`] produces it.
#[must_use]
pub fn wire_record(id: &str, owner: &str) -> serde_json::Value {
    serde_json::json!({
        "recordId": id,
        "owner": owner,
        "environment": "production",
    })
}
