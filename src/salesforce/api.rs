use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Body of a Tooling API query reply.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub total_size: u64,
    #[serde(default)]
    pub next_records_url: Option<String>,
    #[serde(default)]
    pub records: Option<Vec<PackageVersionRecord>>,
}

/// A `Package2Version` row as projected by the package queries.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct PackageVersionRecord {
    pub subscriber_package_version_id: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
    pub build_number: u32,
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(with = "platform_datetime")]
    pub created_date: DateTime<Utc>,
    #[serde(with = "platform_datetime")]
    pub last_modified_date: DateTime<Utc>,
    #[serde(default, deserialize_with = "flag_as_string")]
    pub validation_skipped: String,
    #[serde(default)]
    pub is_released: bool,
    #[serde(default)]
    pub code_coverage: Option<CodeCoverage>,
    #[serde(default)]
    pub has_passed_code_coverage_check: Option<bool>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CodeCoverage {
    #[serde(default)]
    pub apex_code_coverage_percentage: Option<f64>,
}

/// One entry of the error array the REST API replies with on failure.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub message: String,
    pub error_code: String,
}

// The platform may send this flag as a boolean or as a string.
fn flag_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(flag) => flag,
        other => other.to_string(),
    })
}

mod platform_datetime {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer};

    /// e.g. `2022-03-01T10:00:00.000+0000`
    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(&raw))
            .map(|date| date.with_timezone(&Utc))
            .map_err(|error| D::Error::custom(format!("invalid date {}: {}", raw, error)))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn record_json() -> Value {
        json!({
            "attributes": {"type": "Package2Version"},
            "SubscriberPackageVersionId": "04t000000000001AAA",
            "MajorVersion": 1,
            "MinorVersion": 2,
            "PatchVersion": 0,
            "BuildNumber": 7,
            "Description": null,
            "Name": "core",
            "Tag": null,
            "CreatedDate": "2022-03-01T10:00:00.000+0000",
            "LastModifiedDate": "2022-03-02T11:30:00.000+0000",
            "ValidationSkipped": false,
            "ReleaseVersion": 1.2,
            "IsReleased": true,
            "CodeCoverage": {"apexCodeCoveragePercentage": 81.5},
            "HasPassedCodeCoverageCheck": true
        })
    }

    #[test]
    fn test_parse_record() {
        let record: PackageVersionRecord = serde_json::from_value(record_json()).unwrap();

        assert_eq!(record.subscriber_package_version_id, "04t000000000001AAA");
        assert_eq!(record.build_number, 7);
        assert_eq!(record.tag, None);
        assert_eq!(record.validation_skipped, "false");
        assert_eq!(
            record.created_date,
            Utc.with_ymd_and_hms(2022, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(
            record.last_modified_date,
            Utc.with_ymd_and_hms(2022, 3, 2, 11, 30, 0).unwrap()
        );
        assert_eq!(
            record.code_coverage.unwrap().apex_code_coverage_percentage,
            Some(81.5)
        );
        assert_eq!(record.has_passed_code_coverage_check, Some(true));
    }

    #[test]
    fn test_parse_record_loose_fields() {
        let mut raw = record_json();
        raw["ValidationSkipped"] = json!("true");
        raw["CodeCoverage"] = Value::Null;
        raw["HasPassedCodeCoverageCheck"] = Value::Null;
        raw["CreatedDate"] = json!("2022-03-01T10:00:00Z");
        raw.as_object_mut().unwrap().remove("Tag");

        let record: PackageVersionRecord = serde_json::from_value(raw).unwrap();

        assert_eq!(record.validation_skipped, "true");
        assert!(record.code_coverage.is_none());
        assert_eq!(record.has_passed_code_coverage_check, None);
        assert_eq!(
            record.created_date,
            Utc.with_ymd_and_hms(2022, 3, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_record_bad_date() {
        let mut raw = record_json();
        raw["CreatedDate"] = json!("yesterday");

        assert!(serde_json::from_value::<PackageVersionRecord>(raw).is_err());
    }

    #[test]
    fn test_parse_response_without_records() {
        let response: QueryResponse =
            serde_json::from_value(json!({"totalSize": 0, "done": true})).unwrap();
        assert!(response.records.is_none());

        let response: QueryResponse =
            serde_json::from_value(json!({"totalSize": 0, "done": true, "records": null}))
                .unwrap();
        assert!(response.records.is_none());
    }
}
