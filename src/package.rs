//! Package version lookups on the Tooling API.
//!
//! Both lookups run a single `Package2Version` query and map every returned
//! record into a [`PackageVersionInfo`], keeping the order of the reply.

use std::{fmt::Display, str::FromStr};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::salesforce::{PackageVersionRecord, ToolingConnection};

const PACKAGE_VERSION_SELECT: &str = "SELECT SubscriberPackageVersionId,MajorVersion,MinorVersion,\
PatchVersion,BuildNumber,Description,Name,Tag,CreatedDate,LastModifiedDate,ValidationSkipped,\
ReleaseVersion,IsReleased,CodeCoverage,HasPassedCodeCoverageCheck FROM Package2Version";

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersionInfo {
    pub subscriber_package_version_id: String,
    pub package_version_number: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
    pub build_number: u32,
    pub validation_skipped: String,
    pub name: String,
    pub tag: Option<String>,
    pub created_date: DateTime<Utc>,
    pub last_modified_date: DateTime<Utc>,
    pub is_released: bool,
    pub code_coverage: f64,
    pub code_coverage_check_passed: bool,
}

impl From<PackageVersionRecord> for PackageVersionInfo {
    fn from(record: PackageVersionRecord) -> Self {
        // Description is projected by the queries but not carried over.
        Self {
            package_version_number: format!(
                "{}.{}.{}.{}",
                record.major_version,
                record.minor_version,
                record.patch_version,
                record.build_number,
            ),
            subscriber_package_version_id: record.subscriber_package_version_id,
            major_version: record.major_version,
            minor_version: record.minor_version,
            patch_version: record.patch_version,
            build_number: record.build_number,
            validation_skipped: record.validation_skipped,
            name: record.name,
            tag: record.tag,
            created_date: record.created_date,
            last_modified_date: record.last_modified_date,
            is_released: record.is_released,
            code_coverage: record
                .code_coverage
                .map(|coverage| coverage.apex_code_coverage_percentage.unwrap_or(0.0))
                .unwrap_or(0.0),
            code_coverage_check_passed: record.has_passed_code_coverage_check.unwrap_or(false),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid version format {version:?}: {reason}")]
pub struct InvalidVersionFormat {
    pub version: String,
    pub reason: &'static str,
}

/// A `major.minor.patch.build` package version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl FromStr for VersionNumber {
    type Err = InvalidVersionFormat;

    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let segments = split_version(version)?;
        if segments.len() != 4 {
            return Err(invalid(version, "expected four segments"));
        }
        Ok(Self {
            major: parse_segment(version, segments[0])?,
            minor: parse_segment(version, segments[1])?,
            patch: parse_segment(version, segments[2])?,
            build: parse_segment(version, segments[3])?,
        })
    }
}

impl Display for VersionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

/// Parses the `major.minor.patch` part of a version, ignoring any build
/// segment such as `NEXT`.
fn parse_release(version: &str) -> Result<(u32, u32, u32), InvalidVersionFormat> {
    let segments = split_version(version)?;
    if segments.len() < 3 || segments.len() > 4 {
        return Err(invalid(version, "expected three or four segments"));
    }
    Ok((
        parse_segment(version, segments[0])?,
        parse_segment(version, segments[1])?,
        parse_segment(version, segments[2])?,
    ))
}

fn split_version(version: &str) -> Result<Vec<&str>, InvalidVersionFormat> {
    let version_trimmed = version.trim();
    if version_trimmed.is_empty() {
        return Err(invalid(version, "empty version"));
    }
    Ok(version_trimmed.split('.').collect())
}

fn parse_segment(version: &str, segment: &str) -> Result<u32, InvalidVersionFormat> {
    if segment.is_empty() || !segment.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(invalid(version, "segments must be unsigned integers"));
    }
    segment
        .parse()
        .map_err(|_| invalid(version, "segment out of range"))
}

fn invalid(version: &str, reason: &'static str) -> InvalidVersionFormat {
    InvalidVersionFormat {
        version: version.to_string(),
        reason,
    }
}

/// Quotes a value as a SOQL string literal.
fn soql_literal(value: &str) -> String {
    let mut literal = String::with_capacity(value.len() + 2);
    literal.push('\'');
    for c in value.chars() {
        match c {
            '\\' => literal.push_str("\\\\"),
            '\'' => literal.push_str("\\'"),
            '"' => literal.push_str("\\\""),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            '\u{8}' => literal.push_str("\\b"),
            '\u{c}' => literal.push_str("\\f"),
            c => literal.push(c),
        }
    }
    literal.push('\'');
    literal
}

pub(crate) fn package_info_query(
    package_name: &str,
    version: &str,
    package_version_id: &str,
    include_all_builds: bool,
) -> Result<String, InvalidVersionFormat> {
    if !package_version_id.is_empty() {
        return Ok(format!(
            "{} WHERE SubscriberPackageVersionId = {}",
            PACKAGE_VERSION_SELECT,
            soql_literal(package_version_id),
        ));
    }

    if include_all_builds {
        let (major, minor, patch) = parse_release(version)?;
        return Ok(format!(
            "{} WHERE Package2.Name = {} AND MajorVersion = {} AND MinorVersion = {} \
             AND PatchVersion = {} ORDER BY BuildNumber DESC",
            PACKAGE_VERSION_SELECT,
            soql_literal(package_name),
            major,
            minor,
            patch,
        ));
    }

    let version: VersionNumber = version.parse()?;
    Ok(format!(
        "{} WHERE Package2.Name = {} AND MajorVersion = {} AND MinorVersion = {} \
         AND PatchVersion = {} AND BuildNumber = {}",
        PACKAGE_VERSION_SELECT,
        soql_literal(package_name),
        version.major,
        version.minor,
        version.patch,
        version.build,
    ))
}

pub(crate) fn latest_package_version_query(package_name: &str, released_only: bool) -> String {
    let released_filter = match released_only {
        true => " AND IsReleased = true",
        false => "",
    };
    format!(
        "{} WHERE Package2.Name = {}{} ORDER BY CreatedDate DESC",
        PACKAGE_VERSION_SELECT,
        soql_literal(package_name),
        released_filter,
    )
}

async fn fetch_package_versions(
    connection: &impl ToolingConnection,
    query: &str,
) -> Result<Vec<PackageVersionInfo>> {
    log::debug!("Querying package versions: {}", query);

    let response = connection.query(query).await?;
    if let Some(next_records_url) = &response.next_records_url {
        log::warn!(
            "Reply holds {} of {} records, the rest at {} is not fetched",
            response.records.as_ref().map_or(0, Vec::len),
            response.total_size,
            next_records_url,
        );
    }

    let versions: Vec<PackageVersionInfo> = response
        .records
        .unwrap_or_default()
        .into_iter()
        .map(PackageVersionInfo::from)
        .collect();

    log::debug!("Found {} package versions", versions.len());
    Ok(versions)
}

/// Looks up package versions by subscriber package version id, or by package
/// name and version.
///
/// A non-empty `package_version_id` wins over the other filters. Otherwise
/// `version` must be `major.minor.patch.build`; with `include_all_builds`
/// only the first three segments are used and the builds come newest first.
pub async fn get_package_info(
    connection: &impl ToolingConnection,
    package_name: &str,
    version: &str,
    package_version_id: &str,
    include_all_builds: bool,
) -> Result<Vec<PackageVersionInfo>> {
    let query = package_info_query(package_name, version, package_version_id, include_all_builds)?;
    fetch_package_versions(connection, &query).await
}

/// Lists the versions of a package, most recently created first.
///
/// Every match is returned; the first element is the latest.
pub async fn get_latest_package_version(
    connection: &impl ToolingConnection,
    package_name: &str,
    released_only: bool,
) -> Result<Vec<PackageVersionInfo>> {
    let query = latest_package_version_query(package_name, released_only);
    fetch_package_versions(connection, &query).await
}
