//! Feature table parsing.
//!
//! A feature table is a CSV sheet maintained by clinical collaborators. Each row binds one
//! model feature to the terminology code used to look it up in the record store, together
//! with a `data_alive_time` window describing how far back a record may lie and still count
//! as current. Repeated rows for the same model/feature pair accumulate: their codes join
//! into a comma-separated OR-list, while every other column keeps the last row's value.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Days, Duration, Months, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ScoringError, ScoringResult};

static ALIVE_WINDOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(0\d|1[12])-([12]\d|3[01]|0\d)T(2[0-3]|[01]\d):([0-5]\d):([0-5]\d)$")
        .expect("alive window pattern is valid")
});

/// A look-back duration written in the feature table.
///
/// The literal reads like a calendar timestamp, but every field is a duration magnitude:
/// `"0002-01-10T00:30:00"` means two years, one month, ten days and thirty minutes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AliveWindow {
    years: u32,
    months: u32,
    days: u32,
    hours: u32,
    minutes: u32,
    seconds: u32,
}

impl AliveWindow {
    /// Parse a `data_alive_time` literal.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::InvalidAliveWindowFormat` when the literal does not match the
    /// `YYYY-MM-DDThh:mm:ss` digit pattern exactly.
    pub fn parse(literal: &str) -> ScoringResult<Self> {
        let captures = ALIVE_WINDOW_RE
            .captures(literal)
            .ok_or_else(|| ScoringError::InvalidAliveWindowFormat(literal.to_string()))?;
        let field = |index: usize| {
            captures[index]
                .parse()
                .map_err(|_| ScoringError::InvalidAliveWindowFormat(literal.to_string()))
        };

        Ok(Self {
            years: field(1)?,
            months: field(2)?,
            days: field(3)?,
            hours: field(4)?,
            minutes: field(5)?,
            seconds: field(6)?,
        })
    }

    pub fn years(&self) -> u32 {
        self.years
    }

    pub fn months(&self) -> u32 {
        self.months
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn hours(&self) -> u32 {
        self.hours
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// Subtract the window from a reference time.
    ///
    /// Year and month arithmetic is calendar-aware: subtracting one month from 31 March
    /// clamps to the last day of February.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::InvalidTimestamp` when the subtraction leaves the range of
    /// representable timestamps.
    pub fn window_start(&self, reference: DateTime<Utc>) -> ScoringResult<DateTime<Utc>> {
        let months = self
            .years
            .checked_mul(12)
            .and_then(|months| months.checked_add(self.months))
            .ok_or(ScoringError::InvalidTimestamp)?;

        reference
            .checked_sub_months(Months::new(months))
            .and_then(|start| start.checked_sub_days(Days::new(u64::from(self.days))))
            .and_then(|start| {
                start.checked_sub_signed(
                    Duration::hours(i64::from(self.hours))
                        + Duration::minutes(i64::from(self.minutes))
                        + Duration::seconds(i64::from(self.seconds)),
                )
            })
            .ok_or(ScoringError::InvalidTimestamp)
    }
}

impl std::fmt::Display for AliveWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.years, self.months, self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// One raw feature table row, before accumulation into a [`FeatureCatalog`].
///
/// Columns other than the five named ones are carried in `extra` verbatim.
#[derive(Clone, Debug, Default)]
pub struct FeatureRow {
    pub model: String,
    pub feature: String,
    pub code: String,
    pub code_system: String,
    pub data_alive_time: String,
    pub extra: BTreeMap<String, String>,
}

/// The accumulated definition of one model feature.
#[derive(Clone, Debug)]
pub struct FeatureDefinition {
    code: String,
    alive_window: AliveWindow,
    type_of_data: String,
    default_value: String,
    extra: BTreeMap<String, String>,
}

impl FeatureDefinition {
    /// Comma-separated OR-list of terminology codes, each optionally prefixed with
    /// `system|`.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn alive_window(&self) -> AliveWindow {
        self.alive_window
    }

    /// Which retrieval strategy applies: `"observation"`, `"condition"` or `"patient"`.
    pub fn type_of_data(&self) -> &str {
        &self.type_of_data
    }

    pub fn default_value(&self) -> &str {
        &self.default_value
    }

    /// Collaborator-defined columns copied through from the table.
    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }
}

/// Feature definitions for every model in a feature table, keyed model → feature.
#[derive(Clone, Debug, Default)]
pub struct FeatureCatalog {
    models: BTreeMap<String, BTreeMap<String, FeatureDefinition>>,
}

impl FeatureCatalog {
    /// Accumulate raw rows into a catalog.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::MalformedFeatureRow` when a non-patient row carries no code,
    /// and `ScoringError::InvalidAliveWindowFormat` when a `data_alive_time` literal is
    /// malformed.
    pub fn load(rows: Vec<FeatureRow>) -> ScoringResult<Self> {
        let mut models: BTreeMap<String, BTreeMap<String, FeatureDefinition>> = BTreeMap::new();

        for row in rows {
            let mut extra = row.extra;
            let type_of_data = extra.remove("type_of_data").unwrap_or_default();
            let default_value = extra.remove("default_value").unwrap_or_default();

            let code = if row.code_system.is_empty() {
                row.code
            } else {
                format!("{}|{}", row.code_system, row.code)
            };
            if code.is_empty() && type_of_data != "patient" {
                return Err(ScoringError::MalformedFeatureRow(row.feature));
            }

            let alive_window = AliveWindow::parse(&row.data_alive_time)?;

            match models.entry(row.model).or_default().entry(row.feature) {
                Entry::Vacant(slot) => {
                    slot.insert(FeatureDefinition {
                        code,
                        alive_window,
                        type_of_data,
                        default_value,
                        extra,
                    });
                }
                Entry::Occupied(mut slot) => {
                    let definition = slot.get_mut();
                    definition.code.push(',');
                    definition.code.push_str(&code);
                    definition.alive_window = alive_window;
                    definition.type_of_data = type_of_data;
                    definition.default_value = default_value;
                    definition.extra.extend(extra);
                }
            }
        }

        Ok(Self { models })
    }

    /// Read a catalog from CSV text.
    ///
    /// The five named columns (`model`, `feature`, `code`, `code_system`,
    /// `data_alive_time`) are mapped onto [`FeatureRow`] fields; every other column is
    /// copied into [`FeatureRow::extra`].
    pub fn from_csv_reader<R: Read>(reader: R) -> ScoringResult<Self> {
        Self::from_records(csv::ReaderBuilder::new().from_reader(reader))
    }

    /// Read a catalog from a CSV file on disk.
    pub fn from_csv_path(path: impl AsRef<Path>) -> ScoringResult<Self> {
        Self::from_records(csv::ReaderBuilder::new().from_path(path)?)
    }

    fn from_records<R: Read>(mut reader: csv::Reader<R>) -> ScoringResult<Self> {
        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();

        for record in reader.records() {
            let record = record?;
            let mut row = FeatureRow::default();
            for (header, field) in headers.iter().zip(record.iter()) {
                match header {
                    "model" => row.model = field.to_string(),
                    "feature" => row.feature = field.to_string(),
                    "code" => row.code = field.to_string(),
                    "code_system" => row.code_system = field.to_string(),
                    "data_alive_time" => row.data_alive_time = field.to_string(),
                    other => {
                        row.extra.insert(other.to_string(), field.to_string());
                    }
                }
            }
            rows.push(row);
        }

        Self::load(rows)
    }

    /// Look up every feature definition for one model.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::UnknownModel` when the table has no rows for the model.
    pub fn get_model(&self, name: &str) -> ScoringResult<&BTreeMap<String, FeatureDefinition>> {
        self.models
            .get(name)
            .ok_or_else(|| ScoringError::UnknownModel(name.to_string()))
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn row(
        model: &str,
        feature: &str,
        code: &str,
        code_system: &str,
        window: &str,
        type_of_data: &str,
    ) -> FeatureRow {
        let mut extra = BTreeMap::new();
        extra.insert("type_of_data".to_string(), type_of_data.to_string());
        extra.insert("default_value".to_string(), String::new());
        FeatureRow {
            model: model.to_string(),
            feature: feature.to_string(),
            code: code.to_string(),
            code_system: code_system.to_string(),
            data_alive_time: window.to_string(),
            extra,
        }
    }

    #[test]
    fn test_parse_reads_each_field_as_a_duration_magnitude() {
        let window = AliveWindow::parse("2021-03-05T10:15:30").expect("literal should parse");

        assert_eq!(window.years(), 2021);
        assert_eq!(window.months(), 3);
        assert_eq!(window.days(), 5);
        assert_eq!(window.hours(), 10);
        assert_eq!(window.minutes(), 15);
        assert_eq!(window.seconds(), 30);
    }

    #[test]
    fn test_display_round_trips_the_literal() {
        let literal = "0000-01-10T00:30:00";
        let window = AliveWindow::parse(literal).expect("literal should parse");

        assert_eq!(window.to_string(), literal);
    }

    #[test]
    fn test_parse_rejects_malformed_literals() {
        for literal in [
            "qwerty",
            "0001-13-01T00:00:00",
            "0000-01-10T00:30:00 and more",
            "0000-01-10",
            "",
        ] {
            let err = AliveWindow::parse(literal).expect_err("literal should be rejected");
            match err {
                ScoringError::InvalidAliveWindowFormat(reported) => {
                    assert_eq!(reported, literal);
                }
                _ => panic!("Expected InvalidAliveWindowFormat error"),
            }
        }
    }

    #[test]
    fn test_window_start_subtracts_every_component() {
        let window = AliveWindow::parse("0000-01-10T00:30:00").unwrap();
        let reference = Utc.with_ymd_and_hms(2021, 3, 5, 10, 15, 30).unwrap();

        let start = window.window_start(reference).expect("subtraction should succeed");

        assert_eq!(start, Utc.with_ymd_and_hms(2021, 1, 26, 9, 45, 30).unwrap());
    }

    #[test]
    fn test_window_start_clamps_month_arithmetic_to_month_end() {
        let window = AliveWindow::parse("0000-01-00T00:00:00").unwrap();
        let reference = Utc.with_ymd_and_hms(2021, 3, 31, 12, 0, 0).unwrap();

        let start = window.window_start(reference).unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2021, 2, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_load_joins_codes_for_repeated_features() {
        let catalog = FeatureCatalog::load(vec![
            row("qcsi", "spo2", "A", "", "0000-00-01T00:00:00", "observation"),
            row("qcsi", "spo2", "B", "", "0000-00-02T00:00:00", "observation"),
        ])
        .expect("table should load");

        let features = catalog.get_model("qcsi").expect("model should exist");
        assert_eq!(features["spo2"].code(), "A,B");
        // Everything except the code list keeps the last row's value.
        assert_eq!(features["spo2"].alive_window().days(), 2);
    }

    #[test]
    fn test_load_prefixes_codes_with_their_system() {
        let catalog = FeatureCatalog::load(vec![row(
            "qcsi",
            "spo2",
            "2708-6",
            "http://loinc.org",
            "0000-00-01T00:00:00",
            "observation",
        )])
        .unwrap();

        let features = catalog.get_model("qcsi").unwrap();
        assert_eq!(features["spo2"].code(), "http://loinc.org|2708-6");
    }

    #[test]
    fn test_load_rejects_non_patient_rows_without_a_code() {
        let err = FeatureCatalog::load(vec![row(
            "qcsi",
            "spo2",
            "",
            "",
            "0000-00-01T00:00:00",
            "observation",
        )])
        .expect_err("empty code should be rejected");

        match err {
            ScoringError::MalformedFeatureRow(feature) => assert_eq!(feature, "spo2"),
            _ => panic!("Expected MalformedFeatureRow error"),
        }
    }

    #[test]
    fn test_load_allows_patient_rows_without_a_code() {
        let catalog = FeatureCatalog::load(vec![row(
            "qcsi",
            "age",
            "",
            "",
            "0000-00-01T00:00:00",
            "patient",
        )])
        .expect("patient rows may omit the code");

        let features = catalog.get_model("qcsi").unwrap();
        assert_eq!(features["age"].code(), "");
        assert_eq!(features["age"].type_of_data(), "patient");
    }

    #[test]
    fn test_get_model_rejects_unknown_models() {
        let catalog = FeatureCatalog::load(Vec::new()).unwrap();

        let err = catalog.get_model("missing").expect_err("model should be unknown");
        match err {
            ScoringError::UnknownModel(name) => assert_eq!(name, "missing"),
            _ => panic!("Expected UnknownModel error"),
        }
    }

    #[test]
    fn test_from_csv_reader_maps_named_and_extra_columns() {
        let table = "\
model,feature,code,code_system,data_alive_time,type_of_data,default_value,note
qcsi,respiratory_rate,9279-1,,0000-00-01T00:00:00,observation,,vital sign
";

        let catalog = FeatureCatalog::from_csv_reader(table.as_bytes()).expect("csv should load");

        let features = catalog.get_model("qcsi").unwrap();
        let definition = &features["respiratory_rate"];
        assert_eq!(definition.code(), "9279-1");
        assert_eq!(definition.type_of_data(), "observation");
        assert_eq!(definition.default_value(), "");
        assert_eq!(definition.extra()["note"], "vital sign");
    }

    #[test]
    fn test_from_csv_path_reads_a_table_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
        write!(
            file,
            "model,feature,code,code_system,data_alive_time,type_of_data,default_value\n\
             qcsi,spo2,2708-6,,0000-00-01T00:00:00,observation,\n"
        )
        .expect("temp file should be writable");

        let catalog = FeatureCatalog::from_csv_path(file.path()).expect("csv file should load");

        assert_eq!(catalog.model_names().collect::<Vec<_>>(), vec!["qcsi"]);
    }
}
