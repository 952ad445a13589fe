//! Data models for Orrery.
//!
//! Everything here is persisted as JSON in the device store, so field names
//! and enum spellings are part of the on-device format. Renaming them orphans
//! existing user data (tolerated, but avoid it).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The kinds of expensive generated reports the cache holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    /// Birth chart.
    Kundali,
    /// Daily almanac.
    Panchang,
    /// Daily forecast.
    Horoscope,
    Matchmaking,
    Muhurat,
    Numerology,
    Tarot,
    Palm,
    Face,
}

impl ReportType {
    /// Stable lowercase name, used as the fingerprint namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Kundali => "kundali",
            ReportType::Panchang => "panchang",
            ReportType::Horoscope => "horoscope",
            ReportType::Matchmaking => "matchmaking",
            ReportType::Muhurat => "muhurat",
            ReportType::Numerology => "numerology",
            ReportType::Tarot => "tarot",
            ReportType::Palm => "palm",
            ReportType::Face => "face",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scalar field of a report's form input.
///
/// Only scalars are allowed so canonicalization is unambiguous.
/// `Absent` stands for a field the form left unset; it canonicalizes the same
/// way as a missing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Absent,
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<f64> for FormValue {
    fn from(value: f64) -> Self {
        FormValue::Number(value)
    }
}

impl From<i64> for FormValue {
    fn from(value: i64) -> Self {
        FormValue::Number(value as f64)
    }
}

impl From<i32> for FormValue {
    fn from(value: i32) -> Self {
        FormValue::Number(f64::from(value))
    }
}

impl From<u32> for FormValue {
    fn from(value: u32) -> Self {
        FormValue::Number(f64::from(value))
    }
}

impl From<bool> for FormValue {
    fn from(value: bool) -> Self {
        FormValue::Bool(value)
    }
}

impl<T: Into<FormValue>> From<Option<T>> for FormValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FormValue::Absent, Into::into)
    }
}

/// The user-entered input a report was generated from.
///
/// Keys are held sorted, so two inputs built in different orders are equal
/// and serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormInput(BTreeMap<String, FormValue>);

impl FormInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FormValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FormValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FormValue> {
        self.0.get(key)
    }

    /// Fields in lexicographic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FormValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<FormValue>> FromIterator<(K, V)> for FormInput {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut input = FormInput::new();
        for (key, value) in iter {
            input.insert(key, value);
        }
        input
    }
}

/// Listing metadata for a saved report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Fingerprint of the form input, or a time-ordered id when saved without one.
    pub id: String,

    #[serde(rename = "type")]
    pub report_type: ReportType,

    pub title: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_input: Option<FormInput>,
}

/// A saved report: its metadata plus the generated payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord<T> {
    pub meta: ReportMeta,
    pub payload: T,
}

/// Daily usage of a rate-limited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    /// The calendar day this counter belongs to.
    pub date: NaiveDate,

    /// Actions taken on `date`.
    pub used: u32,

    /// Extra allowance earned on `date` (e.g. by watching ads).
    #[serde(default)]
    pub bonus: u32,
}

impl UsageCounter {
    /// A zeroed counter for `date`.
    pub fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            used: 0,
            bonus: 0,
        }
    }

    /// `base_limit + bonus`.
    pub fn effective_limit(&self, base_limit: u32) -> u32 {
        base_limit.saturating_add(self.bonus)
    }
}

/// A temporary unlock of a gated feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureGrant {
    pub feature: String,
    pub unlocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FeatureGrant {
    pub fn new(feature: impl Into<String>, now: DateTime<Utc>, duration: chrono::Duration) -> Self {
        Self {
            feature: feature.into(),
            unlocked_at: now,
            expires_at: now
                .checked_add_signed(duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// A grant is live strictly before its expiry instant.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.expires_at - now).max(chrono::Duration::zero())
    }
}

/// UI language for designed messages and backend prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Hi,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
        }
    }
}

/// The advisor persona a chat session is framed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    General,
    Career,
    Love,
    Health,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::General => "general",
            Persona::Career => "career",
            Persona::Love => "love",
            Persona::Health => "health",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_input_ignores_insertion_order() {
        let a = FormInput::new().with("name", "Asha").with("year", 1990);
        let b = FormInput::new().with("year", 1990).with("name", "Asha");
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_form_value_roundtrips_scalars() {
        let input: FormInput =
            serde_json::from_str(r#"{"a":"x","b":2.5,"c":true,"d":null}"#).unwrap();
        assert_eq!(input.get("a"), Some(&FormValue::Text("x".into())));
        assert_eq!(input.get("b"), Some(&FormValue::Number(2.5)));
        assert_eq!(input.get("c"), Some(&FormValue::Bool(true)));
        assert_eq!(input.get("d"), Some(&FormValue::Absent));
    }

    #[test]
    fn test_option_converts_to_absent() {
        let none: Option<&str> = None;
        assert_eq!(FormValue::from(none), FormValue::Absent);
        assert_eq!(FormValue::from(Some("x")), FormValue::Text("x".into()));
    }

    #[test]
    fn test_report_meta_uses_type_field() {
        let meta = ReportMeta {
            id: "tarot_abc".into(),
            report_type: ReportType::Tarot,
            title: "tarot report".into(),
            created_at: Utc::now(),
            form_input: None,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "tarot");
        assert!(json.get("form_input").is_none());
    }

    #[test]
    fn test_usage_counter_missing_bonus_defaults_to_zero() {
        let counter: UsageCounter =
            serde_json::from_str(r#"{"date":"2024-01-01","used":4}"#).unwrap();
        assert_eq!(counter.bonus, 0);
        assert_eq!(counter.effective_limit(10), 10);
    }

    #[test]
    fn test_feature_grant_expiry() {
        let now = Utc::now();
        let grant = FeatureGrant::new("tarot", now, chrono::Duration::minutes(5));
        assert!(grant.is_live(now));
        assert_eq!(grant.remaining(now), chrono::Duration::minutes(5));

        let later = now + chrono::Duration::minutes(5);
        assert!(!grant.is_live(later));
        assert_eq!(grant.remaining(later), chrono::Duration::zero());
    }

    #[test]
    fn test_feature_grant_saturates_far_expiry() {
        let now = Utc::now();
        let grant = FeatureGrant::new("tarot", now, chrono::Duration::MAX);
        assert_eq!(grant.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(grant.is_live(now));
    }
}
