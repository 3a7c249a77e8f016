use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NewswireError;

/// Store-assigned record identifier.
pub type RecordId = i64;

/// Title used when neither the source nor the caller supplies one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Longest accepted url, in characters.
pub const MAX_URL_LEN: usize = 2048;

/// Longest accepted title, country or published text, in characters.
pub const MAX_TEXT_LEN: usize = 1024;

/// A persisted news item.
///
/// `url` is the natural key: unique across live records and never touched by
/// field merges. `updated_at` never moves backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub url: String,
    pub title: String,
    pub country: Option<String>,
    pub published_text: Option<String>,
    pub comments: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Apply a field-level patch in place and bump `updated_at`.
    pub fn apply(&mut self, patch: &RecordPatch, now: DateTime<Utc>) {
        if let Some(url) = &patch.url {
            self.url = url.clone();
        }
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(country) = &patch.country {
            self.country = Some(country.clone());
        }
        if let Some(published_text) = &patch.published_text {
            self.published_text = Some(published_text.clone());
        }
        if let Some(comments) = patch.comments {
            self.comments = Some(comments);
        }
        self.updated_at = now.max(self.updated_at);
    }
}

/// A partially-populated record as produced by a fetcher or carried by a bus
/// payload. Every field is optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub published_text: Option<String>,
    #[serde(default)]
    pub comments: Option<u32>,
}

impl Candidate {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// The natural key, if present and non-blank.
    pub fn natural_key(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// Reject candidates whose fields the store would refuse.
    pub fn validate(&self) -> Result<(), NewswireError> {
        if let Some(url) = self.natural_key() {
            check_len("url", url, MAX_URL_LEN)?;
        }
        for (field, value) in [
            ("title", &self.title),
            ("country", &self.country),
            ("published_text", &self.published_text),
        ] {
            if let Some(value) = value {
                check_len(field, value.trim(), MAX_TEXT_LEN)?;
            }
        }
        Ok(())
    }
}

impl From<&Record> for Candidate {
    fn from(record: &Record) -> Self {
        Self {
            id: Some(record.id),
            url: Some(record.url.clone()),
            title: Some(record.title.clone()),
            country: record.country.clone(),
            published_text: record.published_text.clone(),
            comments: record.comments,
        }
    }
}

/// Validated input for inserting a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub published_text: Option<String>,
    #[serde(default)]
    pub comments: Option<u32>,
}

impl NewRecord {
    /// Build an insert from a candidate, applying defaults.
    ///
    /// Returns `None` when the candidate has no natural key. A missing or
    /// blank title falls back to [`DEFAULT_TITLE`].
    pub fn from_candidate(candidate: &Candidate) -> Option<Self> {
        let url = candidate.natural_key()?.to_string();
        Some(Self {
            url,
            title: present(&candidate.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            country: present(&candidate.country),
            published_text: present(&candidate.published_text),
            comments: candidate.comments,
        })
    }

    /// Trim every text field and drop blank optional ones, then validate.
    /// Every insert path goes through this so the stored url matches
    /// [`Candidate::natural_key`].
    pub fn normalized(mut self) -> Result<Self, NewswireError> {
        self.url = self.url.trim().to_string();
        self.title = self.title.trim().to_string();
        self.country = present(&self.country);
        self.published_text = present(&self.published_text);
        self.validate()?;
        Ok(self)
    }

    /// Reject inserts that would break the record invariants.
    pub fn validate(&self) -> Result<(), NewswireError> {
        if self.url.trim().is_empty() {
            return Err(NewswireError::InvalidRecord("url must not be empty".into()));
        }
        if self.title.trim().is_empty() {
            return Err(NewswireError::InvalidRecord("title must not be empty".into()));
        }
        check_len("url", &self.url, MAX_URL_LEN)?;
        check_len("title", &self.title, MAX_TEXT_LEN)?;
        check_optional_len("country", &self.country)?;
        check_optional_len("published_text", &self.published_text)?;
        Ok(())
    }
}

/// Field-level update. `None` means "keep the current value".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub published_text: Option<String>,
    #[serde(default)]
    pub comments: Option<u32>,
}

impl RecordPatch {
    /// Prefer-new-if-present merge: carry only the candidate's non-empty
    /// strings and non-null counters. The natural key is never part of it.
    pub fn prefer_present(candidate: &Candidate) -> Self {
        Self {
            url: None,
            title: present(&candidate.title),
            country: present(&candidate.country),
            published_text: present(&candidate.published_text),
            comments: candidate.comments,
        }
    }

    /// Trim every text field, then validate. Blank optional fields mean
    /// "keep", the same as omitting them.
    pub fn normalized(mut self) -> Result<Self, NewswireError> {
        self.url = self.url.map(|u| u.trim().to_string());
        self.title = self.title.map(|t| t.trim().to_string());
        self.country = present(&self.country);
        self.published_text = present(&self.published_text);
        self.validate()?;
        Ok(self)
    }

    /// Reject patches that would blank a required field.
    pub fn validate(&self) -> Result<(), NewswireError> {
        if matches!(&self.url, Some(u) if u.trim().is_empty()) {
            return Err(NewswireError::InvalidRecord("url must not be empty".into()));
        }
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(NewswireError::InvalidRecord("title must not be empty".into()));
        }
        if let Some(url) = &self.url {
            check_len("url", url, MAX_URL_LEN)?;
        }
        check_optional_len("title", &self.title)?;
        check_optional_len("country", &self.country)?;
        check_optional_len("published_text", &self.published_text)?;
        Ok(())
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), NewswireError> {
    let len = value.chars().count();
    if len > max {
        return Err(NewswireError::InvalidRecord(format!(
            "{field} is {len} characters, limit is {max}"
        )));
    }
    Ok(())
}

fn check_optional_len(field: &str, value: &Option<String>) -> Result<(), NewswireError> {
    match value {
        Some(value) => check_len(field, value, MAX_TEXT_LEN),
        None => Ok(()),
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
