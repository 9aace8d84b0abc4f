//! Identity attributes and their canonical byte encoding.
//!
//! Normalization happens here and only here. If two providers send the same
//! passport with different whitespace or casing, both must land on the same
//! fingerprint, so every string field is trimmed, lowercased, and collapsed
//! before hashing.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::FINGERPRINT_DOMAIN;

/// Kind of government document backing a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Passport,
    NationalId,
    DriversLicense,
    ResidencePermit,
}

impl DocumentKind {
    /// Stable code used in the canonical encoding. Never reorder or rename
    /// these; they are hashed into every fingerprint.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentKind::Passport => "passport",
            DocumentKind::NationalId => "national_id",
            DocumentKind::DriversLicense => "drivers_license",
            DocumentKind::ResidencePermit => "residence_permit",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The document attributes a verification provider reports for one person.
///
/// These are hashed into a fingerprint and then dropped; nothing in the
/// ledger or on chain ever stores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAttributes {
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub document_kind: DocumentKind,
    pub document_number: String,
    pub issuing_country: String,
}

impl IdentityAttributes {
    pub fn new(
        full_name: impl Into<String>,
        date_of_birth: NaiveDate,
        document_kind: DocumentKind,
        document_number: impl Into<String>,
        issuing_country: impl Into<String>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            date_of_birth,
            document_kind,
            document_number: document_number.into(),
            issuing_country: issuing_country.into(),
        }
    }

    /// Canonical encoding hashed by fingerprint derivation.
    ///
    /// Layout: domain tag, then each normalized field as a u32 big-endian
    /// length prefix followed by its UTF-8 bytes, in fixed declaration
    /// order. Field order and the date format are wire-frozen.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let fields = [
            normalize(&self.full_name),
            self.date_of_birth.format("%Y-%m-%d").to_string(),
            self.document_kind.code().to_string(),
            normalize(&self.document_number),
            normalize(&self.issuing_country),
        ];

        let total: usize = fields.iter().map(|f| 4 + f.len()).sum();
        let mut out = Vec::with_capacity(FINGERPRINT_DOMAIN.len() + total);
        out.extend_from_slice(FINGERPRINT_DOMAIN);
        for field in &fields {
            out.extend_from_slice(&(field.len() as u32).to_be_bytes());
            out.extend_from_slice(field.as_bytes());
        }
        out
    }
}

/// Normalizes one attribute field: trims, collapses internal whitespace
/// runs to a single space, and lowercases.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn birth_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(1990, 4, 2).expect("valid date")
    }

    #[test]
    fn normalize_trims_and_collapses() {
        assert_eq!(normalize("  Maria   da  Silva "), "maria da silva");
        assert_eq!(normalize("\tAB\n123\t"), "ab 123");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn normalize_lowercases_unicode() {
        assert_eq!(normalize("JOÃO"), "joão");
    }

    #[test]
    fn canonical_bytes_ignore_formatting_noise() {
        let a = IdentityAttributes::new(
            "Maria da Silva",
            birth_date(),
            DocumentKind::Passport,
            "AB123456",
            "BR",
        );
        let b = IdentityAttributes::new(
            "  maria  DA   silva ",
            birth_date(),
            DocumentKind::Passport,
            "ab123456",
            "br",
        );
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn canonical_bytes_distinguish_field_boundaries() {
        // Without length prefixes these two would concatenate identically.
        let a = IdentityAttributes::new(
            "ab",
            birth_date(),
            DocumentKind::Passport,
            "c",
            "br",
        );
        let b = IdentityAttributes::new(
            "a",
            birth_date(),
            DocumentKind::Passport,
            "bc",
            "br",
        );
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn canonical_bytes_start_with_domain_tag() {
        let attrs = IdentityAttributes::new(
            "x",
            birth_date(),
            DocumentKind::NationalId,
            "1",
            "ar",
        );
        assert!(attrs.canonical_bytes().starts_with(FINGERPRINT_DOMAIN));
    }

    #[test]
    fn document_kind_changes_encoding() {
        let passport = IdentityAttributes::new(
            "maria",
            birth_date(),
            DocumentKind::Passport,
            "1",
            "br",
        );
        let license = IdentityAttributes::new(
            "maria",
            birth_date(),
            DocumentKind::DriversLicense,
            "1",
            "br",
        );
        assert_ne!(passport.canonical_bytes(), license.canonical_bytes());
    }

    #[test]
    fn serde_json_round_trip() {
        let attrs = IdentityAttributes::new(
            "Maria da Silva",
            birth_date(),
            DocumentKind::ResidencePermit,
            "RP-99",
            "PT",
        );
        let json = serde_json::to_string(&attrs).expect("serialize");
        assert!(json.contains("residence_permit"));
        assert!(json.contains("1990-04-02"));
        let back: IdentityAttributes = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(attrs, back);
    }
}
