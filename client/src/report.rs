use chrono::{DateTime, TimeZone};
use qrcode::render::unicode::Dense1x2;
use qrcode::QrCode;
use serde::Deserialize;
use std::borrow::Cow;
use std::fmt;
use tracing::warn;

use crate::patient::PatientSummary;

/// Response of `POST /analyze`. Field shapes vary between server builds, so
/// counts and the UTI flag accept numbers or text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub rbc: Option<Reading>,
    #[serde(default)]
    pub wbc: Option<Reading>,
    #[serde(default)]
    pub uti: Option<UtiFlag>,
    #[serde(default)]
    pub result_url: Option<String>,
}

/// A cell count: either a number or a reported range like `"0-2 /hpf"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UtiFlag {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl UtiFlag {
    /// `Some(true)`/`Some(false)` when the value reads as a verdict, `None`
    /// for free text the server did not map to one.
    pub fn verdict(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "positive" | "pos" | "true" | "yes" | "detected" | "1" => Some(true),
                "negative" | "neg" | "false" | "no" | "not detected" | "0" | "" => Some(false),
                _ => None,
            },
        }
    }
}

impl AnalysisResult {
    pub fn uti_text(&self) -> Cow<'_, str> {
        match self.uti.as_ref() {
            None => Cow::Borrowed("NEGATIVE"),
            Some(flag) => match (flag.verdict(), flag) {
                (Some(true), _) => Cow::Borrowed("POSITIVE"),
                (Some(false), _) => Cow::Borrowed("NEGATIVE"),
                (None, UtiFlag::Text(s)) => Cow::Owned(s.trim().to_uppercase()),
                (None, _) => Cow::Borrowed("NEGATIVE"),
            },
        }
    }
}

/// Render `url` as a terminal QR code, light modules on a dark background.
pub fn report_qr(url: &str) -> Option<String> {
    match QrCode::new(url.as_bytes()) {
        Ok(code) => Some(
            code.render::<Dense1x2>()
                .dark_color(Dense1x2::Light)
                .light_color(Dense1x2::Dark)
                .build(),
        ),
        Err(e) => {
            warn!(error = %e, url, "cannot encode report link as QR code");
            None
        }
    }
}

/// Printable result card for one analysed sample. A QR code of the report
/// link follows the card when the server returned one.
pub struct ResultSummary<'a, Tz: TimeZone> {
    pub patient: &'a PatientSummary,
    pub result: &'a AnalysisResult,
    pub at: DateTime<Tz>,
}

impl<Tz: TimeZone> fmt::Display for ResultSummary<'_, Tz>
where
    Tz::Offset: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Patient Name: {}", self.patient.name)?;
        writeln!(f, "Age: {}", self.patient.age)?;
        writeln!(f, "Gender: {}", self.patient.sex)?;
        writeln!(f)?;
        writeln!(f, "Date & Time: {}", self.at.format("%B %-d, %Y %I:%M %p"))?;
        writeln!(f)?;
        writeln!(f, "RBC Count: {}", Count(self.result.rbc.as_ref()))?;
        writeln!(f, "WBC Count: {}", Count(self.result.wbc.as_ref()))?;
        write!(f, "UTI Result: {}", self.result.uti_text())?;
        if let Some(url) = &self.result.result_url {
            write!(f, "\nFull report: {url}")?;
            if let Some(qr) = report_qr(url) {
                write!(f, "\n\n{qr}")?;
            }
        }
        Ok(())
    }
}

struct Count<'a>(Option<&'a Reading>);

impl fmt::Display for Count<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(r) => r.fmt(f),
            None => f.write_str("N/A"),
        }
    }
}
