use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatientError {
    #[error("First name is required.")]
    FirstNameRequired,
    #[error("Last name is required.")]
    LastNameRequired,
    #[error("Age is required.")]
    AgeRequired,
    #[error("Age must be numeric.")]
    AgeNotNumeric,
    #[error("Please select a sex.")]
    SexNotSelected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl FromStr for Sex {
    type Err = PatientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            _ => Err(PatientError::SexNotSelected),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => f.write_str("Male"),
            Self::Female => f.write_str("Female"),
        }
    }
}

/// Server-assigned identifier. Some deployments hand out integers, others
/// strings, so both are accepted and echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl FromStr for UserId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Text(s.trim().to_string()),
        })
    }
}

/// Age as listed by the server. Usually a whole number, but older records
/// carry it as text and some exports as a float.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Age {
    Years(u32),
    Number(f64),
    Text(String),
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Years(n) => write!(f, "{n}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s.trim()),
        }
    }
}

/// A validated walk-in patient, ready to be registered with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPatient {
    pub firstname: String,
    pub middlename: String,
    pub lastname: String,
    pub age: u32,
    #[serde(rename = "gender")]
    pub sex: Sex,
}

impl NewPatient {
    /// Validate raw form input. Checks run in form order so the first
    /// offending field is the one reported.
    pub fn validate(
        first_name: &str,
        middle_name: &str,
        last_name: &str,
        age: &str,
        sex: &str,
    ) -> Result<Self, PatientError> {
        let firstname = title_case(first_name.trim());
        if firstname.is_empty() {
            return Err(PatientError::FirstNameRequired);
        }
        let lastname = title_case(last_name.trim());
        if lastname.is_empty() {
            return Err(PatientError::LastNameRequired);
        }
        let age = age.trim();
        if age.is_empty() {
            return Err(PatientError::AgeRequired);
        }
        if !age.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PatientError::AgeNotNumeric);
        }
        let age = age.parse().map_err(|_| PatientError::AgeNotNumeric)?;
        let sex = sex.parse()?;

        Ok(Self {
            firstname,
            middlename: title_case(middle_name.trim()),
            lastname,
            age,
            sex,
        })
    }

    pub fn full_name(&self) -> String {
        join_name(&[&self.firstname, &self.middlename, &self.lastname])
    }
}

/// A patient already known to the server, as listed by `GET /api/users`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegisteredUser {
    pub id: UserId,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub middlename: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub age: Option<Age>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl RegisteredUser {
    pub fn full_name(&self) -> String {
        join_name(&[
            self.firstname.as_deref().unwrap_or_default(),
            self.middlename.as_deref().unwrap_or_default(),
            self.lastname.as_deref().unwrap_or_default(),
        ])
    }

    pub fn age_text(&self) -> String {
        self.age.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    pub fn gender_text(&self) -> &str {
        self.gender.as_deref().unwrap_or_default()
    }
}

/// Who a sample belongs to, as sent alongside the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientSummary {
    pub name: String,
    pub age: String,
    pub sex: String,
    pub user_id: Option<UserId>,
}

impl PatientSummary {
    pub fn from_new(patient: &NewPatient, user_id: UserId) -> Self {
        Self {
            name: patient.full_name(),
            age: patient.age.to_string(),
            sex: patient.sex.to_string(),
            user_id: Some(user_id),
        }
    }
}

impl From<&RegisteredUser> for PatientSummary {
    fn from(user: &RegisteredUser) -> Self {
        Self {
            name: user.full_name(),
            age: user.age_text(),
            sex: user.gender_text().to_string(),
            user_id: Some(user.id.clone()),
        }
    }
}

/// Case-insensitive substring match on the full name. A blank query
/// matches everyone.
pub fn search_users<'a>(users: &'a [RegisteredUser], query: &str) -> Vec<&'a RegisteredUser> {
    let query = query.trim().to_lowercase();
    users
        .iter()
        .filter(|u| u.full_name().to_lowercase().contains(&query))
        .collect()
}

/// Join name parts with single spaces, dropping empty parts and collapsing
/// inner whitespace.
fn join_name(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|p| p.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uppercase the first letter of every word and lowercase the rest. Any
/// non-alphabetic character starts a new word ("o'neil" -> "O'Neil").
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, first: &str, middle: Option<&str>, last: &str) -> RegisteredUser {
        RegisteredUser {
            id: UserId::Number(id),
            firstname: Some(first.into()),
            middlename: middle.map(Into::into),
            lastname: Some(last.into()),
            age: Some(Age::Years(30)),
            gender: Some("Female".into()),
        }
    }

    #[test]
    fn validate_normalises_names() {
        let p = NewPatient::validate("  maria ", "dela  cruz", "SANTOS", " 34 ", "female").unwrap();
        assert_eq!(p.firstname, "Maria");
        assert_eq!(p.middlename, "Dela  Cruz");
        assert_eq!(p.lastname, "Santos");
        assert_eq!(p.age, 34);
        assert_eq!(p.sex, Sex::Female);
        assert_eq!(p.full_name(), "Maria Dela Cruz Santos");
    }

    #[test]
    fn middle_name_is_optional() {
        let p = NewPatient::validate("juan", "", "luna", "7", "M").unwrap();
        assert_eq!(p.full_name(), "Juan Luna");
    }

    #[test]
    fn validation_reports_first_failing_field() {
        assert_eq!(
            NewPatient::validate(" ", "", "", "", ""),
            Err(PatientError::FirstNameRequired)
        );
        assert_eq!(
            NewPatient::validate("a", "", "", "", ""),
            Err(PatientError::LastNameRequired)
        );
        assert_eq!(
            NewPatient::validate("a", "", "b", "", ""),
            Err(PatientError::AgeRequired)
        );
        assert_eq!(
            NewPatient::validate("a", "", "b", "-3", "Male"),
            Err(PatientError::AgeNotNumeric)
        );
        assert_eq!(
            NewPatient::validate("a", "", "b", "3", "Select Sex"),
            Err(PatientError::SexNotSelected)
        );
    }

    #[test]
    fn title_case_matches_word_boundaries() {
        assert_eq!(title_case("o'neil mcDONALD"), "O'Neil Mcdonald");
        assert_eq!(title_case("ana-maria"), "Ana-Maria");
    }

    #[test]
    fn new_patient_serialises_gender_field() {
        let p = NewPatient::validate("a", "", "b", "3", "male").unwrap();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["gender"], "Male");
        assert_eq!(json["age"], 3);
        assert_eq!(json["middlename"], "");
    }

    #[test]
    fn registered_user_tolerates_nulls_and_string_ids() {
        let u: RegisteredUser = serde_json::from_str(
            r#"{"id": "u-17", "firstname": "Lea", "middlename": null, "lastname": "Reyes", "age": "41"}"#,
        )
        .unwrap();
        assert_eq!(u.id, UserId::Text("u-17".into()));
        assert_eq!(u.full_name(), "Lea Reyes");
        assert_eq!(u.age_text(), "41");
        assert_eq!(u.gender_text(), "");
    }

    #[test]
    fn registered_user_age_accepts_any_shape() {
        let ages: Vec<RegisteredUser> = serde_json::from_str(
            r#"[{"id": 1, "age": 41}, {"id": 2, "age": 41.5}, {"id": 3, "age": " 7 "}, {"id": 4, "age": null}]"#,
        )
        .unwrap();
        let texts: Vec<String> = ages.iter().map(RegisteredUser::age_text).collect();
        assert_eq!(texts, vec!["41", "41.5", "7", ""]);
        assert_eq!(ages[0].age, Some(Age::Years(41)));
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let users = vec![
            user(1, "Maria", Some("Dela"), "Santos"),
            user(2, "Juan", None, "Luna"),
            user(3, "Mario", None, "Santiago"),
        ];
        let ids = |q: &str| -> Vec<String> {
            search_users(&users, q).iter().map(|u| u.id.to_string()).collect()
        };
        assert_eq!(ids("  SANT "), vec!["1", "3"]);
        assert_eq!(ids("dela santos"), vec!["1"]);
        assert_eq!(ids(""), vec!["1", "2", "3"]);
        assert!(ids("pedro").is_empty());
    }

    #[test]
    fn user_id_parses_numbers_first() {
        assert_eq!("42".parse::<UserId>().unwrap(), UserId::Number(42));
        assert_eq!("abc".parse::<UserId>().unwrap(), UserId::Text("abc".into()));
    }

    #[test]
    fn summary_from_registered_user() {
        let summary = PatientSummary::from(&user(5, "Juan", None, "Luna"));
        assert_eq!(summary.name, "Juan Luna");
        assert_eq!(summary.age, "30");
        assert_eq!(summary.sex, "Female");
        assert_eq!(summary.user_id, Some(UserId::Number(5)));
    }
}
