use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{AsRefStr, EnumString};

/// Why points were taken off. Serialized as the snake_case token, so reports
/// stay readable and unknown tokens from older reports survive as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Reason {
    // Repo level
    MissingRepo,
    NoRepoReadme,
    NoRepoGitignore,
    LargeFiles,
    // Module level
    NoFolder,
    NoReadme,
    NoDataFolder,
    ExtraResultsFiles,
    ExtraCodeFiles,
    // Target level
    FileMissing,
    Timeout,
    RunError,
    ResultError,
    #[strum(default)]
    Other(String),
}

impl Reason {
    pub fn as_str(&self) -> &str {
        match self {
            Reason::Other(token) => token,
            known => known.as_ref(),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Reason {
    fn from(token: String) -> Self {
        Reason::from_str(&token).unwrap_or_else(|_| Reason::Other(token))
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Reason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Reason::from)
    }
}

/// A reason is listed iff points were deducted for it. Callers merge results
/// with `+=`, which sums the values and concatenates the reasons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deductions {
    #[serde(serialize_with = "serialize_points")]
    pub value: f64,
    pub reasons: Vec<Reason>,
}

impl Deductions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(points: f64, reason: Reason) -> Self {
        Deductions {
            value: points,
            reasons: vec![reason],
        }
    }

    pub fn deduct(&mut self, points: f64, reason: Reason) {
        debug_assert!(points >= 0.0, "deductions are never negative");
        self.value += points;
        self.reasons.push(reason);
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

impl AddAssign for Deductions {
    fn add_assign(&mut self, rhs: Self) {
        self.value += rhs.value;
        self.reasons.extend(rhs.reasons);
    }
}

// Whole points are written as integers so reports read `100`, not `100.0`.
fn serialize_points<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && *value >= 0.0 && *value <= u32::MAX as f64 {
        serializer.serialize_u64(*value as u64)
    } else {
        serializer.serialize_f64(*value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn known_reasons_use_snake_case_tokens() {
        assert_eq!(Reason::ExtraCodeFiles.to_string(), "extra_code_files");
        assert_eq!(Reason::from("no_repo_gitignore".to_string()), Reason::NoRepoGitignore);
    }

    #[test]
    fn unknown_reason_is_kept_verbatim() {
        let reason = Reason::from("lint_failure".to_string());
        assert_eq!(reason, Reason::Other("lint_failure".to_string()));
        assert_eq!(serde_json::to_value(&reason).unwrap(), json!("lint_failure"));
    }

    #[test]
    fn single_and_deduct_accumulate() {
        let mut d = Deductions::new();
        d.deduct(1.0, Reason::NoReadme);
        d.deduct(0.5, Reason::ExtraResultsFiles);
        assert_eq!(d.value, 1.5);
        assert_eq!(d.reasons, vec![Reason::NoReadme, Reason::ExtraResultsFiles]);

        let d = Deductions::single(100.0, Reason::MissingRepo);
        assert_eq!(d.reasons, vec![Reason::MissingRepo]);
    }

    #[test]
    fn merging_sums_values_and_concatenates_reasons() {
        let mut a = Deductions::single(1.0, Reason::Timeout);
        let mut b = Deductions::new();
        b.deduct(1.0, Reason::Timeout);
        b.deduct(0.5, Reason::ResultError);
        a += b;
        assert_eq!(a.value, 2.5);
        assert_eq!(a.reasons, vec![Reason::Timeout, Reason::Timeout, Reason::ResultError]);
    }

    #[test]
    fn whole_points_serialize_as_integers() {
        let d = Deductions::single(100.0, Reason::MissingRepo);
        assert_eq!(
            serde_json::to_value(&d).unwrap(),
            json!({"value": 100, "reasons": ["missing_repo"]})
        );

        let mut half = Deductions::new();
        half.deduct(0.5, Reason::ExtraCodeFiles);
        assert_eq!(serde_json::to_string(&half).unwrap(), r#"{"value":0.5,"reasons":["extra_code_files"]}"#);
    }

    #[test]
    fn reports_deserialize_back() {
        let d: Deductions =
            serde_json::from_str(r#"{"value": 1.5, "reasons": ["no_readme", "custom"]}"#).unwrap();
        assert_eq!(d.value, 1.5);
        assert_eq!(d.reasons[1], Reason::Other("custom".to_string()));
    }
}
