//! Request and response bodies

use serde::{Deserialize, Serialize};

/// One patient record in raw (unscaled) units.
///
/// Every field is required on the wire. [`Default`] gives the values the
/// prediction form starts with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiabetesInput {
    pub age: f64,
    pub sex: f64,
    pub bmi: f64,
    pub bp: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
    pub s4: f64,
    pub s5: f64,
    pub s6: f64,
}

impl Default for DiabetesInput {
    fn default() -> Self {
        Self {
            age: 59.0,
            sex: 2.0,
            bmi: 32.1,
            bp: 101.0,
            s1: 157.0,
            s2: 93.2,
            s3: 38.0,
            s4: 4.0,
            s5: 4.85,
            s6: 87.0,
        }
    }
}

impl DiabetesInput {
    pub fn feature_value(&self, name: &str) -> Option<f64> {
        let value = match name {
            "age" => self.age,
            "sex" => self.sex,
            "bmi" => self.bmi,
            "bp" => self.bp,
            "s1" => self.s1,
            "s2" => self.s2,
            "s3" => self.s3,
            "s4" => self.s4,
            "s5" => self.s5,
            "s6" => self.s6,
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FEATURE_COLUMNS;

    #[test]
    fn test_every_feature_column_is_addressable() {
        let input = DiabetesInput::default();
        for name in FEATURE_COLUMNS {
            assert!(input.feature_value(name).is_some(), "{} missing", name);
        }
        assert_eq!(input.feature_value("target"), None);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let body = r#"{"age":59,"sex":2,"bmi":32.1,"bp":101,"s1":157,"s2":93.2,"s3":38,"s4":4.0,"s5":4.85}"#;
        assert!(serde_json::from_str::<DiabetesInput>(body).is_err());
        let body = r#"{"age":"old","sex":2,"bmi":32.1,"bp":101,"s1":157,"s2":93.2,"s3":38,"s4":4.0,"s5":4.85,"s6":87}"#;
        assert!(serde_json::from_str::<DiabetesInput>(body).is_err());
    }
}
