// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Body measurement models: groups and individual measures.
//!
//! Withings reports measurements as groups (one weigh-in, one blood pressure
//! reading, ...) of integer mantissa / decimal exponent pairs. The integer
//! codes for attribution, category and measure type are mapped to tagged
//! enums here; codes we don't know are kept in an `Other` variant so newer
//! provider data is stored rather than rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const UNKNOWN_LABEL: &str = "Unknown";

/// How a measure group was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Attribution {
    DeviceUnambiguous,
    DeviceAmbiguous,
    ManualEntry,
    ManualCreationEntry,
    Other(i64),
}

impl Attribution {
    const TABLE: [(Attribution, i64, &'static str); 4] = [
        (
            Attribution::DeviceUnambiguous,
            0,
            "Captured by a device, not ambiguous",
        ),
        (
            Attribution::DeviceAmbiguous,
            1,
            "Captured by a device, may belong to other user",
        ),
        (Attribution::ManualEntry, 2, "Manually entered by user"),
        (
            Attribution::ManualCreationEntry,
            4,
            "Manually entered, may not be accurate",
        ),
    ];

    pub fn from_code(code: i64) -> Self {
        Self::TABLE
            .iter()
            .find(|(_, c, _)| *c == code)
            .map_or(Attribution::Other(code), |(a, _, _)| *a)
    }

    pub fn code(self) -> i64 {
        match self {
            Attribution::Other(code) => code,
            known => Self::TABLE
                .iter()
                .find(|(a, _, _)| *a == known)
                .map_or(-1, |(_, c, _)| *c),
        }
    }

    pub fn label(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(a, _, _)| *a == self)
            .map_or(UNKNOWN_LABEL, |(_, _, l)| *l)
    }
}

/// Whether a group is a real measurement or a user objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Category {
    Real,
    Objective,
    Other(i64),
}

impl Category {
    const TABLE: [(Category, i64, &'static str); 2] = [
        (Category::Real, 1, "Real measurements"),
        (Category::Objective, 2, "User objectives"),
    ];

    pub fn from_code(code: i64) -> Self {
        Self::TABLE
            .iter()
            .find(|(_, c, _)| *c == code)
            .map_or(Category::Other(code), |(cat, _, _)| *cat)
    }

    pub fn code(self) -> i64 {
        match self {
            Category::Other(code) => code,
            known => Self::TABLE
                .iter()
                .find(|(cat, _, _)| *cat == known)
                .map_or(-1, |(_, c, _)| *c),
        }
    }

    pub fn label(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(cat, _, _)| *cat == self)
            .map_or(UNKNOWN_LABEL, |(_, _, l)| *l)
    }
}

/// Kind of a single scalar measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum MeasureType {
    Weight,
    Height,
    FatFreeMass,
    FatRatio,
    FatMassWeight,
    DiastolicBp,
    SystolicBp,
    HeartPulse,
    Sp02,
    Other(i64),
}

impl MeasureType {
    const TABLE: [(MeasureType, i64, &'static str); 9] = [
        (MeasureType::Weight, 1, "Weight (kg)"),
        (MeasureType::Height, 4, "Height (meter)"),
        (MeasureType::FatFreeMass, 5, "Fat Free Mass (kg)"),
        (MeasureType::FatRatio, 6, "Fat Ratio (%)"),
        (MeasureType::FatMassWeight, 8, "Fat Mass Weight (kg)"),
        (MeasureType::DiastolicBp, 9, "Diastolic Blood Pressure (mmHg)"),
        (MeasureType::SystolicBp, 10, "Systolic Blood Pressure (mmHg)"),
        (MeasureType::HeartPulse, 11, "Heart Pulse (bpm)"),
        (MeasureType::Sp02, 54, "SP02(%)"),
    ];

    pub fn from_code(code: i64) -> Self {
        Self::TABLE
            .iter()
            .find(|(_, c, _)| *c == code)
            .map_or(MeasureType::Other(code), |(t, _, _)| *t)
    }

    pub fn code(self) -> i64 {
        match self {
            MeasureType::Other(code) => code,
            known => Self::TABLE
                .iter()
                .find(|(t, _, _)| *t == known)
                .map_or(-1, |(_, c, _)| *c),
        }
    }

    pub fn label(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(t, _, _)| *t == self)
            .map_or(UNKNOWN_LABEL, |(_, _, l)| *l)
    }
}

macro_rules! impl_code_conversions {
    ($($ty:ty),*) => {$(
        impl From<i64> for $ty {
            fn from(code: i64) -> Self {
                Self::from_code(code)
            }
        }

        impl From<$ty> for i64 {
            fn from(value: $ty) -> i64 {
                value.code()
            }
        }
    )*};
}

impl_code_conversions!(Attribution, Category, MeasureType);

/// Scale an integer mantissa by a decimal exponent.
///
/// Negative exponents divide by an exact power of ten so the result is the
/// closest `f64` to the decimal value (79300e-3 == 79.3). Exponents beyond
/// the `f64` range saturate to zero or infinity.
pub fn scaled_value(value: i64, unit: i32) -> f64 {
    if value == 0 {
        return 0.0;
    }
    let mantissa = value as f64;
    let scale = 10f64.powi(i32::try_from(unit.unsigned_abs()).unwrap_or(i32::MAX));
    if unit >= 0 {
        mantissa * scale
    } else {
        mantissa / scale
    }
}

/// Stored measure group.
#[derive(Debug, Clone, Serialize)]
pub struct MeasureGroup {
    pub id: i64,
    pub user_id: i64,
    /// Withings group ID
    pub grpid: i64,
    pub attrib: Attribution,
    /// When the measurement was taken
    pub date: DateTime<Utc>,
    /// Provider update time of the payload the group came from
    pub updatetime: DateTime<Utc>,
    pub category: Category,
    pub measures: Vec<Measure>,
}

impl fmt::Display for MeasureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.date.date_naive().format("%Y-%m-%d"),
            self.category.label()
        )
    }
}

/// Stored scalar measure, owned by a [`MeasureGroup`].
#[derive(Debug, Clone, Serialize)]
pub struct Measure {
    pub id: i64,
    pub group_id: i64,
    /// Raw integer mantissa
    pub value: i64,
    pub measure_type: MeasureType,
    /// Decimal exponent
    pub unit: i32,
}

impl Measure {
    /// Value in the measure type's natural unit.
    pub fn get_value(&self) -> f64 {
        scaled_value(self.value, self.unit)
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.measure_type.label(), self.get_value())
    }
}
