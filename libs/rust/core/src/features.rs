//! Input schema for inference and training.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Feature columns in training order. Every inference input is mapped to
/// this exact order before it reaches the estimator.
pub const FEATURE_NAMES: [&str; 8] = [
    "MedInc",
    "HouseAge",
    "AveRooms",
    "AveBedrms",
    "Population",
    "AveOccup",
    "Latitude",
    "Longitude",
];

/// Target column in the training dataset.
pub const TARGET_NAME: &str = "MedHouseVal";

/// One dwelling, described by the eight features the model was trained on.
///
/// JSON field names match the dataset column names, not Rust convention,
/// because they are the wire format of `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseFeatures {
    #[serde(rename = "MedInc")]
    pub med_inc: f64,
    #[serde(rename = "HouseAge")]
    pub house_age: f64,
    #[serde(rename = "AveRooms")]
    pub ave_rooms: f64,
    #[serde(rename = "AveBedrms")]
    pub ave_bedrms: f64,
    #[serde(rename = "Population")]
    pub population: f64,
    #[serde(rename = "AveOccup")]
    pub ave_occup: f64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
}

impl HouseFeatures {
    /// Model input row in training column order.
    pub fn as_row(&self) -> [f32; 8] {
        [
            self.med_inc as f32,
            self.house_age as f32,
            self.ave_rooms as f32,
            self.ave_bedrms as f32,
            self.population as f32,
            self.ave_occup as f32,
            self.latitude as f32,
            self.longitude as f32,
        ]
    }

    /// Rejects NaN and infinite values before they reach the estimator.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.as_row()) {
            if !value.is_finite() {
                return Err(CoreError::Dataset(format!(
                    "feature {name} is not a finite number"
                )));
            }
        }
        Ok(())
    }
}
