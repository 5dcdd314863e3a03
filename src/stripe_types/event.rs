use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::AppError;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub created: i64,
    pub data: EventData,
    #[serde(default)]
    pub livemode: bool,
    pub api_version: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EventData {
    pub object: serde_json::Value,
    #[serde(default)]
    pub previous_attributes: Option<serde_json::Value>,
}

impl Event {
    /// Deserializes `data.object` into the type the event carries.
    pub fn object<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            AppError::BadRequest(format!("Malformed {} payload in event {}: {}", self.type_, self.id, e))
        })
    }
}
