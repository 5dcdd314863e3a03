//! Creem API payload types.

pub mod checkout;
pub mod event;
pub mod product;
pub mod refund;
pub mod subscription;

pub use checkout::{CreemCheckout, CreemOrder};
pub use event::*;
pub use product::{CreemCustomer, CreemDiscount, CreemProduct};
pub use refund::CreemRefund;
pub use subscription::{CreemSubscription, CreemSubscriptionItem, CreemTransaction};

use serde::{Deserialize, Serialize};

/// A nested Creem object that some endpoints inline and others return as a bare id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreemRef<T> {
    Id(String),
    Object(Box<T>),
}

pub trait CreemObject {
    fn id(&self) -> &str;
}

impl<T: CreemObject> CreemRef<T> {
    pub fn id(&self) -> &str {
        match self {
            CreemRef::Id(id) => id,
            CreemRef::Object(object) => object.id(),
        }
    }

    pub fn as_object(&self) -> Option<&T> {
        match self {
            CreemRef::Id(_) => None,
            CreemRef::Object(object) => Some(object),
        }
    }
}

pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Reads a non-empty string value out of Creem metadata.
pub fn metadata_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
}
