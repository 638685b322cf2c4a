//! Persisted document shapes.
//!
//! Only the fields watchers look at are modelled; unknown fields are ignored
//! so documents written by newer code still decode.

use serde::Deserialize;
use serde::Serialize;

/// Soft-delete progression of a domain entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Life {
    #[default]
    Alive,
    Dying,
    Dead,
}

/// Projection used by lifecycle watchers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeDoc {
    #[serde(default)]
    pub life: Life,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDoc {
    #[serde(default)]
    pub life: Life,

    /// Principal units assigned to the machine
    #[serde(default)]
    pub principals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDoc {
    #[serde(default)]
    pub life: Life,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDoc {
    pub service: String,

    #[serde(default)]
    pub life: Life,

    /// Name of the principal unit; empty for principals themselves
    #[serde(default)]
    pub principal: String,

    #[serde(default)]
    pub machine_id: Option<String>,

    #[serde(default)]
    pub subordinates: Vec<String>,
}

impl UnitDoc {
    pub fn is_principal(&self) -> bool {
        self.principal.is_empty()
    }
}

/// Relation document, keyed by its endpoints (`"svc:ep svc:ep"`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDoc {
    #[serde(default)]
    pub id: i64,

    #[serde(default)]
    pub life: Life,
}
