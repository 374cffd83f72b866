use serde::{Deserialize, Serialize};

/// Time and location of one meeting of a section. Carried along with the
/// section it belongs to; nothing in this crate inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: u64,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    /// Monday through Sunday
    #[serde(default)]
    pub meeting_days: Vec<bool>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub meeting_type: String,
}
