use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Execution {
    pub id: String,
    pub rule_id: String,
    pub attempt: u32,

    pub status: String,
    pub start_time: i64,
    pub end_time: i64,
    /// The full execution row as JSON.
    pub data: String,
    pub timestamp: i64,
}

impl DbCollectionIden for Execution {
    fn iden() -> StoreIden {
        StoreIden::Executions
    }
}
