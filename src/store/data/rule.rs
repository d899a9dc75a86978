use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub status: String,
    /// The rule as JSON.
    pub data: String,

    // run timestamps in millis, 0 when unset
    pub last_run: i64,
    pub next_run: i64,

    pub create_time: i64,
    pub update_time: i64,
}

impl DbCollectionIden for Rule {
    fn iden() -> StoreIden {
        StoreIden::Rules
    }
}
