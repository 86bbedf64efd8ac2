use serde::{Deserialize, Serialize};

use crate::domain::restaurant::RestaurantId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiningTable {
    pub id: TableId,
    pub restaurant_id: RestaurantId,
    pub label: String,
    pub capacity: u32,
    pub is_active: bool,
}

impl DiningTable {
    pub fn seats(&self, party_size: u32) -> bool {
        self.is_active && self.capacity >= party_size
    }
}
