use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::restaurant::RestaurantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MenuItemId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: Decimal,
    pub dietary_tags: Vec<String>,
    /// Catalog default ordering; lower sorts first.
    pub sort_order: i32,
    pub available: bool,
}

impl MenuItem {
    /// Every searchable field lowercased, used by descriptor matching.
    pub fn search_fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.name.to_ascii_lowercase(),
            self.category.to_ascii_lowercase(),
            self.description.to_ascii_lowercase(),
            self.id.0.to_ascii_lowercase(),
        ];
        fields.extend(self.dietary_tags.iter().map(|tag| tag.to_ascii_lowercase()));
        fields
    }
}

/// Sorts items into catalog default ordering with ties broken by id.
pub fn sort_catalog(items: &mut [MenuItem]) {
    items.sort_by(|left, right| {
        left.sort_order.cmp(&right.sort_order).then_with(|| left.id.cmp(&right.id))
    });
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{sort_catalog, MenuItem, MenuItemId};
    use crate::domain::restaurant::RestaurantId;

    fn item(id: &str, sort_order: i32) -> MenuItem {
        MenuItem {
            id: MenuItemId(id.to_string()),
            restaurant_id: RestaurantId("r-1".to_string()),
            name: id.to_string(),
            category: "mains".to_string(),
            description: String::new(),
            price: Decimal::new(1_000, 2),
            dietary_tags: Vec::new(),
            sort_order,
            available: true,
        }
    }

    #[test]
    fn catalog_order_breaks_ties_by_id() {
        let mut items = vec![item("vindaloo", 2), item("korma", 1), item("biryani", 2)];
        sort_catalog(&mut items);

        let ids = items.iter().map(|item| item.id.0.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["korma", "biryani", "vindaloo"]);
    }
}
