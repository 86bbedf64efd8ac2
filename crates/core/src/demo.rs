//! Deterministic demo restaurant used by `tablebell seed` and tests.

use chrono::NaiveTime;
use rust_decimal::Decimal;

use crate::domain::menu::{MenuItem, MenuItemId};
use crate::domain::restaurant::{Restaurant, RestaurantId};
use crate::domain::table::{DiningTable, TableId};

pub const DEMO_RESTAURANT_ID: &str = "spice-route";

pub fn restaurant() -> Restaurant {
    Restaurant {
        id: RestaurantId(DEMO_RESTAURANT_ID.to_string()),
        name: "Spice Route".to_string(),
        opening_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap_or(NaiveTime::MIN),
        closing_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
        booking_duration_minutes: 90,
        max_party_size: 12,
        subscription_tier: "basic".to_string(),
        commission_override_pct: None,
        delivery_enabled: true,
    }
}

pub fn menu() -> Vec<MenuItem> {
    let items: [(&str, &str, &str, &str, i64, &[&str]); 9] = [
        (
            "butter-chicken",
            "Butter Chicken",
            "mains",
            "Tandoori chicken simmered in a mild, creamy tomato gravy",
            1_650,
            &["gluten-free", "mild"],
        ),
        (
            "chicken-tikka-masala",
            "Chicken Tikka Masala",
            "mains",
            "Chargrilled chicken in a spicy masala sauce",
            1_700,
            &["gluten-free", "spicy"],
        ),
        (
            "lamb-vindaloo",
            "Lamb Vindaloo",
            "mains",
            "Goan lamb curry with red chilli and vinegar",
            1_850,
            &["spicy", "hot"],
        ),
        (
            "chana-masala",
            "Chana Masala",
            "mains",
            "Chickpeas in a tangy tomato and onion sauce",
            1_300,
            &["vegan", "gluten-free"],
        ),
        (
            "palak-paneer",
            "Palak Paneer",
            "mains",
            "Cottage cheese cubes in a smooth spinach sauce",
            1_450,
            &["vegetarian", "mild"],
        ),
        (
            "vegetable-samosa",
            "Vegetable Samosa",
            "starters",
            "Crisp pastry filled with potato and peas",
            650,
            &["vegan"],
        ),
        (
            "garlic-naan",
            "Garlic Naan",
            "breads",
            "Leavened bread with garlic butter",
            399,
            &["vegetarian"],
        ),
        ("basmati-rice", "Basmati Rice", "sides", "Steamed long grain rice", 350, &["vegan"]),
        (
            "mango-lassi",
            "Mango Lassi",
            "drinks",
            "Chilled yoghurt and mango drink",
            450,
            &["vegetarian"],
        ),
    ];

    items
        .iter()
        .enumerate()
        .map(|(index, (id, name, category, description, cents, tags))| MenuItem {
            id: MenuItemId((*id).to_string()),
            restaurant_id: RestaurantId(DEMO_RESTAURANT_ID.to_string()),
            name: (*name).to_string(),
            category: (*category).to_string(),
            description: (*description).to_string(),
            price: Decimal::new(*cents, 2),
            dietary_tags: tags.iter().map(|tag| (*tag).to_string()).collect(),
            sort_order: i32::try_from(index).unwrap_or(i32::MAX) + 1,
            available: true,
        })
        .collect()
}

pub fn tables() -> Vec<DiningTable> {
    [(1, "T1", 2), (2, "T2", 2), (3, "T3", 4), (4, "T4", 4), (5, "T5", 6), (6, "T6", 8)]
        .into_iter()
        .map(|(id, label, capacity)| DiningTable {
            id: TableId(id),
            restaurant_id: RestaurantId(DEMO_RESTAURANT_ID.to_string()),
            label: label.to_string(),
            capacity,
            is_active: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{menu, restaurant, tables};

    #[test]
    fn demo_dataset_is_consistent() {
        let restaurant = restaurant();
        assert!(menu().iter().all(|item| item.restaurant_id == restaurant.id));
        assert!(tables().iter().all(|table| table.restaurant_id == restaurant.id));
        assert!(restaurant.hours().latest_start(restaurant.booking_duration()).is_some());

        let mut ids = menu().into_iter().map(|item| item.id).collect::<Vec<_>>();
        ids.dedup();
        assert_eq!(ids.len(), menu().len());
    }
}
