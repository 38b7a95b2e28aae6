//! Household data: budget, pantry, grocery list and cart

use super::{
    parse_datetime, CartItem, Database, DbError, DbResult, GroceryItem, Household, NewCartItem,
    NewPantryItem, PantryItem,
};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

impl Database {
    pub fn upsert_household(
        &self,
        id: &str,
        name: &str,
        budget_weekly: Option<f64>,
    ) -> DbResult<Household> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO households (id, name, budget_weekly, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, budget_weekly = excluded.budget_weekly",
            params![id, name, budget_weekly, Utc::now().to_rfc3339()],
        )?;
        Ok(Household {
            id: id.to_string(),
            name: name.to_string(),
            budget_weekly,
        })
    }

    pub fn get_household(&self, id: &str) -> DbResult<Household> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, budget_weekly FROM households WHERE id = ?1",
            params![id],
            |row| {
                Ok(Household {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    budget_weekly: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| DbError::HouseholdNotFound(id.to_string()))
    }

    // ==================== Pantry ====================

    pub fn list_pantry_items(&self, household_id: &str) -> DbResult<Vec<PantryItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, household_id, item_name, par_level, on_hand, preferred_brand, updated_at
             FROM pantry_items WHERE household_id = ?1 ORDER BY item_name",
        )?;
        let items = stmt
            .query_map(params![household_id], |row| {
                Ok(PantryItem {
                    id: row.get(0)?,
                    household_id: row.get(1)?,
                    item_name: row.get(2)?,
                    par_level: row.get(3)?,
                    on_hand: row.get(4)?,
                    preferred_brand: row.get(5)?,
                    updated_at: parse_datetime(&row.get::<_, String>(6)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Add stock for an item, creating it on first sight.
    ///
    /// Names match case-insensitively. Returns the stored item and whether
    /// it was newly created.
    pub fn add_pantry_item(
        &self,
        household_id: &str,
        item: &NewPantryItem,
    ) -> DbResult<(PantryItem, bool)> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Option<(String, f64, f64, Option<String>)> = tx
            .query_row(
                "SELECT id, par_level, on_hand, preferred_brand FROM pantry_items
                 WHERE household_id = ?1 AND lower(item_name) = lower(?2)",
                params![household_id, item.item_name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let (stored, created) = match existing {
            Some((id, par_level, on_hand, brand)) => {
                let par_level = item.par_level.unwrap_or(par_level);
                let on_hand = on_hand + item.quantity;
                let preferred_brand = item.preferred_brand.clone().or(brand);
                tx.execute(
                    "UPDATE pantry_items SET par_level = ?1, on_hand = ?2, preferred_brand = ?3,
                     updated_at = ?4 WHERE id = ?5",
                    params![par_level, on_hand, preferred_brand, now.to_rfc3339(), id],
                )?;
                let stored = PantryItem {
                    id,
                    household_id: household_id.to_string(),
                    item_name: item.item_name.clone(),
                    par_level,
                    on_hand,
                    preferred_brand,
                    updated_at: now,
                };
                (stored, false)
            }
            None => {
                let stored = PantryItem {
                    id: uuid::Uuid::new_v4().to_string(),
                    household_id: household_id.to_string(),
                    item_name: item.item_name.clone(),
                    par_level: item.par_level.unwrap_or(1.0),
                    on_hand: item.quantity,
                    preferred_brand: item.preferred_brand.clone(),
                    updated_at: now,
                };
                tx.execute(
                    "INSERT INTO pantry_items
                     (id, household_id, item_name, par_level, on_hand, preferred_brand, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                    params![
                        stored.id,
                        stored.household_id,
                        stored.item_name,
                        stored.par_level,
                        stored.on_hand,
                        stored.preferred_brand,
                        now.to_rfc3339()
                    ],
                )?;
                (stored, true)
            }
        };

        tx.commit()?;
        Ok((stored, created))
    }

    // ==================== Grocery List ====================

    pub fn add_grocery_item(
        &self,
        household_id: &str,
        item_name: &str,
        quantity: f64,
        brand: Option<&str>,
    ) -> DbResult<GroceryItem> {
        let item = GroceryItem {
            id: uuid::Uuid::new_v4().to_string(),
            household_id: household_id.to_string(),
            item_name: item_name.to_string(),
            quantity,
            brand: brand.map(String::from),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO grocery_items (id, household_id, item_name, quantity, brand, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.id,
                item.household_id,
                item.item_name,
                item.quantity,
                item.brand,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(item)
    }

    pub fn list_grocery_items(&self, household_id: &str) -> DbResult<Vec<GroceryItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, household_id, item_name, quantity, brand
             FROM grocery_items WHERE household_id = ?1 ORDER BY created_at, item_name",
        )?;
        let items = stmt
            .query_map(params![household_id], |row| {
                Ok(GroceryItem {
                    id: row.get(0)?,
                    household_id: row.get(1)?,
                    item_name: row.get(2)?,
                    quantity: row.get(3)?,
                    brand: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    // ==================== Cart ====================

    /// Insert items as one new cart and return its id
    pub fn add_cart_items(&self, household_id: &str, items: &[NewCartItem]) -> DbResult<String> {
        let cart_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for item in items {
            tx.execute(
                "INSERT INTO cart_items
                 (id, cart_id, household_id, item_name, quantity, price, brand, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    cart_id,
                    household_id,
                    item.item_name,
                    item.quantity,
                    item.price,
                    item.brand,
                    now
                ],
            )?;
        }
        tx.commit()?;
        Ok(cart_id)
    }

    pub fn active_cart_items(&self, household_id: &str) -> DbResult<Vec<CartItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, cart_id, household_id, item_name, quantity, price, brand
             FROM cart_items WHERE household_id = ?1 AND status = 'active'
             ORDER BY created_at, item_name",
        )?;
        let items = stmt
            .query_map(params![household_id], |row| {
                Ok(CartItem {
                    id: row.get(0)?,
                    cart_id: row.get(1)?,
                    household_id: row.get(2)?,
                    item_name: row.get(3)?,
                    quantity: row.get(4)?,
                    price: row.get(5)?,
                    brand: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }
}
