//! Database schema and record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    household_id TEXT,
    user_id TEXT,
    version INTEGER NOT NULL,
    document TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_household ON sessions(household_id);

CREATE TABLE IF NOT EXISTS households (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    budget_weekly REAL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pantry_items (
    id TEXT PRIMARY KEY,
    household_id TEXT NOT NULL,
    item_name TEXT NOT NULL,
    par_level REAL NOT NULL DEFAULT 0,
    on_hand REAL NOT NULL DEFAULT 0,
    preferred_brand TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pantry_household ON pantry_items(household_id, item_name);

CREATE TABLE IF NOT EXISTS grocery_items (
    id TEXT PRIMARY KEY,
    household_id TEXT NOT NULL,
    item_name TEXT NOT NULL,
    quantity REAL NOT NULL DEFAULT 0,
    brand TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_grocery_household ON grocery_items(household_id);

CREATE TABLE IF NOT EXISTS cart_items (
    id TEXT PRIMARY KEY,
    cart_id TEXT NOT NULL,
    household_id TEXT NOT NULL,
    item_name TEXT NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 1,
    price REAL NOT NULL DEFAULT 0,
    brand TEXT NOT NULL DEFAULT 'Any',
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cart_household ON cart_items(household_id, status);
";

/// Stored session document with its version
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub version: u64,
    pub document: String,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a versioned session write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentWrite {
    /// Stored document already matched; nothing written
    Unchanged { version: u64 },
    Written { version: u64 },
    /// Stored version differs from the one the caller loaded
    Conflict { found: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Household {
    pub id: String,
    pub name: String,
    pub budget_weekly: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantryItem {
    pub id: String,
    pub household_id: String,
    pub item_name: String,
    pub par_level: f64,
    pub on_hand: f64,
    pub preferred_brand: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PantryItem {
    pub fn is_low(&self) -> bool {
        self.on_hand < self.par_level
    }
}

/// Fields for adding stock to the pantry
#[derive(Debug, Clone, PartialEq)]
pub struct NewPantryItem {
    pub item_name: String,
    pub quantity: f64,
    pub par_level: Option<f64>,
    pub preferred_brand: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    pub id: String,
    pub household_id: String,
    pub item_name: String,
    pub quantity: f64,
    pub brand: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub cart_id: String,
    pub household_id: String,
    pub item_name: String,
    pub quantity: u32,
    pub price: f64,
    pub brand: String,
}

impl CartItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCartItem {
    pub item_name: String,
    pub quantity: u32,
    pub price: f64,
    pub brand: String,
}
