//! `fetch_household_inventory` - grocery list with stock status

use super::{quantity, Tool, ToolContext, ToolError};
use crate::db::GroceryItem;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Quantities below this count as running low
const LOW_STOCK_THRESHOLD: f64 = 3.0;

pub struct FetchHouseholdInventoryTool;

fn status(item: &GroceryItem) -> &'static str {
    if item.quantity <= 0.0 {
        "OUT"
    } else if item.quantity < LOW_STOCK_THRESHOLD {
        "LOW"
    } else {
        "OK"
    }
}

#[async_trait]
impl Tool for FetchHouseholdInventoryTool {
    fn name(&self) -> &'static str {
        "fetch_household_inventory"
    }

    fn description(&self) -> String {
        "List every item on the household's grocery list with its quantity, brand and \
         stock status (OUT, LOW or OK)."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let scope = ctx.household()?;
        let items = scope.db.list_grocery_items(&scope.household_id)?;
        if items.is_empty() {
            return Ok("No items found on the grocery list for this household.".to_string());
        }

        let lines: Vec<String> = items
            .iter()
            .map(|item| {
                format!(
                    "- {}: quantity={}, brand={}, status={}",
                    item.item_name,
                    quantity(item.quantity),
                    item.brand.as_deref().unwrap_or("Any"),
                    status(item)
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
