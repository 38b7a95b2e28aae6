//! Pantry tools: stock analysis and adding items

use super::{parse_input, quantity, Tool, ToolContext, ToolError};
use crate::db::NewPantryItem;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct AnalyzePantryItemsTool;

#[async_trait]
impl Tool for AnalyzePantryItemsTool {
    fn name(&self) -> &'static str {
        "analyze_pantry_items"
    }

    fn description(&self) -> String {
        "Analyze the pantry and report items that are out of stock or below their par level."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let scope = ctx.household()?;
        let items = scope.db.list_pantry_items(&scope.household_id)?;
        if items.is_empty() {
            return Ok("No pantry items to analyze.".to_string());
        }

        let mut out_of_stock = Vec::new();
        let mut running_low = Vec::new();
        for item in &items {
            if item.on_hand <= 0.0 {
                out_of_stock.push(format!("{} (OUT)", item.item_name));
            } else if item.is_low() {
                running_low.push(format!(
                    "{} (LOW: {}/{})",
                    item.item_name,
                    quantity(item.on_hand),
                    quantity(item.par_level)
                ));
            }
        }

        let mut report = Vec::new();
        if !out_of_stock.is_empty() {
            report.push(format!("OUT OF STOCK: {}", out_of_stock.join(", ")));
        }
        if !running_low.is_empty() {
            report.push(format!("RUNNING LOW: {}", running_low.join(", ")));
        }
        if report.is_empty() {
            return Ok("All items are stocked.".to_string());
        }
        Ok(report.join("\n"))
    }
}

#[derive(Debug, Deserialize)]
struct AddPantryItemInput {
    name: Option<String>,
    /// Pantry records call the field `item_name`; either key is accepted
    item_name: Option<String>,
    #[serde(default = "default_quantity")]
    quantity: f64,
    par_level: Option<f64>,
    preferred_brand: Option<String>,
}

fn default_quantity() -> f64 {
    1.0
}

pub struct AddPantryItemTool;

#[async_trait]
impl Tool for AddPantryItemTool {
    fn name(&self) -> &'static str {
        "add_pantry_item"
    }

    fn description(&self) -> String {
        "Add an item to the household pantry list, or add stock to an item already on it. \
         Call this whenever the user asks to add something; do not claim it was added otherwise."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Item name, e.g. \"milk\""},
                "item_name": {"type": "string", "description": "Alternative key for name"},
                "quantity": {"type": "number", "minimum": 0, "description": "Units to add (default 1)"},
                "par_level": {"type": "number", "minimum": 0, "description": "Minimum stock before reorder"},
                "preferred_brand": {"type": "string"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let input: AddPantryItemInput = parse_input(input)?;
        let name = [input.name.as_deref(), input.item_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|n| !n.is_empty())
            .ok_or_else(|| {
                ToolError::InvalidArguments("arguments.name is required".to_string())
            })?;

        let scope = ctx.household()?;
        let (item, created) = scope.db.add_pantry_item(
            &scope.household_id,
            &NewPantryItem {
                item_name: name.to_string(),
                quantity: input.quantity,
                par_level: input.par_level,
                preferred_brand: input.preferred_brand,
            },
        )?;

        let verb = if created { "Added" } else { "Updated" };
        Ok(format!(
            "{verb} {} in the pantry (on hand: {}, par level: {}).",
            item.item_name,
            quantity(item.on_hand),
            quantity(item.par_level)
        ))
    }
}
