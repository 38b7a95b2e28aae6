//! Shopping cart tools

use super::{dollars, parse_input, Tool, ToolContext, ToolError};
use crate::db::{CartItem, NewCartItem};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct CartLineInput {
    item_name: Option<String>,
    /// Accepted in place of `item_name`; models use both spellings
    name: Option<String>,
    quantity: Option<u32>,
    price: Option<f64>,
    brand: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CartLineInput {
    fn normalize(self) -> NewCartItem {
        NewCartItem {
            item_name: non_blank(self.item_name)
                .or_else(|| non_blank(self.name))
                .unwrap_or_else(|| "Unknown item".to_string()),
            quantity: self.quantity.unwrap_or(1),
            price: self.price.unwrap_or(0.0),
            brand: self.brand.unwrap_or_else(|| "Any".to_string()),
        }
    }
}

fn line_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "item_name": {"type": "string"},
            "name": {"type": "string"},
            "quantity": {"type": "integer", "minimum": 1},
            "price": {"type": "number", "minimum": 0},
            "brand": {"type": "string"}
        }
    })
}

fn add_lines(ctx: &ToolContext, items: &[NewCartItem]) -> Result<String, ToolError> {
    let scope = ctx.household()?;
    let cart_id = scope.db.add_cart_items(&scope.household_id, items)?;
    Ok(format!(
        "Successfully added {} items to shopping cart. Cart ID: {cart_id}",
        items.len()
    ))
}

pub struct AddToCartTool;

#[async_trait]
impl Tool for AddToCartTool {
    fn name(&self) -> &'static str {
        "add_to_cart"
    }

    fn description(&self) -> String {
        "Add a single item to the household shopping cart. Quantity defaults to 1, \
         price to 0 and brand to \"Any\"."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        let mut schema = line_schema();
        schema["required"] = json!(["item_name"]);
        schema
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let line: CartLineInput = parse_input(input)?;
        add_lines(&ctx, &[line.normalize()])
    }
}

#[derive(Debug, Deserialize)]
struct BulkAddInput {
    items: Vec<CartLineInput>,
}

pub struct BulkAddToCartTool;

#[async_trait]
impl Tool for BulkAddToCartTool {
    fn name(&self) -> &'static str {
        "bulk_add_to_cart"
    }

    fn description(&self) -> String {
        "Add several items to the household shopping cart in one call.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "items": {"type": "array", "items": line_schema()}
            },
            "required": ["items"]
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let input: BulkAddInput = parse_input(input)?;
        if input.items.is_empty() {
            return Err(ToolError::InvalidArguments(
                "arguments.items must contain at least one item".to_string(),
            ));
        }
        let lines: Vec<NewCartItem> = input.items.into_iter().map(CartLineInput::normalize).collect();
        add_lines(&ctx, &lines)
    }
}

pub struct ViewCartTool;

#[async_trait]
impl Tool for ViewCartTool {
    fn name(&self) -> &'static str {
        "view_cart"
    }

    fn description(&self) -> String {
        "Show the items in the household's active shopping cart and the total value.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let scope = ctx.household()?;
        let items = scope.db.active_cart_items(&scope.household_id)?;
        if items.is_empty() {
            return Ok("The shopping cart is empty.".to_string());
        }

        let mut lines: Vec<String> = items
            .iter()
            .map(|item| {
                format!(
                    "- {}: quantity={}, price={}, total={}",
                    item.item_name,
                    item.quantity,
                    dollars(item.price),
                    dollars(item.line_total())
                )
            })
            .collect();
        let total: f64 = items.iter().map(CartItem::line_total).sum();
        lines.push(format!("\nTotal Cart Value: {}", dollars(total)));
        Ok(lines.join("\n"))
    }
}
