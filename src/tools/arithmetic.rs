//! `add_numbers` - smoke test for tool calling

use super::{parse_input, quantity, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct AddNumbersInput {
    a: f64,
    b: f64,
}

pub struct AddNumbersTool;

#[async_trait]
impl Tool for AddNumbersTool {
    fn name(&self) -> &'static str {
        "add_numbers"
    }

    fn description(&self) -> String {
        "Add two numbers and return the sum. Useful to confirm tool calling works.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "number"},
                "b": {"type": "number"}
            },
            "required": ["a", "b"]
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> Result<String, ToolError> {
        let input: AddNumbersInput = parse_input(input)?;
        let sum = input.a + input.b;
        if !sum.is_finite() {
            return Err(ToolError::Execution("sum is not a finite number".to_string()));
        }
        Ok(quantity(sum))
    }
}
