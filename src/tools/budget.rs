//! `fetch_household_budget`

use super::{dollars, Tool, ToolContext, ToolError};
use crate::db::DbError;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Used when the household has not set a budget
const DEFAULT_WEEKLY_BUDGET: f64 = 100.0;

pub struct FetchHouseholdBudgetTool;

#[async_trait]
impl Tool for FetchHouseholdBudgetTool {
    fn name(&self) -> &'static str {
        "fetch_household_budget"
    }

    fn description(&self) -> String {
        "Get the household's weekly grocery budget in dollars.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let scope = ctx.household()?;
        let budget = match scope.db.get_household(&scope.household_id) {
            Ok(household) => household.budget_weekly,
            Err(DbError::HouseholdNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(dollars(budget.unwrap_or(DEFAULT_WEEKLY_BUDGET)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::tools::test_support::household_ctx;

    #[tokio::test]
    async fn reads_household_budget() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_household("h1", "Maple St", Some(142.5)).unwrap();
        let out = FetchHouseholdBudgetTool
            .run(json!({}), household_ctx(&db, "h1"))
            .await
            .unwrap();
        assert_eq!(out, "$142.50");
    }

    #[tokio::test]
    async fn falls_back_to_default() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_household("h1", "Maple St", None).unwrap();
        let set_without_budget = FetchHouseholdBudgetTool
            .run(json!({}), household_ctx(&db, "h1"))
            .await
            .unwrap();
        let unknown = FetchHouseholdBudgetTool
            .run(json!({}), household_ctx(&db, "h2"))
            .await
            .unwrap();
        assert_eq!(set_without_budget, "$100.00");
        assert_eq!(unknown, "$100.00");
    }
}
