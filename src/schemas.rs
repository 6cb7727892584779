//! Result shapes the generators are bound to.
//!
//! Field doc comments double as the descriptions in the JSON schema handed to
//! the model provider, so they are written for the model to read.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::service::intent::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// Short task title
    pub title: String,
    /// What the task involves
    pub description: String,
    pub priority: TaskPriority,
    /// Time needed, e.g. "2 hours" or "30 minutes"
    pub estimated_time: String,
    /// Task category, e.g. "work", "personal", "study"
    pub category: String,
}

/// A structured task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    /// Number of tasks in the list
    pub total_tasks: i64,
    /// One-sentence overview of the list
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Ingredient {
    pub name: String,
    /// Quantity, e.g. "2 cups" or "1 tbsp"
    pub amount: String,
    /// Optional preparation notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// A structured recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Recipe {
    pub name: String,
    /// Short description of the dish
    pub description: String,
    pub prep_time: String,
    pub cook_time: String,
    pub servings: i64,
    pub difficulty: Difficulty,
    pub ingredients: Vec<Ingredient>,
    /// Cooking steps in order
    pub instructions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WeatherCondition {
    Sunny,
    Cloudy,
    Rainy,
    Snowy,
    Stormy,
    Foggy,
}

/// A structured weather forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeatherForecast {
    pub location: String,
    pub current_condition: WeatherCondition,
    /// Temperature including its unit
    pub temperature: String,
    /// Relative humidity as a percentage
    pub humidity: String,
    /// Wind speed including its unit
    pub wind_speed: String,
    pub forecast_summary: String,
    /// Clothing or activity suggestions
    pub recommendations: Vec<String>,
}

/// A structured product review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProductReview {
    pub product_name: String,
    /// Star rating from 1 to 5
    #[schemars(range(min = 1, max = 5))]
    pub rating: i64,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub summary: String,
    /// Whether the product is worth buying
    pub recommendation: bool,
}

/// One generator result. Exactly one variant per response.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredResult {
    TaskList(TaskList),
    Recipe(Recipe),
    Weather(WeatherForecast),
    ProductReview(ProductReview),
    PlainText(String),
}

impl StructuredResult {
    /// The intent whose schema this result conforms to.
    pub fn intent(&self) -> Intent {
        match self {
            StructuredResult::TaskList(_) => Intent::Tasks,
            StructuredResult::Recipe(_) => Intent::Recipe,
            StructuredResult::Weather(_) => Intent::Weather,
            StructuredResult::ProductReview(_) => Intent::Review,
            StructuredResult::PlainText(_) => Intent::General,
        }
    }

    /// Human-readable line shown as the turn content.
    pub fn summary(&self) -> String {
        match self {
            StructuredResult::TaskList(list) => format!(
                "I've created a structured task list for you with {} tasks.",
                list.total_tasks
            ),
            StructuredResult::Recipe(recipe) => format!(
                "Here's a {} recipe for {} (serves {}).",
                recipe.difficulty.as_str(),
                recipe.name,
                recipe.servings
            ),
            StructuredResult::Weather(forecast) => {
                format!("Here's the weather forecast for {}.", forecast.location)
            }
            StructuredResult::ProductReview(review) => format!(
                "Here's a structured review for {} ({}/5 stars).",
                review.product_name, review.rating
            ),
            StructuredResult::PlainText(text) => text.clone(),
        }
    }

    /// JSON object for `structured_data`, `None` for plain text.
    pub fn payload(&self) -> Result<Option<serde_json::Value>, serde_json::Error> {
        let value = match self {
            StructuredResult::TaskList(v) => serde_json::to_value(v)?,
            StructuredResult::Recipe(v) => serde_json::to_value(v)?,
            StructuredResult::Weather(v) => serde_json::to_value(v)?,
            StructuredResult::ProductReview(v) => serde_json::to_value(v)?,
            StructuredResult::PlainText(_) => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Field-level checks the JSON schema alone cannot guarantee.
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            StructuredResult::TaskList(_) => Ok(()),
            StructuredResult::Recipe(recipe) => non_empty("name", &recipe.name),
            StructuredResult::Weather(forecast) => non_empty("location", &forecast.location),
            StructuredResult::ProductReview(review) => {
                non_empty("product_name", &review.product_name)?;
                if !(1..=5).contains(&review.rating) {
                    return Err(AppError::invalid_result(format!(
                        "rating must be between 1 and 5, got {}",
                        review.rating
                    )));
                }
                Ok(())
            }
            StructuredResult::PlainText(text) => {
                if text.trim().is_empty() {
                    return Err(AppError::invalid_result("model returned an empty reply"));
                }
                Ok(())
            }
        }
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::invalid_result(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Binds a schema type to its [`StructuredResult`] variant.
pub trait ResultSchema:
    JsonSchema + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static
{
    fn into_result(self) -> StructuredResult;
}

impl ResultSchema for TaskList {
    fn into_result(self) -> StructuredResult {
        StructuredResult::TaskList(self)
    }
}

impl ResultSchema for Recipe {
    fn into_result(self) -> StructuredResult {
        StructuredResult::Recipe(self)
    }
}

impl ResultSchema for WeatherForecast {
    fn into_result(self) -> StructuredResult {
        StructuredResult::Weather(self)
    }
}

impl ResultSchema for ProductReview {
    fn into_result(self) -> StructuredResult {
        StructuredResult::ProductReview(self)
    }
}
