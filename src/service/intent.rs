//! Keyword-based intent classification.
//!
//! Groups are checked in priority order and the first group with a keyword
//! anywhere in the lowercased prompt wins. Matching is by substring, so
//! "tasks" and "planning" hit the tasks group too.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Tasks,
    Recipe,
    Weather,
    Review,
    General,
}

impl Intent {
    pub const ALL: [Intent; 5] =
        [Intent::Tasks, Intent::Recipe, Intent::Weather, Intent::Review, Intent::General];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Tasks => "tasks",
            Intent::Recipe => "recipe",
            Intent::Weather => "weather",
            Intent::Review => "review",
            Intent::General => "general",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const KEYWORD_GROUPS: [(Intent, &[&str]); 4] = [
    (Intent::Tasks, &["task", "todo", "plan", "schedule", "organize"]),
    (Intent::Recipe, &["recipe", "cook", "ingredient", "dish", "meal"]),
    (Intent::Weather, &["weather", "forecast", "temperature", "rain", "sunny"]),
    (Intent::Review, &["review", "product", "rating", "recommend", "opinion"]),
];

pub fn classify(prompt: &str) -> Intent {
    let lowered = prompt.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::General)
}
