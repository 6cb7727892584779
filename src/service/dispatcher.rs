use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::agent::{ChatGenerator, ExtractorGenerator, Generator, OllamaProvider};
use crate::errors::AppError;
use crate::models::{ChatTurn, StoredExchange};
use crate::schemas::{ProductReview, Recipe, StructuredResult, TaskList, WeatherForecast};
use crate::service::intent::Intent;

/// Prompt template and generator for one intent.
#[derive(Clone)]
pub struct Route {
    template: &'static str,
    generator: Arc<dyn Generator>,
}

impl Route {
    pub fn new(template: &'static str, generator: Arc<dyn Generator>) -> Self {
        Self { template, generator }
    }

    /// Substitutes `{prompt}` in the template.
    pub fn render(&self, prompt: &str) -> String {
        self.template.replace("{prompt}", prompt)
    }
}

pub fn template_for(intent: Intent) -> &'static str {
    match intent {
        Intent::Tasks => "Create a task list based on this request: {prompt}",
        Intent::Recipe => "Provide a recipe based on this request: {prompt}",
        Intent::Weather => {
            "Provide a weather forecast based on this request: {prompt}. \
             Note: This is a demo - provide realistic but fictional weather data."
        }
        Intent::Review => "Provide a product review based on this request: {prompt}",
        Intent::General => "{prompt}",
    }
}

/// Intent → route table, built once at startup and shared by reference.
#[derive(Clone)]
pub struct IntentRegistry {
    routes: HashMap<Intent, Route>,
    timeout: Option<Duration>,
}

impl IntentRegistry {
    /// Registry with no routes; every intent must be added before use.
    pub fn empty(timeout: Option<Duration>) -> Self {
        Self { routes: HashMap::new(), timeout }
    }

    pub fn with_route(mut self, intent: Intent, route: Route) -> Self {
        self.routes.insert(intent, route);
        self
    }

    /// Standard table: one schema-bound extractor per structured intent and
    /// a plain chat agent for everything else.
    pub fn ollama(provider: OllamaProvider, timeout: Option<Duration>) -> Self {
        let generator_for = |intent: Intent| -> Arc<dyn Generator> {
            let provider = provider.clone();
            match intent {
                Intent::Tasks => Arc::new(ExtractorGenerator::<TaskList>::new(provider)),
                Intent::Recipe => Arc::new(ExtractorGenerator::<Recipe>::new(provider)),
                Intent::Weather => Arc::new(ExtractorGenerator::<WeatherForecast>::new(provider)),
                Intent::Review => Arc::new(ExtractorGenerator::<ProductReview>::new(provider)),
                Intent::General => Arc::new(ChatGenerator::new(provider)),
            }
        };
        Intent::ALL.into_iter().fold(Self::empty(timeout), |registry, intent| {
            registry.with_route(intent, Route::new(template_for(intent), generator_for(intent)))
        })
    }

    /// Runs the generator for `intent` and wraps its result in a model turn.
    ///
    /// `user` is the already-emitted echo of the prompt; on success it is
    /// bundled with the reply into the exchange to persist.
    pub async fn dispatch(
        &self,
        intent: Intent,
        user: &ChatTurn,
        history: &[ChatTurn],
    ) -> Result<(ChatTurn, StoredExchange), AppError> {
        let route = self.routes.get(&intent).ok_or_else(|| AppError::GenerationFailed {
            message: format!("no generator registered for intent '{intent}'"),
        })?;
        let templated = route.render(&user.content);
        debug!(%intent, history_len = history.len(), "Dispatching prompt");

        let call = route.generator.generate(&templated, history);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| AppError::GeneratorTimeout { secs: limit.as_secs() })??,
            None => call.await?,
        };

        check_result(intent, &result)?;

        let reply = ChatTurn::model_reply(&result).map_err(AppError::Encode)?;
        let exchange = StoredExchange::new(user.clone(), reply.clone());
        Ok((reply, exchange))
    }
}

fn check_result(intent: Intent, result: &StructuredResult) -> Result<(), AppError> {
    if result.intent() != intent {
        return Err(AppError::invalid_result(format!(
            "expected a {intent} result, got {}",
            result.intent()
        )));
    }
    result.validate()?;
    if let StructuredResult::TaskList(list) = result {
        if list.total_tasks != list.tasks.len() as i64 {
            warn!(
                reported = list.total_tasks,
                actual = list.tasks.len(),
                "Task list total does not match its tasks"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;

    use super::*;

    /// Generator returning a canned result or a canned failure.
    pub struct CannedGenerator {
        pub reply: Result<StructuredResult, String>,
        pub delay: Option<Duration>,
    }

    impl CannedGenerator {
        pub fn ok(result: StructuredResult) -> Arc<dyn Generator> {
            Arc::new(Self { reply: Ok(result), delay: None })
        }

        pub fn failing(message: &str) -> Arc<dyn Generator> {
            Arc::new(Self { reply: Err(message.to_string()), delay: None })
        }

        pub fn slow(result: StructuredResult, delay: Duration) -> Arc<dyn Generator> {
            Arc::new(Self { reply: Ok(result), delay: Some(delay) })
        }
    }

    #[async_trait]
    impl Generator for CannedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _history: &[ChatTurn],
        ) -> Result<StructuredResult, AppError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply
                .clone()
                .map_err(|message| AppError::GenerationFailed { message })
        }
    }

    /// Registry where every intent answers with the same generator.
    pub fn registry_with(generator: Arc<dyn Generator>) -> IntentRegistry {
        Intent::ALL.into_iter().fold(IntentRegistry::empty(None), |registry, intent| {
            registry.with_route(intent, Route::new(template_for(intent), generator.clone()))
        })
    }
}
