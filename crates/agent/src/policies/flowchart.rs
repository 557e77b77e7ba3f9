//! Approach-selection flow with bounded query retries.
//!
//! ```text
//! Start → InitialTurn → PickApproach → ApproachChosen
//! ApproachChosen → ChatApproach | SemanticApproach | QueryAttempt{0}
//! SemanticApproach → ChatApproach
//! QueryAttempt{n} → QueryAttempt{n+1} | ChatApproach
//! ChatApproach → Terminal
//! ```
//!
//! The model never calls tools directly here. Decisions are structured
//! outputs, and the query tool is run by the flow itself.

use async_trait::async_trait;
use stepwise_core::error::{Error, Result};
use stepwise_core::message::Message;
use stepwise_tools::query_database;
use tracing::{debug, info, warn};

use crate::engine::{Approach, Event, EventKind, RunContext, RunLimits, Step, StepEngine};
use crate::steps::{
    AssistantReply, DecideOnQuery, SeedHistory, SelectedApproach, Transition, structured_output,
};

pub const NAME: &str = "flowchart";

/// Retries allowed after the first query attempt.
pub const MAX_QUERY_ATTEMPTS: u32 = 5;

const PICK_APPROACH: &str = "What approach should we take to answer the users question and given the information we already have?";

const SEMANTIC_UNAVAILABLE: &str =
    "Currently can't do semantic searches. Tell user you can't help them.";

const NO_RESULTS_GIVE_UP: &str = "We found no results. Let the user know.";

fn query_instruction(prompt_description: &str) -> String {
    format!(
        "What query should we run to answer the user's question? Only use following tables: contact, opportunity, account.\n\
         Do not retry again with the same queries you have already tried if they did not work.\n\
         -----\n{prompt_description}\n-----"
    )
}

pub fn flowchart(limits: RunLimits) -> Result<StepEngine> {
    StepEngine::builder(NAME)
        .step(SeedHistory)
        .step(Transition::new(
            "begin_turn",
            EventKind::InitialTurn,
            Event::PickApproach,
        ))
        .step(PickApproach)
        .step(RouteApproach)
        .step(SemanticApology)
        .step(QueryAttempt {
            max_attempts: MAX_QUERY_ATTEMPTS,
        })
        .step(AssistantReply::plain(EventKind::ChatApproach))
        .limits(limits)
        .build()
}

struct PickApproach;

#[async_trait]
impl Step for PickApproach {
    fn name(&self) -> &str {
        "pick_approach"
    }

    fn consumes(&self) -> EventKind {
        EventKind::PickApproach
    }

    fn produces(&self) -> &[EventKind] {
        &[EventKind::ApproachChosen]
    }

    async fn run(&self, _event: Event, ctx: &mut RunContext) -> Result<Event> {
        ctx.history.add(Message::assistant(PICK_APPROACH));
        let selected: SelectedApproach = structured_output(ctx).await?;
        let approach: Approach = selected.approach.parse()?;
        info!(%approach, "Approach selected");
        Ok(Event::ApproachChosen { approach })
    }
}

struct RouteApproach;

#[async_trait]
impl Step for RouteApproach {
    fn name(&self) -> &str {
        "route_approach"
    }

    fn consumes(&self) -> EventKind {
        EventKind::ApproachChosen
    }

    fn produces(&self) -> &[EventKind] {
        &[
            EventKind::ChatApproach,
            EventKind::SemanticApproach,
            EventKind::QueryAttempt,
        ]
    }

    async fn run(&self, event: Event, _ctx: &mut RunContext) -> Result<Event> {
        let Event::ApproachChosen { approach } = event else {
            return Err(Error::config("route_approach expects ApproachChosen"));
        };
        Ok(match approach {
            Approach::SimpleAnswer => Event::ChatApproach,
            Approach::SemanticSearch => Event::SemanticApproach,
            Approach::QueryDatabase => Event::QueryAttempt { attempt: 0 },
        })
    }
}

struct SemanticApology;

#[async_trait]
impl Step for SemanticApology {
    fn name(&self) -> &str {
        "semantic_search"
    }

    fn consumes(&self) -> EventKind {
        EventKind::SemanticApproach
    }

    fn produces(&self) -> &[EventKind] {
        &[EventKind::ChatApproach]
    }

    async fn run(&self, _event: Event, ctx: &mut RunContext) -> Result<Event> {
        ctx.history.add(Message::assistant(SEMANTIC_UNAVAILABLE));
        Ok(Event::ChatApproach)
    }
}

struct QueryAttempt {
    max_attempts: u32,
}

#[async_trait]
impl Step for QueryAttempt {
    fn name(&self) -> &str {
        "query_database"
    }

    fn consumes(&self) -> EventKind {
        EventKind::QueryAttempt
    }

    fn produces(&self) -> &[EventKind] {
        &[EventKind::QueryAttempt, EventKind::ChatApproach]
    }

    async fn run(&self, event: Event, ctx: &mut RunContext) -> Result<Event> {
        let Event::QueryAttempt { attempt } = event else {
            return Err(Error::config("query_database expects QueryAttempt"));
        };
        let tool = ctx
            .tools()
            .get(query_database::NAME)
            .cloned()
            .ok_or_else(|| {
                Error::config(format!("flowchart requires the {} tool", query_database::NAME))
            })?;

        ctx.history
            .add(Message::assistant(query_instruction(tool.prompt_description())));
        let DecideOnQuery { query } = structured_output::<DecideOnQuery>(ctx).await?;
        debug!(attempt, %query, "Query decided");

        let can_retry = attempt < self.max_attempts;
        ctx.stats.tool_calls += 1;
        let outcome = tool.execute(serde_json::json!({ "query": query })).await;

        let (message, next) = match outcome {
            Ok(result) => {
                let found = result
                    .data
                    .as_ref()
                    .and_then(|d| d["query_result_rows"].as_array())
                    .map_or(0, Vec::len);
                if found > 0 {
                    info!(attempt, rows = found, "Query returned results");
                    (
                        format!(
                            "We made this query (do not share with user):\n```{query}```\n\nWe found the following results: \n```{}```",
                            result.output
                        ),
                        Event::ChatApproach,
                    )
                } else if can_retry {
                    debug!(attempt, "Query returned no rows, retrying");
                    (
                        format!(
                            "We found no results. You should try again with a new query. This is the query (do not share with user) we tried:\n```{query}```"
                        ),
                        Event::QueryAttempt {
                            attempt: attempt + 1,
                        },
                    )
                } else {
                    warn!(attempt, "Query returned no rows, giving up");
                    (NO_RESULTS_GIVE_UP.to_string(), Event::ChatApproach)
                }
            }
            Err(e) if can_retry => {
                debug!(attempt, error = %e, "Query failed, retrying");
                (
                    format!(
                        "Error querying the database: {e}.\n\nThis is the query (do not share with user) we tried:\n```{query}```\n You should alter it to get it to work."
                    ),
                    Event::QueryAttempt {
                        attempt: attempt + 1,
                    },
                )
            }
            Err(e) => {
                warn!(attempt, error = %e, "Query failed, giving up");
                (
                    format!(
                        "We can not seem to get a good query. Let the user know.\n\nThis is the query (do not share with user) we tried:\n```{query}```"
                    ),
                    Event::ChatApproach,
                )
            }
        };

        ctx.history.add(Message::assistant(message));
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ModelSettings, RunResult};
    use crate::history::{ChatHistory, TokenBudget};
    use crate::test_helpers::{ScriptedProvider, ScriptedStore, registry_with, row};
    use std::sync::Arc;
    use stepwise_core::message::Role;

    async fn run(
        provider: Arc<ScriptedProvider>,
        store: Arc<ScriptedStore>,
        question: &str,
    ) -> Result<RunResult> {
        let ctx = RunContext::new(
            provider,
            Arc::new(registry_with(store)),
            ModelSettings::default(),
            ChatHistory::new(TokenBudget {
                max_tokens: 100_000,
            }),
        );
        flowchart(RunLimits::default())?
            .run_to_completion(vec![Message::user(question)], ctx)
            .await
    }

    fn approach(name: &str) -> crate::test_helpers::Scripted {
        ScriptedProvider::structured(serde_json::json!({ "approach": name }))
    }

    fn query(sql: &str) -> crate::test_helpers::Scripted {
        ScriptedProvider::structured(serde_json::json!({ "query": sql }))
    }

    #[tokio::test]
    async fn simple_answer_goes_straight_to_chat() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            approach("simple_answer"),
            ScriptedProvider::text("The capital of Spain is Madrid."),
        ]));
        let store = Arc::new(ScriptedStore::new(vec![]));

        let result = run(provider.clone(), store.clone(), "What is the capital of Spain?")
            .await
            .unwrap();

        assert!(store.queries().is_empty());
        let last = result.final_messages.last().unwrap();
        assert_eq!(last.content, "The capital of Spain is Madrid.");
        assert_eq!(result.final_messages[1].content, PICK_APPROACH);
        assert!(provider.requests()[1].tools.is_empty());
    }

    #[tokio::test]
    async fn successful_query_feeds_rows_to_chat() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            approach("query_database"),
            query("SELECT COUNT(*) AS count FROM contact"),
            ScriptedProvider::text("You have 42 contacts."),
        ]));
        let store = Arc::new(ScriptedStore::new(vec![Ok(vec![row(
            "count",
            serde_json::json!(42),
        )])]));

        let result = run(provider, store.clone(), "How many contacts?").await.unwrap();

        assert_eq!(store.queries(), vec!["SELECT COUNT(*) AS count FROM contact"]);
        let contents: Vec<&str> = result
            .final_messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert!(contents[2].starts_with("What query should we run"));
        assert!(contents[2].contains("table name: opportunity"));
        assert!(contents[3].contains("```SELECT COUNT(*) AS count FROM contact```"));
        assert!(contents[3].contains(r#"{"query_result_rows":[{"count":42}]}"#));
        assert_eq!(contents[4], "You have 42 contacts.");
    }

    #[tokio::test]
    async fn failing_queries_retry_five_times_then_chat_once() {
        let mut script = vec![approach("query_database")];
        for i in 0..=MAX_QUERY_ATTEMPTS {
            script.push(query(&format!("SELECT * FROM oops_{i}")));
        }
        script.push(ScriptedProvider::text("Sorry, I could not query the data."));
        let provider = Arc::new(ScriptedProvider::new(script));
        let store = Arc::new(ScriptedStore::new(
            (0..=MAX_QUERY_ATTEMPTS)
                .map(|_| Err("no such table".to_string()))
                .collect(),
        ));

        let result = run(provider.clone(), store.clone(), "Show opportunities").await.unwrap();

        assert_eq!(store.queries().len(), (MAX_QUERY_ATTEMPTS + 1) as usize);
        assert_eq!(provider.remaining(), 0);

        let assistant: Vec<&str> = result
            .final_messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .collect();
        let retries = assistant
            .iter()
            .filter(|c| c.starts_with("Error querying the database"))
            .count();
        assert_eq!(retries, MAX_QUERY_ATTEMPTS as usize);
        assert!(
            assistant
                .iter()
                .any(|c| c.starts_with("We can not seem to get a good query")
                    && c.contains("oops_5"))
        );
        assert_eq!(
            *assistant.last().unwrap(),
            "Sorry, I could not query the data."
        );
    }

    #[tokio::test]
    async fn empty_results_retry_with_the_failed_query() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            approach("query_database"),
            query("SELECT * FROM account WHERE name = 'Acme'"),
            query("SELECT * FROM account WHERE name LIKE '%Acme%'"),
            ScriptedProvider::text("Acme Corp is in Texas."),
        ]));
        let store = Arc::new(ScriptedStore::new(vec![
            Ok(vec![]),
            Ok(vec![row("name", serde_json::json!("Acme Corp"))]),
        ]));

        let result = run(provider, store.clone(), "Where is Acme?").await.unwrap();

        assert_eq!(store.queries().len(), 2);
        assert!(result.final_messages.iter().any(|m| {
            m.content.starts_with("We found no results. You should try again")
                && m.content.contains("name = 'Acme'")
        }));
    }

    #[tokio::test]
    async fn semantic_search_apologises() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            approach("semantic_search"),
            ScriptedProvider::text("Sorry, I can't search by meaning yet."),
        ]));
        let result = run(provider, Arc::new(ScriptedStore::new(vec![])), "Find pancake fans")
            .await
            .unwrap();
        assert!(
            result
                .final_messages
                .iter()
                .any(|m| m.content == SEMANTIC_UNAVAILABLE)
        );
    }

    #[tokio::test]
    async fn unknown_approach_is_configuration_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![approach("ask_the_oracle")]));
        let err = run(provider, Arc::new(ScriptedStore::new(vec![])), "Hmm?")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownApproach(ref a) if a == "ask_the_oracle"));
        assert!(err.is_configuration());
    }

    #[test]
    fn graph_routes_every_approach() {
        let edges = flowchart(RunLimits::default()).unwrap().describe();
        let route = edges.iter().find(|e| e.step == "route_approach").unwrap();
        assert_eq!(route.produces.len(), 3);
        let query = edges.iter().find(|e| e.step == "query_database").unwrap();
        assert!(query.produces.contains(&EventKind::QueryAttempt));
    }
}
