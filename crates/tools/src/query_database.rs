//! SQL query tool over the CRM tables.
//!
//! The tool carries a long prompt description with the table schema, which
//! policies embed in their instructions so the model writes valid queries.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolResult};
use tracing::{debug, warn};

use crate::query_store::QueryStore;

pub const NAME: &str = "query_database";

/// Table schema and query conventions shown to the model.
pub const PROMPT_DESCRIPTION: &str = r#"
The query_database function uses the following schema to query the database. Only use the schema below to query the database.

table name: contact
schema:
id	VARCHAR
remote_id	VARCHAR
remote_created_at	TIMESTAMP WITH TIME ZONE
first_name	VARCHAR
last_name	VARCHAR
account	VARCHAR
owner	VARCHAR
addresses	STRUCT(street_1 VARCHAR, city VARCHAR, state VARCHAR, postal_code VARCHAR, country VARCHAR, address_type VARCHAR)[]
email_addresses	STRUCT(email_address VARCHAR, email_address_type VARCHAR)[]
phone_numbers	STRUCT(phone_number VARCHAR, phone_number_type VARCHAR)[]
last_activity_at	TIMESTAMP WITH TIME ZONE

table name: contact__documents
schema:
record_id	VARCHAR
remote_id	VARCHAR
document	VARCHAR
chunk_id	INTEGER

table name: account
schema:
id	VARCHAR
remote_id	VARCHAR
owner	VARCHAR
name	VARCHAR
description	VARCHAR
industry	VARCHAR
website	VARCHAR
number_of_employees	BIGINT
addresses	STRUCT(street_1 VARCHAR, city VARCHAR, state VARCHAR, postal_code VARCHAR, country VARCHAR, address_type VARCHAR)[]
phone_numbers	STRUCT(phone_number VARCHAR, phone_number_type VARCHAR)[]
last_activity_at	TIMESTAMP WITH TIME ZONE

table name: account__documents
schema:
record_id	VARCHAR
remote_id	VARCHAR
document	VARCHAR
chunk_id	INTEGER

table name: opportunity
schema:
id	VARCHAR
remote_id	VARCHAR
remote_created_at	TIMESTAMP WITH TIME ZONE
last_activity_at	TIMESTAMP WITH TIME ZONE
name	VARCHAR
description	VARCHAR
amount	INTEGER
owner	VARCHAR
account	VARCHAR
status	VARCHAR
close_date	TIMESTAMP WITH TIME ZONE
remote_was_deleted	BOOLEAN

table name: opportunity__documents
schema:
record_id	VARCHAR
remote_id	VARCHAR
document	VARCHAR
chunk_id	INTEGER

addresses is a struct with the following fields: street_1, city, state, postal_code, country, address_type
country is a two character country code like US, CA, GB, etc.

Remember to check if structs are empty before accessing them. For example:
WHERE account.addresses IS NOT NULL AND account.addresses[1].state = 'Texas'

contact.account is a foreign key to account.remote_id

opportunity.account is a foreign key to account.remote_id
opportunity.status is either OPEN, LOST, or WON. These must be matched exactly and in uppercase.
opportunity.amount is in dollars of potential revenue
opportunity.close_date is the date the opportunity was closed to LOST or WON

Each contact can have many documents: contact__documents.record_id is a foreign key to contact.id
Each opportunity can have many documents: opportunity__documents.record_id is a foreign key to opportunity.id
Each account can have many documents: account__documents.record_id is a foreign key to account.id
"#;

#[derive(Debug, Deserialize)]
struct QueryArgs {
    query: String,
}

/// Runs model-written SQL against a [`QueryStore`].
pub struct QueryDatabaseTool {
    store: Arc<dyn QueryStore>,
    max_rows: usize,
}

impl QueryDatabaseTool {
    pub fn new(store: Arc<dyn QueryStore>) -> Self {
        Self {
            store,
            max_rows: usize::MAX,
        }
    }

    /// Cap the rows handed back to the model.
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }
}

#[async_trait]
impl Tool for QueryDatabaseTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Query the database with an SQL query. It returns a list of row values based on the query. We need to not use too much memory, so limit queries to the smallest number of rows needed to answer the question."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SQL query to run against the database."
                }
            },
            "required": ["query"]
        })
    }

    fn prompt_description(&self) -> &str {
        PROMPT_DESCRIPTION
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: QueryArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        debug!(store = self.store.name(), query = %args.query, "Running query");
        let mut rows = self.store.execute(&args.query).await?;
        if rows.len() > self.max_rows {
            warn!(
                returned = rows.len(),
                max_rows = self.max_rows,
                "Query result truncated"
            );
            rows.truncate(self.max_rows);
        }

        let data = serde_json::json!({ "query_result_rows": rows });
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: data.to_string(),
            data: Some(data),
        })
    }
}
