use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{ObservationFilter, ObservationQuery, ObservationStore, SortOrder, StoreError};
use crate::model::{Observation, ObservationFields};

const AIRTABLE_API_URL: &str = "https://api.airtable.com/v0";

// Limits imposed by the records API.
const PAGE_SIZE: u64 = 100;
const DELETE_BATCH: usize = 10;

#[derive(Deserialize)]
struct ListResponse {
    records: Vec<StoredRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Deserialize)]
struct StoredRecord {
    id: String,
    #[serde(default, deserialize_with = "lenient_fields")]
    fields: ObservationFields,
}

/// A `fields` value that is not an object decodes as an empty record, which
/// `decode_records` then skips.
fn lenient_fields<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<ObservationFields, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    fields: &'a ObservationFields,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        message: Option<String>,
    },
    Code(String),
}

/// Observation table hosted in an Airtable base.
pub struct AirtableStore {
    client: Client,
    access_token: String,
    table_url: String,
}

impl AirtableStore {
    pub fn new(access_token: &str, base_id: &str, table_name: &str) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            access_token: access_token.to_string(),
            table_url: table_url(base_id, table_name),
        })
    }

    async fn list_page(
        &self,
        query: &ObservationQuery,
        offset: Option<&str>,
    ) -> Result<ListResponse, StoreError> {
        let mut params = list_params(query);
        if let Some(offset) = offset {
            params.push(("offset".to_string(), offset.to_string()));
        }

        let response = self
            .client
            .get(&self.table_url)
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let query = ObservationQuery::all();
        let mut ids = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let page = self.list_page(&query, offset.as_deref()).await?;
            ids.extend(page.records.into_iter().map(|record| record.id));
            match page.offset {
                Some(next) => offset = Some(next),
                None => return Ok(ids),
            }
        }
    }
}

fn table_url(base_id: &str, table_name: &str) -> String {
    format!(
        "{}/{}/{}",
        AIRTABLE_API_URL,
        urlencoding::encode(base_id),
        urlencoding::encode(table_name)
    )
}

/// Builds a formula comparing the URI field to a literal.
fn uri_formula(uri: &str) -> String {
    let escaped = uri.replace('\\', "\\\\").replace('\'', "\\'");
    format!("{{URI}} = '{}'", escaped)
}

fn list_params(query: &ObservationQuery) -> Vec<(String, String)> {
    let mut params = vec![("pageSize".to_string(), PAGE_SIZE.to_string())];

    if let ObservationFilter::UriEquals(uri) = &query.filter {
        params.push(("filterByFormula".to_string(), uri_formula(uri)));
    }

    let direction = match query.sort {
        SortOrder::Stored => None,
        SortOrder::DateAscending => Some("asc"),
        SortOrder::DateDescending => Some("desc"),
    };
    if let Some(direction) = direction {
        params.push(("sort[0][field]".to_string(), "Date".to_string()));
        params.push(("sort[0][direction]".to_string(), direction.to_string()));
    }

    if let Some(limit) = query.limit {
        params.push(("maxRecords".to_string(), limit.to_string()));
    }
    params
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorBody::Detailed { kind, message },
        }) => match message {
            Some(message) => format!("{}: {}", kind, message),
            None => kind,
        },
        Ok(ErrorEnvelope {
            error: ErrorBody::Code(code),
        }) => code,
        Err(_) => body.trim().to_string(),
    }
}

/// Decodes listed records, skipping any without the required fields.
fn decode_records(records: Vec<StoredRecord>) -> Vec<Observation> {
    records
        .into_iter()
        .filter_map(|record| match Observation::try_from(record.fields) {
            Ok(observation) => Some(observation),
            Err(e) => {
                warn!("Skipping malformed record {}: {}", record.id, e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl ObservationStore for AirtableStore {
    async fn create(&self, record: &Observation) -> Result<(), StoreError> {
        let fields = ObservationFields::from(record);
        let response = self
            .client
            .post(&self.table_url)
            .bearer_auth(&self.access_token)
            .json(&CreateRequest { fields: &fields })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn query(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError> {
        let mut observations = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let page = self.list_page(query, offset.as_deref()).await?;
            observations.extend(decode_records(page.records));

            if query
                .limit
                .is_some_and(|limit| observations.len() as u64 >= limit)
            {
                break;
            }
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!("Loaded {} observations", observations.len());
        Ok(observations)
    }

    async fn reset(&self) -> Result<u64, StoreError> {
        let ids = self.list_ids().await?;

        let mut deleted = 0;
        for batch in ids.chunks(DELETE_BATCH) {
            let params: Vec<(&str, &str)> =
                batch.iter().map(|id| ("records[]", id.as_str())).collect();
            let response = self
                .client
                .delete(&self.table_url)
                .bearer_auth(&self.access_token)
                .query(&params)
                .send()
                .await?;
            check_status(response).await?;
            deleted += batch.len() as u64;
        }

        warn!("Deleted {} observations", deleted);
        Ok(deleted)
    }
}
