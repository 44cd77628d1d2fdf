//! Pocketbase-backed [`RecordStore`] implementation.
//!
//! A [`PocketBaseStore`] is an authenticated session: it signs in as a
//! superuser once in [`PocketBaseStore::connect`] and is then passed by
//! reference to every caller for the rest of the command.
//!
//! Endpoints used:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | auth | `POST /api/collections/_superusers/auth-with-password` |
//! | list | `GET /api/collections/{c}/records?page=&perPage=&filter=&sort=` |
//! | get | `GET /api/collections/{c}/records/{id}` |
//! | create | `POST /api/collections/{c}/records` |
//! | update | `PATCH /api/collections/{c}/records/{id}` |
//! | delete | `DELETE /api/collections/{c}/records/{id}` |
//! | health | `GET /api/health` |
//!
//! Content tags are not a field of the `content` collection. Each tag is a
//! `{content, tag}` record in the `content_tags` join collection, so the
//! store moves the `tags` array of a content record into links on write
//! and gathers the links back into `tags` on read. Deleting a content
//! record cascades to its links on the server.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{ListQuery, RecordStore, SortOrder, StoreError, StoreResult};
use crate::config::PocketBaseConfig;
use crate::models::Record;

const CONTENT: &str = "content";
const CONTENT_TAGS: &str = "content_tags";

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<Record>,
    #[serde(default, rename = "totalItems")]
    total_items: u64,
    #[serde(default, rename = "totalPages")]
    total_pages: u64,
}

/// Authenticated Pocketbase session.
pub struct PocketBaseStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
    page_size: usize,
}

impl PocketBaseStore {
    /// Authenticate with the configured superuser credentials.
    pub async fn connect(config: &PocketBaseConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config.url.trim_end_matches('/').to_string();

        let url = format!(
            "{}/api/collections/_superusers/auth-with-password",
            base_url
        );
        let body = serde_json::json!({
            "identity": config.email,
            "password": config.password,
        });

        let resp = client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = error_message(resp).await;
            return Err(StoreError::Auth(format!(
                "Failed to authenticate with Pocketbase at {}: {}",
                base_url, message
            )));
        }
        let auth: AuthResponse = resp.json().await?;
        tracing::debug!(url = %base_url, "authenticated with pocketbase");

        Ok(Self {
            client,
            base_url,
            token: auth.token,
            page_size: config.page_size,
        })
    }

    fn records_url(&self, collection: &str) -> String {
        format!("{}/api/collections/{}/records", self.base_url, collection)
    }

    fn record_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.records_url(collection), id)
    }

    async fn fetch_page(
        &self,
        collection: &str,
        page: u64,
        per_page: usize,
        query: &ListQuery,
    ) -> StoreResult<ListResponse> {
        let mut params: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("perPage", per_page.to_string()),
        ];
        if let Some(filter) = build_filter(&query.filters) {
            params.push(("filter", filter));
        }
        if let Some(ref field) = query.sort {
            let sort = match query.order {
                SortOrder::Asc => field.clone(),
                SortOrder::Desc => format!("-{}", field),
            };
            params.push(("sort", sort));
        }

        let resp = self
            .client
            .get(self.records_url(collection))
            .header("Authorization", &self.token)
            .query(&params)
            .send()
            .await?;
        let resp = check_status(resp, collection, None).await?;
        Ok(resp.json().await?)
    }

    async fn list_records(&self, collection: &str, query: &ListQuery) -> StoreResult<Vec<Record>> {
        let per_page = match query.limit {
            Some(limit) => limit.clamp(1, self.page_size),
            None => self.page_size,
        };

        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.fetch_page(collection, page, per_page, query).await?;
            let last = page >= batch.total_pages || batch.items.is_empty();
            records.extend(batch.items);

            if let Some(limit) = query.limit {
                if records.len() >= limit {
                    records.truncate(limit);
                    break;
                }
            }
            if last {
                break;
            }
            page += 1;
        }

        tracing::debug!(collection, count = records.len(), "fetched records");
        Ok(records)
    }

    async fn post_record(&self, collection: &str, fields: &Record) -> StoreResult<Record> {
        let resp = self
            .client
            .post(self.records_url(collection))
            .header("Authorization", &self.token)
            .json(fields)
            .send()
            .await?;
        let resp = check_status(resp, collection, None).await?;
        Ok(resp.json().await?)
    }

    async fn delete_record(&self, collection: &str, id: &str) -> StoreResult<()> {
        let resp = self
            .client
            .delete(self.record_url(collection, id))
            .header("Authorization", &self.token)
            .send()
            .await?;
        check_status(resp, collection, Some(id)).await?;
        Ok(())
    }

    /// Tag ids linked to each content id. With `content_id`, only that
    /// record's links are fetched.
    async fn tag_links(&self, content_id: Option<&str>) -> StoreResult<BTreeMap<String, BTreeSet<String>>> {
        let mut query = ListQuery::default();
        if let Some(id) = content_id {
            query = query.filter("content", id);
        }
        let mut links: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for link in self.list_records(CONTENT_TAGS, &query).await? {
            links
                .entry(text_field(&link, "content").to_string())
                .or_default()
                .insert(text_field(&link, "tag").to_string());
        }
        Ok(links)
    }

    async fn attach_tags(&self, records: &mut [Record]) -> StoreResult<()> {
        let only = match &*records {
            [one] => Some(text_field(one, "id").to_string()),
            _ => None,
        };
        let mut links = self.tag_links(only.as_deref()).await?;
        for record in records.iter_mut() {
            let tags = links.remove(text_field(record, "id")).unwrap_or_default();
            record.insert("tags".to_string(), tag_array(&tags));
        }
        Ok(())
    }

    /// Make the links of `content_id` exactly `tags`, touching only the
    /// links that differ.
    async fn sync_tags(&self, content_id: &str, tags: &BTreeSet<String>) -> StoreResult<()> {
        let query = ListQuery::default().filter("content", content_id);
        let mut linked = BTreeSet::new();
        for link in self.list_records(CONTENT_TAGS, &query).await? {
            let tag = text_field(&link, "tag");
            if tags.contains(tag) && linked.insert(tag.to_string()) {
                continue;
            }
            self.delete_record(CONTENT_TAGS, text_field(&link, "id")).await?;
        }
        for tag in tags.difference(&linked) {
            let mut link = Record::new();
            link.insert("content".to_string(), Value::from(content_id));
            link.insert("tag".to_string(), Value::from(tag.as_str()));
            self.post_record(CONTENT_TAGS, &link).await?;
        }
        tracing::debug!(content_id, tags = tags.len(), "synced content tags");
        Ok(())
    }
}

fn text_field<'a>(record: &'a Record, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn tag_array(tags: &BTreeSet<String>) -> Value {
    Value::Array(tags.iter().cloned().map(Value::String).collect())
}

/// Split the `tags` array off a content payload. `null` means no tags.
fn split_tags(fields: &Record) -> (Record, Option<BTreeSet<String>>) {
    let mut fields = fields.clone();
    let tags = fields.remove("tags").map(|value| {
        value
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    });
    (fields, tags)
}

/// Build a Pocketbase filter expression from equality pairs.
fn build_filter(filters: &[(String, String)]) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    let parts: Vec<String> = filters
        .iter()
        .map(|(key, value)| {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            format!("{} = \"{}\"", key, escaped)
        })
        .collect();
    Some(parts.join(" && "))
}

async fn error_message(resp: reqwest::Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(text)
}

async fn check_status(
    resp: reqwest::Response,
    collection: &str,
    id: Option<&str>,
) -> StoreResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let code = status.as_u16();
    let message = error_message(resp).await;
    Err(match (code, id) {
        (404, Some(id)) => StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        },
        (401 | 403, _) => StoreError::Auth(message),
        _ => StoreError::Api {
            status: code,
            message,
        },
    })
}

#[async_trait]
impl RecordStore for PocketBaseStore {
    fn backend(&self) -> &str {
        "pocketbase"
    }

    async fn get_full_list(&self, collection: &str) -> StoreResult<Vec<Record>> {
        self.get_list(collection, &ListQuery::default()).await
    }

    async fn get_list(&self, collection: &str, query: &ListQuery) -> StoreResult<Vec<Record>> {
        let mut records = self.list_records(collection, query).await?;
        if collection == CONTENT && !records.is_empty() {
            self.attach_tags(&mut records).await?;
        }
        Ok(records)
    }

    async fn get_one(&self, collection: &str, id: &str) -> StoreResult<Record> {
        let resp = self
            .client
            .get(self.record_url(collection, id))
            .header("Authorization", &self.token)
            .send()
            .await?;
        let resp = check_status(resp, collection, Some(id)).await?;
        let mut record: Record = resp.json().await?;
        if collection == CONTENT {
            self.attach_tags(std::slice::from_mut(&mut record)).await?;
        }
        Ok(record)
    }

    async fn create(&self, collection: &str, fields: &Record) -> StoreResult<Record> {
        if collection != CONTENT {
            return self.post_record(collection, fields).await;
        }
        let (fields, tags) = split_tags(fields);
        let mut record = self.post_record(collection, &fields).await?;
        let tags = tags.unwrap_or_default();
        if !tags.is_empty() {
            self.sync_tags(text_field(&record, "id"), &tags).await?;
        }
        record.insert("tags".to_string(), tag_array(&tags));
        Ok(record)
    }

    async fn update(&self, collection: &str, id: &str, fields: &Record) -> StoreResult<Record> {
        let (fields, tags) = if collection == CONTENT {
            split_tags(fields)
        } else {
            (fields.clone(), None)
        };
        let mut record: Record = if fields.is_empty() {
            self.get_one(collection, id).await?
        } else {
            let resp = self
                .client
                .patch(self.record_url(collection, id))
                .header("Authorization", &self.token)
                .json(&fields)
                .send()
                .await?;
            check_status(resp, collection, Some(id)).await?.json().await?
        };
        if let Some(tags) = tags {
            self.sync_tags(id, &tags).await?;
            record.insert("tags".to_string(), tag_array(&tags));
        }
        Ok(record)
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.delete_record(collection, id).await
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        Ok(self
            .fetch_page(collection, 1, 1, &ListQuery::default())
            .await?
            .total_items)
    }

    async fn health(&self) -> StoreResult<()> {
        let resp = self
            .client
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await?;
        check_status(resp, "health", None).await?;
        Ok(())
    }
}
