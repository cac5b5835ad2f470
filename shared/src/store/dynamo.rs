use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::{BTreeMap, HashMap};

use super::DocumentStore;
use crate::error::{Result, RosterError};
use crate::types::{DocumentPath, COLLEGE_FACULTY_STAFF, DEPARTMENTS, USERS};
use crate::value::{fields_absent_path, Fields, Value};

/// Attributes owned by the table layout, never exposed as document fields.
const KEY_ATTRIBUTES: [&str; 3] = ["PK", "SK", "entity_type"];

/// Single-table DynamoDB store.
///
/// Each document is one item with PK = SK = `<PREFIX>#<id>` and an
/// `entity_type` attribute holding the collection name, which is what
/// collection scans filter on.
#[derive(Clone)]
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// One `UpdateItem` setting every field. Without `create` the item must
    /// already exist; with it, a new item is tagged with its collection so
    /// scans find it.
    async fn update(&self, path: &DocumentPath, fields: Fields, create: bool) -> Result<()> {
        if let Some(at) = fields_absent_path(&fields) {
            return Err(RosterError::AbsentValue(at));
        }
        if fields.is_empty() && !create {
            return Ok(());
        }

        let pk = partition_key(path);
        let mut sets = Vec::with_capacity(fields.len() + 1);
        let mut builder = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk));

        if create {
            sets.push("entity_type = :entity_type".to_string());
            builder = builder
                .expression_attribute_values(":entity_type", AttributeValue::S(path.collection.clone()));
        } else {
            builder = builder.condition_expression("attribute_exists(PK)");
        }

        for (i, (k, v)) in fields.iter().enumerate() {
            sets.push(format!("#f{i} = :v{i}"));
            builder = builder
                .expression_attribute_names(format!("#f{i}"), k)
                .expression_attribute_values(format!(":v{i}"), to_attribute(v)?);
        }

        builder
            .update_expression(format!("SET {}", sets.join(", ")))
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if missing {
                    RosterError::NotFound(path.to_string())
                } else {
                    RosterError::Backend(format!("update_item {} failed: {}", path, e))
                }
            })?;

        tracing::info!("Updated {} field(s) on {}", fields.len(), path);
        Ok(())
    }
}

pub fn entity_prefix(collection: &str) -> String {
    match collection {
        USERS => "USER".to_string(),
        DEPARTMENTS => "DEPARTMENT".to_string(),
        COLLEGE_FACULTY_STAFF => "COLLEGE".to_string(),
        other => other.to_uppercase(),
    }
}

pub fn partition_key(path: &DocumentPath) -> String {
    format!("{}#{}", entity_prefix(&path.collection), path.id)
}

/// Document id from a partition key, e.g. `USER#abc` -> `abc`.
pub fn id_from_pk(pk: &str) -> &str {
    pk.split_once('#').map(|(_, id)| id).unwrap_or(pk)
}

pub fn to_attribute(value: &Value) -> Result<AttributeValue> {
    Ok(match value {
        Value::Absent => return Err(RosterError::AbsentValue(String::new())),
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => {
            AttributeValue::L(items.iter().map(to_attribute).collect::<Result<Vec<_>>>()?)
        }
        Value::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), to_attribute(v)?)))
                .collect::<Result<HashMap<_, _>>>()?,
        ),
    })
}

pub fn from_attribute(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => n
            .parse::<serde_json::Number>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(n.clone())),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute).collect()),
        AttributeValue::M(map) => Value::Object(map_to_fields(map)),
        AttributeValue::Ss(items) => {
            Value::Array(items.iter().map(|s| Value::String(s.clone())).collect())
        }
        AttributeValue::Ns(items) => {
            Value::Array(items.iter().map(|n| from_attribute(&AttributeValue::N(n.clone()))).collect())
        }
        _ => Value::Null,
    }
}

/// DynamoDB maps carry no order; keys come back sorted so repeated reads of
/// the same item compare equal.
fn map_to_fields(map: &HashMap<String, AttributeValue>) -> Fields {
    map.iter()
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .map(|(k, v)| (k.clone(), from_attribute(v)))
        .collect()
}

pub fn item_to_fields(item: &HashMap<String, AttributeValue>) -> Fields {
    let mut fields = map_to_fields(item);
    for key in KEY_ATTRIBUTES {
        fields.shift_remove(key);
    }
    fields
}

#[async_trait]
impl DocumentStore for DynamoStore {
    async fn read_once(&self, path: &DocumentPath) -> Result<Option<Fields>> {
        let pk = partition_key(path);

        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .send()
            .await
            .map_err(|e| RosterError::Backend(format!("get_item {} failed: {}", path, e)))?;

        Ok(result.item().map(item_to_fields))
    }

    async fn write_partial(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        self.update(path, fields, false).await
    }

    async fn upsert(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        self.update(path, fields, true).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Fields)>> {
        let mut docs = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let resp = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("entity_type = :type")
                .expression_attribute_values(":type", AttributeValue::S(collection.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RosterError::Backend(format!("scan {} failed: {}", collection, e)))?;

            for item in resp.items() {
                let Some(pk) = item.get("PK").and_then(|v| v.as_s().ok()) else {
                    continue;
                };
                docs.push((id_from_pk(pk).to_string(), item_to_fields(item)));
            }

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(docs)
    }
}
