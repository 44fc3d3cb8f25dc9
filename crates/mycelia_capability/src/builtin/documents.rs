//! In-memory document collections.
//!
//! Requests touch `db/<collection>` with action `read`, `write` or `delete`.
//! Filters map fields to a value or to comparison operators (`$eq`, `$ne`,
//! `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`) and may be nested with `$and`.
//! `{"$date": ..}` and `{"$oid": ..}` values compare by their payload.

use super::check_segment;
use crate::capability::Capability;
use crate::gate::Caller;
use crate::modifier::{Modifier, ModifierSet, Next};
use async_trait::async_trait;
use mycelia_core::{ActionRecord, GateError, GateResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Capability code
pub const CODE: &str = "tech.mycelia.documents";

/// A stored document
pub type Document = Map<String, Value>;

/// Document operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum DocumentRequest {
    /// All matching documents
    Find {
        /// Collection name
        collection: String,
        /// Equality filter
        #[serde(default)]
        filter: Document,
        /// Maximum number of documents returned
        #[serde(default)]
        limit: Option<usize>,
    },
    /// First matching document, if any
    FindOne {
        /// Collection name
        collection: String,
        /// Equality filter
        #[serde(default)]
        filter: Document,
    },
    /// Number of matching documents
    Count {
        /// Collection name
        collection: String,
        /// Equality filter
        #[serde(default)]
        filter: Document,
    },
    /// Insert one document
    InsertOne {
        /// Collection name
        collection: String,
        /// Document to store
        doc: Document,
    },
    /// Set fields on the first matching document
    UpdateOne {
        /// Collection name
        collection: String,
        /// Equality filter
        #[serde(default)]
        filter: Document,
        /// Fields to set
        set: Document,
    },
    /// Delete the first matching document
    DeleteOne {
        /// Collection name
        collection: String,
        /// Equality filter
        #[serde(default)]
        filter: Document,
    },
    /// Delete every matching document
    DeleteMany {
        /// Collection name
        collection: String,
        /// Equality filter
        #[serde(default)]
        filter: Document,
    },
}

impl DocumentRequest {
    /// Target collection
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Find { collection, .. }
            | Self::FindOne { collection, .. }
            | Self::Count { collection, .. }
            | Self::InsertOne { collection, .. }
            | Self::UpdateOne { collection, .. }
            | Self::DeleteOne { collection, .. }
            | Self::DeleteMany { collection, .. } => collection,
        }
    }

    /// Policy action verb
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Find { .. } | Self::FindOne { .. } | Self::Count { .. } => "read",
            Self::InsertOne { .. } | Self::UpdateOne { .. } => "write",
            Self::DeleteOne { .. } | Self::DeleteMany { .. } => "delete",
        }
    }

    fn filter(&self) -> Option<&Document> {
        match self {
            Self::Find { filter, .. }
            | Self::FindOne { filter, .. }
            | Self::Count { filter, .. }
            | Self::UpdateOne { filter, .. }
            | Self::DeleteOne { filter, .. }
            | Self::DeleteMany { filter, .. } => Some(filter),
            Self::InsertOne { .. } => None,
        }
    }

    fn filter_mut(&mut self) -> Option<&mut Document> {
        match self {
            Self::Find { filter, .. }
            | Self::FindOne { filter, .. }
            | Self::Count { filter, .. }
            | Self::UpdateOne { filter, .. }
            | Self::DeleteOne { filter, .. }
            | Self::DeleteMany { filter, .. } => Some(filter),
            Self::InsertOne { .. } => None,
        }
    }
}

/// `count` result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Counted {
    /// Matching documents
    pub count: u64,
}

/// `insertOne` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Inserted {
    /// Stored document, including its `_id`
    pub inserted: Document,
}

/// `updateOne` result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Updated {
    /// Documents matched (0 or 1)
    pub matched: u64,
    /// Documents changed (0 or 1)
    pub modified: u64,
}

/// `deleteOne` and `deleteMany` result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deleted {
    /// Documents removed
    pub deleted: u64,
}

/// Document operation result.
///
/// Untagged on the wire. Arrays decode as `find` results first, then the
/// summary shapes are tried before a bare document, so a `findOne` hit whose
/// fields are exactly `{"count": n}` reads back as [`DocumentResponse::Count`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentResponse {
    /// `find`
    Documents(Vec<Document>),
    /// `count`
    Count(Counted),
    /// `insertOne`
    Inserted(Inserted),
    /// `updateOne`
    Updated(Updated),
    /// `deleteOne` and `deleteMany`
    Deleted(Deleted),
    /// `findOne`
    Document(Option<Document>),
}

/// Comparison operators accepted inside a field condition
const FIELD_OPERATORS: &[&str] = &["$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin"];

/// Extended-JSON wrappers compared as plain values
const TYPED_VALUES: &[&str] = &["$date", "$oid"];

fn is_typed_value(map: &Map<String, Value>) -> bool {
    map.len() == 1 && map.keys().all(|k| TYPED_VALUES.contains(&k.as_str()))
}

/// Operator map of a field condition, if it is one
fn operators(condition: &Value) -> Option<&Map<String, Value>> {
    condition
        .as_object()
        .filter(|map| !map.is_empty() && !is_typed_value(map))
        .filter(|map| map.keys().any(|k| k.starts_with('$')))
}

/// Order two values of the same kind; `$date` and `$oid` compare by their payload
fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Object(a), Value::Object(b)) if is_typed_value(a) && is_typed_value(b) => {
            let (ka, va) = a.iter().next()?;
            let (kb, vb) = b.iter().next()?;
            if ka == kb { compare(va, vb) } else { None }
        }
        _ => None,
    }
}

/// Whether a field value (absent as `None`) satisfies one condition
fn matches_condition(value: Option<&Value>, condition: &Value) -> bool {
    use std::cmp::Ordering::{Equal, Greater, Less};

    let Some(ops) = operators(condition) else {
        return value == Some(condition);
    };
    ops.iter().all(|(op, operand)| {
        let ordered = |accept: &[std::cmp::Ordering]| {
            value
                .and_then(|v| compare(v, operand))
                .is_some_and(|ord| accept.contains(&ord))
        };
        let member = || {
            operand
                .as_array()
                .is_some_and(|items| items.iter().any(|item| value == Some(item)))
        };
        match op.as_str() {
            "$eq" => value == Some(operand),
            "$ne" => value != Some(operand),
            "$gt" => ordered(&[Greater]),
            "$gte" => ordered(&[Greater, Equal]),
            "$lt" => ordered(&[Less]),
            "$lte" => ordered(&[Less, Equal]),
            "$in" => member(),
            "$nin" => !member(),
            _ => false,
        }
    })
}

/// Whether `doc` satisfies `filter`
#[must_use]
pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => condition.as_array().is_some_and(|clauses| {
            clauses
                .iter()
                .all(|clause| clause.as_object().is_some_and(|c| matches_filter(doc, c)))
        }),
        _ => matches_condition(doc.get(key), condition),
    })
}

/// Every (field, condition) pair of a filter, flattened through `$and`
fn field_conditions(filter: &Document) -> Vec<(&str, &Value)> {
    let mut found = Vec::new();
    for (key, condition) in filter {
        if key == "$and" {
            let clauses = condition.as_array().into_iter().flatten();
            for clause in clauses.filter_map(Value::as_object) {
                found.extend(field_conditions(clause));
            }
        } else {
            found.push((key.as_str(), condition));
        }
    }
    found
}

fn check_condition(field: &str, condition: &Value) -> Result<(), String> {
    let Some(map) = condition.as_object() else {
        return Ok(());
    };
    if map.is_empty() || is_typed_value(map) {
        return Ok(());
    }
    if !map.keys().any(|k| k.starts_with('$')) {
        return Ok(());
    }
    for (op, operand) in map {
        if !FIELD_OPERATORS.contains(&op.as_str()) {
            return Err(format!("unsupported operator {op} on {field}"));
        }
        if matches!(op.as_str(), "$in" | "$nin") && !operand.is_array() {
            return Err(format!("{op} on {field} must be an array"));
        }
    }
    Ok(())
}

/// Reject anything but `$and`, field comparisons and typed values
///
/// # Errors
///
/// Returns the first unsupported construct found
pub fn check_filter(filter: &Document) -> Result<(), String> {
    for (key, value) in filter {
        match key.as_str() {
            "$and" => {
                let clauses = value
                    .as_array()
                    .ok_or_else(|| "$and must be an array".to_string())?;
                for clause in clauses {
                    let clause = clause
                        .as_object()
                        .ok_or_else(|| "$and clauses must be objects".to_string())?;
                    check_filter(clause)?;
                }
            }
            op if op.starts_with('$') => return Err(format!("unsupported operator {op}")),
            field => check_condition(field, value)?,
        }
    }
    Ok(())
}

/// AND-combine `extra` into `filter`
pub fn and_combine(filter: &mut Document, extra: &Document) {
    if extra.is_empty() {
        return;
    }
    if filter.is_empty() {
        *filter = extra.clone();
        return;
    }
    let original = std::mem::take(filter);
    filter.insert(
        "$and".to_string(),
        json!([Value::Object(original), Value::Object(extra.clone())]),
    );
}

fn check_fields(field: &str, doc: &Document) -> Result<(), String> {
    match doc.keys().find(|k| k.starts_with('$')) {
        Some(key) => Err(format!("{field} must not contain operator key {key}")),
        None => Ok(()),
    }
}

/// In-memory document store
#[derive(Debug, Default)]
pub struct Documents {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    next_id: AtomicU64,
}

impl Documents {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Capability for Documents {
    type Request = DocumentRequest;
    type Response = DocumentResponse;

    fn code(&self) -> &str {
        CODE
    }

    fn description(&self) -> &str {
        "Query and mutate in-memory document collections"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["action", "collection"],
            "properties": {
                "action": {
                    "enum": [
                        "find",
                        "findOne",
                        "count",
                        "insertOne",
                        "updateOne",
                        "deleteOne",
                        "deleteMany"
                    ]
                },
                "collection": { "type": "string" },
                "filter": { "type": "object" },
                "limit": { "type": "integer", "minimum": 0 },
                "doc": { "type": "object" },
                "set": { "type": "object" }
            }
        })
    }

    fn check(&self, request: &DocumentRequest) -> Result<(), String> {
        check_segment("collection", request.collection())?;
        if let Some(filter) = request.filter() {
            check_filter(filter)?;
        }
        match request {
            DocumentRequest::InsertOne { doc, .. } => check_fields("doc", doc),
            DocumentRequest::UpdateOne { set, .. } => {
                check_fields("set", set)?;
                if set.contains_key("_id") {
                    return Err("set must not change _id".to_string());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn extract_actions(&self, request: &DocumentRequest) -> Vec<ActionRecord> {
        vec![ActionRecord::at(["db", request.collection()]).with_action(request.action())]
    }

    async fn execute(
        &self,
        request: DocumentRequest,
        _caller: &Caller,
    ) -> GateResult<DocumentResponse> {
        let response = match request {
            DocumentRequest::Find {
                collection,
                filter,
                limit,
            } => {
                let collections = self.collections.read().await;
                let found = collections
                    .get(&collection)
                    .into_iter()
                    .flatten()
                    .filter(|doc| matches_filter(doc, &filter))
                    .take(limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect();
                DocumentResponse::Documents(found)
            }
            DocumentRequest::FindOne { collection, filter } => {
                let collections = self.collections.read().await;
                let found = collections
                    .get(&collection)
                    .and_then(|docs| docs.iter().find(|doc| matches_filter(doc, &filter)))
                    .cloned();
                DocumentResponse::Document(found)
            }
            DocumentRequest::Count { collection, filter } => {
                let collections = self.collections.read().await;
                let count = collections.get(&collection).map_or(0, |docs| {
                    docs.iter().filter(|doc| matches_filter(doc, &filter)).count()
                });
                DocumentResponse::Count(Counted {
                    count: count as u64,
                })
            }
            DocumentRequest::InsertOne { collection, mut doc } => {
                if !doc.contains_key("_id") {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                    doc.insert("_id".to_string(), json!(id));
                }
                self.collections
                    .write()
                    .await
                    .entry(collection)
                    .or_default()
                    .push(doc.clone());
                DocumentResponse::Inserted(Inserted { inserted: doc })
            }
            DocumentRequest::UpdateOne {
                collection,
                filter,
                set,
            } => {
                let mut collections = self.collections.write().await;
                let target = collections
                    .get_mut(&collection)
                    .and_then(|docs| docs.iter_mut().find(|doc| matches_filter(doc, &filter)));
                match target {
                    Some(doc) => {
                        let mut modified = false;
                        for (key, value) in set {
                            if doc.get(&key) != Some(&value) {
                                doc.insert(key, value);
                                modified = true;
                            }
                        }
                        DocumentResponse::Updated(Updated {
                            matched: 1,
                            modified: u64::from(modified),
                        })
                    }
                    None => DocumentResponse::Updated(Updated {
                        matched: 0,
                        modified: 0,
                    }),
                }
            }
            DocumentRequest::DeleteOne { collection, filter } => {
                let mut collections = self.collections.write().await;
                let deleted = collections.get_mut(&collection).map_or(0, |docs| {
                    match docs.iter().position(|doc| matches_filter(doc, &filter)) {
                        Some(index) => {
                            docs.remove(index);
                            1
                        }
                        None => 0,
                    }
                });
                DocumentResponse::Deleted(Deleted { deleted })
            }
            DocumentRequest::DeleteMany { collection, filter } => {
                let mut collections = self.collections.write().await;
                let deleted = collections.get_mut(&collection).map_or(0, |docs| {
                    let before = docs.len();
                    docs.retain(|doc| !matches_filter(doc, &filter));
                    (before - docs.len()) as u64
                });
                DocumentResponse::Deleted(Deleted { deleted })
            }
        };
        Ok(response)
    }

    fn modifiers(&self) -> ModifierSet<Self> {
        ModifierSet::new().with("filter", RowFilter)
    }
}

/// Argument of the `filter` modifier
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterArg {
    /// Row-level filter every touched document must satisfy
    pub filter: Document,
}

/// Row-level filter.
///
/// Queries are narrowed by AND-combining the filter; inserts and updates that
/// would produce a document outside it are refused.
pub struct RowFilter;

#[async_trait]
impl Modifier<Documents> for RowFilter {
    type Arg = FilterArg;

    fn validate(&self, arg: &FilterArg) -> Result<(), String> {
        check_filter(&arg.filter)
    }

    async fn apply(
        &self,
        arg: &FilterArg,
        mut request: DocumentRequest,
        caller: &Caller,
        next: Next<'_, Documents>,
    ) -> GateResult<DocumentResponse> {
        match &mut request {
            DocumentRequest::InsertOne { doc, .. } => {
                if !matches_filter(doc, &arg.filter) {
                    return Err(GateError::denied(CODE));
                }
            }
            DocumentRequest::UpdateOne { filter, set, .. } => {
                let escapes = field_conditions(&arg.filter).into_iter().any(|(field, condition)| {
                    set.get(field)
                        .is_some_and(|value| !matches_condition(Some(value), condition))
                });
                if escapes {
                    return Err(GateError::denied(CODE));
                }
                and_combine(filter, &arg.filter);
            }
            other => {
                if let Some(filter) = other.filter_mut() {
                    and_combine(filter, &arg.filter);
                }
            }
        }
        next.run(request, caller).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;
    use crate::registry::RegistryBuilder;
    use mycelia_core::ErrorKind;
    use mycelia_policy::{PolicySet, Principal};
    use std::sync::Arc;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn gate() -> Gate {
        let registry = RegistryBuilder::new().with(Documents::new()).unwrap().build();
        Gate::new(Arc::new(registry))
    }

    fn caller(gate: &Gate, policies: Value) -> Caller {
        let policies: PolicySet = serde_json::from_value(policies).unwrap();
        gate.bind(Principal::new("tester", policies))
    }

    fn admin(gate: &Gate) -> Caller {
        caller(gate, json!([{ "resource": "**", "action": "*", "effect": "allow" }]))
    }

    #[test]
    fn test_matches_filter() {
        let d = doc(json!({ "role": "user", "name": "a" }));
        assert!(matches_filter(&d, &Document::new()));
        assert!(matches_filter(&d, &doc(json!({ "role": "user" }))));
        assert!(!matches_filter(&d, &doc(json!({ "role": "admin" }))));
        assert!(!matches_filter(&d, &doc(json!({ "missing": 1 }))));
        assert!(matches_filter(
            &d,
            &doc(json!({ "$and": [{ "role": "user" }, { "name": "a" }] }))
        ));
        assert!(!matches_filter(
            &d,
            &doc(json!({ "$and": [{ "role": "user" }, { "name": "b" }] }))
        ));
    }

    #[test]
    fn test_check_filter() {
        assert!(check_filter(&doc(json!({ "a": 1 }))).is_ok());
        assert!(check_filter(&doc(json!({ "$and": [{ "a": 1 }] }))).is_ok());
        assert!(check_filter(&doc(json!({ "$or": [] }))).is_err());
        assert!(check_filter(&doc(json!({ "$and": {} }))).is_err());
        assert!(check_filter(&doc(json!({ "$and": [1] }))).is_err());
    }

    #[test]
    fn test_check_filter_field_operators() {
        assert!(check_filter(&doc(json!({ "start": { "$gte": 1, "$lt": 9 } }))).is_ok());
        assert!(check_filter(&doc(json!({ "at": { "$date": "2024-01-01T00:00:00Z" } }))).is_ok());
        assert!(check_filter(&doc(json!({ "role": { "$in": ["a", "b"] } }))).is_ok());
        assert!(check_filter(&doc(json!({ "nested": { "plain": 1 } }))).is_ok());

        assert!(check_filter(&doc(json!({ "start": { "$regex": "x" } }))).is_err());
        assert!(check_filter(&doc(json!({ "role": { "$in": "a" } }))).is_err());
        assert!(check_filter(&doc(json!({ "$and": [{ "n": { "$where": 1 } }] }))).is_err());
    }

    #[test]
    fn test_matches_filter_comparisons() {
        let d = doc(json!({
            "start": 5,
            "role": "user",
            "at": { "$date": "2024-03-01T00:00:00Z" }
        }));
        assert!(matches_filter(&d, &doc(json!({ "start": { "$gte": 5 } }))));
        assert!(matches_filter(&d, &doc(json!({ "start": { "$gt": 1, "$lt": 6.5 } }))));
        assert!(!matches_filter(&d, &doc(json!({ "start": { "$lt": 5 } }))));
        assert!(!matches_filter(&d, &doc(json!({ "start": { "$gt": "1" } }))));
        assert!(matches_filter(&d, &doc(json!({ "role": { "$ne": "admin" } }))));
        assert!(matches_filter(&d, &doc(json!({ "missing": { "$ne": 1 } }))));
        assert!(matches_filter(&d, &doc(json!({ "role": { "$in": ["user", "guest"] } }))));
        assert!(!matches_filter(&d, &doc(json!({ "role": { "$nin": ["user"] } }))));
        assert!(!matches_filter(&d, &doc(json!({ "missing": { "$gte": 0 } }))));
        assert!(matches_filter(
            &d,
            &doc(json!({ "at": { "$gte": { "$date": "2024-01-01T00:00:00Z" } } }))
        ));
        assert!(!matches_filter(
            &d,
            &doc(json!({ "at": { "$lt": { "$date": "2024-01-01T00:00:00Z" } } }))
        ));
        assert!(matches_filter(
            &d,
            &doc(json!({ "at": { "$date": "2024-03-01T00:00:00Z" } }))
        ));
    }

    #[test]
    fn test_response_wire_shapes() {
        let stored = doc(json!({ "_id": 1, "role": "user" }));
        let cases = [
            (DocumentResponse::Count(Counted { count: 3 }), json!({ "count": 3 })),
            (
                DocumentResponse::Inserted(Inserted {
                    inserted: stored.clone(),
                }),
                json!({ "inserted": { "_id": 1, "role": "user" } }),
            ),
            (
                DocumentResponse::Updated(Updated {
                    matched: 1,
                    modified: 0,
                }),
                json!({ "matched": 1, "modified": 0 }),
            ),
            (DocumentResponse::Deleted(Deleted { deleted: 1 }), json!({ "deleted": 1 })),
            (
                DocumentResponse::Documents(vec![stored.clone()]),
                json!([{ "_id": 1, "role": "user" }]),
            ),
            (DocumentResponse::Documents(Vec::new()), json!([])),
            (
                DocumentResponse::Document(Some(stored)),
                json!({ "_id": 1, "role": "user" }),
            ),
            (DocumentResponse::Document(None), Value::Null),
        ];
        for (response, wire) in cases {
            assert_eq!(serde_json::to_value(&response).unwrap(), wire);
            let decoded: DocumentResponse = serde_json::from_value(wire).unwrap();
            assert_eq!(decoded, response);
        }

        // a document that merely contains a summary field is still a document
        let decoded: DocumentResponse =
            serde_json::from_value(json!({ "count": 3, "name": "a" })).unwrap();
        assert!(matches!(decoded, DocumentResponse::Document(Some(_))));
    }

    #[test]
    fn test_and_combine() {
        let mut filter = Document::new();
        and_combine(&mut filter, &doc(json!({ "role": "user" })));
        assert_eq!(filter, doc(json!({ "role": "user" })));

        let mut filter = doc(json!({ "role": "admin" }));
        and_combine(&mut filter, &doc(json!({ "role": "user" })));
        assert_eq!(
            filter,
            doc(json!({ "$and": [{ "role": "admin" }, { "role": "user" }] }))
        );
        assert!(!matches_filter(&doc(json!({ "role": "admin" })), &filter));
    }

    #[test]
    fn test_request_actions() {
        let find: DocumentRequest =
            serde_json::from_value(json!({ "action": "find", "collection": "users" })).unwrap();
        assert_eq!(find.action(), "read");
        assert_eq!(
            Documents::new().extract_actions(&find),
            vec![ActionRecord::at(["db", "users"]).with_action("read")]
        );

        let delete: DocumentRequest =
            serde_json::from_value(json!({ "action": "deleteOne", "collection": "users" }))
                .unwrap();
        assert_eq!(delete.action(), "delete");
    }

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let gate = gate();
        let caller = admin(&gate);

        let inserted = caller
            .invoke(
                CODE,
                json!({ "action": "insertOne", "collection": "users", "doc": { "name": "a" } }),
            )
            .await
            .unwrap();
        assert_eq!(inserted["inserted"]["_id"], 1);

        let updated = caller
            .invoke(
                CODE,
                json!({
                    "action": "updateOne",
                    "collection": "users",
                    "filter": { "name": "a" },
                    "set": { "age": 3 }
                }),
            )
            .await
            .unwrap();
        assert_eq!(updated, json!({ "matched": 1, "modified": 1 }));

        let found = caller
            .invoke(
                CODE,
                json!({ "action": "findOne", "collection": "users", "filter": { "age": 3 } }),
            )
            .await
            .unwrap();
        assert_eq!(found["name"], "a");

        let deleted = caller
            .invoke(CODE, json!({ "action": "deleteMany", "collection": "users" }))
            .await
            .unwrap();
        assert_eq!(deleted, json!({ "deleted": 1 }));

        let count = caller
            .invoke(CODE, json!({ "action": "count", "collection": "users" }))
            .await
            .unwrap();
        assert_eq!(count, json!({ "count": 0 }));
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let gate = gate();
        let caller = admin(&gate);

        for input in [
            json!({ "action": "drop", "collection": "users" }),
            json!({ "action": "find" }),
            json!({ "action": "find", "collection": "a/b" }),
            json!({ "action": "find", "collection": "users", "filter": { "$where": "1" } }),
            json!({ "action": "updateOne", "collection": "users", "set": { "_id": 9 } }),
        ] {
            let err = caller.invoke(CODE, input).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[tokio::test]
    async fn test_delete_denied_find_allowed() {
        let gate = gate();
        admin(&gate)
            .invoke(
                CODE,
                json!({ "action": "insertOne", "collection": "users", "doc": { "name": "a" } }),
            )
            .await
            .unwrap();

        let caller = caller(
            &gate,
            json!([
                { "resource": "db/*", "action": "delete", "effect": "deny" },
                { "resource": "db/*", "action": "*", "effect": "allow" }
            ]),
        );

        let err = caller
            .invoke(
                CODE,
                json!({ "action": "deleteOne", "collection": "users", "filter": { "name": "a" } }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let found = caller
            .invoke(CODE, json!({ "action": "find", "collection": "users" }))
            .await
            .unwrap();
        assert_eq!(found.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_filter_modifier_guards_inserts() {
        let gate = gate();
        let caller = caller(
            &gate,
            json!([{
                "resource": "db/*",
                "action": "write",
                "effect": "modify",
                "modifier": { "code": "filter", "arg": { "filter": { "role": "user" } } }
            }]),
        );

        let err = caller
            .invoke(
                CODE,
                json!({ "action": "insertOne", "collection": "users", "doc": { "role": "admin" } }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let inserted = caller
            .invoke(
                CODE,
                json!({
                    "action": "insertOne",
                    "collection": "users",
                    "doc": { "_id": "u1", "role": "user" }
                }),
            )
            .await
            .unwrap();
        assert_eq!(inserted, json!({ "inserted": { "_id": "u1", "role": "user" } }));

        // only the user document was stored
        let all = admin(&gate)
            .invoke(CODE, json!({ "action": "find", "collection": "users" }))
            .await
            .unwrap();
        assert_eq!(all, json!([{ "_id": "u1", "role": "user" }]));
    }

    #[tokio::test]
    async fn test_filter_modifier_narrows_reads_and_updates() {
        let gate = gate();
        let admin = admin(&gate);
        for role in ["user", "admin"] {
            admin
                .invoke(
                    CODE,
                    json!({
                        "action": "insertOne",
                        "collection": "users",
                        "doc": { "role": role }
                    }),
                )
                .await
                .unwrap();
        }

        let scoped = caller(
            &gate,
            json!([{
                "resource": "db/users",
                "action": "*",
                "effect": "modify",
                "modifier": { "code": "filter", "arg": { "filter": { "role": "user" } } }
            }]),
        );

        let found = scoped
            .invoke(CODE, json!({ "action": "find", "collection": "users" }))
            .await
            .unwrap();
        assert_eq!(found.as_array().map(Vec::len), Some(1));
        assert_eq!(found[0]["role"], "user");

        let none = scoped
            .invoke(
                CODE,
                json!({
                    "action": "findOne",
                    "collection": "users",
                    "filter": { "role": "admin" }
                }),
            )
            .await
            .unwrap();
        assert_eq!(none, Value::Null);

        let err = scoped
            .invoke(
                CODE,
                json!({ "action": "updateOne", "collection": "users", "set": { "role": "admin" } }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let deleted = scoped
            .invoke(CODE, json!({ "action": "deleteMany", "collection": "users" }))
            .await
            .unwrap();
        assert_eq!(deleted, json!({ "deleted": 1 }));

        let remaining = admin
            .invoke(CODE, json!({ "action": "count", "collection": "users" }))
            .await
            .unwrap();
        assert_eq!(remaining, json!({ "count": 1 }));
    }

    #[tokio::test]
    async fn test_malformed_filter_arg_is_configuration_error() {
        let gate = gate();
        let caller = caller(
            &gate,
            json!([{
                "resource": "db/*",
                "action": "*",
                "effect": "modify",
                "modifier": { "code": "filter", "arg": { "filter": { "$or": [] } } }
            }]),
        );
        let err = caller
            .invoke(CODE, json!({ "action": "find", "collection": "users" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModifierConfiguration);
    }

    #[tokio::test]
    async fn test_range_filters() {
        let gate = gate();
        let caller = admin(&gate);
        for start in [1, 5, 9] {
            caller
                .invoke(
                    CODE,
                    json!({
                        "action": "insertOne",
                        "collection": "events",
                        "doc": { "start": start }
                    }),
                )
                .await
                .unwrap();
        }

        let found = caller
            .invoke(
                CODE,
                json!({
                    "action": "find",
                    "collection": "events",
                    "filter": { "start": { "$gte": 2, "$lt": 9 } }
                }),
            )
            .await
            .unwrap();
        assert_eq!(found.as_array().map(Vec::len), Some(1));
        assert_eq!(found[0]["start"], 5);

        let err = caller
            .invoke(
                CODE,
                json!({
                    "action": "find",
                    "collection": "events",
                    "filter": { "start": { "$near": 1 } }
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_typed_call_decodes_each_response() {
        let gate = gate();
        let caller = admin(&gate);

        let inserted: DocumentResponse = caller
            .call(CODE, &json!({ "action": "insertOne", "collection": "users", "doc": { "n": 1 } }))
            .await
            .unwrap();
        assert!(matches!(inserted, DocumentResponse::Inserted(_)));

        let counted: DocumentResponse = caller
            .call(CODE, &json!({ "action": "count", "collection": "users" }))
            .await
            .unwrap();
        assert_eq!(counted, DocumentResponse::Count(Counted { count: 1 }));

        let updated: DocumentResponse = caller
            .call(
                CODE,
                &json!({ "action": "updateOne", "collection": "users", "set": { "n": 1 } }),
            )
            .await
            .unwrap();
        assert_eq!(
            updated,
            DocumentResponse::Updated(Updated {
                matched: 1,
                modified: 0,
            })
        );

        let deleted: DocumentResponse = caller
            .call(CODE, &json!({ "action": "deleteOne", "collection": "users" }))
            .await
            .unwrap();
        assert_eq!(deleted, DocumentResponse::Deleted(Deleted { deleted: 1 }));
    }

    #[tokio::test]
    async fn test_filter_modifier_sees_through_and() {
        let gate = gate();
        let admin = admin(&gate);
        admin
            .invoke(
                CODE,
                json!({
                    "action": "insertOne",
                    "collection": "users",
                    "doc": { "n": 1, "role": "user" }
                }),
            )
            .await
            .unwrap();

        let scoped = caller(
            &gate,
            json!([{
                "resource": "db/users",
                "action": "*",
                "effect": "modify",
                "modifier": {
                    "code": "filter",
                    "arg": { "filter": { "$and": [{ "role": "user" }, { "n": { "$lt": 10 } }] } }
                }
            }]),
        );

        for set in [json!({ "role": "admin" }), json!({ "n": 50 })] {
            let err = scoped
                .invoke(CODE, json!({ "action": "updateOne", "collection": "users", "set": set }))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        }

        let updated = scoped
            .invoke(
                CODE,
                json!({ "action": "updateOne", "collection": "users", "set": { "n": 2 } }),
            )
            .await
            .unwrap();
        assert_eq!(updated, json!({ "matched": 1, "modified": 1 }));

        let stored = admin
            .invoke(CODE, json!({ "action": "find", "collection": "users" }))
            .await
            .unwrap();
        assert_eq!(stored, json!([{ "_id": 1, "n": 2, "role": "user" }]));
    }
}
