//! Backend payload normalization.
//!
//! # Responsibility
//! - Parse loosely shaped backend JSON into canonical `FetchedEntity` lists.
//! - Normalize either link-embedding direction into one `RowId -> LinkSet`
//!   snapshot.
//!
//! # Invariants
//! - A payload that matches no known shape is an error, never an empty list.
//! - Entity ids are unique per side.
//! - Links to entities missing from the fetched lists are dropped and counted.

use crate::model::entity::{EntityId, LinkEmbedding, MatrixEntity};
use crate::model::snapshot::Snapshot;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Envelope key used by list endpoints that wrap their payload.
const ENVELOPE_FIELD: &str = "data";

/// One fetched row or column with its optional embedded counterpart ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedEntity {
    pub entity: MatrixEntity,
    /// `None` when the payload does not embed links on this side.
    pub linked: Option<Vec<EntityId>>,
}

impl FetchedEntity {
    pub fn new(entity: MatrixEntity) -> Self {
        Self {
            entity,
            linked: None,
        }
    }

    pub fn with_links(entity: MatrixEntity, linked: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            entity,
            linked: Some(linked.into_iter().collect()),
        }
    }
}

/// Canonical matrix input produced from one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixSource {
    /// Identifies the fetch this data came from.
    pub generation: u64,
    pub rows: Vec<MatrixEntity>,
    pub columns: Vec<MatrixEntity>,
    pub links: Snapshot,
    pub report: NormalizeReport,
}

/// Diagnostics collected while normalizing one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Embedded links whose counterpart was not in the fetched lists.
    pub dropped_links: usize,
}

/// Errors from payload normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// Payload is neither a list, a `data` envelope, nor holds `expected`.
    UnrecognizedShape { expected: String },
    /// One list item cannot be read as an entity.
    InvalidItem { index: usize, message: String },
    /// The same id appears twice on one side.
    DuplicateEntity(EntityId),
    /// The embedding side carries no link field at all.
    MissingEmbeddedLinks(LinkEmbedding),
}

impl Display for NormalizeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnrecognizedShape { expected } => write!(
                f,
                "unrecognized payload shape: expected a list, a `{ENVELOPE_FIELD}` envelope or `{expected}`"
            ),
            Self::InvalidItem { index, message } => {
                write!(f, "invalid entity at index {index}: {message}")
            }
            Self::DuplicateEntity(id) => write!(f, "duplicate entity id: {id}"),
            Self::MissingEmbeddedLinks(embedding) => {
                write!(f, "payload carries no embedded links for {embedding:?}")
            }
        }
    }
}

impl Error for NormalizeError {}

#[derive(Debug, Deserialize)]
struct EntityDto {
    id: EntityId,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    order: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddedRef {
    Id(EntityId),
    Object { id: EntityId },
}

impl EmbeddedRef {
    fn id(&self) -> EntityId {
        match self {
            Self::Id(id) | Self::Object { id } => *id,
        }
    }
}

/// Parses one entity list from a backend payload.
///
/// Accepted shapes, tried in order:
/// - a bare array of entities;
/// - `{"data": [...]}`;
/// - `{"data": {"<list_field>": [...]}}`;
/// - `{"<list_field>": [...]}`.
///
/// `link_field` names the per-item array of embedded counterpart ids (plain
/// integers or objects with an `id`). Items without it get `linked = None`.
pub fn parse_entity_list(
    payload: &Value,
    list_field: &str,
    link_field: &str,
) -> Result<Vec<FetchedEntity>, NormalizeError> {
    let items = locate_list(payload, list_field).ok_or_else(|| {
        NormalizeError::UnrecognizedShape {
            expected: list_field.to_string(),
        }
    })?;

    let mut seen = BTreeSet::new();
    let mut entities = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let fetched = parse_entity(index, item, link_field)?;
        if !seen.insert(fetched.entity.id) {
            return Err(NormalizeError::DuplicateEntity(fetched.entity.id));
        }
        entities.push(fetched);
    }
    Ok(entities)
}

fn locate_list<'a>(payload: &'a Value, list_field: &str) -> Option<&'a Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => match map.get(ENVELOPE_FIELD) {
            Some(Value::Array(items)) => Some(items),
            Some(inner @ Value::Object(_)) => inner.get(list_field).and_then(Value::as_array),
            _ => map.get(list_field).and_then(Value::as_array),
        },
        _ => None,
    }
}

fn parse_entity(
    index: usize,
    item: &Value,
    link_field: &str,
) -> Result<FetchedEntity, NormalizeError> {
    let dto = EntityDto::deserialize(item).map_err(|err| NormalizeError::InvalidItem {
        index,
        message: err.to_string(),
    })?;

    let linked = match item.get(link_field) {
        None | Some(Value::Null) => None,
        Some(value) => {
            let refs = Vec::<EmbeddedRef>::deserialize(value).map_err(|err| {
                NormalizeError::InvalidItem {
                    index,
                    message: format!("`{link_field}`: {err}"),
                }
            })?;
            Some(refs.iter().map(EmbeddedRef::id).collect())
        }
    };

    let label = dto
        .name
        .or(dto.title)
        .or(dto.description)
        .unwrap_or_default();
    let code = dto
        .code
        .filter(|code| !code.trim().is_empty())
        .unwrap_or_else(|| format!("#{}", dto.id));

    Ok(FetchedEntity {
        entity: MatrixEntity {
            id: dto.id,
            code,
            label,
            position: dto.position.or(dto.order),
        },
        linked,
    })
}

/// Normalizes fetched rows/columns into one `RowId -> LinkSet` snapshot.
///
/// # Errors
/// - `DuplicateEntity` when one side repeats an id.
/// - `MissingEmbeddedLinks` when the embedding side is non-empty but no
///   entity on it carries a link list.
pub fn build_snapshot(
    rows: &[FetchedEntity],
    columns: &[FetchedEntity],
    embedding: LinkEmbedding,
) -> Result<(Snapshot, NormalizeReport), NormalizeError> {
    let row_ids = unique_ids(rows)?;
    let column_ids = unique_ids(columns)?;

    let owners = match embedding {
        LinkEmbedding::RowEmbedsColumns => rows,
        LinkEmbedding::ColumnEmbedsRows => columns,
    };
    if !owners.is_empty() && owners.iter().all(|owner| owner.linked.is_none()) {
        return Err(NormalizeError::MissingEmbeddedLinks(embedding));
    }

    let mut snapshot = Snapshot::new();
    let mut report = NormalizeReport::default();
    for owner in owners {
        for &other in owner.linked.iter().flatten() {
            let (row_id, column_id) = match embedding {
                LinkEmbedding::RowEmbedsColumns => (owner.entity.id, other),
                LinkEmbedding::ColumnEmbedsRows => (other, owner.entity.id),
            };
            if row_ids.contains(&row_id) && column_ids.contains(&column_id) {
                snapshot.insert(row_id, column_id);
            } else {
                report.dropped_links += 1;
            }
        }
    }
    Ok((snapshot, report))
}

/// Builds a `MatrixSource` from one fetch of rows and columns.
pub fn source_from_fetch(
    generation: u64,
    rows: Vec<FetchedEntity>,
    columns: Vec<FetchedEntity>,
    embedding: LinkEmbedding,
) -> Result<MatrixSource, NormalizeError> {
    let (links, report) = build_snapshot(&rows, &columns, embedding)?;
    Ok(MatrixSource {
        generation,
        rows: rows.into_iter().map(|fetched| fetched.entity).collect(),
        columns: columns.into_iter().map(|fetched| fetched.entity).collect(),
        links,
        report,
    })
}

fn unique_ids(entities: &[FetchedEntity]) -> Result<BTreeSet<EntityId>, NormalizeError> {
    let mut ids = BTreeSet::new();
    for fetched in entities {
        if !ids.insert(fetched.entity.id) {
            return Err(NormalizeError::DuplicateEntity(fetched.entity.id));
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::{build_snapshot, parse_entity_list, FetchedEntity, NormalizeError};
    use crate::model::entity::{LinkEmbedding, MatrixEntity};
    use crate::model::snapshot::Snapshot;
    use serde_json::json;

    #[test]
    fn parses_bare_list_with_object_and_integer_refs() {
        let payload = json!([
            {"id": 1, "code": "CH1", "name": "Intro", "learning_outcomes": [{"id": 10}, 11]},
            {"id": 2, "title": "Sets", "order": 3}
        ]);

        let parsed = parse_entity_list(&payload, "chapters", "learning_outcomes").unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].entity.code, "CH1");
        assert_eq!(parsed[0].linked, Some(vec![10, 11]));
        assert_eq!(parsed[1].entity.code, "#2");
        assert_eq!(parsed[1].entity.label, "Sets");
        assert_eq!(parsed[1].entity.position, Some(3));
        assert_eq!(parsed[1].linked, None);
    }

    #[test]
    fn parses_envelopes_and_named_lists() {
        let enveloped = json!({"data": [{"id": 5}]});
        let nested = json!({"data": {"plos": [{"id": 6}]}});
        let named = json!({"plos": [{"id": 7}], "total": 1});

        assert_eq!(parse_entity_list(&enveloped, "plos", "pos").unwrap()[0].entity.id, 5);
        assert_eq!(parse_entity_list(&nested, "plos", "pos").unwrap()[0].entity.id, 6);
        assert_eq!(parse_entity_list(&named, "plos", "pos").unwrap()[0].entity.id, 7);
    }

    #[test]
    fn unknown_shape_fails_loudly() {
        let err = parse_entity_list(&json!({"items": []}), "plos", "pos").unwrap_err();
        assert!(matches!(err, NormalizeError::UnrecognizedShape { .. }));

        let err = parse_entity_list(&json!("plos"), "plos", "pos").unwrap_err();
        assert!(matches!(err, NormalizeError::UnrecognizedShape { .. }));
    }

    #[test]
    fn invalid_items_and_duplicates_are_rejected() {
        let err = parse_entity_list(&json!([{"name": "no id"}]), "plos", "pos").unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidItem { index: 0, .. }));

        let err =
            parse_entity_list(&json!([{"id": 1, "pos": "x"}]), "plos", "pos").unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidItem { index: 0, .. }));

        let err = parse_entity_list(&json!([{"id": 1}, {"id": 1}]), "plos", "pos").unwrap_err();
        assert_eq!(err, NormalizeError::DuplicateEntity(1));
    }

    #[test]
    fn column_embedding_normalizes_to_row_keys_and_drops_orphans() {
        let rows = vec![
            FetchedEntity::new(MatrixEntity::new(1, "PO1", "")),
            FetchedEntity::new(MatrixEntity::new(2, "PO2", "")),
        ];
        let columns = vec![
            FetchedEntity::with_links(MatrixEntity::new(10, "PLO1", ""), [1, 2]),
            FetchedEntity::with_links(MatrixEntity::new(20, "PLO2", ""), [2, 99]),
        ];

        let (snapshot, report) =
            build_snapshot(&rows, &columns, LinkEmbedding::ColumnEmbedsRows).unwrap();

        assert_eq!(snapshot, Snapshot::from_pairs([(1, 10), (2, 10), (2, 20)]));
        assert_eq!(report.dropped_links, 1);
    }

    #[test]
    fn missing_embedded_links_is_an_error() {
        let rows = vec![FetchedEntity::new(MatrixEntity::new(1, "CH1", ""))];
        let columns = vec![FetchedEntity::new(MatrixEntity::new(10, "LO1", ""))];

        let err = build_snapshot(&rows, &columns, LinkEmbedding::RowEmbedsColumns).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::MissingEmbeddedLinks(LinkEmbedding::RowEmbedsColumns)
        );

        let (snapshot, _) = build_snapshot(&[], &columns, LinkEmbedding::RowEmbedsColumns).unwrap();
        assert_eq!(snapshot, Snapshot::new());
    }
}
