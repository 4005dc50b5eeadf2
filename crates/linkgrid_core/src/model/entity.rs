//! Row/column entities and association kinds.
//!
//! # Responsibility
//! - Describe one side of a many-to-many association (chapter, LO, PO, PLO,
//!   subject) in a backend-agnostic shape.
//! - Name which association a matrix edits and which side owns links.
//!
//! # Invariants
//! - `id` is assigned by the backend and never reused within one scope.
//! - Entities are read-only for the lifetime of one editing session.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable backend identifier for rows and columns.
pub type EntityId = i64;

/// One row or column of an association matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntity {
    pub id: EntityId,
    /// Short display code, e.g. `PLO2` or `CH1`.
    pub code: String,
    /// Human-readable name or description.
    pub label: String,
    /// Backend display order. `None` sorts after positioned entities.
    #[serde(default)]
    pub position: Option<i64>,
}

impl MatrixEntity {
    pub fn new(id: EntityId, code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            label: label.into(),
            position: None,
        }
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }
}

/// Row or column side of an association matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySide {
    Row,
    Column,
}

impl EntitySide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Row => "row",
            Self::Column => "column",
        }
    }
}

/// Which side of the association embeds linked ids in backend payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkEmbedding {
    /// Each row lists the column ids it links to.
    RowEmbedsColumns,
    /// Each column lists the row ids it links to.
    ColumnEmbedsRows,
}

/// Association edited by one matrix screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// Chapters (rows) × learning outcomes (columns) of one subject.
    ChapterLearningOutcome,
    /// Learning outcomes (rows) × program learning outcomes (columns).
    LearningOutcomePlo,
    /// Program objectives (rows) × program learning outcomes (columns).
    ProgramObjectivePlo,
    /// Subjects (rows) × program learning outcomes (columns).
    SubjectPlo,
}

impl LinkEmbedding {
    /// Side whose entities carry the embedded link lists.
    pub fn owner_side(self) -> EntitySide {
        match self {
            Self::RowEmbedsColumns => EntitySide::Row,
            Self::ColumnEmbedsRows => EntitySide::Column,
        }
    }
}

impl AssociationKind {
    pub const ALL: [AssociationKind; 4] = [
        Self::ChapterLearningOutcome,
        Self::LearningOutcomePlo,
        Self::ProgramObjectivePlo,
        Self::SubjectPlo,
    ];

    /// Stable storage/CLI name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChapterLearningOutcome => "chapter_learning_outcome",
            Self::LearningOutcomePlo => "learning_outcome_plo",
            Self::ProgramObjectivePlo => "program_objective_plo",
            Self::SubjectPlo => "subject_plo",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized.as_str())
    }

    /// Side that embeds links in the usual backend payload for this kind.
    ///
    /// Chapter payloads carry their learning outcomes; PLO payloads carry the
    /// objectives and subjects mapped onto them.
    pub fn default_embedding(self) -> LinkEmbedding {
        match self {
            Self::ChapterLearningOutcome | Self::LearningOutcomePlo => {
                LinkEmbedding::RowEmbedsColumns
            }
            Self::ProgramObjectivePlo | Self::SubjectPlo => LinkEmbedding::ColumnEmbedsRows,
        }
    }

    /// Field name holding the embedded links in backend payloads.
    pub fn embedded_field(self) -> &'static str {
        match self {
            Self::ChapterLearningOutcome => "learning_outcomes",
            Self::LearningOutcomePlo => "plos",
            Self::ProgramObjectivePlo => "pos",
            Self::SubjectPlo => "subjects",
        }
    }
}

impl Display for AssociationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one matrix: an association kind under one parent entity
/// (a subject for chapters/LOs, a program for POs/PLOs/subjects).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixScope {
    pub kind: AssociationKind,
    pub parent_id: EntityId,
}

impl MatrixScope {
    pub fn new(kind: AssociationKind, parent_id: EntityId) -> Self {
        Self { kind, parent_id }
    }
}

impl Display for MatrixScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.parent_id)
    }
}
