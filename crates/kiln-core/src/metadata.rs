//! Metadata blocks attached to models and their resolution.
//!
//! A model can carry two metadata blocks: the nested block declared next to
//! the model (which may itself wrap an inner `metadata` block) and a
//! file-level block. [`resolve_metadata`] collapses them into a single
//! [`ResolvedMetadata`] value using a fixed priority order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::Materialization;
use crate::error::{CoreError, CoreResult};
use crate::incremental::IncrementalConfig;
use crate::model::ParsedModel;

/// Longest description accepted for a relation or column
pub const MAX_DESCRIPTION_LEN: usize = 4000;

/// Typed shape shared by the nested and file-level metadata blocks
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materialization: Option<Materialization>,

    /// Column list, kept raw so its shape can be validated before use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub object_tags: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental: Option<IncrementalConfig>,

    /// Storage location for external tables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Inner block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Box<MetadataBlock>>,
}

impl MetadataBlock {
    fn inner(&self) -> Option<&MetadataBlock> {
        self.metadata.as_deref()
    }
}

/// Column documentation resolved for a relation
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColumnMetadata {
    pub description: Option<String>,
    pub schema: serde_json::Value,
    pub tags: Vec<String>,
    pub object_tags: BTreeMap<String, String>,
}

/// Incremental settings resolved for a model
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct IncrementalMetadata {
    pub description: Option<String>,
    pub config: IncrementalConfig,
    pub schema: Option<serde_json::Value>,
    pub tags: Vec<String>,
    pub object_tags: BTreeMap<String, String>,
}

/// Result of [`resolve_metadata`]
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedMetadata {
    /// No usable metadata; not an error
    #[default]
    None,
    Columns(ColumnMetadata),
    Incremental(IncrementalMetadata),
}

impl ResolvedMetadata {
    /// Relation description, if any
    pub fn description(&self) -> Option<&str> {
        match self {
            ResolvedMetadata::None => None,
            ResolvedMetadata::Columns(c) => c.description.as_deref(),
            ResolvedMetadata::Incremental(i) => i.description.as_deref(),
        }
    }

    /// Raw column schema, if any
    pub fn schema(&self) -> Option<&serde_json::Value> {
        match self {
            ResolvedMetadata::None => None,
            ResolvedMetadata::Columns(c) => Some(&c.schema),
            ResolvedMetadata::Incremental(i) => i.schema.as_ref(),
        }
    }

    pub fn incremental(&self) -> Option<&IncrementalConfig> {
        match self {
            ResolvedMetadata::Incremental(i) => Some(&i.config),
            _ => None,
        }
    }
}

/// Tags and object tags collected across every block of a model
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagSet {
    pub tags: Vec<String>,
    pub object_tags: BTreeMap<String, String>,
}

impl TagSet {
    /// Merge tags (dedup, order kept) and object tags (existing keys win)
    fn absorb(&mut self, block: &MetadataBlock) {
        for tag in &block.tags {
            if !self.tags.contains(tag) {
                self.tags.push(tag.clone());
            }
        }
        for (k, v) in &block.object_tags {
            self.object_tags
                .entry(k.clone())
                .or_insert_with(|| v.clone());
        }
    }

    fn absorb_nested(&mut self, nested: Option<&MetadataBlock>) {
        if let Some(block) = nested {
            self.absorb(block);
            if let Some(inner) = block.inner() {
                self.absorb(inner);
            }
        }
    }
}

/// Resolve a model's metadata blocks into one tagged value.
///
/// Priority, first match wins:
/// 1. nested block declaring `materialization: incremental`
/// 2. nested block with a `schema`
/// 3. the nested block's inner `metadata.schema`
/// 4. file-level block with a `schema`
///
/// Tags from the nested block and its inner block are merged into every
/// non-`None` result. Resolution is pure.
pub fn resolve_metadata(model: &ParsedModel) -> ResolvedMetadata {
    let nested = model.metadata.as_ref();
    let outer_description = model.description.as_deref();

    if let Some(block) = nested {
        let inner = block.inner();

        if block.materialization == Some(Materialization::Incremental) {
            let mut tags = TagSet::default();
            tags.absorb_nested(Some(block));
            return ResolvedMetadata::Incremental(IncrementalMetadata {
                description: pick_description(block, outer_description),
                config: declared_incremental(model).unwrap_or_default(),
                schema: block
                    .schema
                    .clone()
                    .or_else(|| inner.and_then(|i| i.schema.clone())),
                tags: tags.tags,
                object_tags: tags.object_tags,
            });
        }

        let schema_source = if block.schema.is_some() {
            Some(block)
        } else {
            inner.filter(|i| i.schema.is_some())
        };

        if let Some(source) = schema_source {
            let mut tags = TagSet::default();
            tags.absorb_nested(Some(block));
            return ResolvedMetadata::Columns(ColumnMetadata {
                description: block
                    .description
                    .clone()
                    .or_else(|| pick_description(source, outer_description)),
                schema: source.schema.clone().unwrap_or_default(),
                tags: tags.tags,
                object_tags: tags.object_tags,
            });
        }
    }

    if let Some(file) = model.file_metadata.as_ref() {
        if let Some(schema) = file.schema.as_ref() {
            let mut tags = TagSet::default();
            tags.absorb(file);
            tags.absorb_nested(nested);
            return ResolvedMetadata::Columns(ColumnMetadata {
                description: pick_description(file, outer_description),
                schema: schema.clone(),
                tags: tags.tags,
                object_tags: tags.object_tags,
            });
        }
    }

    ResolvedMetadata::None
}

fn pick_description(block: &MetadataBlock, outer: Option<&str>) -> Option<String> {
    block
        .description
        .clone()
        .or_else(|| outer.map(str::to_string))
}

/// Every block of the model that may declare settings, most specific first
fn blocks(model: &ParsedModel) -> impl Iterator<Item = &MetadataBlock> {
    let nested = model.metadata.as_ref();
    nested
        .into_iter()
        .chain(nested.and_then(MetadataBlock::inner))
        .chain(model.file_metadata.as_ref())
}

/// Decide the materialization kind of a model.
///
/// An incremental resolution always wins. Otherwise the first declared
/// kind among the nested block, its inner block, the file block and the
/// model itself is used, falling back to the project default.
pub fn resolve_materialization(
    model: &ParsedModel,
    resolved: &ResolvedMetadata,
    default: Materialization,
) -> Materialization {
    if matches!(resolved, ResolvedMetadata::Incremental(_)) {
        return Materialization::Incremental;
    }
    blocks(model)
        .find_map(|b| b.materialization)
        .or(model.materialization)
        .unwrap_or(default)
}

/// First incremental config declared by the nested block, its inner block
/// or the file block
fn declared_incremental(model: &ParsedModel) -> Option<IncrementalConfig> {
    blocks(model).find_map(|b| b.incremental.clone())
}

/// Incremental config of a model, wherever it was declared.
///
/// A declared config always wins over the default carried by an
/// incremental resolution.
pub fn resolve_incremental_config(
    model: &ParsedModel,
    resolved: &ResolvedMetadata,
) -> IncrementalConfig {
    declared_incremental(model)
        .or_else(|| resolved.incremental().cloned())
        .unwrap_or_default()
}

/// External table location, wherever it was declared
pub fn resolve_location(model: &ParsedModel) -> Option<String> {
    blocks(model).find_map(|b| b.location.clone())
}

/// All tags and object tags declared on a model, for tag attachment
pub fn collect_tags(model: &ParsedModel) -> TagSet {
    let mut tags = TagSet::default();
    tags.absorb_nested(model.metadata.as_ref());
    if let Some(file) = model.file_metadata.as_ref() {
        tags.absorb(file);
    }
    tags
}

/// Documentation for one column
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Schema tests declared on the column (`unique`, `not_null`, `accepted_values`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<serde_json::Value>,
}

/// Validated documentation for a relation
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RelationDocs {
    pub description: Option<String>,
    pub columns: Vec<ColumnDoc>,
}

impl RelationDocs {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.columns.iter().all(|c| c.description.is_none())
    }
}

/// Validate a raw column schema and turn it into [`RelationDocs`].
///
/// The schema must be a list of objects, each with a string `name`.
/// Descriptions longer than [`MAX_DESCRIPTION_LEN`] characters are rejected.
pub fn validate_columns(
    name: &str,
    schema: &serde_json::Value,
    description: Option<&str>,
) -> CoreResult<RelationDocs> {
    let invalid = |reason: String| CoreError::MetadataValidation {
        name: name.to_string(),
        reason,
    };

    if let Some(desc) = description {
        check_description_len(desc).map_err(|len| {
            invalid(format!(
                "description is {} characters, limit is {}",
                len, MAX_DESCRIPTION_LEN
            ))
        })?;
    }

    let entries = schema
        .as_array()
        .ok_or_else(|| invalid("schema must be a list of columns".to_string()))?;

    let mut columns = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let obj = entry
            .as_object()
            .ok_or_else(|| invalid(format!("column #{} is not an object", idx + 1)))?;
        let col_name = obj
            .get("name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid(format!("column #{} has no string 'name'", idx + 1)))?;

        let col_description = match obj.get("description") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => {
                check_description_len(s).map_err(|len| {
                    invalid(format!(
                        "description of column '{}' is {} characters, limit is {}",
                        col_name, len, MAX_DESCRIPTION_LEN
                    ))
                })?;
                Some(s.clone())
            }
            Some(_) => {
                return Err(invalid(format!(
                    "description of column '{}' is not a string",
                    col_name
                )))
            }
        };

        let data_type = obj
            .get("data_type")
            .or_else(|| obj.get("type"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let tests = obj
            .get("tests")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        columns.push(ColumnDoc {
            name: col_name.to_string(),
            description: col_description,
            data_type,
            tests,
        });
    }

    Ok(RelationDocs {
        description: description.map(str::to_string),
        columns,
    })
}

fn check_description_len(s: &str) -> Result<(), usize> {
    let len = s.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        Err(len)
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[path = "metadata_test.rs"]
mod tests;
