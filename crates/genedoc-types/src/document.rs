use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::DocId;

/// Field map of a document, keyed in sorted order.
pub type Fields = serde_json::Map<String, Value>;

/// Field holding the NCBI taxonomy id of a gene; species filters apply to it.
pub const SPECIES_FIELD: &str = "taxid";

/// Key under which the document id is serialized.
pub const ID_FIELD: &str = "_id";

/// A gene document: an id plus an open set of fields.
///
/// The same shape is used on both sides of a build. Parsed source documents
/// carry their native id; canonical documents carry the canonical id. On the
/// wire the id lives under `_id` next to the fields:
///
/// ```
/// use genedoc_types::Document;
///
/// let doc: Document = serde_json::from_str(r#"{"_id": 1017, "symbol": "CDK2"}"#).unwrap();
/// assert_eq!(doc.id.as_str(), "1017");
/// assert_eq!(doc.fields["symbol"], "CDK2");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocId,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<DocId>, mut fields: Fields) -> Self {
        fields.remove(ID_FIELD);
        Self {
            id: id.into(),
            fields,
        }
    }

    /// A document with no fields.
    pub fn empty(id: impl Into<DocId>) -> Self {
        Self::new(id, Fields::new())
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Taxonomy id, if the document carries an integer `taxid`.
    pub fn species(&self) -> Option<i64> {
        self.fields.get(SPECIES_FIELD).and_then(Value::as_i64)
    }

    /// Fields with any stray `_id` key removed.
    pub fn into_fields(mut self) -> Fields {
        self.fields.remove(ID_FIELD);
        self.fields
    }
}
