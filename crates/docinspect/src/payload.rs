//! The `labels_position` payload stored on every successful document.
//!
//! New rows are written as [`LabelsPayload::Challenge`], tagged with
//! `"shape": "challenge"`:
//!
//! ```json
//! {
//!   "shape": "challenge",
//!   "invoice_pdf": {
//!     "page_1": { "annotations": [{ "annotation_1": { ... } }], "page_size": { ... } },
//!     "original_name": "invoice.pdf",
//!     "artifacts": { "originalPdfUrl": "...", "pages": [ ... ] }
//!   }
//! }
//! ```
//!
//! Older rows exist in untagged forms; [`LabelsPayload::normalize`] reads all
//! of them.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::detect::{Category, Detection};
use crate::sanitize;

pub const SHAPE_FIELD: &str = "shape";

const PAGE_PREFIX: &str = "page_";
const ANNOTATION_PREFIX: &str = "annotation_";
const ORIGINAL_NAME: &str = "original_name";
const ARTIFACTS: &str = "artifacts";
const DETECTIONS: &str = "detections";

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Unrecognized labels payload shape")]
    UnrecognizedShape,

    #[error("Malformed labels payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum LabelsPayload {
    Challenge(ChallengePayload),
    Legacy(LegacyPayload),
}

/// One document's labels under its sanitized key.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengePayload {
    pub key: String,
    pub document: DocumentLabels,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentLabels {
    /// Keyed by 1-based page index.
    pub pages: BTreeMap<u32, PageLabels>,
    pub original_name: Option<String>,
    pub artifacts: Option<Artifacts>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageLabels {
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<PageSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: u32,
    pub height: u32,
}

/// Serialized as a single-entry map `{"annotation_<number>": {...}}`.
/// Numbers run across the whole document, not per page.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub number: u32,
    pub body: AnnotationBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationBody {
    pub category: String,
    pub bbox: BBox,
    pub area: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    pub original_pdf_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeled_pdf_url: Option<String>,
    #[serde(default)]
    pub pages: Vec<PageArtifacts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageArtifacts {
    pub page_index: u32,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeled_image_url: Option<String>,
}

/// `{artifacts, detections}` rows, with detections keyed by page number string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPayload {
    pub artifacts: Artifacts,
    pub detections: BTreeMap<String, Vec<LegacyDetection>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDetection {
    pub category: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub area: f64,
    pub confidence: f64,
}

impl From<&Detection> for AnnotationBody {
    fn from(det: &Detection) -> Self {
        Self {
            category: det.category.as_str().to_string(),
            bbox: BBox {
                x: det.x,
                y: det.y,
                width: det.width,
                height: det.height,
            },
            area: det.area,
            confidence: det.confidence,
        }
    }
}

impl LabelsPayload {
    pub fn challenge(key: impl Into<String>, document: DocumentLabels) -> Self {
        LabelsPayload::Challenge(ChallengePayload {
            key: key.into(),
            document,
        })
    }

    /// Reads a stored payload in any shape that has ever been written.
    ///
    /// Recognised, in order: the tagged form; the legacy
    /// `{artifacts, detections}` form; an untagged document at the root
    /// (page keys or `original_name` present); an untagged document nested
    /// under a single key.
    pub fn normalize(value: &Value) -> Result<Self, PayloadError> {
        let Some(obj) = value.as_object() else {
            return Err(PayloadError::UnrecognizedShape);
        };

        if obj.contains_key(SHAPE_FIELD) {
            return Ok(serde_json::from_value(value.clone())?);
        }

        if obj.contains_key(ARTIFACTS) && obj.contains_key(DETECTIONS) {
            let legacy: LegacyPayload = serde_json::from_value(value.clone())?;
            return Ok(LabelsPayload::Legacy(legacy));
        }

        if looks_like_document(obj) {
            let document = DocumentLabels::from_map(obj.clone())?;
            let key = sanitize::payload_key(document.original_name.as_deref().unwrap_or("document"));
            return Ok(LabelsPayload::challenge(key, document));
        }

        if obj.len() == 1 {
            if let Some((key, Value::Object(inner))) = obj.iter().next() {
                if looks_like_document(inner) {
                    let document = DocumentLabels::from_map(inner.clone())?;
                    return Ok(LabelsPayload::challenge(key.clone(), document));
                }
            }
        }

        Err(PayloadError::UnrecognizedShape)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn artifacts(&self) -> Option<&Artifacts> {
        match self {
            LabelsPayload::Challenge(c) => c.document.artifacts.as_ref(),
            LabelsPayload::Legacy(l) => Some(&l.artifacts),
        }
    }

    pub fn original_pdf_url(&self) -> Option<&str> {
        self.artifacts()
            .map(|a| a.original_pdf_url.as_str())
            .filter(|url| !url.is_empty())
    }

    pub fn labeled_pdf_url(&self) -> Option<&str> {
        self.artifacts().and_then(|a| a.labeled_pdf_url.as_deref())
    }

    pub fn original_name(&self) -> Option<&str> {
        match self {
            LabelsPayload::Challenge(c) => c.document.original_name.as_deref(),
            LabelsPayload::Legacy(_) => None,
        }
    }

    /// Page entries only, keyed `page_<n>`. Legacy detections are renumbered
    /// into annotations.
    pub fn pages_map(&self) -> Map<String, Value> {
        let pages = match self {
            LabelsPayload::Challenge(c) => c.document.pages.clone(),
            LabelsPayload::Legacy(l) => legacy_pages(&l.detections),
        };
        pages
            .into_iter()
            .filter_map(|(index, page)| {
                serde_json::to_value(page)
                    .ok()
                    .map(|v| (page_key(index), v))
            })
            .collect()
    }
}

fn legacy_pages(detections: &BTreeMap<String, Vec<LegacyDetection>>) -> BTreeMap<u32, PageLabels> {
    let mut indexed: Vec<(u32, &Vec<LegacyDetection>)> = detections
        .iter()
        .filter_map(|(k, v)| k.parse::<u32>().ok().map(|n| (n, v)))
        .collect();
    indexed.sort_by_key(|(n, _)| *n);

    let mut number = 0u32;
    indexed
        .into_iter()
        .map(|(index, dets)| {
            let annotations = dets
                .iter()
                .map(|d| {
                    number += 1;
                    Annotation {
                        number,
                        body: AnnotationBody {
                            category: d.category.clone(),
                            bbox: BBox {
                                x: d.x,
                                y: d.y,
                                width: d.width,
                                height: d.height,
                            },
                            area: d.area,
                            confidence: d.confidence,
                        },
                    }
                })
                .collect();
            (
                index,
                PageLabels {
                    annotations,
                    page_size: None,
                },
            )
        })
        .collect()
}

fn looks_like_document(obj: &Map<String, Value>) -> bool {
    obj.contains_key(ORIGINAL_NAME) || obj.keys().any(|k| parse_page_key(k).is_some())
}

pub fn page_key(index: u32) -> String {
    format!("{PAGE_PREFIX}{index}")
}

fn parse_page_key(key: &str) -> Option<u32> {
    key.strip_prefix(PAGE_PREFIX)?.parse().ok()
}

impl DocumentLabels {
    fn from_map(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut doc = DocumentLabels::default();
        for (key, value) in map {
            if key == ORIGINAL_NAME {
                doc.original_name = serde_json::from_value(value)?;
            } else if key == ARTIFACTS {
                doc.artifacts = serde_json::from_value(value)?;
            } else if let Some(index) = parse_page_key(&key) {
                doc.pages.insert(index, serde_json::from_value(value)?);
            }
        }
        Ok(doc)
    }

    /// Whether any page carries an annotation of `category`.
    pub fn has_category(&self, category: Category) -> bool {
        self.pages
            .values()
            .flat_map(|p| &p.annotations)
            .any(|a| a.body.category == category.as_str())
    }
}

impl Serialize for DocumentLabels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.original_name.is_some()) + usize::from(self.artifacts.is_some());
        let mut map = serializer.serialize_map(Some(self.pages.len() + extra))?;
        for (index, page) in &self.pages {
            map.serialize_entry(&page_key(*index), page)?;
        }
        if let Some(name) = &self.original_name {
            map.serialize_entry(ORIGINAL_NAME, name)?;
        }
        if let Some(artifacts) = &self.artifacts {
            map.serialize_entry(ARTIFACTS, artifacts)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DocumentLabels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::deserialize(deserializer)?;
        DocumentLabels::from_map(map).map_err(D::Error::custom)
    }
}

impl Serialize for ChallengePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.key, &self.document)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ChallengePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<String, DocumentLabels>::deserialize(deserializer)?;
        let mut iter = entries.into_iter();
        match (iter.next(), iter.next()) {
            (Some((key, document)), None) => Ok(ChallengePayload { key, document }),
            _ => Err(D::Error::custom(
                "challenge payload must hold exactly one document",
            )),
        }
    }
}

impl Serialize for Annotation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&format!("{ANNOTATION_PREFIX}{}", self.number), &self.body)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Annotation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<String, AnnotationBody>::deserialize(deserializer)?;
        let mut iter = entries.into_iter();
        let (Some((key, body)), None) = (iter.next(), iter.next()) else {
            return Err(D::Error::custom("annotation must be a single-entry map"));
        };
        let number = key
            .strip_prefix(ANNOTATION_PREFIX)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| D::Error::custom(format!("invalid annotation key '{key}'")))?;
        Ok(Annotation { number, body })
    }
}
