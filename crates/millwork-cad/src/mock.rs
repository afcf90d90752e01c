//! In-memory CAD document for deterministic testing.
//!
//! `MockCadConnector` answers every read from a document assembled with the
//! builder methods, and applies push scripts to it so that a push followed by
//! an extraction observes the pushed geometry.
//!
//! ```rust,ignore
//! use millwork_cad::mock::MockCadConnector;
//! use millwork_core::BoundingBox;
//!
//! let cad = MockCadConnector::new()
//!     .with_group("Austin-Van", BoundingBox::new([0.0; 3], [30.0, 21.0, 34.5]))
//!     .with_text("Austin Van", 15.0, 10.0);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::json;

use millwork_core::{
    BlockInstance, BoundingBox, CadConnector, CadLayer, DimensionAnnotation, DocumentInfo, Error,
    Result, ScriptOutput, TextLabel,
};

use crate::script::{parse_push_payload, PushPayload};

const CREATE_SIZE: (f64, f64, f64) = (36.0, 34.5, 24.0);

#[derive(Debug, Default)]
struct MockDocument {
    info: DocumentInfo,
    layers: Vec<CadLayer>,
    groups: BTreeMap<String, Option<BoundingBox>>,
    failing_groups: BTreeSet<String>,
    texts: Vec<TextLabel>,
    dims: Vec<DimensionAnnotation>,
    blocks: Vec<BlockInstance>,
    offline: bool,
    fail_scripts: bool,
    scripts: Vec<String>,
}

/// Mock CAD connector backed by an in-memory document.
#[derive(Debug, Default)]
pub struct MockCadConnector {
    doc: Mutex<MockDocument>,
}

impl MockCadConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn doc(&self) -> MutexGuard<'_, MockDocument> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn online(&self) -> Result<MutexGuard<'_, MockDocument>> {
        let doc = self.doc();
        if doc.offline {
            return Err(Error::ExternalBoundary(
                "CAD bridge unreachable: connection refused".into(),
            ));
        }
        Ok(doc)
    }

    pub fn with_document_name(self, name: &str) -> Self {
        self.doc().info.name = Some(name.to_string());
        self
    }

    pub fn with_layer(self, name: &str) -> Self {
        self.doc().layers.push(CadLayer {
            name: name.to_string(),
            visible: true,
            object_count: 0,
        });
        self
    }

    /// Add a group with its bounding box.
    pub fn with_group(self, name: &str, bbox: BoundingBox) -> Self {
        self.doc().groups.insert(name.to_string(), Some(bbox));
        self
    }

    /// Add a group with no geometry.
    pub fn with_empty_group(self, name: &str) -> Self {
        self.doc().groups.insert(name.to_string(), None);
        self
    }

    /// Add a group whose bounding box lookup fails.
    pub fn with_failing_group(self, name: &str) -> Self {
        let mut doc = self.doc();
        doc.groups.insert(name.to_string(), None);
        doc.failing_groups.insert(name.to_string());
        drop(doc);
        self
    }

    pub fn with_text(self, text: &str, x: f64, y: f64) -> Self {
        let mut doc = self.doc();
        let id = format!("text-{}", doc.texts.len() + 1);
        doc.texts.push(TextLabel {
            id,
            text: text.to_string(),
            x,
            y,
            z: 0.0,
            layer: None,
        });
        drop(doc);
        self
    }

    /// Add a linear dimension centred at (x, y).
    pub fn with_dimension(self, text: &str, value: Option<f64>, layer: Option<&str>, x: f64, y: f64) -> Self {
        let mut doc = self.doc();
        let id = format!("dim-{}", doc.dims.len() + 1);
        doc.dims.push(DimensionAnnotation {
            id,
            text: text.to_string(),
            value,
            layer: layer.map(str::to_string),
            center: Some([x, y, 0.0]),
        });
        drop(doc);
        self
    }

    pub fn with_block(self, block: BlockInstance) -> Self {
        self.doc().blocks.push(block);
        self
    }

    /// Make every call fail as if the bridge were down.
    pub fn set_offline(&self, offline: bool) {
        self.doc().offline = offline;
    }

    /// Make every script report failure.
    pub fn set_fail_scripts(&self, fail: bool) {
        self.doc().fail_scripts = fail;
    }

    /// Replace a group's geometry, simulating an edit made in the CAD tool.
    pub fn set_group_bbox(&self, name: &str, bbox: BoundingBox) {
        self.doc().groups.insert(name.to_string(), Some(bbox));
    }

    pub fn group_bbox(&self, name: &str) -> Option<BoundingBox> {
        self.doc().groups.get(name).copied().flatten()
    }

    pub fn group_count(&self) -> usize {
        self.doc().groups.len()
    }

    /// Every script executed so far, in order.
    pub fn executed_scripts(&self) -> Vec<String> {
        self.doc().scripts.clone()
    }

    fn apply_push(doc: &mut MockDocument, payload: &PushPayload) -> serde_json::Value {
        match doc.groups.get_mut(&payload.group) {
            Some(Some(bbox)) => {
                if let Some(w) = payload.width {
                    bbox.max[0] = bbox.min[0] + w;
                }
                if let Some(d) = payload.depth {
                    bbox.max[1] = bbox.min[1] + d;
                }
                if let Some(h) = payload.height {
                    bbox.max[2] = bbox.min[2] + h;
                }
                json!({"success": true, "operation": "update", "group": payload.group})
            }
            Some(None) => json!({"success": false, "error": "Could not get bounding box"}),
            None => {
                let (w, h, d) = CREATE_SIZE;
                let max = [
                    payload.width.unwrap_or(w),
                    payload.depth.unwrap_or(d),
                    payload.height.unwrap_or(h),
                ];
                doc.groups
                    .insert(payload.group.clone(), Some(BoundingBox::new([0.0; 3], max)));
                json!({"success": true, "operation": "create", "group": payload.group})
            }
        }
    }
}

#[async_trait]
impl CadConnector for MockCadConnector {
    async fn document_info(&self) -> Result<DocumentInfo> {
        let doc = self.online()?;
        let mut info = doc.info.clone();
        info.object_count = Some((doc.groups.len() + doc.texts.len() + doc.dims.len()) as u64);
        Ok(info)
    }

    async fn layers(&self) -> Result<Vec<CadLayer>> {
        Ok(self.online()?.layers.clone())
    }

    async fn groups(&self) -> Result<Vec<String>> {
        Ok(self.online()?.groups.keys().cloned().collect())
    }

    async fn group_bounding_box(&self, group: &str) -> Result<Option<BoundingBox>> {
        let doc = self.online()?;
        if doc.failing_groups.contains(group) {
            return Err(Error::ExternalBoundary(format!(
                "bounding box script failed for {group}"
            )));
        }
        Ok(doc.groups.get(group).copied().flatten())
    }

    async fn text_objects(&self) -> Result<Vec<TextLabel>> {
        Ok(self.online()?.texts.clone())
    }

    async fn dimensions(&self) -> Result<Vec<DimensionAnnotation>> {
        Ok(self.online()?.dims.clone())
    }

    async fn block_instances(&self) -> Result<Vec<BlockInstance>> {
        Ok(self.online()?.blocks.clone())
    }

    async fn execute_script(&self, script: &str, _timeout_secs: Option<u64>) -> Result<ScriptOutput> {
        let mut doc = self.online()?;
        doc.scripts.push(script.to_string());

        if doc.fail_scripts {
            return Ok(ScriptOutput {
                success: false,
                output: None,
                error: Some("script failed".into()),
                execution_time_ms: 0,
            });
        }

        let output = match parse_push_payload(script) {
            Some(payload) => Self::apply_push(&mut doc, &payload).to_string(),
            None => String::new(),
        };
        Ok(ScriptOutput {
            success: true,
            output: Some(output),
            error: None,
            execution_time_ms: 0,
        })
    }
}
