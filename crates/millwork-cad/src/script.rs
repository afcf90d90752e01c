//! Python scripts run inside the CAD tool, and parsers for what they print.
//!
//! Every script prints exactly one JSON document. Values supplied by callers
//! are never spliced into Python source directly: they travel as a JSON
//! string literal decoded by `json.loads`, which is valid Python syntax for
//! any input.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use millwork_core::{Error, Result};

/// Marker on the first line of a push script.
pub const PUSH_MARKER: &str = "# millwork:push";

const PAYLOAD_PREFIX: &str = "payload = json.loads(";

/// Default box size when a pushed cabinet has no value for an axis.
const CREATE_DEFAULTS: (f64, f64, f64) = (36.0, 34.5, 24.0);

pub const GROUPS_SCRIPT: &str = r#"import rhinoscriptsyntax as rs
import json

groups = rs.GroupNames()
print(json.dumps(sorted(groups) if groups else []))
"#;

pub const LAYERS_SCRIPT: &str = r#"import rhinoscriptsyntax as rs
import json

layers = []
for layer_name in rs.LayerNames():
    layers.append({
        'name': layer_name,
        'visible': rs.LayerVisible(layer_name),
        'object_count': len(rs.ObjectsByLayer(layer_name) or [])
    })
print(json.dumps(layers))
"#;

pub const TEXT_OBJECTS_SCRIPT: &str = r#"import rhinoscriptsyntax as rs
import json

texts = []
for obj in rs.AllObjects():
    if rs.IsText(obj):
        pt = rs.TextObjectPoint(obj)
        texts.append({
            'id': str(obj),
            'text': rs.TextObjectText(obj) or '',
            'x': pt[0] if pt else 0,
            'y': pt[1] if pt else 0,
            'z': pt[2] if pt else 0,
            'layer': rs.ObjectLayer(obj)
        })
print(json.dumps(texts))
"#;

pub const DIMENSIONS_SCRIPT: &str = r#"import rhinoscriptsyntax as rs
import json

dims = []
for obj in rs.AllObjects():
    try:
        if rs.IsLinearDimension(obj):
            bbox = rs.BoundingBox([obj])
            center = None
            if bbox and len(bbox) >= 7:
                center = [(bbox[0][0] + bbox[6][0]) / 2, (bbox[0][1] + bbox[6][1]) / 2, 0]
            dims.append({
                'id': str(obj),
                'text': rs.DimensionText(obj) or '',
                'value': rs.DimensionValue(obj),
                'layer': rs.ObjectLayer(obj),
                'center': center
            })
    except Exception:
        pass
print(json.dumps(dims))
"#;

pub const BLOCK_INSTANCES_SCRIPT: &str = r#"import rhinoscriptsyntax as rs
import json

blocks = []
for obj in rs.AllObjects():
    if rs.IsBlockInstance(obj):
        insertion = rs.BlockInstanceInsertPoint(obj)
        attrs = {}
        keys = rs.GetUserText(obj)
        if keys:
            for key in keys:
                attrs[key] = rs.GetUserText(obj, key)
        blocks.append({
            'id': str(obj),
            'block_name': rs.BlockInstanceName(obj),
            'insertion_point': list(insertion) if insertion else [0, 0, 0],
            'attributes': attrs,
            'layer': rs.ObjectLayer(obj)
        })
print(json.dumps(blocks))
"#;

/// Quote a value as a Python string literal.
pub fn py_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Script printing the combined bounding box of a group, or `null`.
pub fn group_bounding_box_script(group: &str) -> String {
    format!(
        r#"import rhinoscriptsyntax as rs
import json

group_name = json.loads({literal})
objects = rs.ObjectsByGroup(group_name)
result = None
if objects:
    bbox = rs.BoundingBox(objects)
    if bbox and len(bbox) >= 7:
        result = {{
            'min': [bbox[0][0], bbox[0][1], bbox[0][2]],
            'max': [bbox[6][0], bbox[6][1], bbox[6][2]]
        }}
print(json.dumps(result))
"#,
        literal = py_string(&py_string(group))
    )
}

// =============================================================================
// PUSH
// =============================================================================

/// Target geometry for one cabinet group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    pub group: String,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub depth: Option<f64>,
}

/// What a push script reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushReport {
    pub success: bool,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Script that scales an existing group to the target size, or creates a box
/// group when none exists.
///
/// Scaling is to absolute targets, so running the same push twice leaves the
/// document unchanged the second time.
pub fn push_script(payload: &PushPayload) -> Result<String> {
    let json = serde_json::to_string(payload)?;
    let (w, h, d) = CREATE_DEFAULTS;
    Ok(format!(
        r#"{PUSH_MARKER}
import rhinoscriptsyntax as rs
import json

{PAYLOAD_PREFIX}{literal})
group_name = payload['group']
objects = rs.ObjectsByGroup(group_name)

def scale_for(target, current):
    if target is None or current <= 0:
        return 1.0
    return target / current

if objects:
    bbox = rs.BoundingBox(objects)
    if bbox and len(bbox) >= 7:
        sx = scale_for(payload['width'], abs(bbox[1][0] - bbox[0][0]))
        sy = scale_for(payload['depth'], abs(bbox[3][1] - bbox[0][1]))
        sz = scale_for(payload['height'], abs(bbox[4][2] - bbox[0][2]))
        rs.ScaleObjects(objects, bbox[0], [sx, sy, sz])
        print(json.dumps({{'success': True, 'operation': 'update', 'group': group_name}}))
    else:
        print(json.dumps({{'success': False, 'error': 'Could not get bounding box'}}))
else:
    width = payload['width'] or {w}
    height = payload['height'] or {h}
    depth = payload['depth'] or {d}
    box = rs.AddBox([
        [0, 0, 0], [width, 0, 0], [width, depth, 0], [0, depth, 0],
        [0, 0, height], [width, 0, height], [width, depth, height], [0, depth, height]
    ])
    if box:
        rs.AddGroup(group_name)
        rs.AddObjectToGroup(box, group_name)
        print(json.dumps({{'success': True, 'operation': 'create', 'group': group_name}}))
    else:
        print(json.dumps({{'success': False, 'error': 'Failed to create box'}}))
"#,
        literal = py_string(&json)
    ))
}

/// Recover the payload embedded by [`push_script`]. `None` for other scripts.
pub fn parse_push_payload(script: &str) -> Option<PushPayload> {
    if !script.starts_with(PUSH_MARKER) {
        return None;
    }
    let line = script
        .lines()
        .find_map(|l| l.strip_prefix(PAYLOAD_PREFIX))?;
    let literal = line.strip_suffix(')')?;
    let json: String = serde_json::from_str(literal).ok()?;
    serde_json::from_str(&json).ok()
}

/// Parse the report a push script printed.
pub fn parse_push_report(output: Option<&str>) -> Result<PushReport> {
    let line = output
        .and_then(|o| o.lines().rev().find(|l| !l.trim().is_empty()))
        .ok_or_else(|| Error::ExternalBoundary("push script printed nothing".into()))?;
    serde_json::from_str(line.trim())
        .map_err(|e| Error::ExternalBoundary(format!("malformed push report: {e}")))
}

// =============================================================================
// OUTPUT PARSING
// =============================================================================

/// Decode the JSON a read script printed.
pub fn parse_json_output<T: DeserializeOwned>(output: Option<&str>, what: &str) -> Result<T> {
    let text = output
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::ExternalBoundary(format!("{what} script printed nothing")))?;
    serde_json::from_str(text)
        .map_err(|e| Error::ExternalBoundary(format!("malformed {what} output: {e}")))
}

/// Text after the bridge's `Print output:` banner, or the whole text.
pub fn extract_print_output(result_text: &str) -> String {
    match result_text.split_once("Print output:") {
        Some((_, rest)) => rest.trim().to_string(),
        None => result_text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_py_string_escapes_quotes() {
        assert_eq!(py_string("Austin-Van"), "\"Austin-Van\"");
        assert_eq!(py_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_push_payload_survives_hostile_group_name() {
        let payload = PushPayload {
            group: "Evil\")\nimport os".to_string(),
            width: Some(30.0),
            height: None,
            depth: Some(24.0),
        };
        let script = push_script(&payload).unwrap();
        assert!(script.starts_with(PUSH_MARKER));
        assert!(!script.contains("\nimport os"));
        assert_eq!(parse_push_payload(&script), Some(payload));
    }

    #[test]
    fn test_parse_push_payload_ignores_other_scripts() {
        assert!(parse_push_payload(GROUPS_SCRIPT).is_none());
    }

    #[test]
    fn test_parse_push_report() {
        let report =
            parse_push_report(Some("{\"success\": true, \"operation\": \"update\", \"group\": \"A-Van\"}\n"))
                .unwrap();
        assert!(report.success);
        assert_eq!(report.operation.as_deref(), Some("update"));

        assert!(parse_push_report(None).is_err());
        assert!(parse_push_report(Some("not json")).is_err());
    }

    #[test]
    fn test_extract_print_output() {
        assert_eq!(
            extract_print_output("Script successfully executed! Print output: [1, 2]\n"),
            "[1, 2]"
        );
        assert_eq!(extract_print_output("  plain  "), "plain");
    }

    #[test]
    fn test_parse_json_output() {
        let groups: Vec<String> = parse_json_output(Some("[\"A-Van\"]"), "groups").unwrap();
        assert_eq!(groups, vec!["A-Van"]);

        let err = parse_json_output::<Vec<String>>(Some("oops"), "groups").unwrap_err();
        assert!(matches!(err, Error::ExternalBoundary(_)));
        assert!(parse_json_output::<Vec<String>>(Some("  "), "groups").is_err());
    }

    #[test]
    fn test_group_bbox_script_embeds_literal() {
        let script = group_bounding_box_script("Austin-W/D");
        assert!(script.contains("json.loads(\"\\\"Austin-W/D\\\"\")"));
    }
}
