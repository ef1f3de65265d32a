use serde_json::Value;
use shared::{ColorKey, DetectionId, DetectionRecord};
use std::str::FromStr;

pub const MISSING_BOUNDING_BOX: &str = "N/A";

// Field priority per record attribute. The first key holding a usable value wins.
const LABEL_FIELDS: [&str; 2] = ["class", "label"];
const BOUNDING_BOX_FIELDS: [&str; 2] = ["bbox_xyxy", "bbox"];
const CONFIDENCE_FIELD: &str = "confidence";
const COLOR_FIELD: &str = "color";
const ID_FIELD: &str = "id";

pub fn normalize_detections(entries: &[Value]) -> Vec<DetectionRecord> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| normalize_entry(index, entry))
        .collect()
}

pub fn normalize_entry(index: usize, entry: &Value) -> DetectionRecord {
    let label = label_for(index, entry);
    let id = id_for(index, entry, &label);

    DetectionRecord {
        id,
        confidence_percent: confidence_percent(raw_confidence(entry)),
        bounding_box: bounding_box_for(entry),
        color_key: color_for(index, entry),
        label,
    }
}

/// Values above 1 are already percentages, anything else is a fraction.
/// `1.0` therefore reads as 100%, same as `100`.
pub fn confidence_percent(raw: f64) -> u8 {
    if !raw.is_finite() {
        return 0;
    }
    let percentage = if raw > 1.0 { raw } else { raw * 100.0 };
    percentage.clamp(0.0, 100.0).round() as u8
}

pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn raw_confidence(entry: &Value) -> f64 {
    entry.get(CONFIDENCE_FIELD).map(number_or_zero).unwrap_or(0.0)
}

fn number_or_zero(value: &Value) -> f64 {
    let number = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    };
    if number.is_finite() { number } else { 0.0 }
}

fn label_for(index: usize, entry: &Value) -> String {
    LABEL_FIELDS
        .iter()
        .filter_map(|field| entry.get(*field))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(capitalize_first(s)),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| format!("Object {}", index + 1))
}

fn bounding_box_for(entry: &Value) -> String {
    let raw = BOUNDING_BOX_FIELDS
        .iter()
        .filter_map(|field| entry.get(*field))
        .find(|value| !value.is_null());

    match raw {
        Some(Value::Array(coords)) => {
            let rounded: Vec<String> = coords
                .iter()
                .map(|coord| {
                    let value = number_or_zero(coord);
                    if value.is_finite() {
                        (value.round() as i64).to_string()
                    } else {
                        "0".to_string()
                    }
                })
                .collect();
            format!("({})", rounded.join(", "))
        }
        Some(Value::String(s)) => s.clone(),
        _ => MISSING_BOUNDING_BOX.to_string(),
    }
}

fn color_for(index: usize, entry: &Value) -> ColorKey {
    entry
        .get(COLOR_FIELD)
        .and_then(Value::as_str)
        .and_then(|name| ColorKey::from_str(name).ok())
        .unwrap_or_else(|| ColorKey::for_index(index))
}

fn id_for(index: usize, entry: &Value, label: &str) -> DetectionId {
    let declared = match entry.get(ID_FIELD) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    DetectionId::from(declared.unwrap_or_else(|| format!("{}-{}", label, index)))
}
