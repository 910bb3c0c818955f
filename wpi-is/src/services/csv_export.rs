//! CSV export of analyses for spreadsheet use
//!
//! RFC 4180 quoting: fields containing a comma, quote, CR or LF are wrapped
//! in quotes with embedded quotes doubled. Lines end with CRLF.

use wpi_common::domain::Analysis;
use wpi_common::Result;

pub const CSV_COLUMNS: &[&str] = &[
    "id",
    "created_at",
    "workplace_id",
    "model_id",
    "model_version",
    "model_type",
    "predicted_class",
    "predicted_label",
    "confidence",
    "status",
    "missing_items",
    "detected_counts",
    "corrected_class",
    "corrected_label",
    "corrected_counts",
    "notes",
    "face_count",
    "device_id",
    "image_path",
    "exported_for_training",
];

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_record<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let line: Vec<String> = fields.into_iter().map(|f| quote(f.as_ref())).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

fn record(analysis: &Analysis) -> Result<Vec<String>> {
    let opt = |value: Option<String>| value.unwrap_or_default();

    Ok(vec![
        analysis.id.to_string(),
        analysis.created_at.to_rfc3339(),
        opt(analysis.workplace_id.map(|id| id.to_string())),
        opt(analysis.model_id.map(|id| id.to_string())),
        opt(analysis.model_version.clone()),
        analysis.model_type.as_str().to_string(),
        analysis.predicted_class.clone(),
        analysis.predicted_label.clone(),
        format!("{:.4}", analysis.confidence),
        analysis.status.as_str().to_string(),
        analysis.missing_items.join(";"),
        if analysis.detected_counts.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&analysis.detected_counts)?
        },
        opt(analysis.corrected_class.clone()),
        opt(analysis.corrected_label.clone()),
        opt(analysis
            .corrected_counts
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?),
        opt(analysis.notes.clone()),
        analysis.face_count.to_string(),
        analysis.device_id.clone(),
        opt(analysis.image_path.clone()),
        analysis.exported_for_training.to_string(),
    ])
}

/// Header plus one record per analysis, in the given order
pub fn analyses_to_csv(analyses: &[Analysis]) -> Result<String> {
    let mut out = String::new();
    push_record(&mut out, CSV_COLUMNS);
    for analysis in analyses {
        push_record(&mut out, record(analysis)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use wpi_common::domain::{InspectionStatus, ItemCounts, ModelType};

    fn analysis() -> Analysis {
        Analysis {
            id: Uuid::new_v4(),
            workplace_id: None,
            model_id: None,
            model_version: Some("v1.0".into()),
            model_type: ModelType::Detection,
            predicted_class: "2".into(),
            predicted_label: "NOK-hamer_weg".into(),
            confidence: 0.5,
            status: InspectionStatus::Nok,
            missing_items: vec!["hamer".into()],
            detected_counts: [("hamer".to_string(), 0), ("schaar".to_string(), 1)]
                .into_iter()
                .collect::<ItemCounts>(),
            corrected_class: None,
            corrected_label: None,
            corrected_counts: None,
            notes: Some("said \"no\", then\nleft".into()),
            face_count: 0,
            device_id: "Desktop".into(),
            image_path: None,
            exported_for_training: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("a,b"), "\"a,b\"");
        assert_eq!(quote("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_header_and_record() {
        let csv = analyses_to_csv(&[analysis()]).unwrap();
        let header = csv.split("\r\n").next().unwrap();
        assert_eq!(header.split(',').count(), CSV_COLUMNS.len());
        assert!(csv.contains("\"{\"\"hamer\"\":0,\"\"schaar\"\":1}\""));
        assert!(csv.contains("\"said \"\"no\"\", then\nleft\""));
        assert!(csv.ends_with("false\r\n"));
    }

    #[test]
    fn test_empty_export_is_header_only() {
        let csv = analyses_to_csv(&[]).unwrap();
        assert_eq!(csv, format!("{}\r\n", CSV_COLUMNS.join(",")));
    }
}
