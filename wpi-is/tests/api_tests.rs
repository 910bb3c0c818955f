//! HTTP API integration tests
//!
//! Drive the full router with an in-memory database, a temporary root
//! folder and a stub inference engine.

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use helpers::*;
use wpi_common::domain::ItemCounts;
use wpi_is::services::inference::Prediction;

fn count_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_health_reports_engine() {
    let app = test_app().await;
    let (status, body) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "wpi-is");
    assert_eq!(body["inference"], "stub");
}

#[tokio::test]
async fn test_workplace_crud() {
    let app = test_app().await;
    let id = create_workplace(&app.router, "Werkbank 1").await;

    let (status, body) = get(&app.router, "/api/workplaces").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = json_request(
        &app.router,
        "PUT",
        &format!("/api/workplaces/{}", id),
        json!({ "name": "Werkbank 2", "confidence_threshold": 0.4 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["name"], "Werkbank 2");
    assert_eq!(body["confidence_threshold"], 0.4);

    let (status, body) = get(&app.router, &format!("/api/workplaces/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workplace"]["items"], json!(["hamer", "schaar", "sleutel"]));
    assert!(body["active_model"].is_null());

    let (status, _) = delete(&app.router, &format!("/api/workplaces/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&app.router, &format!("/api/workplaces/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_workplace_rejects_bad_items() {
    let app = test_app().await;
    let rejected = [
        json!([]),
        json!(["hamer", "hamer"]),
        json!(["rol-band"]),
        json!(["rol_tape", "rol", "tape"]),
        json!(["alles", "hamer"]),
    ];
    for items in rejected {
        let (status, _) = json_request(
            &app.router,
            "POST",
            "/api/workplaces",
            json!({ "name": "Bad", "items": items }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "items {}", items);
    }
}

#[tokio::test]
async fn test_category_table() {
    let app = test_app().await;
    let id = create_workplace(&app.router, "Werkbank").await;

    let (status, body) = get(&app.router, &format!("/api/workplaces/{}/categories", id)).await;
    assert_eq!(status, StatusCode::OK);

    let categories = body["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 8);
    assert_eq!(categories[0]["label"], "OK");
    assert_eq!(categories[1]["label"], "NOK-alles_weg");
    assert_eq!(categories[2]["label"], "NOK-hamer_weg");
    assert_eq!(categories[7]["label"], "NOK-schaar_sleutel_weg");

    // The hardcoded three-item resolver disagrees on four subsets, among them
    // the class 4 it gave to both hamer+sleutel and schaar+sleutel
    let discrepancies = body["legacy_discrepancies"].as_array().unwrap();
    let legacy: Vec<(Vec<&str>, &str, &str)> = discrepancies
        .iter()
        .map(|d| {
            let missing = d["missing"]
                .as_array()
                .unwrap()
                .iter()
                .map(|m| m.as_str().unwrap())
                .collect();
            (missing, d["legacy_class"].as_str().unwrap(), d["class_id"].as_str().unwrap())
        })
        .collect();
    assert_eq!(
        legacy,
        vec![
            (vec!["sleutel"], "5", "4"),
            (vec!["hamer", "schaar"], "6", "5"),
            (vec!["hamer", "sleutel"], "4", "6"),
            (vec!["schaar", "sleutel"], "4", "7"),
        ]
    );
}

#[tokio::test]
async fn test_model_activation_keeps_one_active() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    let uri = format!("/api/workplaces/{}/models", wp);

    let mut ids = Vec::new();
    for version in ["v1", "v2"] {
        let request = MultipartBody::new()
            .file("file", "best.pt", b"weights")
            .text("version", version)
            .request(&uri);
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["status"], "uploaded");
        ids.push(body["id"].as_str().unwrap().to_string());
    }

    let (status, _) = send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri(format!("/api/models/{}/activate", ids[0]))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri(format!("/api/models/{}/activate", ids[1]))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"]["status"], "active");
    assert_eq!(body["archived"], json!([ids[0]]));

    let (_, body) = get(&app.router, &format!("{}?status=active", uri)).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["active_model_id"], ids[1].as_str());

    let (status, _) = delete(&app.router, &format!("/api/models/{}", ids[1])).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, body) = delete(&app.router, &format!("/api/models/{}", ids[0])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file_removed"], true);
}

#[tokio::test]
async fn test_model_upload_requires_model_extension() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    let request = MultipartBody::new()
        .file("file", "weights.zip", b"weights")
        .request(&format!("/api/workplaces/{}/models", wp));
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_training_images_and_dataset_stats() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    let uri = format!("/api/workplaces/{}/training-images", wp);

    let (status, body) = send(
        &app.router,
        MultipartBody::new()
            .file("file", "ok.jpg", JPEG_BYTES)
            .text("label", "OK")
            .text("validated", "true")
            .request(&uri),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["class_id"], "0");

    let (status, body) = send(
        &app.router,
        MultipartBody::new()
            .file("file", "nok.jpg", JPEG_BYTES)
            .text("missing_items", "schaar")
            .request(&uri),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["label"], "NOK-schaar");

    let (status, _) = send(
        &app.router,
        MultipartBody::new()
            .file("file", "raw.jpg", JPEG_BYTES)
            .request(&uri),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = get(&app.router, &format!("/api/workplaces/{}/dataset-stats", wp)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_images"], 3);
    assert_eq!(body["labeled_images"], 2);
    assert_eq!(body["unlabeled_images"], 1);
    assert_eq!(body["validated_count"], 1);
    assert_eq!(body["unvalidated_count"], 2);
    assert_eq!(body["label_counts"]["OK"], 1);
    assert_eq!(body["label_counts"]["NOK-schaar"], 1);
    assert_eq!(body["scenarios"].as_array().unwrap().len(), 5);
    assert_eq!(body["ready_for_training"], false);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/workplaces/{}/export-dataset?train_split=0.5", wp))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
}

#[tokio::test]
async fn test_training_image_rejects_unknown_item() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    let (status, _) = send(
        &app.router,
        MultipartBody::new()
            .file("file", "nok.jpg", JPEG_BYTES)
            .text("label", "NOK-boor")
            .request(&format!("/api/workplaces/{}/training-images", wp)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inspection_ok() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;

    let (status, body) = inspect(&app, &wp, classification("OK", 0.93)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["classification"]["status"], "OK");
    assert_eq!(body["classification"]["class_id"], "0");
    assert_eq!(body["classification"]["missing_items"], json!([]));
    assert!(body["model"].is_null());

    let (_, body) = get(&app.router, &format!("/api/analyses?workplace_id={}", wp)).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["statistics"]["ok_count"], 1);
}

#[tokio::test]
async fn test_inspection_detection_reports_missing_items() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    let counts: ItemCounts = [("hamer".to_string(), 1), ("schaar".to_string(), 0), ("sleutel".to_string(), 2)]
        .into_iter()
        .collect();

    let (status, body) = inspect(&app, &wp, Prediction::Detection { counts, confidence: 0.8 }).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["classification"]["status"], "NOK");
    assert_eq!(body["classification"]["label"], "NOK-schaar_weg");
    assert_eq!(body["classification"]["missing_items"], json!(["schaar"]));
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_inspection_with_faces_is_blocked() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;

    app.inference.respond_with(2, classification("OK", 0.9));
    let request = MultipartBody::new()
        .file("file", "frame.jpg", JPEG_BYTES)
        .text("workplace_id", &wp)
        .request("/api/inspect");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PRIVACY_BLOCKED");
    assert_eq!(body["error"]["faces_detected"], 2);

    let (_, body) = get(&app.router, "/api/analyses").await;
    assert_eq!(body["count"], 0);
    assert_eq!(count_files(&app.root.path().join("uploads")), 0);
}

#[tokio::test]
async fn test_inspection_requires_workplace_id() {
    let app = test_app().await;
    let request = MultipartBody::new()
        .file("file", "frame.jpg", JPEG_BYTES)
        .request("/api/inspect");
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inspection_without_engine_is_unavailable() {
    let (router, _root) = unconfigured_app().await;
    let wp = create_workplace(&router, "Werkbank").await;

    let request = MultipartBody::new()
        .file("file", "frame.jpg", JPEG_BYTES)
        .text("workplace_id", &wp)
        .request("/api/inspect");
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "INFERENCE_UNAVAILABLE");

    let (_, body) = get(&router, "/health").await;
    assert_eq!(body["status"], "degraded");
    assert!(body["last_error"].is_string());
}

#[tokio::test]
async fn test_blur_preview_stores_nothing() {
    let app = test_app().await;

    app.inference.respond_with(0, classification("OK", 0.9));
    let request = MultipartBody::new()
        .file("file", "frame.jpg", JPEG_BYTES)
        .request("/api/blur-preview");
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["faces_detected"], 0);
    let encoded = body["blurred_image"].as_str().unwrap();
    assert!(encoded.starts_with("data:image/jpeg;base64,/9j/"));

    app.inference.respond_with(1, classification("OK", 0.9));
    let request = MultipartBody::new()
        .file("image", "frame.jpg", JPEG_BYTES)
        .request("/api/blur-preview");
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PRIVACY_BLOCKED");
    assert_eq!(body["error"]["faces_detected"], 1);

    let (_, body) = get(&app.router, "/api/analyses").await;
    assert_eq!(body["count"], 0);
    assert_eq!(count_files(&app.root.path().join("uploads")), 0);
}

#[tokio::test]
async fn test_blur_preview_without_engine_is_unavailable() {
    let (router, _root) = unconfigured_app().await;
    let request = MultipartBody::new()
        .file("file", "frame.jpg", JPEG_BYTES)
        .request("/api/blur-preview");
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "INFERENCE_UNAVAILABLE");

    let request = MultipartBody::new().text("workplace_id", "1").request("/api/blur-preview");
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_correction_makes_candidate() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    let (_, inspected) = inspect(&app, &wp, classification("OK", 0.95)).await;
    let id = inspected["analysis_id"].as_str().unwrap();

    let (status, body) = json_request(
        &app.router,
        "POST",
        &format!("/api/analyses/{}/correction", id),
        json!({ "missing_items": ["hamer"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["analysis"]["corrected_class"], "2");
    assert_eq!(body["analysis"]["corrected_label"], "NOK-hamer_weg");
    assert_eq!(body["candidate_reason"], "incorrect");
    assert_eq!(body["image_removed"], false);

    let (_, body) = get(&app.router, "/api/training/candidates").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["candidates"][0]["reason"], "incorrect");
}

#[tokio::test]
async fn test_confirmed_analysis_discards_image() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    let (_, inspected) = inspect(&app, &wp, classification("OK", 0.95)).await;
    let id = inspected["analysis_id"].as_str().unwrap();
    assert_eq!(count_files(&app.root.path().join("uploads")), 1);

    let (status, body) = json_request(
        &app.router,
        "POST",
        &format!("/api/analyses/{}/correction", id),
        json!({ "corrected_class": "0", "corrected_label": "OK" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["candidate_reason"].is_null());
    assert_eq!(body["image_removed"], true);
    assert_eq!(count_files(&app.root.path().join("uploads")), 0);
}

#[tokio::test]
async fn test_training_export_excludes_exported() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    let (_, unsure) = inspect(&app, &wp, classification("OK", 0.4)).await;
    inspect(&app, &wp, classification("OK", 0.97)).await;
    let unsure_id = unsure["analysis_id"].as_str().unwrap().to_string();

    let (_, body) = get(&app.router, "/api/training/candidates").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["candidates"][0]["reason"], "low_confidence");
    assert_eq!(body["candidates"][0]["id"], unsure_id.as_str());

    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/training/export",
        json!({ "analysis_ids": [unsure_id], "export_name": "batch_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["partition"], "batch_1");
    assert_eq!(body["total_exported"], 1);
    assert_eq!(count_files(&app.root.path().join("exports").join("batch_1").join("0")), 1);

    let (_, body) = get(&app.router, "/api/training/candidates").await;
    assert_eq!(body["count"], 0);

    let (_, body) = get(&app.router, "/api/training/statistics").await;
    assert_eq!(body["exported_count"], 1);
    assert_eq!(body["training_queue_count"], 0);

    let (status, _) = json_request(
        &app.router,
        "POST",
        "/api/training/export",
        json!({ "analysis_ids": [unsure_id] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_training_export_leaves_imageless_analyses_unmarked() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    let (_, reviewed) = inspect(&app, &wp, classification("OK", 0.8)).await;
    let (_, unsure) = inspect(&app, &wp, classification("OK", 0.4)).await;
    let reviewed_id = reviewed["analysis_id"].as_str().unwrap().to_string();
    let unsure_id = unsure["analysis_id"].as_str().unwrap().to_string();

    // Confirmed at a 70% threshold: not a candidate, image is discarded
    let (status, body) = json_request(
        &app.router,
        "POST",
        &format!("/api/analyses/{}/correction", reviewed_id),
        json!({ "corrected_class": "0", "corrected_label": "OK", "confidence_threshold": 70 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["image_removed"], true);

    let (_, body) = get(&app.router, "/api/training/candidates?confidence_threshold=95").await;
    assert_eq!(body["count"], 2);

    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/training/export",
        json!({ "analysis_ids": [reviewed_id], "export_name": "no_images" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert!(!app.root.path().join("exports").join("no_images").exists());

    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/training/export",
        json!({ "analysis_ids": [reviewed_id, unsure_id], "export_name": "mixed" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total_exported"], 1);
    assert_eq!(body["class_distribution"]["0"], 1);
    assert_eq!(body["not_copied"], json!([reviewed_id]));

    let (_, body) = get(&app.router, "/api/training/candidates?confidence_threshold=95").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["candidates"][0]["id"], reviewed_id.as_str());

    let (_, body) = get(&app.router, "/api/training/statistics").await;
    assert_eq!(body["exported_count"], 1);
}

#[tokio::test]
async fn test_candidate_threshold_out_of_range() {
    let app = test_app().await;
    let (status, _) = get(&app.router, "/api/training/candidates?confidence_threshold=30").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bulk_delete_reports_failures() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    let (_, a) = inspect(&app, &wp, classification("OK", 0.9)).await;
    let (_, b) = inspect(&app, &wp, classification("OK", 0.9)).await;

    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/analyses/bulk-delete",
        json!({ "ids": [a["analysis_id"], b["analysis_id"], uuid::Uuid::new_v4()] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["succeeded"], 2);
    assert_eq!(body["failed"], 1);
    assert_eq!(count_files(&app.root.path().join("uploads")), 0);
}

#[tokio::test]
async fn test_csv_export() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;
    inspect(&app, &wp, classification("OK", 0.9)).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/analyses/export.csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));

    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("id,created_at,workplace_id"));
}

#[tokio::test]
async fn test_performance_per_model() {
    let app = test_app().await;
    let wp = create_workplace(&app.router, "Werkbank").await;

    let (_, model) = send(
        &app.router,
        MultipartBody::new()
            .file("file", "best.pt", b"weights")
            .request(&format!("/api/workplaces/{}/models", wp)),
    )
    .await;
    let model_id = model["id"].as_str().unwrap();
    send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri(format!("/api/models/{}/activate", model_id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let (_, inspected) = inspect(&app, &wp, classification("OK", 0.9)).await;
    assert_eq!(inspected["model"]["id"], model_id);
    json_request(
        &app.router,
        "POST",
        &format!("/api/analyses/{}/correction", inspected["analysis_id"].as_str().unwrap()),
        json!({ "missing_items": ["sleutel"] }),
    )
    .await;

    let (status, body) = get(&app.router, &format!("/api/workplaces/{}/performance", wp)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["reviewed"], 1);
    assert_eq!(models[0]["incorrect"], 1);
    assert_eq!(models[0]["accuracy"], 0);
    assert_eq!(models[0]["top_errors"][0]["label"], "NOK-sleutel_weg");
}

#[tokio::test]
async fn test_settings_update_is_validated() {
    let app = test_app().await;

    let (status, _) = json_request(
        &app.router,
        "PUT",
        "/api/settings",
        json!({ "candidate_threshold_percent": 99 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = json_request(
        &app.router,
        "PUT",
        "/api/settings",
        json!({ "candidate_threshold_percent": 80 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["candidate_threshold_percent"], 80.0);

    let (_, body) = get(&app.router, "/api/settings").await;
    assert_eq!(body["candidate_threshold_percent"], 80.0);
}
