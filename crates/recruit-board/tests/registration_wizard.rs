use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use recruit_board::workflows::registration::{
    Attachment, Field, RegistrationWizard, RestBackend, SchemaPreset, SubmissionPipeline,
    SubmissionStage, SubmissionStatus, SubmitOutcome,
};
use serde_json::Value;

#[derive(Clone, Default)]
struct FakeBackend {
    objects: Arc<Mutex<Vec<(String, String)>>>,
    rows: Arc<Mutex<Vec<Value>>>,
}

async fn store_object(
    State(backend): State<FakeBackend>,
    Path((bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> StatusCode {
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("anon-key") {
        return StatusCode::UNAUTHORIZED;
    }
    if path.starts_with("resumes/") && bucket == "locked" {
        return StatusCode::FORBIDDEN;
    }
    backend
        .objects
        .lock()
        .expect("objects mutex poisoned")
        .push((bucket, path));
    StatusCode::OK
}

async fn insert_rows(
    State(backend): State<FakeBackend>,
    Path(table): Path<String>,
    Json(rows): Json<Vec<Value>>,
) -> StatusCode {
    if table != "wlug_registrations" {
        return StatusCode::BAD_REQUEST;
    }
    backend
        .rows
        .lock()
        .expect("rows mutex poisoned")
        .extend(rows);
    StatusCode::CREATED
}

async fn spawn_backend() -> (String, FakeBackend) {
    let backend = FakeBackend::default();
    let app = Router::new()
        .route("/storage/v1/object/:bucket/*path", post(store_object))
        .route("/rest/v1/:table", post(insert_rows))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake backend");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake backend runs");
    });
    (format!("http://{addr}"), backend)
}

fn wizard_for(
    base_url: &str,
    bucket: &str,
    table: &str,
) -> RegistrationWizard<RestBackend, RestBackend> {
    let rest = Arc::new(
        RestBackend::new(base_url, "anon-key", bucket, table).expect("valid backend url"),
    );
    RegistrationWizard::new(
        Arc::new(SchemaPreset::Documents.schema()),
        SubmissionPipeline::new(Arc::clone(&rest), rest),
    )
}

fn complete_form(wizard: &mut RegistrationWizard<RestBackend, RestBackend>) {
    for (field, value) in [
        (Field::FullName, "Meera Joshi"),
        (Field::Email, "meera@wlug.org"),
        (Field::Mobile, "+91 98220 12345"),
    ] {
        wizard.update_field(field, value).expect("identity field");
    }
    assert!(!wizard.advance(), "country code makes twelve digits");
    wizard
        .update_field(Field::Mobile, "98220 12345")
        .expect("mobile fixed");
    assert!(wizard.advance());

    for (field, value) in [
        (Field::Branch, "aiml"),
        (Field::Year, "4"),
        (Field::Mission, "Mentor first years through their first distro install"),
    ] {
        wizard.update_field(field, value).expect("department field");
    }
    assert!(wizard.advance());

    wizard
        .update_field(
            Field::ProfilePhoto,
            Attachment::new("meera.webp", "image/webp", b"RIFF".to_vec()),
        )
        .expect("photo");
    wizard
        .update_field(
            Field::Resume,
            Attachment::new("Meera Joshi CV.PDF", "application/pdf", b"%PDF".to_vec()),
        )
        .expect("resume");
    assert!(wizard.advance());
}

#[tokio::test]
async fn rest_backend_stores_files_then_row() {
    let (base_url, backend) = spawn_backend().await;
    let mut wizard = wizard_for(&base_url, "registrations", "wlug_registrations");
    complete_form(&mut wizard);

    let outcome = wizard.submit().await.expect("submit allowed");

    let receipt = match outcome {
        SubmitOutcome::Succeeded(receipt) => receipt,
        other => panic!("expected success, got {other:?}"),
    };
    assert_eq!(receipt.full_name, "Meera Joshi");
    assert_eq!(receipt.branch, "AI & Machine Learning");
    assert!(receipt
        .photo_url
        .starts_with(&format!("{base_url}/storage/v1/object/public/registrations/photos/meera@wlug.org-")));
    assert!(receipt.resume_url.ends_with(".pdf"));

    let objects = backend.objects.lock().expect("objects").clone();
    assert_eq!(objects.len(), 2);
    assert!(objects.iter().all(|(bucket, _)| bucket == "registrations"));

    let rows = backend.rows.lock().expect("rows").clone();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["mobile"], "9822012345");
    assert_eq!(rows[0]["branch"], "aiml");
    assert_eq!(rows[0]["year"], "4");
    assert!(rows[0].get("prn").is_none());
}

#[tokio::test]
async fn rejected_insert_leaves_wizard_retryable() {
    let (base_url, backend) = spawn_backend().await;
    let mut wizard = wizard_for(&base_url, "registrations", "members_v0");
    complete_form(&mut wizard);

    let outcome = wizard.submit().await.expect("submit allowed");

    match outcome {
        SubmitOutcome::Failed(failure) => assert_eq!(failure.stage, SubmissionStage::RecordInsert),
        other => panic!("expected insert failure, got {other:?}"),
    }
    assert!(matches!(wizard.status(), SubmissionStatus::Failed(_)));
    assert_eq!(wizard.draft().full_name, "Meera Joshi");
    assert_eq!(backend.objects.lock().expect("objects").len(), 2);
    assert!(backend.rows.lock().expect("rows").is_empty());
    assert!(wizard.uploaded().resume.is_some());
}

#[tokio::test]
async fn refused_upload_is_reported_with_status() {
    let (base_url, backend) = spawn_backend().await;
    let mut wizard = wizard_for(&base_url, "locked", "wlug_registrations");
    complete_form(&mut wizard);

    let outcome = wizard.submit().await.expect("submit allowed");

    match outcome {
        SubmitOutcome::Failed(failure) => {
            assert_eq!(failure.stage, SubmissionStage::ResumeUpload);
            assert!(failure.reason().contains("403"));
        }
        other => panic!("expected upload failure, got {other:?}"),
    }
    assert_eq!(backend.objects.lock().expect("objects").len(), 1);
    assert!(backend.rows.lock().expect("rows").is_empty());
}
