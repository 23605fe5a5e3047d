use barangay::accounts::InMemoryAccountProvider;
use barangay::config::TextModelConfig;
use barangay::directory::{ResidentFilter, ResidentProfile};
use barangay::error::BarangayError;
use barangay::insights::{
    InsightsRequest, ReportFormat, ReportRequest, ReqwestTextModel, generate_custom_report,
    generate_insights,
};
use barangay::manager::memory::InMemoryStorage;
use barangay::manager::{DirectoryStorage, NewResidentAccount, Storage};
use barangay::request::{DocumentRequestInput, DocumentType, FeeSchedule, RequestFilter};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use serde_json::json;

fn model_for(server: &mockito::Server) -> ReqwestTextModel {
    ReqwestTextModel::new(TextModelConfig {
        endpoint: server.url(),
        model: "office-analyst".to_string(),
        api_key: "sk-test".to_string(),
        timeout_ms: 5000,
    })
}

fn completion(content: serde_json::Value) -> String {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content.to_string() } }]
    })
    .to_string()
}

#[test_log::test(tokio::test)]
async fn test_custom_report_over_http() {
    let mut server = mockito::Server::new_async().await;
    let csv = "purok,residents\nPurok 1,12\nPurok 2,9\n";
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(mockito::Matcher::Regex("Residents per purok".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion(json!({
            "reportData": STANDARD.encode(csv),
            "summary": "Purok 1 has the most residents."
        })))
        .create_async()
        .await;

    let output = generate_custom_report(
        &model_for(&server),
        ReportRequest {
            title: "Residents per purok".to_string(),
            parameters: "all puroks".to_string(),
            description: "Count registered residents in each purok".to_string(),
            format: ReportFormat::Csv,
        },
    )
    .await
    .unwrap();

    mock.assert_async().await;
    assert_eq!(output.format, ReportFormat::Csv);
    assert_eq!(output.summary, "Purok 1 has the most residents.");
    assert_eq!(output.payload().unwrap(), csv.as_bytes());
}

#[test_log::test(tokio::test)]
async fn test_model_outage_is_reported() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let err = generate_insights(
        &model_for(&server),
        InsightsRequest {
            resident_data: json!([]),
            request_data: json!([]),
            parameters: None,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BarangayError::TextModel(_)));
}

#[test_log::test(tokio::test)]
async fn test_insights_from_stored_records() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    let (user, resident) = storage
        .register_resident(
            &accounts,
            NewResidentAccount {
                email: "data@example.com".to_string(),
                password: "mabuhay2024".to_string(),
                profile: ResidentProfile {
                    first_name: "Irene".to_string(),
                    middle_name: None,
                    last_name: "Castillo".to_string(),
                    purok: "Purok 4".to_string(),
                    birthdate: NaiveDate::from_ymd_opt(1979, 11, 3).unwrap(),
                    household_number: None,
                    contact_number: None,
                },
            },
        )
        .await
        .unwrap();
    storage
        .submit_request(
            &user,
            resident.id,
            DocumentRequestInput {
                document_type: DocumentType::BarangayClearance,
                purpose: Some("travel".to_string()),
            },
            &FeeSchedule::default(),
        )
        .await
        .unwrap();

    let residents = storage.list_residents(&ResidentFilter::default()).await.unwrap();
    let requests = storage.list_requests(&RequestFilter::default()).await.unwrap();
    let request =
        InsightsRequest::from_records(&residents, &requests, Some("purpose trends".to_string()))
            .unwrap();
    assert_eq!(request.resident_data.as_array().unwrap().len(), 1);
    assert_eq!(request.request_data[0]["status"], "Pending");

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_body(mockito::Matcher::Regex("Castillo".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion(json!({ "analysis": "Travel drives clearance demand." })))
        .create_async()
        .await;

    let output = generate_insights(&model_for(&server), request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(output.analysis, "Travel drives clearance demand.");
}
