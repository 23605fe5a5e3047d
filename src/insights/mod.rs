//! AI text flows: custom report generation and data insights.
//!
//! Both flows send a single prompt to a [`TextModel`] and parse the JSON
//! document it answers with. Nothing here is persisted.

pub mod client;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use client::{MockTextModel, ModelPrompt, ReqwestTextModel, TextModel};

use crate::directory::Resident;
use crate::error::{BarangayError, Result};
use crate::request::AnyDocumentRequest;

const REPORT_FLOW: &str = "custom_report";
const INSIGHTS_FLOW: &str = "insights";

/// Output format of a generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Csv,
    Json,
    Text,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
            ReportFormat::Text => "text",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "text/csv",
            ReportFormat::Json => "application/json",
            ReportFormat::Text => "text/plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub title: String,
    /// Free-form constraints such as a date range or purok
    pub parameters: String,
    pub description: String,
    pub format: ReportFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportOutput {
    pub format: ReportFormat,
    pub payload_base64: String,
    pub summary: String,
}

impl ReportOutput {
    /// Render the payload as a `data:` URI suitable for a download link.
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            self.payload_base64
        )
    }

    /// Decoded report bytes.
    pub fn payload(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.payload_base64)
            .map_err(|e| BarangayError::TextModel(format!("report payload is not base64: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReport {
    report_data: String,
    summary: String,
}

/// Ask the model to produce a report file and a short summary of it.
#[tracing::instrument(skip(model, request), fields(title = %request.title, format = request.format.as_str()))]
pub async fn generate_custom_report<M: TextModel + ?Sized>(
    model: &M,
    request: ReportRequest,
) -> Result<ReportOutput> {
    if request.title.trim().is_empty() {
        return Err(BarangayError::Validation("Report title is required".to_string()));
    }
    if request.description.trim().is_empty() {
        return Err(BarangayError::Validation(
            "Report description is required".to_string(),
        ));
    }

    let prompt = ModelPrompt {
        flow: REPORT_FLOW,
        system: "You are an assistant for a barangay office. Generate the requested report. \
                 Respond with a JSON object with two fields: \"reportData\", the full report \
                 file encoded as base64, and \"summary\", a short plain-language summary."
            .to_string(),
        user: format!(
            "Title: {}\nFormat: {}\nParameters: {}\nDescription: {}",
            request.title,
            request.format.as_str(),
            request.parameters,
            request.description
        ),
    };

    let reply = call_model(model, &prompt).await?;
    let raw: RawReport = parse_reply(REPORT_FLOW, &reply)?;

    let output = ReportOutput {
        format: request.format,
        payload_base64: raw.report_data.trim().to_string(),
        summary: raw.summary,
    };
    let payload = output
        .payload()
        .inspect_err(|_| record_outcome(REPORT_FLOW, "invalid"))?;
    record_outcome(REPORT_FLOW, "ok");

    tracing::info!(payload_bytes = payload.len(), "Generated custom report");
    Ok(output)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsRequest {
    /// JSON array of resident records
    pub resident_data: Value,
    /// JSON array of document request records
    pub request_data: Value,
    /// Optional focus for the analysis
    pub parameters: Option<String>,
}

impl InsightsRequest {
    /// Build an insights request from stored records.
    pub fn from_records(
        residents: &[Resident],
        requests: &[AnyDocumentRequest],
        parameters: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            resident_data: serde_json::to_value(residents)?,
            request_data: serde_json::to_value(requests)?,
            parameters,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightsOutput {
    pub analysis: String,
}

/// Ask the model to analyse resident and request data.
#[tracing::instrument(skip_all)]
pub async fn generate_insights<M: TextModel + ?Sized>(
    model: &M,
    request: InsightsRequest,
) -> Result<InsightsOutput> {
    if !request.resident_data.is_array() {
        return Err(BarangayError::Validation(
            "Resident data must be a JSON array".to_string(),
        ));
    }
    if !request.request_data.is_array() {
        return Err(BarangayError::Validation(
            "Request data must be a JSON array".to_string(),
        ));
    }

    let mut user = format!(
        "Resident data:\n{}\n\nDocument request data:\n{}",
        request.resident_data, request.request_data
    );
    if let Some(parameters) = request.parameters.as_deref()
        && !parameters.trim().is_empty()
    {
        user.push_str(&format!("\n\nFocus on: {}", parameters.trim()));
    }

    let prompt = ModelPrompt {
        flow: INSIGHTS_FLOW,
        system: "You are a data analyst for a barangay office. Identify trends and patterns in \
                 the resident and document request data. Respond with a JSON object with one \
                 field, \"analysis\", containing your findings."
            .to_string(),
        user,
    };

    let reply = call_model(model, &prompt).await?;
    let output: InsightsOutput = parse_reply(INSIGHTS_FLOW, &reply)?;
    record_outcome(INSIGHTS_FLOW, "ok");
    tracing::info!(analysis_len = output.analysis.len(), "Generated insights");
    Ok(output)
}

/// One outcome per flow call: `ok` once the reply is parsed and checked,
/// `error` when the model could not be reached, `invalid` for a reply that
/// does not fit.
fn record_outcome(flow: &'static str, outcome: &'static str) {
    counter!("barangay_text_model_calls_total", "flow" => flow, "outcome" => outcome).increment(1);
}

async fn call_model<M: TextModel + ?Sized>(model: &M, prompt: &ModelPrompt) -> Result<String> {
    model.complete(prompt).await.inspect_err(|e| {
        record_outcome(prompt.flow, "error");
        tracing::warn!(flow = prompt.flow, error = %e, "Text model call failed");
    })
}

fn parse_reply<T: serde::de::DeserializeOwned>(flow: &'static str, reply: &str) -> Result<T> {
    serde_json::from_str(reply).map_err(|e| {
        record_outcome(flow, "invalid");
        BarangayError::TextModel(format!("unexpected {} reply: {}", flow, e))
    })
}
