use crate::config::UnstructuredConfig;
use crate::document::{Element, FileKind, Metadata, Partitioner};
use anyhow::{Context, Result};
use log::debug;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;

/// Client for the Unstructured partition API
#[derive(Clone)]
pub struct UnstructuredClient {
    config: UnstructuredConfig,
    client: reqwest::Client,
}

impl UnstructuredClient {
    pub fn new(config: UnstructuredConfig) -> Self {
        let client = reqwest::Client::new();
        UnstructuredClient { config, client }
    }

    /// Multipart form for one file; PDFs get the layout model, decks the default strategy
    fn build_form(file_name: String, bytes: Vec<u8>, mime: &str, kind: FileKind) -> Result<Form> {
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .context("Invalid MIME type")?;

        // Each returned element is one titled section
        let form = Form::new()
            .part("files", part)
            .text("chunking_strategy", "by_title");

        let form = match kind {
            FileKind::Pdf => form
                .text("strategy", "hi_res")
                .text("hi_res_model_name", "yolox")
                .text("pdf_infer_table_structure", "true"),
            FileKind::SlideDeck => form.text("strategy", "auto"),
        };

        Ok(form)
    }
}

impl Partitioner for UnstructuredClient {
    async fn partition(&self, path: &Path, kind: FileKind) -> Result<Vec<Element>> {
        let file_name = path
            .file_name()
            .context("Invalid file name")?
            .to_str()
            .context("Invalid file name encoding")?
            .to_string();

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mime = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or_else(|| kind.mime_type());

        debug!("Uploading {} ({} bytes) for partitioning", file_name, bytes.len());

        let form = Self::build_form(file_name, bytes, mime, kind)?;

        let response = self
            .client
            .post(&self.config.url)
            .header("unstructured-api-key", &self.config.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .context("Failed to reach the partition service")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed: {} {}",
                status,
                error_text
            ));
        }

        let elements: Vec<RawElement> = response
            .json()
            .await
            .context("Invalid partition response")?;

        debug!("Received {} elements for {}", elements.len(), path.display());

        Ok(elements
            .into_iter()
            .map(|raw| {
                let mut metadata = raw.metadata;
                if let Some(kind) = raw.kind {
                    metadata.insert("category".to_string(), kind.into());
                }
                Element {
                    text: raw.text,
                    metadata,
                }
            })
            .collect())
    }
}

#[derive(Deserialize, Debug)]
struct RawElement {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::load_documents;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> UnstructuredClient {
        UnstructuredClient::new(UnstructuredConfig {
            api_key: "un-test".to_string(),
            url: format!("{}/general/v0/general", server.uri()),
        })
    }

    #[tokio::test]
    async fn test_partition_pdf() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/general/v0/general"))
            .and(header("unstructured-api-key", "un-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "type": "CompositeElement",
                    "element_id": "e1",
                    "text": "Introduction\n\nThis report covers vector search.",
                    "metadata": {"filename": "report.pdf", "page_number": 1},
                },
                {
                    "type": "CompositeElement",
                    "element_id": "e2",
                    "text": "Results",
                    "metadata": {"filename": "report.pdf", "page_number": 2},
                },
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let file = dir.path().join("report.pdf");
        fs::write(&file, b"%PDF-1.4 fake").unwrap();

        let elements = client(&server)
            .partition(&file, FileKind::Pdf)
            .await
            .unwrap();

        assert_eq!(elements.len(), 2);
        assert!(elements[0].text.starts_with("Introduction"));
        assert_eq!(elements[1].metadata.get("page_number"), Some(&Value::from(2)));
        assert_eq!(
            elements[0].metadata.get("category"),
            Some(&Value::from("CompositeElement"))
        );

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"strategy\"\r\n\r\nhi_res"));
        assert!(body.contains("name=\"hi_res_model_name\"\r\n\r\nyolox"));
        assert!(body.contains("name=\"chunking_strategy\"\r\n\r\nby_title"));
        assert!(body.contains("filename=\"report.pdf\""));
        assert!(body.contains("%PDF-1.4 fake"));
    }

    #[tokio::test]
    async fn test_partition_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("File is corrupted"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let file = dir.path().join("broken.pdf");
        fs::write(&file, b"garbage").unwrap();

        let err = client(&server)
            .partition(&file, FileKind::Pdf)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("File is corrupted"));
    }

    #[tokio::test]
    async fn test_corrupted_file_does_not_block_batch() {
        let server = MockServer::start().await;
        // Requests carrying the corrupted bytes fail, everything else succeeds
        Mock::given(method("POST"))
            .and(|request: &wiremock::Request| {
                String::from_utf8_lossy(&request.body).contains("CORRUPTED")
            })
            .respond_with(ResponseTemplate::new(500).set_body_string("partition failed"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"type": "Title", "text": "Valid section", "metadata": {}},
            ])))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a_corrupted.pdf"), b"CORRUPTED").unwrap();
        fs::write(dir.path().join("b_valid.pdf"), b"%PDF valid").unwrap();
        fs::write(dir.path().join("c_slides.pptx"), b"deck").unwrap();

        let report = load_documents(dir.path(), &client(&server)).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, dir.path().join("a_corrupted.pdf"));
        assert_eq!(report.documents.len(), 2);
        assert!(report.documents.iter().all(|d| d.content == "Valid section"));
    }
}
