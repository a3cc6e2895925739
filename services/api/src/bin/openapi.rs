//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document for the tutor chat REST API to `openapi.json`.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

/// Serializes the OpenAPI document and writes it to `path`.
fn write_document(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec_json = api_doc.to_pretty_json()?;
    std::fs::write(path, spec_json)?;
    println!("OpenAPI specification generated at {}", path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Build the document from the shared ApiDoc and save it to `openapi.json`.
    write_document(ApiDoc::openapi(), "openapi.json")?;
    Ok(())
}
