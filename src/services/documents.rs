//! Hand-over / hand-back documents attached to assignment emails

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    config::DocumentsConfig,
    error::{AppError, AppResult},
    html::{escape, or_placeholder},
    models::{
        assignment::{Assignment, AssignmentAction, DocumentRef},
        device::Device,
    },
    services::email::Attachment,
};

/// Rendered document bytes
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Document generation capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, assignment: &Assignment, device: &Device) -> AppResult<RenderedDocument>;
}

/// `{action}_{device code}_{timestamp}` restricted to `[A-Za-z0-9_-]`
pub fn document_stem(assignment: &Assignment, device: &Device) -> String {
    let slug = format!(
        "{}_{}_{}",
        assignment.action,
        device.code,
        assignment.occurred_at.format("%Y%m%d%H%M%S")
    );
    slug.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Printable HTML form, signed on paper at hand-over time
#[derive(Clone)]
pub struct HtmlDocumentRenderer {
    company_name: String,
    handled_by: String,
}

impl HtmlDocumentRenderer {
    pub fn new(config: &DocumentsConfig) -> Self {
        Self {
            company_name: config.company_name.clone(),
            handled_by: config.handled_by.clone(),
        }
    }

    fn render_html(&self, assignment: &Assignment, device: &Device) -> String {
        let title = match assignment.action {
            AssignmentAction::Issue => "Device hand-over record",
            AssignmentAction::Return => "Device return record",
        };
        let warranty_end = device
            .warranty_end_date()
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default();
        let return_reason = match assignment.action {
            AssignmentAction::Return => format!(
                "<tr><th>Return reason</th><td>{}</td></tr>",
                or_placeholder(assignment.return_reason.as_deref(), "-")
            ),
            AssignmentAction::Issue => String::new(),
        };

        format!(
            r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8" />
    <title>{title}</title>
    <style>
      body {{ font-family: Arial, sans-serif; margin: 20mm 15mm; color: #111827; }}
      h1 {{ font-size: 20px; text-align: center; text-transform: uppercase; }}
      table {{ width: 100%; border-collapse: collapse; margin: 12px 0; }}
      th, td {{ border: 1px solid #9ca3af; padding: 6px 8px; text-align: left; }}
      th {{ width: 35%; background: #f3f4f6; }}
      .signatures {{ display: flex; justify-content: space-between; margin-top: 48px; }}
      .signatures div {{ width: 45%; text-align: center; }}
    </style>
  </head>
  <body>
    <p>{company}</p>
    <h1>{title}</h1>
    <p>Record #{id} &middot; {occurred}</p>
    <table>
      <tr><th>Employee</th><td>{employee_name} ({employee_code})</td></tr>
      <tr><th>Email</th><td>{employee_email}</td></tr>
      <tr><th>Department</th><td>{department}</td></tr>
    </table>
    <table>
      <tr><th>Device code</th><td>{device_code}</td></tr>
      <tr><th>Device name</th><td>{device_name}</td></tr>
      <tr><th>Category</th><td>{category}</td></tr>
      <tr><th>Purchase date</th><td>{purchase_date}</td></tr>
      <tr><th>Warranty until</th><td>{warranty_end}</td></tr>
      <tr><th>Notes</th><td>{notes}</td></tr>
      {return_reason}
    </table>
    <div class="signatures">
      <div><b>Handled by</b><br />{handled_by}</div>
      <div><b>Employee</b><br />{employee_name}</div>
    </div>
  </body>
</html>
"#,
            title = title,
            company = escape(&self.company_name),
            id = assignment.id,
            occurred = assignment.occurred_at.format("%d/%m/%Y %H:%M"),
            employee_name = escape(&assignment.employee_name),
            employee_code = escape(&assignment.employee_code),
            employee_email = escape(&assignment.employee_email),
            department = or_placeholder(Some(&assignment.department), "-"),
            device_code = escape(&device.code),
            device_name = escape(&device.name),
            category = or_placeholder(device.category.as_deref(), "-"),
            purchase_date = device.purchase_date.format("%d/%m/%Y"),
            warranty_end = warranty_end,
            notes = or_placeholder(assignment.notes.as_deref(), "-"),
            return_reason = return_reason,
            handled_by = escape(&self.handled_by),
        )
    }
}

#[async_trait]
impl DocumentRenderer for HtmlDocumentRenderer {
    async fn render(&self, assignment: &Assignment, device: &Device) -> AppResult<RenderedDocument> {
        Ok(RenderedDocument {
            file_name: format!("{}.html", document_stem(assignment, device)),
            content_type: "text/html; charset=utf-8".to_string(),
            bytes: self.render_html(assignment, device).into_bytes(),
        })
    }
}

/// Generated document, stored on disk and ready to attach
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub reference: DocumentRef,
    pub attachment: Attachment,
}

/// Renders documents and stores them under the public upload directory
#[derive(Clone)]
pub struct DocumentStore {
    upload_dir: PathBuf,
    public_prefix: String,
}

impl DocumentStore {
    pub fn new(config: &DocumentsConfig) -> Self {
        Self {
            upload_dir: PathBuf::from(&config.upload_dir),
            public_prefix: config.public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub async fn store(&self, document: RenderedDocument) -> AppResult<GeneratedDocument> {
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| AppError::Document(format!("Cannot create upload directory: {}", e)))?;
        let path = self.upload_dir.join(&document.file_name);
        tokio::fs::write(&path, &document.bytes)
            .await
            .map_err(|e| AppError::Document(format!("Cannot write {}: {}", path.display(), e)))?;

        Ok(GeneratedDocument {
            reference: DocumentRef {
                url: format!("{}/{}", self.public_prefix, document.file_name),
                name: document.file_name.clone(),
                generated_at: Utc::now(),
            },
            attachment: Attachment {
                filename: document.file_name,
                content_type: document.content_type,
                content: document.bytes,
            },
        })
    }
}
