//! Assignment emails and their attached documents

use std::sync::Arc;

use crate::{
    config::ConfirmConfig,
    error::AppResult,
    html::{escape, or_placeholder},
    models::{assignment::Assignment, device::Device},
    repository::assignments::AssignmentsRepository,
    services::{
        confirm_token::ConfirmToken,
        documents::{DocumentRenderer, DocumentStore, GeneratedDocument},
        email::{Attachment, Mailer, OutgoingEmail},
    },
};

#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    renderer: Arc<dyn DocumentRenderer>,
    store: DocumentStore,
    confirm: ConfirmConfig,
}

impl Notifier {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        renderer: Arc<dyn DocumentRenderer>,
        store: DocumentStore,
        confirm: ConfirmConfig,
    ) -> Self {
        Self {
            mailer,
            renderer,
            store,
            confirm,
        }
    }

    pub async fn generate_document(
        &self,
        assignment: &Assignment,
        device: &Device,
    ) -> AppResult<GeneratedDocument> {
        let rendered = self.renderer.render(assignment, device).await?;
        self.store.store(rendered).await
    }

    /// Best-effort: generate the form and record it on the assignment.
    /// Failures are logged and leave the assignment as it was.
    pub async fn attach_document(
        &self,
        assignments: &AssignmentsRepository,
        assignment: Assignment,
        device: &Device,
    ) -> (Assignment, Option<Attachment>) {
        let generated = match self.generate_document(&assignment, device).await {
            Ok(generated) => generated,
            Err(e) => {
                tracing::warn!(assignment_id = assignment.id, error = %e, "document generation failed");
                return (assignment, None);
            }
        };

        match assignments.set_document(assignment.id, &generated.reference).await {
            Ok(updated) => (updated, Some(generated.attachment)),
            Err(e) => {
                tracing::warn!(assignment_id = assignment.id, error = %e, "failed to record document");
                (assignment, Some(generated.attachment))
            }
        }
    }

    /// Ask the employee to confirm receipt through the emailed link
    pub async fn send_issue_request(
        &self,
        assignment: &Assignment,
        device: &Device,
        token: &ConfirmToken,
        attachment: Option<Attachment>,
    ) -> AppResult<()> {
        let confirm_url = self.confirm.confirm_url(&token.token);
        let html = format!(
            r#"<p>Hello {name},</p>
<p>A device has been issued to you and is waiting for your confirmation of receipt.</p>
<ul>
  <li>Device: <b>{device_name}</b> ({device_code})</li>
  <li>Department: {department}</li>
  <li>Confirm before: {expires}</li>
</ul>
<p><a href="{url}" style="padding:10px 16px;background:#2563eb;color:#fff;text-decoration:none;border-radius:6px;">Confirm receipt</a></p>
<p>If the button does not work, open this link: {url}</p>
<p>ITAM team</p>"#,
            name = escape(&assignment.employee_name),
            device_name = escape(&device.name),
            device_code = escape(&device.code),
            department = or_placeholder(Some(&assignment.department), "Not set"),
            expires = token.expires_at.format("%d/%m/%Y %H:%M UTC"),
            url = escape(&confirm_url),
        );

        self.mailer
            .send(OutgoingEmail {
                to: vec![assignment.employee_email.clone()],
                subject: format!("Confirm receipt of device {}", device.code),
                html,
                attachments: attachment.into_iter().collect(),
            })
            .await
    }

    /// Informational notice for a recorded return
    pub async fn send_return_notice(
        &self,
        assignment: &Assignment,
        device: &Device,
        attachment: Option<Attachment>,
    ) -> AppResult<()> {
        let html = format!(
            r#"<p>Hello {name},</p>
<p>The return of the following device has been recorded:</p>
<ul>
  <li>Device: <b>{device_name}</b> ({device_code})</li>
  <li>Department: {department}</li>
  <li>Reason: {reason}</li>
  <li>Notes: {notes}</li>
</ul>
<p>ITAM team</p>"#,
            name = escape(&assignment.employee_name),
            device_name = escape(&device.name),
            device_code = escape(&device.code),
            department = or_placeholder(Some(&assignment.department), "Not set"),
            reason = or_placeholder(assignment.return_reason.as_deref(), "None"),
            notes = or_placeholder(assignment.notes.as_deref(), "None"),
        );

        self.mailer
            .send(OutgoingEmail {
                to: vec![assignment.employee_email.clone()],
                subject: format!("Device return recorded - {}", device.name),
                html,
                attachments: attachment.into_iter().collect(),
            })
            .await
    }

    /// Tell administrators a confirmation link expired. Best-effort.
    pub async fn notify_expired(
        &self,
        admin_emails: Vec<String>,
        assignment: &Assignment,
        device: Option<&Device>,
    ) {
        if admin_emails.is_empty() {
            tracing::warn!(assignment_id = assignment.id, "no active administrators to notify");
            return;
        }

        let device_label = device
            .map(|d| format!("{} ({})", escape(&d.name), escape(&d.code)))
            .unwrap_or_else(|| "unknown device".to_string());
        let html = format!(
            r#"<p>An assignment confirmation link expired before the employee confirmed receipt.</p>
<ul>
  <li>Assignment: <b>#{id}</b></li>
  <li>Employee: {name} ({code})</li>
  <li>Device: {device}</li>
  <li>Email: {email}</li>
</ul>
<p>Resend the confirmation email from the history page.</p>"#,
            id = assignment.id,
            name = escape(&assignment.employee_name),
            code = escape(&assignment.employee_code),
            device = device_label,
            email = escape(&assignment.employee_email),
        );

        let result = self
            .mailer
            .send(OutgoingEmail {
                to: admin_emails,
                subject: format!("Confirmation expired for assignment #{}", assignment.id),
                html,
                attachments: Vec::new(),
            })
            .await;

        if let Err(e) = result {
            tracing::error!(assignment_id = assignment.id, error = %e, "failed to notify administrators");
        }
    }
}
