//! Content Builder — resolves the subject/body/header/footer fallback
//! chains into a single wrapped HTML document. Never fails; every missing
//! piece is silently omitted.

use crate::assets::AssetFetcher;
use crate::storage::models::{PromotionEmailTemplateRow, TenantSettingsRow};

pub struct BuiltEmailContent {
    pub subject: String,
    pub body_html: String,
}

/// `buildEmailContent(template, subjectOverride, bodyOverride, tenantIdForFallback)`.
pub async fn build_email_content(
    asset_fetcher: &AssetFetcher,
    template: &PromotionEmailTemplateRow,
    tenant_settings: Option<&TenantSettingsRow>,
    subject_override: Option<&str>,
    body_override: Option<&str>,
    prewarm: bool,
) -> BuiltEmailContent {
    let subject = subject_override
        .filter(|s| !s.is_empty())
        .unwrap_or(&template.subject)
        .to_string();

    let mut body = body_override
        .filter(|s| !s.is_empty())
        .unwrap_or(&template.body_html)
        .to_string();

    let logo_image_url = tenant_settings.and_then(|t| t.logo_image_url.as_deref());

    // Header image: template wins over tenant-level fallback.
    let header_image_url = template
        .header_image_url
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| tenant_settings.and_then(|t| t.email_header_image_url.as_deref()).filter(|s| !s.is_empty()));

    if let Some(url) = header_image_url {
        body = format!("<img src=\"{url}\">{body}");
    }

    // Footer: engaged from tenant object storage ONLY if the template has
    // neither footerHtml nor footerImageUrl, to avoid double footers.
    let template_has_footer = template.footer_html.as_deref().is_some_and(|s| !s.is_empty())
        || template.footer_image_url.as_deref().is_some_and(|s| !s.is_empty());

    if let Some(footer_html) = template.footer_html.as_deref().filter(|s| !s.is_empty()) {
        body.push_str(footer_html);
    } else if let Some(footer_image_url) = template.footer_image_url.as_deref().filter(|s| !s.is_empty()) {
        body.push_str(&format!("<img src=\"{footer_image_url}\">"));
    } else if !template_has_footer {
        if let Some(tenant_settings) = tenant_settings {
            if let Some(footer_url) = tenant_settings.email_footer_html_url.as_deref().filter(|s| !s.is_empty()) {
                let footer = asset_fetcher.fetch_footer_html(&template.tenant_id, footer_url, logo_image_url, prewarm).await;
                body.push_str(&footer);
            }
        }
    }

    let wrapped = format!("<!DOCTYPE html><html><head><meta charset='UTF-8'></head><body>{body}</body></html>");

    BuiltEmailContent { subject, body_html: wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::object_store::ObjectStorageClient;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StubObjectStore(String);

    #[async_trait]
    impl ObjectStorageClient for StubObjectStore {
        async fn get_text(&self, _url: &str) -> Result<String, crate::errors::BatchError> {
            Ok(self.0.clone())
        }
    }

    fn template(tenant_id: &str) -> PromotionEmailTemplateRow {
        PromotionEmailTemplateRow {
            id: "tpl1".into(),
            tenant_id: tenant_id.into(),
            event_id: Some("e1".into()),
            subject: "Join us".into(),
            from_email: "noreply@tenant.test".into(),
            body_html: "<p>hello</p>".into(),
            header_image_url: None,
            footer_html: None,
            footer_image_url: None,
            promotion_code: None,
            discount_code_id: None,
        }
    }

    fn tenant_settings(tenant_id: &str) -> TenantSettingsRow {
        TenantSettingsRow {
            tenant_id: tenant_id.into(),
            email_header_image_url: Some("https://cdn/header.png".into()),
            email_footer_html_url: None,
            logo_image_url: Some("https://cdn/logo.png".into()),
        }
    }

    #[tokio::test]
    async fn falls_back_to_tenant_header_image_when_template_header_unset() {
        let fetcher = AssetFetcher::new(Arc::new(StubObjectStore(String::new())));
        let built = build_email_content(&fetcher, &template("t1"), Some(&tenant_settings("t1")), None, None, false).await;
        let after_body = built.body_html.split("<body>").nth(1).unwrap();
        assert!(after_body.as_bytes()[..200.min(after_body.len())].starts_with(b"<img src=\"https://cdn/header.png\">"));
    }

    #[tokio::test]
    async fn skips_object_storage_footer_when_template_has_its_own_footer() {
        let fetcher = AssetFetcher::new(Arc::new(StubObjectStore("<footer>tenant footer</footer>".into())));
        let mut tpl = template("t1");
        tpl.footer_html = Some("<footer>template footer</footer>".into());
        let mut settings = tenant_settings("t1");
        settings.email_footer_html_url = Some("https://cdn/footer.html".into());

        let built = build_email_content(&fetcher, &tpl, Some(&settings), None, None, false).await;
        assert!(built.body_html.contains("template footer"));
        assert!(!built.body_html.contains("tenant footer"));
    }

    #[tokio::test]
    async fn overrides_win_over_template_subject_and_body() {
        let fetcher = AssetFetcher::new(Arc::new(StubObjectStore(String::new())));
        let built = build_email_content(&fetcher, &template("t1"), None, Some("Override subject"), Some("<p>override</p>"), false).await;
        assert_eq!(built.subject, "Override subject");
        assert!(built.body_html.contains("override"));
        assert!(!built.body_html.contains("hello"));
    }

    #[tokio::test]
    async fn wraps_in_html_document() {
        let fetcher = AssetFetcher::new(Arc::new(StubObjectStore(String::new())));
        let built = build_email_content(&fetcher, &template("t1"), None, None, None, false).await;
        assert!(built.body_html.starts_with("<!DOCTYPE html><html><head><meta charset='UTF-8'></head><body>"));
        assert!(built.body_html.ends_with("</body></html>"));
    }
}
