//! Request model: the JSON payload accepted by `POST /pdf` and its validated,
//! typed form.
//!
//! Two request shapes share one endpoint:
//!
//! ```text
//! { "url": "https://…", "filename"?, "disposition"?, "print-media-type"?, "cookies"?, "options"? }
//! { "template": "<html>…", "data"?, "header"?, "footer"?, "options"? }
//! ```
//!
//! A payload carrying `url` is always a remote request, even when it also has
//! a `template`.

use crate::error::ServiceError;
use crate::pipeline::options::{OptionValue, RenderOptions};
use crate::response::Disposition;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Raw JSON body, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RenderPayload {
    pub url: Option<String>,
    pub filename: Option<String>,
    pub disposition: Option<Disposition>,
    #[serde(rename = "print-media-type")]
    pub print_media_type: Option<Value>,
    pub cookies: Option<Value>,
    pub options: Option<Value>,
    pub template: Option<String>,
    pub data: Option<Value>,
    pub header: Option<String>,
    pub footer: Option<String>,
}

impl RenderPayload {
    /// Parse a request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, ServiceError> {
        serde_json::from_slice(body)
            .map_err(|e| ServiceError::InvalidRequest(format!("Malformed request body: {e}")))
    }
}

/// What to render.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderSource {
    /// A template evaluated by the service, plus optional header/footer
    /// templates evaluated with the same data.
    Inline {
        markup: String,
        data: Value,
        header: Option<String>,
        footer: Option<String>,
    },
    /// A page the renderer fetches itself.
    Remote {
        url: String,
        cookies: Vec<(String, String)>,
        print_media_type: bool,
    },
}

/// A validated conversion request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub source: RenderSource,
    /// Attachment name; `None` falls back to the configured default.
    pub filename: Option<String>,
    pub disposition: Disposition,
    /// Per-request overrides layered over the configured defaults.
    pub options: RenderOptions,
}

impl RenderRequest {
    /// Render a remote page with print media type and no cookies.
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            source: RenderSource::Remote {
                url: url.into(),
                cookies: Vec::new(),
                print_media_type: true,
            },
            filename: None,
            disposition: Disposition::default(),
            options: RenderOptions::new(),
        }
    }

    /// Render a template against `data`.
    pub fn inline(markup: impl Into<String>, data: Value) -> Self {
        Self {
            source: RenderSource::Inline {
                markup: markup.into(),
                data,
                header: None,
                footer: None,
            },
            filename: None,
            disposition: Disposition::default(),
            options: RenderOptions::new(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Human-readable name of the source for logs and error messages.
    pub fn describe(&self) -> &str {
        match &self.source {
            RenderSource::Remote { url, .. } => url,
            RenderSource::Inline { .. } => "inline document",
        }
    }

    /// Option overrides including those derived from request fields
    /// (`print-media-type`, `cookie`).
    pub fn effective_options(&self) -> RenderOptions {
        let mut options = self.options.clone();
        if let RenderSource::Remote {
            cookies,
            print_media_type,
            ..
        } = &self.source
        {
            options.set("print_media_type", *print_media_type);
            if !cookies.is_empty() {
                options.set(
                    "cookie",
                    OptionValue::tuples(cookies.iter().map(|(n, v)| [n, v])),
                );
            }
        }
        options
    }
}

impl TryFrom<RenderPayload> for RenderRequest {
    type Error = ServiceError;

    fn try_from(payload: RenderPayload) -> Result<Self, Self::Error> {
        let options = match &payload.options {
            None => RenderOptions::new(),
            Some(v) => RenderOptions::from_json_object(v)?,
        };

        let source = if let Some(url) = payload.url {
            if url.trim().is_empty() {
                return Err(ServiceError::InvalidRequest("'url' must not be empty".into()));
            }
            RenderSource::Remote {
                url,
                cookies: parse_cookies(payload.cookies.as_ref())?,
                print_media_type: parse_flag("print-media-type", payload.print_media_type.as_ref(), true)?,
            }
        } else if let Some(markup) = payload.template {
            RenderSource::Inline {
                markup,
                data: payload.data.unwrap_or_else(|| Value::Object(Map::new())),
                header: payload.header,
                footer: payload.footer,
            }
        } else {
            return Err(ServiceError::InvalidRequest(
                "Request must contain either 'url' or 'template'".into(),
            ));
        };

        Ok(RenderRequest {
            source,
            filename: payload.filename.filter(|f| !f.trim().is_empty()),
            disposition: payload.disposition.unwrap_or_default(),
            options,
        })
    }
}

/// Only JSON booleans are accepted; a missing field takes `default`.
fn parse_flag(name: &str, value: Option<&Value>, default: bool) -> Result<bool, ServiceError> {
    match value {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(ServiceError::InvalidRequest(format!(
            "'{name}' must be a boolean, got {other}"
        ))),
    }
}

/// Accept `[[name, value], …]` or `{name: value, …}`.
fn parse_cookies(value: Option<&Value>) -> Result<Vec<(String, String)>, ServiceError> {
    let invalid = || {
        ServiceError::InvalidRequest(
            "'cookies' must be a list of [name, value] pairs or an object".into(),
        )
    };

    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, v)| Ok((name.clone(), cookie_text(v).ok_or_else(invalid)?)))
            .collect(),
        Some(Value::Array(pairs)) => pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([name, v]) => Ok((
                    cookie_text(name).ok_or_else(invalid)?,
                    cookie_text(v).ok_or_else(invalid)?,
                )),
                _ => Err(invalid()),
            })
            .collect(),
        Some(_) => Err(invalid()),
    }
}

fn cookie_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::options::encode;
    use serde_json::json;

    fn parse(body: Value) -> Result<RenderRequest, ServiceError> {
        RenderPayload::from_slice(body.to_string().as_bytes())?.try_into()
    }

    #[test]
    fn url_request_defaults() {
        let req = parse(json!({"url": "http://x/page"})).unwrap();
        assert_eq!(req.source, RenderSource::Remote {
            url: "http://x/page".into(),
            cookies: vec![],
            print_media_type: true,
        });
        assert_eq!(req.disposition, Disposition::Attachment);
        assert!(req.filename.is_none());
        assert_eq!(encode(&req.effective_options()), vec!["--print-media-type"]);
    }

    #[test]
    fn print_media_type_false_is_omitted() {
        let req = parse(json!({"url": "http://x/", "print-media-type": false})).unwrap();
        assert!(encode(&req.effective_options()).is_empty());
    }

    #[test]
    fn print_media_type_must_be_boolean() {
        let err = parse(json!({"url": "http://x/", "print-media-type": "false"})).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[test]
    fn cookies_as_pairs_or_object() {
        let pairs = parse(json!({"url": "http://x/", "cookies": [["sessionid", "abc"], ["n", 1]]})).unwrap();
        let object = parse(json!({"url": "http://x/", "cookies": {"n": 1, "sessionid": "abc"}})).unwrap();

        assert_eq!(
            encode(&pairs.effective_options()),
            vec!["--cookie", "sessionid", "abc", "--cookie", "n", "1", "--print-media-type"]
        );
        let RenderSource::Remote { cookies, .. } = object.source else {
            panic!("expected a remote source");
        };
        assert_eq!(cookies, vec![("n".into(), "1".into()), ("sessionid".into(), "abc".into())]);
    }

    #[test]
    fn malformed_cookies_are_rejected() {
        for cookies in [json!("sessionid=abc"), json!([["only-name"]]), json!({"a": {"b": 1}})] {
            let err = parse(json!({"url": "http://x/", "cookies": cookies})).unwrap_err();
            assert!(matches!(err, ServiceError::InvalidRequest(_)), "{err}");
        }
    }

    #[test]
    fn template_request() {
        let req = parse(json!({
            "template": "<b>{{name}}</b>",
            "data": {"name": "Jo"},
            "footer": "<p>{{ page }}</p>",
        }))
        .unwrap();
        assert_eq!(req.source, RenderSource::Inline {
            markup: "<b>{{name}}</b>".into(),
            data: json!({"name": "Jo"}),
            header: None,
            footer: Some("<p>{{ page }}</p>".into()),
        });
        assert_eq!(req.describe(), "inline document");
        assert!(req.effective_options().is_empty());
    }

    #[test]
    fn template_data_defaults_to_empty_object() {
        let req = parse(json!({"template": "hi"})).unwrap();
        let RenderSource::Inline { data, .. } = req.source else {
            panic!("expected an inline source");
        };
        assert_eq!(data, json!({}));
    }

    #[test]
    fn url_wins_over_template() {
        let req = parse(json!({"url": "http://x/", "template": "ignored"})).unwrap();
        assert!(matches!(req.source, RenderSource::Remote { .. }));
    }

    #[test]
    fn neither_url_nor_template_is_a_bad_request() {
        let err = parse(json!({"filename": "a.pdf"})).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(parse(json!({"url": "  "})).is_err());
    }

    #[test]
    fn options_and_disposition_are_parsed() {
        let req = parse(json!({
            "url": "http://x/",
            "filename": "report.pdf",
            "disposition": "inline",
            "options": {"page-size": "A4", "grayscale": true},
        }))
        .unwrap();
        assert_eq!(req.filename.as_deref(), Some("report.pdf"));
        assert_eq!(req.disposition, Disposition::Inline);
        assert_eq!(
            encode(&req.effective_options()),
            vec!["--grayscale", "--page-size", "A4", "--print-media-type"]
        );
    }

    #[test]
    fn malformed_json_is_a_bad_request() {
        let err = RenderPayload::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
        assert!(RenderPayload::from_slice(br#"{"disposition": "sideways"}"#).is_err());
    }
}
