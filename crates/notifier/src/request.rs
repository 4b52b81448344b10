use serde::{Deserialize, Serialize};

/// A fully-formed outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRequest {
    /// Provider-registered template with ordered body parameters.
    Template {
        to: String,
        template_name: String,
        language: String,
        parameters: Vec<String>,
    },
    /// Freeform text body.
    Text { to: String, body: String },
}

impl ProviderRequest {
    pub fn to(&self) -> &str {
        match self {
            ProviderRequest::Template { to, .. } | ProviderRequest::Text { to, .. } => to,
        }
    }

    pub(crate) fn to_wire(&self) -> WireMessage<'_> {
        let content = match self {
            ProviderRequest::Template {
                template_name,
                language,
                parameters,
                ..
            } => WireContent::Template {
                template: WireTemplate {
                    name: template_name,
                    language: WireLanguage { code: language },
                    components: vec![WireComponent {
                        kind: "body",
                        parameters: parameters
                            .iter()
                            .map(|text| WireParameter { kind: "text", text })
                            .collect(),
                    }],
                },
            },
            ProviderRequest::Text { body, .. } => WireContent::Text {
                text: WireText {
                    preview_url: true,
                    body,
                },
            },
        };

        WireMessage {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: self.to(),
            content,
        }
    }
}

/// Successful send acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub message_id: String,
}

// Cloud API request shapes.

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(flatten)]
    content: WireContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireContent<'a> {
    Template { template: WireTemplate<'a> },
    Text { text: WireText<'a> },
}

#[derive(Debug, Serialize)]
struct WireTemplate<'a> {
    name: &'a str,
    language: WireLanguage<'a>,
    components: Vec<WireComponent<'a>>,
}

#[derive(Debug, Serialize)]
struct WireLanguage<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct WireComponent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    parameters: Vec<WireParameter<'a>>,
}

#[derive(Debug, Serialize)]
struct WireParameter<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct WireText<'a> {
    preview_url: bool,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireSendResponse {
    #[serde(default)]
    pub messages: Vec<WireMessageId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessageId {
    pub id: String,
}
