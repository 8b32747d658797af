//! Conversation messages and their wire encoding.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Image fidelity hint for vision models.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ImageDetail {
    High,
    Low,
    #[default]
    Auto,
}

/// One part of a message's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Image by URL. Data URLs (`data:image/png;base64,...`) work too.
    Image { url: String, detail: ImageDetail },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::image_with_detail(url, ImageDetail::Auto)
    }

    pub fn image_with_detail(url: impl Into<String>, detail: ImageDetail) -> Self {
        Self::Image {
            url: url.into(),
            detail,
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// Distinguishes participants that share a role.
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            name: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::text(text)])
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Wire form of the content: a bare string for a lone text part, else typed parts.
    fn wire_content(&self) -> MessageContent<'_> {
        if let [ContentPart::Text(text)] = self.content.as_slice() {
            return MessageContent::Text(text.as_str().into());
        }

        MessageContent::Parts(self.content.iter().map(WirePart::from).collect())
    }
}

/// Message content - can be string or array of content parts.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(std::borrow::Cow<'a, str>),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum WirePart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageUrl {
    url: String,
    #[serde(default)]
    detail: ImageDetail,
}

impl From<&ContentPart> for WirePart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => Self::Text { text: text.clone() },
            ContentPart::Image { url, detail } => Self::ImageUrl {
                image_url: ImageUrl {
                    url: url.clone(),
                    detail: *detail,
                },
            },
        }
    }
}

impl From<WirePart> for ContentPart {
    fn from(part: WirePart) -> Self {
        match part {
            WirePart::Text { text } => Self::Text(text),
            WirePart::ImageUrl { image_url } => Self::Image {
                url: image_url.url,
                detail: image_url.detail,
            },
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: MessageContent<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Deserialize)]
struct OwnedWireMessage {
    role: Role,
    content: MessageContent<'static>,
    #[serde(default)]
    name: Option<String>,
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireMessage {
            role: self.role,
            content: self.wire_content(),
            name: self.name.as_deref(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = OwnedWireMessage::deserialize(deserializer)?;
        let content = match wire.content {
            MessageContent::Text(text) => vec![ContentPart::Text(text.into_owned())],
            MessageContent::Parts(parts) => parts.into_iter().map(ContentPart::from).collect(),
        };

        Ok(Self {
            role: wire.role,
            content,
            name: wire.name,
        })
    }
}
