//! Field mapping: which source field feeds which card role.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Logical card role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    Title,
    Subtitle,
    Description,
    Image,
    Link,
}

impl FieldRole {
    pub const ALL: [FieldRole; 5] = [
        FieldRole::Title,
        FieldRole::Subtitle,
        FieldRole::Description,
        FieldRole::Image,
        FieldRole::Link,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldRole::Title => "title",
            FieldRole::Subtitle => "subtitle",
            FieldRole::Description => "description",
            FieldRole::Image => "image",
            FieldRole::Link => "link",
        }
    }
}

/// Per-render correspondence between card roles and source field names.
///
/// Every role defaults to a field of the same name. An empty name is treated
/// as "use the default", both when set programmatically and when
/// deserialized from a render request.
///
/// ```rust
/// # use cardcrafter::{FieldMapping, FieldRole};
/// let mapping = FieldMapping::default().title("name").subtitle("role");
/// assert_eq!(mapping.field(FieldRole::Title), "name");
/// assert_eq!(mapping.field(FieldRole::Image), "image");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub image: String,
    pub link: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            title: "title".into(),
            subtitle: "subtitle".into(),
            description: "description".into(),
            image: "image".into(),
            link: "link".into(),
        }
    }
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source field for `role`, falling back to the role name when unset.
    pub fn field(&self, role: FieldRole) -> &str {
        let name = match role {
            FieldRole::Title => &self.title,
            FieldRole::Subtitle => &self.subtitle,
            FieldRole::Description => &self.description,
            FieldRole::Image => &self.image,
            FieldRole::Link => &self.link,
        };
        let name = name.trim();
        if name.is_empty() { role.as_str() } else { name }
    }

    /// Override the source field for `role`. Empty names are ignored.
    pub fn with(mut self, role: FieldRole, name: impl Into<String>) -> Self {
        let name = name.into();
        if name.trim().is_empty() {
            return self;
        }
        let slot = match role {
            FieldRole::Title => &mut self.title,
            FieldRole::Subtitle => &mut self.subtitle,
            FieldRole::Description => &mut self.description,
            FieldRole::Image => &mut self.image,
            FieldRole::Link => &mut self.link,
        };
        *slot = name;
        self
    }

    pub fn title(self, name: impl Into<String>) -> Self {
        self.with(FieldRole::Title, name)
    }

    pub fn subtitle(self, name: impl Into<String>) -> Self {
        self.with(FieldRole::Subtitle, name)
    }

    pub fn description(self, name: impl Into<String>) -> Self {
        self.with(FieldRole::Description, name)
    }

    pub fn image(self, name: impl Into<String>) -> Self {
        self.with(FieldRole::Image, name)
    }

    pub fn link(self, name: impl Into<String>) -> Self {
        self.with(FieldRole::Link, name)
    }

    /// Source field names read by some role; these are not passed through.
    pub fn consumed_fields(&self) -> HashSet<&str> {
        FieldRole::ALL.iter().map(|role| self.field(*role)).collect()
    }

    /// Same mapping with every name resolved (no empty slots).
    pub fn resolved(&self) -> Self {
        Self {
            title: self.field(FieldRole::Title).to_string(),
            subtitle: self.field(FieldRole::Subtitle).to_string(),
            description: self.field(FieldRole::Description).to_string(),
            image: self.field(FieldRole::Image).to_string(),
            link: self.field(FieldRole::Link).to_string(),
        }
    }
}
