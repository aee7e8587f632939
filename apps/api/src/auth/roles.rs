use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Reader,
    /// May create, edit, delete and voice annotations.
    Content,
}

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ViewAnnotations,
    CreateAnnotations,
    EditAnnotations,
    DeleteAnnotations,
    GenerateSpeech,
    ViewStats,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Content => "content",
        }
    }

    /// The single authorization policy. Edit and delete are role-based:
    /// a content user may change any record, not only their own.
    pub fn allows(self, capability: Capability) -> bool {
        match self {
            Role::Content => true,
            Role::Reader => matches!(capability, Capability::ViewAnnotations),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reader" => Ok(Role::Reader),
            "content" => Ok(Role::Content),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}
