//! Swipe vocabulary shared by every component.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A decision on a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SwipeAction {
    Like,
    Dislike,
    Superlike,
}

impl SwipeAction {
    /// Map the action token used by the swipe endpoint.
    ///
    /// The backend calls a dislike `pass`.
    pub fn from_endpoint_token(token: &str) -> Option<Self> {
        match token {
            "pass" => Some(Self::Dislike),
            "like" => Some(Self::Like),
            "superlike" => Some(Self::Superlike),
            _ => None,
        }
    }
}

/// A network-confirmed swipe: the ground truth of what the backend accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeEvent {
    pub profile_id: String,
    pub action: SwipeAction,
}

impl SwipeEvent {
    pub fn new(profile_id: impl Into<String>, action: SwipeAction) -> Self {
        Self {
            profile_id: profile_id.into(),
            action,
        }
    }
}

/// Scraped representation of the profile currently on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geomatch {
    #[serde(default)]
    pub name: Option<String>,
    /// CSS `url(...)` literals, in page order.
    #[serde(default)]
    pub image_urls: Vec<String>,
}

impl Geomatch {
    pub fn new(name: impl Into<String>, image_urls: Vec<String>) -> Self {
        Self {
            name: Some(name.into()),
            image_urls,
        }
    }

    /// Name and at least one image are both present.
    pub fn is_complete(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty()) && !self.image_urls.is_empty()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unknown>")
    }
}
