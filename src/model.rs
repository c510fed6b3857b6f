use serde::{Deserialize, Serialize};

/// Identifies who an advertisement is being selected for and where it will be rendered.
///
/// The context is bound once per selection and shared by every targeting evaluation within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    customer_id: String,
    marketplace_id: String,
}

impl RequestContext {
    /// Create a new request context.
    ///
    /// ```
    /// # use ad_selection::RequestContext;
    /// let request = RequestContext::new("customer-1", "marketplace-1");
    /// assert_eq!(request.marketplace_id(), "marketplace-1");
    /// ```
    pub fn new(customer_id: impl Into<String>, marketplace_id: impl Into<String>) -> Self {
        RequestContext {
            customer_id: customer_id.into(),
            marketplace_id: marketplace_id.into(),
        }
    }

    /// Customer the advertisement is selected for. May be empty.
    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    /// Marketplace the advertisement will be rendered on.
    pub fn marketplace_id(&self) -> &str {
        &self.marketplace_id
    }
}

/// A renderable advertisement available in a marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisementContent {
    /// Unique id of the content; targeting groups refer to it.
    pub content_id: String,
    /// Marketplace the content belongs to.
    pub marketplace_id: String,
    /// Markup rendered to the customer.
    pub renderable_content: String,
}

impl AdvertisementContent {
    /// Create new advertisement content.
    pub fn new(
        content_id: impl Into<String>,
        marketplace_id: impl Into<String>,
        renderable_content: impl Into<String>,
    ) -> Self {
        AdvertisementContent {
            content_id: content_id.into(),
            marketplace_id: marketplace_id.into(),
            renderable_content: renderable_content.into(),
        }
    }
}

/// Result of an advertisement selection.
///
/// Selection never returns "nothing": when no content is eligible the outcome is
/// [`GeneratedAdvertisement::Empty`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum GeneratedAdvertisement {
    /// The content chosen for the request.
    #[serde(rename_all = "camelCase")]
    Advertisement {
        /// Chosen content.
        content: AdvertisementContent,
        /// Click-through rate of the targeting group that made the content eligible.
        click_through_rate: f64,
    },
    /// No content could be chosen.
    Empty,
}

impl GeneratedAdvertisement {
    /// Return `true` if no content was chosen.
    pub fn is_empty(&self) -> bool {
        matches!(self, GeneratedAdvertisement::Empty)
    }

    /// Chosen content, if any.
    pub fn content(&self) -> Option<&AdvertisementContent> {
        match self {
            GeneratedAdvertisement::Advertisement { content, .. } => Some(content),
            GeneratedAdvertisement::Empty => None,
        }
    }

    /// Consume the outcome, returning the chosen content, if any.
    pub fn into_content(self) -> Option<AdvertisementContent> {
        match self {
            GeneratedAdvertisement::Advertisement { content, .. } => Some(content),
            GeneratedAdvertisement::Empty => None,
        }
    }

    /// Click-through rate the content was ranked with, if any.
    pub fn click_through_rate(&self) -> Option<f64> {
        match self {
            GeneratedAdvertisement::Advertisement {
                click_through_rate, ..
            } => Some(*click_through_rate),
            GeneratedAdvertisement::Empty => None,
        }
    }
}

impl Default for GeneratedAdvertisement {
    fn default() -> Self {
        GeneratedAdvertisement::Empty
    }
}
