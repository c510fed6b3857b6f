use serde::{Deserialize, Serialize};

/// Describes an advertisement chosen for a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionEvent {
    /// Customer the advertisement was selected for.
    pub customer_id: String,
    /// Marketplace the advertisement will be rendered on.
    pub marketplace_id: String,
    /// Id of the chosen content.
    pub content_id: String,
    /// Click-through rate the content was ranked with.
    pub click_through_rate: f64,
    /// Number of eligible content items the advertisement was chosen from.
    pub eligible_content: usize,
    /// Time of the selection, RFC 3339.
    pub timestamp: String,
}

/// Receives an event for every successful advertisement selection, e.g. to record impressions.
pub trait SelectionLogger {
    /// Record `event`. Called on the selecting thread, so implementations should not block.
    fn log_selection(&self, event: SelectionEvent);
}

pub(crate) struct NoopSelectionLogger;
impl SelectionLogger for NoopSelectionLogger {
    fn log_selection(&self, _event: SelectionEvent) {}
}

impl<T: Fn(SelectionEvent)> SelectionLogger for T {
    fn log_selection(&self, event: SelectionEvent) {
        self(event);
    }
}
