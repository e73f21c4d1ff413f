//! Per-conversation resolution state.

use chrono::{DateTime, Utc};

use lares_devices::Device;
use lares_parser::REFERENCE_LAST;

/// The single most-recently-resolved device of one conversation.
///
/// Answers "last-mentioned" back-references. One instance belongs to one
/// conversation; concurrent conversations get separate instances.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    last_mentioned: Option<Device>,
    updated_at: Option<DateTime<Utc>>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the device a command just resolved to.
    pub fn update_mentioned(&mut self, device: Device) {
        self.last_mentioned = Some(device);
        self.updated_at = Some(Utc::now());
    }

    /// Resolve a reference tag such as `last-mentioned` to a device.
    pub fn resolve_reference(&self, reference: &str) -> Option<&Device> {
        if reference == REFERENCE_LAST {
            self.last_mentioned.as_ref()
        } else {
            None
        }
    }

    pub fn last_mentioned(&self) -> Option<&Device> {
        self.last_mentioned.as_ref()
    }

    /// When the state last changed.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Forget the recorded device.
    pub fn clear(&mut self) {
        self.last_mentioned = None;
        self.updated_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_reference_after_update() {
        let mut state = ConversationState::new();
        assert!(state.resolve_reference(REFERENCE_LAST).is_none());
        assert!(state.updated_at().is_none());

        state.update_mentioned(Device::new("lamp-1", "主灯").with_room("客厅"));

        let device = state.resolve_reference(REFERENCE_LAST).unwrap();
        assert_eq!(device.id, "lamp-1");
        assert!(state.updated_at().is_some());
    }

    #[test]
    fn test_unknown_reference_resolves_to_nothing() {
        let mut state = ConversationState::new();
        state.update_mentioned(Device::new("lamp-1", "主灯"));

        assert!(state.resolve_reference("next-mentioned").is_none());
    }

    #[test]
    fn test_clear_forgets_device() {
        let mut state = ConversationState::new();
        state.update_mentioned(Device::new("lamp-1", "主灯"));
        state.clear();

        assert!(state.last_mentioned().is_none());
        assert!(state.updated_at().is_none());
    }
}
