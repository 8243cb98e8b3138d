use std::collections::HashSet;

use super::response::Response;
use crate::membership::types::Address;

/// Decides, reply by reply, whether a remote invocation has heard enough.
pub trait ResponseFilter: Send {
    /// Records a reply. Returns whether the reply counts towards the result.
    fn is_acceptable(&mut self, response: &Response, sender: &Address) -> bool;

    fn need_more_responses(&self) -> bool;

    /// Called when the live membership changes while replies are outstanding.
    fn on_view_change(&mut self, _members: &[Address]) {}
}

/// Stops a remote read at the first reply carrying a value, or once every
/// expected owner has answered without one.
#[derive(Debug, Clone)]
pub struct ClusteredGetResponseValidityFilter {
    expected: HashSet<Address>,
    answered: HashSet<Address>,
    received_valid: bool,
}

impl ClusteredGetResponseValidityFilter {
    pub fn new<'a, I>(targets: I, local: &Address) -> Self
    where
        I: IntoIterator<Item = &'a Address>,
    {
        Self {
            expected: targets
                .into_iter()
                .filter(|target| *target != local)
                .cloned()
                .collect(),
            answered: HashSet::new(),
            received_valid: false,
        }
    }

    pub fn expected(&self) -> &HashSet<Address> {
        &self.expected
    }

    pub fn answered(&self) -> &HashSet<Address> {
        &self.answered
    }
}

impl ResponseFilter for ClusteredGetResponseValidityFilter {
    fn is_acceptable(&mut self, response: &Response, sender: &Address) -> bool {
        if !self.expected.contains(sender) {
            tracing::trace!("Ignoring reply from unexpected member {}", sender);
            return false;
        }

        if response.is_valid() {
            self.received_valid = true;
        }
        self.answered.insert(sender.clone());
        true
    }

    fn need_more_responses(&self) -> bool {
        !self.received_valid && !self.expected.is_subset(&self.answered)
    }

    fn on_view_change(&mut self, members: &[Address]) {
        let live: HashSet<&Address> = members.iter().collect();
        let before = self.expected.len();
        self.expected.retain(|address| live.contains(address));
        if self.expected.len() != before {
            tracing::debug!(
                "Remote read no longer waits on {} departed member(s)",
                before - self.expected.len()
            );
        }
    }
}
