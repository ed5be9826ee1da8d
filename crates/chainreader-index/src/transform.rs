//! Strip block content a filter did not ask for.

use chainreader_core::pb;

use crate::filter::FilterSpec;
use crate::kind::EventOrigin;

impl FilterSpec {
    /// Remove events and messages outside this filter from `block`.
    ///
    /// Each non-empty category narrows its own part of the block: event
    /// types keep only matching events, event origins clear the events of
    /// other origins, message types keep only matching transaction messages.
    pub fn apply(&self, block: &mut pb::Block) {
        if !self.event_types.is_empty() {
            let keep = |e: &pb::Event| self.event_types.contains(&e.event_type);
            for events in event_lists(block) {
                events.retain(keep);
            }
        }

        if !self.event_origins.is_empty() {
            let wants = |o: EventOrigin| self.event_origins.contains(&o);
            if !wants(EventOrigin::BeginBlock) {
                if let Some(r) = block.result_begin_block.as_mut() {
                    r.events.clear();
                }
            }
            if !wants(EventOrigin::EndBlock) {
                if let Some(r) = block.result_end_block.as_mut() {
                    r.events.clear();
                }
            }
            if !wants(EventOrigin::DeliverTx) {
                for r in block.transactions.iter_mut().filter_map(|tx| tx.result.as_mut()) {
                    r.events.clear();
                }
            }
        }

        if !self.message_types.is_empty() {
            let bodies = block
                .transactions
                .iter_mut()
                .filter_map(|tx| tx.tx.as_mut())
                .filter_map(|tx| tx.body.as_mut());
            for body in bodies {
                body.messages.retain(|m| self.message_types.contains(&m.type_url));
            }
        }
    }
}

fn event_lists(block: &mut pb::Block) -> Vec<&mut Vec<pb::Event>> {
    let mut out = vec![];
    if let Some(r) = block.result_begin_block.as_mut() {
        out.push(&mut r.events);
    }
    if let Some(r) = block.result_end_block.as_mut() {
        out.push(&mut r.events);
    }
    for r in block.transactions.iter_mut().filter_map(|tx| tx.result.as_mut()) {
        out.push(&mut r.events);
    }
    out
}
