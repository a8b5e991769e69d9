//! Stateful observers of the traversal that resolve references between boxes.
//!
//! Each coordinator sees every box enter, every decoded payload and every box
//! exit, in walk order. Scoped state lives on stacks keyed to the enclosing
//! container (`trak`, `traf`, `moof`, `mfra`, `meta`) and is dropped on exit.
//! A fresh [`CoordinatorSet`] is built for every walk.

pub mod edit_list;
pub mod fragment;
pub mod metadata;
pub mod random_access;

use crate::boxes::BoxHeader;
use crate::payload::ParsedPayload;
use crate::registry::DecoderEnv;
use edit_list::EditListCoordinator;
use fragment::FragmentCoordinator;
use metadata::MetadataCoordinator;
use random_access::RandomAccessCoordinator;

pub trait Coordinator {
    /// Decoder environment this coordinator supplies.
    type Env<'a>
    where
        Self: 'a;

    fn will_start_box(&mut self, header: &BoxHeader, depth: usize);

    fn did_parse_payload(&mut self, header: &BoxHeader, payload: &ParsedPayload);

    /// Called on box exit; may return an aggregate payload for the box.
    fn did_finish_box(&mut self, header: &BoxHeader) -> Option<ParsedPayload>;

    /// Environment for decoding `header`, or `None` if this coordinator does
    /// not serve that box type.
    fn environment<'a>(&'a self, header: &BoxHeader) -> Option<Self::Env<'a>>;
}

#[derive(Default)]
pub struct CoordinatorSet {
    pub edit_list: EditListCoordinator,
    pub metadata: MetadataCoordinator,
    pub fragment: FragmentCoordinator,
    pub random_access: RandomAccessCoordinator,
}

impl CoordinatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn will_start_box(&mut self, header: &BoxHeader, depth: usize) {
        self.edit_list.will_start_box(header, depth);
        self.metadata.will_start_box(header, depth);
        self.fragment.will_start_box(header, depth);
        self.random_access.will_start_box(header, depth);
    }

    pub fn environment(&self, header: &BoxHeader) -> DecoderEnv<'_> {
        DecoderEnv {
            edit_list: self.edit_list.environment(header),
            metadata: self.metadata.environment(header),
            fragment: self.fragment.environment(header),
            random_access: self.random_access.environment(header),
        }
    }

    pub fn did_parse_payload(&mut self, header: &BoxHeader, payload: &ParsedPayload) {
        self.edit_list.did_parse_payload(header, payload);
        self.metadata.did_parse_payload(header, payload);
        self.fragment.did_parse_payload(header, payload);
        self.random_access.did_parse_payload(header, payload);
    }

    /// Finalize `header`. A `traf` summary from the fragment coordinator is
    /// handed to the random-access index before that index finalizes.
    pub fn did_finish_box(&mut self, header: &BoxHeader) -> Option<ParsedPayload> {
        let mut synthesized = self.edit_list.did_finish_box(header);
        synthesized = synthesized.or(self.metadata.did_finish_box(header));

        if let Some(summary) = self.fragment.did_finish_box(header) {
            self.random_access.did_parse_payload(header, &summary);
            synthesized = synthesized.or(Some(summary));
        }
        let ra = self.random_access.did_finish_box(header);
        synthesized.or(ra)
    }
}
